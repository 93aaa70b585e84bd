// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Low-level ASN.1 types.
//!
//! Parsing is BER tolerant; emission is always DER. Structures whose exact
//! byte representation matters for signature verification (certificates,
//! signed attributes) preserve the bytes they were parsed from and re-emit
//! them verbatim.

pub mod pkcs7;
pub mod time;
pub mod tsp;
pub mod x509;

use {
    bcder::{encode::Values, Mode},
    std::io::Write,
};

/// Emits an already-encoded DER value verbatim.
///
/// Owns its bytes (cheaply, `Bytes` is reference counted) so it can be
/// returned from owned `encode()` paths and used inside `encode::slice`
/// closures, which must produce owned values.
pub(crate) struct PreEncoded(pub bytes::Bytes);

impl Values for PreEncoded {
    fn encoded_len(&self, _: Mode) -> usize {
        self.0.len()
    }

    fn write_encoded<W: Write>(&self, _: Mode, target: &mut W) -> Result<(), std::io::Error> {
        target.write_all(&self.0)
    }
}

/// Splits a concatenation of BER/DER TLVs into the individual value
/// encodings. Used where a SET OF was captured raw and the members are
/// needed separately.
pub(crate) fn split_der_values(mut data: &[u8]) -> Option<Vec<bytes::Bytes>> {
    let mut values = Vec::new();

    while !data.is_empty() {
        let mut idx = 0;

        // Tag octets. High-numbered tags continue while bit 8 is set.
        if data.get(idx)? & 0x1f == 0x1f {
            idx += 1;
            while data.get(idx)? & 0x80 != 0 {
                idx += 1;
            }
        }
        idx += 1;

        // Length octets. Indefinite lengths are not accepted here.
        let first = *data.get(idx)?;
        idx += 1;

        let length = if first & 0x80 == 0 {
            first as usize
        } else {
            let count = (first & 0x7f) as usize;
            if count == 0 || count > 4 {
                return None;
            }

            let mut length = 0usize;
            for _ in 0..count {
                length = (length << 8) | *data.get(idx)? as usize;
                idx += 1;
            }
            length
        };

        let end = idx.checked_add(length)?;
        if end > data.len() {
            return None;
        }

        values.push(bytes::Bytes::copy_from_slice(&data[..end]));
        data = &data[end..];
    }

    Some(values)
}
