// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal X.509 types.
//!
//! Only the fields the envelope engine needs are parsed: serial number,
//! issuer, subject, and the subject public key info. The complete DER of
//! each certificate is retained and re-emitted verbatim so that embedding
//! a certificate in a SignedData structure never changes its bytes.

use {
    crate::asn1::PreEncoded,
    bcder::{
        decode::{Constructed, DecodeError, Source},
        encode::{self, PrimitiveContent, Values},
        BitString, Integer, Mode, Oid, Tag,
    },
    bytes::Bytes,
};

/// An X.501 Name, kept as its raw DER encoding.
///
/// Names are only ever compared for equality (issuer matching) and copied
/// into new structures, so there is no value in modeling the RDN tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Name(Bytes);

impl Name {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        let captured = cons.capture(|cons| {
            cons.take_sequence(|cons| cons.capture_all().map(|_| ()))
        })?;

        Ok(Self(Bytes::copy_from_slice(captured.as_slice())))
    }

    pub fn encode_ref(&self) -> impl Values {
        PreEncoded(self.0.clone())
    }

    pub fn encode(self) -> impl Values {
        PreEncoded(self.0)
    }

    pub fn as_der(&self) -> &[u8] {
        &self.0
    }
}

/// AlgorithmIdentifier with its parameter kept as raw DER.
///
/// ```ASN.1
/// AlgorithmIdentifier ::= SEQUENCE {
///     algorithm   OBJECT IDENTIFIER,
///     parameters  ANY DEFINED BY algorithm OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AlgorithmIdentifier {
    pub algorithm: Oid,
    pub parameters: Option<Bytes>,
}

impl AlgorithmIdentifier {
    /// An identifier whose parameters field is an explicit ASN.1 NULL.
    ///
    /// This is the common form for digest and RSA algorithm identifiers.
    pub fn new_null_params(algorithm: Oid) -> Self {
        Self {
            algorithm,
            parameters: Some(Bytes::from_static(&[0x05, 0x00])),
        }
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_sequence)
    }

    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(Self::from_sequence)
    }

    pub fn from_sequence<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let algorithm = Oid::take_from(cons)?;
        let parameters = cons.capture_all()?;
        let parameters = if parameters.as_slice().is_empty() {
            None
        } else {
            Some(Bytes::copy_from_slice(parameters.as_slice()))
        };

        Ok(Self {
            algorithm,
            parameters,
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.algorithm.encode_ref(),
            self.parameters.as_ref().map(|p| PreEncoded(p.clone())),
        ))
    }

    pub fn encode(self) -> impl Values {
        encode::sequence((
            self.algorithm.encode(),
            self.parameters.map(PreEncoded),
        ))
    }
}

/// SubjectPublicKeyInfo. Parse only.
#[derive(Clone, Debug)]
pub struct SubjectPublicKeyInfo {
    pub algorithm: AlgorithmIdentifier,
    pub subject_public_key: BitString,
}

impl SubjectPublicKeyInfo {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let algorithm = AlgorithmIdentifier::take_from(cons)?;
            let subject_public_key = BitString::take_from(cons)?;

            Ok(Self {
                algorithm,
                subject_public_key,
            })
        })
    }
}

/// An X.509 certificate: raw DER plus the handful of parsed fields the
/// envelope engine uses.
#[derive(Clone, Debug)]
pub struct Certificate {
    raw: Bytes,
    pub serial_number: Integer,
    pub issuer: Name,
    pub subject: Name,
    pub subject_public_key_info: SubjectPublicKeyInfo,
}

impl Certificate {
    /// Parse a certificate from its complete DER encoding.
    pub fn from_der(
        raw: Bytes,
    ) -> Result<Self, DecodeError<std::convert::Infallible>> {
        let (serial_number, issuer, subject, subject_public_key_info) =
            Constructed::decode(raw.as_ref(), Mode::Der, |cons| {
                cons.take_sequence(|cons| {
                    let fields = cons.take_sequence(|cons| {
                        // version [0] EXPLICIT
                        cons.take_opt_constructed_if(Tag::CTX_0, |cons| cons.capture_all())?;

                        let serial_number = Integer::take_from(cons)?;
                        AlgorithmIdentifier::take_from(cons)?;
                        let issuer = Name::take_from(cons)?;

                        // validity
                        cons.take_sequence(|cons| cons.capture_all().map(|_| ()))?;

                        let subject = Name::take_from(cons)?;
                        let spki = SubjectPublicKeyInfo::take_from(cons)?;

                        // unique IDs and extensions
                        cons.capture_all()?;

                        Ok((serial_number, issuer, subject, spki))
                    })?;

                    // signatureAlgorithm and signatureValue
                    cons.capture_all()?;

                    Ok(fields)
                })
            })?;

        Ok(Self {
            raw,
            serial_number,
            issuer,
            subject,
            subject_public_key_info,
        })
    }

    /// Parse the next certificate in a constructed value, if any remains.
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        let captured = cons.capture(|cons| {
            cons.take_opt_sequence(|cons| cons.capture_all().map(|_| ()))
                .map(|_| ())
        })?;

        if captured.as_slice().is_empty() {
            return Ok(None);
        }

        Self::from_der(Bytes::copy_from_slice(captured.as_slice()))
            .map(Some)
            .map_err(|_| cons.content_err("malformed Certificate"))
    }

    /// The certificate's complete DER encoding, byte for byte as parsed.
    pub fn raw_der(&self) -> &[u8] {
        &self.raw
    }

    /// The raw bits of the subject public key.
    ///
    /// For RSA this is the DER RSAPublicKey structure; for ECDSA the
    /// uncompressed curve point; for Ed25519 the raw key. These are the
    /// same representations `ring` signs with and verifies against.
    pub fn public_key_bits(&self) -> Bytes {
        self.subject_public_key_info
            .subject_public_key
            .octet_bytes()
    }

    pub fn encode_ref(&self) -> impl Values {
        PreEncoded(self.raw.clone())
    }
}

impl Values for Certificate {
    fn encoded_len(&self, _: Mode) -> usize {
        self.raw.len()
    }

    fn write_encoded<W: std::io::Write>(
        &self,
        _: Mode,
        target: &mut W,
    ) -> Result<(), std::io::Error> {
        target.write_all(&self.raw)
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Certificate {}
