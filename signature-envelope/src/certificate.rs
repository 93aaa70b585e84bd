// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Loading X.509 certificates from their serialized forms.

use {
    crate::{
        algorithm::KeyAlgorithm,
        asn1::x509::Certificate,
        EnvelopeError,
    },
    bytes::Bytes,
};

impl Certificate {
    /// Construct from PEM data containing a single `CERTIFICATE` block.
    pub fn from_pem(data: impl AsRef<[u8]>) -> Result<Self, EnvelopeError> {
        let block = pem::parse(data.as_ref())?;

        if block.tag != "CERTIFICATE" {
            return Err(EnvelopeError::MalformedCertificate(format!(
                "expected CERTIFICATE PEM block; got {}",
                block.tag
            )));
        }

        Ok(Self::from_der(Bytes::from(block.contents))?)
    }

    /// Construct from PEM data containing any number of `CERTIFICATE`
    /// blocks. Non-certificate blocks are skipped.
    pub fn from_pem_multiple(data: impl AsRef<[u8]>) -> Result<Vec<Self>, EnvelopeError> {
        pem::parse_many(data.as_ref())?
            .into_iter()
            .filter(|block| block.tag == "CERTIFICATE")
            .map(|block| Ok(Self::from_der(Bytes::from(block.contents))?))
            .collect()
    }

    /// The key algorithm advertised by this certificate's
    /// SubjectPublicKeyInfo.
    pub fn key_algorithm(&self) -> Result<KeyAlgorithm, EnvelopeError> {
        KeyAlgorithm::from_algorithm_identifier(&self.subject_public_key_info.algorithm)
    }
}
