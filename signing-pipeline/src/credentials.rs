// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Key material and certificate chains handed to signer modules.

use {
    crate::error::PipelineError,
    signature_envelope::{
        asn1::x509::Certificate, EnvelopeError, InMemorySigningKeyPair, SigningKey,
    },
    std::{fmt, sync::Arc},
};

/// Families of certificate a module may require.
///
/// Only X.509 credentials can currently be loaded, but modules declare their
/// requirement through this enum so an unsupported demand fails with a
/// precise error rather than a bad signature.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CertificateKind {
    X509,
    Pgp,
}

impl fmt::Display for CertificateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X509 => f.write_str("X.509"),
            Self::Pgp => f.write_str("PGP"),
        }
    }
}

/// A signing key, its certificate chain, and the timestamping policy that
/// travels with them.
///
/// The chain is ordered leaf first. `key_name` is an operator-chosen label
/// recorded in audit output; it never influences signing.
#[derive(Clone)]
pub struct SigningCredentials {
    pub key: Arc<dyn SigningKey>,
    pub chain: Vec<Certificate>,
    pub key_name: String,
    pub timestamp_urls: Vec<String>,
}

impl SigningCredentials {
    /// Load credentials from PEM-encoded key and certificate chain data.
    pub fn from_pem(
        key_pem: &str,
        chain_pem: &str,
        key_name: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let key = InMemorySigningKeyPair::from_pkcs8_pem(key_pem.as_bytes())?;
        let chain = Certificate::from_pem_multiple(chain_pem.as_bytes())?;

        if chain.is_empty() {
            return Err(PipelineError::Envelope(EnvelopeError::MissingCertificate));
        }

        Ok(Self {
            key: Arc::new(key),
            chain,
            key_name: key_name.into(),
            timestamp_urls: vec![],
        })
    }

    pub fn timestamp_urls(mut self, urls: impl IntoIterator<Item = String>) -> Self {
        self.timestamp_urls = urls.into_iter().collect();
        self
    }

    /// The end-entity certificate.
    pub fn leaf(&self) -> Result<&Certificate, PipelineError> {
        self.chain
            .first()
            .ok_or(PipelineError::Envelope(EnvelopeError::MissingCertificate))
    }

    /// Check that these credentials satisfy a module's certificate demand.
    pub fn require(&self, kind: CertificateKind) -> Result<(), PipelineError> {
        match kind {
            CertificateKind::X509 if !self.chain.is_empty() => Ok(()),
            other => Err(PipelineError::NoSuchCertificateType(other)),
        }
    }
}

impl fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("key_name", &self.key_name)
            .field("chain_len", &self.chain.len())
            .field("timestamp_urls", &self.timestamp_urls)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, signature_envelope::testdata};

    #[test]
    fn pem_credentials_load() {
        let creds =
            SigningCredentials::from_pem(testdata::RSA_KEY_PEM, testdata::RSA_CERT_PEM, "test-rsa")
                .unwrap();
        assert_eq!(creds.chain.len(), 1);
        assert_eq!(creds.key_name, "test-rsa");
        assert!(creds.timestamp_urls.is_empty());
    }

    #[test]
    fn x509_requirement_satisfied() {
        let creds =
            SigningCredentials::from_pem(testdata::EC_KEY_PEM, testdata::EC_CERT_PEM, "test-ec")
                .unwrap();
        creds.require(CertificateKind::X509).unwrap();
    }

    #[test]
    fn pgp_requirement_refused() {
        let creds =
            SigningCredentials::from_pem(testdata::EC_KEY_PEM, testdata::EC_CERT_PEM, "test-ec")
                .unwrap();
        assert!(matches!(
            creds.require(CertificateKind::Pgp),
            Err(PipelineError::NoSuchCertificateType(CertificateKind::Pgp))
        ));
    }

    #[test]
    fn empty_chain_rejected_at_load() {
        assert!(matches!(
            SigningCredentials::from_pem(testdata::RSA_KEY_PEM, "", "no-certs"),
            Err(PipelineError::Envelope(EnvelopeError::MissingCertificate))
        ));
    }
}
