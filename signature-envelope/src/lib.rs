// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! PKCS#7 / CMS signature envelopes for code signing.

This crate builds and verifies the SignedData envelopes that code and
package signing formats embed: single-signer PKCS#7 version 1
structures with issuerAndSerialNumber signer identification, optional
authenticated attributes, and RFC 3161 or legacy Microsoft Authenticode
timestamp countersignatures.

Serialization is BER/DER via `bcder` and all cryptography is `ring`.
Byte-for-byte fidelity is a design rule throughout: certificates,
names, and signed attributes are retained as parsed and re-emitted
without re-encoding, because a single re-encoded byte invalidates a
signature.

# Security limitations

Verification here answers *did certificate X sign content Y*. It does
not validate certificate chains, expiry, revocation, or key usage.
Callers performing trust decisions need to layer that on top.
*/

pub mod algorithm;
pub mod asn1;
mod builder;
mod certificate;
mod signing;
pub mod time_stamp;

#[doc(hidden)]
pub mod testdata;

pub use {
    crate::{
        algorithm::{DigestAlgorithm, EcdsaCurve, KeyAlgorithm, SignatureScheme},
        builder::SignatureBuilder,
        signing::{InMemorySigningKeyPair, Signature, SigningKey},
        time_stamp::{CounterSignature, TimeStampClient, TimeStampError, TimeStampTransport},
    },
    bcder::Oid,
    bytes::Bytes,
};

use {
    crate::{
        asn1::{
            pkcs7::{self, OID_MESSAGE_DIGEST},
            x509::Certificate,
        },
        time_stamp::verify_optional_timestamp,
    },
    ring::signature::UnparsedPublicKey,
    std::convert::Infallible,
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("ASN.1 decode error: {0}")]
    Asn1Decode(#[from] bcder::decode::DecodeError<Infallible>),

    #[error("PEM decode error: {0}")]
    PemDecode(#[from] pem::PemError),

    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("no content to sign")]
    ContentNotSet,

    #[error("digest is {got} bytes but {digest} produces {want}")]
    DigestSizeMismatch {
        digest: DigestAlgorithm,
        got: usize,
        want: usize,
    },

    #[error("signing certificate does not hold the signing key")]
    CertificateKeyMismatch,

    #[error("attribute {0} already present")]
    DuplicateAttribute(String),

    #[error("error writing encoded envelope: {0}")]
    EncodingError(#[source] std::io::Error),

    #[error("private key rejected: {0}")]
    KeyRejected(String),

    #[error("key pair generation failed")]
    KeyPairGeneration,

    #[error("signature creation failed")]
    SignatureCreation,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("content digest does not match the message-digest attribute")]
    DigestMismatch,

    #[error("no certificate matches the signer")]
    MissingCertificate,

    #[error("timestamp error: {0}")]
    Timestamp(Box<TimeStampError>),
}

impl From<TimeStampError> for EnvelopeError {
    fn from(e: TimeStampError) -> Self {
        Self::Timestamp(Box::new(e))
    }
}

/// How much of an envelope [SignedData::verify] checks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VerifyMode {
    /// Verify signatures and recompute content digests.
    Full,
    /// Verify signatures only. Used when the caller re-derives content
    /// digests itself, as format modules with indirect digests do.
    NoDigests,
}

/// The outcome of verifying one signer of an envelope.
#[derive(Clone, Debug)]
pub struct VerifiedSignature {
    pub digest_algorithm: DigestAlgorithm,
    /// All certificates carried by the envelope.
    pub certificates: Vec<Certificate>,
    /// The certificate that produced the signature.
    pub leaf: Certificate,
    /// The raw signature bytes (EncryptedDigest).
    pub encrypted_digest: Bytes,
    /// Verified timestamp countersignature, when one is attached.
    pub counter_signature: Option<CounterSignature>,
}

/// High-level wrapper over a parsed SignedData envelope.
#[derive(Clone, Debug)]
pub struct SignedData {
    raw: pkcs7::SignedData,
}

impl From<pkcs7::SignedData> for SignedData {
    fn from(raw: pkcs7::SignedData) -> Self {
        Self { raw }
    }
}

impl SignedData {
    /// Parse BER data, with or without the outer id-signedData wrapper.
    pub fn parse_ber(data: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(Self {
            raw: pkcs7::SignedData::decode_ber(data)
                .map_err(|e| EnvelopeError::MalformedEnvelope(e.to_string()))?,
        })
    }

    pub fn as_asn1(&self) -> &pkcs7::SignedData {
        &self.raw
    }

    pub fn into_asn1(self) -> pkcs7::SignedData {
        self.raw
    }

    pub fn certificates(&self) -> &[Certificate] {
        self.raw.certificates.as_deref().unwrap_or(&[])
    }

    pub fn encode_der(&self) -> Vec<u8> {
        self.raw.encode_der()
    }

    /// Write the envelope's DER encoding, outer id-signedData wrapper
    /// included, to a writer.
    pub fn write_der<W: std::io::Write>(&self, writer: &mut W) -> Result<(), EnvelopeError> {
        writer
            .write_all(&self.raw.encode_der())
            .map_err(EnvelopeError::EncodingError)
    }

    /// Verify every signer of the envelope.
    ///
    /// `external_content` supplies the payload for detached envelopes
    /// and overrides any embedded content.
    pub fn verify(
        &self,
        external_content: Option<&[u8]>,
        mode: VerifyMode,
    ) -> Result<Vec<VerifiedSignature>, EnvelopeError> {
        let content = match external_content {
            Some(data) => Some(Bytes::copy_from_slice(data)),
            None => self
                .raw
                .content_info
                .content_octets()
                .map_err(|e| EnvelopeError::MalformedEnvelope(e.to_string()))?,
        };

        self.raw
            .signer_infos
            .iter()
            .map(|signer| self.verify_signer(signer, content.as_deref(), mode))
            .collect()
    }

    fn verify_signer(
        &self,
        signer: &pkcs7::SignerInfo,
        content: Option<&[u8]>,
        mode: VerifyMode,
    ) -> Result<VerifiedSignature, EnvelopeError> {
        let leaf = self
            .certificates()
            .iter()
            .find(|cert| signer.issuer_and_serial_number.identifies(cert))
            .ok_or(EnvelopeError::MissingCertificate)?
            .clone();

        let digest_algorithm =
            DigestAlgorithm::from_algorithm_identifier(&signer.digest_algorithm)?;

        let signature_input = match signer.signed_attributes_digested_content() {
            Some(input) => {
                if mode == VerifyMode::Full {
                    self.check_message_digest(signer, digest_algorithm, content)?;
                }

                input
            }
            None => content.ok_or(EnvelopeError::ContentNotSet)?.to_vec(),
        };

        let verifier = algorithm::verification_algorithm(
            &signer.signature_algorithm.algorithm,
            digest_algorithm,
        )?;
        let encrypted_digest = signer.signature.clone().into_bytes();

        UnparsedPublicKey::new(verifier, leaf.public_key_bits())
            .verify(&signature_input, &encrypted_digest)
            .map_err(|_| EnvelopeError::InvalidSignature)?;

        let counter_signature = verify_optional_timestamp(signer, self.certificates())?;

        Ok(VerifiedSignature {
            digest_algorithm,
            certificates: self.certificates().to_vec(),
            leaf,
            encrypted_digest,
            counter_signature,
        })
    }

    fn check_message_digest(
        &self,
        signer: &pkcs7::SignerInfo,
        digest_algorithm: DigestAlgorithm,
        content: Option<&[u8]>,
    ) -> Result<(), EnvelopeError> {
        let attributes = signer
            .signed_attributes
            .as_ref()
            .ok_or_else(|| EnvelopeError::MalformedEnvelope("signed attributes lost".into()))?;

        let wanted = attributes
            .find(&Oid(Bytes::from_static(OID_MESSAGE_DIGEST.0)))
            .and_then(|attr| attr.values.first())
            .and_then(|value| value.to_octets())
            .ok_or_else(|| {
                EnvelopeError::MalformedEnvelope("message-digest attribute missing".into())
            })?;

        let content = content.ok_or(EnvelopeError::ContentNotSet)?;

        if wanted == digest_algorithm.digest_data(content) {
            Ok(())
        } else {
            Err(EnvelopeError::DigestMismatch)
        }
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::asn1::pkcs7::OID_ID_DATA,
        bcder::Oid,
    };

    fn signed_envelope(payload: &[u8]) -> SignedData {
        let key = InMemorySigningKeyPair::from_pkcs8_pem(testdata::RSA_KEY_PEM).unwrap();
        let certs = vec![Certificate::from_pem(testdata::RSA_CERT_PEM).unwrap()];

        let mut builder = SignatureBuilder::new(&key, certs, DigestAlgorithm::Sha256);
        builder.set_content(
            Oid(Bytes::from_static(OID_ID_DATA.0)),
            Bytes::copy_from_slice(payload),
        );
        builder.signing_time(chrono::Utc::now()).unwrap();

        SignedData::from(builder.sign().unwrap())
    }

    #[test]
    fn verify_round_trip() {
        let envelope = signed_envelope(b"the payload");
        let reparsed = SignedData::parse_ber(&envelope.encode_der()).unwrap();

        let results = reparsed.verify(None, VerifyMode::Full).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].digest_algorithm, DigestAlgorithm::Sha256);
        assert!(results[0].counter_signature.is_none());
    }

    #[test]
    fn tampered_content_detected() {
        let envelope = signed_envelope(b"the payload");
        let reparsed = SignedData::parse_ber(&envelope.encode_der()).unwrap();

        assert!(matches!(
            reparsed.verify(Some(b"not the payload"), VerifyMode::Full),
            Err(EnvelopeError::DigestMismatch)
        ));
    }

    #[test]
    fn no_digests_mode_skips_content_check() {
        let envelope = signed_envelope(b"the payload");
        let reparsed = SignedData::parse_ber(&envelope.encode_der()).unwrap();

        // Signature still verifies; only the digest comparison is skipped.
        reparsed
            .verify(Some(b"not the payload"), VerifyMode::NoDigests)
            .unwrap();
    }

    #[test]
    fn missing_certificate_reported() {
        let envelope = signed_envelope(b"the payload");
        let mut raw = envelope.into_asn1();
        raw.certificates = None;

        assert!(matches!(
            SignedData::from(raw).verify(None, VerifyMode::Full),
            Err(EnvelopeError::MissingCertificate)
        ));
    }

    #[test]
    fn corrupted_signature_detected() {
        let envelope = signed_envelope(b"the payload");
        let mut raw = envelope.into_asn1();

        let mut sig = raw.signer_infos[0].signature.clone().into_bytes().to_vec();
        sig[0] ^= 0xff;
        raw.signer_infos[0].signature = bcder::OctetString::new(Bytes::from(sig));

        assert!(matches!(
            SignedData::from(raw).verify(None, VerifyMode::Full),
            Err(EnvelopeError::InvalidSignature)
        ));
    }

    #[test]
    fn garbage_input_is_malformed() {
        assert!(matches!(
            SignedData::parse_ber(b"not an envelope"),
            Err(EnvelopeError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn write_der_surfaces_writer_errors() {
        let envelope = signed_envelope(b"the payload");

        let mut out = Vec::new();
        envelope.write_der(&mut out).unwrap();
        assert_eq!(out, envelope.encode_der());

        struct FullDisk;

        impl std::io::Write for FullDisk {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        assert!(matches!(
            envelope.write_der(&mut FullDisk),
            Err(EnvelopeError::EncodingError(_))
        ));
    }
}
