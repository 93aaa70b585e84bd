// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Digest, signature, and key algorithm identification.
//!
//! These enums bridge between ASN.1 object identifiers and the `ring`
//! primitives that implement the algorithms. Every mapping is closed:
//! an identifier outside the supported set resolves to
//! [`EnvelopeError::UnsupportedAlgorithm`].

use {
    crate::{asn1::x509::AlgorithmIdentifier, EnvelopeError},
    bcder::{ConstOid, Mode, Oid},
    bytes::Bytes,
    ring::{digest, signature as ringsig},
    std::fmt::{Display, Formatter},
};

/// SHA-1 (1.3.14.3.2.26)
pub const OID_SHA1: ConstOid = Oid(&[43, 14, 3, 2, 26]);

/// SHA-256 (2.16.840.1.101.3.4.2.1)
pub const OID_SHA256: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 1]);

/// SHA-384 (2.16.840.1.101.3.4.2.2)
pub const OID_SHA384: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 2]);

/// SHA-512 (2.16.840.1.101.3.4.2.3)
pub const OID_SHA512: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 3]);

/// RSA encryption (1.2.840.113549.1.1.1)
pub const OID_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 1]);

/// SHA-1 with RSA encryption (1.2.840.113549.1.1.5)
pub const OID_SHA1_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 5]);

/// RSASSA-PSS (1.2.840.113549.1.1.10)
pub const OID_RSA_PSS: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 10]);

/// SHA-256 with RSA encryption (1.2.840.113549.1.1.11)
pub const OID_SHA256_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 11]);

/// SHA-384 with RSA encryption (1.2.840.113549.1.1.12)
pub const OID_SHA384_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 12]);

/// SHA-512 with RSA encryption (1.2.840.113549.1.1.13)
pub const OID_SHA512_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 13]);

/// ECDSA with SHA-256 (1.2.840.10045.4.3.2)
pub const OID_ECDSA_SHA256: ConstOid = Oid(&[42, 134, 72, 206, 61, 4, 3, 2]);

/// ECDSA with SHA-384 (1.2.840.10045.4.3.3)
pub const OID_ECDSA_SHA384: ConstOid = Oid(&[42, 134, 72, 206, 61, 4, 3, 3]);

/// Elliptic curve public key (1.2.840.10045.2.1)
pub const OID_EC_PUBLIC_KEY: ConstOid = Oid(&[42, 134, 72, 206, 61, 2, 1]);

/// Ed25519 (1.3.101.112)
pub const OID_ED25519: ConstOid = Oid(&[43, 101, 112]);

/// secp256r1 / prime256v1 (1.2.840.10045.3.1.7)
pub const OID_EC_SECP256R1: ConstOid = Oid(&[42, 134, 72, 206, 61, 3, 1, 7]);

/// secp384r1 (1.3.132.0.34)
pub const OID_EC_SECP384R1: ConstOid = Oid(&[43, 129, 4, 0, 34]);

/// A digest algorithm in the supported set.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl Display for DigestAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        })
    }
}

impl DigestAlgorithm {
    pub fn as_oid(&self) -> ConstOid {
        match self {
            Self::Sha1 => OID_SHA1,
            Self::Sha256 => OID_SHA256,
            Self::Sha384 => OID_SHA384,
            Self::Sha512 => OID_SHA512,
        }
    }

    /// Resolve from an object identifier.
    pub fn from_oid(oid: &Oid) -> Result<Self, EnvelopeError> {
        if oid == &OID_SHA1 {
            Ok(Self::Sha1)
        } else if oid == &OID_SHA256 {
            Ok(Self::Sha256)
        } else if oid == &OID_SHA384 {
            Ok(Self::Sha384)
        } else if oid == &OID_SHA512 {
            Ok(Self::Sha512)
        } else {
            Err(EnvelopeError::UnsupportedAlgorithm(format!(
                "digest algorithm {}",
                oid
            )))
        }
    }

    pub fn from_algorithm_identifier(alg: &AlgorithmIdentifier) -> Result<Self, EnvelopeError> {
        Self::from_oid(&alg.algorithm)
    }

    pub fn algorithm_identifier(&self) -> AlgorithmIdentifier {
        AlgorithmIdentifier::new_null_params(Oid(Bytes::from_static(self.as_oid().0)))
    }

    /// The size of this hash's output in bytes.
    pub fn hash_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    fn ring_algorithm(&self) -> &'static digest::Algorithm {
        match self {
            Self::Sha1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            Self::Sha256 => &digest::SHA256,
            Self::Sha384 => &digest::SHA384,
            Self::Sha512 => &digest::SHA512,
        }
    }

    /// Obtain an incremental digester.
    pub fn digester(&self) -> digest::Context {
        digest::Context::new(self.ring_algorithm())
    }

    /// Digest a byte slice.
    pub fn digest_data(&self, data: &[u8]) -> Vec<u8> {
        let mut ctx = self.digester();
        ctx.update(data);
        ctx.finish().as_ref().to_vec()
    }
}

/// The padding scheme requested for an RSA signature.
///
/// Probabilistic padding (PSS) is recognized so it can be rejected
/// explicitly: legacy PKCS#7 consumers expect the deterministic
/// PKCS#1 v1.5 structure.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SignatureScheme {
    #[default]
    Pkcs1v15,
    RsaPss,
}

/// A key algorithm in the supported set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyAlgorithm {
    Rsa,
    Ecdsa(EcdsaCurve),
    Ed25519,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EcdsaCurve {
    Secp256r1,
    Secp384r1,
}

impl KeyAlgorithm {
    /// Resolve from a SubjectPublicKeyInfo algorithm identifier.
    pub fn from_algorithm_identifier(alg: &AlgorithmIdentifier) -> Result<Self, EnvelopeError> {
        if alg.algorithm == OID_RSA {
            Ok(Self::Rsa)
        } else if alg.algorithm == OID_EC_PUBLIC_KEY {
            let params = alg.parameters.as_ref().ok_or_else(|| {
                EnvelopeError::UnsupportedAlgorithm("EC key without curve".to_string())
            })?;

            let curve = bcder::decode::Constructed::decode(
                params.as_ref(),
                Mode::Der,
                |cons| Oid::take_from(cons),
            )
            .map_err(|_| {
                EnvelopeError::UnsupportedAlgorithm("malformed EC curve".to_string())
            })?;

            if curve == OID_EC_SECP256R1 {
                Ok(Self::Ecdsa(EcdsaCurve::Secp256r1))
            } else if curve == OID_EC_SECP384R1 {
                Ok(Self::Ecdsa(EcdsaCurve::Secp384r1))
            } else {
                Err(EnvelopeError::UnsupportedAlgorithm(format!(
                    "EC curve {}",
                    curve
                )))
            }
        } else if alg.algorithm == OID_ED25519 {
            Ok(Self::Ed25519)
        } else {
            Err(EnvelopeError::UnsupportedAlgorithm(format!(
                "key algorithm {}",
                alg.algorithm
            )))
        }
    }

    /// The AlgorithmIdentifier written into a SignerInfo's
    /// digestEncryptionAlgorithm field for this key type.
    ///
    /// Classic PKCS#7 names the public key algorithm there, not a
    /// combined signature algorithm.
    pub fn signature_algorithm_identifier(&self) -> AlgorithmIdentifier {
        match self {
            Self::Rsa => {
                AlgorithmIdentifier::new_null_params(Oid(Bytes::from_static(OID_RSA.0)))
            }
            Self::Ecdsa(_) => AlgorithmIdentifier {
                algorithm: Oid(Bytes::from_static(OID_EC_PUBLIC_KEY.0)),
                parameters: None,
            },
            Self::Ed25519 => AlgorithmIdentifier {
                algorithm: Oid(Bytes::from_static(OID_ED25519.0)),
                parameters: None,
            },
        }
    }
}

/// Resolve the `ring` verification algorithm for a SignerInfo.
///
/// `signature_algorithm` is the digestEncryptionAlgorithm identifier
/// from the wire, which different producers fill with either the bare
/// key algorithm or a combined digest+key algorithm; both spellings are
/// accepted. `digest` is the SignerInfo's digest algorithm.
pub fn verification_algorithm(
    signature_algorithm: &Oid,
    digest: DigestAlgorithm,
) -> Result<&'static dyn ringsig::VerificationAlgorithm, EnvelopeError> {
    if signature_algorithm == &OID_RSA
        || signature_algorithm == &OID_SHA1_RSA
        || signature_algorithm == &OID_SHA256_RSA
        || signature_algorithm == &OID_SHA384_RSA
        || signature_algorithm == &OID_SHA512_RSA
    {
        Ok(match digest {
            DigestAlgorithm::Sha1 => &ringsig::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
            DigestAlgorithm::Sha256 => &ringsig::RSA_PKCS1_2048_8192_SHA256,
            DigestAlgorithm::Sha384 => &ringsig::RSA_PKCS1_2048_8192_SHA384,
            DigestAlgorithm::Sha512 => &ringsig::RSA_PKCS1_2048_8192_SHA512,
        })
    } else if signature_algorithm == &OID_EC_PUBLIC_KEY
        || signature_algorithm == &OID_ECDSA_SHA256
        || signature_algorithm == &OID_ECDSA_SHA384
    {
        match digest {
            DigestAlgorithm::Sha256 => Ok(&ringsig::ECDSA_P256_SHA256_ASN1),
            DigestAlgorithm::Sha384 => Ok(&ringsig::ECDSA_P384_SHA384_ASN1),
            _ => Err(EnvelopeError::UnsupportedAlgorithm(format!(
                "ECDSA with {} digest",
                digest
            ))),
        }
    } else if signature_algorithm == &OID_ED25519 {
        Ok(&ringsig::ED25519)
    } else {
        Err(EnvelopeError::UnsupportedAlgorithm(format!(
            "signature algorithm {}",
            signature_algorithm
        )))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn digest_oid_round_trip() {
        for alg in [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ] {
            let ident = alg.algorithm_identifier();
            assert_eq!(DigestAlgorithm::from_algorithm_identifier(&ident).unwrap(), alg);
        }
    }

    #[test]
    fn digest_lengths() {
        assert_eq!(DigestAlgorithm::Sha1.digest_data(b"x").len(), 20);
        assert_eq!(DigestAlgorithm::Sha256.digest_data(b"x").len(), 32);
        assert_eq!(DigestAlgorithm::Sha384.digest_data(b"x").len(), 48);
        assert_eq!(DigestAlgorithm::Sha512.digest_data(b"x").len(), 64);
    }

    #[test]
    fn unknown_digest_oid_rejected() {
        let ident = AlgorithmIdentifier::new_null_params(Oid(Bytes::from_static(OID_RSA.0)));
        assert!(matches!(
            DigestAlgorithm::from_algorithm_identifier(&ident),
            Err(EnvelopeError::UnsupportedAlgorithm(_))
        ));
    }
}
