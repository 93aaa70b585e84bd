// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Private keys capable of producing signatures.

use {
    crate::{
        algorithm::{DigestAlgorithm, EcdsaCurve, KeyAlgorithm, SignatureScheme},
        asn1::x509::AlgorithmIdentifier,
        EnvelopeError,
    },
    bcder::{decode::Constructed, Integer, Mode},
    bytes::Bytes,
    ring::{
        rand::SystemRandom,
        signature::{self as ringsig, KeyPair},
    },
    signature::{Signature as SignatureTrait, Signer},
};

/// An entity that can sign messages on behalf of a certificate.
///
/// The message is digested by the implementation. `digest` selects the
/// hash folded into the signature; `scheme` selects the RSA padding
/// mode and is ignored for non-RSA keys.
pub trait SigningKey {
    /// The algorithm of the private key.
    fn key_algorithm(&self) -> KeyAlgorithm;

    /// The raw public key bytes, as they appear in the subjectPublicKey
    /// BIT STRING of an X.509 certificate holding this key.
    fn public_key_data(&self) -> Bytes;

    /// Sign a message.
    fn sign_message(
        &self,
        message: &[u8],
        digest: DigestAlgorithm,
        scheme: SignatureScheme,
    ) -> Result<Vec<u8>, EnvelopeError>;
}

#[derive(Clone)]
pub struct Signature(Vec<u8>);

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Signature({})", hex::encode(&self.0)))
    }
}

impl From<Vec<u8>> for Signature {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl From<Signature> for Vec<u8> {
    fn from(v: Signature) -> Vec<u8> {
        v.0
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl SignatureTrait for Signature {
    fn from_bytes(bytes: &[u8]) -> Result<Self, signature::Error> {
        Ok(Self(bytes.to_vec()))
    }
}

/// A key pair loaded into memory.
///
/// This wraps ring's key pair types behind [SigningKey].
#[derive(Debug)]
pub enum InMemorySigningKeyPair {
    Ecdsa(ringsig::EcdsaKeyPair, EcdsaCurve),
    Ed25519(ringsig::Ed25519KeyPair),
    Rsa(ringsig::RsaKeyPair),
}

impl InMemorySigningKeyPair {
    /// Instantiate from DER PKCS#8 (a PrivateKeyInfo structure).
    pub fn from_pkcs8_der(data: impl AsRef<[u8]>) -> Result<Self, EnvelopeError> {
        // Parse enough of the PKCS#8 to learn the key type before ring
        // consumes it.
        let algorithm = Constructed::decode(data.as_ref(), Mode::Der, |cons| {
            cons.take_sequence(|cons| {
                Integer::take_from(cons)?;
                let algorithm = AlgorithmIdentifier::take_from(cons)?;
                cons.capture_all()?;
                Ok(algorithm)
            })
        })?;

        match KeyAlgorithm::from_algorithm_identifier(&algorithm)? {
            KeyAlgorithm::Rsa => {
                let pair = ringsig::RsaKeyPair::from_pkcs8(data.as_ref())
                    .map_err(|e| EnvelopeError::KeyRejected(e.to_string()))?;

                Ok(Self::Rsa(pair))
            }
            KeyAlgorithm::Ecdsa(curve) => {
                let pair = ringsig::EcdsaKeyPair::from_pkcs8(curve.into(), data.as_ref())
                    .map_err(|e| EnvelopeError::KeyRejected(e.to_string()))?;

                Ok(Self::Ecdsa(pair, curve))
            }
            KeyAlgorithm::Ed25519 => {
                let pair = ringsig::Ed25519KeyPair::from_pkcs8(data.as_ref())
                    .map_err(|e| EnvelopeError::KeyRejected(e.to_string()))?;

                Ok(Self::Ed25519(pair))
            }
        }
    }

    /// Instantiate from PEM encoded PKCS#8.
    pub fn from_pkcs8_pem(data: impl AsRef<[u8]>) -> Result<Self, EnvelopeError> {
        let der = pem::parse(data.as_ref())?;

        Self::from_pkcs8_der(&der.contents)
    }

    /// Generate a random key pair.
    ///
    /// RSA generation is not exposed by ring and is refused.
    pub fn generate_random(
        key_algorithm: KeyAlgorithm,
    ) -> Result<(Self, ring::pkcs8::Document), EnvelopeError> {
        let rng = SystemRandom::new();

        let document = match key_algorithm {
            KeyAlgorithm::Ed25519 => ringsig::Ed25519KeyPair::generate_pkcs8(&rng)
                .map_err(|_| EnvelopeError::KeyPairGeneration),
            KeyAlgorithm::Ecdsa(curve) => {
                ringsig::EcdsaKeyPair::generate_pkcs8(curve.into(), &rng)
                    .map_err(|_| EnvelopeError::KeyPairGeneration)
            }
            KeyAlgorithm::Rsa => Err(EnvelopeError::NotImplemented("RSA key generation")),
        }?;

        let key_pair = Self::from_pkcs8_der(document.as_ref())?;

        Ok((key_pair, document))
    }
}

impl SigningKey for InMemorySigningKeyPair {
    fn key_algorithm(&self) -> KeyAlgorithm {
        match self {
            Self::Rsa(_) => KeyAlgorithm::Rsa,
            Self::Ecdsa(_, curve) => KeyAlgorithm::Ecdsa(*curve),
            Self::Ed25519(_) => KeyAlgorithm::Ed25519,
        }
    }

    fn public_key_data(&self) -> Bytes {
        match self {
            Self::Rsa(key) => Bytes::copy_from_slice(key.public_key().as_ref()),
            Self::Ecdsa(key, _) => Bytes::copy_from_slice(key.public_key().as_ref()),
            Self::Ed25519(key) => Bytes::copy_from_slice(key.public_key().as_ref()),
        }
    }

    fn sign_message(
        &self,
        message: &[u8],
        digest: DigestAlgorithm,
        scheme: SignatureScheme,
    ) -> Result<Vec<u8>, EnvelopeError> {
        if scheme == SignatureScheme::RsaPss {
            return Err(EnvelopeError::NotImplemented("RSASSA-PSS signatures"));
        }

        match self {
            Self::Rsa(key) => {
                let padding: &'static dyn ringsig::RsaEncoding = match digest {
                    DigestAlgorithm::Sha256 => &ringsig::RSA_PKCS1_SHA256,
                    DigestAlgorithm::Sha384 => &ringsig::RSA_PKCS1_SHA384,
                    DigestAlgorithm::Sha512 => &ringsig::RSA_PKCS1_SHA512,
                    DigestAlgorithm::Sha1 => {
                        return Err(EnvelopeError::UnsupportedAlgorithm(
                            "RSA signing with SHA-1".to_string(),
                        ));
                    }
                };

                let mut signature = vec![0; key.public_modulus_len()];

                key.sign(padding, &SystemRandom::new(), message, &mut signature)
                    .map_err(|_| EnvelopeError::SignatureCreation)?;

                Ok(signature)
            }
            Self::Ecdsa(key, curve) => {
                // ring binds each curve to one digest and refuses other
                // pairings.
                let supported = match curve {
                    EcdsaCurve::Secp256r1 => DigestAlgorithm::Sha256,
                    EcdsaCurve::Secp384r1 => DigestAlgorithm::Sha384,
                };

                if digest != supported {
                    return Err(EnvelopeError::UnsupportedAlgorithm(format!(
                        "ECDSA {:?} with {} digest",
                        curve, digest
                    )));
                }

                let signature = key
                    .sign(&SystemRandom::new(), message)
                    .map_err(|_| EnvelopeError::SignatureCreation)?;

                Ok(signature.as_ref().to_vec())
            }
            Self::Ed25519(key) => Ok(key.sign(message).as_ref().to_vec()),
        }
    }
}

impl Signer<Signature> for InMemorySigningKeyPair {
    fn try_sign(&self, msg: &[u8]) -> Result<Signature, signature::Error> {
        let digest = match self {
            Self::Ecdsa(_, EcdsaCurve::Secp384r1) => DigestAlgorithm::Sha384,
            _ => DigestAlgorithm::Sha256,
        };

        self.sign_message(msg, digest, SignatureScheme::Pkcs1v15)
            .map(Signature::from)
            .map_err(|_| signature::Error::new())
    }
}

impl From<EcdsaCurve> for &'static ringsig::EcdsaSigningAlgorithm {
    fn from(curve: EcdsaCurve) -> Self {
        match curve {
            EcdsaCurve::Secp256r1 => &ringsig::ECDSA_P256_SHA256_ASN1_SIGNING,
            EcdsaCurve::Secp384r1 => &ringsig::ECDSA_P384_SHA384_ASN1_SIGNING,
        }
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{asn1::x509::Certificate, testdata},
        ringsig::UnparsedPublicKey,
    };

    #[test]
    fn rsa_signing_round_trip() {
        let key = InMemorySigningKeyPair::from_pkcs8_pem(testdata::RSA_KEY_PEM).unwrap();
        let cert = Certificate::from_pem(testdata::RSA_CERT_PEM).unwrap();
        let message = b"hello, world";

        assert_eq!(key.public_key_data(), cert.public_key_bits());

        let signature = key
            .sign_message(message, DigestAlgorithm::Sha256, SignatureScheme::Pkcs1v15)
            .unwrap();

        UnparsedPublicKey::new(&ringsig::RSA_PKCS1_2048_8192_SHA256, cert.public_key_bits())
            .verify(message, &signature)
            .unwrap();
    }

    #[test]
    fn ecdsa_signing_round_trip() {
        let key = InMemorySigningKeyPair::from_pkcs8_pem(testdata::EC_KEY_PEM).unwrap();
        let cert = Certificate::from_pem(testdata::EC_CERT_PEM).unwrap();
        let message = b"hello, world";

        assert_eq!(key.public_key_data(), cert.public_key_bits());

        let signature = key
            .sign_message(message, DigestAlgorithm::Sha256, SignatureScheme::Pkcs1v15)
            .unwrap();

        UnparsedPublicKey::new(&ringsig::ECDSA_P256_SHA256_ASN1, cert.public_key_bits())
            .verify(message, &signature)
            .unwrap();
    }

    #[test]
    fn pss_scheme_refused() {
        let key = InMemorySigningKeyPair::from_pkcs8_pem(testdata::RSA_KEY_PEM).unwrap();

        assert!(matches!(
            key.sign_message(b"x", DigestAlgorithm::Sha256, SignatureScheme::RsaPss),
            Err(EnvelopeError::NotImplemented(_))
        ));
    }

    #[test]
    fn generate_random_ed25519() {
        let (key, _) = InMemorySigningKeyPair::generate_random(KeyAlgorithm::Ed25519).unwrap();
        let signature = key
            .sign_message(b"msg", DigestAlgorithm::Sha256, SignatureScheme::Pkcs1v15)
            .unwrap();

        UnparsedPublicKey::new(&ringsig::ED25519, key.public_key_data())
            .verify(b"msg", &signature)
            .unwrap();
    }

    #[test]
    fn ecdsa_digest_mismatch_refused() {
        let key = InMemorySigningKeyPair::from_pkcs8_pem(testdata::EC_KEY_PEM).unwrap();

        assert!(matches!(
            key.sign_message(b"x", DigestAlgorithm::Sha384, SignatureScheme::Pkcs1v15),
            Err(EnvelopeError::UnsupportedAlgorithm(_))
        ));
    }
}
