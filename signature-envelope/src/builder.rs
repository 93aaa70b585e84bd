// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Building PKCS#7 SignedData envelopes.

use {
    crate::{
        algorithm::{DigestAlgorithm, SignatureScheme},
        asn1::{
            pkcs7::{
                set_of_wrapped, Attribute, AttributeValue, Attributes, ContentInfo,
                IssuerAndSerialNumber, SignedData, SignerInfo, OID_CONTENT_TYPE,
                OID_ID_DATA, OID_MESSAGE_DIGEST, OID_SIGNING_TIME,
            },
            time::UtcTime,
            x509::Certificate,
        },
        signing::SigningKey,
        EnvelopeError,
    },
    bcder::{encode::PrimitiveContent, Captured, Mode, OctetString, Oid},
    bytes::Bytes,
    chrono::{DateTime, Utc},
};

enum Content {
    /// Payload embedded in the envelope.
    Embedded(Bytes),
    /// Payload kept external; only its digest is known.
    DetachedDigest(Vec<u8>),
}

/// Builds a single-signer SignedData envelope.
///
/// The leaf certificate is `certificates[0]`; it must hold the public
/// half of `signing_key`, which is checked before any signing happens.
pub struct SignatureBuilder<'a> {
    signing_key: &'a dyn SigningKey,
    certificates: Vec<Certificate>,
    digest_algorithm: DigestAlgorithm,
    scheme: SignatureScheme,
    content_type: Oid,
    content: Option<Content>,
    authenticated_attributes: Vec<Attribute>,
}

impl<'a> SignatureBuilder<'a> {
    pub fn new(
        signing_key: &'a dyn SigningKey,
        certificates: Vec<Certificate>,
        digest_algorithm: DigestAlgorithm,
    ) -> Self {
        Self {
            signing_key,
            certificates,
            digest_algorithm,
            scheme: SignatureScheme::default(),
            content_type: Oid(Bytes::from_static(OID_ID_DATA.0)),
            content: None,
            authenticated_attributes: Vec::new(),
        }
    }

    /// Select the RSA padding scheme. Only PKCS#1 v1.5 is implemented;
    /// requesting PSS makes [`Self::sign`] fail with `NotImplemented`.
    pub fn signature_scheme(mut self, scheme: SignatureScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Embed a payload in the envelope.
    pub fn set_content(&mut self, content_type: Oid, data: Bytes) {
        self.content_type = content_type;
        self.content = Some(Content::Embedded(data));
    }

    /// Sign a payload that stays outside the envelope, supplying its
    /// precomputed digest under the builder's digest algorithm.
    pub fn set_detached_content(
        &mut self,
        content_type: Oid,
        digest: Vec<u8>,
    ) -> Result<(), EnvelopeError> {
        if digest.len() != self.digest_algorithm.hash_len() {
            return Err(EnvelopeError::DigestSizeMismatch {
                digest: self.digest_algorithm,
                got: digest.len(),
                want: self.digest_algorithm.hash_len(),
            });
        }

        self.content_type = content_type;
        self.content = Some(Content::DetachedDigest(digest));

        Ok(())
    }

    /// Add an authenticated attribute with a DER-encoded value.
    ///
    /// content-type and message-digest are managed by the builder and
    /// refused here, as is any attribute type already added.
    pub fn add_authenticated_attribute(
        &mut self,
        typ: Oid,
        value: Bytes,
    ) -> Result<(), EnvelopeError> {
        if typ == OID_CONTENT_TYPE
            || typ == OID_MESSAGE_DIGEST
            || self.authenticated_attributes.iter().any(|a| a.typ == typ)
        {
            return Err(EnvelopeError::DuplicateAttribute(typ.to_string()));
        }

        self.authenticated_attributes.push(Attribute {
            typ,
            values: vec![AttributeValue::from_der(value)],
        });

        Ok(())
    }

    /// Add a PKCS#9 signing-time attribute.
    pub fn signing_time(&mut self, time: DateTime<Utc>) -> Result<(), EnvelopeError> {
        let value = AttributeValue::from_values(UtcTime::from(time).encode());

        self.add_authenticated_attribute(
            Oid(Bytes::from_static(OID_SIGNING_TIME.0)),
            Bytes::copy_from_slice(value.as_der()),
        )
    }

    /// Produce the signed envelope.
    pub fn sign(self) -> Result<SignedData, EnvelopeError> {
        let content = self.content.as_ref().ok_or(EnvelopeError::ContentNotSet)?;

        if self.scheme == SignatureScheme::RsaPss {
            return Err(EnvelopeError::NotImplemented("RSASSA-PSS signatures"));
        }

        let leaf = self
            .certificates
            .first()
            .ok_or(EnvelopeError::MissingCertificate)?;

        if leaf.public_key_bits() != self.signing_key.public_key_data() {
            return Err(EnvelopeError::CertificateKeyMismatch);
        }

        let content_digest = match content {
            Content::Embedded(data) => self.digest_algorithm.digest_data(data),
            Content::DetachedDigest(digest) => digest.clone(),
        };

        // Detached signing always carries authenticated attributes: with
        // only a digest in hand, the message-digest attribute is the sole
        // place the payload can be bound to the signature.
        let use_attributes = !self.authenticated_attributes.is_empty()
            || matches!(content, Content::DetachedDigest(_));

        let (signature_input, attributes) = if use_attributes {
            let mut attrs = self.authenticated_attributes.clone();

            attrs.push(Attribute {
                typ: Oid(Bytes::from_static(OID_CONTENT_TYPE.0)),
                values: vec![AttributeValue::from_values(self.content_type.encode_ref())],
            });
            attrs.push(Attribute {
                typ: Oid(Bytes::from_static(OID_MESSAGE_DIGEST.0)),
                values: vec![AttributeValue::from_values(
                    OctetString::new(Bytes::copy_from_slice(&content_digest)).encode(),
                )],
            });

            let attributes = Attributes(attrs);
            let input = set_of_wrapped(&attributes.to_sorted_der_content());

            (input, Some(attributes))
        } else {
            match content {
                Content::Embedded(data) => (data.to_vec(), None),
                Content::DetachedDigest(_) => unreachable!("detached content forces attributes"),
            }
        };

        let signature =
            self.signing_key
                .sign_message(&signature_input, self.digest_algorithm, self.scheme)?;

        let mut signer_info = SignerInfo::new(
            IssuerAndSerialNumber {
                issuer: leaf.issuer.clone(),
                serial_number: leaf.serial_number.clone(),
            },
            self.digest_algorithm.algorithm_identifier(),
            self.signing_key
                .key_algorithm()
                .signature_algorithm_identifier(),
            Bytes::from(signature),
        );

        if let Some(attributes) = attributes {
            signer_info.set_signed_attributes(attributes);
        }

        let content_info = ContentInfo {
            content_type: self.content_type.clone(),
            content: match content {
                Content::Embedded(data) => {
                    let captured = Captured::from_values(
                        Mode::Der,
                        OctetString::new(data.clone()).encode(),
                    );
                    Some(Bytes::copy_from_slice(captured.as_slice()))
                }
                Content::DetachedDigest(_) => None,
            },
        };

        Ok(SignedData {
            version: crate::asn1::pkcs7::CmsVersion::V1,
            digest_algorithms: vec![self.digest_algorithm.algorithm_identifier()],
            content_info,
            certificates: Some(self.certificates.clone()),
            signer_infos: vec![signer_info],
        })
    }
}
