// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PKCS#7 / CMS SignedData types.
//!
//! The subset implemented here is what single-signer code signing
//! envelopes use: SignedData version 1, issuerAndSerialNumber signer
//! identification, optional signed and unsigned attributes.
//!
//! The signed attributes carry a wire subtlety that this module is very
//! deliberate about: they are transmitted under an IMPLICIT `[0]` tag but
//! the signature is computed over their encoding under the universal
//! SET OF tag (0x31). The raw attribute bytes are therefore retained
//! exactly as parsed (or as built) and re-tagged, never re-encoded, when
//! producing the signature input.

use {
    crate::asn1::{
        split_der_values,
        time::Time,
        x509::{AlgorithmIdentifier, Certificate, Name},
        PreEncoded,
    },
    bcder::{
        decode::{Constructed, DecodeError, Source},
        encode::{self, PrimitiveContent, Values},
        Captured, ConstOid, Integer, Mode, OctetString, Oid, Tag,
    },
    bytes::Bytes,
};

/// id-data (1.2.840.113549.1.7.1)
pub const OID_ID_DATA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 7, 1]);

/// id-signedData (1.2.840.113549.1.7.2)
pub const OID_ID_SIGNED_DATA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 7, 2]);

/// Content-type attribute (1.2.840.113549.1.9.3)
pub const OID_CONTENT_TYPE: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 3]);

/// Message-digest attribute (1.2.840.113549.1.9.4)
pub const OID_MESSAGE_DIGEST: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 4]);

/// Signing-time attribute (1.2.840.113549.1.9.5)
pub const OID_SIGNING_TIME: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 5]);

/// Countersignature attribute (1.2.840.113549.1.9.6)
pub const OID_COUNTER_SIGNATURE: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 6]);

/// ContentInfo.
///
/// ```ASN.1
/// ContentInfo ::= SEQUENCE {
///     contentType  OBJECT IDENTIFIER,
///     content      [0] EXPLICIT ANY DEFINED BY contentType OPTIONAL }
/// ```
///
/// The content is kept as the raw DER of the inner value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContentInfo {
    pub content_type: Oid,
    pub content: Option<Bytes>,
}

impl ContentInfo {
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
        let content_type = Oid::take_from(cons)?;
        let content = cons
            .take_opt_constructed_if(Tag::CTX_0, |cons| cons.capture_all())?
            .map(|captured| Bytes::copy_from_slice(captured.as_slice()));

        Ok(Self {
            content_type,
            content,
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.content_type.encode_ref(),
            self.content
                .as_ref()
                .map(|content| PreEncoded(content.clone()).explicit(Tag::CTX_0)),
        ))
    }

    /// The octets of the payload when the content is an OCTET STRING.
    ///
    /// This is the digest input for id-data content per the RFC 5652
    /// rule: the digest is computed over the value octets, excluding the
    /// tag and length.
    pub fn content_octets(&self) -> Result<Option<Bytes>, DecodeError<std::convert::Infallible>>
    {
        match &self.content {
            Some(data) => Constructed::decode(data.as_ref(), Mode::Ber, |cons| {
                OctetString::take_from(cons)
            })
            .map(|os| Some(os.into_bytes())),
            None => Ok(None),
        }
    }
}

/// CMS structure version.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CmsVersion {
    V0 = 0,
    V1 = 1,
    V2 = 2,
    V3 = 3,
    V4 = 4,
    V5 = 5,
}

impl CmsVersion {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        match cons.take_primitive_if(Tag::INTEGER, Integer::i8_from_primitive)? {
            0 => Ok(Self::V0),
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            3 => Ok(Self::V3),
            4 => Ok(Self::V4),
            5 => Ok(Self::V5),
            _ => Err(cons.content_err("unknown CMS version")),
        }
    }

    pub fn encode(self) -> impl Values {
        u8::from(self).encode()
    }
}

impl From<CmsVersion> for u8 {
    fn from(v: CmsVersion) -> u8 {
        match v {
            CmsVersion::V0 => 0,
            CmsVersion::V1 => 1,
            CmsVersion::V2 => 2,
            CmsVersion::V3 => 3,
            CmsVersion::V4 => 4,
            CmsVersion::V5 => 5,
        }
    }
}

/// SignedData.
///
/// ```ASN.1
/// SignedData ::= SEQUENCE {
///     version           INTEGER,
///     digestAlgorithms  SET OF AlgorithmIdentifier,
///     contentInfo       ContentInfo,
///     certificates      [0] IMPLICIT SET OF Certificate OPTIONAL,
///     crls              [1] IMPLICIT SET OF CertificateList OPTIONAL,
///     signerInfos       SET OF SignerInfo }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignedData {
    pub version: CmsVersion,
    pub digest_algorithms: Vec<AlgorithmIdentifier>,
    pub content_info: ContentInfo,
    pub certificates: Option<Vec<Certificate>>,
    pub signer_infos: Vec<SignerInfo>,
}

impl SignedData {
    /// Parse BER data, accepting either a bare SignedData or one wrapped
    /// in the outer id-signedData ContentInfo.
    pub fn decode_ber(data: &[u8]) -> Result<Self, DecodeError<std::convert::Infallible>> {
        Constructed::decode(data, Mode::Ber, |cons| {
            cons.take_sequence(|cons| {
                if let Some(oid) = Oid::take_opt_from(cons)? {
                    if oid != OID_ID_SIGNED_DATA {
                        return Err(cons.content_err("not an id-signedData envelope"));
                    }

                    cons.take_constructed_if(Tag::CTX_0, |cons| {
                        cons.take_sequence(Self::from_sequence)
                    })
                } else {
                    Self::from_sequence(cons)
                }
            })
        })
    }

    pub fn from_sequence<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let version = CmsVersion::take_from(cons)?;

        let digest_algorithms = cons.take_set(|cons| {
            let mut algorithms = Vec::new();
            while let Some(alg) = AlgorithmIdentifier::take_opt_from(cons)? {
                algorithms.push(alg);
            }
            Ok(algorithms)
        })?;

        let content_info = ContentInfo::take_from(cons)?;

        let certificates = cons.take_opt_constructed_if(Tag::CTX_0, |cons| {
            let mut certificates = Vec::new();
            while let Some(cert) = Certificate::take_opt_from(cons)? {
                certificates.push(cert);
            }
            Ok(certificates)
        })?;

        // CRLs are not processed.
        cons.take_opt_constructed_if(Tag::CTX_1, |cons| cons.capture_all())?;

        let signer_infos = cons.take_set(|cons| {
            let mut signer_infos = Vec::new();
            while let Some(signer_info) = SignerInfo::take_opt_from(cons)? {
                signer_infos.push(signer_info);
            }
            Ok(signer_infos)
        })?;

        Ok(Self {
            version,
            digest_algorithms,
            content_info,
            certificates,
            signer_infos,
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.version.encode(),
            encode::set(encode::slice(&self.digest_algorithms, |alg| {
                alg.clone().encode()
            })),
            self.content_info.encode_ref(),
            self.certificates
                .as_ref()
                .map(|certs| encode::sequence_as(Tag::CTX_0, certs)),
            encode::set(encode::slice(&self.signer_infos, |si| si.clone().encode())),
        ))
    }

    /// DER of this structure wrapped in the outer id-signedData
    /// ContentInfo, the form written to files and wires.
    pub fn encode_der(&self) -> Vec<u8> {
        let captured = Captured::from_values(
            Mode::Der,
            encode::sequence((
                OID_ID_SIGNED_DATA.encode_ref(),
                self.encode_ref().explicit(Tag::CTX_0),
            )),
        );

        captured.as_slice().to_vec()
    }
}

/// IssuerAndSerialNumber.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IssuerAndSerialNumber {
    pub issuer: Name,
    pub serial_number: Integer,
}

impl IssuerAndSerialNumber {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let issuer = Name::take_from(cons)?;
            let serial_number = Integer::take_from(cons)?;

            Ok(Self {
                issuer,
                serial_number,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((self.issuer.encode_ref(), (&self.serial_number).encode()))
    }

    pub fn encode(self) -> impl Values {
        Captured::from_values(Mode::Der, self.encode_ref())
    }

    /// Whether this reference identifies the given certificate.
    pub fn identifies(&self, cert: &Certificate) -> bool {
        self.issuer == cert.issuer && self.serial_number == cert.serial_number
    }
}

/// A single attribute value, kept as its raw DER encoding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttributeValue(Bytes);

impl AttributeValue {
    pub fn from_values<V: Values>(values: V) -> Self {
        let captured = Captured::from_values(Mode::Der, values);
        Self(Bytes::copy_from_slice(captured.as_slice()))
    }

    pub fn from_der(data: Bytes) -> Self {
        Self(data)
    }

    pub fn as_der(&self) -> &[u8] {
        &self.0
    }

    /// Decode the value as an OCTET STRING.
    pub fn to_octets(&self) -> Option<Bytes> {
        Constructed::decode(self.0.as_ref(), Mode::Ber, |cons| OctetString::take_from(cons))
            .ok()
            .map(|os| os.into_bytes())
    }

    /// Decode the value as an OBJECT IDENTIFIER.
    pub fn to_oid(&self) -> Option<Oid> {
        Constructed::decode(self.0.as_ref(), Mode::Ber, |cons| Oid::take_from(cons)).ok()
    }

    /// Decode the value as a Time.
    pub fn to_time(&self) -> Option<Time> {
        Constructed::decode(self.0.as_ref(), Mode::Ber, |cons| Time::take_from(cons)).ok()
    }
}

impl Values for AttributeValue {
    fn encoded_len(&self, _: Mode) -> usize {
        self.0.len()
    }

    fn write_encoded<W: std::io::Write>(
        &self,
        _: Mode,
        target: &mut W,
    ) -> Result<(), std::io::Error> {
        target.write_all(&self.0)
    }
}

/// Attribute.
///
/// ```ASN.1
/// Attribute ::= SEQUENCE {
///     attrType    OBJECT IDENTIFIER,
///     attrValues  SET OF AttributeValue }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    pub typ: Oid,
    pub values: Vec<AttributeValue>,
}

impl Attribute {
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| {
            let typ = Oid::take_from(cons)?;

            let values = cons.take_set(|cons| {
                let captured = cons.capture_all()?;
                split_der_values(captured.as_slice())
                    .map(|values| values.into_iter().map(AttributeValue::from_der).collect())
                    .ok_or_else(|| cons.content_err("malformed attribute values"))
            })?;

            Ok(Self { typ, values })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((self.typ.encode_ref(), encode::set(&self.values)))
    }

    pub fn encode(self) -> impl Values {
        encode::sequence((self.typ.encode(), encode::set(self.values)))
    }

    /// The attribute's complete DER encoding.
    pub fn to_der(&self) -> Bytes {
        let captured = Captured::from_values(Mode::Der, self.encode_ref());
        Bytes::copy_from_slice(captured.as_slice())
    }
}

/// A collection of attributes, as found in signedAttrs or unsignedAttrs.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Attributes(pub Vec<Attribute>);

impl Attributes {
    /// Parse from a raw concatenation of Attribute TLVs.
    pub fn from_der_content(data: &[u8]) -> Result<Self, DecodeError<std::convert::Infallible>> {
        Constructed::decode(data, Mode::Ber, |cons| {
            let mut attributes = Vec::new();
            while let Some(attribute) = Attribute::take_opt_from(cons)? {
                attributes.push(attribute);
            }
            Ok(Self(attributes))
        })
    }

    pub fn find(&self, oid: &Oid) -> Option<&Attribute> {
        self.0.iter().find(|attr| &attr.typ == oid)
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.find(oid).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode under a replacement (implicit context) tag.
    pub fn encode_as(self, tag: Tag) -> impl Values {
        let values = self
            .0
            .into_iter()
            .map(|attr| AttributeValue::from_der(attr.to_der()))
            .collect::<Vec<_>>();

        encode::set_as(tag, values)
    }

    /// DER-encode every attribute and concatenate in ascending byte order
    /// of the encodings, the SET OF ordering DER requires. This is the
    /// content over which signatures are computed.
    pub fn to_sorted_der_content(&self) -> Bytes {
        let mut encoded = self.0.iter().map(|attr| attr.to_der()).collect::<Vec<_>>();
        encoded.sort();

        let mut out = Vec::new();
        for der in encoded {
            out.extend_from_slice(&der);
        }

        Bytes::from(out)
    }
}

/// Encodes a DER definite length.
fn push_der_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else if len < 0x100 {
        out.push(0x81);
        out.push(len as u8);
    } else if len < 0x10000 {
        out.push(0x82);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    } else if len < 0x1000000 {
        out.push(0x83);
        out.push((len >> 16) as u8);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    } else {
        out.push(0x84);
        out.push((len >> 24) as u8);
        out.push((len >> 16) as u8);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    }
}

/// Wraps raw attribute content bytes in the universal SET OF tag.
pub(crate) fn set_of_wrapped(content: &[u8]) -> Vec<u8> {
    let mut out = vec![0x31];
    push_der_length(&mut out, content.len());
    out.extend_from_slice(content);
    out
}

/// SignerInfo.
///
/// ```ASN.1
/// SignerInfo ::= SEQUENCE {
///     version                    INTEGER,
///     issuerAndSerialNumber      IssuerAndSerialNumber,
///     digestAlgorithm            AlgorithmIdentifier,
///     authenticatedAttributes    [0] IMPLICIT Attributes OPTIONAL,
///     digestEncryptionAlgorithm  AlgorithmIdentifier,
///     encryptedDigest            OCTET STRING,
///     unauthenticatedAttributes  [1] IMPLICIT Attributes OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignerInfo {
    pub version: CmsVersion,
    pub issuer_and_serial_number: IssuerAndSerialNumber,
    pub digest_algorithm: AlgorithmIdentifier,
    /// Parsed signed attributes, for lookups.
    pub signed_attributes: Option<Attributes>,
    /// The raw attribute TLVs, byte for byte as parsed or as built.
    /// Emission and signature-input construction both use these bytes.
    signed_attributes_data: Option<Bytes>,
    pub signature_algorithm: AlgorithmIdentifier,
    pub signature: OctetString,
    pub unsigned_attributes: Option<Attributes>,
}

impl SignerInfo {
    /// Construct a SignerInfo with no attributes; the builder fills in
    /// attribute state via [`Self::set_signed_attributes`].
    pub fn new(
        issuer_and_serial_number: IssuerAndSerialNumber,
        digest_algorithm: AlgorithmIdentifier,
        signature_algorithm: AlgorithmIdentifier,
        signature: Bytes,
    ) -> Self {
        Self {
            version: CmsVersion::V1,
            issuer_and_serial_number,
            digest_algorithm,
            signed_attributes: None,
            signed_attributes_data: None,
            signature_algorithm,
            signature: OctetString::new(signature),
            unsigned_attributes: None,
        }
    }

    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| {
            let version = CmsVersion::take_from(cons)?;
            let issuer_and_serial_number = IssuerAndSerialNumber::take_from(cons)?;
            let digest_algorithm = AlgorithmIdentifier::take_from(cons)?;

            let signed_attributes_data = cons
                .take_opt_constructed_if(Tag::CTX_0, |cons| cons.capture_all())?
                .map(|captured| Bytes::copy_from_slice(captured.as_slice()));

            let signed_attributes = match &signed_attributes_data {
                Some(data) => Some(
                    Attributes::from_der_content(data)
                        .map_err(|_| cons.content_err("malformed signed attributes"))?,
                ),
                None => None,
            };

            let signature_algorithm = AlgorithmIdentifier::take_from(cons)?;
            let signature = OctetString::take_from(cons)?;

            let unsigned_attributes = cons
                .take_opt_constructed_if(Tag::CTX_1, |cons| {
                    let captured = cons.capture_all()?;
                    Attributes::from_der_content(captured.as_slice())
                        .map_err(|_| cons.content_err("malformed unsigned attributes"))
                })?;

            Ok(Self {
                version,
                issuer_and_serial_number,
                digest_algorithm,
                signed_attributes,
                signed_attributes_data,
                signature_algorithm,
                signature,
                unsigned_attributes,
            })
        })
    }

    /// Install signed attributes. Their serialization is fixed (sorted)
    /// here, once, so that the bytes signed and the bytes emitted cannot
    /// diverge.
    pub fn set_signed_attributes(&mut self, attributes: Attributes) {
        self.signed_attributes_data = Some(attributes.to_sorted_der_content());
        self.signed_attributes = Some(attributes);
    }

    /// Add an unsigned attribute. Unsigned attributes are outside the
    /// signature, so they may be added after signing.
    pub fn add_unsigned_attribute(&mut self, attribute: Attribute) {
        self.unsigned_attributes
            .get_or_insert_with(Attributes::default)
            .0
            .push(attribute);
    }

    /// The signature input when signed attributes are present: the raw
    /// attribute bytes re-tagged from IMPLICIT `[0]` to the universal
    /// SET OF tag. Returns `None` when there are no signed attributes
    /// (in which case the signature covers the content digest directly).
    pub fn signed_attributes_digested_content(&self) -> Option<Vec<u8>> {
        self.signed_attributes_data
            .as_ref()
            .map(|data| set_of_wrapped(data))
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.version.encode(),
            self.issuer_and_serial_number.encode_ref(),
            self.digest_algorithm.encode_ref(),
            self.signed_attributes_data
                .as_ref()
                .map(|data| encode::sequence_as(Tag::CTX_0, PreEncoded(data.clone()))),
            self.signature_algorithm.encode_ref(),
            self.signature.encode_ref(),
            self.unsigned_attributes.as_ref().map(|attrs| {
                encode::set_as(
                    Tag::CTX_1,
                    encode::slice(&attrs.0, |attr| attr.clone().encode()),
                )
            }),
        ))
    }

    pub fn encode(self) -> impl Values {
        encode::sequence((
            self.version.encode(),
            self.issuer_and_serial_number.encode(),
            self.digest_algorithm.encode(),
            self.signed_attributes_data
                .map(|data| encode::sequence_as(Tag::CTX_0, PreEncoded(data))),
            self.signature_algorithm.encode(),
            self.signature.encode(),
            self.unsigned_attributes
                .map(|attrs| attrs.encode_as(Tag::CTX_1)),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_of_wrapping_lengths() {
        assert_eq!(set_of_wrapped(&[0u8; 3])[..2], [0x31, 3]);
        assert_eq!(set_of_wrapped(&[0u8; 0x90])[..3], [0x31, 0x81, 0x90]);
        assert_eq!(set_of_wrapped(&[0u8; 0x300])[..4], [0x31, 0x82, 0x03, 0x00]);
    }

    #[test]
    fn attribute_round_trip() {
        let attr = Attribute {
            typ: Oid(Bytes::from_static(OID_MESSAGE_DIGEST.0)),
            values: vec![AttributeValue::from_values(
                OctetString::new(Bytes::from_static(b"0123")).encode_ref(),
            )],
        };

        let der = attr.to_der();
        let parsed = Attributes::from_der_content(&der).unwrap();
        assert_eq!(parsed.0.len(), 1);
        assert_eq!(parsed.0[0], attr);
        assert_eq!(
            parsed.0[0].values[0].to_octets().unwrap().as_ref(),
            b"0123"
        );
    }

    #[test]
    fn issuer_and_serial_owned_encode_matches_borrowed() {
        let issuer =
            Constructed::decode(&[0x30, 0x00][..], Mode::Der, |cons| Name::take_from(cons))
                .unwrap();
        let isn = IssuerAndSerialNumber {
            issuer,
            serial_number: Integer::from(4096u64),
        };

        let borrowed = Captured::from_values(Mode::Der, isn.encode_ref());
        let owned = Captured::from_values(Mode::Der, isn.clone().encode());
        assert_eq!(borrowed.as_slice(), owned.as_slice());
    }

    #[test]
    fn sorted_attribute_content_is_ordered() {
        let a = Attribute {
            typ: Oid(Bytes::from_static(OID_CONTENT_TYPE.0)),
            values: vec![AttributeValue::from_values(OID_ID_DATA.encode_ref())],
        };
        let b = Attribute {
            typ: Oid(Bytes::from_static(OID_MESSAGE_DIGEST.0)),
            values: vec![AttributeValue::from_values(
                OctetString::new(Bytes::from_static(&[0u8; 32])).encode_ref(),
            )],
        };

        let forward = Attributes(vec![a.clone(), b.clone()]).to_sorted_der_content();
        let reverse = Attributes(vec![b, a]).to_sorted_der_content();
        assert_eq!(forward, reverse);
    }
}
