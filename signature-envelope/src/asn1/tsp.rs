// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ASN.1 types for the timestamp protocols.
//!
//! RFC 3161 request/response plus the legacy Microsoft Authenticode
//! timestamp request, which predates RFC 3161 and rides over plain HTTP
//! with base64 bodies.

use {
    crate::asn1::{
        pkcs7::ContentInfo,
        time::GeneralizedTime,
        x509::AlgorithmIdentifier,
        PreEncoded,
    },
    bcder::{
        decode::{Constructed, DecodeError, Source},
        encode::{self, PrimitiveContent, Values},
        ConstOid, Integer, Mode, OctetString, Oid, Tag,
    },
    bytes::Bytes,
};

/// Content type of TSTInfo (1.2.840.113549.1.9.16.1.4).
pub const OID_CONTENT_TYPE_TST_INFO: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 16, 1, 4]);

/// id-aa-timeStampToken (1.2.840.113549.1.9.16.2.14), the unsigned
/// attribute carrying an RFC 3161 token.
pub const OID_TIME_STAMP_TOKEN: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 16, 2, 14]);

/// Microsoft countersignature request type (1.3.6.1.4.1.311.3.2.1).
pub const OID_MS_TIME_STAMP_REQUEST: ConstOid = Oid(&[43, 6, 1, 4, 1, 130, 55, 3, 2, 1]);

/// Microsoft RFC 3161 countersignature attribute (1.3.6.1.4.1.311.3.3.1).
pub const OID_MS_COUNTER_SIGNATURE: ConstOid = Oid(&[43, 6, 1, 4, 1, 130, 55, 3, 3, 1]);

/// A time-stamp request.
///
/// ```ASN.1
/// TimeStampReq ::= SEQUENCE  {
///    version                  INTEGER  { v1(1) },
///    messageImprint           MessageImprint,
///    reqPolicy                TSAPolicyId                OPTIONAL,
///    nonce                    INTEGER                    OPTIONAL,
///    certReq                  BOOLEAN                    DEFAULT FALSE,
///    extensions               [0] IMPLICIT Extensions    OPTIONAL  }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimeStampReq {
    pub version: Integer,
    pub message_imprint: MessageImprint,
    pub req_policy: Option<Oid>,
    pub nonce: Option<Integer>,
    pub cert_req: Option<bool>,
    pub extensions: Option<Bytes>,
}

impl TimeStampReq {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let version = Integer::take_from(cons)?;
            let message_imprint = MessageImprint::take_from(cons)?;
            let req_policy = Oid::take_opt_from(cons)?;
            let nonce =
                cons.take_opt_primitive_if(Tag::INTEGER, |prim| Integer::from_primitive(prim))?;
            let cert_req = cons.take_opt_bool()?;
            let extensions = cons
                .take_opt_constructed_if(Tag::CTX_0, |cons| cons.capture_all())?
                .map(|captured| Bytes::copy_from_slice(captured.as_slice()));

            Ok(Self {
                version,
                message_imprint,
                req_policy,
                nonce,
                cert_req,
                extensions,
            })
        })
    }

    pub fn decode_der(data: &[u8]) -> Result<Self, DecodeError<std::convert::Infallible>> {
        Constructed::decode(data, Mode::Der, |cons| Self::take_from(cons))
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            (&self.version).encode(),
            self.message_imprint.encode_ref(),
            self.req_policy.as_ref().map(|policy| policy.encode_ref()),
            self.nonce.as_ref().map(|nonce| nonce.encode()),
            self.cert_req.as_ref().map(|cert_req| cert_req.encode_ref()),
            self.extensions
                .as_ref()
                .map(|ext| encode::sequence_as(Tag::CTX_0, PreEncoded(ext.clone()))),
        ))
    }

    pub fn encode_der(&self) -> Vec<u8> {
        let captured = bcder::Captured::from_values(Mode::Der, self.encode_ref());
        captured.as_slice().to_vec()
    }
}

/// Message imprint.
///
/// ```ASN.1
/// MessageImprint ::= SEQUENCE  {
///      hashAlgorithm                AlgorithmIdentifier,
///      hashedMessage                OCTET STRING  }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MessageImprint {
    pub hash_algorithm: AlgorithmIdentifier,
    pub hashed_message: OctetString,
}

impl MessageImprint {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let hash_algorithm = AlgorithmIdentifier::take_from(cons)?;
            let hashed_message = OctetString::take_from(cons)?;

            Ok(Self {
                hash_algorithm,
                hashed_message,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.hash_algorithm.encode_ref(),
            self.hashed_message.encode_ref(),
        ))
    }
}

/// Time stamp response.
///
/// ```ASN.1
/// TimeStampResp ::= SEQUENCE  {
///      status                  PKIStatusInfo,
///      timeStampToken          TimeStampToken     OPTIONAL  }
///
/// TimeStampToken ::= ContentInfo
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimeStampResp {
    pub status: PkiStatusInfo,
    pub time_stamp_token: Option<ContentInfo>,
}

impl TimeStampResp {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let status = PkiStatusInfo::take_from(cons)?;
            let time_stamp_token = ContentInfo::take_opt_from(cons)?;

            Ok(Self {
                status,
                time_stamp_token,
            })
        })
    }

    pub fn decode_ber(data: &[u8]) -> Result<Self, DecodeError<std::convert::Infallible>> {
        Constructed::decode(data, Mode::Ber, |cons| Self::take_from(cons))
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.status.encode_ref(),
            self.time_stamp_token.as_ref().map(|token| token.encode_ref()),
        ))
    }

    pub fn encode_der(&self) -> Vec<u8> {
        let captured = bcder::Captured::from_values(Mode::Der, self.encode_ref());
        captured.as_slice().to_vec()
    }

    pub fn is_granted(&self) -> bool {
        matches!(
            self.status.status,
            PkiStatus::Granted | PkiStatus::GrantedWithMods
        )
    }
}

/// PKI status info.
///
/// The statusString and failInfo fields are informational; they are
/// retained raw for error reporting but never interpreted structurally.
///
/// ```ASN.1
/// PKIStatusInfo ::= SEQUENCE {
///     status        PKIStatus,
///     statusString  PKIFreeText     OPTIONAL,
///     failInfo      PKIFailureInfo  OPTIONAL  }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PkiStatusInfo {
    pub status: PkiStatus,
    pub details: Option<Bytes>,
}

impl PkiStatusInfo {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let status = PkiStatus::take_from(cons)?;
            let details = cons.capture_all()?;
            let details = if details.as_slice().is_empty() {
                None
            } else {
                Some(Bytes::copy_from_slice(details.as_slice()))
            };

            Ok(Self { status, details })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.status.encode(),
            self.details.as_ref().map(|d| PreEncoded(d.clone())),
        ))
    }
}

/// PKI status.
///
/// ```ASN.1
/// PKIStatus ::= INTEGER {
///     granted                (0),
///     grantedWithMods        (1),
///     rejection              (2),
///     waiting                (3),
///     revocationWarning      (4),
///     revocationNotification (5) }
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PkiStatus {
    Granted = 0,
    GrantedWithMods = 1,
    Rejection = 2,
    Waiting = 3,
    RevocationWarning = 4,
    RevocationNotification = 5,
}

impl PkiStatus {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        match cons.take_primitive_if(Tag::INTEGER, Integer::i8_from_primitive)? {
            0 => Ok(Self::Granted),
            1 => Ok(Self::GrantedWithMods),
            2 => Ok(Self::Rejection),
            3 => Ok(Self::Waiting),
            4 => Ok(Self::RevocationWarning),
            5 => Ok(Self::RevocationNotification),
            _ => Err(cons.content_err("unknown PKIStatus value")),
        }
    }

    pub fn encode(self) -> impl Values {
        (self as u8).encode()
    }
}

/// Time stamp token info.
///
/// ```ASN.1
/// TSTInfo ::= SEQUENCE  {
///     version                      INTEGER  { v1(1) },
///     policy                       TSAPolicyId,
///     messageImprint               MessageImprint,
///     serialNumber                 INTEGER,
///     genTime                      GeneralizedTime,
///     accuracy                     Accuracy                 OPTIONAL,
///     ordering                     BOOLEAN             DEFAULT FALSE,
///     nonce                        INTEGER                  OPTIONAL,
///     tsa                          [0] GeneralName          OPTIONAL,
///     extensions                   [1] IMPLICIT Extensions  OPTIONAL   }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TstInfo {
    pub version: Integer,
    pub policy: Oid,
    pub message_imprint: MessageImprint,
    pub serial_number: Integer,
    pub gen_time: GeneralizedTime,
    pub accuracy: Option<Accuracy>,
    pub ordering: Option<bool>,
    pub nonce: Option<Integer>,
    pub tsa: Option<Bytes>,
    pub extensions: Option<Bytes>,
}

impl TstInfo {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let version = Integer::take_from(cons)?;
            let policy = Oid::take_from(cons)?;
            let message_imprint = MessageImprint::take_from(cons)?;
            let serial_number = Integer::take_from(cons)?;
            let gen_time = GeneralizedTime::take_from_allow_fractional_z(cons)?;
            let accuracy = Accuracy::take_opt_from(cons)?;
            let ordering = cons.take_opt_bool()?;
            let nonce =
                cons.take_opt_primitive_if(Tag::INTEGER, |prim| Integer::from_primitive(prim))?;
            let tsa = cons
                .take_opt_constructed_if(Tag::CTX_0, |cons| cons.capture_all())?
                .map(|captured| Bytes::copy_from_slice(captured.as_slice()));
            let extensions = cons
                .take_opt_constructed_if(Tag::CTX_1, |cons| cons.capture_all())?
                .map(|captured| Bytes::copy_from_slice(captured.as_slice()));

            Ok(Self {
                version,
                policy,
                message_imprint,
                serial_number,
                gen_time,
                accuracy,
                ordering,
                nonce,
                tsa,
                extensions,
            })
        })
    }

    pub fn decode_ber(data: &[u8]) -> Result<Self, DecodeError<std::convert::Infallible>> {
        Constructed::decode(data, Mode::Ber, |cons| Self::take_from(cons))
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            (&self.version).encode(),
            self.policy.encode_ref(),
            self.message_imprint.encode_ref(),
            (&self.serial_number).encode(),
            self.gen_time.encode_ref(),
            self.accuracy.as_ref().map(|accuracy| accuracy.encode_ref()),
            self.ordering.as_ref().map(|ordering| ordering.encode_ref()),
            self.nonce.as_ref().map(|nonce| nonce.encode()),
            self.tsa
                .as_ref()
                .map(|tsa| encode::sequence_as(Tag::CTX_0, PreEncoded(tsa.clone()))),
            self.extensions
                .as_ref()
                .map(|ext| encode::sequence_as(Tag::CTX_1, PreEncoded(ext.clone()))),
        ))
    }

    pub fn encode_der(&self) -> Vec<u8> {
        let captured = bcder::Captured::from_values(Mode::Der, self.encode_ref());
        captured.as_slice().to_vec()
    }
}

/// Accuracy.
///
/// ```ASN.1
/// Accuracy ::= SEQUENCE {
///                 seconds        INTEGER           OPTIONAL,
///                 millis     [0] INTEGER  (1..999) OPTIONAL,
///                 micros     [1] INTEGER  (1..999) OPTIONAL  }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Accuracy {
    pub seconds: Option<Integer>,
    pub millis: Option<Integer>,
    pub micros: Option<Integer>,
}

impl Accuracy {
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| {
            let seconds =
                cons.take_opt_primitive_if(Tag::INTEGER, |prim| Integer::from_primitive(prim))?;
            let millis =
                cons.take_opt_primitive_if(Tag::CTX_0, |prim| Integer::from_primitive(prim))?;
            let micros =
                cons.take_opt_primitive_if(Tag::CTX_1, |prim| Integer::from_primitive(prim))?;

            Ok(Self {
                seconds,
                millis,
                micros,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.seconds.as_ref().map(|seconds| seconds.encode()),
            self.millis.as_ref().map(|millis| millis.encode_as(Tag::CTX_0)),
            self.micros.as_ref().map(|micros| micros.encode_as(Tag::CTX_1)),
        ))
    }
}

/// The legacy Microsoft Authenticode timestamp request.
///
/// ```ASN.1
/// TimeStampRequest ::= SEQUENCE {
///     countersignatureType  OBJECT IDENTIFIER,
///     attributes            Attributes OPTIONAL,
///     content               ContentInfo }
/// ```
///
/// The content is an id-data ContentInfo whose octets are the
/// EncryptedDigest of the signature being countersigned. The request is
/// sent base64 encoded; the response is a base64 PKCS#7 SignedData.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MicrosoftTimeStampRequest {
    pub content: ContentInfo,
}

impl MicrosoftTimeStampRequest {
    pub fn new(encrypted_digest: Bytes) -> Self {
        let inner = bcder::Captured::from_values(
            Mode::Der,
            OctetString::new(encrypted_digest).encode(),
        );

        Self {
            content: ContentInfo {
                content_type: Oid(Bytes::from_static(
                    crate::asn1::pkcs7::OID_ID_DATA.0,
                )),
                content: Some(Bytes::copy_from_slice(inner.as_slice())),
            },
        }
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            OID_MS_TIME_STAMP_REQUEST.encode_ref(),
            self.content.encode_ref(),
        ))
    }

    pub fn encode_der(&self) -> Vec<u8> {
        let captured = bcder::Captured::from_values(Mode::Der, self.encode_ref());
        captured.as_slice().to_vec()
    }
}
