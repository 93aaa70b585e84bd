// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Time-Stamp Protocol (RFC 3161) client and token verification.
//!
//! Also speaks the legacy Microsoft Authenticode timestamp protocol,
//! which exchanges base64 DER bodies over plain HTTP.

use {
    crate::{
        algorithm::DigestAlgorithm,
        asn1::{
            pkcs7::{
                self, Attribute, AttributeValue, CmsVersion, ContentInfo, SignerInfo,
                OID_COUNTER_SIGNATURE, OID_ID_DATA, OID_SIGNING_TIME,
            },
            tsp::{
                MessageImprint, MicrosoftTimeStampRequest, PkiStatus, TimeStampReq,
                TimeStampResp, TstInfo, OID_MS_COUNTER_SIGNATURE, OID_TIME_STAMP_TOKEN,
            },
            x509::Certificate,
        },
        EnvelopeError, VerifyMode,
    },
    bcder::{
        decode::{Constructed, DecodeError},
        Captured, Integer, Mode, OctetString, Oid,
    },
    chrono::{DateTime, Utc},
    bytes::Bytes,
    log::warn,
    ring::rand::SecureRandom,
    std::{convert::Infallible, ops::Deref, time::Duration},
    thiserror::Error,
};

pub const HTTP_CONTENT_TYPE_REQUEST: &str = "application/timestamp-query";

pub const HTTP_CONTENT_TYPE_RESPONSE: &str = "application/timestamp-reply";

const HTTP_CONTENT_TYPE_LEGACY: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum TimeStampError {
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("ASN.1 decode error: {0}")]
    Asn1Decode(#[from] DecodeError<Infallible>),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("{0}")]
    Http(&'static str),

    #[error("error generating random nonce")]
    Random,

    #[error("nonce mismatch")]
    NonceMismatch,

    #[error("unsuccessful Time-Stamp Protocol response: {0:?}")]
    Unsuccessful(PkiStatus),

    #[error("response carries no timestamp token")]
    MissingToken,

    #[error("malformed timestamp token: {0}")]
    MalformedTimestamp(String),

    #[error("timestamp token is not bound to the signature")]
    InvalidTimestampBinding,

    #[error("no timestamp servers configured")]
    NoServers,

    #[error("all timestamp servers failed; last error: {0}")]
    TimestampingFailed(Box<TimeStampError>),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// A POST exchange with a timestamp server.
///
/// This is the seam the client talks through so failure handling can be
/// exercised without a network.
pub trait TimeStampTransport {
    fn post(
        &self,
        url: &str,
        content_type: &'static str,
        body: Vec<u8>,
    ) -> Result<TransportResponse, TimeStampError>;
}

pub struct TransportResponse {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// The default transport, reqwest's blocking client.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TimeStampError> {
        Ok(Self {
            client: reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()?,
        })
    }
}

impl TimeStampTransport for ReqwestTransport {
    fn post(
        &self,
        url: &str,
        content_type: &'static str,
        body: Vec<u8>,
    ) -> Result<TransportResponse, TimeStampError> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", content_type)
            .body(body)
            .send()?;

        if !response.status().is_success() {
            return Err(TimeStampError::Http("bad HTTP response status"));
        }

        let content_type = response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        Ok(TransportResponse {
            content_type,
            body: response.bytes()?.to_vec(),
        })
    }
}

/// High-level interface to a [TimeStampResp].
#[derive(Debug)]
pub struct TimeStampResponse(TimeStampResp);

impl Deref for TimeStampResponse {
    type Target = TimeStampResp;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TimeStampResponse {
    /// DER of the token's ContentInfo, the bytes an unsigned attribute
    /// carries.
    pub fn token_der(&self) -> Option<Vec<u8>> {
        self.0.time_stamp_token.as_ref().map(|token| {
            Captured::from_values(Mode::Der, token.encode_ref())
                .as_slice()
                .to_vec()
        })
    }

    /// Decode the SignedData inside the token.
    pub fn signed_data(&self) -> Result<Option<pkcs7::SignedData>, TimeStampError> {
        match self.token_der() {
            Some(der) => Ok(Some(pkcs7::SignedData::decode_ber(&der)?)),
            None => Ok(None),
        }
    }

    pub fn tst_info(&self) -> Result<Option<TstInfo>, TimeStampError> {
        match self.signed_data()? {
            Some(signed_data) => {
                let tst_der = token_content(&signed_data)?;
                Ok(Some(TstInfo::decode_ber(&tst_der)?))
            }
            None => Ok(None),
        }
    }
}

/// Requests timestamp tokens from a list of servers.
///
/// Servers are tried strictly in their declared order. A failure is
/// logged and the next server is tried immediately; there is no backoff
/// and no reordering. When every server fails, the last error is
/// surfaced inside [TimeStampError::TimestampingFailed].
pub struct TimeStampClient {
    urls: Vec<String>,
    transport: Box<dyn TimeStampTransport>,
}

impl TimeStampClient {
    pub fn new(urls: Vec<String>, timeout: Duration) -> Result<Self, TimeStampError> {
        Ok(Self {
            urls,
            transport: Box::new(ReqwestTransport::new(timeout)?),
        })
    }

    pub fn with_transport(urls: Vec<String>, transport: Box<dyn TimeStampTransport>) -> Self {
        Self { urls, transport }
    }

    /// Request an RFC 3161 token over a message imprint (an
    /// already-computed digest under `digest_algorithm`).
    pub fn request(
        &self,
        digest_algorithm: DigestAlgorithm,
        imprint: &[u8],
    ) -> Result<TimeStampResponse, TimeStampError> {
        let mut random = [0u8; 8];
        ring::rand::SystemRandom::new()
            .fill(&mut random)
            .map_err(|_| TimeStampError::Random)?;

        let request = TimeStampReq {
            version: Integer::from(1u64),
            message_imprint: MessageImprint {
                hash_algorithm: digest_algorithm.algorithm_identifier(),
                hashed_message: OctetString::new(Bytes::copy_from_slice(imprint)),
            },
            req_policy: None,
            nonce: Some(Integer::from(u64::from_le_bytes(random))),
            cert_req: Some(true),
            extensions: None,
        };

        self.failover(|url| self.request_once(url, &request))
    }

    /// Request a legacy Microsoft Authenticode timestamp countersigning
    /// `encrypted_digest`. Returns the responded SignedData.
    pub fn request_legacy(
        &self,
        encrypted_digest: &[u8],
    ) -> Result<pkcs7::SignedData, TimeStampError> {
        let request =
            MicrosoftTimeStampRequest::new(Bytes::copy_from_slice(encrypted_digest));
        let body = base64::encode(request.encode_der()).into_bytes();

        self.failover(|url| {
            let response = self
                .transport
                .post(url, HTTP_CONTENT_TYPE_LEGACY, body.clone())?;

            let text = response
                .body
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect::<Vec<_>>();

            Ok(pkcs7::SignedData::decode_ber(&base64::decode(text)?)?)
        })
    }

    fn failover<T>(
        &self,
        op: impl Fn(&str) -> Result<T, TimeStampError>,
    ) -> Result<T, TimeStampError> {
        let mut last = TimeStampError::NoServers;

        for url in &self.urls {
            match op(url) {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!("timestamp server {} failed: {}", url, e);
                    last = e;
                }
            }
        }

        Err(TimeStampError::TimestampingFailed(Box::new(last)))
    }

    fn request_once(
        &self,
        url: &str,
        request: &TimeStampReq,
    ) -> Result<TimeStampResponse, TimeStampError> {
        let response =
            self.transport
                .post(url, HTTP_CONTENT_TYPE_REQUEST, request.encode_der())?;

        if response.content_type.as_deref() != Some(HTTP_CONTENT_TYPE_RESPONSE) {
            return Err(TimeStampError::Http("bad response content type"));
        }

        let response = TimeStampResponse(TimeStampResp::decode_ber(&response.body)?);

        if !response.is_granted() {
            return Err(TimeStampError::Unsuccessful(response.status.status));
        }

        // Check the nonce echo when the server reflects one. Some
        // servers omit it.
        if let Some(tst_info) = response.tst_info()? {
            if let (Some(tst_nonce), Some(req_nonce)) = (&tst_info.nonce, &request.nonce) {
                if tst_nonce != req_nonce {
                    return Err(TimeStampError::NonceMismatch);
                }
            }
        }

        Ok(response)
    }
}

/// Attach an RFC 3161 token to a signer as the id-aa-timeStampToken
/// unsigned attribute.
pub fn attach_token(
    signer_info: &mut SignerInfo,
    response: &TimeStampResponse,
) -> Result<(), TimeStampError> {
    let der = response.token_der().ok_or(TimeStampError::MissingToken)?;

    signer_info.add_unsigned_attribute(Attribute {
        typ: Oid(Bytes::from_static(OID_TIME_STAMP_TOKEN.0)),
        values: vec![AttributeValue::from_der(Bytes::from(der))],
    });

    Ok(())
}

/// Attach a legacy Microsoft timestamp to an envelope's first signer as
/// the PKCS#9 counterSignature unsigned attribute, whose value is the
/// timestamp's SignerInfo.
///
/// The token's certificates are folded into the envelope's store so the
/// countersignature remains verifiable after the token itself is
/// discarded.
pub fn attach_legacy_token(
    signed_data: &mut pkcs7::SignedData,
    token: &pkcs7::SignedData,
) -> Result<(), TimeStampError> {
    let counter_signer = token.signer_infos.first().ok_or_else(|| {
        TimeStampError::MalformedTimestamp("token carries no signers".into())
    })?;

    if let Some(token_certs) = &token.certificates {
        let certs = signed_data.certificates.get_or_insert_with(Vec::new);

        for cert in token_certs {
            if !certs.contains(cert) {
                certs.push(cert.clone());
            }
        }
    }

    let signer = signed_data
        .signer_infos
        .first_mut()
        .ok_or_else(|| TimeStampError::MalformedTimestamp("envelope carries no signers".into()))?;

    signer.add_unsigned_attribute(Attribute {
        typ: Oid(Bytes::from_static(OID_COUNTER_SIGNATURE.0)),
        values: vec![AttributeValue::from_values(counter_signer.clone().encode())],
    });

    Ok(())
}

/// The token's encapsulated content, tolerating both the CMS form
/// (OCTET STRING wrapping the TSTInfo) and the bare PKCS#7 form.
fn token_content(signed_data: &pkcs7::SignedData) -> Result<Bytes, TimeStampError> {
    let raw = signed_data
        .content_info
        .content
        .as_ref()
        .ok_or(TimeStampError::MissingToken)?;

    match signed_data.content_info.content_octets() {
        Ok(Some(octets)) => Ok(octets),
        _ => Ok(raw.clone()),
    }
}

/// A verified timestamp countersignature.
#[derive(Clone, Debug)]
pub enum CounterSignature {
    /// An RFC 3161 token; carries the token's TSTInfo.
    Rfc3161(TstInfo),
    /// A PKCS#9 counterSignature SignerInfo, with the signing time it
    /// declared, if any.
    Legacy {
        signing_time: Option<DateTime<Utc>>,
    },
}

/// Verify the timestamp countersignature on a signer, if one is
/// attached. Absence is not an error.
///
/// An RFC 3161 token (under id-aa-timeStampToken or the Microsoft
/// countersignature attribute) has its own signatures verified and its
/// message imprint must equal the hash of the signer's EncryptedDigest
/// under the imprint's declared algorithm. A PKCS#9 counterSignature is
/// verified as a signature over the EncryptedDigest itself, using the
/// envelope's certificate store.
pub fn verify_optional_timestamp(
    signer_info: &SignerInfo,
    certificates: &[Certificate],
) -> Result<Option<CounterSignature>, TimeStampError> {
    if let Some(attribute) = signer_info.unsigned_attributes.as_ref().and_then(|attrs| {
        attrs
            .find(&Oid(Bytes::from_static(OID_TIME_STAMP_TOKEN.0)))
            .or_else(|| attrs.find(&Oid(Bytes::from_static(OID_MS_COUNTER_SIGNATURE.0))))
    }) {
        let value = attribute
            .values
            .first()
            .ok_or_else(|| TimeStampError::MalformedTimestamp("empty token attribute".into()))?;

        let token = pkcs7::SignedData::decode_ber(value.as_der())
            .map_err(|e| TimeStampError::MalformedTimestamp(e.to_string()))?;

        let tst_der = token_content(&token)?;

        crate::SignedData::from(token).verify(Some(&tst_der), VerifyMode::Full)?;

        let tst_info = TstInfo::decode_ber(&tst_der)
            .map_err(|e| TimeStampError::MalformedTimestamp(e.to_string()))?;

        let imprint_algorithm =
            DigestAlgorithm::from_algorithm_identifier(&tst_info.message_imprint.hash_algorithm)?;
        let encrypted_digest = signer_info.signature.clone().into_bytes();

        if tst_info.message_imprint.hashed_message.clone().into_bytes()
            != imprint_algorithm.digest_data(&encrypted_digest)
        {
            return Err(TimeStampError::InvalidTimestampBinding);
        }

        return Ok(Some(CounterSignature::Rfc3161(tst_info)));
    }

    let attribute = match signer_info
        .unsigned_attributes
        .as_ref()
        .and_then(|attrs| attrs.find(&Oid(Bytes::from_static(OID_COUNTER_SIGNATURE.0))))
    {
        Some(attribute) => attribute,
        None => return Ok(None),
    };

    let value = attribute.values.first().ok_or_else(|| {
        TimeStampError::MalformedTimestamp("empty counterSignature attribute".into())
    })?;

    let counter_signer = Constructed::decode(value.as_der(), Mode::Ber, |cons| {
        SignerInfo::take_opt_from(cons)
    })
    .map_err(|e| TimeStampError::MalformedTimestamp(e.to_string()))?
    .ok_or_else(|| {
        TimeStampError::MalformedTimestamp("counterSignature holds no SignerInfo".into())
    })?;

    let signing_time = counter_signer
        .signed_attributes
        .as_ref()
        .and_then(|attrs| attrs.find(&Oid(Bytes::from_static(OID_SIGNING_TIME.0))))
        .and_then(|attr| attr.values.first())
        .and_then(|value| value.to_time())
        .map(|time| *time.as_ref());

    let encrypted_digest = signer_info.signature.clone().into_bytes();

    // The countersigner signs the EncryptedDigest of the signature it
    // counters, so verification is a one-signer envelope over that
    // digest backed by the outer envelope's certificate store.
    let envelope = pkcs7::SignedData {
        version: CmsVersion::V1,
        digest_algorithms: vec![counter_signer.digest_algorithm.clone()],
        content_info: ContentInfo {
            content_type: Oid(Bytes::from_static(OID_ID_DATA.0)),
            content: None,
        },
        certificates: Some(certificates.to_vec()),
        signer_infos: vec![counter_signer],
    };

    crate::SignedData::from(envelope)
        .verify(Some(&encrypted_digest), VerifyMode::Full)
        .map_err(|e| match e {
            EnvelopeError::DigestMismatch => TimeStampError::InvalidTimestampBinding,
            other => TimeStampError::Envelope(other),
        })?;

    Ok(Some(CounterSignature::Legacy { signing_time }))
}

/// Verify a legacy Microsoft timestamp token against the signature it
/// countersigns.
///
/// The token is a bare SignedData whose embedded content must be the
/// EncryptedDigest of the countersigned signature.
pub fn verify_microsoft_token(
    token: &pkcs7::SignedData,
    encrypted_digest: &[u8],
) -> Result<(), TimeStampError> {
    let content = token_content(token)?;

    if content != encrypted_digest {
        return Err(TimeStampError::InvalidTimestampBinding);
    }

    crate::SignedData::from(token.clone()).verify(Some(&content), VerifyMode::Full)?;

    Ok(())
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{
            asn1::{
                pkcs7::OID_ID_DATA,
                tsp::OID_CONTENT_TYPE_TST_INFO,
                x509::Certificate,
            },
            builder::SignatureBuilder,
            signing::InMemorySigningKeyPair,
            testdata,
        },
        std::{cell::RefCell, rc::Rc},
    };

    struct ScriptedTransport {
        // url -> canned response; None means connection failure
        responses: Vec<(String, Option<TransportResponse>)>,
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl TimeStampTransport for ScriptedTransport {
        fn post(
            &self,
            url: &str,
            _content_type: &'static str,
            _body: Vec<u8>,
        ) -> Result<TransportResponse, TimeStampError> {
            self.calls.borrow_mut().push(url.to_string());

            match self
                .responses
                .iter()
                .find(|(u, _)| u == url)
                .and_then(|(_, r)| r.as_ref())
            {
                Some(r) => Ok(TransportResponse {
                    content_type: r.content_type.clone(),
                    body: r.body.clone(),
                }),
                None => Err(TimeStampError::Http("connection refused")),
            }
        }
    }

    fn key_and_cert() -> (InMemorySigningKeyPair, Certificate) {
        (
            InMemorySigningKeyPair::from_pkcs8_pem(testdata::RSA_KEY_PEM).unwrap(),
            Certificate::from_pem(testdata::RSA_CERT_PEM).unwrap(),
        )
    }

    /// Produce a signed token SignedData embedding `tst_der` as TSTInfo
    /// content.
    fn signed_token(tst_der: Vec<u8>) -> pkcs7::SignedData {
        let (key, cert) = key_and_cert();
        let mut builder = SignatureBuilder::new(&key, vec![cert], DigestAlgorithm::Sha256);
        builder.set_content(
            Oid(Bytes::from_static(OID_CONTENT_TYPE_TST_INFO.0)),
            Bytes::from(tst_der),
        );
        builder.signing_time(chrono::Utc::now()).unwrap();

        builder.sign().unwrap()
    }

    fn tst_info_over(encrypted_digest: &[u8]) -> TstInfo {
        TstInfo {
            version: Integer::from(1u64),
            policy: Oid(Bytes::from_static(&[42, 3, 4])),
            message_imprint: MessageImprint {
                hash_algorithm: DigestAlgorithm::Sha256.algorithm_identifier(),
                hashed_message: OctetString::new(Bytes::from(
                    DigestAlgorithm::Sha256.digest_data(encrypted_digest),
                )),
            },
            serial_number: Integer::from(7u64),
            gen_time: chrono::Utc::now().into(),
            accuracy: None,
            ordering: None,
            nonce: None,
            tsa: None,
            extensions: None,
        }
    }

    fn granted_response_body(token: &pkcs7::SignedData) -> Vec<u8> {
        let resp = TimeStampResp {
            status: crate::asn1::tsp::PkiStatusInfo {
                status: PkiStatus::Granted,
                details: None,
            },
            time_stamp_token: Some(pkcs7::ContentInfo {
                content_type: Oid(Bytes::from_static(pkcs7::OID_ID_SIGNED_DATA.0)),
                content: Some(Bytes::from(
                    Captured::from_values(Mode::Der, token.encode_ref())
                        .as_slice()
                        .to_vec(),
                )),
            }),
        };

        resp.encode_der()
    }

    fn timestamp_reply(body: Vec<u8>) -> TransportResponse {
        TransportResponse {
            content_type: Some(HTTP_CONTENT_TYPE_RESPONSE.to_string()),
            body,
        }
    }

    #[test]
    fn failover_tries_servers_in_order() {
        let token = signed_token(tst_info_over(b"sig").encode_der());
        let body = granted_response_body(&token);

        let calls = Rc::new(RefCell::new(Vec::new()));
        let transport = ScriptedTransport {
            responses: vec![
                ("http://one".to_string(), None),
                ("http://two".to_string(), Some(timestamp_reply(body))),
            ],
            calls: calls.clone(),
        };

        let client = TimeStampClient::with_transport(
            vec!["http://one".to_string(), "http://two".to_string()],
            Box::new(transport),
        );

        let response = client
            .request(DigestAlgorithm::Sha256, &[0u8; 32])
            .unwrap();
        assert!(response.is_granted());
        assert!(response.tst_info().unwrap().is_some());
        assert_eq!(*calls.borrow(), vec!["http://one", "http://two"]);
    }

    #[test]
    fn all_servers_failing_reports_last_error() {
        let transport = ScriptedTransport {
            responses: vec![
                ("http://one".to_string(), None),
                ("http://two".to_string(), None),
            ],
            calls: Rc::new(RefCell::new(Vec::new())),
        };

        let client = TimeStampClient::with_transport(
            vec!["http://one".to_string(), "http://two".to_string()],
            Box::new(transport),
        );

        let err = client
            .request(DigestAlgorithm::Sha256, &[0u8; 32])
            .unwrap_err();
        assert!(matches!(err, TimeStampError::TimestampingFailed(_)));
    }

    #[test]
    fn no_servers_is_an_error() {
        let transport = ScriptedTransport {
            responses: vec![],
            calls: Rc::new(RefCell::new(Vec::new())),
        };
        let client = TimeStampClient::with_transport(vec![], Box::new(transport));

        let err = client
            .request(DigestAlgorithm::Sha256, &[0u8; 32])
            .unwrap_err();
        assert!(matches!(
            err,
            TimeStampError::TimestampingFailed(inner)
                if matches!(inner.as_ref(), TimeStampError::NoServers)
        ));
    }

    #[test]
    fn rejection_surfaces_as_unsuccessful() {
        let resp = TimeStampResp {
            status: crate::asn1::tsp::PkiStatusInfo {
                status: PkiStatus::Rejection,
                details: None,
            },
            time_stamp_token: None,
        };

        let transport = ScriptedTransport {
            responses: vec![(
                "http://one".to_string(),
                Some(timestamp_reply(resp.encode_der())),
            )],
            calls: Rc::new(RefCell::new(Vec::new())),
        };

        let client = TimeStampClient::with_transport(
            vec!["http://one".to_string()],
            Box::new(transport),
        );

        let err = client
            .request(DigestAlgorithm::Sha256, &[0u8; 32])
            .unwrap_err();
        assert!(matches!(
            err,
            TimeStampError::TimestampingFailed(inner)
                if matches!(inner.as_ref(), TimeStampError::Unsuccessful(PkiStatus::Rejection))
        ));
    }

    #[test]
    fn attached_timestamp_verifies_end_to_end() {
        // Sign a payload, then countersign its EncryptedDigest.
        let (key, cert) = key_and_cert();
        let mut builder =
            SignatureBuilder::new(&key, vec![cert], DigestAlgorithm::Sha256);
        builder.set_content(
            Oid(Bytes::from_static(OID_ID_DATA.0)),
            Bytes::from_static(b"payload"),
        );
        builder.signing_time(chrono::Utc::now()).unwrap();
        let mut signed = builder.sign().unwrap();

        let encrypted_digest = signed.signer_infos[0].signature.clone().into_bytes();
        let token = signed_token(tst_info_over(&encrypted_digest).encode_der());
        let body = granted_response_body(&token);

        let transport = ScriptedTransport {
            responses: vec![("http://tsa".to_string(), Some(timestamp_reply(body)))],
            calls: Rc::new(RefCell::new(Vec::new())),
        };
        let client = TimeStampClient::with_transport(
            vec!["http://tsa".to_string()],
            Box::new(transport),
        );

        let response = client
            .request(
                DigestAlgorithm::Sha256,
                &DigestAlgorithm::Sha256.digest_data(&encrypted_digest),
            )
            .unwrap();

        attach_token(&mut signed.signer_infos[0], &response).unwrap();

        let reparsed = crate::SignedData::parse_ber(&signed.encode_der()).unwrap();
        let results = reparsed.verify(None, VerifyMode::Full).unwrap();
        assert!(matches!(
            results[0].counter_signature,
            Some(CounterSignature::Rfc3161(_))
        ));
    }

    #[test]
    fn unbound_timestamp_rejected() {
        let (key, cert) = key_and_cert();
        let mut builder =
            SignatureBuilder::new(&key, vec![cert], DigestAlgorithm::Sha256);
        builder.set_content(
            Oid(Bytes::from_static(OID_ID_DATA.0)),
            Bytes::from_static(b"payload"),
        );
        builder.signing_time(chrono::Utc::now()).unwrap();
        let mut signed = builder.sign().unwrap();

        // Token over a different signature's digest.
        let token = signed_token(tst_info_over(b"some other signature").encode_der());
        let der = Captured::from_values(
            Mode::Der,
            pkcs7::ContentInfo {
                content_type: Oid(Bytes::from_static(pkcs7::OID_ID_SIGNED_DATA.0)),
                content: Some(Bytes::from(
                    Captured::from_values(Mode::Der, token.encode_ref())
                        .as_slice()
                        .to_vec(),
                )),
            }
            .encode_ref(),
        )
        .as_slice()
        .to_vec();

        signed.signer_infos[0].add_unsigned_attribute(Attribute {
            typ: Oid(Bytes::from_static(OID_TIME_STAMP_TOKEN.0)),
            values: vec![AttributeValue::from_der(Bytes::from(der))],
        });

        assert!(matches!(
            verify_optional_timestamp(&signed.signer_infos[0], &[]),
            Err(TimeStampError::InvalidTimestampBinding)
        ));
    }

    #[test]
    fn absent_timestamp_passes_through() {
        let (key, cert) = key_and_cert();
        let mut builder =
            SignatureBuilder::new(&key, vec![cert], DigestAlgorithm::Sha256);
        builder.set_content(
            Oid(Bytes::from_static(OID_ID_DATA.0)),
            Bytes::from_static(b"payload"),
        );
        let signed = builder.sign().unwrap();

        assert!(verify_optional_timestamp(&signed.signer_infos[0], &[])
            .unwrap()
            .is_none());
    }

    #[test]
    fn legacy_request_round_trips_base64() {
        let encrypted_digest = b"legacy signature bytes";
        let token = signed_token_over_digest(encrypted_digest);

        let mut body = base64::encode(token.encode_der()).into_bytes();
        // Servers wrap base64 lines; the client must tolerate it.
        body.insert(20, b'\n');

        let transport = ScriptedTransport {
            responses: vec![(
                "http://legacy".to_string(),
                Some(TransportResponse {
                    content_type: Some(HTTP_CONTENT_TYPE_LEGACY.to_string()),
                    body,
                }),
            )],
            calls: Rc::new(RefCell::new(Vec::new())),
        };
        let client = TimeStampClient::with_transport(
            vec!["http://legacy".to_string()],
            Box::new(transport),
        );

        let received = client.request_legacy(encrypted_digest).unwrap();
        verify_microsoft_token(&received, encrypted_digest).unwrap();
    }

    fn signed_token_over_digest(encrypted_digest: &[u8]) -> pkcs7::SignedData {
        let (key, cert) = key_and_cert();
        let mut builder =
            SignatureBuilder::new(&key, vec![cert], DigestAlgorithm::Sha256);
        builder.set_content(
            Oid(Bytes::from_static(OID_ID_DATA.0)),
            Bytes::copy_from_slice(encrypted_digest),
        );
        builder.signing_time(chrono::Utc::now()).unwrap();

        builder.sign().unwrap()
    }

    #[test]
    fn microsoft_token_binding_enforced() {
        let token = signed_token_over_digest(b"the signature");

        verify_microsoft_token(&token, b"the signature").unwrap();
        assert!(matches!(
            verify_microsoft_token(&token, b"another signature"),
            Err(TimeStampError::InvalidTimestampBinding)
        ));
    }

    #[test]
    fn legacy_countersignature_verifies_end_to_end() {
        let (key, cert) = key_and_cert();
        let mut builder =
            SignatureBuilder::new(&key, vec![cert], DigestAlgorithm::Sha256);
        builder.set_content(
            Oid(Bytes::from_static(OID_ID_DATA.0)),
            Bytes::from_static(b"payload"),
        );
        builder.signing_time(chrono::Utc::now()).unwrap();
        let mut signed = builder.sign().unwrap();

        let encrypted_digest = signed.signer_infos[0].signature.clone().into_bytes();
        let token = signed_token_over_digest(&encrypted_digest);

        attach_legacy_token(&mut signed, &token).unwrap();

        let reparsed = crate::SignedData::parse_ber(&signed.encode_der()).unwrap();
        let results = reparsed.verify(None, VerifyMode::Full).unwrap();
        match &results[0].counter_signature {
            Some(CounterSignature::Legacy { signing_time }) => {
                assert!(signing_time.is_some());
            }
            other => panic!("unexpected countersignature: {other:?}"),
        }
    }

    #[test]
    fn legacy_countersignature_binding_enforced() {
        let (key, cert) = key_and_cert();
        let mut builder =
            SignatureBuilder::new(&key, vec![cert], DigestAlgorithm::Sha256);
        builder.set_content(
            Oid(Bytes::from_static(OID_ID_DATA.0)),
            Bytes::from_static(b"payload"),
        );
        builder.signing_time(chrono::Utc::now()).unwrap();
        let mut signed = builder.sign().unwrap();

        // Token countersigning some other signature's digest.
        let token = signed_token_over_digest(b"an unrelated signature");
        attach_legacy_token(&mut signed, &token).unwrap();

        let reparsed = crate::SignedData::parse_ber(&signed.encode_der()).unwrap();
        assert!(matches!(
            reparsed.verify(None, VerifyMode::Full),
            Err(EnvelopeError::Timestamp(inner))
                if matches!(inner.as_ref(), TimeStampError::InvalidTimestampBinding)
        ));
    }
}
