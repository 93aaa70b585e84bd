// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fallback module signing arbitrary byte streams as PKCS#7 envelopes.

use {
    crate::{
        credentials::SigningCredentials,
        error::PipelineError,
        module::{FileSniff, ModuleCapabilities, SignOptions, SignedBlob, SignerModule},
    },
    signature_envelope::{
        asn1::pkcs7::OID_ID_DATA,
        time_stamp::{self, TimeStampError},
        Bytes, Oid, SignatureBuilder, SignedData, TimeStampClient, VerifyMode,
    },
    std::{io::Read, path::Path, time::Duration},
};

const DEFAULT_TIMESTAMP_TIMEOUT: Duration = Duration::from_secs(15);

type TimestamperFactory =
    Box<dyn Fn(Vec<String>) -> Result<TimeStampClient, TimeStampError> + Send + Sync>;

/// Signs any input as an embedded `id-data` SignedData envelope.
///
/// Recognizes every file, so it should be registered last and acts as the
/// fallback when no format-aware module matches. Envelopes are timestamped
/// whenever the credentials carry timestamp server URLs.
pub struct RawDataModule {
    timestamper: Option<TimestamperFactory>,
}

impl RawDataModule {
    pub fn new() -> Self {
        Self { timestamper: None }
    }

    /// Override how timestamp clients are built. Used by tests to inject
    /// scripted transports.
    pub fn with_timestamper(timestamper: TimestamperFactory) -> Self {
        Self {
            timestamper: Some(timestamper),
        }
    }

    fn timestamp_client(&self, urls: Vec<String>) -> Result<TimeStampClient, TimeStampError> {
        match &self.timestamper {
            Some(factory) => factory(urls),
            None => TimeStampClient::new(urls, DEFAULT_TIMESTAMP_TIMEOUT),
        }
    }
}

impl Default for RawDataModule {
    fn default() -> Self {
        Self::new()
    }
}

impl SignerModule for RawDataModule {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn recognizes(&self, _sniff: &FileSniff) -> bool {
        true
    }

    fn capabilities(&self) -> ModuleCapabilities {
        ModuleCapabilities {
            sign: true,
            verify: true,
            ..Default::default()
        }
    }

    fn sign(
        &self,
        input: &mut dyn Read,
        credentials: &SigningCredentials,
        options: &SignOptions,
    ) -> Result<SignedBlob, PipelineError> {
        let mut data = Vec::new();
        input.read_to_end(&mut data)?;

        let mut builder = SignatureBuilder::new(
            credentials.key.as_ref(),
            credentials.chain.clone(),
            options.digest_algorithm,
        );
        builder.set_content(Oid(Bytes::from_static(OID_ID_DATA.0)), Bytes::from(data));

        let mut signed = builder.sign()?;

        if !credentials.timestamp_urls.is_empty() {
            let client = self.timestamp_client(credentials.timestamp_urls.clone())?;
            let signer = signed
                .signer_infos
                .first_mut()
                .ok_or(signature_envelope::EnvelopeError::MissingCertificate)?;

            let imprint = options
                .digest_algorithm
                .digest_data(&signer.signature.clone().into_bytes());
            let response = client.request(options.digest_algorithm, &imprint)?;
            time_stamp::attach_token(signer, &response)?;
        }

        let mut data = Vec::new();
        SignedData::from(signed).write_der(&mut data)?;

        Ok(SignedBlob {
            mime_type: "application/pkcs7-mime",
            data,
        })
    }

    fn verify(&self, path: &Path, _options: &SignOptions) -> Result<(), PipelineError> {
        let data = std::fs::read(path)?;
        SignedData::parse_ber(&data)?.verify(None, VerifyMode::Full)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        signature_envelope::{testdata, DigestAlgorithm},
        std::sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    fn credentials() -> SigningCredentials {
        SigningCredentials::from_pem(testdata::EC_KEY_PEM, testdata::EC_CERT_PEM, "raw-test")
            .unwrap()
    }

    #[test]
    fn signed_blob_verifies() {
        let module = RawDataModule::new();
        let mut input: &[u8] = b"raw payload";
        let blob = module
            .sign(&mut input, &credentials(), &SignOptions::default())
            .unwrap();
        assert_eq!(blob.mime_type, "application/pkcs7-mime");

        let parsed = SignedData::parse_ber(&blob.data).unwrap();
        let verified = parsed.verify(None, VerifyMode::Full).unwrap();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].digest_algorithm, DigestAlgorithm::Sha256);
        assert!(verified[0].counter_signature.is_none());
    }

    #[test]
    fn verify_reads_envelope_from_disk() {
        let module = RawDataModule::new();
        let mut input: &[u8] = b"on disk";
        let blob = module
            .sign(&mut input, &credentials(), &SignOptions::default())
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("envelope.p7m");
        std::fs::write(&path, &blob.data).unwrap();

        module.verify(&path, &SignOptions::default()).unwrap();

        std::fs::write(&path, b"not an envelope").unwrap();
        assert!(module.verify(&path, &SignOptions::default()).is_err());
    }

    #[test]
    fn timestamping_only_when_urls_present() {
        struct FailingTransport;

        impl signature_envelope::TimeStampTransport for FailingTransport {
            fn post(
                &self,
                _url: &str,
                _content_type: &'static str,
                _body: Vec<u8>,
            ) -> Result<signature_envelope::time_stamp::TransportResponse, TimeStampError>
            {
                Err(TimeStampError::Http("unreachable"))
            }
        }

        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = invocations.clone();
        let module = RawDataModule::with_timestamper(Box::new(move |urls| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(TimeStampClient::with_transport(urls, Box::new(FailingTransport)))
        }));

        // No URLs: signing succeeds without touching the timestamper.
        let mut input: &[u8] = b"payload";
        module
            .sign(&mut input, &credentials(), &SignOptions::default())
            .unwrap();
        assert_eq!(invocations.load(Ordering::SeqCst), 0);

        // URLs present: the timestamper runs and its failure aborts signing.
        let creds = credentials().timestamp_urls(["http://tsa.test".to_string()]);
        let mut input: &[u8] = b"payload";
        let err = module
            .sign(&mut input, &creds, &SignOptions::default())
            .unwrap_err();
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert!(matches!(err, PipelineError::TimeStamp(_)));
    }
}
