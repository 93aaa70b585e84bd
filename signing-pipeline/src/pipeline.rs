// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The signing orchestrator.
//!
//! Routes a file to a module, runs the sign operation in stream or
//! transform mode, writes output atomically, and records the operation in
//! the audit trail. Nothing is published and no output is written unless
//! the whole operation succeeds.

use {
    crate::{
        atomic::write_atomic,
        audit::{AuditRecord, AuditSink},
        credentials::SigningCredentials,
        error::PipelineError,
        module::{FileSniff, ModuleRegistry, SignOptions, SignerModule},
    },
    chrono::Utc,
    log::{debug, info},
    signature_envelope::DigestAlgorithm,
    std::{
        fs::File,
        path::{Path, PathBuf},
        sync::Arc,
        time::Instant,
    },
};

/// One signing job.
#[derive(Clone, Debug)]
pub struct SignRequest {
    pub path: PathBuf,
    /// Where the signed artifact goes. Defaults to `<path>.sig` in stream
    /// mode and to replacing `path` in transform mode.
    pub output: Option<PathBuf>,
    /// Force a specific module by name instead of sniffing.
    pub module: Option<String>,
    pub digest_algorithm: DigestAlgorithm,
    /// Sign the raw input stream instead of the module's transform.
    pub stream_mode: bool,
}

impl SignRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            output: None,
            module: None,
            digest_algorithm: DigestAlgorithm::Sha256,
            stream_mode: false,
        }
    }
}

pub struct SigningPipeline {
    registry: ModuleRegistry,
    credentials: SigningCredentials,
    audit_sink: Option<Box<dyn AuditSink>>,
}

impl SigningPipeline {
    pub fn new(registry: ModuleRegistry, credentials: SigningCredentials) -> Self {
        Self {
            registry,
            credentials,
            audit_sink: None,
        }
    }

    pub fn audit_sink(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Sign one file, accumulating facts about the operation in `audit`.
    ///
    /// The record is published to the configured sink only on success; a
    /// failing operation publishes nothing and leaves any pre-existing
    /// output file untouched.
    pub fn sign(
        &self,
        request: &SignRequest,
        audit: &mut AuditRecord,
    ) -> Result<PathBuf, PipelineError> {
        let started = Instant::now();

        let sniff = FileSniff::of_path(&request.path)?;
        let module = self.select_module(request, &sniff)?;

        debug!(
            "module {} handles {}",
            module.name(),
            request.path.display()
        );

        self.credentials.require(module.certificate_kind())?;

        if !module.capabilities().sign {
            return Err(PipelineError::UnsupportedOperation {
                module: module.name(),
                operation: "sign",
            });
        }

        audit.set("sig.type", module.name());
        audit.set("sig.keyname", self.credentials.key_name.as_str());
        audit.set(
            "sig.hash",
            request.digest_algorithm.to_string(),
        );
        audit.set(
            "client.filename",
            request
                .path
                .file_name()
                .unwrap_or_else(|| request.path.as_os_str())
                .to_string_lossy()
                .into_owned(),
        );
        audit.set("perf.size.in", sniff.size);
        audit.set_timestamp("sig.timestamp", Utc::now());

        let options = SignOptions {
            digest_algorithm: request.digest_algorithm,
        };

        let output = if request.stream_mode {
            self.sign_stream(request, module.as_ref(), &options, audit)?
        } else {
            self.sign_transformed(request, module.as_ref(), &options, audit)?
        };

        audit.set("perf.elapsed.ms", started.elapsed().as_millis() as u64);

        if let Some(sink) = &self.audit_sink {
            sink.publish(audit)?;
        }

        info!(
            "signed {} -> {} via {}",
            request.path.display(),
            output.display(),
            module.name()
        );

        Ok(output)
    }

    fn select_module(
        &self,
        request: &SignRequest,
        sniff: &FileSniff,
    ) -> Result<Arc<dyn SignerModule>, PipelineError> {
        match &request.module {
            Some(name) => self
                .registry
                .find_by_name(name)
                .ok_or_else(|| PipelineError::UnknownModule(name.clone())),
            None => self.registry.find_for_file(sniff).ok_or_else(|| {
                PipelineError::UnsignableFormat(request.path.display().to_string())
            }),
        }
    }

    /// Sign the raw input stream; the blob becomes the output file.
    fn sign_stream(
        &self,
        request: &SignRequest,
        module: &dyn SignerModule,
        options: &SignOptions,
        audit: &mut AuditRecord,
    ) -> Result<PathBuf, PipelineError> {
        let mut input = File::open(&request.path)?;
        let blob = module.sign(&mut input, &self.credentials, options)?;
        audit.set("perf.size.patch", blob.data.len() as u64);

        let output = match &request.output {
            Some(path) => path.clone(),
            None => default_stream_output(&request.path),
        };
        write_atomic(&output, &blob.data)?;

        Ok(output)
    }

    /// Run the module's transform, sign the covered bytes, and let the
    /// transform apply the signature to the output.
    fn sign_transformed(
        &self,
        request: &SignRequest,
        module: &dyn SignerModule,
        options: &SignOptions,
        audit: &mut AuditRecord,
    ) -> Result<PathBuf, PipelineError> {
        let mut transform = module.transform(&request.path, options)?;

        let blob = {
            let mut reader = transform.reader()?;
            module.sign(&mut reader, &self.credentials, options)?
        };
        audit.set("perf.size.patch", blob.data.len() as u64);

        let output = request.output.clone().unwrap_or_else(|| request.path.clone());
        transform.apply(&output, &blob)?;

        if module.capabilities().fixup {
            module.fixup(&output)?;
        }

        Ok(output)
    }
}

fn default_stream_output(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(".sig");
    PathBuf::from(name)
}
