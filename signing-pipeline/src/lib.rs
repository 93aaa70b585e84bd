// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Format-agnostic file signing.
//!
//! A [SigningPipeline] routes files to [SignerModule] backends held in an
//! explicit [ModuleRegistry]. Modules advertise their operations through
//! [ModuleCapabilities] and receive key material as [SigningCredentials].
//! Every successful operation is recorded as an [AuditRecord].
//!
//! The [RawDataModule] backend signs any byte stream as a PKCS#7
//! SignedData envelope and is the usual registry fallback:
//!
//! ```no_run
//! use signing_pipeline::{
//!     AuditRecord, ModuleRegistry, RawDataModule, SignRequest, SigningCredentials,
//!     SigningPipeline,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), signing_pipeline::PipelineError> {
//! let credentials = SigningCredentials::from_pem(
//!     &std::fs::read_to_string("key.pem")?,
//!     &std::fs::read_to_string("chain.pem")?,
//!     "release-key",
//! )?;
//!
//! let mut registry = ModuleRegistry::new();
//! registry.register(Arc::new(RawDataModule::new()));
//!
//! let pipeline = SigningPipeline::new(registry, credentials);
//! let mut audit = AuditRecord::new();
//! let output = pipeline.sign(&SignRequest::new("artifact.tar"), &mut audit)?;
//! println!("wrote {}", output.display());
//! # Ok(())
//! # }
//! ```

mod atomic;
mod audit;
mod credentials;
mod error;
mod module;
mod pipeline;
mod raw;

pub use crate::{
    atomic::write_atomic,
    audit::{AuditRecord, AuditSink, JsonFileSink},
    credentials::{CertificateKind, SigningCredentials},
    error::PipelineError,
    module::{
        FileSniff, ModuleCapabilities, ModuleRegistry, SignOptions, SignedBlob, SignerModule,
        Transform, WholeFileTransform,
    },
    pipeline::{SignRequest, SigningPipeline},
    raw::RawDataModule,
};
