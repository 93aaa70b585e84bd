// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Unified error type for pipeline operations.

use {
    crate::credentials::CertificateKind,
    signature_envelope::{EnvelopeError, TimeStampError},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no module recognizes {0}")]
    UnsignableFormat(String),

    #[error("no module named {0} is registered")]
    UnknownModule(String),

    #[error("module {module} does not support {operation}")]
    UnsupportedOperation {
        module: &'static str,
        operation: &'static str,
    },

    #[error("credentials carry no {0} certificate")]
    NoSuchCertificateType(CertificateKind),

    #[error("transform failed: {0}")]
    TransformFailed(String),

    #[error("fixup failed: {0}")]
    FixupFailed(String),

    #[error("signature envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("timestamp error: {0}")]
    TimeStamp(#[from] TimeStampError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
