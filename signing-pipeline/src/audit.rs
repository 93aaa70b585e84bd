// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Structured audit trail for signing operations.
//!
//! A record is an owned value threaded through the pipeline by `&mut`
//! reference. Fields accumulate as the operation progresses and the record
//! is published at most once, only after the operation succeeds. A failed
//! operation leaves no audit entry.

use {
    crate::error::PipelineError,
    chrono::{DateTime, Utc},
    serde::Serialize,
    serde_json::Value,
    std::{
        collections::BTreeMap,
        io::Write,
        path::{Path, PathBuf},
        sync::Mutex,
    },
};

/// Accumulated facts about one signing operation.
///
/// Keys use dotted names (`sig.type`, `perf.elapsed.ms`) and serialize in
/// sorted order, so log lines are diffable across runs.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct AuditRecord {
    fields: BTreeMap<String, Value>,
}

impl AuditRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn set_timestamp(&mut self, key: impl Into<String>, when: DateTime<Utc>) -> &mut Self {
        self.set(key, when.to_rfc3339())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Destination for published audit records.
pub trait AuditSink: Send + Sync {
    fn publish(&self, record: &AuditRecord) -> Result<(), PipelineError>;
}

/// Appends one JSON object per record to a file.
pub struct JsonFileSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }
}

impl AuditSink for JsonFileSink {
    fn publish(&self, record: &AuditRecord) -> Result<(), PipelineError> {
        let line = record.to_json()?;

        let _guard = self
            .lock
            .lock()
            .map_err(|_| PipelineError::FixupFailed("audit sink lock poisoned".to_string()))?;
        let mut fh = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        fh.write_all(line.as_bytes())?;
        fh.write_all(b"\n")?;

        Ok(())
    }
}
