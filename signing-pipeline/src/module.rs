// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The interface signer modules implement and the registry that owns them.

use {
    crate::{
        credentials::{CertificateKind, SigningCredentials},
        error::PipelineError,
    },
    signature_envelope::DigestAlgorithm,
    std::{
        fs::File,
        io::Read,
        path::{Path, PathBuf},
        sync::Arc,
    },
};

/// How many leading bytes of a file are captured for format detection.
const SNIFF_LEN: usize = 1024;

/// Cheap facts about a file used to route it to a module.
#[derive(Clone, Debug)]
pub struct FileSniff {
    /// Up to [SNIFF_LEN] bytes from the start of the file.
    pub leading: Vec<u8>,
    /// Lowercased filename extension, if any.
    pub extension: Option<String>,
    pub size: u64,
}

impl FileSniff {
    pub fn of_path(path: &Path) -> Result<Self, PipelineError> {
        let metadata = std::fs::metadata(path)?;
        let mut leading = vec![0u8; SNIFF_LEN.min(metadata.len() as usize)];
        let mut fh = File::open(path)?;
        fh.read_exact(&mut leading)?;

        Ok(Self {
            leading,
            extension: path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase()),
            size: metadata.len(),
        })
    }
}

/// Which operations a module implements.
///
/// The pipeline consults this before calling into the module, so a module
/// never sees a request for an operation it did not advertise.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModuleCapabilities {
    pub sign: bool,
    pub verify: bool,
    pub transform: bool,
    pub fixup: bool,
}

/// Knobs for a single signing operation.
#[derive(Clone, Debug)]
pub struct SignOptions {
    pub digest_algorithm: DigestAlgorithm,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            digest_algorithm: DigestAlgorithm::Sha256,
        }
    }
}

/// The output of a module's sign operation.
#[derive(Clone, Debug)]
pub struct SignedBlob {
    pub mime_type: &'static str,
    pub data: Vec<u8>,
}

/// A format-specific signing backend.
///
/// Default method bodies report the operation as unsupported; modules
/// override exactly the operations their [ModuleCapabilities] advertise.
pub trait SignerModule: Send + Sync {
    fn name(&self) -> &'static str;

    fn certificate_kind(&self) -> CertificateKind {
        CertificateKind::X509
    }

    /// Whether this module handles a file with the given traits.
    fn recognizes(&self, sniff: &FileSniff) -> bool;

    fn capabilities(&self) -> ModuleCapabilities;

    fn sign(
        &self,
        _input: &mut dyn Read,
        _credentials: &SigningCredentials,
        _options: &SignOptions,
    ) -> Result<SignedBlob, PipelineError> {
        Err(PipelineError::UnsupportedOperation {
            module: self.name(),
            operation: "sign",
        })
    }

    fn verify(&self, _path: &Path, _options: &SignOptions) -> Result<(), PipelineError> {
        Err(PipelineError::UnsupportedOperation {
            module: self.name(),
            operation: "verify",
        })
    }

    /// Produce the byte stream the signature should cover.
    ///
    /// The default covers the whole file unchanged.
    fn transform(
        &self,
        path: &Path,
        _options: &SignOptions,
    ) -> Result<Box<dyn Transform>, PipelineError> {
        Ok(Box::new(WholeFileTransform::open(path)?))
    }

    /// Post-signing adjustment of the output file. Most formats need none.
    fn fixup(&self, _path: &Path) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Couples the to-be-signed byte stream with the logic that applies the
/// resulting signature to an output file.
pub trait Transform {
    /// The bytes the signature covers.
    fn reader(&mut self) -> Result<Box<dyn Read + '_>, PipelineError>;

    /// Write the signed artifact to `output`.
    fn apply(&self, output: &Path, blob: &SignedBlob) -> Result<(), PipelineError>;
}

/// The identity transform: sign the whole file, write the signature
/// alongside it as the output artifact.
pub struct WholeFileTransform {
    path: PathBuf,
}

impl WholeFileTransform {
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        if !path.is_file() {
            return Err(PipelineError::TransformFailed(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Transform for WholeFileTransform {
    fn reader(&mut self) -> Result<Box<dyn Read + '_>, PipelineError> {
        Ok(Box::new(File::open(&self.path)?))
    }

    fn apply(&self, output: &Path, blob: &SignedBlob) -> Result<(), PipelineError> {
        crate::atomic::write_atomic(output, &blob.data)
    }
}

/// An explicit collection of signer modules.
///
/// Selection is deterministic: lookups scan modules in registration order
/// and the first match wins. There is no process-global registry.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn SignerModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Arc<dyn SignerModule>) -> &mut Self {
        self.modules.push(module);
        self
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<dyn SignerModule>> {
        self.modules.iter().find(|m| m.name() == name).cloned()
    }

    pub fn find_for_file(&self, sniff: &FileSniff) -> Option<Arc<dyn SignerModule>> {
        self.modules.iter().find(|m| m.recognizes(sniff)).cloned()
    }

    pub fn modules(&self) -> &[Arc<dyn SignerModule>] {
        &self.modules
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    struct NamedStub {
        name: &'static str,
        extension: &'static str,
    }

    impl SignerModule for NamedStub {
        fn name(&self) -> &'static str {
            self.name
        }

        fn recognizes(&self, sniff: &FileSniff) -> bool {
            sniff.extension.as_deref() == Some(self.extension)
        }

        fn capabilities(&self) -> ModuleCapabilities {
            ModuleCapabilities {
                sign: true,
                ..Default::default()
            }
        }
    }

    #[test]
    fn sniff_captures_leading_bytes_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.TAR");
        std::fs::write(&path, b"ustar-ish").unwrap();

        let sniff = FileSniff::of_path(&path).unwrap();
        assert_eq!(sniff.leading, b"ustar-ish");
        assert_eq!(sniff.extension.as_deref(), Some("tar"));
        assert_eq!(sniff.size, 9);
    }

    #[test]
    fn registration_order_breaks_ties() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(NamedStub {
            name: "first",
            extension: "bin",
        }));
        registry.register(Arc::new(NamedStub {
            name: "second",
            extension: "bin",
        }));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.bin");
        std::fs::write(&path, b"data").unwrap();
        let sniff = FileSniff::of_path(&path).unwrap();

        assert_eq!(registry.find_for_file(&sniff).unwrap().name(), "first");
        assert_eq!(registry.find_by_name("second").unwrap().name(), "second");
        assert!(registry.find_by_name("third").is_none());
    }

    #[test]
    fn default_operations_report_unsupported() {
        let stub = NamedStub {
            name: "stub",
            extension: "bin",
        };
        let creds = crate::credentials::SigningCredentials::from_pem(
            signature_envelope::testdata::EC_KEY_PEM,
            signature_envelope::testdata::EC_CERT_PEM,
            "stub",
        )
        .unwrap();

        let mut empty: &[u8] = &[];
        assert!(matches!(
            stub.sign(&mut empty, &creds, &SignOptions::default()),
            Err(PipelineError::UnsupportedOperation {
                module: "stub",
                operation: "sign",
            })
        ));
        assert!(matches!(
            stub.verify(Path::new("/nonexistent"), &SignOptions::default()),
            Err(PipelineError::UnsupportedOperation {
                operation: "verify",
                ..
            })
        ));
    }

    #[test]
    fn whole_file_transform_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("payload");
        let mut fh = File::create(&input).unwrap();
        fh.write_all(b"transform me").unwrap();
        drop(fh);

        let mut transform = WholeFileTransform::open(&input).unwrap();
        let mut covered = Vec::new();
        transform.reader().unwrap().read_to_end(&mut covered).unwrap();
        assert_eq!(covered, b"transform me");

        let output = dir.path().join("payload.sig");
        transform
            .apply(
                &output,
                &SignedBlob {
                    mime_type: "application/octet-stream",
                    data: vec![1, 2, 3],
                },
            )
            .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), vec![1, 2, 3]);
    }
}
