//! Publishes the certificate store as the reverse proxy's TLS document

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

use dockcert_core::{TlsCertificate, TlsDocument};

use crate::atomic::write_atomic;
use crate::tls::CertificateFileEntry;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to serialize TLS document: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

pub struct ConfigPublisher {
    path: PathBuf,
    /// Directory the proxy sees the store under, when it differs from ours
    external_cert_dir: Option<PathBuf>,
    store_name: String,
}

impl ConfigPublisher {
    pub fn new(
        path: impl Into<PathBuf>,
        external_cert_dir: Option<PathBuf>,
        store_name: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            external_cert_dir,
            store_name: store_name.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path as the proxy should see it
    fn published_path(&self, path: &Path) -> String {
        let translated = match (&self.external_cert_dir, path.file_name()) {
            (Some(dir), Some(file_name)) => dir.join(file_name),
            _ => path.to_path_buf(),
        };
        translated.to_string_lossy().to_string()
    }

    /// Document listing every entry, in the given order
    pub fn render(&self, entries: &[CertificateFileEntry]) -> TlsDocument {
        TlsDocument::new(
            entries
                .iter()
                .map(|entry| TlsCertificate {
                    cert_file: self.published_path(&entry.cert_path),
                    key_file: self.published_path(&entry.key_path),
                    stores: vec![self.store_name.clone()],
                })
                .collect(),
        )
    }

    /// Overwrite the TLS document with exactly `entries`.
    pub fn publish(&self, entries: &[CertificateFileEntry]) -> Result<TlsDocument, PublishError> {
        let document = self.render(entries);
        let yaml = document.to_yaml()?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| PublishError::Write(parent.to_path_buf(), e))?;
        }
        write_atomic(&self.path, yaml.as_bytes())
            .map_err(|e| PublishError::Write(self.path.clone(), e))?;

        Ok(document)
    }

    /// The document currently on disk; `None` when missing or unparsable.
    ///
    /// Only used to report drift. The certificate store decides what gets
    /// issued.
    pub fn read_current(&self) -> Result<Option<TlsDocument>, PublishError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PublishError::Read(self.path.clone(), e)),
        };

        match TlsDocument::from_yaml(&text) {
            Ok(document) => Ok(Some(document)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "Existing TLS document is not valid YAML and will be replaced: {}",
                    e
                );
                Ok(None)
            }
        }
    }
}
