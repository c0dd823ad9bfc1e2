//! Certificate store - one certificate/key file pair per container

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

use dockcert_core::{
    ContainerIdError, StoreFileKind, cert_file_name, key_file_name, parse_store_file_name,
    validate_container_id,
};

use super::issuer::DomainCertificate;
use crate::atomic::{write_atomic, write_atomic_private};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Certificate store I/O on {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error(transparent)]
    InvalidId(#[from] ContainerIdError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// File pair owned by one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFileEntry {
    pub container_id: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Files found on disk for one container id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredFiles {
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

impl StoredFiles {
    /// Both halves of the pair are present
    pub fn is_complete(&self) -> bool {
        self.cert.is_some() && self.key.is_some()
    }
}

pub struct CertificateStore {
    dir: PathBuf,
}

impl CertificateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the store directory
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::Io(self.dir.clone(), e))
    }

    /// Deterministic file paths for a container id
    pub fn entry(&self, container_id: &str) -> Result<CertificateFileEntry> {
        validate_container_id(container_id)?;
        Ok(CertificateFileEntry {
            container_id: container_id.to_string(),
            cert_path: self.dir.join(cert_file_name(container_id)),
            key_path: self.dir.join(key_file_name(container_id)),
        })
    }

    /// Group the store's files by container id.
    ///
    /// A missing directory is an empty store.
    pub fn list_existing(&self) -> Result<BTreeMap<String, StoredFiles>> {
        let mut existing: BTreeMap<String, StoredFiles> = BTreeMap::new();

        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(existing),
            Err(e) => return Err(StoreError::Io(self.dir.clone(), e)),
        };

        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| StoreError::Io(self.dir.clone(), e))?;
            let path = dir_entry.path();
            let file_type = dir_entry
                .file_type()
                .map_err(|e| StoreError::Io(path.clone(), e))?;
            if file_type.is_dir() {
                continue;
            }

            let file_name = dir_entry.file_name();
            let Some((id, kind)) = parse_store_file_name(&file_name.to_string_lossy()) else {
                continue;
            };

            let files = existing.entry(id).or_default();
            match kind {
                StoreFileKind::Certificate => files.cert = Some(path),
                StoreFileKind::PrivateKey => files.key = Some(path),
            }
        }

        Ok(existing)
    }

    /// Persist a certificate pair for `container_id`.
    ///
    /// The key lands before the certificate, so a visible certificate always
    /// has its key next to it.
    pub fn write(
        &self,
        container_id: &str,
        cert: &DomainCertificate,
    ) -> Result<CertificateFileEntry> {
        let entry = self.entry(container_id)?;
        self.init()?;

        write_atomic_private(&entry.key_path, cert.key_pem.as_bytes())
            .map_err(|e| StoreError::Io(entry.key_path.clone(), e))?;
        write_atomic(&entry.cert_path, cert.cert_pem.as_bytes())
            .map_err(|e| StoreError::Io(entry.cert_path.clone(), e))?;

        Ok(entry)
    }

    /// Delete both files of a container; either may already be gone.
    pub fn remove(&self, container_id: &str) -> Result<()> {
        let entry = self.entry(container_id)?;
        for path in [&entry.cert_path, &entry.key_path] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::Io(path.clone(), e)),
            }
        }
        Ok(())
    }
}
