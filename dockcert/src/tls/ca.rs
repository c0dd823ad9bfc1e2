//! Root certificate authority
//!
//! The root CA is created once, persisted next to the certificate store, and
//! reused on every later start. Leaf certificates for containers are signed
//! with its key (see [`super::issuer`]).

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, PKCS_ECDSA_P384_SHA384, PublicKeyData,
};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use crate::atomic::{write_atomic, write_atomic_private};
use crate::defaults::{CA_CERT_FILENAME, CA_KEY_FILENAME};

/// Root CA certificate validity period (10 years)
const CA_VALIDITY_DAYS: i64 = 3650;

pub(crate) const CA_COMMON_NAME: &str = "dockcert Local Root CA";
pub(crate) const CA_ORGANIZATION: &str = "dockcert";
const CA_ORGANIZATIONAL_UNIT: &str = "Development";
const CA_COUNTRY: &str = "US";

/// Errors that can occur while loading or creating the root CA
#[derive(Debug, Error)]
pub enum CaError {
    #[error("Failed to generate keypair: {0}")]
    KeypairGeneration(String),

    #[error("Failed to generate certificate: {0}")]
    CertificateGeneration(String),

    #[error("Failed to parse certificate/key: {0}")]
    Parse(String),

    #[error("CA private key does not match the CA certificate")]
    KeyMismatch,

    #[error("Failed to read file {0}: {1}")]
    FileRead(PathBuf, std::io::Error),

    #[error("Failed to write file {0}: {1}")]
    FileWrite(PathBuf, std::io::Error),
}

pub type Result<T> = std::result::Result<T, CaError>;

/// Root CA key and certificate, immutable once loaded
#[derive(Clone)]
pub struct RootCa {
    cert_pem: String,
    key_pem: String,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl std::fmt::Debug for RootCa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootCa")
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

impl RootCa {
    /// Build a CA from PEM text, checking that the certificate parses and
    /// that the private key belongs to it.
    pub fn from_pem(cert_pem: String, key_pem: String) -> Result<Self> {
        let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem.as_bytes())
            .map_err(|e| CaError::Parse(format!("CA certificate is not PEM: {}", e)))?;
        let cert = pem
            .parse_x509()
            .map_err(|e| CaError::Parse(format!("CA certificate is not X.509: {}", e)))?;

        let key = KeyPair::from_pem(&key_pem)
            .map_err(|e| CaError::Parse(format!("Failed to parse CA private key: {}", e)))?;
        if key.subject_public_key_info() != cert.public_key().raw {
            return Err(CaError::KeyMismatch);
        }

        let validity = cert.validity();
        let not_before = asn1_to_offset(validity.not_before.timestamp())?;
        let not_after = asn1_to_offset(validity.not_after.timestamp())?;

        Ok(Self {
            cert_pem,
            key_pem,
            not_before,
            not_after,
        })
    }

    /// Generate a new self-signed root CA
    pub fn generate() -> Result<Self> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, CA_COMMON_NAME);
        dn.push(DnType::OrganizationName, CA_ORGANIZATION);
        dn.push(DnType::OrganizationalUnitName, CA_ORGANIZATIONAL_UNIT);
        dn.push(DnType::CountryName, CA_COUNTRY);
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let now = OffsetDateTime::now_utc();
        let not_before = now;
        let not_after = now + Duration::days(CA_VALIDITY_DAYS);
        params.not_before = not_before;
        params.not_after = not_after;

        let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384)
            .map_err(|e| CaError::KeypairGeneration(e.to_string()))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| CaError::CertificateGeneration(e.to_string()))?;

        Ok(Self {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
            not_before,
            not_after,
        })
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub(crate) fn key_pem(&self) -> &str {
        &self.key_pem
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    /// Whether the CA is expired or expires within `window`.
    pub fn expires_within(&self, window: std::time::Duration) -> bool {
        let window = Duration::try_from(window).unwrap_or(Duration::MAX);
        OffsetDateTime::now_utc().saturating_add(window) >= self.not_after
    }
}

fn asn1_to_offset(timestamp: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(timestamp)
        .map_err(|e| CaError::Parse(format!("CA validity out of range: {}", e)))
}

/// On-disk location of the root CA
pub struct CaStore {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl CaStore {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    /// Store using the standard file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CA_CERT_FILENAME), dir.join(CA_KEY_FILENAME))
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Load the persisted CA, or generate and persist a new one when either
    /// file is missing.
    ///
    /// Existing files that fail to parse are an error; they are never
    /// replaced silently.
    pub fn load_or_create(&self) -> Result<RootCa> {
        let cert_pem = read_optional(&self.cert_path)?;
        let key_pem = read_optional(&self.key_path)?;

        match (cert_pem, key_pem) {
            (Some(cert_pem), Some(key_pem)) => {
                let ca = RootCa::from_pem(cert_pem, key_pem)?;
                tracing::info!(
                    cert_path = %self.cert_path.display(),
                    not_before = %ca.not_before(),
                    not_after = %ca.not_after(),
                    "Loaded root CA"
                );
                Ok(ca)
            }
            (cert_pem, key_pem) => {
                if cert_pem.is_some() || key_pem.is_some() {
                    tracing::warn!(
                        cert_path = %self.cert_path.display(),
                        key_path = %self.key_path.display(),
                        "Root CA is incomplete on disk, generating a new one"
                    );
                }
                let ca = RootCa::generate()?;
                self.save(&ca)?;
                tracing::info!(
                    cert_path = %self.cert_path.display(),
                    key_path = %self.key_path.display(),
                    not_after = %ca.not_after(),
                    "Generated root CA"
                );
                Ok(ca)
            }
        }
    }

    fn save(&self, ca: &RootCa) -> Result<()> {
        for path in [&self.cert_path, &self.key_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| CaError::FileWrite(parent.to_path_buf(), e))?;
            }
        }

        write_atomic_private(&self.key_path, ca.key_pem.as_bytes())
            .map_err(|e| CaError::FileWrite(self.key_path.clone(), e))?;
        write_atomic(&self.cert_path, ca.cert_pem.as_bytes())
            .map_err(|e| CaError::FileWrite(self.cert_path.clone(), e))?;
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CaError::FileRead(path.to_path_buf(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use x509_parser::prelude::*;

    fn parse(pem_text: &str) -> (Vec<u8>, String) {
        let (_, pem) = x509_parser::pem::parse_x509_pem(pem_text.as_bytes()).unwrap();
        (pem.contents, pem.label)
    }

    #[test]
    fn generated_ca_is_a_signing_ca() {
        let ca = RootCa::generate().unwrap();
        let (der, label) = parse(ca.cert_pem());
        assert_eq!(label, "CERTIFICATE");
        let (_, cert) = X509Certificate::from_der(&der).unwrap();

        assert!(cert.is_ca());
        let usage = cert.key_usage().unwrap().unwrap().value;
        assert!(usage.key_cert_sign());
        assert!(usage.digital_signature());
        assert_eq!(cert.subject(), cert.issuer());

        let cn = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok());
        assert_eq!(cn, Some(CA_COMMON_NAME));
        assert!(cert.verify_signature(None).is_ok());
    }

    #[test]
    fn generated_ca_is_valid_for_years() {
        let ca = RootCa::generate().unwrap();
        assert!(ca.not_after() - ca.not_before() >= Duration::days(365 * 5));
        assert!(!ca.expires_within(std::time::Duration::from_secs(86400)));
    }

    #[test]
    fn bootstrap_creates_both_files() {
        let temp = TempDir::new().unwrap();
        let store = CaStore::in_dir(&temp.path().join("ca"));

        let ca = store.load_or_create().unwrap();

        assert_eq!(fs::read_to_string(store.cert_path()).unwrap(), ca.cert_pem());
        assert_eq!(fs::read_to_string(store.key_path()).unwrap(), ca.key_pem());
    }

    #[test]
    fn bootstrap_twice_returns_identical_ca_without_rewriting() {
        let temp = TempDir::new().unwrap();
        let store = CaStore::in_dir(temp.path());

        let first = store.load_or_create().unwrap();
        let cert_modified = fs::metadata(store.cert_path()).unwrap().modified().unwrap();
        let key_modified = fs::metadata(store.key_path()).unwrap().modified().unwrap();

        let second = store.load_or_create().unwrap();

        assert_eq!(first.cert_pem(), second.cert_pem());
        assert_eq!(first.key_pem(), second.key_pem());
        assert_eq!(
            fs::metadata(store.cert_path()).unwrap().modified().unwrap(),
            cert_modified
        );
        assert_eq!(
            fs::metadata(store.key_path()).unwrap().modified().unwrap(),
            key_modified
        );
        let entries = fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(entries, 2);
    }

    #[test]
    fn missing_key_regenerates_pair() {
        let temp = TempDir::new().unwrap();
        let store = CaStore::in_dir(temp.path());
        let first = store.load_or_create().unwrap();
        fs::remove_file(store.key_path()).unwrap();

        let second = store.load_or_create().unwrap();

        assert_ne!(first.cert_pem(), second.cert_pem());
        assert!(store.key_path().exists());
    }

    #[test]
    fn corrupt_certificate_is_an_error() {
        let temp = TempDir::new().unwrap();
        let store = CaStore::in_dir(temp.path());
        store.load_or_create().unwrap();
        fs::write(store.cert_path(), "not a certificate").unwrap();

        assert!(matches!(store.load_or_create(), Err(CaError::Parse(_))));
        assert_eq!(
            fs::read_to_string(store.cert_path()).unwrap(),
            "not a certificate"
        );
    }

    #[test]
    fn own_key_is_accepted_on_reload() {
        let ca = RootCa::generate().unwrap();
        let reloaded =
            RootCa::from_pem(ca.cert_pem().to_string(), ca.key_pem().to_string()).unwrap();
        assert_eq!(reloaded.cert_pem(), ca.cert_pem());
        assert_eq!(
            reloaded.not_after().unix_timestamp(),
            ca.not_after().unix_timestamp()
        );
    }

    #[test]
    fn mismatched_key_is_rejected() {
        let a = RootCa::generate().unwrap();
        let b = RootCa::generate().unwrap();

        let result = RootCa::from_pem(a.cert_pem().to_string(), b.key_pem().to_string());
        assert!(matches!(result, Err(CaError::KeyMismatch)));
    }

    #[cfg(unix)]
    #[test]
    fn ca_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = CaStore::in_dir(temp.path());
        store.load_or_create().unwrap();

        let mode = fs::metadata(store.key_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
