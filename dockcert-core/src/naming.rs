//! Certificate store file naming.
//!
//! Each container owns two files in the store directory: `<id>.pem` for the
//! certificate and `<id>-key.pem` for the private key. The container id is
//! the join key between them.

use thiserror::Error;

pub const CERT_SUFFIX: &str = ".pem";
pub const KEY_SUFFIX: &str = "-key.pem";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerIdError {
    #[error("container id must not be empty")]
    Empty,

    #[error("container id '{0}' contains characters not allowed in a file name")]
    InvalidCharacters(String),

    #[error("container id '{0}' ends with the reserved '-key' suffix")]
    ReservedSuffix(String),
}

/// Check that a container id can be used as a store file stem.
pub fn validate_container_id(id: &str) -> Result<(), ContainerIdError> {
    if id.is_empty() {
        return Err(ContainerIdError::Empty);
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ContainerIdError::InvalidCharacters(id.to_string()));
    }
    if id.ends_with("-key") {
        return Err(ContainerIdError::ReservedSuffix(id.to_string()));
    }
    Ok(())
}

pub fn cert_file_name(id: &str) -> String {
    format!("{id}{CERT_SUFFIX}")
}

pub fn key_file_name(id: &str) -> String {
    format!("{id}{KEY_SUFFIX}")
}

/// Which half of a certificate pair a store file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFileKind {
    Certificate,
    PrivateKey,
}

/// Map a store file name back to its container id.
///
/// Returns `None` for hidden files (in-flight temporaries included), files
/// without the `.pem` extension, and stems that are not valid container ids.
pub fn parse_store_file_name(file_name: &str) -> Option<(String, StoreFileKind)> {
    if file_name.starts_with('.') {
        return None;
    }

    let (id, kind) = if let Some(id) = file_name.strip_suffix(KEY_SUFFIX) {
        (id, StoreFileKind::PrivateKey)
    } else if let Some(id) = file_name.strip_suffix(CERT_SUFFIX) {
        (id, StoreFileKind::Certificate)
    } else {
        return None;
    };

    validate_container_id(id).ok()?;
    Some((id.to_string(), kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "4f1c2a9e0b7d4f1c2a9e0b7d4f1c2a9e0b7d4f1c2a9e0b7d4f1c2a9e0b7d4f1c";

    #[test]
    fn file_names_share_the_container_id() {
        assert_eq!(cert_file_name(ID), format!("{ID}.pem"));
        assert_eq!(key_file_name(ID), format!("{ID}-key.pem"));
    }

    #[test]
    fn parse_maps_both_files_back_to_id() {
        assert_eq!(
            parse_store_file_name(&cert_file_name(ID)),
            Some((ID.to_string(), StoreFileKind::Certificate))
        );
        assert_eq!(
            parse_store_file_name(&key_file_name(ID)),
            Some((ID.to_string(), StoreFileKind::PrivateKey))
        );
    }

    #[test]
    fn parse_ignores_foreign_files() {
        assert_eq!(parse_store_file_name(".abc.pem.tmp"), None);
        assert_eq!(parse_store_file_name(".abc.pem"), None);
        assert_eq!(parse_store_file_name("README.md"), None);
        assert_eq!(parse_store_file_name("abc.crt"), None);
        assert_eq!(parse_store_file_name("a.b.pem"), None);
        assert_eq!(parse_store_file_name(".pem"), None);
        assert_eq!(parse_store_file_name("-key.pem"), None);
    }

    #[test]
    fn validate_rejects_path_like_ids() {
        assert_eq!(validate_container_id(""), Err(ContainerIdError::Empty));
        assert!(matches!(
            validate_container_id("../etc"),
            Err(ContainerIdError::InvalidCharacters(_))
        ));
        assert!(matches!(
            validate_container_id("a/b"),
            Err(ContainerIdError::InvalidCharacters(_))
        ));
        assert!(matches!(
            validate_container_id("web-key"),
            Err(ContainerIdError::ReservedSuffix(_))
        ));
        assert!(validate_container_id("web_1-abc").is_ok());
    }
}
