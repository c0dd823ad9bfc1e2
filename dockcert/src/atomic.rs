//! Scoped file writes: readers see either the old file or the complete new one.

use std::io::Write;
use std::path::Path;
use tempfile::{Builder, NamedTempFile};

/// File mode applied to private keys on Unix.
#[cfg(unix)]
pub const PRIVATE_KEY_MODE: u32 = 0o600;

/// File mode applied to certificates and the published document on Unix.
#[cfg(unix)]
pub const PUBLIC_FILE_MODE: u32 = 0o644;

/// Write `contents` to `path` via a temporary sibling and rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut temp = temp_file_for(path)?;
    #[cfg(unix)]
    set_mode(&temp, PUBLIC_FILE_MODE)?;
    write_and_sync(&mut temp, contents)?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Like [`write_atomic`], keeping the file owner-only before any bytes land.
pub fn write_atomic_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut temp = temp_file_for(path)?;
    #[cfg(unix)]
    set_mode(&temp, PRIVATE_KEY_MODE)?;
    write_and_sync(&mut temp, contents)?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Hidden temporary file next to `path`, so store listings skip it. Removed
/// on drop unless persisted.
fn temp_file_for(path: &Path) -> std::io::Result<NamedTempFile> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let prefix = format!(".{name}.");

    Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(parent)
}

#[cfg(unix)]
fn set_mode(temp: &NamedTempFile, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    temp.as_file()
        .set_permissions(std::fs::Permissions::from_mode(mode))
}

fn write_and_sync(temp: &mut NamedTempFile, contents: &[u8]) -> std::io::Result<()> {
    temp.write_all(contents)?;
    temp.as_file().sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dir_names(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn writes_contents_and_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.pem");

        write_atomic(&path, b"hello").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        assert_eq!(dir_names(temp.path()), vec!["a.pem"]);
    }

    #[test]
    fn replaces_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.pem");
        std::fs::write(&path, "old").unwrap();

        write_atomic(&path, b"new").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(dir_names(temp.path()), vec!["a.pem"]);
    }

    #[test]
    fn missing_parent_fails_without_residue() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing").join("a.pem");

        assert!(write_atomic(&path, b"x").is_err());
        assert!(!path.exists());
        assert!(dir_names(temp.path()).is_empty());
    }

    #[test]
    fn failed_rename_cleans_up_temp_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.pem");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), "x").unwrap();

        assert!(write_atomic(&path, b"x").is_err());
        assert_eq!(dir_names(temp.path()), vec!["a.pem"]);
    }

    #[cfg(unix)]
    #[test]
    fn private_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a-key.pem");
        write_atomic_private(&path, b"secret").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, PRIVATE_KEY_MODE);
    }

    #[cfg(unix)]
    #[test]
    fn public_files_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.pem");
        write_atomic(&path, b"cert").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, PUBLIC_FILE_MODE);
    }
}
