//! TLS/Certificate management
//!
//! Handles:
//! - Root CA bootstrap and persistence
//! - Leaf certificate issuance for container domain sets
//! - The on-disk certificate store keyed by container id

mod ca;
mod issuer;
mod store;

pub use ca::{CaStore, RootCa};
pub use issuer::issue;
pub use store::{CertificateFileEntry, CertificateStore, StoreError};
