//! dockcert Core - Shared vocabulary
//!
//! This crate holds the I/O-free pieces shared by the `dockcert` reconciler:
//! container label conventions, domain-label parsing, certificate file naming,
//! and the serde model of the TLS document consumed by the reverse proxy.
//!
//! Everything that touches the filesystem, the container runtime, or key
//! material lives in the `dockcert` crate.

mod labels;
mod naming;
mod tls_document;

pub use labels::*;
pub use naming::*;
pub use tls_document::*;
