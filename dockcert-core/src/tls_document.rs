//! Dynamic TLS configuration document read by the reverse proxy.
//!
//! Shape: `{ tls: { certificates: [ { certFile, keyFile, stores: [..] } ] } }`

use serde::{Deserialize, Serialize};

/// Default TLS store the proxy attaches published certificates to.
pub const DEFAULT_TLS_STORE: &str = "default";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsDocument {
    #[serde(default)]
    pub tls: TlsSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSection {
    #[serde(default)]
    pub certificates: Vec<TlsCertificate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsCertificate {
    pub cert_file: String,
    pub key_file: String,
    #[serde(default)]
    pub stores: Vec<String>,
}

impl TlsDocument {
    pub fn new(certificates: Vec<TlsCertificate>) -> Self {
        Self {
            tls: TlsSection { certificates },
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Parse a document; an empty file yields an empty document.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn certificates(&self) -> &[TlsCertificate] {
        &self.tls.certificates
    }
}
