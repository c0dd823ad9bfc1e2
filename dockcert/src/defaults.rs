use std::time::Duration;

pub const DEFAULT_CA_DIR: &str = "./files/ca";
pub const DEFAULT_CERT_DIR: &str = "./files/certs";
pub const DEFAULT_TLS_CONFIG: &str = "./files/traefik/tls.yml";

pub const CA_CERT_FILENAME: &str = "rootCA.pem";
pub const CA_KEY_FILENAME: &str = "rootCA-key.pem";

pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_RUNTIME_TIMEOUT: Duration = Duration::from_secs(30);

/// Warn at startup when the root CA expires within this window.
pub const CA_EXPIRY_WARNING: Duration = Duration::from_secs(30 * 24 * 60 * 60);
