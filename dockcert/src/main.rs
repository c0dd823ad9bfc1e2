mod atomic;
mod defaults;
mod observer;
mod publish;
mod reconcile;
mod runtime;
mod tls;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::defaults::{
    CA_EXPIRY_WARNING, DEFAULT_CA_DIR, DEFAULT_CERT_DIR, DEFAULT_CHECK_INTERVAL_MS,
    DEFAULT_RUNTIME_TIMEOUT, DEFAULT_TLS_CONFIG,
};
use crate::observer::DesiredStateObserver;
use crate::publish::ConfigPublisher;
use crate::reconcile::Reconciler;
use crate::runtime::DockerCli;
use crate::tls::{CaStore, CertificateStore};
use dockcert_core::{DEFAULT_DOMAINS_LABEL, DEFAULT_ENABLE_LABEL, DEFAULT_TLS_STORE, LabelSelector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// dockcert - Locally-trusted certificates for labelled containers
#[derive(Parser, Debug)]
#[command(name = "dockcert")]
#[command(version)]
#[command(about = "Issues certificates for labelled containers and publishes them to the reverse proxy")]
pub struct Args {
    /// Directory holding the root CA (rootCA.pem, rootCA-key.pem)
    #[arg(long, env = "DOCKCERT_CA_DIR", default_value = DEFAULT_CA_DIR)]
    pub ca_dir: PathBuf,

    /// Directory certificate/key pairs are written to
    #[arg(long, env = "DOCKCERT_CERT_DIR", default_value = DEFAULT_CERT_DIR)]
    pub cert_dir: PathBuf,

    /// TLS document read by the reverse proxy
    #[arg(long, env = "DOCKCERT_TLS_CONFIG", default_value = DEFAULT_TLS_CONFIG)]
    pub tls_config: PathBuf,

    /// Certificate directory as mounted in the reverse proxy, used in the TLS document
    #[arg(long, env = "CERT_DIR")]
    pub external_cert_dir: Option<PathBuf>,

    /// Milliseconds to wait between reconciliation passes
    #[arg(long, env = "CHECK_INTERVAL", default_value_t = DEFAULT_CHECK_INTERVAL_MS)]
    pub check_interval_ms: u64,

    /// Seconds a single container runtime query may take
    #[arg(long, env = "DOCKCERT_RUNTIME_TIMEOUT", default_value_t = DEFAULT_RUNTIME_TIMEOUT.as_secs())]
    pub runtime_timeout_secs: u64,

    /// Docker CLI executable
    #[arg(long, env = "DOCKER_BIN", default_value = "docker")]
    pub docker_bin: String,

    /// Label that must be `true` on a container
    #[arg(long, env = "DOCKCERT_ENABLE_LABEL", default_value = DEFAULT_ENABLE_LABEL)]
    pub enable_label: String,

    /// Label listing the container's domains, comma-separated
    #[arg(long, env = "DOCKCERT_DOMAINS_LABEL", default_value = DEFAULT_DOMAINS_LABEL)]
    pub domains_label: String,

    /// TLS store name the certificates are published under
    #[arg(long, env = "DOCKCERT_TLS_STORE", default_value = DEFAULT_TLS_STORE)]
    pub tls_store: String,

    /// Log output format
    #[arg(long, env = "DOCKCERT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Run a single pass and exit
    #[arg(long)]
    pub once: bool,
}

impl Args {
    fn check_interval(&self) -> Result<Duration, String> {
        if self.check_interval_ms == 0 {
            return Err("--check-interval-ms must be greater than zero".to_string());
        }
        Ok(Duration::from_millis(self.check_interval_ms))
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }
}

/// Flip `tx` to `true` on SIGINT or SIGTERM.
fn spawn_shutdown_listener(tx: watch::Sender<bool>) {
    let tx_int = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received interrupt, shutting down");
            let _ = tx_int.send(true);
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        if let Ok(mut sigterm) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            let _ = sigterm.recv().await;
            tracing::info!("Received SIGTERM, shutting down");
            let _ = tx.send(true);
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let interval = args.check_interval()?;

    tracing::info!("dockcert v{}", env!("CARGO_PKG_VERSION"));
    let ca_store = CaStore::in_dir(&args.ca_dir);
    tracing::info!("Root CA certificate: {}", ca_store.cert_path().display());
    tracing::info!("Root CA key: {}", ca_store.key_path().display());
    tracing::info!("Certificate directory: {}", args.cert_dir.display());
    tracing::info!("TLS config: {}", args.tls_config.display());
    if let Some(external) = &args.external_cert_dir {
        tracing::info!("Published certificate directory: {}", external.display());
    }

    // Without a CA nothing can be issued; failures here end the process.
    let ca = ca_store.load_or_create()?;
    if ca.expires_within(CA_EXPIRY_WARNING) {
        tracing::warn!(
            not_after = %ca.not_after(),
            "Root CA is expired or about to expire; delete it to generate a new one"
        );
    }

    let store = CertificateStore::new(&args.cert_dir);
    store.init()?;

    let runtime = Arc::new(DockerCli::new(
        args.docker_bin.clone(),
        Duration::from_secs(args.runtime_timeout_secs),
    ));
    let selector = LabelSelector::new(args.enable_label.clone(), args.domains_label.clone());
    let observer = DesiredStateObserver::new(runtime, selector);
    let publisher = ConfigPublisher::new(
        &args.tls_config,
        args.external_cert_dir.clone(),
        args.tls_store.clone(),
    );

    let reconciler = Reconciler::new(ca, observer, store, publisher);

    if args.once {
        let report = reconciler.run_pass().await?;
        tracing::info!(
            desired = report.desired,
            issued = report.issued,
            removed = report.removed,
            failed = report.failed,
            published = report.published,
            "Reconciliation pass complete"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_shutdown_listener(shutdown_tx);

    reconciler.run(interval, shutdown_rx).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_match_standard_layout() {
        let args = Args::try_parse_from(["dockcert"]).unwrap();
        assert_eq!(args.ca_dir, PathBuf::from("./files/ca"));
        assert_eq!(args.cert_dir, PathBuf::from("./files/certs"));
        assert_eq!(args.tls_config, PathBuf::from("./files/traefik/tls.yml"));
        assert_eq!(args.enable_label, "traefik.enable");
        assert_eq!(args.domains_label, "mkcert.domains");
        assert_eq!(args.tls_store, "default");
        assert_eq!(args.log_format, LogFormat::Text);
        assert!(!args.once);
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "dockcert",
            "--cert-dir",
            "/data/certs",
            "--external-cert-dir",
            "/etc/traefik/certs",
            "--check-interval-ms",
            "2500",
            "--log-format",
            "json",
            "--once",
        ])
        .unwrap();
        assert_eq!(args.cert_dir, PathBuf::from("/data/certs"));
        assert_eq!(
            args.external_cert_dir,
            Some(PathBuf::from("/etc/traefik/certs"))
        );
        assert_eq!(args.check_interval().unwrap(), Duration::from_millis(2500));
        assert_eq!(args.log_format, LogFormat::Json);
        assert!(args.once);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let args = Args::try_parse_from(["dockcert", "--check-interval-ms", "0"]).unwrap();
        assert!(args.check_interval().is_err());
    }
}
