//! Reconciliation loop
//!
//! One pass observes the running containers, prunes certificates whose
//! container is gone, issues certificates for new containers, and republishes
//! the TLS document from what is left in the store. Passes never overlap;
//! a failed pass is logged and retried after the next sleep.

use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

use crate::observer::DesiredStateObserver;
use crate::publish::{ConfigPublisher, PublishError};
use crate::runtime::RuntimeError;
use crate::tls::{CertificateFileEntry, CertificateStore, RootCa, StoreError, issue};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Container runtime query failed: {0}")]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Outcome of one successful pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Containers requesting a certificate
    pub desired: usize,
    pub issued: usize,
    pub removed: usize,
    /// Issuance failures; those containers are retried next pass
    pub failed: usize,
    /// Entries in the published TLS document
    pub published: usize,
}

impl PassReport {
    pub fn changed(&self) -> bool {
        self.issued > 0 || self.removed > 0
    }
}

pub struct Reconciler {
    ca: RootCa,
    observer: DesiredStateObserver,
    store: CertificateStore,
    publisher: ConfigPublisher,
}

impl Reconciler {
    pub fn new(
        ca: RootCa,
        observer: DesiredStateObserver,
        store: CertificateStore,
        publisher: ConfigPublisher,
    ) -> Self {
        Self {
            ca,
            observer,
            store,
            publisher,
        }
    }

    /// Run a single reconciliation pass.
    pub async fn run_pass(&self) -> Result<PassReport, ReconcileError> {
        let desired = self.observer.list_desired().await?;
        let existing = self.store.list_existing()?;

        let mut report = PassReport {
            desired: desired.len(),
            ..Default::default()
        };

        let mut present = BTreeMap::new();
        for (id, files) in existing {
            if !desired.contains_key(&id) {
                tracing::info!(id = %id, "Removing obsolete certificate");
                self.store.remove(&id)?;
                report.removed += 1;
            } else if !files.is_complete() {
                tracing::warn!(id = %id, "Certificate pair is incomplete, reissuing");
                self.store.remove(&id)?;
            } else {
                present.insert(id, files);
            }
        }

        for (id, request) in &desired {
            if present.contains_key(id) {
                continue;
            }

            let cert = match issue(&request.domains, &self.ca) {
                Ok(cert) => cert,
                Err(e) => {
                    tracing::error!(
                        container = %request.display_name,
                        id = %id,
                        domains = ?request.domains,
                        "Failed to issue certificate: {}",
                        e
                    );
                    report.failed += 1;
                    continue;
                }
            };

            tracing::info!(
                container = %request.display_name,
                domains = ?request.domains,
                "Creating certificate"
            );
            let entry = self.store.write(id, &cert)?;
            tracing::info!(
                id = %entry.container_id,
                cert_path = %entry.cert_path.display(),
                key_path = %entry.key_path.display(),
                not_after = %cert.not_after,
                "Certificate written"
            );
            report.issued += 1;
        }

        let entries = self.published_entries()?;
        let previous = self.publisher.read_current().unwrap_or_else(|e| {
            tracing::warn!("Could not read current TLS document: {}", e);
            None
        });
        let document = self.publisher.publish(&entries)?;
        report.published = document.certificates().len();

        if previous.as_ref() != Some(&document) {
            tracing::info!(
                path = %self.publisher.path().display(),
                certificates = report.published,
                "Published TLS configuration"
            );
        }

        Ok(report)
    }

    /// Complete pairs currently in the store, ordered by container id
    fn published_entries(&self) -> Result<Vec<CertificateFileEntry>, StoreError> {
        self.store
            .list_existing()?
            .into_iter()
            .filter(|(_, files)| files.is_complete())
            .map(|(id, _)| self.store.entry(&id))
            .collect()
    }

    /// Run passes until `shutdown` flips to `true`.
    ///
    /// Each pass is followed by a full `interval` sleep. Shutdown interrupts
    /// the sleep but never a pass in progress.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval = ?interval, "Starting reconciliation loop");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tracing::debug!("Checking for label changes");
            match self.run_pass().await {
                Ok(report) if report.changed() => {
                    tracing::info!(
                        desired = report.desired,
                        issued = report.issued,
                        removed = report.removed,
                        failed = report.failed,
                        published = report.published,
                        "Reconciliation pass complete"
                    );
                }
                Ok(report) => {
                    tracing::debug!(
                        desired = report.desired,
                        failed = report.failed,
                        "Reconciliation pass complete, nothing changed"
                    );
                }
                Err(e) => {
                    tracing::error!("Reconciliation pass failed: {}", e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Reconciliation loop stopped");
    }
}
