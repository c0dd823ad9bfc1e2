//! Desired state - which containers want which domains

use std::collections::BTreeMap;
use std::sync::Arc;

use dockcert_core::{LabelSelector, parse_domains, validate_container_id};

use crate::runtime::{ContainerDescriptor, ContainerRuntime, RuntimeError};

/// Certificate request derived from one container's labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredCertificate {
    pub display_name: String,
    /// Ordered, deduplicated; the first entry is the primary name
    pub domains: Vec<String>,
}

pub struct DesiredStateObserver {
    runtime: Arc<dyn ContainerRuntime>,
    selector: LabelSelector,
}

impl DesiredStateObserver {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, selector: LabelSelector) -> Self {
        Self { runtime, selector }
    }

    /// Container id -> requested certificate, for every running container
    /// that opts in.
    ///
    /// Containers with no usable domains or with ids unfit for file names are
    /// skipped with a warning.
    pub async fn list_desired(&self) -> Result<BTreeMap<String, DesiredCertificate>, RuntimeError> {
        let containers = self.runtime.running_containers(&self.selector).await?;

        let mut desired = BTreeMap::new();
        for container in containers {
            if let Some(request) = self.desired_for(&container) {
                desired.insert(container.id, request);
            }
        }
        Ok(desired)
    }

    fn desired_for(&self, container: &ContainerDescriptor) -> Option<DesiredCertificate> {
        let enabled = container
            .labels
            .get(&self.selector.enable)
            .is_some_and(|v| LabelSelector::is_enabled_value(v));
        if !enabled {
            return None;
        }

        let raw = container.labels.get(&self.selector.domains)?;

        if let Err(e) = validate_container_id(&container.id) {
            tracing::warn!(container = %container.display_name, "Skipping container: {}", e);
            return None;
        }

        let domains = parse_domains(raw);
        if domains.is_empty() {
            tracing::warn!(
                container = %container.display_name,
                id = %container.id,
                label = %self.selector.domains,
                "Skipping container with no domains"
            );
            return None;
        }

        Some(DesiredCertificate {
            display_name: container.display_name.clone(),
            domains,
        })
    }
}
