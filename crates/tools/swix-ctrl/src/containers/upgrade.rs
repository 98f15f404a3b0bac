//! Upgrade of service containers.

use std::path::PathBuf;

use tracing::{info, warn};

use super::registry::ContainerImageRegistry;
use super::runtime::{ContainerRuntime, ServiceManager};
use super::warm_restart::{Reconciliation, WarmRestartCoordinator, WarmRestartStore, WarmSession};
use super::ContainerName;
use crate::config::WarmRestartConfig;
use crate::error::{SwixError, SwixResult};

/// Requested container upgrade.
#[derive(Debug, Clone)]
pub struct ContainerUpgradeSpec {
    pub container: ContainerName,
    /// Image archive to load.
    pub artifact: PathBuf,
    /// Tag of the new image, defaults to the tag embedded in the image.
    pub tag: Option<String>,
    /// Restart the service warm.
    pub warm: bool,
    /// Remove the previous image as well.
    pub cleanup_image: bool,
    /// Abort if the service cannot be quiesced.
    pub enforce_check: bool,
}

/// Result of a completed upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    pub image_name: String,
    pub tag: String,
    pub removed_ids: Vec<String>,
    /// Outcome of the warm restart, `None` for a cold restart.
    pub reconciliation: Option<Reconciliation>,
}

impl UpgradeReport {
    /// Indicates whether the service reached its expected state.
    pub fn succeeded(&self) -> bool {
        self.reconciliation
            .map_or(true, |reconciliation| reconciliation.is_reconciled())
    }
}

/// Swaps the container image of a service.
#[derive(Debug, Clone, Copy)]
pub struct ContainerUpgrader<'u> {
    runtime: &'u dyn ContainerRuntime,
    services: &'u dyn ServiceManager,
    store: &'u dyn WarmRestartStore,
    config: &'u WarmRestartConfig,
}

impl<'u> ContainerUpgrader<'u> {
    pub fn new(
        runtime: &'u dyn ContainerRuntime,
        services: &'u dyn ServiceManager,
        store: &'u dyn WarmRestartStore,
        config: &'u WarmRestartConfig,
    ) -> Self {
        Self {
            runtime,
            services,
            store,
            config,
        }
    }

    fn registry(&self) -> ContainerImageRegistry<'u> {
        ContainerImageRegistry::new(self.runtime)
    }

    fn coordinator(&self) -> WarmRestartCoordinator<'u> {
        WarmRestartCoordinator::new(self.store, self.runtime, self.config)
    }

    /// Upgrade the service's container to the image in the artifact.
    ///
    /// A failed reconciliation does not fail the upgrade, it is part of the
    /// returned report.
    pub fn upgrade(&self, spec: &ContainerUpgradeSpec) -> SwixResult<UpgradeReport> {
        if spec.warm && !spec.container.is_warm_capable() {
            return Err(SwixError::Precondition.report(format!(
                "service {} does not support warm restarts",
                spec.container
            )));
        }
        if !spec.artifact.is_file() {
            return Err(SwixError::Precondition
                .report(format!("image file {:?} does not exist", spec.artifact)));
        }
        let registry = self.registry();
        let image_name = registry.image_name(spec.container.as_str())?;
        let previous_id = registry.image_id(&format!("{image_name}:latest"))?;
        info!("upgrading {} from image {image_name}", spec.container);

        let coordinator = self.coordinator();
        let session = coordinator.begin(spec.container, spec.warm)?;
        let result = self.swap(spec, &image_name, previous_id.as_deref(), session.as_ref());
        if let Some(session) = &session {
            if let Err(report) = coordinator.finish(session) {
                if result.is_ok() {
                    return Err(report);
                }
                warn!("unable to restore warm restart flag: {report:?}");
            }
        }
        let report = result?;

        for unit in spec.container.dependent_units() {
            self.services.start(unit.as_str())?;
        }
        Ok(report)
    }

    fn swap(
        &self,
        spec: &ContainerUpgradeSpec,
        image_name: &str,
        previous_id: Option<&str>,
        session: Option<&WarmSession>,
    ) -> SwixResult<UpgradeReport> {
        let registry = self.registry();
        let coordinator = self.coordinator();
        let container = spec.container.as_str();
        let latest = format!("{image_name}:latest");

        if let Some(session) = session {
            coordinator.quiesce(session, spec.enforce_check)?;
        }
        self.services.stop(container)?;
        self.runtime.remove_container(container)?;
        registry.load(&spec.artifact)?;
        let tag = match &spec.tag {
            Some(tag) => tag.clone(),
            None => registry.embedded_tag(&latest),
        };
        registry.tag(&latest, &format!("{image_name}:{tag}"))?;
        self.services.restart(container)?;

        let latest_id = registry.image_id(&latest)?;
        let mut removed_ids = Vec::new();
        for id in registry.image_ids(image_name)? {
            if Some(id.as_str()) == latest_id.as_deref() {
                continue;
            }
            if !spec.cleanup_image && Some(id.as_str()) == previous_id {
                continue;
            }
            registry.remove(&id)?;
            removed_ids.push(id);
        }

        let reconciliation = session.map(|session| coordinator.await_reconciliation(session));
        Ok(UpgradeReport {
            image_name: image_name.to_owned(),
            tag,
            removed_ids,
            reconciliation,
        })
    }
}
