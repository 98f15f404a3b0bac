//! Rollback of service containers to their previous image.

use tracing::info;

use super::registry::ContainerImageRegistry;
use super::runtime::{ContainerRuntime, ServiceManager};
use super::ContainerName;
use crate::error::{SwixError, SwixResult};

/// Result of a rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The service has been restarted with the previous image.
    Restarted { image_id: String },
    /// The previous image is tagged as latest but only takes effect after a
    /// cold reboot.
    ColdRebootRequired { image_id: String },
}

/// Restores the previous image generation of a service.
#[derive(Debug, Clone, Copy)]
pub struct RollbackManager<'r> {
    runtime: &'r dyn ContainerRuntime,
    services: &'r dyn ServiceManager,
}

impl<'r> RollbackManager<'r> {
    pub fn new(runtime: &'r dyn ContainerRuntime, services: &'r dyn ServiceManager) -> Self {
        Self { runtime, services }
    }

    /// Tag the previous image of the service as latest.
    ///
    /// Requires exactly two image generations.
    pub fn rollback(&self, container: ContainerName) -> SwixResult<RollbackOutcome> {
        let registry = ContainerImageRegistry::new(self.runtime);
        let image_name = registry.image_name(container.as_str())?;
        let ids = registry.image_ids(&image_name)?;
        if ids.len() != 2 {
            return Err(SwixError::Precondition.report(format!(
                "two images required, but there are {} images for {image_name}",
                ids.len()
            )));
        }
        let latest = format!("{image_name}:latest");
        let Some(latest_id) = registry.image_id(&latest)? else {
            return Err(SwixError::Precondition
                .report(format!("no image of {image_name} is tagged as latest")));
        };
        let Some(previous_id) = ids.into_iter().find(|id| *id != latest_id) else {
            return Err(SwixError::Precondition.report(format!("no previous image of {image_name}")));
        };
        registry.tag(&previous_id, &latest)?;
        if container.is_warm_capable() {
            info!("cold reboot is required to restore system state after {container} rollback");
            return Ok(RollbackOutcome::ColdRebootRequired {
                image_id: previous_id,
            });
        }
        self.services.restart(container.as_str())?;
        Ok(RollbackOutcome::Restarted {
            image_id: previous_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::testing::{FakeRuntime, FakeServices};

    #[test]
    fn test_rollback() {
        let runtime = FakeRuntime::with_container("snmp", "docker-snmp-sv2");
        runtime.add_image("docker-snmp-sv2:latest", "id-2");
        runtime.add_image("docker-snmp-sv2:2.0", "id-2");
        runtime.add_image("docker-snmp-sv2:1.0", "id-1");
        let services = FakeServices::default();
        let manager = RollbackManager::new(&runtime, &services);
        let outcome = manager.rollback(ContainerName::Snmp).unwrap();
        assert_eq!(
            outcome,
            RollbackOutcome::Restarted {
                image_id: "id-1".to_owned()
            }
        );
        assert_eq!(runtime.id_of("docker-snmp-sv2:latest").as_deref(), Some("id-1"));
        assert_eq!(*services.log.borrow(), ["restart snmp"]);
    }

    #[test]
    fn test_rollback_warm_capable() {
        let runtime = FakeRuntime::with_container("bgp", "docker-fpm-frr");
        runtime.add_image("docker-fpm-frr:latest", "id-2");
        runtime.add_image("docker-fpm-frr:1.0", "id-1");
        let services = FakeServices::default();
        let manager = RollbackManager::new(&runtime, &services);
        let outcome = manager.rollback(ContainerName::Bgp).unwrap();
        assert_eq!(
            outcome,
            RollbackOutcome::ColdRebootRequired {
                image_id: "id-1".to_owned()
            }
        );
        assert!(services.log.borrow().is_empty());
    }

    #[test]
    fn test_rollback_requires_two_generations() {
        for ids in [&["id-1"][..], &["id-1", "id-2", "id-3"][..]] {
            let runtime = FakeRuntime::with_container("snmp", "docker-snmp-sv2");
            runtime.add_image("docker-snmp-sv2:latest", ids[0]);
            for (idx, id) in ids.iter().enumerate() {
                runtime.add_image(&format!("docker-snmp-sv2:{idx}"), id);
            }
            let services = FakeServices::default();
            let manager = RollbackManager::new(&runtime, &services);
            let report = manager.rollback(ContainerName::Snmp).unwrap_err();
            assert_eq!(report.error(), &SwixError::Precondition);
            assert!(runtime.log.borrow().is_empty());
        }
    }
}
