//! Abstractions for interacting with the system.

use reportify::ResultExt;
use swix_common::cmdline::KernelCmdline;
use tracing::debug;

use crate::config::{load_ctrl_config, CtrlConfig};
use crate::error::{SwixError, SwixResult};

pub mod bootloaders;
pub mod images;
pub mod installer;

use images::ImageStore;

/// Booted system with its configuration and installed images.
#[derive(Debug)]
pub struct System {
    pub config: CtrlConfig,
    pub images: ImageStore,
}

impl System {
    /// Initialize the system from the configuration file and the boot environment.
    pub fn initialize() -> SwixResult<Self> {
        let config = load_ctrl_config().whatever("unable to load configuration")?;
        Self::with_config(config)
    }

    pub fn with_config(config: CtrlConfig) -> SwixResult<Self> {
        let cmdline = KernelCmdline::read(&config.boot.cmdline_path).map_err(|error| {
            SwixError::Environment.report(format!(
                "unable to read kernel cmdline from {:?}: {error}",
                config.boot.cmdline_path
            ))
        })?;
        debug!("kernel cmdline: {cmdline:?}");
        let bootloader = bootloaders::from_config(&config.boot, cmdline)?;
        Ok(Self {
            config,
            images: ImageStore::new(bootloader),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use swix_common::boot::BootloaderKind;

    use super::*;

    #[test]
    fn test_with_config() {
        let dir = tempfile::tempdir().unwrap();
        let cmdline_path = dir.path().join("cmdline");
        fs::write(&cmdline_path, "Aboot=Aboot-norcal6 loop=image-1.0/fs.squashfs\n").unwrap();
        let mut config = CtrlConfig::default();
        config.boot.host_dir = dir.path().to_path_buf();
        config.boot.cmdline_path = cmdline_path;
        let system = System::with_config(config).unwrap();
        assert_eq!(system.images.bootloader().kind(), BootloaderKind::Aboot);
    }

    #[test]
    fn test_missing_cmdline() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CtrlConfig::default();
        config.boot.cmdline_path = dir.path().join("cmdline");
        let report = System::with_config(config).unwrap_err();
        assert_eq!(report.error(), &SwixError::Environment);
    }
}
