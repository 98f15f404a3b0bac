//! Configuration of Swix Ctrl.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reportify::ResultExt;
use serde::{Deserialize, Serialize};
use swix_common::boot::BootloaderKind;

use crate::error::SwixResult;

/// Path of the configuration file.
pub const CTRL_CONFIG_PATH: &str = "/etc/swix/ctrl.toml";

/// Load the configuration, falling back to the defaults if there is none.
pub fn load_ctrl_config() -> SwixResult<CtrlConfig> {
    load_ctrl_config_from(CTRL_CONFIG_PATH)
}

/// Load the configuration from the given path.
pub fn load_ctrl_config_from(path: impl AsRef<Path>) -> SwixResult<CtrlConfig> {
    let path = path.as_ref();
    Ok(if path.exists() {
        toml::from_str(&fs::read_to_string(path).whatever("unable to read configuration file")?)
            .whatever("unable to parse configuration file")
            .with_info(|_| format!("path: {path:?}"))?
    } else {
        CtrlConfig::default()
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct CtrlConfig {
    pub boot: BootConfig,
    pub install: InstallConfig,
    pub warm_restart: WarmRestartConfig,
}

/// Location and naming of the installed images.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct BootConfig {
    /// Directory holding the image slots and boot configuration.
    pub host_dir: PathBuf,
    /// Boot loader to use instead of detecting it.
    pub loader: Option<BootloaderKind>,
    /// File with the live kernel command line.
    pub cmdline_path: PathBuf,
    /// GRUB menu, relative to the host directory.
    pub grub_config: PathBuf,
    /// GRUB environment block, relative to the host directory.
    pub grub_env: PathBuf,
    /// Aboot boot configuration, relative to the host directory.
    pub aboot_config: PathBuf,
    /// Prefix of image names.
    pub image_prefix: String,
    /// Prefix of slot directories.
    pub image_dir_prefix: String,
    /// Name of the boot image inside an Aboot slot directory.
    pub swi_file: String,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            host_dir: PathBuf::from("/host"),
            loader: None,
            cmdline_path: PathBuf::from(swix_common::cmdline::PROC_CMDLINE),
            grub_config: PathBuf::from("grub/grub.cfg"),
            grub_env: PathBuf::from("grub/grubenv"),
            aboot_config: PathBuf::from("boot-config"),
            image_prefix: "SONiC-OS-".to_owned(),
            image_dir_prefix: "image-".to_owned(),
            swi_file: ".sonic-boot.swi".to_owned(),
        }
    }
}

impl BootConfig {
    pub fn grub_config_path(&self) -> PathBuf {
        self.host_dir.join(&self.grub_config)
    }

    pub fn grub_env_path(&self) -> PathBuf {
        self.host_dir.join(&self.grub_env)
    }

    pub fn aboot_config_path(&self) -> PathBuf {
        self.host_dir.join(&self.aboot_config)
    }
}

/// Image installation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct InstallConfig {
    /// Configuration tree carried over to a newly installed image.
    pub config_dir: PathBuf,
    /// Backup location of the configuration tree, relative to the host directory.
    pub config_backup: PathBuf,
    /// Delay after synchronizing filesystems.
    pub settle_secs: u64,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("/etc/sonic"),
            config_backup: PathBuf::from("old_config"),
            settle_secs: 3,
        }
    }
}

impl InstallConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

/// Warm restart timing and state store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct WarmRestartConfig {
    /// Attempts of the pending task check before a warm upgrade.
    pub quiesce_attempts: u32,
    /// Delay between pending task checks.
    pub quiesce_backoff_secs: u64,
    /// Delay after stopping or signaling agents.
    pub agent_settle_secs: u64,
    /// Delay between two reads of the reconciliation state.
    pub poll_interval_secs: u64,
    /// Reads of the reconciliation state before giving up.
    pub poll_attempts: u32,
    /// Container running the state store.
    pub database_container: String,
    /// Database index of the state store.
    pub state_db: u32,
}

impl Default for WarmRestartConfig {
    fn default() -> Self {
        Self {
            quiesce_attempts: 5,
            quiesce_backoff_secs: 1,
            agent_settle_secs: 2,
            poll_interval_secs: 2,
            poll_attempts: 90,
            database_container: "database".to_owned(),
            state_db: 6,
        }
    }
}

impl WarmRestartConfig {
    pub fn quiesce_backoff(&self) -> Duration {
        Duration::from_secs(self.quiesce_backoff_secs)
    }

    pub fn agent_settle(&self) -> Duration {
        Duration::from_secs(self.agent_settle_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn test_from_toml() {
        let config = toml::from_str::<CtrlConfig>(indoc! {r#"
            [boot]
            host-dir = "/mnt/host"
            loader = "aboot"

            [warm-restart]
            poll-attempts = 10
            poll-interval-secs = 0
        "#})
        .unwrap();
        assert_eq!(config.boot.host_dir, Path::new("/mnt/host"));
        assert_eq!(config.boot.loader, Some(BootloaderKind::Aboot));
        assert_eq!(
            config.boot.aboot_config_path(),
            Path::new("/mnt/host/boot-config")
        );
        assert_eq!(config.warm_restart.poll_attempts, 10);
        assert_eq!(config.warm_restart.quiesce_attempts, 5);
        assert_eq!(config.install.settle_secs, 3);
    }

    #[test]
    fn test_reject_unknown_keys() {
        assert!(toml::from_str::<CtrlConfig>("[boot]\nhostdir = \"/x\"\n").is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_ctrl_config_from(dir.path().join("ctrl.toml")).unwrap();
        assert_eq!(config.boot.host_dir, Path::new("/host"));
        assert_eq!(config.warm_restart.poll_attempts, 90);
    }
}
