//! Boot loader adapters.

use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use reportify::ResultExt;
use swix_common::artifact::ArtifactKind;
use swix_common::boot::{detect_bootloader, BootloaderKind};
use swix_common::cmdline::KernelCmdline;
use tracing::{debug, info};

use super::images::{ImageNaming, InstalledImage};
use crate::config::BootConfig;
use crate::error::{SwixError, SwixResult};

pub mod aboot;
pub mod grub;

/// Boot loader managing the installed images.
pub trait Bootloader: Debug {
    /// Kind of the boot loader.
    fn kind(&self) -> BootloaderKind;

    /// Installed images.
    fn list_images(&self) -> SwixResult<Vec<InstalledImage>>;

    /// Image the system is running.
    fn current_image(&self) -> SwixResult<InstalledImage>;

    /// Image booted after the next reboot.
    fn next_image(&self) -> SwixResult<InstalledImage>;

    /// Image booted when no one-time override is present.
    fn default_image(&self) -> SwixResult<InstalledImage>;

    /// Boot the given image after the next reboot.
    fn set_next(&self, image: &InstalledImage) -> SwixResult<()>;

    /// Boot the given image by default.
    fn set_default(&self, image: &InstalledImage) -> SwixResult<()>;

    /// Remove the given image, redirecting the boot selection if necessary.
    fn remove_image(&self, image: &InstalledImage) -> SwixResult<()>;

    /// Indicates whether installation artifacts of the given kind are supported.
    fn accepts(&self, kind: ArtifactKind) -> bool;

    /// Install the given artifact as a new image.
    fn install(&self, artifact: &Path) -> SwixResult<()>;
}

/// Environment shared by all boot loaders.
#[derive(Debug, Clone)]
pub struct BootContext {
    pub host_dir: PathBuf,
    pub naming: ImageNaming,
    pub cmdline: KernelCmdline,
}

impl BootContext {
    pub fn new(config: &BootConfig, cmdline: KernelCmdline) -> Self {
        Self {
            host_dir: config.host_dir.clone(),
            naming: ImageNaming::new(&config.image_prefix, &config.image_dir_prefix),
            cmdline,
        }
    }

    /// Image the system has been booted from.
    pub fn current_image(&self) -> SwixResult<InstalledImage> {
        self.cmdline
            .loop_slot()
            .and_then(|slot| self.naming.from_slot_dir(slot))
            .ok_or_else(|| {
                SwixError::Environment.report("unable to determine current image from cmdline")
            })
    }

    /// Slot directory of the given image.
    pub fn slot_path(&self, image: &InstalledImage) -> PathBuf {
        self.host_dir.join(image.slot_dir())
    }

    /// Check that the given image may be removed.
    pub fn check_removable(&self, image: &InstalledImage) -> SwixResult<InstalledImage> {
        let current = self.current_image()?;
        if *image == current {
            return Err(SwixError::PolicyViolation.report("cannot remove the current image"));
        }
        Ok(current)
    }

    /// Delete the slot directory of the given image.
    pub fn remove_slot(&self, image: &InstalledImage) -> SwixResult<()> {
        let slot_path = self.slot_path(image);
        info!("removing slot directory {slot_path:?}");
        fs::remove_dir_all(&slot_path)
            .or_else(|error| match error.kind() {
                io::ErrorKind::NotFound => {
                    debug!("slot directory {slot_path:?} does not exist");
                    Ok(())
                }
                _ => Err(error),
            })
            .whatever("unable to remove slot directory")
            .with_info(|_| format!("path: {slot_path:?}"))
    }
}

/// Create the boot loader configured or detected for the system.
pub fn from_config(config: &BootConfig, cmdline: KernelCmdline) -> SwixResult<Box<dyn Bootloader>> {
    let kind = config
        .loader
        .unwrap_or_else(|| detect_bootloader(&cmdline));
    debug!("using boot loader {}", kind.as_str());
    let context = BootContext::new(config, cmdline);
    Ok(match kind {
        BootloaderKind::Grub => Box::new(grub::GrubBootloader::new(
            context,
            config.grub_config_path(),
            Box::new(grub::GrubTools::new(
                &config.host_dir,
                config.grub_env_path(),
            )),
        )),
        BootloaderKind::Aboot => Box::new(aboot::AbootBootloader::new(
            context,
            config.aboot_config_path(),
            &config.swi_file,
        )),
    })
}
