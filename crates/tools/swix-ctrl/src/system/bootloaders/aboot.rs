//! Aboot boot loader.

use std::fs;
use std::path::{Path, PathBuf};

use reportify::ResultExt;
use swix_common::artifact::{ArtifactKind, ABOOT_INSTALLER};
use swix_common::boot::aboot::{flash_path, slot_of_flash_path, AbootConfig, SWI, SWI_DEFAULT};
use swix_common::boot::BootloaderKind;
use tracing::info;
use xscript::{cmd, vars};

use super::{BootContext, Bootloader};
use crate::error::{SwixError, SwixResult};
use crate::exec::run_cmd;
use crate::system::images::InstalledImage;

/// Aboot, configured through a `key=value` boot configuration.
///
/// `SWI` selects the image booted next. `SWI_DEFAULT`, if present, records the
/// default image.
#[derive(Debug)]
pub struct AbootBootloader {
    context: BootContext,
    config_path: PathBuf,
    swi_file: String,
}

impl AbootBootloader {
    pub fn new(context: BootContext, config_path: PathBuf, swi_file: &str) -> Self {
        Self {
            context,
            config_path,
            swi_file: swi_file.to_owned(),
        }
    }

    fn load_config(&self) -> SwixResult<AbootConfig> {
        AbootConfig::load(&self.config_path).map_err(|error| {
            SwixError::Environment.report(format!(
                "unable to load Aboot boot configuration {:?}: {error}",
                self.config_path
            ))
        })
    }

    fn save_config(&self, config: &AbootConfig) -> SwixResult<()> {
        config
            .save(&self.config_path)
            .whatever("unable to write Aboot boot configuration")
            .with_info(|_| format!("path: {:?}", self.config_path))
    }

    fn boot_path(&self, image: &InstalledImage) -> String {
        flash_path(image.slot_dir(), &self.swi_file)
    }

    /// Installed image referenced by the given key of the boot configuration.
    fn referenced_image(
        &self,
        config: &AbootConfig,
        key: &str,
    ) -> SwixResult<Option<InstalledImage>> {
        let Some(path) = config.get(key) else {
            return Ok(None);
        };
        let image = slot_of_flash_path(path)
            .and_then(|slot| self.context.naming.from_slot_dir(slot))
            .ok_or_else(|| {
                SwixError::Environment.report(format!("invalid boot path {path:?} in {key}"))
            })?;
        if !self.list_images()?.contains(&image) {
            return Err(SwixError::Environment
                .report(format!("{key} references {image} which is not installed")));
        }
        Ok(Some(image))
    }
}

impl Bootloader for AbootBootloader {
    fn kind(&self) -> BootloaderKind {
        BootloaderKind::Aboot
    }

    fn list_images(&self) -> SwixResult<Vec<InstalledImage>> {
        let mut images = Vec::new();
        let entries = fs::read_dir(&self.context.host_dir)
            .whatever("unable to read host directory")
            .with_info(|_| format!("path: {:?}", self.context.host_dir))?;
        for entry in entries {
            let entry = entry.whatever("unable to read host directory entry")?;
            if !entry.path().is_dir() {
                continue;
            }
            let Some(slot_dir) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if let Some(image) = self.context.naming.from_slot_dir(&slot_dir) {
                images.push(image);
            }
        }
        Ok(images)
    }

    fn current_image(&self) -> SwixResult<InstalledImage> {
        self.context.current_image()
    }

    fn next_image(&self) -> SwixResult<InstalledImage> {
        let config = self.load_config()?;
        self.referenced_image(&config, SWI)?
            .ok_or_else(|| SwixError::Environment.report("no SWI in Aboot boot configuration"))
    }

    fn default_image(&self) -> SwixResult<InstalledImage> {
        let config = self.load_config()?;
        match self.referenced_image(&config, SWI_DEFAULT)? {
            Some(image) => Ok(image),
            None => self.next_image(),
        }
    }

    fn set_next(&self, image: &InstalledImage) -> SwixResult<()> {
        let mut config = self.load_config()?;
        config.set(SWI, self.boot_path(image));
        self.save_config(&config)
    }

    fn set_default(&self, image: &InstalledImage) -> SwixResult<()> {
        let mut config = self.load_config()?;
        config.set(SWI_DEFAULT, self.boot_path(image));
        self.save_config(&config)
    }

    fn remove_image(&self, image: &InstalledImage) -> SwixResult<()> {
        let current = self.context.check_removable(image)?;
        let mut config = self.load_config()?;
        let redirect = if self.referenced_image(&config, SWI)?.as_ref() == Some(image) {
            // Removing the next image falls back to the current one entirely.
            &[SWI, SWI_DEFAULT][..]
        } else if self.referenced_image(&config, SWI_DEFAULT)?.as_ref() == Some(image) {
            &[SWI_DEFAULT][..]
        } else {
            &[][..]
        };
        for key in redirect {
            info!("redirecting {key} to {current}");
            config.set(key, self.boot_path(&current));
        }
        if !redirect.is_empty() {
            self.save_config(&config)?;
        }
        self.context.remove_slot(image)
    }

    fn accepts(&self, kind: ArtifactKind) -> bool {
        kind == ArtifactKind::Aboot
    }

    fn install(&self, artifact: &Path) -> SwixResult<()> {
        let temp_dir = tempfile::tempdir().whatever("unable to create temporary directory")?;
        run_cmd(cmd!(
            "unzip",
            "-od",
            temp_dir.path(),
            artifact,
            ABOOT_INSTALLER
        ))
        .whatever("unable to extract Aboot installer")?;
        let installer = temp_dir.path().join(ABOOT_INSTALLER);
        run_cmd(cmd!("sh", &installer).with_vars(vars! {
            swipath = artifact,
            target_path = &self.context.host_dir,
            sonic_upgrade = "1",
        }))
        .whatever("Aboot installer failed")?;
        Ok(())
    }
}
