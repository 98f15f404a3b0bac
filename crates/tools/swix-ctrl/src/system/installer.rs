//! Installation of new images.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use reportify::ResultExt;
use swix_common::artifact::{
    aboot_installer_version, generic_installer_version, ArtifactKind, ABOOT_INSTALLER,
};
use tracing::{info, warn};
use xscript::cmd;

use super::images::{ImageNaming, ImageStore, InstalledImage};
use crate::config::CtrlConfig;
use crate::error::{SwixError, SwixResult};
use crate::exec::{read_cmd, run_cmd};

/// Outcome of an installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The image has been installed and selected as default.
    Installed(InstalledImage),
    /// The image was installed before and has been selected as default.
    AlreadyInstalled(InstalledImage),
}

/// Installs images from local artifacts.
#[derive(Debug)]
pub struct ImageInstaller<'s> {
    config: &'s CtrlConfig,
    store: &'s ImageStore,
    naming: ImageNaming,
}

impl<'s> ImageInstaller<'s> {
    pub fn new(config: &'s CtrlConfig, store: &'s ImageStore) -> Self {
        Self {
            config,
            store,
            naming: ImageNaming::new(&config.boot.image_prefix, &config.boot.image_dir_prefix),
        }
    }

    /// Install the image from the given artifact and make it the default.
    pub fn install(&self, artifact: &str) -> SwixResult<InstallOutcome> {
        let path = local_artifact(artifact)?;
        let kind = detect_kind(&path)?;
        let bootloader = self.store.bootloader();
        if !bootloader.accepts(kind) {
            return Err(SwixError::Precondition.report(format!(
                "artifact is not an image for {}",
                bootloader.kind().as_str()
            )));
        }
        let image = self.naming.from_name(&self.binary_version(&path)?);
        if self.store.list()?.contains(&image) {
            info!("image {image} is already installed, setting it as default");
            bootloader.set_default(&image)?;
            return Ok(InstallOutcome::AlreadyInstalled(image));
        }
        info!("installing image {image}");
        bootloader.install(&path)?;
        self.migrate_config()?;
        nix::unistd::sync();
        std::thread::sleep(self.config.install.settle_delay());
        Ok(InstallOutcome::Installed(image))
    }

    /// Name of the image contained in the given artifact.
    pub fn binary_version(&self, path: &Path) -> SwixResult<String> {
        let version = match detect_kind(path)? {
            ArtifactKind::Aboot => {
                let script = read_cmd(cmd!("unzip", "-p", path, ABOOT_INSTALLER))
                    .whatever("unable to read Aboot installer")?;
                aboot_installer_version(&script, &self.config.boot.image_dir_prefix)
            }
            ArtifactKind::Generic => File::open(path)
                .map(BufReader::new)
                .and_then(generic_installer_version)
                .whatever("unable to read image installer")
                .with_info(|_| format!("path: {path:?}"))?,
        };
        let Some(version) = version else {
            return Err(SwixError::Precondition
                .report(format!("unable to determine image version of {path:?}")));
        };
        Ok(format!("{}{version}", self.config.boot.image_prefix))
    }

    /// Carry the configuration over to the newly installed image.
    fn migrate_config(&self) -> SwixResult<()> {
        let install = &self.config.install;
        let backup = self.config.boot.host_dir.join(&install.config_backup);
        if backup.exists() {
            fs::remove_dir_all(&backup)
                .whatever("unable to remove old configuration backup")
                .with_info(|_| format!("path: {backup:?}"))?;
        }
        if !install.config_dir.exists() {
            warn!("no configuration at {:?} to migrate", install.config_dir);
            return Ok(());
        }
        run_cmd(cmd!("cp", "-ar", &install.config_dir, &backup))
            .whatever("unable to back up configuration")
    }
}

/// Absolute path of a local artifact.
pub fn local_artifact(artifact: &str) -> SwixResult<PathBuf> {
    if artifact.contains("://") {
        return Err(SwixError::Precondition
            .report("downloading images is not supported, provide a local file"));
    }
    let path = Path::new(artifact);
    if !path.is_file() {
        return Err(SwixError::Precondition.report(format!("image file {path:?} does not exist")));
    }
    fs::canonicalize(path)
        .whatever("unable to resolve image file path")
        .with_info(|_| format!("path: {path:?}"))
}

fn detect_kind(path: &Path) -> SwixResult<ArtifactKind> {
    ArtifactKind::detect(path)
        .whatever("unable to read artifact")
        .with_info(|_| format!("path: {path:?}"))
}
