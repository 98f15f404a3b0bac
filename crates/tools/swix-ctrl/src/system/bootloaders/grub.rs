//! GRUB boot loader.

use std::fmt::Debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use reportify::ResultExt;
use swix_common::artifact::ArtifactKind;
use swix_common::boot::grub::{
    remove_menu_entry, EntryRef, GrubEnv, GrubMenu, NEXT_ENTRY, SAVED_ENTRY,
};
use swix_common::boot::BootloaderKind;
use tracing::info;
use xscript::{cmd, Cmd};

use super::{BootContext, Bootloader};
use crate::error::{SwixError, SwixResult};
use crate::exec::{read_cmd, run_cmd};
use crate::system::images::InstalledImage;

/// Access to the GRUB environment block.
///
/// The block has a fixed layout guarded by GRUB's own tools, so it is only
/// ever modified through them.
pub trait GrubEnvTool: Debug {
    /// Read the environment.
    fn list(&self) -> SwixResult<GrubEnv>;

    /// Persistently select the menu entry at the given position.
    fn set_default(&self, entry: usize) -> SwixResult<()>;

    /// Select the menu entry at the given position for the next boot only.
    fn set_next(&self, entry: usize) -> SwixResult<()>;
}

/// GRUB's command line tools.
#[derive(Debug, Clone)]
pub struct GrubTools {
    boot_dir_arg: String,
    env_path: PathBuf,
}

impl GrubTools {
    pub fn new(host_dir: &Path, env_path: PathBuf) -> Self {
        Self {
            boot_dir_arg: format!("--boot-directory={}", host_dir.display()),
            env_path,
        }
    }
}

impl GrubEnvTool for GrubTools {
    fn list(&self) -> SwixResult<GrubEnv> {
        let listing = read_cmd(cmd!("grub-editenv", &self.env_path, "list"))
            .whatever("unable to read GRUB environment")?;
        Ok(GrubEnv::parse(&listing))
    }

    fn set_default(&self, entry: usize) -> SwixResult<()> {
        run_cmd(cmd!("grub-set-default", &self.boot_dir_arg, entry.to_string()))
            .whatever("unable to set default GRUB entry")
    }

    fn set_next(&self, entry: usize) -> SwixResult<()> {
        run_cmd(cmd!("grub-reboot", &self.boot_dir_arg, entry.to_string()))
            .whatever("unable to set next GRUB entry")
    }
}

/// GRUB, configured through a menu file and an environment block.
#[derive(Debug)]
pub struct GrubBootloader {
    context: BootContext,
    config_path: PathBuf,
    tools: Box<dyn GrubEnvTool>,
}

impl GrubBootloader {
    pub fn new(context: BootContext, config_path: PathBuf, tools: Box<dyn GrubEnvTool>) -> Self {
        Self {
            context,
            config_path,
            tools,
        }
    }

    fn read_config(&self) -> SwixResult<String> {
        fs::read_to_string(&self.config_path).map_err(|error| {
            SwixError::Environment.report(format!(
                "unable to read GRUB menu {:?}: {error}",
                self.config_path
            ))
        })
    }

    fn write_config(&self, config: &str) -> SwixResult<()> {
        let new_path = self.config_path.with_extension("cfg.new");
        let mut file = fs::File::create(&new_path).whatever("unable to create GRUB menu")?;
        file.write_all(config.as_bytes())
            .whatever("unable to write GRUB menu")?;
        file.sync_all().whatever("unable to sync GRUB menu")?;
        drop(file);
        fs::rename(&new_path, &self.config_path)
            .whatever("unable to replace GRUB menu")
            .with_info(|_| format!("path: {:?}", self.config_path))
    }

    fn load_menu(&self) -> SwixResult<GrubMenu> {
        Ok(GrubMenu::parse(&self.read_config()?))
    }

    /// Position of the image in the menu.
    fn entry_of(&self, menu: &GrubMenu, image: &InstalledImage) -> SwixResult<usize> {
        menu.position(image.name()).ok_or_else(|| {
            SwixError::Precondition.report(format!("no GRUB menu entry for {image}"))
        })
    }

    /// Image referenced by an environment variable, if the variable is set.
    fn referenced_image(
        &self,
        env: &GrubEnv,
        menu: &GrubMenu,
        key: &str,
    ) -> SwixResult<Option<InstalledImage>> {
        let Some(entry) = env.get(key).and_then(EntryRef::parse) else {
            return Ok(None);
        };
        let position = entry.resolve(menu).ok_or_else(|| {
            SwixError::Environment.report(format!("{key} references a missing menu entry"))
        })?;
        self.image_at(menu, position).map(Some)
    }

    fn image_at(&self, menu: &GrubMenu, position: usize) -> SwixResult<InstalledImage> {
        let title = menu.entries().get(position).ok_or_else(|| {
            SwixError::Environment.report(format!("GRUB menu has no entry {position}"))
        })?;
        if !title.contains(self.context.naming.image_prefix()) {
            return Err(SwixError::Environment
                .report(format!("GRUB menu entry {title:?} is not an image")));
        }
        Ok(self.context.naming.from_name(title))
    }

    fn saved_image(&self, env: &GrubEnv, menu: &GrubMenu) -> SwixResult<InstalledImage> {
        match self.referenced_image(env, menu, SAVED_ENTRY)? {
            Some(image) => Ok(image),
            None => self.image_at(menu, 0),
        }
    }
}

impl Bootloader for GrubBootloader {
    fn kind(&self) -> BootloaderKind {
        BootloaderKind::Grub
    }

    fn list_images(&self) -> SwixResult<Vec<InstalledImage>> {
        let prefix = self.context.naming.image_prefix();
        Ok(self
            .load_menu()?
            .entries()
            .iter()
            .filter(|title| title.contains(prefix))
            .map(|title| self.context.naming.from_name(title))
            .collect())
    }

    fn current_image(&self) -> SwixResult<InstalledImage> {
        self.context.current_image()
    }

    fn next_image(&self) -> SwixResult<InstalledImage> {
        let menu = self.load_menu()?;
        let env = self.tools.list()?;
        match self.referenced_image(&env, &menu, NEXT_ENTRY)? {
            Some(image) => Ok(image),
            None => self.saved_image(&env, &menu),
        }
    }

    fn default_image(&self) -> SwixResult<InstalledImage> {
        let menu = self.load_menu()?;
        let env = self.tools.list()?;
        self.saved_image(&env, &menu)
    }

    fn set_next(&self, image: &InstalledImage) -> SwixResult<()> {
        let entry = self.entry_of(&self.load_menu()?, image)?;
        self.tools.set_next(entry)
    }

    fn set_default(&self, image: &InstalledImage) -> SwixResult<()> {
        let entry = self.entry_of(&self.load_menu()?, image)?;
        self.tools.set_default(entry)
    }

    fn remove_image(&self, image: &InstalledImage) -> SwixResult<()> {
        let current = self.context.check_removable(image)?;
        let menu = self.load_menu()?;
        let env = self.tools.list()?;
        let default = self.saved_image(&env, &menu)?;
        let next_override = self.referenced_image(&env, &menu, NEXT_ENTRY)?;
        let next = next_override.clone().unwrap_or_else(|| default.clone());
        let next_override = if next == *image {
            info!("redirecting next and default boot to {current}");
            self.set_next(&current)?;
            self.set_default(&current)?;
            Some(current.clone())
        } else {
            next_override
        };
        // Entries are selected by position, so the selection has to follow the
        // remaining images once the entry is gone.
        let retarget = |selected: InstalledImage| {
            if selected == *image {
                current.clone()
            } else {
                selected
            }
        };
        let default = retarget(default);
        let next_override = next_override.map(retarget);

        self.context.remove_slot(image)?;
        let config = remove_menu_entry(&self.read_config()?, image.name()).ok_or_else(|| {
            SwixError::Environment.report(format!("no GRUB menu entry for {image}"))
        })?;
        self.write_config(&config)?;

        self.set_default(&default)?;
        if let Some(next) = next_override {
            self.set_next(&next)?;
        }
        Ok(())
    }

    fn accepts(&self, kind: ArtifactKind) -> bool {
        kind == ArtifactKind::Generic
    }

    fn install(&self, artifact: &Path) -> SwixResult<()> {
        let installer = installer_path(artifact);
        run_cmd(cmd!("chmod", "755", &installer))
            .whatever("unable to make installer executable")?;
        run_cmd(Cmd::new(&installer)).whatever("image installer failed")?;
        // The installer puts the new image first.
        let newest = self.image_at(&self.load_menu()?, 0)?;
        info!("setting default boot to {newest}");
        self.set_default(&newest)
    }
}

/// Path to execute the installer from, never subject to a `PATH` lookup.
fn installer_path(artifact: &Path) -> PathBuf {
    match artifact.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => artifact.to_path_buf(),
        _ => Path::new(".").join(artifact),
    }
}
