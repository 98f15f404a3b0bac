//! Installed images and their bookkeeping.

use std::fmt;

use serde::Serialize;
use tracing::info;

use super::bootloaders::Bootloader;
use crate::error::{SwixError, SwixResult};

/// An installed, independently bootable image.
///
/// Images are identified by their name. Each image lives in its own slot
/// directory below the host directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InstalledImage {
    name: String,
    slot_dir: String,
}

impl InstalledImage {
    /// Name of the image.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the slot directory.
    pub fn slot_dir(&self) -> &str {
        &self.slot_dir
    }
}

impl fmt::Display for InstalledImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Mapping between image names and slot directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageNaming {
    image_prefix: String,
    dir_prefix: String,
}

impl ImageNaming {
    pub fn new(image_prefix: impl Into<String>, dir_prefix: impl Into<String>) -> Self {
        Self {
            image_prefix: image_prefix.into(),
            dir_prefix: dir_prefix.into(),
        }
    }

    /// Prefix of image names.
    pub fn image_prefix(&self) -> &str {
        &self.image_prefix
    }

    /// Prefix of slot directories.
    pub fn dir_prefix(&self) -> &str {
        &self.dir_prefix
    }

    /// Image with the given name.
    pub fn from_name(&self, name: &str) -> InstalledImage {
        let version = name.strip_prefix(&self.image_prefix).unwrap_or(name);
        InstalledImage {
            name: name.to_owned(),
            slot_dir: format!("{}{version}", self.dir_prefix),
        }
    }

    /// Image stored in the given slot directory.
    pub fn from_slot_dir(&self, slot_dir: &str) -> Option<InstalledImage> {
        let version = slot_dir.strip_prefix(&self.dir_prefix)?;
        if version.is_empty() {
            return None;
        }
        Some(InstalledImage {
            name: format!("{}{version}", self.image_prefix),
            slot_dir: slot_dir.to_owned(),
        })
    }

    /// Image of the given version.
    pub fn from_version(&self, version: &str) -> InstalledImage {
        self.from_name(&format!("{}{version}", self.image_prefix))
    }
}

/// Snapshot of the boot selection.
#[derive(Debug, Clone, Serialize)]
pub struct BootSelection {
    pub current: InstalledImage,
    pub next: InstalledImage,
    pub default: InstalledImage,
    pub available: Vec<InstalledImage>,
}

/// Installed images, managed through the active boot loader.
#[derive(Debug)]
pub struct ImageStore {
    bootloader: Box<dyn Bootloader>,
}

impl ImageStore {
    pub fn new(bootloader: Box<dyn Bootloader>) -> Self {
        Self { bootloader }
    }

    /// The active boot loader.
    pub fn bootloader(&self) -> &dyn Bootloader {
        &*self.bootloader
    }

    /// Images in the order reported by the boot loader.
    pub fn list(&self) -> SwixResult<Vec<InstalledImage>> {
        self.bootloader.list_images()
    }

    /// Current, next and default image along with all installed images.
    pub fn selection(&self) -> SwixResult<BootSelection> {
        Ok(BootSelection {
            current: self.bootloader.current_image()?,
            next: self.bootloader.next_image()?,
            default: self.bootloader.default_image()?,
            available: self.bootloader.list_images()?,
        })
    }

    /// Look up an installed image by name.
    pub fn find(&self, name: &str) -> SwixResult<InstalledImage> {
        self.list()?
            .into_iter()
            .find(|image| image.name() == name)
            .ok_or_else(|| {
                SwixError::Precondition.report(format!("image {name:?} does not exist"))
            })
    }

    /// Boot the given image after the next reboot.
    pub fn set_next(&self, name: &str) -> SwixResult<()> {
        let image = self.find(name)?;
        self.bootloader.set_next(&image)
    }

    /// Boot the given image by default.
    pub fn set_default(&self, name: &str) -> SwixResult<()> {
        let image = self.find(name)?;
        self.bootloader.set_default(&image)
    }

    /// Remove an installed image.
    pub fn remove(&self, name: &str) -> SwixResult<()> {
        let image = self.find(name)?;
        self.bootloader.remove_image(&image)?;
        info!("removed image {image}");
        Ok(())
    }

    /// Remove all images which are neither current nor next.
    ///
    /// Returns the number of removed images.
    pub fn cleanup(&self) -> SwixResult<usize> {
        let current = self.bootloader.current_image()?;
        let next = self.bootloader.next_image()?;
        let mut removed = 0;
        for image in self.list()? {
            if image == current || image == next {
                continue;
            }
            info!("removing image {image}");
            self.bootloader.remove_image(&image)?;
            removed += 1;
        }
        if removed == 0 {
            info!("no images to remove");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::bootloaders::testing::AbootFixture;

    #[test]
    fn test_naming() {
        let naming = ImageNaming::new("SONiC-OS-", "image-");
        let image = naming.from_name("SONiC-OS-1.2.0");
        assert_eq!(image.slot_dir(), "image-1.2.0");
        assert_eq!(naming.from_slot_dir("image-1.2.0"), Some(image.clone()));
        assert_eq!(naming.from_version("1.2.0"), image);
        assert_eq!(naming.from_slot_dir("image-"), None);
        assert_eq!(naming.from_slot_dir("lost+found"), None);
    }

    #[test]
    fn test_cleanup_keeps_current_and_next() {
        let fixture = AbootFixture::new(&["1.0.0", "1.1.0"], "1.0.0", "1.1.0");
        let store = fixture.store();
        assert_eq!(store.cleanup().unwrap(), 0);
        assert_eq!(fixture.installed_versions(&store), ["1.0.0", "1.1.0"]);
    }

    #[test]
    fn test_cleanup_removes_others() {
        let fixture = AbootFixture::new(&["1.0.0", "1.1.0", "1.2.0"], "1.0.0", "1.0.0");
        let store = fixture.store();
        assert_eq!(store.cleanup().unwrap(), 2);
        assert_eq!(fixture.installed_versions(&store), ["1.0.0"]);
        // A second run has nothing left to do.
        assert_eq!(store.cleanup().unwrap(), 0);
    }

    #[test]
    fn test_unknown_image() {
        let fixture = AbootFixture::new(&["1.0.0"], "1.0.0", "1.0.0");
        let store = fixture.store();
        let report = store.set_next("SONiC-OS-9.9.9").unwrap_err();
        assert_eq!(report.error(), &SwixError::Precondition);
        let report = store.remove("SONiC-OS-9.9.9").unwrap_err();
        assert_eq!(report.error(), &SwixError::Precondition);
    }

    #[test]
    fn test_selection_members() {
        let fixture = AbootFixture::new(&["1.0.0", "1.1.0", "1.2.0"], "1.1.0", "1.2.0");
        let store = fixture.store();
        store.set_default("SONiC-OS-1.0.0").unwrap();
        let selection = store.selection().unwrap();
        assert_eq!(selection.current.name(), "SONiC-OS-1.1.0");
        assert_eq!(selection.next.name(), "SONiC-OS-1.2.0");
        assert_eq!(selection.default.name(), "SONiC-OS-1.0.0");
        assert!(selection.available.contains(&selection.next));
        assert!(selection.available.contains(&selection.default));
    }
}
