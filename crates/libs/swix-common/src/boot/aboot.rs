use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

/// Key of the image Aboot boots next.
pub const SWI: &str = "SWI";
/// Key of the image Aboot boots by default.
pub const SWI_DEFAULT: &str = "SWI_DEFAULT";
/// Prefix of boot paths on the flash device.
pub const FLASH_PREFIX: &str = "flash:";

/// An Aboot boot configuration.
///
/// Entries keep their insertion order. Comments and blank lines are not
/// retained and therefore vanish when the configuration is written back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AbootConfig {
    entries: IndexMap<String, String>,
}

impl AbootConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AbootConfigLoadError> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    /// Parse the textual `key=value` representation.
    pub fn parse(text: &str) -> Self {
        let mut entries = IndexMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                debug!("ignoring malformed boot config line {line:?}");
                continue;
            };
            entries.insert(key.to_owned(), value.to_owned());
        }
        Self { entries }
    }

    /// Set a value, keeping the position of an existing key.
    pub fn set(&mut self, key: &str, value: impl AsRef<str>) {
        self.entries
            .insert(key.to_owned(), value.as_ref().to_owned());
    }

    /// Get a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Remove a value, keeping the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.shift_remove(key)
    }

    /// Iterator over the entries in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Indicates whether the configuration is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode the configuration, one `key=value` line per entry.
    pub fn to_text(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| format!("{key}={value}\n"))
            .collect()
    }

    /// Save the configuration to a file.
    ///
    /// The new content is written to a sibling file which is synchronized and
    /// then renamed over the original.
    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        let mut new_path = path.as_os_str().to_owned();
        new_path.push(".new");
        let mut file = File::create(&new_path)?;
        file.write_all(self.to_text().as_bytes())?;
        file.flush()?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(new_path, path)
    }
}

/// Error loading an Aboot boot configuration.
#[derive(Debug, Error)]
pub enum AbootConfigLoadError {
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Boot path of the image in the given slot directory.
pub fn flash_path(slot_dir: &str, swi_file: &str) -> String {
    format!("{FLASH_PREFIX}{slot_dir}/{swi_file}")
}

/// Slot directory referenced by a boot path (`flash:<slot>/...`).
pub fn slot_of_flash_path(path: &str) -> Option<&str> {
    let (slot, _) = path.strip_prefix(FLASH_PREFIX)?.split_once('/')?;
    (!slot.is_empty()).then_some(slot)
}
