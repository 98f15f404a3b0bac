//! GRUB menu and environment handling.
//!
//! The environment block itself is never written directly. Changes go through
//! GRUB's own tools, this module only interprets their `list` output.

use indexmap::IndexMap;

/// Environment variable holding a one-time boot override.
pub const NEXT_ENTRY: &str = "next_entry";
/// Environment variable holding the persistent default.
pub const SAVED_ENTRY: &str = "saved_entry";

/// Entries of a GRUB menu in file order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GrubMenu {
    entries: Vec<String>,
}

impl GrubMenu {
    /// Parse the titles of all top-level `menuentry` lines.
    pub fn parse(config: &str) -> Self {
        let entries = config
            .lines()
            .filter_map(|line| line.strip_prefix("menuentry"))
            .filter(|rest| rest.starts_with(char::is_whitespace))
            .filter_map(|rest| parse_title(rest.trim_start()))
            .collect();
        Self { entries }
    }

    /// Titles of the entries.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Position of the entry with the given title.
    pub fn position(&self, title: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry == title)
    }
}

/// Title of a menu entry, quoted or not.
fn parse_title(rest: &str) -> Option<String> {
    let mut chars = rest.chars();
    match chars.next()? {
        quote @ ('\'' | '"') => {
            let title = chars.as_str();
            let end = title.find(quote)?;
            Some(title[..end].to_owned())
        }
        _ => rest.split_whitespace().next().map(str::to_owned),
    }
}

/// Remove the menu entry with exactly the given title from a GRUB config.
///
/// The entry spans from its `menuentry` line up to and including the first
/// closing brace. Returns `None` if there is no such entry.
pub fn remove_menu_entry(config: &str, title: &str) -> Option<String> {
    let mut offset = 0;
    for line in config.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let Some(rest) = line.strip_prefix("menuentry") else {
            continue;
        };
        if !rest.starts_with(char::is_whitespace) {
            continue;
        }
        if parse_title(rest.trim_start()).as_deref() != Some(title) {
            continue;
        }
        let close = start + config[start..].find('}')?;
        let mut end = close + 1;
        if config[end..].starts_with('\n') {
            end += 1;
        }
        let mut updated = String::with_capacity(config.len());
        updated.push_str(&config[..start]);
        updated.push_str(&config[end..]);
        return Some(updated);
    }
    None
}

/// A GRUB environment as printed by `grub-editenv <file> list`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GrubEnv {
    vars: IndexMap<String, String>,
}

impl GrubEnv {
    /// Parse the `list` output of `grub-editenv`.
    pub fn parse(listing: &str) -> Self {
        let vars = listing
            .lines()
            .filter(|line| !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
            .collect();
        Self { vars }
    }

    /// Get a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set a variable.
    pub fn set(&mut self, key: &str, value: impl AsRef<str>) {
        self.vars.insert(key.to_owned(), value.as_ref().to_owned());
    }
}

/// Reference to a menu entry as stored in the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryRef<'e> {
    /// Zero-based position in the menu.
    Index(usize),
    /// Title of the entry.
    Title(&'e str),
}

impl<'e> EntryRef<'e> {
    /// Interpret an environment value.
    pub fn parse(value: &'e str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        Some(match value.parse() {
            Ok(idx) => EntryRef::Index(idx),
            Err(_) => EntryRef::Title(value),
        })
    }

    /// Resolve the reference against a menu.
    pub fn resolve(&self, menu: &GrubMenu) -> Option<usize> {
        match self {
            EntryRef::Index(idx) => (*idx < menu.entries().len()).then_some(*idx),
            EntryRef::Title(title) => menu.position(title),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    const GRUB_CFG: &str = indoc! {r#"
        serial --port=0x3f8 --speed=9600
        set timeout=5
        menuentry 'SONiC-OS-2.0' {
                linux   /image-2.0/boot/vmlinuz loop=image-2.0/fs.squashfs
                initrd  /image-2.0/boot/initrd.img
        }
        menuentry 'SONiC-OS-1.0' {
                linux   /image-1.0/boot/vmlinuz loop=image-1.0/fs.squashfs
                initrd  /image-1.0/boot/initrd.img
        }
        menuentry 'SONiC-OS-1.0-rc' {
                linux   /image-1.0-rc/boot/vmlinuz
        }
        menuentry ONIE {
                search --no-floppy --label --set=root ONIE-BOOT
        }
    "#};

    #[test]
    fn test_parse_menu() {
        let menu = GrubMenu::parse(GRUB_CFG);
        assert_eq!(
            menu.entries(),
            ["SONiC-OS-2.0", "SONiC-OS-1.0", "SONiC-OS-1.0-rc", "ONIE"]
        );
        assert_eq!(menu.position("SONiC-OS-1.0"), Some(1));
        assert_eq!(menu.position("SONiC-OS-3.0"), None);
    }

    #[test]
    fn test_remove_entry_exact_match() {
        let updated = remove_menu_entry(GRUB_CFG, "SONiC-OS-1.0").unwrap();
        let menu = GrubMenu::parse(&updated);
        assert_eq!(menu.entries(), ["SONiC-OS-2.0", "SONiC-OS-1.0-rc", "ONIE"]);
        assert!(!updated.contains("image-1.0/boot/initrd.img"));
        assert!(updated.contains("image-1.0-rc/boot/vmlinuz"));
        assert!(updated.starts_with("serial --port=0x3f8"));
        assert_eq!(remove_menu_entry(GRUB_CFG, "SONiC-OS"), None);
    }

    #[test]
    fn test_parse_env() {
        let env = GrubEnv::parse("saved_entry=1\nnext_entry=\nfoo=a=b\n");
        assert_eq!(env.get(SAVED_ENTRY), Some("1"));
        assert_eq!(env.get(NEXT_ENTRY), Some(""));
        assert_eq!(env.get("foo"), Some("a=b"));
        assert_eq!(env.get(NEXT_ENTRY).and_then(EntryRef::parse), None);
    }

    #[test]
    fn test_resolve_entry_ref() {
        let menu = GrubMenu::parse(GRUB_CFG);
        assert_eq!(EntryRef::parse("2").unwrap().resolve(&menu), Some(2));
        assert_eq!(EntryRef::parse("7").unwrap().resolve(&menu), None);
        assert_eq!(
            EntryRef::parse("SONiC-OS-1.0").unwrap().resolve(&menu),
            Some(1)
        );
    }
}
