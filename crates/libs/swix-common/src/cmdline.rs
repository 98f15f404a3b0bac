//! Read-only view of the kernel command line.

use std::io;
use std::path::Path;

/// Default location of the live kernel command line.
pub const PROC_CMDLINE: &str = "/proc/cmdline";

/// Parsed kernel command line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KernelCmdline {
    params: Vec<(String, Option<String>)>,
}

impl KernelCmdline {
    /// Read and parse the kernel command line from the given file.
    pub fn read(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    /// Parse a kernel command line.
    ///
    /// Parameters are separated by whitespace outside of double quotes.
    pub fn parse(cmdline: &str) -> Self {
        let mut params = Vec::new();
        let mut current = String::new();
        let mut quoted = false;
        for c in cmdline.trim().chars() {
            match c {
                '"' => quoted = !quoted,
                c if c.is_whitespace() && !quoted => {
                    if !current.is_empty() {
                        params.push(split_param(&current));
                        current.clear();
                    }
                }
                c => current.push(c),
            }
        }
        if !current.is_empty() {
            params.push(split_param(&current));
        }
        Self { params }
    }

    /// Value of the first parameter with the given name.
    ///
    /// Flags without a value yield an empty string.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_deref().unwrap_or(""))
    }

    /// Iterator over all parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.params
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_deref()))
    }

    /// Slot directory of the booted root filesystem (`loop=<slot>/<file>`).
    pub fn loop_slot(&self) -> Option<&str> {
        let (slot, file) = self.get("loop")?.rsplit_once('/')?;
        if slot.is_empty() || file.is_empty() {
            return None;
        }
        Some(slot)
    }
}

fn split_param(param: &str) -> (String, Option<String>) {
    match param.split_once('=') {
        Some((key, value)) => (key.to_owned(), Some(value.to_owned())),
        None => (param.to_owned(), None),
    }
}
