use serde::{Deserialize, Serialize};

use crate::cmdline::KernelCmdline;

pub mod aboot;
pub mod grub;

/// Kernel command line parameter set by Aboot when it boots an image.
pub const ABOOT_CMDLINE_MARKER: &str = "Aboot";

/// Supported boot loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootloaderKind {
    /// GRUB with a menu file and an environment block.
    Grub,
    /// Aboot with a `key=value` boot configuration.
    Aboot,
}

impl BootloaderKind {
    /// The string representation of the boot loader.
    pub fn as_str(self) -> &'static str {
        match self {
            BootloaderKind::Grub => "grub",
            BootloaderKind::Aboot => "aboot",
        }
    }
}

/// Detects the boot loader from the kernel command line.
///
/// Aboot always passes its own parameter to the kernel. Every other system is
/// booted by GRUB.
pub fn detect_bootloader(cmdline: &KernelCmdline) -> BootloaderKind {
    if cmdline.get(ABOOT_CMDLINE_MARKER).is_some() {
        BootloaderKind::Aboot
    } else {
        BootloaderKind::Grub
    }
}
