//! Detection of image artifact formats and their embedded versions.

use std::fs::File;
use std::io::{self, BufRead, Read};
use std::path::Path;

/// Magic number of zip archives (local file header).
pub const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Name of the installer script embedded in Aboot artifacts.
pub const ABOOT_INSTALLER: &str = "boot0";

/// Format of an image artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Zip archive with an embedded installer script, booted by Aboot.
    Aboot,
    /// Self-extracting installer executable.
    Generic,
}

impl ArtifactKind {
    /// Detect the format from the first bytes of the artifact.
    pub fn detect(path: impl AsRef<Path>) -> io::Result<Self> {
        let mut magic = Vec::with_capacity(ZIP_MAGIC.len());
        File::open(path)?
            .take(ZIP_MAGIC.len() as u64)
            .read_to_end(&mut magic)?;
        Ok(Self::from_magic(&magic))
    }

    /// Classify the given leading bytes.
    pub fn from_magic(magic: &[u8]) -> Self {
        if magic.starts_with(ZIP_MAGIC) {
            ArtifactKind::Aboot
        } else {
            ArtifactKind::Generic
        }
    }
}

/// Version declared by a generic installer (`image_version="<version>"`).
///
/// Only the first line declaring `image_version` is considered and reading
/// stops there. The installer carries a binary payload, lines are therefore
/// decoded lossily.
pub fn generic_installer_version(mut reader: impl BufRead) -> io::Result<Option<String>> {
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        if line.starts_with(b"image_version") {
            break;
        }
    }
    let line = String::from_utf8_lossy(&line);
    let version = line
        .trim_end_matches(['\n', '\r'])
        .strip_prefix("image_version=\"")
        .and_then(|rest| rest.strip_suffix('"'));
    Ok(version.and_then(non_empty))
}

/// Version of the image an Aboot installer script installs.
///
/// The script names its target as `image_path="$target_path/<dir-prefix><version>"`.
pub fn aboot_installer_version(script: &str, dir_prefix: &str) -> Option<String> {
    let line = script
        .lines()
        .find(|line| line.starts_with("image_path"))?;
    let target = line
        .strip_prefix("image_path=\"$target_path/")?
        .strip_suffix('"')?;
    non_empty(target.strip_prefix(dir_prefix)?)
}

fn non_empty(version: &str) -> Option<String> {
    (!version.is_empty()).then(|| version.to_owned())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn test_detect_kind() {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("image.swi");
        std::fs::write(&zip, b"PK\x03\x04rest of the archive").unwrap();
        let bin = dir.path().join("image.bin");
        std::fs::write(&bin, b"#!/bin/sh\n").unwrap();
        let short = dir.path().join("short");
        std::fs::write(&short, b"PK").unwrap();
        assert_eq!(ArtifactKind::detect(&zip).unwrap(), ArtifactKind::Aboot);
        assert_eq!(ArtifactKind::detect(&bin).unwrap(), ArtifactKind::Generic);
        assert_eq!(ArtifactKind::detect(&short).unwrap(), ArtifactKind::Generic);
        assert!(ArtifactKind::detect(dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_generic_version() {
        let mut data = b"#!/bin/sh\nimage_version=\"3.1.0-rc.2\"\r\nexit 0\n".to_vec();
        data.extend_from_slice(&[0xff, 0xfe, b'\n', 0x00]);
        assert_eq!(
            generic_installer_version(&data[..]).unwrap().as_deref(),
            Some("3.1.0-rc.2")
        );
        assert_eq!(
            generic_installer_version(&b"image_version=\"\"\n"[..]).unwrap(),
            None
        );
        assert_eq!(generic_installer_version(&b"#!/bin/sh\n"[..]).unwrap(), None);
    }

    #[test]
    fn test_generic_version_stops_at_marker() {
        let mut data = b"image_version=\"1.0\"\n".to_vec();
        data.extend_from_slice(&[0u8; 4096]);
        let mut reader = io::BufReader::with_capacity(16, &data[..]);
        assert_eq!(
            generic_installer_version(&mut reader).unwrap().as_deref(),
            Some("1.0")
        );
        // The payload after the marker line is left unread.
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest.len(), 4096);
    }

    #[test]
    fn test_aboot_version() {
        let script = indoc! {r#"
            #!/bin/sh
            image_path="$target_path/image-2.4.1"
            image_path="$target_path/image-ignored"
        "#};
        assert_eq!(
            aboot_installer_version(script, "image-").as_deref(),
            Some("2.4.1")
        );
        assert_eq!(
            aboot_installer_version("image_path=/somewhere/else\n", "image-"),
            None
        );
    }
}
