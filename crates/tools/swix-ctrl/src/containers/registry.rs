//! Catalog of local container images.

use std::path::Path;

use tracing::{debug, info};

use super::runtime::ContainerRuntime;
use crate::error::SwixResult;

/// Tag used when an image carries no tag label.
pub const UNKNOWN_TAG: &str = "unknown";

/// Label holding the version tag of an image.
const TAG_LABEL: &str = "Tag";

/// Strip the tag from an image reference.
///
/// A registry port (`registry:5000/image`) is not a tag.
pub fn strip_tag(reference: &str) -> &str {
    match reference.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => name,
        _ => reference,
    }
}

/// Image lookups and mutations on top of a container runtime.
#[derive(Debug, Clone, Copy)]
pub struct ContainerImageRegistry<'r> {
    runtime: &'r dyn ContainerRuntime,
}

impl<'r> ContainerImageRegistry<'r> {
    pub fn new(runtime: &'r dyn ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Name of the image the given container runs, without tag.
    pub fn image_name(&self, container: &str) -> SwixResult<String> {
        let reference = self.runtime.container_image(container)?;
        Ok(strip_tag(&reference).to_owned())
    }

    /// Id of the image with the given reference, if there is one.
    pub fn image_id(&self, reference: &str) -> SwixResult<Option<String>> {
        Ok(self.runtime.image_ids(reference)?.into_iter().next())
    }

    /// Distinct ids of all images with the given name.
    pub fn image_ids(&self, name: &str) -> SwixResult<Vec<String>> {
        let mut ids = Vec::new();
        for id in self.runtime.image_ids(name)? {
            if !id.is_empty() && !ids.contains(&id) {
                ids.push(id);
            }
        }
        debug!("images of {name}: {ids:?}");
        Ok(ids)
    }

    /// Tag embedded in the image's labels, `unknown` if there is none.
    pub fn embedded_tag(&self, reference: &str) -> String {
        match self.runtime.image_label(reference, TAG_LABEL) {
            Ok(Some(tag)) => tag,
            Ok(None) => UNKNOWN_TAG.to_owned(),
            Err(report) => {
                debug!("unable to read tag label of {reference}: {report:?}");
                UNKNOWN_TAG.to_owned()
            }
        }
    }

    pub fn tag(&self, source: &str, target: &str) -> SwixResult<()> {
        info!("tagging {source} as {target}");
        self.runtime.tag(source, target)
    }

    pub fn remove(&self, id: &str) -> SwixResult<()> {
        info!("removing image {id}");
        self.runtime.remove_image(id)
    }

    pub fn load(&self, archive: &Path) -> SwixResult<()> {
        info!("loading image archive {archive:?}");
        self.runtime.load(archive)
    }
}
