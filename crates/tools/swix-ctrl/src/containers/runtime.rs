//! Container runtime and service manager.

use std::fmt::Debug;
use std::path::Path;

use reportify::ResultExt;
use xscript::cmd;

use crate::error::SwixResult;
use crate::exec::{read_cmd, run_cmd};

/// Label value printed by the runtime for labels which are not set.
const NO_VALUE: &str = "<no value>";

/// Local container runtime and its image catalog.
pub trait ContainerRuntime: Debug {
    /// Image reference the given container has been created from.
    fn container_image(&self, container: &str) -> SwixResult<String>;

    /// Ids of the images matching the given name or `name:tag` reference.
    fn image_ids(&self, reference: &str) -> SwixResult<Vec<String>>;

    /// Value of a label of the given image.
    fn image_label(&self, reference: &str, label: &str) -> SwixResult<Option<String>>;

    /// Load an image archive.
    fn load(&self, archive: &Path) -> SwixResult<()>;

    /// Add the target reference to the image referenced by the source.
    fn tag(&self, source: &str, target: &str) -> SwixResult<()>;

    /// Forcibly remove an image by id.
    fn remove_image(&self, id: &str) -> SwixResult<()>;

    /// Remove a stopped container.
    fn remove_container(&self, container: &str) -> SwixResult<()>;

    /// Run a command inside a running container, returning its output.
    fn exec(&self, container: &str, args: &[&str]) -> SwixResult<String>;
}

/// Manager of the units running the services.
pub trait ServiceManager: Debug {
    fn start(&self, unit: &str) -> SwixResult<()>;

    fn stop(&self, unit: &str) -> SwixResult<()>;

    fn restart(&self, unit: &str) -> SwixResult<()>;
}

/// Docker command line client.
#[derive(Debug, Clone, Default)]
pub struct Docker;

impl ContainerRuntime for Docker {
    fn container_image(&self, container: &str) -> SwixResult<String> {
        let image = read_cmd(cmd!(
            "docker",
            "inspect",
            "--format",
            "{{.Config.Image}}",
            container
        ))
        .whatever("unable to inspect container")?;
        Ok(image.trim().to_owned())
    }

    fn image_ids(&self, reference: &str) -> SwixResult<Vec<String>> {
        let ids = read_cmd(cmd!("docker", "images", "--format", "{{.ID}}", reference))
            .whatever("unable to list images")?;
        Ok(ids.lines().map(str::trim).map(str::to_owned).collect())
    }

    fn image_label(&self, reference: &str, label: &str) -> SwixResult<Option<String>> {
        let format = format!("{{{{.Config.Labels.{label}}}}}");
        let value = read_cmd(cmd!("docker", "inspect", "--format", &format, reference))
            .whatever("unable to inspect image")?;
        let value = value.trim();
        Ok((!value.is_empty() && value != NO_VALUE).then(|| value.to_owned()))
    }

    fn load(&self, archive: &Path) -> SwixResult<()> {
        run_cmd(cmd!("docker", "load", "-i", archive)).whatever("unable to load image")
    }

    fn tag(&self, source: &str, target: &str) -> SwixResult<()> {
        run_cmd(cmd!("docker", "tag", source, target)).whatever("unable to tag image")
    }

    fn remove_image(&self, id: &str) -> SwixResult<()> {
        run_cmd(cmd!("docker", "rmi", "-f", id)).whatever("unable to remove image")
    }

    fn remove_container(&self, container: &str) -> SwixResult<()> {
        run_cmd(cmd!("docker", "rm", container)).whatever("unable to remove container")
    }

    fn exec(&self, container: &str, args: &[&str]) -> SwixResult<String> {
        let mut cmd = cmd!("docker", "exec", "-i", container);
        cmd.extend_args(args);
        read_cmd(cmd)
    }
}

/// Systemd, controlled through `systemctl`.
#[derive(Debug, Clone, Default)]
pub struct Systemd;

impl ServiceManager for Systemd {
    fn start(&self, unit: &str) -> SwixResult<()> {
        run_cmd(cmd!("systemctl", "start", unit)).whatever("unable to start unit")
    }

    fn stop(&self, unit: &str) -> SwixResult<()> {
        run_cmd(cmd!("systemctl", "stop", unit)).whatever("unable to stop unit")
    }

    fn restart(&self, unit: &str) -> SwixResult<()> {
        run_cmd(cmd!("systemctl", "restart", unit)).whatever("unable to restart unit")
    }
}
