//! Definition of the command line interface (CLI).

use std::path::PathBuf;

use clap::Parser;
use reportify::{bail, ResultExt};
use tracing::info;

use crate::config::{load_ctrl_config, CtrlConfig};
use crate::containers::rollback::{RollbackManager, RollbackOutcome};
use crate::containers::runtime::{Docker, Systemd};
use crate::containers::upgrade::{ContainerUpgradeSpec, ContainerUpgrader};
use crate::containers::warm_restart::RedisStore;
use crate::containers::ContainerName;
use crate::error::{SwixError, SwixResult};
use crate::system::installer::{local_artifact, ImageInstaller, InstallOutcome};
use crate::system::System;

pub fn main() -> SwixResult<()> {
    swix_cli::init();

    let args = Args::parse();
    if !nix::unistd::geteuid().is_root() {
        bail!("root privileges required for this operation");
    }
    match &args.command {
        Command::Install { path, yes } => {
            confirm(*yes, "New image will be installed, continue?")?;
            let system = System::initialize()?;
            let installer = ImageInstaller::new(&system.config, &system.images);
            match installer.install(path)? {
                InstallOutcome::Installed(image) => {
                    eprintln!("Installed {image}, it boots after the next reboot.");
                }
                InstallOutcome::AlreadyInstalled(image) => {
                    eprintln!("Image {image} is already installed, set as default.");
                }
            }
        }
        Command::List { json } => {
            let system = System::initialize()?;
            let selection = system.images.selection()?;
            if *json || !swix_cli::is_attended() {
                serde_json::to_writer_pretty(std::io::stdout(), &selection)
                    .whatever("unable to write image list to stdout")?;
                println!();
            } else {
                println!("Current: {}", selection.current);
                println!("Next: {}", selection.next);
                println!("Default: {}", selection.default);
                println!("Available:");
                for image in &selection.available {
                    println!("{image}");
                }
            }
            return Ok(());
        }
        Command::SetDefault { image } => {
            let system = System::initialize()?;
            system.images.set_default(image)?;
            system.images.set_next(image)?;
        }
        Command::SetNextBoot { image } => {
            let system = System::initialize()?;
            system.images.set_next(image)?;
        }
        Command::Remove { image, yes } => {
            confirm(*yes, "Image will be removed, continue?")?;
            let system = System::initialize()?;
            system.images.remove(image)?;
        }
        Command::BinaryVersion { path } => {
            let system = System::initialize()?;
            let installer = ImageInstaller::new(&system.config, &system.images);
            println!("{}", installer.binary_version(path)?);
            return Ok(());
        }
        Command::Cleanup { yes } => {
            confirm(
                *yes,
                "Remove images which are neither current nor next, continue?",
            )?;
            let system = System::initialize()?;
            let removed = system.images.cleanup()?;
            eprintln!("Removed {removed} image(s).");
        }
        Command::UpgradeDocker {
            container,
            path,
            tag,
            warm,
            cleanup_image,
            enforce_check,
            yes,
        } => {
            confirm(*yes, "New docker image will be installed, continue?")?;
            let config = load_ctrl_config()?;
            upgrade_docker(
                &config,
                &ContainerUpgradeSpec {
                    container: *container,
                    artifact: local_artifact(path)?,
                    tag: tag.clone(),
                    warm: *warm,
                    cleanup_image: *cleanup_image,
                    enforce_check: *enforce_check,
                },
            )?;
        }
        Command::RollbackDocker { container, yes } => {
            confirm(*yes, "Docker image will be rolled back, continue?")?;
            let manager = RollbackManager::new(&Docker, &Systemd);
            match manager.rollback(*container)? {
                RollbackOutcome::Restarted { image_id } => {
                    info!("restarted {container} with image {image_id}");
                }
                RollbackOutcome::ColdRebootRequired { .. } => {
                    eprintln!(
                        "Cold reboot is required to restore system state after {container} rollback!"
                    );
                }
            }
        }
    }
    swix_cli::done();
    Ok(())
}

fn upgrade_docker(config: &CtrlConfig, spec: &ContainerUpgradeSpec) -> SwixResult<()> {
    let store = RedisStore::new(&Docker, &config.warm_restart);
    let upgrader = ContainerUpgrader::new(&Docker, &Systemd, &store, &config.warm_restart);
    let report = upgrader.upgrade(spec)?;
    eprintln!("Image {}:{}", report.image_name, report.tag);
    for id in &report.removed_ids {
        eprintln!("Removed image {id}");
    }
    if !report.succeeded() {
        return Err(SwixError::Timeout.report(format!(
            "{} failed to reach reconciled state",
            spec.container
        )));
    }
    Ok(())
}

/// Ask for confirmation unless it has been given on the command line.
fn confirm(yes: bool, prompt: &str) -> SwixResult<()> {
    if yes {
        return Ok(());
    }
    if !swix_cli::confirm(prompt).whatever("unable to read confirmation")? {
        bail!("aborted");
    }
    Ok(())
}

#[derive(Debug, Parser)]
#[clap(author, about)]
pub struct Args {
    /// The command.
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Install an image from a local file.
    Install {
        path: String,
        /// Do not ask for confirmation.
        #[clap(short, long)]
        yes: bool,
    },
    /// List the installed images.
    List {
        /// Output the images as JSON, the default without an attended terminal.
        #[clap(long)]
        json: bool,
    },
    /// Boot an image by default, starting with the next reboot.
    SetDefault { image: String },
    /// Boot an image after the next reboot only.
    SetNextBoot { image: String },
    /// Remove an installed image.
    Remove {
        image: String,
        /// Do not ask for confirmation.
        #[clap(short, long)]
        yes: bool,
    },
    /// Print the name of the image contained in a file.
    BinaryVersion { path: PathBuf },
    /// Remove all images which are neither current nor next.
    Cleanup {
        /// Do not ask for confirmation.
        #[clap(short, long)]
        yes: bool,
    },
    /// Upgrade the container of a service from an image archive.
    UpgradeDocker {
        container: ContainerName,
        path: String,
        /// Tag of the new image, defaults to the tag embedded in the image.
        #[clap(long)]
        tag: Option<String>,
        /// Restart the service warm.
        #[clap(long)]
        warm: bool,
        /// Remove the previous image as well.
        #[clap(long)]
        cleanup_image: bool,
        /// Abort if the service cannot be quiesced.
        #[clap(long)]
        enforce_check: bool,
        /// Do not ask for confirmation.
        #[clap(short, long)]
        yes: bool,
    },
    /// Roll the container of a service back to its previous image.
    RollbackDocker {
        container: ContainerName,
        /// Do not ask for confirmation.
        #[clap(short, long)]
        yes: bool,
    },
}
