//! Execution of external commands.

use std::ffi::OsString;
use std::process::{Command, Stdio};

use reportify::ResultExt;
use tracing::{info, warn};
use xscript::Cmd;

use crate::error::{SwixError, SwixResult};

/// Run a command, capturing and returning its standard output.
///
/// Standard error is passed through to the operator. A non-zero exit status
/// is reported as [`SwixError::ExternalTool`] carrying the status.
pub fn read_cmd(cmd: Cmd<OsString>) -> SwixResult<String> {
    info!("running `{cmd}`");
    let mut command = Command::new(cmd.prog());
    command.args(cmd.args());
    if let Some(vars) = cmd.vars() {
        if vars.is_clean() {
            command.env_clear();
        }
        for (name, value) in vars.values() {
            if let Some(value) = value {
                command.env(name, value);
            } else {
                command.env_remove(name);
            }
        }
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    let output = command
        .output()
        .whatever_with(|_| format!("unable to spawn command `{cmd}`"))?;
    if !output.status.success() {
        let status = output.status.code();
        warn!(
            "command `{cmd}` failed with exit code {}",
            status.unwrap_or(1)
        );
        return Err(SwixError::ExternalTool { status }
            .report(format!("command `{cmd}` failed")));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a command, discarding its standard output.
pub fn run_cmd(cmd: Cmd<OsString>) -> SwixResult<()> {
    read_cmd(cmd).map(|_| ())
}
