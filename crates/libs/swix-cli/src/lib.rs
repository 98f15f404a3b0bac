//! Logging and terminal interaction for the Swix tools.

use std::io;

use console::{style, Term};
use tracing_subscriber::EnvFilter;

/// Initialize logging.
///
/// Log lines go to stderr so that stdout stays reserved for command output.
pub fn init() {
    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_target(false)
        .compact();
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .event_format(format)
        .init();
}

/// Indicates whether a human is attending the terminal.
pub fn is_attended() -> bool {
    console::user_attended_stderr()
}

/// Ask the operator to confirm a destructive operation.
///
/// Without an attended terminal nobody can answer and the operation is
/// declined.
pub fn confirm(prompt: &str) -> io::Result<bool> {
    let term = Term::stderr();
    if !term.is_term() {
        return Ok(false);
    }
    term.write_str(&format!("{prompt} [y/N]: "))?;
    let answer = term.read_line()?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "Yes"))
}

/// Print the marker of a successfully completed operation.
pub fn done() {
    eprintln!("{}", style("Done").green().bold());
}

/// Print the marker of a failed operation.
pub fn failed() {
    eprintln!("{}", style("Failed").red().bold());
}
