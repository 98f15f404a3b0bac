pub mod cli;
pub mod config;
pub mod containers;
pub mod error;
pub mod exec;
pub mod system;

pub fn main() {
    if let Err(report) = cli::main() {
        eprintln!("{report:?}");
        swix_cli::failed();
        std::process::exit(report.error().exit_status());
    }
}
