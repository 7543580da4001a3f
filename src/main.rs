mod args;
mod communication;
mod config;
mod entry;
mod error;
mod logger;
mod process;
mod script;
mod shutdown;
mod shutdown_handlers;

use std::process::ExitCode;

fn main() -> ExitCode {
    entry::run()
}
