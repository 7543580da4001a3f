use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::communication::{DEFAULT_CONSOLE_ADDRESS, DEFAULT_CONSOLE_PORT};

use super::parsers::{parse_listen_address, parse_positive_u64, parse_positive_usize};
use super::types::{ListenAddress, PositiveU64, PositiveUsize};

#[derive(Debug, Parser, Clone)]
#[clap(
    name = "strest-worker",
    version,
    about = "Worker process for distributed strest runs - waits for console signals, runs scripted workload threads, and reports statistics back."
)]
pub struct WorkerArgs {
    /// Identifier this worker reports to the console
    #[arg(long = "worker-id", env = "STREST_WORKER_ID", default_value = "worker-0")]
    pub worker_id: String,

    /// Path to config file (TOML or JSON)
    #[arg(long = "config")]
    pub config: Option<String>,

    /// Workload script to run on every thread
    #[arg(long = "script", short = 's')]
    pub script: Option<PathBuf>,

    /// Number of execution threads
    #[arg(
        long = "threads",
        short = 't',
        default_value = "1",
        value_parser = parse_positive_usize
    )]
    pub threads: PositiveUsize,

    /// Runs per thread (0 runs until stopped)
    #[arg(long = "runs", short = 'r', default_value_t = 0)]
    pub runs: u64,

    /// Stop after this many milliseconds (0 is unbounded)
    #[arg(long = "duration-ms", default_value_t = 0)]
    pub duration_ms: u64,

    /// Interval between statistics reports, in milliseconds
    #[arg(
        long = "report-interval-ms",
        default_value = "500",
        value_parser = parse_positive_u64
    )]
    pub report_interval_ms: PositiveU64,

    /// Console host to report to
    #[arg(long = "console-address", default_value = DEFAULT_CONSOLE_ADDRESS)]
    pub console_address: String,

    /// Console port to report to
    #[arg(long = "console-port", default_value_t = DEFAULT_CONSOLE_PORT)]
    pub console_port: u16,

    /// Send statistics and status reports to the console
    #[arg(long = "report-to-console")]
    pub report_to_console: bool,

    /// Wait for a start signal before running threads
    #[arg(long = "wait-for-start")]
    pub wait_for_start: bool,

    /// After finishing on its own, wait for a signal before exiting
    #[arg(long = "wait-for-stop")]
    pub wait_for_stop: bool,

    /// Accept control messages over TCP on host:port (empty host for all interfaces)
    #[arg(long = "control-listen", value_parser = parse_listen_address)]
    pub control_listen: Option<ListenAddress>,

    /// Read the initialise message and control signals from stdin
    #[arg(long = "control-stdin", conflicts_with = "control_listen")]
    pub control_stdin: bool,

    /// Accept threads for the control listener
    #[arg(
        long = "control-listeners",
        default_value = "1",
        value_parser = parse_positive_usize
    )]
    pub control_listeners: PositiveUsize,

    /// Threads polling control connections
    #[arg(
        long = "receiver-threads",
        default_value = "5",
        value_parser = parse_positive_usize
    )]
    pub receiver_threads: PositiveUsize,

    /// Longest wait for threads to finish once stopping, in milliseconds
    #[arg(
        long = "max-shutdown-wait-ms",
        default_value = "10000",
        value_parser = parse_positive_u64
    )]
    pub max_shutdown_wait_ms: PositiveU64,

    /// Enable debug logging
    #[arg(long = "verbose", short = 'v')]
    pub verbose: bool,
}

impl WorkerArgs {
    /// The run duration, or `None` when unbounded.
    #[must_use]
    pub const fn duration(&self) -> Option<Duration> {
        if self.duration_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.duration_ms))
        }
    }

    #[must_use]
    pub const fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms.get())
    }

    #[must_use]
    pub const fn max_shutdown_wait(&self) -> Duration {
        Duration::from_millis(self.max_shutdown_wait_ms.get())
    }
}
