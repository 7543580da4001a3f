use clap::ArgMatches;
use clap::parser::ValueSource;

use crate::args::{ListenAddress, PositiveU64, PositiveUsize, WorkerArgs};
use crate::error::{AppError, AppResult, ConfigError};

use super::types::ConfigFile;

/// Applies config file values to CLI arguments. Values given explicitly on
/// the command line win.
///
/// # Errors
///
/// Returns an error when a config value is out of range or malformed.
pub fn apply_config(
    args: &mut WorkerArgs,
    matches: &ArgMatches,
    config: &ConfigFile,
) -> AppResult<()> {
    if !is_cli(matches, "worker_id")
        && let Some(worker_id) = config.worker_id.clone()
    {
        args.worker_id = worker_id;
    }

    if !is_cli(matches, "script")
        && let Some(script) = config.script.clone()
    {
        args.script = Some(script);
    }

    if !is_cli(matches, "threads")
        && let Some(threads) = config.threads
    {
        args.threads = ensure_positive_usize(threads, "threads")?;
    }

    if !is_cli(matches, "runs")
        && let Some(runs) = config.runs
    {
        args.runs = runs;
    }

    if !is_cli(matches, "duration_ms")
        && let Some(duration_ms) = config.duration_ms
    {
        args.duration_ms = duration_ms;
    }

    if !is_cli(matches, "report_interval_ms")
        && let Some(interval) = config.report_interval_ms
    {
        args.report_interval_ms = ensure_positive_u64(interval, "report_interval_ms")?;
    }

    if !is_cli(matches, "wait_for_start")
        && let Some(wait) = config.wait_for_start
    {
        args.wait_for_start = wait;
    }

    if !is_cli(matches, "wait_for_stop")
        && let Some(wait) = config.wait_for_stop
    {
        args.wait_for_stop = wait;
    }

    if !is_cli(matches, "max_shutdown_wait_ms")
        && let Some(wait) = config.max_shutdown_wait_ms
    {
        args.max_shutdown_wait_ms = ensure_positive_u64(wait, "max_shutdown_wait_ms")?;
    }

    if let Some(console) = config.console.as_ref() {
        if !is_cli(matches, "console_address")
            && let Some(address) = console.address.clone()
        {
            args.console_address = address;
        }
        if !is_cli(matches, "console_port")
            && let Some(port) = console.port
        {
            args.console_port = port;
        }
        if !is_cli(matches, "report_to_console")
            && let Some(report) = console.report
        {
            args.report_to_console = report;
        }
    }

    if let Some(control) = config.control.as_ref() {
        if !is_cli(matches, "control_listen")
            && !is_cli(matches, "control_stdin")
            && let Some(listen) = control.listen.as_deref()
        {
            args.control_listen = Some(listen.parse::<ListenAddress>()?);
        }
        if !is_cli(matches, "control_listeners")
            && let Some(listeners) = control.listeners
        {
            args.control_listeners = ensure_positive_usize(listeners, "control.listeners")?;
        }
        if !is_cli(matches, "receiver_threads")
            && let Some(threads) = control.receiver_threads
        {
            args.receiver_threads = ensure_positive_usize(threads, "control.receiver_threads")?;
        }
    }

    Ok(())
}

fn is_cli(matches: &ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(ValueSource::CommandLine)
}

fn ensure_positive_u64(value: u64, field: &'static str) -> AppResult<PositiveU64> {
    PositiveU64::try_from(value).map_err(|err| {
        AppError::config(ConfigError::FieldMustBePositive { field, source: err })
    })
}

fn ensure_positive_usize(value: usize, field: &'static str) -> AppResult<PositiveUsize> {
    PositiveUsize::try_from(value).map_err(|err| {
        AppError::config(ConfigError::FieldMustBePositive { field, source: err })
    })
}
