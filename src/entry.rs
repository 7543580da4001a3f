use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgMatches, CommandFactory, FromArgMatches};
use tracing::{debug, error, info, warn};

use crate::args::WorkerArgs;
use crate::communication::{
    ClientSender, Connector, DEFAULT_IDLE_SLEEP, InitialiseMessage, Message, NullSender,
    QueuedSender, QueuedSenderDecorator, Receiver, ReceiverConfig, ServerReceiver, StreamReceiver,
};
use crate::config::{apply_config, load_config};
use crate::error::{AppError, AppResult, ConfigError};
use crate::process::{
    EXIT_INITIALISATION_FAILURE, EXIT_RUNTIME_FAILURE, ExitReason, LifecycleConfig,
    ProcessController, TestRegistry,
};
use crate::script::{Script, ScriptWorkloadFactory};
use crate::shutdown_handlers::SignalWatcher;

pub fn run() -> ExitCode {
    match execute() {
        Ok(reason) => {
            info!("Worker process {} (exit status {})", reason, reason.code());
            reason.into()
        }
        Err(err) => {
            error!("{}", err);
            if err.is_initialisation() {
                ExitCode::from(EXIT_INITIALISATION_FAILURE)
            } else {
                ExitCode::from(EXIT_RUNTIME_FAILURE)
            }
        }
    }
}

fn execute() -> AppResult<ExitReason> {
    let (mut args, matches) = parse_args()?;
    crate::logger::init_logging(args.verbose);

    if let Some(config) = load_config(args.config.as_deref())? {
        apply_config(&mut args, &matches, &config)?;
    }

    let control = open_control(&mut args)?;

    let script_path = args
        .script
        .clone()
        .ok_or_else(|| AppError::config(ConfigError::MissingScript))?;
    let script = Script::load(&script_path)?;
    info!(
        "Loaded script {} with {} steps",
        script.path().display(),
        script.len()
    );

    let registry = Arc::new(TestRegistry::new());
    let workload = ScriptWorkloadFactory::new(script, Arc::clone(&registry));
    let sender = console_sender(&args)?;

    if args.wait_for_start && control.is_none() {
        warn!("Waiting for a start signal with no control source; only Ctrl+C ends the wait");
    }

    let mut controller = ProcessController::new(
        lifecycle_config(&args),
        Arc::new(workload),
        registry,
        sender,
    );
    if let Some(receiver) = control {
        controller.listen_to(receiver)?;
    }
    let _signals = SignalWatcher::spawn(controller.signal_handle())?;
    controller.run()
}

fn parse_args() -> AppResult<(WorkerArgs, ArgMatches)> {
    let matches = WorkerArgs::command().get_matches_from(std::env::args_os());
    let args = WorkerArgs::from_arg_matches(&matches)?;
    Ok((args, matches))
}

/// Opens the control source, reading the agent's initialise message first
/// when control arrives on stdin.
fn open_control(args: &mut WorkerArgs) -> AppResult<Option<Arc<dyn Receiver>>> {
    if let Some(listen) = args.control_listen.as_ref() {
        let config = ReceiverConfig {
            listeners: args.control_listeners.get(),
            threads: args.receiver_threads.get(),
            idle_sleep: DEFAULT_IDLE_SLEEP,
        };
        let receiver = ServerReceiver::bind_with(&listen.host, listen.port, &config)?;
        info!("Listening for control messages on {}", receiver.local_addr());
        let receiver: Arc<dyn Receiver> = Arc::new(receiver);
        return Ok(Some(receiver));
    }

    if args.control_stdin {
        let receiver = StreamReceiver::new(std::io::stdin());
        let initialise = read_initialise(&receiver)?;
        apply_initialise(args, initialise);
        let receiver: Arc<dyn Receiver> = Arc::new(receiver);
        return Ok(Some(receiver));
    }

    Ok(None)
}

fn read_initialise(receiver: &dyn Receiver) -> AppResult<InitialiseMessage> {
    match receiver.wait_for_message()? {
        Some(Message::Initialise(initialise)) => Ok(initialise),
        Some(other) => Err(AppError::config(ConfigError::UnexpectedHandshake {
            kind: other.kind(),
        })),
        None => Err(AppError::config(ConfigError::NoControlStream)),
    }
}

fn apply_initialise(args: &mut WorkerArgs, initialise: InitialiseMessage) {
    debug!("Initialise message from agent: {:?}", initialise);
    args.worker_id = initialise.worker_id;
    args.report_to_console = initialise.report_to_console;
    args.wait_for_start = initialise.wait_for_start;
    args.wait_for_stop = initialise.wait_for_stop;
    if let Some(script) = initialise.script {
        args.script = Some(script.into());
    }
}

fn console_sender(args: &WorkerArgs) -> AppResult<Box<dyn QueuedSender>> {
    if !args.report_to_console {
        return Ok(Box::new(NullSender));
    }
    let connector = Connector::new(args.console_address.clone(), args.console_port);
    let sender = ClientSender::connect(&connector)?;
    info!("Reporting to console at {}", connector.endpoint());
    Ok(Box::new(QueuedSenderDecorator::new(sender)))
}

fn lifecycle_config(args: &WorkerArgs) -> LifecycleConfig {
    LifecycleConfig {
        worker_id: args.worker_id.clone(),
        threads: args.threads.get(),
        runs: args.runs,
        duration: args.duration(),
        report_interval: args.report_interval(),
        wait_for_start: args.wait_for_start,
        wait_for_stop: args.wait_for_stop,
        max_shutdown_wait: args.max_shutdown_wait(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Cursor;

    fn default_args() -> AppResult<WorkerArgs> {
        Ok(WorkerArgs::try_parse_from(["strest-worker", "--script", "cli.script"])?)
    }

    fn stream(frames: &str) -> StreamReceiver<Cursor<Vec<u8>>> {
        StreamReceiver::new(Cursor::new(frames.as_bytes().to_vec()))
    }

    #[test]
    fn initialise_message_overrides_cli_values() -> AppResult<()> {
        let receiver = stream(
            "{\"type\":\"initialise\",\"worker_id\":\"agent-3\",\"report_to_console\":true,\"wait_for_start\":true,\"script\":\"agent.script\"}\n",
        );
        let mut args = default_args()?;
        let initialise = read_initialise(&receiver)?;
        apply_initialise(&mut args, initialise);

        if args.worker_id != "agent-3" || !args.report_to_console || !args.wait_for_start {
            return Err(AppError::validation(format!("Unexpected {:?}", args)));
        }
        if args.wait_for_stop {
            return Err(AppError::validation("wait_for_stop should default to false"));
        }
        if args.script.as_deref() != Some(std::path::Path::new("agent.script")) {
            return Err(AppError::validation(format!("Unexpected {:?}", args.script)));
        }
        Ok(())
    }

    #[test]
    fn initialise_without_script_keeps_cli_script() -> AppResult<()> {
        let receiver = stream(
            "{\"type\":\"initialise\",\"worker_id\":\"a\",\"report_to_console\":false,\"wait_for_start\":false}\n",
        );
        let mut args = default_args()?;
        apply_initialise(&mut args, read_initialise(&receiver)?);
        if args.script.as_deref() != Some(std::path::Path::new("cli.script")) {
            return Err(AppError::validation(format!("Unexpected {:?}", args.script)));
        }
        Ok(())
    }

    #[test]
    fn closed_control_stream_is_a_configuration_error() -> AppResult<()> {
        let receiver = stream("");
        match read_initialise(&receiver) {
            Err(err @ AppError::Config(ConfigError::NoControlStream)) if err.is_initialisation() => {
                Ok(())
            }
            other => Err(AppError::validation(format!("Unexpected {:?}", other))),
        }
    }

    #[test]
    fn signal_before_initialise_is_rejected() -> AppResult<()> {
        let receiver = stream("{\"type\":\"start\"}\n");
        match read_initialise(&receiver) {
            Err(AppError::Config(ConfigError::UnexpectedHandshake { kind })) if kind == "start" => {
                Ok(())
            }
            other => Err(AppError::validation(format!("Unexpected {:?}", other))),
        }
    }

    #[test]
    fn lifecycle_config_follows_args() -> AppResult<()> {
        let args = WorkerArgs::try_parse_from([
            "strest-worker",
            "--threads",
            "3",
            "--runs",
            "7",
            "--duration-ms",
            "1500",
            "--wait-for-stop",
        ])?;
        let config = lifecycle_config(&args);
        if config.threads != 3
            || config.runs != 7
            || config.duration != Some(std::time::Duration::from_millis(1500))
            || !config.wait_for_stop
            || config.wait_for_start
        {
            return Err(AppError::validation(format!("Unexpected {:?}", config)));
        }
        Ok(())
    }

    #[test]
    fn unreachable_console_is_an_initialisation_failure() -> AppResult<()> {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
            listener.local_addr()?.port()
        };
        let port_arg = port.to_string();
        let args = WorkerArgs::try_parse_from([
            "strest-worker",
            "--script",
            "cli.script",
            "--report-to-console",
            "--console-address",
            "127.0.0.1",
            "--console-port",
            port_arg.as_str(),
        ])?;
        match console_sender(&args) {
            Err(err) if err.is_initialisation() => Ok(()),
            Err(err) => Err(AppError::validation(format!("Runtime failure: {}", err))),
            Ok(_) => Err(AppError::validation("Connected to a closed port")),
        }
    }

    #[test]
    fn console_reporting_off_uses_null_sender() -> AppResult<()> {
        let args = default_args()?;
        let mut sender = console_sender(&args)?;
        sender.queue(Message::Start)?;
        sender.flush()?;
        Ok(())
    }
}
