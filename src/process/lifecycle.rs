use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::communication::{ProcessState, QueuedSender, Receiver};
use crate::error::AppResult;
use crate::shutdown::ShutdownToken;

use super::context::{LifecycleState, ProcessContext, SignalHandle, TerminationEvent};
use super::exit::ExitReason;
use super::listener::ControlListener;
use super::reporter::Reporter;
use super::signals::SignalMask;
use super::statistics::StatisticsSource;
use super::timer::ScheduledTask;
use super::workload::{RunContext, Workload, WorkloadFactory};

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_SHUTDOWN_WAIT: Duration = Duration::from_secs(10);

/// Settings for one worker process run.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub worker_id: String,
    pub threads: usize,
    /// Runs per thread; 0 runs until stopped.
    pub runs: u64,
    /// Wall-clock limit on the running state; `None` is unbounded.
    pub duration: Option<Duration>,
    pub report_interval: Duration,
    pub wait_for_start: bool,
    pub wait_for_stop: bool,
    pub max_shutdown_wait: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker".to_owned(),
            threads: 1,
            runs: 0,
            duration: None,
            report_interval: DEFAULT_REPORT_INTERVAL,
            wait_for_start: false,
            wait_for_stop: false,
            max_shutdown_wait: DEFAULT_MAX_SHUTDOWN_WAIT,
        }
    }
}

/// Drives a worker process from start-up to its exit decision.
pub struct ProcessController {
    config: LifecycleConfig,
    context: Arc<ProcessContext>,
    workload: Arc<dyn WorkloadFactory>,
    statistics: Arc<dyn StatisticsSource>,
    sender: Box<dyn QueuedSender>,
    listener: Option<ControlListener>,
}

impl std::fmt::Debug for ProcessController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessController")
            .field("config", &self.config)
            .field("context", &self.context)
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

impl ProcessController {
    #[must_use]
    pub fn new(
        config: LifecycleConfig,
        workload: Arc<dyn WorkloadFactory>,
        statistics: Arc<dyn StatisticsSource>,
        sender: Box<dyn QueuedSender>,
    ) -> Self {
        Self {
            config,
            context: Arc::new(ProcessContext::new()),
            workload,
            statistics,
            sender,
            listener: None,
        }
    }

    /// Takes control signals from `receiver` for the rest of the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener thread cannot be spawned.
    pub fn listen_to(&mut self, receiver: Arc<dyn Receiver>) -> AppResult<()> {
        if let Some(mut previous) = self.listener.take() {
            previous.shutdown();
        }
        self.listener = Some(ControlListener::spawn(receiver, self.signal_handle())?);
        Ok(())
    }

    #[must_use]
    pub const fn context(&self) -> &Arc<ProcessContext> {
        &self.context
    }

    #[must_use]
    pub fn signal_handle(&self) -> SignalHandle {
        SignalHandle::new(Arc::clone(&self.context))
    }

    /// Runs the process and decides how it should exit.
    ///
    /// # Errors
    ///
    /// Returns an error if a workload cannot be created, the initial status
    /// report cannot be sent, or a thread cannot be spawned.
    pub fn run(self) -> AppResult<ExitReason> {
        let Self {
            config,
            context,
            workload,
            statistics,
            sender,
            mut listener,
        } = self;

        info!(
            "Worker {} preparing {} threads",
            config.worker_id, config.threads
        );
        let workloads = (0..config.threads)
            .map(|thread_id| workload.create(thread_id))
            .collect::<AppResult<Vec<_>>>()?;

        let reporter = Arc::new(Reporter::new(
            config.worker_id.clone(),
            config.threads,
            Arc::clone(&context),
            Arc::clone(&statistics),
            sender,
        ));
        reporter.send_status(ProcessState::Started, 0, config.threads)?;

        let mut report_timer = {
            let reporter = Arc::clone(&reporter);
            ScheduledTask::repeating("report timer", config.report_interval, move || {
                reporter.tick();
            })?
        };

        let mut last = SignalMask::NONE;
        if config.wait_for_start {
            info!("Waiting for start signal");
            last = context.wait_for_signal(SignalMask::ANY);
        }

        if last.intersects(SignalMask::START) || !config.wait_for_start {
            let outcome = running_phase(&config, &context, workloads);
            report_timer.cancel();
            last = outcome?;
            reporter.tick();
        } else {
            report_timer.cancel();
        }

        context.set_lifecycle(LifecycleState::Terminated);
        if !context.is_communication_shutdown()
            && let Err(err) = reporter.send_status(ProcessState::Finished, 0, 0)
        {
            warn!("Final status report failed: {}", err);
        }
        reporter.shutdown();

        info!(
            "Final statistics for this process:\n{}",
            statistics.render_summary()
        );

        if config.wait_for_stop && last.is_empty() {
            info!("Finished, waiting for console signal");
            last = context.wait_for_signal(SignalMask::ANY);
        }

        if let Some(listener) = listener.as_mut() {
            listener.shutdown();
        }

        let reason = ExitReason::from_signals(last);
        info!("Worker {} {}", config.worker_id, reason);
        Ok(reason)
    }
}

/// Runs the execution threads until a stop condition, then drains them.
/// Returns the signals that ended the run.
fn running_phase(
    config: &LifecycleConfig,
    context: &Arc<ProcessContext>,
    workloads: Vec<Box<dyn Workload>>,
) -> AppResult<SignalMask> {
    context.set_lifecycle(LifecycleState::Running);
    let started_at = chrono::Local::now();
    info!(
        "Starting {} threads at {}",
        workloads.len(),
        started_at.format("%Y-%m-%d %H:%M:%S%.3f")
    );

    let mut handles = Vec::with_capacity(workloads.len());
    let mut spawned = Ok(());
    for (thread_id, workload) in workloads.into_iter().enumerate() {
        let guard = context.register_thread();
        let token = context.execution_token().clone();
        let runs = config.runs;
        match std::thread::Builder::new()
            .name(format!("worker thread {}", thread_id))
            .spawn(move || {
                let mut workload = workload;
                execute(workload.as_mut(), thread_id, runs, &token);
                drop(guard);
            })
        {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                spawned = Err(err);
                break;
            }
        }
    }

    let mut duration_timer = None;
    let event: AppResult<TerminationEvent> = match spawned {
        Ok(()) => match start_duration_timer(config, context) {
            Ok(timer) => {
                duration_timer = timer;
                Ok(context.wait_for_termination_event())
            }
            Err(err) => Err(err),
        },
        Err(err) => Err(err.into()),
    };

    context.set_lifecycle(LifecycleState::Draining);
    if let Some(timer) = duration_timer.as_mut() {
        timer.cancel();
    }
    drain(config, context, handles);

    Ok(match event? {
        TerminationEvent::Signal(mask) => {
            info!("Received {} signal, stopping", mask);
            mask
        }
        TerminationEvent::DurationElapsed => {
            info!("Specified duration exceeded, shutting down");
            SignalMask::NONE
        }
        TerminationEvent::ThreadsFinished => SignalMask::NONE,
    })
}

fn start_duration_timer(
    config: &LifecycleConfig,
    context: &Arc<ProcessContext>,
) -> AppResult<Option<ScheduledTask>> {
    let Some(duration) = config.duration else {
        return Ok(None);
    };
    info!("Will shut down after {} ms", duration.as_millis());
    let context = Arc::clone(context);
    let timer = ScheduledTask::once("duration timer", duration, move || {
        context.trigger_shutdown();
    })?;
    Ok(Some(timer))
}

fn drain(config: &LifecycleConfig, context: &ProcessContext, handles: Vec<JoinHandle<()>>) {
    context.execution_token().cancel();
    let live = context.live_threads();
    if live > 0 {
        info!("Waiting for {} threads to terminate", live);
        if !context.wait_for_threads(config.max_shutdown_wait) {
            warn!(
                "{} threads not terminating, continuing anyway",
                context.live_threads()
            );
        }
    }
    for handle in handles {
        if !handle.is_finished() {
            continue;
        }
        let name = handle.thread().name().unwrap_or("worker thread").to_owned();
        if handle.join().is_err() {
            warn!("{} panicked", name);
        }
    }
}

/// Runs `workload` until `runs` is reached or `shutdown` is cancelled.
fn execute(
    workload: &mut dyn Workload,
    thread_id: usize,
    runs: u64,
    shutdown: &ShutdownToken,
) {
    let mut run = 0_u64;
    while !shutdown.is_cancelled() && (runs == 0 || run < runs) {
        let ctx = RunContext {
            thread_id,
            run,
            shutdown,
        };
        if let Err(err) = workload.run_iteration(&ctx) {
            error!("Thread {} aborted in run {}: {}", thread_id, run, err);
            return;
        }
        run = run.saturating_add(1);
    }
    debug!("Thread {} finished after {} runs", thread_id, run);
}
