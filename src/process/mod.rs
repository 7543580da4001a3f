//! The worker process lifecycle: waiting for START, running execution
//! threads, draining them and choosing an exit status.
mod context;
mod exit;
mod lifecycle;
mod listener;
mod reporter;
mod signals;
mod statistics;
#[cfg(test)]
mod testing;
mod timer;
mod workload;

pub use context::{LifecycleState, ProcessContext, SignalHandle, TerminationEvent, ThreadGuard};
pub use exit::{EXIT_INITIALISATION_FAILURE, EXIT_RUNTIME_FAILURE, ExitReason};
pub use lifecycle::{
    DEFAULT_MAX_SHUTDOWN_WAIT, DEFAULT_REPORT_INTERVAL, LifecycleConfig, ProcessController,
};
pub use listener::ControlListener;
pub use reporter::Reporter;
pub use signals::SignalMask;
pub use statistics::{StatisticsSource, TestRegistry};
pub use timer::ScheduledTask;
pub use workload::{RunContext, Workload, WorkloadFactory};
