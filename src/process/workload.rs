use crate::error::AppResult;
use crate::shutdown::ShutdownToken;

/// What an execution thread knows about the run it is performing.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'run> {
    pub thread_id: usize,
    /// Zero-based run number within this thread.
    pub run: u64,
    /// Cancelled when the process starts draining. Long runs should poll
    /// it or sleep on it.
    pub shutdown: &'run ShutdownToken,
}

/// One execution thread's workload.
pub trait Workload: Send {
    /// Performs one run.
    ///
    /// # Errors
    ///
    /// An error aborts the thread; other threads keep running.
    fn run_iteration(&mut self, ctx: &RunContext<'_>) -> AppResult<()>;
}

impl<F> Workload for F
where
    F: FnMut(&RunContext<'_>) -> AppResult<()> + Send,
{
    fn run_iteration(&mut self, ctx: &RunContext<'_>) -> AppResult<()> {
        self(ctx)
    }
}

/// Builds a workload for each execution thread.
pub trait WorkloadFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the workload cannot be prepared; the process
    /// then fails before any thread starts.
    fn create(&self, thread_id: usize) -> AppResult<Box<dyn Workload>>;
}

impl<F> WorkloadFactory for F
where
    F: Fn(usize) -> AppResult<Box<dyn Workload>> + Send + Sync,
{
    fn create(&self, thread_id: usize) -> AppResult<Box<dyn Workload>> {
        self(thread_id)
    }
}
