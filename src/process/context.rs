use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::shutdown::ShutdownToken;

use super::signals::SignalMask;

/// Where the worker process is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    AwaitingStart,
    Running,
    Draining,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::AwaitingStart => "awaiting-start",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Terminated => "terminated",
        })
    }
}

/// Why the controller stopped waiting in the running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationEvent {
    Signal(SignalMask),
    DurationElapsed,
    ThreadsFinished,
}

#[derive(Debug)]
struct SharedState {
    lifecycle: LifecycleState,
    live_threads: usize,
    pending: SignalMask,
    shutdown_triggered: bool,
    communication_shutdown: bool,
}

/// State shared by the lifecycle controller, the execution threads, the
/// control listener and the timers.
///
/// Everything lives behind one lock so that a timer or signal landing
/// between a check and a wait always wakes the waiter.
#[derive(Debug)]
pub struct ProcessContext {
    state: Mutex<SharedState>,
    changed: Condvar,
    execution: ShutdownToken,
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SharedState {
                lifecycle: LifecycleState::AwaitingStart,
                live_threads: 0,
                pending: SignalMask::NONE,
                shutdown_triggered: false,
                communication_shutdown: false,
            }),
            changed: Condvar::new(),
            execution: ShutdownToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'state>(
        &self,
        guard: MutexGuard<'state, SharedState>,
    ) -> MutexGuard<'state, SharedState> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancelled when execution threads should finish their current run.
    #[must_use]
    pub const fn execution_token(&self) -> &ShutdownToken {
        &self.execution
    }

    #[must_use]
    pub fn lifecycle(&self) -> LifecycleState {
        self.lock().lifecycle
    }

    pub(crate) fn set_lifecycle(&self, lifecycle: LifecycleState) {
        let mut state = self.lock();
        if state.lifecycle != lifecycle {
            debug!("Lifecycle {} -> {}", state.lifecycle, lifecycle);
            state.lifecycle = lifecycle;
            self.changed.notify_all();
        }
    }

    #[must_use]
    pub fn live_threads(&self) -> usize {
        self.lock().live_threads
    }

    /// Counts a new execution thread. The count drops when the returned
    /// guard does.
    #[must_use]
    pub fn register_thread(self: &Arc<Self>) -> ThreadGuard {
        let mut state = self.lock();
        state.live_threads = state.live_threads.saturating_add(1);
        drop(state);
        ThreadGuard {
            context: Arc::clone(self),
        }
    }

    /// Records `mask` as received and wakes every waiter.
    pub fn signal(&self, mask: SignalMask) {
        let mut state = self.lock();
        state.pending |= mask;
        self.changed.notify_all();
    }

    /// Takes and clears the pending signals that are in `mask`.
    pub fn received(&self, mask: SignalMask) -> SignalMask {
        take_signals(&mut self.lock(), mask)
    }

    /// Signals received and not yet taken.
    #[must_use]
    pub fn pending(&self) -> SignalMask {
        self.lock().pending
    }

    /// Marks the run duration as elapsed.
    pub fn trigger_shutdown(&self) {
        let mut state = self.lock();
        state.shutdown_triggered = true;
        self.changed.notify_all();
    }

    /// Stops all further reporting for the rest of the run.
    pub fn mark_communication_shutdown(&self) {
        self.lock().communication_shutdown = true;
    }

    #[must_use]
    pub fn is_communication_shutdown(&self) -> bool {
        self.lock().communication_shutdown
    }

    /// Blocks until a signal in `mask` arrives, then takes it.
    pub fn wait_for_signal(&self, mask: SignalMask) -> SignalMask {
        let mut state = self.lock();
        loop {
            let taken = take_signals(&mut state, mask);
            if !taken.is_empty() {
                return taken;
            }
            state = self.wait(state);
        }
    }

    /// Blocks while execution threads are running, until a signal other
    /// than START arrives or the duration timer fires.
    pub fn wait_for_termination_event(&self) -> TerminationEvent {
        let mut state = self.lock();
        loop {
            if state.live_threads == 0 {
                return TerminationEvent::ThreadsFinished;
            }
            let taken = take_signals(&mut state, SignalMask::ANY ^ SignalMask::START);
            if !taken.is_empty() {
                return TerminationEvent::Signal(taken);
            }
            if state.shutdown_triggered {
                return TerminationEvent::DurationElapsed;
            }
            state = self.wait(state);
        }
    }

    /// Waits up to `limit` for every execution thread to exit. Returns
    /// `false` if some are still running.
    pub fn wait_for_threads(&self, limit: Duration) -> bool {
        let deadline = Instant::now().checked_add(limit);
        let mut state = self.lock();
        while state.live_threads > 0 {
            let Some(deadline) = deadline else {
                state = self.wait(state);
                continue;
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (guard, _timeout) = self
                .changed
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
        true
    }
}

fn take_signals(state: &mut SharedState, mask: SignalMask) -> SignalMask {
    let taken = state.pending & mask;
    state.pending = state.pending.without(taken);
    if taken.intersects(SignalMask::SHUTDOWN) {
        state.communication_shutdown = true;
    }
    taken
}

/// Keeps an execution thread counted as live.
#[derive(Debug)]
pub struct ThreadGuard {
    context: Arc<ProcessContext>,
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        let mut state = self.context.lock();
        state.live_threads = state.live_threads.saturating_sub(1);
        self.context.changed.notify_all();
    }
}

/// Delivers control signals into a running process from outside the
/// control channel.
#[derive(Debug, Clone)]
pub struct SignalHandle {
    context: Arc<ProcessContext>,
}

impl SignalHandle {
    #[must_use]
    pub const fn new(context: Arc<ProcessContext>) -> Self {
        Self { context }
    }

    pub fn signal(&self, mask: SignalMask) {
        self.context.signal(mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};

    #[test]
    fn received_takes_only_requested_bits() -> AppResult<()> {
        let context = ProcessContext::new();
        context.signal(SignalMask::START | SignalMask::STOP);

        if context.received(SignalMask::STOP) != SignalMask::STOP {
            return Err(AppError::validation("STOP not taken"));
        }
        if context.pending() != SignalMask::START {
            return Err(AppError::validation("START was cleared with STOP"));
        }
        if !context.received(SignalMask::STOP).is_empty() {
            return Err(AppError::validation("STOP taken twice"));
        }
        Ok(())
    }

    #[test]
    fn taking_shutdown_marks_communication_shut_down() -> AppResult<()> {
        let context = ProcessContext::new();
        context.signal(SignalMask::SHUTDOWN);
        if context.is_communication_shutdown() {
            return Err(AppError::validation("Marked before the signal was taken"));
        }
        context.received(SignalMask::ANY);
        if !context.is_communication_shutdown() {
            return Err(AppError::validation("SHUTDOWN did not mark the channel"));
        }
        Ok(())
    }

    #[test]
    fn thread_guards_track_live_count() -> AppResult<()> {
        let context = Arc::new(ProcessContext::new());
        let first = context.register_thread();
        let second = context.register_thread();
        if context.live_threads() != 2 {
            return Err(AppError::validation("Expected two live threads"));
        }
        drop(first);
        if context.wait_for_threads(Duration::from_millis(20)) {
            return Err(AppError::validation("Wait ended with a thread still live"));
        }
        let waiter = {
            let context = Arc::clone(&context);
            std::thread::spawn(move || context.wait_for_threads(Duration::from_secs(5)))
        };
        std::thread::sleep(Duration::from_millis(20));
        drop(second);
        let finished = waiter
            .join()
            .map_err(|_err| AppError::validation("Waiter panicked"))?;
        if !finished || context.live_threads() != 0 {
            return Err(AppError::validation("Last guard did not release the waiter"));
        }
        Ok(())
    }

    #[test]
    fn termination_wait_ignores_start() -> AppResult<()> {
        let context = Arc::new(ProcessContext::new());
        let _guard = context.register_thread();
        context.signal(SignalMask::START);

        let waiter = {
            let context = Arc::clone(&context);
            std::thread::spawn(move || context.wait_for_termination_event())
        };
        std::thread::sleep(Duration::from_millis(20));
        if waiter.is_finished() {
            return Err(AppError::validation("START ended the running state"));
        }
        context.trigger_shutdown();
        let event = waiter
            .join()
            .map_err(|_err| AppError::validation("Waiter panicked"))?;
        if event != TerminationEvent::DurationElapsed || context.pending() != SignalMask::START {
            return Err(AppError::validation(format!("Unexpected {:?}", event)));
        }
        Ok(())
    }

    #[test]
    fn termination_wait_reports_stop_before_duration() -> AppResult<()> {
        let context = Arc::new(ProcessContext::new());
        let _guard = context.register_thread();
        context.trigger_shutdown();
        context.signal(SignalMask::STOP);
        match context.wait_for_termination_event() {
            TerminationEvent::Signal(mask) if mask == SignalMask::STOP => Ok(()),
            other => Err(AppError::validation(format!("Unexpected {:?}", other))),
        }
    }

    #[test]
    fn unbounded_thread_wait_ends_with_last_guard() -> AppResult<()> {
        let context = Arc::new(ProcessContext::new());
        let guard = context.register_thread();
        let waiter = {
            let context = Arc::clone(&context);
            std::thread::spawn(move || context.wait_for_threads(Duration::MAX))
        };
        std::thread::sleep(Duration::from_millis(20));
        drop(guard);
        let finished = waiter
            .join()
            .map_err(|_err| AppError::validation("Waiter panicked"))?;
        if !finished {
            return Err(AppError::validation("Unbounded wait reported live threads"));
        }
        Ok(())
    }
}
