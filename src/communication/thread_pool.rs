use std::ops::ControlFlow;
use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::error::CommunicationError;
use crate::shutdown::ShutdownToken;

/// The body of one pool thread.
///
/// Each thread owns its own task instance, so per-thread state (buffers,
/// idle counters) lives in the task and is never shared.
pub trait PoolTask: Send + 'static {
    /// Runs one iteration. `Break` ends this thread; the pool checks the
    /// shutdown token between iterations.
    fn iterate(&mut self, shutdown: &ShutdownToken) -> ControlFlow<()>;
}

impl<F> PoolTask for F
where
    F: FnMut(&ShutdownToken) -> ControlFlow<()> + Send + 'static,
{
    fn iterate(&mut self, shutdown: &ShutdownToken) -> ControlFlow<()> {
        self(shutdown)
    }
}

/// A fixed number of long-lived threads, each running a task built by a
/// factory. Dead threads are not restarted.
#[derive(Debug)]
pub struct ThreadPool {
    name: String,
    size: usize,
    shutdown: ShutdownToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    #[must_use]
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            shutdown: ShutdownToken::new(),
            handles: Mutex::new(Vec::with_capacity(size)),
        }
    }

    /// Launches every thread, calling `factory` once per thread.
    ///
    /// # Errors
    ///
    /// Returns an error if a thread cannot be spawned; threads already
    /// started keep running until [`ThreadPool::stop`].
    pub fn start<F, T>(&self, mut factory: F) -> Result<(), CommunicationError>
    where
        F: FnMut() -> T,
        T: PoolTask,
    {
        let mut handles = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for index in 0..self.size {
            let mut task = factory();
            let shutdown = self.shutdown.clone();
            let thread_name = format!("{} thread {}", self.name, index);
            let handle = std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    while !shutdown.is_cancelled() {
                        if task.iterate(&shutdown).is_break() {
                            break;
                        }
                    }
                })
                .map_err(|err| CommunicationError::SpawnThread {
                    name: thread_name,
                    source: err,
                })?;
            handles.push(handle);
        }
        debug!("Started {} ({} threads)", self.name, self.size);
        Ok(())
    }

    /// Signals every thread to finish its current iteration and waits for
    /// all of them to exit. Idempotent.
    pub fn stop(&self) {
        self.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            let thread_name = handle.thread().name().unwrap_or("unnamed").to_owned();
            if handle.join().is_err() {
                warn!("Pool thread '{}' panicked", thread_name);
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}
