use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::AppResult;
use crate::shutdown::ShutdownToken;

/// A task run on its own thread after a delay, optionally repeating, that
/// can be cancelled deterministically.
#[derive(Debug)]
pub struct ScheduledTask {
    name: String,
    token: ShutdownToken,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Runs `task` immediately and then again `interval` after each run
    /// finishes, until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the timer thread cannot be spawned.
    pub fn repeating<F>(name: &str, interval: Duration, mut task: F) -> AppResult<Self>
    where
        F: FnMut() + Send + 'static,
    {
        Self::spawn(name, move |token: &ShutdownToken| {
            loop {
                task();
                if token.sleep(interval) {
                    break;
                }
            }
        })
    }

    /// Runs `task` once after `delay` unless cancelled first.
    ///
    /// # Errors
    ///
    /// Returns an error if the timer thread cannot be spawned.
    pub fn once<F>(name: &str, delay: Duration, task: F) -> AppResult<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        Self::spawn(name, move |token: &ShutdownToken| {
            if !token.sleep(delay) {
                task();
            }
        })
    }

    fn spawn<F>(name: &str, body: F) -> AppResult<Self>
    where
        F: FnOnce(&ShutdownToken) + Send + 'static,
    {
        let token = ShutdownToken::new();
        let thread_token = token.clone();
        let handle = std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || body(&thread_token))?;
        Ok(Self {
            name: name.to_owned(),
            token,
            handle: Some(handle),
        })
    }

    /// Stops the timer and waits for a run in progress to finish. No run
    /// starts after this returns. Idempotent.
    pub fn cancel(&mut self) {
        self.token.cancel();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == std::thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("Timer '{}' panicked", self.name);
        } else {
            debug!("Timer '{}' cancelled", self.name);
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
