//! Turns OS termination signals into a STOP for the running process.
use std::thread::JoinHandle;

use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::process::{EXIT_RUNTIME_FAILURE, SignalHandle, SignalMask};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// What ended a wait on OS signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Interrupted,
    Released,
}

/// Background watcher for Ctrl+C and SIGTERM. Dropping it releases the
/// watcher thread.
#[derive(Debug)]
pub struct SignalWatcher {
    done: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SignalWatcher {
    /// The first signal requests a STOP. A second one exits immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher thread cannot be spawned.
    pub fn spawn(signals: SignalHandle) -> AppResult<Self> {
        let (done_tx, done_rx) = oneshot::channel();
        let handle = std::thread::Builder::new()
            .name("signal watcher".to_owned())
            .spawn(move || watch(&signals, done_rx))?;
        Ok(Self {
            done: Some(done_tx),
            handle: Some(handle),
        })
    }

    pub fn release(&mut self) {
        if let Some(done) = self.done.take() {
            drop(done.send(()));
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Signal watcher panicked");
        }
    }
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        self.release();
    }
}

fn watch(signals: &SignalHandle, mut done: oneshot::Receiver<()>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            warn!("Failed to start signal watcher: {}", err);
            return;
        }
    };

    runtime.block_on(async {
        if wait_for_signal(&mut done).await == SignalOutcome::Released {
            return;
        }
        info!("Termination signal received, stopping");
        signals.signal(SignalMask::STOP);

        if wait_for_signal(&mut done).await == SignalOutcome::Interrupted {
            warn!("Second termination signal received, exiting");
            std::process::exit(i32::from(EXIT_RUNTIME_FAILURE));
        }
    });
}

/// Waits for Ctrl+C, SIGTERM or the release channel.
pub async fn wait_for_signal(done: &mut oneshot::Receiver<()>) -> SignalOutcome {
    #[cfg(unix)]
    let mut term_signal = match signal(SignalKind::terminate()) {
        Ok(signal) => Some(signal),
        Err(err) => {
            warn!("Failed to register SIGTERM handler: {}", err);
            None
        }
    };

    #[cfg(unix)]
    {
        tokio::select! {
            _ = done => SignalOutcome::Released,
            _ = tokio::signal::ctrl_c() => SignalOutcome::Interrupted,
            () = async {
                if let Some(signal) = term_signal.as_mut() {
                    signal.recv().await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => SignalOutcome::Interrupted,
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = done => SignalOutcome::Released,
            _ = tokio::signal::ctrl_c() => SignalOutcome::Interrupted,
        }
    }
}
