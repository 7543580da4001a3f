use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::communication::Receiver;
use crate::error::AppResult;
use crate::shutdown::ShutdownToken;

use super::context::SignalHandle;
use super::signals::SignalMask;

/// Turns control messages from a [`Receiver`] into process signals on a
/// dedicated thread.
///
/// When the receiver runs dry the controller has lost its agent, so the
/// listener records SHUTDOWN before exiting.
pub struct ControlListener {
    receiver: Arc<dyn Receiver>,
    stopping: ShutdownToken,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ControlListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlListener")
            .field("stopping", &self.stopping.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ControlListener {
    /// # Errors
    ///
    /// Returns an error if the listener thread cannot be spawned.
    pub fn spawn(receiver: Arc<dyn Receiver>, signals: SignalHandle) -> AppResult<Self> {
        let stopping = ShutdownToken::new();
        let thread_receiver = Arc::clone(&receiver);
        let thread_stopping = stopping.clone();
        let handle = std::thread::Builder::new()
            .name("control listener".to_owned())
            .spawn(move || listen(thread_receiver.as_ref(), &signals, &thread_stopping))?;
        Ok(Self {
            receiver,
            stopping,
            handle: Some(handle),
        })
    }

    /// Stops listening. A thread blocked in a read that cannot be woken,
    /// such as one on stdin, is left to die with the process.
    pub fn shutdown(&mut self) {
        self.stopping.cancel();
        self.receiver.shutdown();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.is_finished() {
            if handle.join().is_err() {
                warn!("Control listener panicked");
            }
        } else {
            debug!("Control listener still blocked on input; detaching");
        }
    }
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn listen(receiver: &dyn Receiver, signals: &SignalHandle, stopping: &ShutdownToken) {
    loop {
        match receiver.wait_for_message() {
            Ok(Some(message)) => match SignalMask::from_message(&message) {
                Some(mask) => {
                    info!("Received {} signal", mask);
                    signals.signal(mask);
                }
                None => debug!("Ignoring {} message on control channel", message.kind()),
            },
            Ok(None) => {
                if !stopping.is_cancelled() {
                    info!("Control channel closed, shutting down");
                    signals.signal(SignalMask::SHUTDOWN);
                }
                return;
            }
            Err(err) if err.is_shutdown() => return,
            Err(err) => warn!("Control message lost: {}", err),
        }
    }
}
