use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::communication::{Message, QueuedSender, Sender};
use crate::error::CommunicationError;

#[derive(Debug, Default)]
struct Recorded {
    pending: Vec<Message>,
    batches: Vec<Vec<Message>>,
    attempts: usize,
    shutdowns: usize,
    failing: bool,
}

/// A sender that keeps every flushed batch for inspection.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingSender {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingSender {
    /// A sender whose every delivery fails.
    pub(crate) fn failing() -> Self {
        let sender = Self::default();
        sender.lock().failing = true;
        sender
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn batches(&self) -> Vec<Vec<Message>> {
        self.lock().batches.clone()
    }

    pub(crate) fn messages(&self) -> Vec<Message> {
        self.lock().batches.iter().flatten().cloned().collect()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.lock().attempts
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.lock().shutdowns
    }
}

impl Sender for RecordingSender {
    fn send(&mut self, message: Message) -> Result<(), CommunicationError> {
        self.queue(message)?;
        self.flush()
    }

    fn shutdown(&mut self) {
        let mut recorded = self.lock();
        recorded.shutdowns = recorded.shutdowns.saturating_add(1);
    }
}

impl QueuedSender for RecordingSender {
    fn queue(&mut self, message: Message) -> Result<(), CommunicationError> {
        self.lock().pending.push(message);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CommunicationError> {
        let mut recorded = self.lock();
        recorded.attempts = recorded.attempts.saturating_add(1);
        let batch = std::mem::take(&mut recorded.pending);
        if recorded.failing {
            return Err(CommunicationError::ConnectionClosed);
        }
        recorded.batches.push(batch);
        Ok(())
    }
}
