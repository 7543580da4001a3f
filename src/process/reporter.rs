use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::communication::{
    Message, ProcessState, ProcessStatusMessage, QueuedSender, RegisterTestsMessage,
    ReportStatisticsMessage,
};
use crate::error::CommunicationError;

use super::context::ProcessContext;
use super::statistics::StatisticsSource;

/// Pushes statistics and process status to the console.
pub struct Reporter {
    worker_id: String,
    total_threads: usize,
    context: Arc<ProcessContext>,
    statistics: Arc<dyn StatisticsSource>,
    sender: Mutex<Box<dyn QueuedSender>>,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("worker_id", &self.worker_id)
            .field("total_threads", &self.total_threads)
            .finish_non_exhaustive()
    }
}

impl Reporter {
    #[must_use]
    pub const fn new(
        worker_id: String,
        total_threads: usize,
        context: Arc<ProcessContext>,
        statistics: Arc<dyn StatisticsSource>,
        sender: Box<dyn QueuedSender>,
    ) -> Self {
        Self {
            worker_id,
            total_threads,
            context,
            statistics,
            sender: Mutex::new(sender),
        }
    }

    fn sender(&self) -> MutexGuard<'_, Box<dyn QueuedSender>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self, state: ProcessState, running: usize, total: usize) -> Message {
        Message::ProcessStatus(ProcessStatusMessage {
            worker_id: self.worker_id.clone(),
            state,
            running_threads: running,
            total_threads: total,
        })
    }

    /// Sends a status message straight away.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the send fails.
    pub fn send_status(
        &self,
        state: ProcessState,
        running: usize,
        total: usize,
    ) -> Result<(), CommunicationError> {
        let message = self.status(state, running, total);
        self.sender().send(message)
    }

    /// Sends new test registrations, the statistics delta and a running
    /// status as one batch. A failure stops reporting for the rest of the
    /// run.
    pub fn tick(&self) {
        if self.context.is_communication_shutdown() {
            return;
        }
        if let Err(err) = self.report() {
            warn!("Report to console failed: {}", err);
            self.context.mark_communication_shutdown();
        }
    }

    fn report(&self) -> Result<(), CommunicationError> {
        let mut sender = self.sender();
        if let Some(tests) = self.statistics.new_tests() {
            debug!("Registering {} tests", tests.len());
            sender.queue(Message::RegisterTests(RegisterTestsMessage { tests }))?;
        }
        sender.queue(Message::ReportStatistics(ReportStatisticsMessage {
            worker_id: self.worker_id.clone(),
            delta: self.statistics.take_delta(),
        }))?;
        let status = self.status(
            ProcessState::Running,
            self.context.live_threads(),
            self.total_threads,
        );
        sender.send(status)
    }

    /// Closes the console connection.
    pub fn shutdown(&self) {
        self.sender().shutdown();
    }
}
