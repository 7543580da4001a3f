use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{CommunicationError, ShutdownError};

use super::protocol::Message;

/// What receiver threads hand to consumers: a decoded frame, or the error
/// that stopped a connection.
pub type QueueEntry = Result<Message, CommunicationError>;

/// The hand-off point between receiver threads and message consumers.
pub type MessageQueue = BlockingQueue<QueueEntry>;

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    shutdown: bool,
}

/// A FIFO queue whose consumers block until an item arrives or the queue is
/// shut down.
///
/// Shutdown is terminal: pending items are discarded, every blocked and
/// future `dequeue` fails with [`ShutdownError`], and `enqueue` is refused.
#[derive(Debug)]
pub struct BlockingQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockingQueue<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `item` and wakes one waiting consumer.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] if the queue has been shut down.
    pub fn enqueue(&self, item: T) -> Result<(), ShutdownError> {
        let mut state = self.lock();
        if state.shutdown {
            return Err(ShutdownError);
        }
        state.items.push_back(item);
        self.available.notify_one();
        Ok(())
    }

    /// Takes the oldest item.
    ///
    /// With `block` set, waits until an item is available. Without it,
    /// returns `Ok(None)` when the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] once the queue has been shut down.
    pub fn dequeue(&self, block: bool) -> Result<Option<T>, ShutdownError> {
        let mut state = self.lock();
        loop {
            if state.shutdown {
                return Err(ShutdownError);
            }
            if let Some(item) = state.items.pop_front() {
                return Ok(Some(item));
            }
            if !block {
                return Ok(None);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Closes the queue and wakes every blocked consumer. Idempotent.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.shutdown = true;
        state.items.clear();
        self.available.notify_all();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::error::{AppError, AppResult};

    #[test]
    fn single_consumer_sees_enqueue_order() -> AppResult<()> {
        let queue = BlockingQueue::new();
        for value in 0..50 {
            queue
                .enqueue(value)
                .map_err(|err| AppError::validation(format!("enqueue failed: {}", err)))?;
        }
        for expected in 0..50 {
            let value = queue
                .dequeue(true)
                .map_err(|err| AppError::validation(format!("dequeue failed: {}", err)))?;
            if value != Some(expected) {
                return Err(AppError::validation(format!(
                    "Expected {}, got {:?}",
                    expected, value
                )));
            }
        }
        Ok(())
    }

    #[test]
    fn non_blocking_dequeue_on_empty_queue_returns_none() -> AppResult<()> {
        let queue: BlockingQueue<u8> = BlockingQueue::new();
        match queue.dequeue(false) {
            Ok(None) => Ok(()),
            other => Err(AppError::validation(format!("Unexpected {:?}", other))),
        }
    }

    #[test]
    fn shutdown_wakes_every_blocked_consumer() -> AppResult<()> {
        let queue: Arc<BlockingQueue<u8>> = Arc::new(BlockingQueue::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(std::thread::spawn(move || queue.dequeue(true)));
        }

        std::thread::sleep(Duration::from_millis(50));
        queue.shutdown();

        for handle in handles {
            let result = handle
                .join()
                .map_err(|_err| AppError::validation("Consumer panicked"))?;
            if result != Err(ShutdownError) {
                return Err(AppError::validation(format!(
                    "Expected shutdown, got {:?}",
                    result
                )));
            }
        }
        Ok(())
    }

    #[test]
    fn shutdown_is_terminal_and_idempotent() -> AppResult<()> {
        let queue = BlockingQueue::new();
        queue
            .enqueue(1_u8)
            .map_err(|err| AppError::validation(format!("enqueue failed: {}", err)))?;
        queue.shutdown();
        queue.shutdown();

        for block in [true, false, true] {
            if queue.dequeue(block) != Err(ShutdownError) {
                return Err(AppError::validation("Dequeue after shutdown did not fail"));
            }
        }
        if queue.enqueue(2) != Err(ShutdownError) {
            return Err(AppError::validation("Enqueue after shutdown was accepted"));
        }
        if !queue.is_empty() || !queue.is_shutdown() {
            return Err(AppError::validation("Shut down queue still holds entries"));
        }
        Ok(())
    }

    #[test]
    fn each_item_goes_to_exactly_one_consumer() -> AppResult<()> {
        const ITEMS: usize = 1_000;
        let queue: Arc<BlockingQueue<usize>> = Arc::new(BlockingQueue::new());
        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            consumers.push(std::thread::spawn(move || {
                let mut taken = Vec::new();
                while let Ok(Some(item)) = queue.dequeue(true) {
                    taken.push(item);
                    if item == ITEMS.saturating_sub(1) {
                        queue.shutdown();
                    }
                }
                taken
            }));
        }

        for item in 0..ITEMS {
            if queue.enqueue(item).is_err() {
                break;
            }
        }

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(
                consumer
                    .join()
                    .map_err(|_err| AppError::validation("Consumer panicked"))?,
            );
        }
        let delivered = all.len();
        all.sort_unstable();
        all.dedup();
        if delivered != ITEMS || all.len() != ITEMS {
            return Err(AppError::validation(format!(
                "Expected {} unique deliveries, got {} ({} unique)",
                ITEMS,
                delivered,
                all.len()
            )));
        }
        Ok(())
    }
}
