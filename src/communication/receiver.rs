use std::io::{BufReader, Read};
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::CommunicationError;
use crate::shutdown::ShutdownToken;

use super::acceptor::{Acceptor, SocketResource};
use super::protocol::{Message, read_message};
use super::queue::MessageQueue;
use super::resource_pool::ResourcePool;
use super::thread_pool::{PoolTask, ThreadPool};

/// Default number of threads polling accepted connections.
pub const DEFAULT_RECEIVER_THREADS: usize = 5;
/// Default pause after two consecutive polls that found nothing ready.
pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(500);

/// A source of inbound messages.
pub trait Receiver: Send + Sync {
    /// Blocks until a message arrives.
    ///
    /// Returns `Ok(None)` once the receiver has been shut down or its input
    /// is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the error that broke a connection, in the order it occurred
    /// relative to other messages.
    fn wait_for_message(&self) -> Result<Option<Message>, CommunicationError>;

    /// Stops receiving. Idempotent.
    fn shutdown(&self);
}

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub listeners: usize,
    pub threads: usize,
    pub idle_sleep: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            listeners: 1,
            threads: DEFAULT_RECEIVER_THREADS,
            idle_sleep: DEFAULT_IDLE_SLEEP,
        }
    }
}

/// Receives messages from many client connections.
///
/// Multiple threads may call [`Receiver::wait_for_message`]; each message
/// is delivered to exactly one of them.
#[derive(Debug)]
pub struct ServerReceiver {
    acceptor: Acceptor,
    queue: Arc<MessageQueue>,
    thread_pool: ThreadPool,
}

impl ServerReceiver {
    /// Listens on `address:port` with the default configuration. An empty
    /// address listens on all interfaces.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError::Bind`] if the socket cannot be bound.
    pub fn bind_to(address: &str, port: u16) -> Result<Self, CommunicationError> {
        Self::bind_with(address, port, &ReceiverConfig::default())
    }

    /// # Errors
    ///
    /// Returns [`CommunicationError::Bind`] if the socket cannot be bound,
    /// or an error if the polling threads cannot be started.
    pub fn bind_with(
        address: &str,
        port: u16,
        config: &ReceiverConfig,
    ) -> Result<Self, CommunicationError> {
        let acceptor = Acceptor::bind(address, port, config.listeners)?;
        Self::new(acceptor, config)
    }

    /// # Errors
    ///
    /// Returns an error if the polling threads cannot be started.
    pub fn new(acceptor: Acceptor, config: &ReceiverConfig) -> Result<Self, CommunicationError> {
        let queue = Arc::new(MessageQueue::new());
        let thread_pool = ThreadPool::new("server receiver", config.threads.max(1));
        let socket_set = Arc::clone(acceptor.socket_set());
        let idle_sleep = config.idle_sleep;
        let task_queue = Arc::clone(&queue);
        let receiver = Self {
            acceptor,
            queue,
            thread_pool,
        };
        receiver
            .thread_pool
            .start(|| PollTask::new(Arc::clone(&socket_set), Arc::clone(&task_queue), idle_sleep))?;
        Ok(receiver)
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    #[must_use]
    pub const fn acceptor(&self) -> &Acceptor {
        &self.acceptor
    }
}

impl Receiver for ServerReceiver {
    fn wait_for_message(&self) -> Result<Option<Message>, CommunicationError> {
        match self.queue.dequeue(true) {
            Ok(Some(Ok(message))) => Ok(Some(message)),
            Ok(Some(Err(err))) => Err(err),
            Ok(None) | Err(_) => Ok(None),
        }
    }

    fn shutdown(&self) {
        self.queue.shutdown();
        self.acceptor.shutdown();
        self.thread_pool.stop();
    }
}

impl Drop for ServerReceiver {
    fn drop(&mut self) {
        Receiver::shutdown(self);
    }
}

/// One receiver thread's poll loop state.
struct PollTask {
    socket_set: Arc<ResourcePool<SocketResource>>,
    queue: Arc<MessageQueue>,
    idle_sleep: Duration,
    idle: bool,
    buffer: Vec<u8>,
}

impl PollTask {
    fn new(
        socket_set: Arc<ResourcePool<SocketResource>>,
        queue: Arc<MessageQueue>,
        idle_sleep: Duration,
    ) -> Self {
        Self {
            socket_set,
            queue,
            idle_sleep,
            idle: false,
            buffer: Vec::with_capacity(1024),
        }
    }
}

impl PoolTask for PollTask {
    fn iterate(&mut self, shutdown: &ShutdownToken) -> ControlFlow<()> {
        let mut reservation = self.socket_set.reserve_next();

        let Some(socket) = reservation.resource_mut() else {
            // Only sleep once a second empty pass confirms nothing is pending.
            if self.idle && shutdown.sleep(self.idle_sleep) {
                return ControlFlow::Break(());
            }
            self.idle = true;
            return ControlFlow::Continue(());
        };

        if !socket.has_input() {
            return ControlFlow::Continue(());
        }
        self.idle = false;

        let peer = socket.peer();
        let entry = match socket.read_message(&mut self.buffer) {
            Ok(Message::CloseConnection) => {
                debug!("Peer {:?} closed its connection", peer);
                reservation.close();
                return ControlFlow::Continue(());
            }
            Ok(message) => Ok(message),
            Err(err) => {
                debug!("Connection from {:?} failed: {}", peer, err);
                reservation.close();
                Err(err)
            }
        };
        drop(reservation);

        if self.queue.enqueue(entry).is_err() {
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

/// Receives messages from a single byte stream, such as the control pipe
/// from a parent process.
#[derive(Debug)]
pub struct StreamReceiver<R> {
    state: Mutex<StreamState<R>>,
    shutdown: ShutdownToken,
}

#[derive(Debug)]
struct StreamState<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
    exhausted: bool,
}

impl<R> StreamReceiver<R>
where
    R: Read + Send,
{
    #[must_use]
    pub fn new(input: R) -> Self {
        Self {
            state: Mutex::new(StreamState {
                reader: BufReader::new(input),
                buffer: Vec::with_capacity(1024),
                exhausted: false,
            }),
            shutdown: ShutdownToken::new(),
        }
    }
}

impl<R> Receiver for StreamReceiver<R>
where
    R: Read + Send,
{
    fn wait_for_message(&self) -> Result<Option<Message>, CommunicationError> {
        if self.shutdown.is_cancelled() {
            return Ok(None);
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.exhausted || self.shutdown.is_cancelled() {
            return Ok(None);
        }
        let StreamState {
            reader, buffer, ..
        } = &mut *state;
        match read_message(reader, buffer) {
            Ok(Message::CloseConnection) | Err(CommunicationError::ConnectionClosed) => {
                state.exhausted = true;
                Ok(None)
            }
            Ok(message) => Ok(Some(message)),
            Err(err) => {
                state.exhausted = true;
                warn!("Control stream failed: {}", err);
                Err(err)
            }
        }
    }

    fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
