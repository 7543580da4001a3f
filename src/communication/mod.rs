//! Message transport between a worker process and its controllers.
//!
//! Inbound control messages arrive through a [`Receiver`]; outbound reports
//! leave through a [`Sender`]. The TCP receiver is built from an
//! [`Acceptor`] feeding a [`ResourcePool`] of connections that a
//! [`ThreadPool`] polls into a [`MessageQueue`].
mod acceptor;
pub mod protocol;
mod queue;
mod receiver;
mod resource_pool;
mod sender;
mod thread_pool;

pub use acceptor::{Acceptor, SocketResource};
pub use protocol::{
    InitialiseMessage, Message, ProcessState, ProcessStatusMessage, RegisterTestsMessage,
    ReportStatisticsMessage, TestDescriptor, TestStatistics, read_message, write_message,
};
pub use queue::{BlockingQueue, MessageQueue, QueueEntry};
pub use receiver::{
    DEFAULT_IDLE_SLEEP, DEFAULT_RECEIVER_THREADS, Receiver, ReceiverConfig, ServerReceiver,
    StreamReceiver,
};
pub use resource_pool::{Reservation, Resource, ResourceId, ResourcePool};
pub use sender::{
    ClientSender, Connector, DEFAULT_CONSOLE_ADDRESS, DEFAULT_CONSOLE_PORT, NullSender,
    QueuedSender, QueuedSenderDecorator, Sender,
};
pub use thread_pool::{PoolTask, ThreadPool};
