use std::io::{BufWriter, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::error::{CommunicationError, ShutdownError};

use super::protocol::{Message, write_message};

/// Default console endpoint for statistics reports.
pub const DEFAULT_CONSOLE_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_CONSOLE_PORT: u16 = 6372;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound half of a channel.
pub trait Sender: Send {
    /// Transmits `message` immediately.
    ///
    /// # Errors
    ///
    /// Returns an error on any transport failure, or
    /// [`CommunicationError::Shutdown`] after [`Sender::shutdown`].
    fn send(&mut self, message: Message) -> Result<(), CommunicationError>;

    /// Transmits `messages` as one unit. The default sends them one by one.
    ///
    /// # Errors
    ///
    /// As [`Sender::send`].
    fn send_batch(&mut self, messages: Vec<Message>) -> Result<(), CommunicationError> {
        for message in messages {
            self.send(message)?;
        }
        Ok(())
    }

    /// Tells the peer we are closing and releases the transport. Safe to
    /// call more than once.
    fn shutdown(&mut self);
}

/// A [`Sender`] that can also accumulate messages and deliver them later in
/// one batch.
pub trait QueuedSender: Sender {
    /// Adds `message` to the pending batch.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError::Shutdown`] after shutdown.
    fn queue(&mut self, message: Message) -> Result<(), CommunicationError>;

    /// Delivers every pending message.
    ///
    /// # Errors
    ///
    /// Returns an error on any transport failure; the batch is discarded.
    fn flush(&mut self) -> Result<(), CommunicationError>;
}

/// Where a [`ClientSender`] connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connector {
    pub address: String,
    pub port: u16,
}

impl Connector {
    #[must_use]
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// # Errors
    ///
    /// Returns [`CommunicationError::Connection`] if the endpoint cannot be
    /// resolved or reached.
    pub fn connect(&self) -> Result<TcpStream, CommunicationError> {
        let endpoint = self.endpoint();
        let connection_error = |err| CommunicationError::Connection {
            addr: endpoint.clone(),
            source: err,
        };
        let addrs = std::net::ToSocketAddrs::to_socket_addrs(endpoint.as_str())
            .map_err(connection_error)?;
        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    drop(stream.set_nodelay(true));
                    return Ok(stream);
                }
                Err(err) => last_error = Some(err),
            }
        }
        Err(connection_error(last_error.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
        })))
    }
}

/// Sends frames over a TCP connection.
#[derive(Debug)]
pub struct ClientSender {
    endpoint: String,
    writer: Option<BufWriter<TcpStream>>,
}

impl ClientSender {
    /// # Errors
    ///
    /// Returns [`CommunicationError::Connection`] if the connection fails.
    pub fn connect(connector: &Connector) -> Result<Self, CommunicationError> {
        let stream = connector.connect()?;
        debug!("Connected to {}", connector.endpoint());
        Ok(Self::from_stream(stream, connector.endpoint()))
    }

    #[must_use]
    pub fn from_stream(stream: TcpStream, endpoint: String) -> Self {
        Self {
            endpoint,
            writer: Some(BufWriter::new(stream)),
        }
    }

    fn writer(&mut self) -> Result<&mut BufWriter<TcpStream>, CommunicationError> {
        self.writer
            .as_mut()
            .ok_or(CommunicationError::Shutdown(ShutdownError))
    }
}

fn flush_writer(writer: &mut BufWriter<TcpStream>) -> Result<(), CommunicationError> {
    writer.flush().map_err(|err| CommunicationError::Io {
        context: "flush wire messages",
        source: err,
    })
}

impl Sender for ClientSender {
    fn send(&mut self, message: Message) -> Result<(), CommunicationError> {
        let writer = self.writer()?;
        write_message(writer, &message)?;
        flush_writer(writer)
    }

    fn send_batch(&mut self, messages: Vec<Message>) -> Result<(), CommunicationError> {
        let writer = self.writer()?;
        for message in &messages {
            write_message(writer, message)?;
        }
        flush_writer(writer)
    }

    fn shutdown(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        let closed = write_message(&mut writer, &Message::CloseConnection)
            .and_then(|()| flush_writer(&mut writer));
        if let Err(err) = closed {
            debug!("Close message to {} not delivered: {}", self.endpoint, err);
        }
        drop(writer.get_ref().shutdown(Shutdown::Both));
    }
}

impl Drop for ClientSender {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Adds batching to any [`Sender`].
#[derive(Debug)]
pub struct QueuedSenderDecorator<S> {
    inner: S,
    pending: Vec<Message>,
    shut_down: bool,
}

impl<S> QueuedSenderDecorator<S>
where
    S: Sender,
{
    #[must_use]
    pub const fn new(inner: S) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            shut_down: false,
        }
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl<S> Sender for QueuedSenderDecorator<S>
where
    S: Sender,
{
    /// Queues `message` and flushes the whole batch.
    fn send(&mut self, message: Message) -> Result<(), CommunicationError> {
        self.queue(message)?;
        self.flush()
    }

    fn shutdown(&mut self) {
        self.shut_down = true;
        self.pending.clear();
        self.inner.shutdown();
    }
}

impl<S> QueuedSender for QueuedSenderDecorator<S>
where
    S: Sender,
{
    fn queue(&mut self, message: Message) -> Result<(), CommunicationError> {
        if self.shut_down {
            return Err(CommunicationError::Shutdown(ShutdownError));
        }
        self.pending.push(message);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CommunicationError> {
        if self.shut_down {
            return Err(CommunicationError::Shutdown(ShutdownError));
        }
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.pending);
        self.inner.send_batch(batch)
    }
}

/// Accepts and discards everything. Used when there is no console to
/// report to.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSender;

impl Sender for NullSender {
    fn send(&mut self, _message: Message) -> Result<(), CommunicationError> {
        Ok(())
    }

    fn shutdown(&mut self) {}
}

impl QueuedSender for NullSender {
    fn queue(&mut self, _message: Message) -> Result<(), CommunicationError> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CommunicationError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;
    use std::net::TcpListener;

    use super::*;
    use crate::communication::protocol::read_message;
    use crate::error::{AppError, AppResult};

    #[derive(Debug, Default)]
    struct Recording {
        batches: Vec<Vec<Message>>,
        shutdowns: usize,
    }

    impl Sender for Recording {
        fn send(&mut self, message: Message) -> Result<(), CommunicationError> {
            self.batches.push(vec![message]);
            Ok(())
        }

        fn send_batch(&mut self, messages: Vec<Message>) -> Result<(), CommunicationError> {
            self.batches.push(messages);
            Ok(())
        }

        fn shutdown(&mut self) {
            self.shutdowns = self.shutdowns.saturating_add(1);
        }
    }

    #[test]
    fn queued_messages_are_flushed_as_one_batch() -> AppResult<()> {
        let mut sender = QueuedSenderDecorator::new(Recording::default());
        sender.queue(Message::Start)?;
        sender.queue(Message::Reset)?;
        if sender.pending() != 2 || !sender.inner.batches.is_empty() {
            return Err(AppError::validation("Queue sent eagerly"));
        }
        sender.send(Message::Stop)?;
        sender.flush()?;

        if sender.inner.batches != vec![vec![Message::Start, Message::Reset, Message::Stop]] {
            return Err(AppError::validation(format!(
                "Unexpected batches {:?}",
                sender.inner.batches
            )));
        }
        Ok(())
    }

    #[test]
    fn decorator_refuses_work_after_shutdown() -> AppResult<()> {
        let mut sender = QueuedSenderDecorator::new(Recording::default());
        sender.queue(Message::Start)?;
        sender.shutdown();
        sender.shutdown();
        match sender.queue(Message::Stop) {
            Err(err) if err.is_shutdown() => {}
            other => return Err(AppError::validation(format!("Unexpected {:?}", other))),
        }
        if sender.inner.shutdowns != 2 || !sender.inner.batches.is_empty() {
            return Err(AppError::validation("Pending batch leaked after shutdown"));
        }
        Ok(())
    }

    #[test]
    fn null_sender_accepts_everything() -> AppResult<()> {
        let mut sender = NullSender;
        sender.queue(Message::Start)?;
        sender.flush()?;
        sender.send(Message::Stop)?;
        sender.shutdown();
        sender.send(Message::Stop)?;
        Ok(())
    }

    #[test]
    fn client_sender_writes_frames_and_close_sentinel() -> AppResult<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let connector = Connector::new("127.0.0.1", port);

        let mut sender = QueuedSenderDecorator::new(ClientSender::connect(&connector)?);
        let (stream, _) = listener.accept()?;
        sender.queue(Message::Start)?;
        sender.send(Message::Stop)?;
        sender.shutdown();
        sender.shutdown();

        let mut reader = BufReader::new(stream);
        let mut buffer = Vec::new();
        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(read_message(&mut reader, &mut buffer)?);
        }
        if received != vec![Message::Start, Message::Stop, Message::CloseConnection] {
            return Err(AppError::validation(format!("Unexpected {:?}", received)));
        }
        Ok(())
    }

    #[test]
    fn connect_to_closed_port_is_a_connection_error() -> AppResult<()> {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0")?;
            listener.local_addr()?.port()
        };
        match ClientSender::connect(&Connector::new("127.0.0.1", port)) {
            Err(CommunicationError::Connection { .. }) => Ok(()),
            other => Err(AppError::validation(format!("Unexpected {:?}", other.err()))),
        }
    }
}
