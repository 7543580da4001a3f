use std::io::{BufReader, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::CommunicationError;
use crate::shutdown::ShutdownToken;

use super::protocol::{Message, read_message};
use super::resource_pool::{Resource, ResourcePool};

/// How often an idle accept loop checks for shutdown.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Bound on reading the rest of a frame once its first byte has arrived.
const FRAME_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// One accepted connection, pooled for the receiver threads.
#[derive(Debug)]
pub struct SocketResource {
    reader: BufReader<TcpStream>,
    peer: Option<SocketAddr>,
    closed: bool,
}

impl SocketResource {
    /// Wraps an accepted stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be switched to blocking reads.
    pub fn new(stream: TcpStream) -> Result<Self, CommunicationError> {
        stream
            .set_nonblocking(false)
            .and_then(|()| stream.set_read_timeout(Some(FRAME_READ_TIMEOUT)))
            .map_err(|err| CommunicationError::Io {
                context: "configure accepted socket",
                source: err,
            })?;
        let peer = stream.peer_addr().ok();
        Ok(Self {
            reader: BufReader::new(stream),
            peer,
            closed: false,
        })
    }

    #[must_use]
    pub const fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Whether a read would make progress right now: buffered bytes, bytes
    /// waiting on the socket, end of stream, or a pending socket error.
    #[must_use]
    pub fn has_input(&self) -> bool {
        if self.closed {
            return false;
        }
        if !self.reader.buffer().is_empty() {
            return true;
        }
        let stream = self.reader.get_ref();
        if stream.set_nonblocking(true).is_err() {
            return true;
        }
        let mut peeked = [0_u8; 1];
        let ready = match stream.peek(&mut peeked) {
            Ok(_) => true,
            Err(err) => err.kind() != ErrorKind::WouldBlock,
        };
        if stream.set_nonblocking(false).is_err() {
            return true;
        }
        ready
    }

    /// Decodes the next frame from this connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails, the peer has gone away, or the
    /// frame is malformed.
    pub fn read_message(&mut self, buffer: &mut Vec<u8>) -> Result<Message, CommunicationError> {
        read_message(&mut self.reader, buffer)
    }
}

impl Resource for SocketResource {
    fn is_ready(&self) -> bool {
        self.has_input()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        drop(self.reader.get_ref().shutdown(Shutdown::Both));
        debug!("Closed connection from {:?}", self.peer);
    }
}

/// Accepts connections on a listening socket and feeds them into a shared
/// [`ResourcePool`].
#[derive(Debug)]
pub struct Acceptor {
    local_addr: SocketAddr,
    socket_set: Arc<ResourcePool<SocketResource>>,
    shutdown: ShutdownToken,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Acceptor {
    /// Binds `address:port` and starts `listeners` accept threads on it.
    ///
    /// An empty `address` listens on all interfaces. Binding happens before
    /// this returns, so an address in use is reported to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError::Bind`] if the socket cannot be bound,
    /// or an error if an accept thread cannot be started.
    pub fn bind(address: &str, port: u16, listeners: usize) -> Result<Self, CommunicationError> {
        let host = if address.is_empty() {
            "0.0.0.0"
        } else {
            address
        };
        let addr = format!("{}:{}", host, port);
        let bind_error = |err| CommunicationError::Bind {
            addr: addr.clone(),
            source: err,
        };
        let listener = TcpListener::bind(addr.as_str()).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let acceptor = Self {
            local_addr,
            socket_set: Arc::new(ResourcePool::new()),
            shutdown: ShutdownToken::new(),
            threads: Mutex::new(Vec::with_capacity(listeners)),
        };

        for index in 0..listeners.max(1) {
            let listener = listener.try_clone().map_err(bind_error)?;
            let socket_set = Arc::clone(&acceptor.socket_set);
            let shutdown = acceptor.shutdown.clone();
            let thread_name = format!("acceptor {} thread {}", local_addr, index);
            let handle = std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || accept_loop(&listener, &socket_set, &shutdown))
                .map_err(|err| CommunicationError::SpawnThread {
                    name: thread_name,
                    source: err,
                })?;
            acceptor
                .threads
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(handle);
        }

        info!("Listening on {}", local_addr);
        Ok(acceptor)
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The pool of accepted connections.
    #[must_use]
    pub const fn socket_set(&self) -> &Arc<ResourcePool<SocketResource>> {
        &self.socket_set
    }

    /// Stops listening and closes every pooled connection. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let threads: Vec<JoinHandle<()>> = self
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in threads {
            if handle.join().is_err() {
                warn!("Accept thread for {} panicked", self.local_addr);
            }
        }
        self.socket_set.close_all();
    }
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(
    listener: &TcpListener,
    socket_set: &ResourcePool<SocketResource>,
    shutdown: &ShutdownToken,
) {
    while !shutdown.is_cancelled() {
        match listener.accept() {
            Ok((stream, peer)) => match SocketResource::new(stream) {
                Ok(resource) => {
                    debug!("Accepted connection from {}", peer);
                    if socket_set.add(resource).is_none() {
                        break;
                    }
                }
                Err(err) => warn!("Dropping connection from {}: {}", peer, err),
            },
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                if shutdown.sleep(ACCEPT_POLL_INTERVAL) {
                    break;
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => {
                warn!("Accept failed: {}", err);
                if shutdown.sleep(ACCEPT_POLL_INTERVAL) {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::{AppError, AppResult};

    #[test]
    fn bind_to_port_in_use_fails_synchronously() -> AppResult<()> {
        let first = Acceptor::bind("127.0.0.1", 0, 1)?;
        let port = first.local_addr().port();
        match Acceptor::bind("127.0.0.1", port, 1) {
            Err(CommunicationError::Bind { .. }) => Ok(()),
            Err(err) => Err(AppError::validation(format!("Unexpected error {}", err))),
            Ok(_) => Err(AppError::validation("Second bind unexpectedly succeeded")),
        }
    }

    #[test]
    fn accepted_connections_are_pooled_and_closed_on_shutdown() -> AppResult<()> {
        let acceptor = Acceptor::bind("127.0.0.1", 0, 2)?;
        let mut client = TcpStream::connect(acceptor.local_addr())?;

        let started = std::time::Instant::now();
        while acceptor.socket_set().is_empty() {
            if started.elapsed() > Duration::from_secs(5) {
                return Err(AppError::validation("Connection was never pooled"));
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        // Nothing written yet, so the connection is not ready.
        if !acceptor.socket_set().reserve_next().is_sentinel() {
            return Err(AppError::validation("Idle connection reported ready"));
        }
        client.write_all(b"{\"type\":\"start\"}\n")?;
        let reading_since = std::time::Instant::now();
        loop {
            let mut reservation = acceptor.socket_set().reserve_next();
            if let Some(socket) = reservation.resource_mut() {
                let message = socket.read_message(&mut Vec::new())?;
                if message != Message::Start {
                    return Err(AppError::validation(format!("Unexpected {:?}", message)));
                }
                break;
            }
            if reading_since.elapsed() > Duration::from_secs(5) {
                return Err(AppError::validation("Connection never became ready"));
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        acceptor.shutdown();
        acceptor.shutdown();
        if !acceptor.socket_set().is_empty() {
            return Err(AppError::validation("Pool not emptied by shutdown"));
        }
        Ok(())
    }
}
