use thiserror::Error;

/// Raised by a queue or channel that has already been shut down.
///
/// This is the graceful-termination signal for receiver threads and
/// consumers; it is not a failure and is never logged as one.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Queue has been shut down.")]
pub struct ShutdownError;

#[derive(Debug, Error)]
pub enum CommunicationError {
    #[error("Bind error on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Connection error to {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error during {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Connection closed.")]
    ConnectionClosed,
    #[error("Wire message exceeded max size ({max_bytes} bytes).")]
    FrameTooLarge { max_bytes: usize },
    #[error("Wire message was not valid UTF-8: {source}")]
    InvalidUtf8 {
        #[source]
        source: std::str::Utf8Error,
    },
    #[error("Serialization error during {context}: {source}")]
    Encode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Deserialization error during {context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to spawn thread '{name}': {source}")]
    SpawnThread {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Communication shut down: {0}")]
    Shutdown(#[from] ShutdownError),
    #[cfg(test)]
    #[error("Test expectation failed: {message}")]
    TestExpectation { message: &'static str },
    #[cfg(test)]
    #[error("Test expectation failed: {message}: {value}")]
    TestExpectationValue {
        message: &'static str,
        value: String,
    },
}

impl CommunicationError {
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, CommunicationError::Shutdown(_))
    }

    /// True for failures that belong to a single frame or connection rather
    /// than to the transport as a whole.
    #[must_use]
    pub const fn is_decode(&self) -> bool {
        matches!(
            self,
            CommunicationError::Decode { .. }
                | CommunicationError::InvalidUtf8 { .. }
                | CommunicationError::FrameTooLarge { .. }
        )
    }
}
