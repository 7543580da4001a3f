use std::io::{BufRead, Read, Write};

use crate::error::CommunicationError;

use super::types::Message;

/// Upper bound on a single encoded frame.
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Reads exactly one frame from `reader`.
///
/// `buffer` is scratch space owned by the caller so a long-lived reader can
/// reuse one allocation across frames.
///
/// # Errors
///
/// Returns [`CommunicationError::ConnectionClosed`] at end of stream, an I/O
/// error if the read fails, or a decode error if the frame is malformed.
pub fn read_message<R>(reader: &mut R, buffer: &mut Vec<u8>) -> Result<Message, CommunicationError>
where
    R: BufRead,
{
    buffer.clear();
    let limit = u64::try_from(MAX_MESSAGE_BYTES.saturating_add(1)).unwrap_or(u64::MAX);
    let bytes = reader
        .by_ref()
        .take(limit)
        .read_until(b'\n', buffer)
        .map_err(|err| CommunicationError::Io {
            context: "read wire message",
            source: err,
        })?;
    if bytes == 0 {
        return Err(CommunicationError::ConnectionClosed);
    }
    if buffer.len() > MAX_MESSAGE_BYTES {
        return Err(CommunicationError::FrameTooLarge {
            max_bytes: MAX_MESSAGE_BYTES,
        });
    }
    if buffer.ends_with(b"\n") {
        buffer.pop();
        if buffer.ends_with(b"\r") {
            buffer.pop();
        }
    } else {
        // Stream ended part way through a frame.
        return Err(CommunicationError::ConnectionClosed);
    }
    let line = std::str::from_utf8(buffer)
        .map_err(|err| CommunicationError::InvalidUtf8 { source: err })?;
    serde_json::from_str::<Message>(line).map_err(|err| CommunicationError::Decode {
        context: "wire message",
        source: err,
    })
}

/// Encodes `message` as one frame into `writer` without flushing.
///
/// # Errors
///
/// Returns an error if encoding or the write fails.
pub fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), CommunicationError>
where
    W: Write,
{
    let mut payload = serde_json::to_vec(message).map_err(|err| CommunicationError::Encode {
        context: "wire message",
        source: err,
    })?;
    payload.push(b'\n');
    writer
        .write_all(&payload)
        .map_err(|err| CommunicationError::Io {
            context: "send wire message",
            source: err,
        })
}
