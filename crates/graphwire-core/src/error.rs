//! Error types, layered transport-side and client-side.

use core::fmt;

/// Transport-level errors.
#[derive(Debug)]
pub enum TransportError {
    /// The connection is closed (locally or by the peer).
    Closed,
    /// Underlying socket I/O failed.
    Io(std::io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "transport closed"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Message-store errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageError {
    /// `append` was called after the end-of-message frame.
    AlreadyTerminal,
    /// The store was closed and its memory returned to the pool.
    Closed,
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyTerminal => write!(f, "message already terminal"),
            Self::Closed => write!(f, "message store closed"),
        }
    }
}

impl std::error::Error for MessageError {}

/// Client-level errors.
#[derive(Debug)]
pub enum ClientError {
    /// The pipeline is not open.
    NotOpen,
    /// A background component was opened twice.
    AlreadyOpen,
    /// The caller's cancellation signal fired, or the pipeline released the
    /// waiter while a call was pending.
    Canceled,
    /// The peer closed the connection while the pipeline was running.
    ConnectionClosed,
    /// Transport failure.
    Transport(TransportError),
    /// Message-store failure.
    Message(MessageError),
    /// JSON encode/decode failure.
    Json(serde_json::Error),
    /// A response-expecting call was answered with a notify-shaped message.
    ExpectedResponseGotNotify,
    /// The dispatched message had an empty header or an undecodable body.
    InvalidResponse,
    /// A waiter with the same correlation id is already registered.
    DuplicateCorrelationId,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOpen => write!(f, "client not open"),
            Self::AlreadyOpen => write!(f, "already open"),
            Self::Canceled => write!(f, "canceled"),
            Self::ConnectionClosed => write!(f, "connection closed by peer"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Message(e) => write!(f, "message error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
            Self::ExpectedResponseGotNotify => {
                write!(f, "expected a response but received a notification")
            }
            Self::InvalidResponse => write!(f, "invalid response"),
            Self::DuplicateCorrelationId => write!(f, "duplicate correlation id"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Message(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<MessageError> for ClientError {
    fn from(e: MessageError) -> Self {
        Self::Message(e)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}
