//! Abstract byte-frame duplex channel.
//!
//! The pipeline never touches a concrete WebSocket library. It sees a
//! [`FrameSink`] that writes one whole text message at a time, and a
//! [`FrameSource`] that yields a logical message as one or more frames, the
//! last one flagged `end_of_message`. A peer-initiated close surfaces as
//! [`InboundFrame::Close`].
//!
//! Ownership follows the pipeline: the receive pump takes the source by
//! value (single reader), the send side holds the sink behind a mutex
//! (single writer).

use std::future::Future;

use crate::error::TransportError;

/// One frame read from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundFrame {
    /// `len` payload bytes were written into the caller's buffer;
    /// `end_of_message` marks the final frame of the logical message.
    Data { len: usize, end_of_message: bool },
    /// The peer's close frame.
    Close,
}

/// The transport's send half.
pub trait FrameSink: Send + 'static {
    /// Write `payload` as one complete UTF-8 text message.
    fn send(&mut self, payload: &[u8])
        -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Perform the close handshake.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// The transport's receive half.
pub trait FrameSource: Send + 'static {
    /// Read the next frame into `buf`. At most `buf.len()` bytes are
    /// written per call; a message larger than `buf` arrives as multiple
    /// frames in order.
    fn recv_frame(
        &mut self,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<InboundFrame, TransportError>> + Send;
}

/// A connected duplex transport, split into its two halves when the
/// pipeline opens.
pub trait Transport: Send + 'static {
    type Sink: FrameSink;
    type Source: FrameSource;

    fn split(self) -> (Self::Sink, Self::Source);
}
