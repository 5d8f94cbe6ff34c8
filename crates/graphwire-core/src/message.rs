//! In-flight message reassembly.
//!
//! A message is reassembled from one or more transport frames into a pooled
//! buffer. The receive pump holds the [`MessageWriter`] half and appends
//! frames as they arrive; the [`MessageReader`] half is published to the
//! dispatcher as soon as the message begins, before any bytes exist.
//!
//! Readers therefore synchronize on two transitions: the first append
//! ([`MessageReader::readable`]) and end-of-message
//! ([`MessageReader::complete`]). Both use a `Notify` with a re-check loop;
//! no lock is held across an await.
//!
//! The store is append-only and grows monotonically until the end-of-message
//! frame, after which it is immutable until disposed. Reads are
//! random-access and never advance a cursor.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::buffer_pool::PooledBuf;
use crate::error::MessageError;

/// What the first frame of a message turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstFrame {
    /// Payload bytes are readable.
    Data,
    /// The peer's close frame; the pipeline is shutting down.
    RemoteClose,
}

struct State {
    /// Backing memory; `None` once closed and returned to the pool.
    buf: Option<PooledBuf>,
    appended: bool,
    terminal: bool,
    remote_close: bool,
    /// Writer dropped before end-of-message.
    aborted: bool,
}

struct Shared {
    state: Mutex<State>,
    progress: Notify,
}

impl Shared {
    fn notify(&self) {
        self.progress.notify_waiters();
    }
}

/// Create a connected writer/reader pair over a pooled buffer.
pub fn channel(buf: PooledBuf) -> (MessageWriter, MessageReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            buf: Some(buf),
            appended: false,
            terminal: false,
            remote_close: false,
            aborted: false,
        }),
        progress: Notify::new(),
    });
    (
        MessageWriter {
            shared: Arc::clone(&shared),
        },
        MessageReader { shared },
    )
}

/// The producing half: owned by the receive pump.
pub struct MessageWriter {
    shared: Arc<Shared>,
}

impl MessageWriter {
    /// Append one frame's payload. `end_of_message` finalizes the store.
    pub fn append(&mut self, bytes: &[u8], end_of_message: bool) -> Result<(), MessageError> {
        {
            let mut state = self.shared.state.lock();
            if state.buf.is_none() {
                return Err(MessageError::Closed);
            }
            if state.terminal {
                return Err(MessageError::AlreadyTerminal);
            }
            let buf = state.buf.as_mut().unwrap();
            buf.extend_from_slice(bytes);
            state.appended = true;
            if end_of_message {
                state.terminal = true;
            }
        }
        self.shared.notify();
        Ok(())
    }

    /// Record that this message was the peer's close frame.
    pub fn mark_remote_close(&mut self) {
        self.shared.state.lock().remote_close = true;
        self.shared.notify();
    }
}

impl Drop for MessageWriter {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            if !state.terminal && !state.remote_close {
                state.aborted = true;
            }
        }
        self.shared.notify();
    }
}

/// The consuming half: handed from the pump to the dispatcher to a waiter.
pub struct MessageReader {
    shared: Arc<Shared>,
}

impl MessageReader {
    /// Wait until the first frame has been appended (or the message turned
    /// out to be the peer's close frame).
    pub async fn readable(&self) -> Result<FirstFrame, MessageError> {
        loop {
            let notified = self.shared.progress.notified();
            {
                let state = self.shared.state.lock();
                if state.remote_close {
                    return Ok(FirstFrame::RemoteClose);
                }
                if state.buf.is_none() || state.aborted {
                    return Err(MessageError::Closed);
                }
                if state.appended {
                    return Ok(FirstFrame::Data);
                }
            }
            notified.await;
        }
    }

    /// Wait until the end-of-message frame has been appended.
    pub async fn complete(&self) -> Result<(), MessageError> {
        loop {
            let notified = self.shared.progress.notified();
            {
                let state = self.shared.state.lock();
                if state.terminal {
                    return Ok(());
                }
                if state.buf.is_none() || state.aborted || state.remote_close {
                    return Err(MessageError::Closed);
                }
            }
            notified.await;
        }
    }

    /// Wait until the store holds more than `len` bytes or the message is
    /// terminal (no more bytes will come).
    pub async fn grown(&self, len: usize) -> Result<(), MessageError> {
        loop {
            let notified = self.shared.progress.notified();
            {
                let state = self.shared.state.lock();
                let Some(buf) = state.buf.as_ref() else {
                    return Err(MessageError::Closed);
                };
                if state.aborted || state.remote_close {
                    return Err(MessageError::Closed);
                }
                if buf.len() > len || state.terminal {
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// True once the end-of-message frame has been appended.
    pub fn is_complete(&self) -> bool {
        self.shared.state.lock().terminal
    }

    /// Random-access read from `offset`; returns the number of bytes copied.
    /// Does not advance any cursor.
    pub fn read_at(&self, offset: usize, out: &mut [u8]) -> Result<usize, MessageError> {
        let state = self.shared.state.lock();
        let Some(buf) = state.buf.as_ref() else {
            return Err(MessageError::Closed);
        };
        if offset >= buf.len() {
            return Ok(0);
        }
        let n = out.len().min(buf.len() - offset);
        out[..n].copy_from_slice(&buf[offset..offset + n]);
        Ok(n)
    }

    /// Currently accumulated byte count.
    pub fn len(&self) -> Result<usize, MessageError> {
        let state = self.shared.state.lock();
        state
            .buf
            .as_ref()
            .map(|b| b.len())
            .ok_or(MessageError::Closed)
    }

    /// Borrow the accumulated bytes for the duration of `f`.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R, MessageError> {
        let state = self.shared.state.lock();
        let Some(buf) = state.buf.as_ref() else {
            return Err(MessageError::Closed);
        };
        Ok(f(buf))
    }

    /// Return the backing memory to the pool. Subsequent operations fail
    /// with [`MessageError::Closed`].
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            state.buf = None;
        }
        self.shared.notify();
    }
}

impl std::fmt::Debug for MessageReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("MessageReader")
            .field("len", &state.buf.as_ref().map(|b| b.len()))
            .field("terminal", &state.terminal)
            .field("remote_close", &state.remote_close)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::BufferPool;

    fn pair() -> (MessageWriter, MessageReader) {
        channel(BufferPool::new(1024).get())
    }

    #[test]
    fn append_grows_monotonically() {
        let (mut w, r) = pair();
        w.append(b"abc", false).unwrap();
        assert_eq!(r.len().unwrap(), 3);
        w.append(b"defg", true).unwrap();
        assert_eq!(r.len().unwrap(), 7);

        let mut out = [0u8; 16];
        let n = r.read_at(0, &mut out).unwrap();
        assert_eq!(&out[..n], b"abcdefg");
    }

    #[test]
    fn append_after_terminal_fails() {
        let (mut w, _r) = pair();
        w.append(b"x", true).unwrap();
        assert_eq!(w.append(b"y", false), Err(MessageError::AlreadyTerminal));
    }

    #[test]
    fn reads_do_not_advance() {
        let (mut w, r) = pair();
        w.append(b"header-body", true).unwrap();

        let mut a = [0u8; 6];
        let mut b = [0u8; 6];
        r.read_at(0, &mut a).unwrap();
        r.read_at(0, &mut b).unwrap();
        assert_eq!(a, b, "peek must not consume");

        let mut tail = [0u8; 4];
        let n = r.read_at(7, &mut tail).unwrap();
        assert_eq!(&tail[..n], b"body");
    }

    #[test]
    fn close_fails_subsequent_operations() {
        let (mut w, r) = pair();
        w.append(b"x", true).unwrap();
        r.close();
        assert_eq!(r.len(), Err(MessageError::Closed));
        assert_eq!(r.read_at(0, &mut [0u8; 1]), Err(MessageError::Closed));
        assert_eq!(w.append(b"y", false), Err(MessageError::Closed));
    }

    #[tokio::test]
    async fn readable_waits_for_first_append() {
        let (mut w, r) = pair();

        let waiter = tokio::spawn(async move {
            r.readable().await.unwrap();
            r
        });
        tokio::task::yield_now().await;

        w.append(b"first", false).unwrap();
        let r = waiter.await.unwrap();
        assert_eq!(r.len().unwrap(), 5);
    }

    #[tokio::test]
    async fn complete_waits_for_end_of_message() {
        let (mut w, r) = pair();
        w.append(b"part", false).unwrap();

        let waiter = tokio::spawn(async move {
            r.complete().await.unwrap();
            r
        });
        tokio::task::yield_now().await;

        w.append(b"-done", true).unwrap();
        let r = waiter.await.unwrap();
        assert_eq!(r.len().unwrap(), 9);
    }

    #[tokio::test]
    async fn remote_close_is_visible_to_readable() {
        let (mut w, r) = pair();
        w.mark_remote_close();
        assert_eq!(r.readable().await.unwrap(), FirstFrame::RemoteClose);
    }

    #[tokio::test]
    async fn writer_drop_mid_message_aborts_readers() {
        let (mut w, r) = pair();
        w.append(b"partial", false).unwrap();
        drop(w);
        assert_eq!(r.complete().await, Err(MessageError::Closed));
    }
}
