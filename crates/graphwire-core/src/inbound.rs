//! The transport's receive side.
//!
//! A background pump owns the frame source exclusively. For every logical
//! message it rents one block-sized scratch buffer, reads the first frame,
//! and publishes the message reader to the bounded queue *before* appending
//! — the streaming handoff that lets the dispatcher begin header inspection
//! while later frames are still in flight. The scratch buffer returns to
//! its pool at the end of the message scope on every path.
//!
//! A full queue suspends the pump; that suspension is the pipeline's
//! backpressure.

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::buffer_pool::BufferPools;
use crate::error::{ClientError, TransportError};
use crate::message::{self, MessageReader};
use crate::transport::{FrameSource, InboundFrame};

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<Result<(), ClientError>>,
}

/// Receive half of the pipeline.
pub struct Inbound {
    state: AsyncMutex<Option<Running>>,
}

impl Default for Inbound {
    fn default() -> Self {
        Self::new()
    }
}

impl Inbound {
    pub fn new() -> Self {
        Self {
            state: AsyncMutex::new(None),
        }
    }

    /// Spawn the receive pump. Fails with [`ClientError::AlreadyOpen`] if a
    /// pump is already running. The cancellation token and task handle are
    /// created together under the lifecycle mutex.
    pub async fn open<R: FrameSource>(
        &self,
        source: R,
        queue: mpsc::Sender<MessageReader>,
        pools: BufferPools,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Err(ClientError::AlreadyOpen);
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(pump(source, queue, pools, cancel.clone()));
        *state = Some(Running { cancel, task });
        Ok(())
    }

    /// Cancel the pump and wait for it to finish. Cancellation and
    /// transport-closed outcomes are swallowed; other failures surface.
    pub async fn close(&self) -> Result<(), ClientError> {
        let running = self.state.lock().await.take();
        let Some(running) = running else {
            return Ok(());
        };
        running.cancel.cancel();
        match running.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(
                ClientError::Canceled
                | ClientError::ConnectionClosed
                | ClientError::Transport(TransportError::Closed),
            )) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(join) => {
                tracing::warn!(error = %join, "receive pump task failed to join");
                Ok(())
            }
        }
    }

    pub async fn is_open(&self) -> bool {
        self.state.lock().await.is_some()
    }
}

async fn pump<R: FrameSource>(
    mut source: R,
    queue: mpsc::Sender<MessageReader>,
    pools: BufferPools,
    cancel: CancellationToken,
) -> Result<(), ClientError> {
    loop {
        let mut block = pools.block.get();
        block.resize(pools.block.buffer_size(), 0);

        let frame = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            f = source.recv_frame(&mut block) => f.map_err(ClientError::Transport)?,
        };

        let (mut writer, reader) = message::channel(pools.message.get());

        // Streaming handoff: publish before the first append. The reader's
        // first-frame signal keeps the dispatcher from peeking too early.
        // A full queue suspends here; that suspension is the backpressure.
        let published = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            res = queue.send(reader) => res,
        };
        if published.is_err() {
            tracing::debug!("inbound queue closed; stopping receive pump");
            return Ok(());
        }

        match frame {
            InboundFrame::Close => {
                tracing::debug!("peer close frame; stopping receive pump");
                writer.mark_remote_close();
                return Ok(());
            }
            InboundFrame::Data {
                len,
                end_of_message,
            } => {
                writer.append(&block[..len], end_of_message)?;
                let mut done = end_of_message;
                while !done {
                    let frame = tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        f = source.recv_frame(&mut block) => f.map_err(ClientError::Transport)?,
                    };
                    match frame {
                        InboundFrame::Close => {
                            writer.mark_remote_close();
                            return Ok(());
                        }
                        InboundFrame::Data {
                            len,
                            end_of_message,
                        } => {
                            writer.append(&block[..len], end_of_message)?;
                            done = end_of_message;
                        }
                    }
                }
            }
        }
        // `block` drops here and returns to the pool, message by message.
    }
}
