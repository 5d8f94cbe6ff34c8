//! graphwire-transport-websocket: tokio-tungstenite frame duplex.
//!
//! Adapts a `tokio_tungstenite::WebSocketStream` to the pipeline's
//! [`FrameSink`]/[`FrameSource`] traits. The sink writes one text message
//! per send and performs the close handshake; the source serves each
//! inbound message as a sequence of caller-buffer-sized frames with an
//! end-of-message flag, which is how the receive pump's block-sized reads
//! see fragmented traffic regardless of how the peer framed it.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use graphwire_core::{FrameSink, FrameSource, InboundFrame, Transport, TransportError};

/// Reason string carried by the close handshake.
pub const CLOSE_REASON: &str = "Orderly connection close";

/// A connected WebSocket, ready to be split into the pipeline's halves.
pub struct WsTransport<S> {
    ws: WebSocketStream<S>,
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(ws: WebSocketStream<S>) -> Self {
        Self { ws }
    }
}

impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Sink = WsSink<S>;
    type Source = WsSource<S>;

    fn split(self) -> (Self::Sink, Self::Source) {
        let (sink, stream) = self.ws.split();
        (
            WsSink { sink },
            WsSource {
                stream,
                current: None,
            },
        )
    }
}

/// Connect to a WebSocket endpoint.
///
/// URL handling is tokio-tungstenite's; `ws://` and `wss://` both work.
pub async fn connect(url: &str) -> Result<WsTransport<MaybeTlsStream<TcpStream>>, TransportError> {
    let (ws, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(map_ws_error)?;
    tracing::debug!(url, "websocket connected");
    Ok(WsTransport::new(ws))
}

/// Build an in-process client/server pair over `tokio::io::duplex`.
///
/// Returns the client transport plus the raw server-side stream, which
/// tests drive directly.
pub async fn pair() -> (
    WsTransport<tokio::io::DuplexStream>,
    WebSocketStream<tokio::io::DuplexStream>,
) {
    let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);

    let (client_ws, server_ws) = tokio::join!(
        async {
            tokio_tungstenite::client_async("ws://localhost/", client_stream)
                .await
                .expect("client handshake failed")
                .0
        },
        async {
            tokio_tungstenite::accept_async(server_stream)
                .await
                .expect("server handshake failed")
        }
    );

    (WsTransport::new(client_ws), server_ws)
}

/// Send half: one text message per call, close handshake on `close`.
pub struct WsSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> FrameSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let text = std::str::from_utf8(payload).map_err(|e| {
            TransportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        self.sink
            .send(Message::Text(text.to_owned()))
            .await
            .map_err(map_ws_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: CLOSE_REASON.into(),
        };
        self.sink
            .send(Message::Close(Some(frame)))
            .await
            .map_err(map_ws_error)
    }
}

/// Receive half: chunks each inbound message into caller-sized frames.
pub struct WsSource<S> {
    stream: SplitStream<WebSocketStream<S>>,
    /// Message being served, with the serve offset.
    current: Option<(Vec<u8>, usize)>,
}

impl<S> FrameSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv_frame(&mut self, buf: &mut [u8]) -> Result<InboundFrame, TransportError> {
        loop {
            if let Some((bytes, offset)) = self.current.as_mut() {
                let n = buf.len().min(bytes.len() - *offset);
                buf[..n].copy_from_slice(&bytes[*offset..*offset + n]);
                *offset += n;
                let end_of_message = *offset >= bytes.len();
                if end_of_message {
                    self.current = None;
                }
                return Ok(InboundFrame::Data {
                    len: n,
                    end_of_message,
                });
            }

            match self.stream.next().await {
                None => return Err(TransportError::Closed),
                Some(Err(e)) => return Err(map_ws_error(e)),
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => self.current = Some((text.into_bytes(), 0)),
                    Message::Binary(bytes) => self.current = Some((bytes, 0)),
                    Message::Close(_) => return Ok(InboundFrame::Close),
                    // Keepalive and raw-frame traffic is not part of the
                    // message stream.
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                },
            }
        }
    }
}

fn map_ws_error(e: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error;
    match e {
        Error::ConnectionClosed | Error::AlreadyClosed => TransportError::Closed,
        Error::Io(io) => TransportError::Io(io),
        other => TransportError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_roundtrip() {
        let (client, mut server) = pair().await;
        let (mut sink, mut source) = client.split();

        sink.send(br#"{"id":"abc","method":"ping"}"#).await.unwrap();
        let msg = server.next().await.unwrap().unwrap();
        assert_eq!(msg.into_text().unwrap(), r#"{"id":"abc","method":"ping"}"#);

        server
            .send(Message::Text(r#"{"id":"abc","result":42}"#.into()))
            .await
            .unwrap();
        let mut buf = [0u8; 1024];
        let frame = source.recv_frame(&mut buf).await.unwrap();
        let InboundFrame::Data {
            len,
            end_of_message,
        } = frame
        else {
            panic!("expected data frame");
        };
        assert!(end_of_message);
        assert_eq!(&buf[..len], br#"{"id":"abc","result":42}"#.as_slice());
    }

    #[tokio::test]
    async fn large_message_arrives_in_order_across_frames() {
        let (client, mut server) = pair().await;
        let (_sink, mut source) = client.split();

        let payload: String = (0..100).map(|n| format!("item-{n:03};")).collect();
        server
            .send(Message::Text(payload.clone()))
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let mut assembled = Vec::new();
        loop {
            match source.recv_frame(&mut buf).await.unwrap() {
                InboundFrame::Data {
                    len,
                    end_of_message,
                } => {
                    assembled.extend_from_slice(&buf[..len]);
                    if end_of_message {
                        break;
                    }
                }
                InboundFrame::Close => panic!("unexpected close"),
            }
        }
        assert_eq!(assembled, payload.as_bytes());
    }

    #[tokio::test]
    async fn message_equal_to_buffer_is_one_frame() {
        let (client, mut server) = pair().await;
        let (_sink, mut source) = client.split();

        let payload = "x".repeat(64);
        server.send(Message::Text(payload.clone())).await.unwrap();

        let mut buf = [0u8; 64];
        let frame = source.recv_frame(&mut buf).await.unwrap();
        assert_eq!(
            frame,
            InboundFrame::Data {
                len: 64,
                end_of_message: true
            }
        );
    }

    #[tokio::test]
    async fn peer_close_surfaces_as_close_frame() {
        let (client, mut server) = pair().await;
        let (_sink, mut source) = client.split();

        server.send(Message::Close(None)).await.unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(
            source.recv_frame(&mut buf).await.unwrap(),
            InboundFrame::Close
        );
    }

    #[tokio::test]
    async fn close_sends_reason_string() {
        let (client, mut server) = pair().await;
        let (mut sink, _source) = client.split();

        sink.close().await.unwrap();
        let msg = server.next().await.unwrap().unwrap();
        match msg {
            Message::Close(Some(frame)) => assert_eq!(frame.reason, CLOSE_REASON),
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ping_frames_are_skipped() {
        let (client, mut server) = pair().await;
        let (_sink, mut source) = client.split();

        server.send(Message::Ping(vec![1, 2, 3])).await.unwrap();
        server
            .send(Message::Text(r#"{"id":"x"}"#.into()))
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let frame = source.recv_frame(&mut buf).await.unwrap();
        let InboundFrame::Data { len, .. } = frame else {
            panic!("expected data frame");
        };
        assert_eq!(&buf[..len], br#"{"id":"x"}"#.as_slice());
    }
}
