//! Frame-level view of a connection.
//!
//! A session reads `Result<Frame, TransportError>` from a [`Stream`] and writes
//! [`Frame`]s into a [`Sink`]. The axum WebSocket is adapted to that shape in
//! [`inbound`] / [`outbound`]; [`in_memory`] gives the same shape over plain
//! channels for driving a session without a socket.

use axum::extract::ws::{self, Message, WebSocket};
use futures::channel::mpsc as fmpsc;
use futures::stream::{SplitSink, SplitStream};
use futures::{future, FutureExt, Sink, SinkExt, Stream, StreamExt};
use parley_core::TransportError;

/// One WebSocket frame, independent of the socket implementation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<CloseFrame>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl Frame {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Self::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        }))
    }
}

impl From<Message> for Frame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Self::Text(text.as_str().to_owned()),
            Message::Binary(data) => Self::Binary(data.to_vec()),
            Message::Ping(data) => Self::Ping(data.to_vec()),
            Message::Pong(data) => Self::Pong(data.to_vec()),
            Message::Close(close) => Self::Close(close.map(|c| CloseFrame {
                code: c.code,
                reason: c.reason.as_str().to_owned(),
            })),
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Self::Text(text.into()),
            Frame::Binary(data) => Self::Binary(data.into()),
            Frame::Ping(data) => Self::Ping(data.into()),
            Frame::Pong(data) => Self::Pong(data.into()),
            Frame::Close(close) => Self::Close(close.map(|c| ws::CloseFrame {
                code: c.code,
                reason: c.reason.into(),
            })),
        }
    }
}

/// Map an axum socket error onto the transport taxonomy.
///
/// axum only exposes the underlying tungstenite error through its message, so
/// disconnects are recognised by text:
/// - `Protocol(ResetWithoutClosingHandshake)` becomes an abnormal close (1006)
/// - `ConnectionClosed` and `AlreadyClosed` become a close without a code
pub fn classify_axum_error(err: axum::Error) -> TransportError {
    let text = err.to_string();
    if text.contains("without closing handshake") {
        TransportError::closed(Some(1006), text)
    } else if text.contains("closed normally") || text.contains("closed connection") {
        TransportError::closed(None, text)
    } else {
        TransportError::Io(text)
    }
}

fn read_frame(item: Result<Message, axum::Error>) -> Result<Frame, TransportError> {
    item.map(Frame::from).map_err(classify_axum_error)
}

/// Inbound half of an upgraded socket as a frame stream.
pub fn inbound(
    stream: SplitStream<WebSocket>,
) -> impl Stream<Item = Result<Frame, TransportError>> + Unpin + Send + 'static {
    stream.map(read_frame)
}

/// Outbound half of an upgraded socket as a frame sink.
pub fn outbound(
    sink: SplitSink<WebSocket, Message>,
) -> impl Sink<Frame, Error = TransportError> + Unpin + Send + 'static {
    sink.sink_map_err(|e| TransportError::Io(e.to_string()))
        .with(|frame: Frame| future::ready(Ok::<_, TransportError>(Message::from(frame))))
}

// ── In-memory transport ────────────────────────────────────────────────────

pub type MemoryInbound = fmpsc::UnboundedReceiver<Result<Frame, TransportError>>;
pub type MemoryOutbound =
    futures::sink::SinkMapErr<fmpsc::UnboundedSender<Frame>, fn(fmpsc::SendError) -> TransportError>;

/// The far side of an in-memory connection: what a client would see.
pub struct RemotePeer {
    to_session: fmpsc::UnboundedSender<Result<Frame, TransportError>>,
    from_session: fmpsc::UnboundedReceiver<Frame>,
}

impl RemotePeer {
    /// Deliver a frame to the session. Returns `false` once the session stopped reading.
    pub fn send(&self, frame: Frame) -> bool {
        self.to_session.unbounded_send(Ok(frame)).is_ok()
    }

    pub fn send_text(&self, text: &str) -> bool {
        self.send(Frame::text(text))
    }

    /// Make the session's next read fail with `err`.
    pub fn fail(&self, err: TransportError) -> bool {
        self.to_session.unbounded_send(Err(err)).is_ok()
    }

    /// End the inbound stream, as if the peer's socket went away.
    pub fn hang_up(&self) {
        self.to_session.close_channel();
    }

    /// Next frame written by the session, or `None` once its sink is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_session.next().await
    }

    /// A frame the session already wrote, without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.from_session.next().now_or_never().flatten()
    }
}

fn closed_sink(_: fmpsc::SendError) -> TransportError {
    TransportError::Io("peer receiver dropped".into())
}

/// A connected pair of channels shaped like an upgraded socket.
pub fn in_memory() -> (RemotePeer, MemoryInbound, MemoryOutbound) {
    let (to_session, inbound) = fmpsc::unbounded();
    let (outbound, from_session) = fmpsc::unbounded();
    let outbound = outbound.sink_map_err(closed_sink as fn(fmpsc::SendError) -> TransportError);
    (
        RemotePeer {
            to_session,
            from_session,
        },
        inbound,
        outbound,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_roundtrips_through_axum_message() {
        let msg: Message = Frame::text("hello").into();
        assert_eq!(Frame::from(msg), Frame::Text("hello".into()));
    }

    #[test]
    fn close_frame_keeps_code_and_reason() {
        let msg: Message = Frame::close(1001, "going away").into();
        match Frame::from(msg) {
            Frame::Close(Some(c)) => {
                assert_eq!(c.code, 1001);
                assert_eq!(c.reason, "going away");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        assert_eq!(Frame::from(Message::Close(None)), Frame::Close(None));
    }

    #[test]
    fn control_frames_convert() {
        assert_eq!(Frame::from(Message::Ping(vec![1u8].into())), Frame::Ping(vec![1]));
        assert_eq!(Frame::from(Message::Pong(Vec::<u8>::new().into())), Frame::Pong(vec![]));
        assert_eq!(
            Frame::from(Message::Binary(b"raw".to_vec().into())),
            Frame::Binary(b"raw".to_vec())
        );
    }

    mod axum_errors {
        use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};

        use super::*;

        fn classify(err: WsError) -> TransportError {
            classify_axum_error(axum::Error::new(err))
        }

        #[test]
        fn reset_without_handshake_is_abnormal_close() {
            let err = classify(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake));
            assert!(matches!(err, TransportError::Closed { code: Some(1006), .. }));
            assert!(err.is_expected_close());
        }

        #[test]
        fn closed_connection_is_close_without_code() {
            for ws_err in [WsError::ConnectionClosed, WsError::AlreadyClosed] {
                let err = classify(ws_err);
                assert!(matches!(err, TransportError::Closed { code: None, .. }), "{err:?}");
                assert!(err.is_expected_close());
            }
        }

        #[test]
        fn other_failures_are_io() {
            let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
            let err = classify(WsError::Io(io));
            assert!(matches!(err, TransportError::Io(_)));
            assert!(!err.is_expected_close());

            let err = classify(WsError::Protocol(ProtocolError::InvalidOpcode(0xb)));
            assert!(matches!(err, TransportError::Io(_)));
        }
    }

    #[tokio::test]
    async fn in_memory_carries_frames_both_ways() {
        let (mut peer, mut inbound, mut outbound) = in_memory();

        assert!(peer.send_text("from peer"));
        let got = inbound.next().await.unwrap().unwrap();
        assert_eq!(got, Frame::text("from peer"));

        outbound.send(Frame::Ping(vec![])).await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::Ping(vec![])));
    }

    #[tokio::test]
    async fn in_memory_failures_and_hang_up() {
        let (peer, mut inbound, _outbound) = in_memory();
        assert!(peer.fail(TransportError::Io("reset".into())));
        let got = inbound.next().await.unwrap();
        assert_eq!(got, Err(TransportError::Io("reset".into())));

        peer.hang_up();
        assert!(inbound.next().await.is_none());
    }

    #[tokio::test]
    async fn sink_errors_once_peer_is_gone() {
        let (peer, _inbound, mut outbound) = in_memory();
        drop(peer);
        let err = outbound.send(Frame::text("lost")).await.unwrap_err();
        assert!(!err.is_expected_close());
    }
}
