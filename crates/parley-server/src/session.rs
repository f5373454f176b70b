//! One connected client: a read loop, a write loop, and the liveness protocol
//! that ties them together.
//!
//! The read loop runs on the caller's task and forwards inbound text to the
//! hub. The write loop runs on its own task, draining the egress queue and
//! sending a ping every `ping_interval`. Every pong pushes the read deadline
//! out by `pong_wait`; a peer that stays silent past it is dropped.
//!
//! Whichever loop finishes first releases the session: it leaves the hub
//! (exactly once) and signals the other loop to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use parley_core::{Event, Liveness, SessionId, TransportError};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use crate::hub::{Hub, Member};
use crate::transport::Frame;

/// Why the read loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadEnd {
    /// The peer went away cleanly or with an expected close code.
    PeerClosed,
    /// The transport failed or the peer closed with an unexpected code.
    Failed,
    /// No pong arrived within `pong_wait`.
    DeadlineExpired,
    /// The session was released from elsewhere.
    Released,
}

/// Why the write loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteEnd {
    /// The hub closed the egress queue.
    QueueClosed,
    /// A keep-alive ping could not be written.
    PingFailed,
    /// A queued event could not be serialized.
    EncodeFailed,
    /// The session was released from elsewhere.
    Released,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub read_end: ReadEnd,
    pub write_end: WriteEnd,
}

struct Shared {
    id: SessionId,
    username: String,
    hub: Arc<dyn Hub>,
    released: AtomicBool,
    closed: CancellationToken,
}

impl Shared {
    /// Leave the hub and stop both loops. Safe to call from either loop, any number of times.
    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.hub.unregister(&self.id);
        }
        self.closed.cancel();
    }

    fn publish(&self, text: String) {
        info!(payload = %text, "received message");
        self.hub.broadcast(Event::new(self.username.clone(), text));
    }
}

/// A client session, ready to be registered and run.
pub struct Session {
    shared: Arc<Shared>,
    liveness: Liveness,
    egress: mpsc::UnboundedReceiver<Arc<Event>>,
}

impl Session {
    /// Create a session and the [`Member`] the hub should register for it.
    pub fn new(username: impl Into<String>, hub: Arc<dyn Hub>, liveness: Liveness) -> (Self, Member) {
        let id = SessionId::new();
        let username = username.into();
        let (tx, egress) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();
        let member = Member::new(id.clone(), username.clone(), tx, closed.clone());
        let session = Self {
            shared: Arc::new(Shared {
                id,
                username,
                hub,
                released: AtomicBool::new(false),
                closed,
            }),
            liveness,
            egress,
        };
        (session, member)
    }

    pub fn id(&self) -> &SessionId {
        &self.shared.id
    }

    pub fn username(&self) -> &str {
        &self.shared.username
    }

    /// Drive the session until both loops have stopped.
    ///
    /// The session must already be registered with its hub.
    pub async fn run<R, W>(self, inbound: R, outbound: W) -> SessionSummary
    where
        R: Stream<Item = Result<Frame, TransportError>> + Unpin + Send,
        W: Sink<Frame, Error = TransportError> + Unpin + Send + 'static,
    {
        let Self {
            shared,
            liveness,
            egress,
        } = self;
        let span = info_span!("session", session_id = %shared.id, user = %shared.username);

        async move {
            debug!(
                pong_wait_ms = liveness.pong_wait.as_millis() as u64,
                "session started"
            );
            let writer = tokio::spawn(
                write_loop(Arc::clone(&shared), liveness, egress, outbound).in_current_span(),
            );
            let read_end = read_loop(&shared, liveness, inbound).await;
            let write_end = match writer.await {
                Ok(end) => end,
                Err(err) => {
                    error!(error = %err, "write loop panicked");
                    shared.release();
                    WriteEnd::Released
                }
            };
            info!(?read_end, ?write_end, "session ended");
            SessionSummary {
                read_end,
                write_end,
            }
        }
        .instrument(span)
        .await
    }
}

/// Classify a read error or close frame.
fn peer_gone(err: TransportError) -> ReadEnd {
    if err.is_expected_close() {
        debug!(error = %err, "peer disconnected");
        ReadEnd::PeerClosed
    } else {
        error!(error = %err, kind = err.error_kind(), "read failed");
        ReadEnd::Failed
    }
}

async fn read_loop<R>(shared: &Shared, liveness: Liveness, mut inbound: R) -> ReadEnd
where
    R: Stream<Item = Result<Frame, TransportError>> + Unpin,
{
    let mut deadline = Instant::now() + liveness.pong_wait;

    let end = loop {
        let next = tokio::select! {
            biased;
            _ = shared.closed.cancelled() => break ReadEnd::Released,
            next = time::timeout_at(deadline, inbound.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                warn!(
                    pong_wait_ms = liveness.pong_wait.as_millis() as u64,
                    "no pong before deadline, dropping connection"
                );
                break ReadEnd::DeadlineExpired;
            }
            Ok(None) => {
                debug!("inbound stream ended");
                break ReadEnd::PeerClosed;
            }
            Ok(Some(Err(err))) => break peer_gone(err),
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Frame::Text(text) => shared.publish(text),
            Frame::Binary(data) => match String::from_utf8(data) {
                Ok(text) => shared.publish(text),
                Err(err) => info!(len = err.as_bytes().len(), "ignoring non-UTF-8 binary frame"),
            },
            Frame::Pong(_) => {
                deadline = Instant::now() + liveness.pong_wait;
                debug!("pong received");
            }
            Frame::Ping(_) => trace!("ping received"),
            Frame::Close(close) => {
                let err = match close {
                    Some(c) => TransportError::closed(Some(c.code), c.reason),
                    None => TransportError::closed(None, ""),
                };
                break peer_gone(err);
            }
        }
    };

    shared.release();
    end
}

/// How long a pending write may keep the session alive once it has been released.
const RELEASE_GRACE: Duration = Duration::from_secs(1);

/// Write one frame. Returns `None` if the write was still pending
/// `RELEASE_GRACE` after the session was released.
async fn send_frame<W>(
    closed: &CancellationToken,
    outbound: &mut W,
    frame: Frame,
) -> Option<Result<(), TransportError>>
where
    W: Sink<Frame, Error = TransportError> + Unpin,
{
    let abandoned = async {
        closed.cancelled().await;
        time::sleep(RELEASE_GRACE).await;
    };
    tokio::select! {
        biased;
        sent = outbound.send(frame) => Some(sent),
        _ = abandoned => None,
    }
}

async fn write_loop<W>(
    shared: Arc<Shared>,
    liveness: Liveness,
    mut egress: mpsc::UnboundedReceiver<Arc<Event>>,
    mut outbound: W,
) -> WriteEnd
where
    W: Sink<Frame, Error = TransportError> + Unpin,
{
    let period = liveness.ping_interval();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let end = loop {
        tokio::select! {
            biased;
            _ = ticker.tick() => {
                match send_frame(&shared.closed, &mut outbound, Frame::Ping(Vec::new())).await {
                    Some(Ok(())) => trace!("sent ping"),
                    Some(Err(err)) => {
                        warn!(error = %err, "ping failed, closing connection");
                        break WriteEnd::PingFailed;
                    }
                    None => break abandon_write("ping"),
                }
            }
            next = egress.recv() => match next {
                Some(event) => {
                    let json = match event.to_json() {
                        Ok(json) => json,
                        Err(err) => {
                            error!(error = %err, event_id = %event.id, "failed to encode event");
                            break WriteEnd::EncodeFailed;
                        }
                    };
                    match send_frame(&shared.closed, &mut outbound, Frame::Text(json)).await {
                        Some(Ok(())) => trace!(event_id = %event.id, "sent message"),
                        Some(Err(err)) => error!(error = %err, event_id = %event.id, "failed to write message"),
                        None => break abandon_write("message"),
                    }
                }
                None => {
                    match send_frame(&shared.closed, &mut outbound, Frame::Close(None)).await {
                        Some(Ok(())) => {}
                        Some(Err(err)) => debug!(error = %err, "close frame not delivered"),
                        None => break abandon_write("close frame"),
                    }
                    break WriteEnd::QueueClosed;
                }
            },
            _ = shared.closed.cancelled() => break WriteEnd::Released,
        }
    };

    drop(ticker);
    shared.release();
    end
}

fn abandon_write(what: &'static str) -> WriteEnd {
    warn!(frame = what, "peer not accepting writes, dropping connection");
    WriteEnd::Released
}
