//! Per-connection relay: reads client frames, persists them and fans the
//! stored message out through the hub.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parley_auth::{Identity, Session};
use parley_chats::ChatError;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::frames::{CloseReason, InboundFrame, MessageFrame, OutboundFrame};
use super::hub::{ConnectionHub, ConnectionId, Membership, Outbound};
use crate::state::GatewayState;

/// How long the writer gets to flush and send the close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// State owned by one admitted connection for its whole life.
struct LiveConnection {
    id: ConnectionId,
    room_id: String,
    identity: Identity,
    session: Session,
    outbound: mpsc::Sender<Outbound>,
    state: Arc<GatewayState>,
}

#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    Close(CloseReason),
}

/// A hub slot held by one connection. Dropping it without [`release`]
/// (a panic or a cancelled task) still removes the connection.
///
/// [`release`]: Registration::release
struct Registration {
    hub: ConnectionHub,
    room_id: String,
    id: ConnectionId,
    released: bool,
}

impl Registration {
    async fn release(mut self) {
        self.hub.unregister(&self.room_id, self.id).await;
        self.released = true;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!(room_id = %self.room_id, connection_id = %self.id, "no runtime to release connection");
            return;
        };

        let hub = self.hub.clone();
        let room_id = std::mem::take(&mut self.room_id);
        let id = self.id;
        runtime.spawn(async move {
            hub.unregister(&room_id, id).await;
        });
    }
}

/// Drive an upgraded socket until it closes. The connection is always
/// removed from the room before the socket is released.
pub async fn serve(socket: WebSocket, state: Arc<GatewayState>, room_id: String, session: Session) {
    let (sink, stream) = socket.split();
    let (outbound, queue) = mpsc::channel(state.live.outbound_buffer);
    let (close, close_requested) = oneshot::channel();
    let (evict, evicted) = oneshot::channel();

    let writer = tokio::spawn(write_loop(sink, queue, close_requested, state.live.ping_interval));

    let membership = Membership {
        identity: session.identity.clone(),
        outbound: outbound.clone(),
        evict,
    };

    let id = match state.hub.register(&room_id, membership).await {
        Ok(id) => id,
        Err(error) => {
            warn!(room_id = %room_id, identity = %session.identity, %error, "registration failed");
            finish(writer, close, Some(CloseReason::going_away())).await;
            return;
        }
    };

    let registration = Registration {
        hub: state.hub.clone(),
        room_id: room_id.clone(),
        id,
        released: false,
    };

    let connection = LiveConnection {
        id,
        room_id: room_id.clone(),
        identity: session.identity.clone(),
        session,
        outbound,
        state: state.clone(),
    };

    info!(room_id = %room_id, identity = %connection.identity, connection_id = %id, "connection admitted");

    let mut writer = writer;
    let (reason, writer_alive) = connection.relay(stream, evicted, &mut writer).await;

    registration.release().await;
    info!(
        room_id = %room_id,
        connection_id = %id,
        close_code = ?reason.map(|reason| reason.code),
        "connection closed"
    );

    if writer_alive {
        finish(writer, close, reason).await;
    }
}

/// Ask the writer to send `reason` (if any) and wait briefly for it to finish.
async fn finish(mut writer: JoinHandle<()>, close: oneshot::Sender<CloseReason>, reason: Option<CloseReason>) {
    match reason {
        Some(reason) => {
            let _ = close.send(reason);
        }
        None => drop(close),
    }

    if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
}

impl LiveConnection {
    /// Returns the close reason to send, if any, and whether the writer is
    /// still running.
    async fn relay(
        &self,
        mut stream: SplitStream<WebSocket>,
        mut evicted: oneshot::Receiver<CloseReason>,
        writer: &mut JoinHandle<()>,
    ) -> (Option<CloseReason>, bool) {
        let idle_timeout = self.state.live.idle_timeout;
        let idle = sleep(idle_timeout);
        tokio::pin!(idle);

        let expiry_deadline = session_deadline(&self.session);
        let expiry = sleep_until(expiry_deadline.unwrap_or_else(Instant::now));
        tokio::pin!(expiry);

        let mut watching_evictions = true;

        loop {
            tokio::select! {
                frame = stream.next() => {
                    let message = match frame {
                        Some(Ok(message)) => message,
                        Some(Err(error)) => {
                            debug!(connection_id = %self.id, %error, "read failed");
                            return (None, true);
                        }
                        None => return (None, true),
                    };

                    idle.as_mut().reset(deadline_after(idle_timeout));

                    match self.handle(message).await {
                        Step::Continue => {}
                        Step::Close(reason) => return (Some(reason), true),
                    }
                }
                reason = &mut evicted, if watching_evictions => match reason {
                    Ok(reason) => return (Some(reason), true),
                    Err(_) => watching_evictions = false,
                },
                _ = &mut idle => return (Some(CloseReason::idle()), true),
                _ = &mut expiry, if expiry_deadline.is_some() => {
                    return (Some(CloseReason::session_expired()), true);
                }
                _ = &mut *writer => {
                    debug!(connection_id = %self.id, "writer stopped");
                    return (None, false);
                }
            }
        }
    }

    async fn handle(&self, message: Message) -> Step {
        let payload = match message {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(bytes) => bytes,
            Message::Close(_) => return Step::Close(CloseReason::normal()),
            Message::Ping(_) | Message::Pong(_) => return Step::Continue,
        };

        if self.session.is_expired_at(Utc::now()) {
            return Step::Close(CloseReason::session_expired());
        }

        let frame = match InboundFrame::decode(&payload) {
            Ok(frame) => frame,
            Err(error) => {
                debug!(connection_id = %self.id, %error, "undecodable frame");
                return Step::Close(CloseReason::invalid_payload());
            }
        };

        let appended = self
            .state
            .messages
            .append(&self.room_id, &self.identity, &frame.content)
            .await;

        match appended {
            Ok(message) => {
                let frame = OutboundFrame::Message(MessageFrame::from(&message));
                if let Err(error) = self.state.hub.broadcast(&self.room_id, &frame, Some(self.id)).await {
                    warn!(room_id = %self.room_id, %error, "broadcast failed");
                }
                Step::Continue
            }
            Err(error) => {
                debug!(room_id = %self.room_id, identity = %self.identity, %error, "append rejected");
                let queued = queue_reply(&self.outbound, OutboundFrame::error(error.to_string()));

                if matches!(error, ChatError::NotParticipant { .. }) {
                    Step::Close(CloseReason::forbidden())
                } else {
                    queued
                }
            }
        }
    }
}

/// Queue a frame for this connection only. Never waits: a full queue
/// means the client is not reading and gets the slow consumer close.
fn queue_reply(outbound: &mpsc::Sender<Outbound>, frame: OutboundFrame) -> Step {
    let text = match frame.to_text() {
        Ok(text) => text,
        Err(error) => {
            warn!(%error, "failed to encode reply");
            return Step::Continue;
        }
    };

    match outbound.try_send(Outbound::Text(text)) {
        Ok(()) => Step::Continue,
        Err(TrySendError::Full(_)) => Step::Close(CloseReason::slow_consumer()),
        Err(TrySendError::Closed(_)) => Step::Continue,
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(parley_config::MAX_IDLE_TIMEOUT_SECONDS))
}

fn session_deadline(session: &Session) -> Option<Instant> {
    let remaining = (session.expires_at - Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO);
    Instant::now().checked_add(remaining)
}

/// The only task that writes to the socket.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<Outbound>,
    mut close_requested: oneshot::Receiver<CloseReason>,
    ping_interval: Duration,
) {
    let mut heartbeat = interval_at(deadline_after(ping_interval), ping_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            reason = &mut close_requested => {
                if let Ok(reason) = reason {
                    let frame = CloseFrame {
                        code: reason.code,
                        reason: reason.reason.into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                }
                break;
            }
            item = queue.recv() => match item {
                Some(Outbound::Text(text)) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = heartbeat.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
}
