//! Live connection registry: one actor task per room with connected members.
//!
//! The hub keeps `room id -> actor handle` behind a short-lived lock and counts
//! the registrations it handed out. The actor owns the room's member set and
//! serialises register, unregister and broadcast, so a connection is never
//! delivered to after its unregistration is acknowledged and never missed
//! after its registration is acknowledged. When the last registration is
//! released the entry is dropped, the command channel closes and the actor
//! exits.

use std::collections::HashMap;
use std::sync::Arc;

use parley_auth::Identity;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::frames::{CloseReason, OutboundFrame};

/// The sender's own connection receives the persisted message as its
/// acknowledgement (it carries the assigned id and seq).
pub const ECHO_TO_SENDER: bool = true;

const ROOM_COMMAND_BUFFER: usize = 256;

pub type ConnectionId = Uuid;

/// Items queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("room {0} is no longer accepting connections")]
    RoomClosed(String),

    #[error("frame could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What a connection hands the hub when it joins a room.
pub struct Membership {
    pub identity: Identity,
    /// Bounded queue drained by the connection's writer.
    pub outbound: mpsc::Sender<Outbound>,
    /// Fired when the room drops the connection (superseded or too slow).
    pub evict: oneshot::Sender<CloseReason>,
}

enum RoomCommand {
    Register {
        connection: ConnectionId,
        membership: Membership,
        ack: oneshot::Sender<()>,
    },
    Unregister {
        connection: ConnectionId,
        ack: oneshot::Sender<()>,
    },
    Broadcast {
        text: String,
        origin: Option<ConnectionId>,
    },
    Members {
        reply: oneshot::Sender<Vec<Identity>>,
    },
}

struct RoomEntry {
    commands: mpsc::Sender<RoomCommand>,
    registrations: usize,
}

#[derive(Clone, Default)]
pub struct ConnectionHub {
    rooms: Arc<Mutex<HashMap<String, RoomEntry>>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the room's live set. Returns once the room actor
    /// has recorded it.
    pub async fn register(&self, room_id: &str, membership: Membership) -> Result<ConnectionId, HubError> {
        let connection = Uuid::new_v4();

        let commands = {
            let mut rooms = self.rooms.lock().await;
            let entry = rooms.entry(room_id.to_owned()).or_insert_with(|| RoomEntry {
                commands: spawn_room(room_id.to_owned()),
                registrations: 0,
            });
            entry.registrations += 1;
            entry.commands.clone()
        };

        let (ack, acked) = oneshot::channel();
        let sent = commands
            .send(RoomCommand::Register {
                connection,
                membership,
                ack,
            })
            .await;

        if sent.is_err() || acked.await.is_err() {
            self.release(room_id).await;
            return Err(HubError::RoomClosed(room_id.to_owned()));
        }

        Ok(connection)
    }

    /// Remove a connection. Safe to call for a connection the room already
    /// evicted; every successful `register` must be paired with one call.
    pub async fn unregister(&self, room_id: &str, connection: ConnectionId) {
        let commands = {
            let rooms = self.rooms.lock().await;
            rooms.get(room_id).map(|entry| entry.commands.clone())
        };

        if let Some(commands) = commands {
            let (ack, acked) = oneshot::channel();
            if commands
                .send(RoomCommand::Unregister { connection, ack })
                .await
                .is_ok()
            {
                let _ = acked.await;
            }
        }

        self.release(room_id).await;
    }

    /// Deliver `frame` to every live connection in the room.
    pub async fn broadcast(
        &self,
        room_id: &str,
        frame: &OutboundFrame,
        origin: Option<ConnectionId>,
    ) -> Result<(), HubError> {
        let commands = {
            let rooms = self.rooms.lock().await;
            rooms.get(room_id).map(|entry| entry.commands.clone())
        };

        let Some(commands) = commands else {
            return Ok(());
        };

        let text = frame.to_text()?;
        commands
            .send(RoomCommand::Broadcast { text, origin })
            .await
            .map_err(|_| HubError::RoomClosed(room_id.to_owned()))
    }

    /// Identities currently live in the room.
    pub async fn live_members(&self, room_id: &str) -> Vec<Identity> {
        let commands = {
            let rooms = self.rooms.lock().await;
            rooms.get(room_id).map(|entry| entry.commands.clone())
        };

        let Some(commands) = commands else {
            return Vec::new();
        };

        let (reply, members) = oneshot::channel();
        if commands.send(RoomCommand::Members { reply }).await.is_err() {
            return Vec::new();
        }
        members.await.unwrap_or_default()
    }

    /// Number of rooms with a running actor.
    pub async fn active_rooms(&self) -> usize {
        self.rooms.lock().await.len()
    }

    async fn release(&self, room_id: &str) {
        let mut rooms = self.rooms.lock().await;
        if let Some(entry) = rooms.get_mut(room_id) {
            entry.registrations = entry.registrations.saturating_sub(1);
            if entry.registrations == 0 {
                rooms.remove(room_id);
                debug!(room_id = %room_id, "last connection left room");
            }
        }
    }
}

fn spawn_room(room_id: String) -> mpsc::Sender<RoomCommand> {
    let (commands, inbox) = mpsc::channel(ROOM_COMMAND_BUFFER);
    tokio::spawn(run_room(room_id, inbox));
    commands
}

struct Member {
    identity: Identity,
    outbound: mpsc::Sender<Outbound>,
    evict: oneshot::Sender<CloseReason>,
}

impl Member {
    fn evict(self, reason: CloseReason) {
        let _ = self.evict.send(reason);
    }
}

async fn run_room(room_id: String, mut inbox: mpsc::Receiver<RoomCommand>) {
    let mut members: HashMap<ConnectionId, Member> = HashMap::new();
    debug!(room_id = %room_id, "room actor started");

    while let Some(command) = inbox.recv().await {
        match command {
            RoomCommand::Register {
                connection,
                membership,
                ack,
            } => {
                let superseded: Vec<ConnectionId> = members
                    .iter()
                    .filter(|(_, member)| member.identity == membership.identity)
                    .map(|(id, _)| *id)
                    .collect();

                for id in superseded {
                    if let Some(member) = members.remove(&id) {
                        info!(room_id = %room_id, connection_id = %id, identity = %member.identity, "connection superseded");
                        member.evict(CloseReason::superseded());
                    }
                }

                members.insert(
                    connection,
                    Member {
                        identity: membership.identity,
                        outbound: membership.outbound,
                        evict: membership.evict,
                    },
                );
                let _ = ack.send(());
            }
            RoomCommand::Unregister { connection, ack } => {
                members.remove(&connection);
                let _ = ack.send(());
            }
            RoomCommand::Broadcast { text, origin } => {
                let mut dropped = Vec::new();

                for (id, member) in &members {
                    if !ECHO_TO_SENDER && Some(*id) == origin {
                        continue;
                    }
                    match member.outbound.try_send(Outbound::Text(text.clone())) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            dropped.push((*id, Some(CloseReason::slow_consumer())));
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => dropped.push((*id, None)),
                    }
                }

                for (id, reason) in dropped {
                    let Some(member) = members.remove(&id) else {
                        continue;
                    };
                    if let Some(reason) = reason {
                        warn!(room_id = %room_id, connection_id = %id, identity = %member.identity, "evicting slow consumer");
                        member.evict(reason);
                    }
                }
            }
            RoomCommand::Members { reply } => {
                let mut identities: Vec<Identity> =
                    members.values().map(|member| member.identity.clone()).collect();
                identities.sort();
                let _ = reply.send(identities);
            }
        }
    }

    debug!(room_id = %room_id, "room actor stopped");
}
