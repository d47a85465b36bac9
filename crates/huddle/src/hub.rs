// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Room registry and broadcast actor.
//!
//! A single task owns the room map and is reached only through one command
//! channel, so registration, broadcast and room queries are applied strictly in
//! the order they were sent. Nothing outside the task ever touches the map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Utf8Bytes, WebSocket};
use indexmap::IndexMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::connection::{Connection, Subscription, Timing};
use crate::protocol::OutboundEvent;

/// Capacity of each connection's outbound queue.
pub const SEND_BUFFER: usize = 256;

pub type ConnectionId = u64;

/// Allocate a process-unique connection id.
pub fn next_connection_id() -> ConnectionId {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// One connection's entry in a room.
#[derive(Debug)]
pub struct Member {
    pub id: ConnectionId,
    pub room: String,
    pub user_id: String,
    send: mpsc::Sender<Utf8Bytes>,
}

impl Member {
    /// Create a member with a fresh outbound queue, returning the receiving end.
    pub fn channel(room: &str, user_id: &str) -> (Self, mpsc::Receiver<Utf8Bytes>) {
        Self::with_id(next_connection_id(), room, user_id)
    }

    pub(crate) fn with_id(
        id: ConnectionId,
        room: &str,
        user_id: &str,
    ) -> (Self, mpsc::Receiver<Utf8Bytes>) {
        let (send, rx) = mpsc::channel(SEND_BUFFER);
        (Self { id, room: room.to_owned(), user_id: user_id.to_owned(), send }, rx)
    }
}

/// Outbound broadcast unit.
#[derive(Debug, Clone)]
pub struct RoomMessage {
    pub data: Utf8Bytes,
    pub room: String,
}

impl RoomMessage {
    pub fn new(room: &str, data: Utf8Bytes) -> Self {
        Self { data, room: room.to_owned() }
    }

    pub fn event(room: &str, event: &OutboundEvent) -> anyhow::Result<Self> {
        Ok(Self::new(room, event.to_text()?))
    }
}

enum Command {
    Register(Member),
    Unregister { room: String, id: ConnectionId },
    Broadcast(RoomMessage),
    RoomExists { room: String, reply: oneshot::Sender<bool> },
    Stats { reply: oneshot::Sender<HubStats> },
}

/// Point-in-time room counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub rooms: usize,
    pub connections: usize,
}

/// Handle to a running hub. Cheap to clone; the actor stops once every handle
/// is dropped.
#[derive(Clone)]
pub struct Hub {
    tx: mpsc::UnboundedSender<Command>,
    timing: Timing,
    shutdown: CancellationToken,
}

impl Hub {
    /// Spawn the hub actor on the current runtime.
    pub fn spawn(timing: Timing) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx));
        Self { tx, timing, shutdown: CancellationToken::new() }
    }

    /// Close every subscription of this hub once `shutdown` is cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn register(&self, member: Member) {
        let _ = self.tx.send(Command::Register(member));
    }

    /// Remove a connection from a room. Unknown connections are ignored.
    pub fn unregister(&self, room: &str, id: ConnectionId) {
        let _ = self.tx.send(Command::Unregister { room: room.to_owned(), id });
    }

    pub fn broadcast(&self, msg: RoomMessage) {
        let _ = self.tx.send(Command::Broadcast(msg));
    }

    /// Whether `room` currently has at least one connection.
    pub async fn room_exists(&self, room: &str) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::RoomExists { room: room.to_owned(), reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn stats(&self) -> HubStats {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Stats { reply }).is_err() {
            return HubStats::default();
        }
        rx.await.unwrap_or_default()
    }

    pub fn new_connection(&self, socket: WebSocket) -> Connection {
        Connection::new(socket, self.timing)
    }

    /// Bind `conn` to a user and room and register it.
    pub fn new_subscriber(&self, conn: Connection, user_id: &str, room_id: &str) -> Subscription {
        let (member, send_rx) = Member::with_id(conn.id(), room_id, user_id);
        self.register(member);
        Subscription::new(conn, user_id, room_id, send_rx)
    }
}

/// Room membership owned by the hub task.
#[derive(Default)]
pub(crate) struct Rooms {
    rooms: HashMap<String, IndexMap<ConnectionId, Member>>,
}

impl Rooms {
    pub(crate) fn register(&mut self, member: Member) {
        tracing::debug!(room = %member.room, user = %member.user_id, conn = member.id, "register");
        self.rooms.entry(member.room.clone()).or_default().insert(member.id, member);
    }

    pub(crate) fn unregister(&mut self, room: &str, id: ConnectionId) {
        let Some(members) = self.rooms.get_mut(room) else {
            return;
        };
        if members.shift_remove(&id).is_some() {
            tracing::debug!(room, conn = id, "unregister");
        }
        if members.is_empty() {
            self.rooms.remove(room);
        }
    }

    /// Fan `msg` out to every connection in its room. A connection whose queue
    /// is full or closed is dropped from the room, which closes its queue.
    pub(crate) fn broadcast(&mut self, msg: &RoomMessage) {
        let Some(members) = self.rooms.get_mut(&msg.room) else {
            return;
        };
        members.retain(|id, member| match member.send.try_send(msg.data.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    room = %msg.room,
                    user = %member.user_id,
                    conn = *id,
                    "send buffer full, dropping connection"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(
                    room = %msg.room,
                    conn = *id,
                    "send queue closed, dropping connection"
                );
                false
            }
        });
        if members.is_empty() {
            self.rooms.remove(&msg.room);
        }
    }

    pub(crate) fn exists(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    pub(crate) fn stats(&self) -> HubStats {
        HubStats {
            rooms: self.rooms.len(),
            connections: self.rooms.values().map(IndexMap::len).sum(),
        }
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut rooms = Rooms::default();
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Register(member) => rooms.register(member),
            Command::Unregister { room, id } => rooms.unregister(&room, id),
            Command::Broadcast(msg) => rooms.broadcast(&msg),
            Command::RoomExists { room, reply } => {
                let _ = reply.send(rooms.exists(&room));
            }
            Command::Stats { reply } => {
                let _ = reply.send(rooms.stats());
            }
        }
    }
    tracing::debug!("hub stopped");
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
