// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection socket ownership and the read/write pumps.
//!
//! After admission the socket is split: the write pump owns the sink and is
//! the only task that writes, the read pump owns the stream and dispatches
//! inbound events. The read pump hands its close frame to the write pump
//! through a one-shot; the write pump cancels a token on exit so a read pump
//! blocked on the socket sees the closure.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::dispatch::{Dispatched, EventRouter};
use crate::error::{AuthError, CloseCode};
use crate::hub::{next_connection_id, ConnectionId, RoomMessage};
use crate::protocol::{InboundEvent, OutboundEvent, USER_LEFT};

pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);
const MIN_PING_PERIOD: Duration = Duration::from_millis(1);

/// Socket keepalive timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Upper bound on a single socket write.
    pub write_wait: Duration,
    /// Interval between server pings.
    pub ping_period: Duration,
    /// How long a connection may go without a pong before its reads fail.
    pub pong_wait: Duration,
}

impl Timing {
    /// Zero durations fall back to the defaults; a zero ping period becomes
    /// nine tenths of the pong wait, never less than 1ms.
    pub fn new(write_wait: Duration, ping_period: Duration, pong_wait: Duration) -> Self {
        let write_wait = if write_wait.is_zero() { DEFAULT_WRITE_WAIT } else { write_wait };
        let pong_wait = if pong_wait.is_zero() { DEFAULT_PONG_WAIT } else { pong_wait };
        let ping_period = if ping_period.is_zero() {
            (pong_wait * 9 / 10).max(MIN_PING_PERIOD)
        } else {
            ping_period
        };
        Self { write_wait, ping_period, pong_wait }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }
}

/// One upgraded socket, before or after admission.
pub struct Connection {
    id: ConnectionId,
    socket: WebSocket,
    timing: Timing,
}

impl Connection {
    pub fn new(socket: WebSocket, timing: Timing) -> Self {
        Self { id: next_connection_id(), socket, timing }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Write an event straight to the socket. Only valid before the pumps run.
    pub async fn send_event(&mut self, event: &OutboundEvent) -> anyhow::Result<()> {
        let text = event.to_text()?;
        write_frame(&mut self.socket, Message::Text(text), self.timing.write_wait).await
    }

    /// Read the next text frame as an event. `None` once the socket is closed
    /// or broken.
    pub async fn next_event(&mut self) -> Option<anyhow::Result<InboundEvent>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(InboundEvent::parse(&text)),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(conn = self.id, err = %e, "read failed before admission");
                    return None;
                }
            }
        }
    }

    /// Close the socket with the error's code and message.
    pub async fn reject(mut self, err: &AuthError) {
        let frame = Message::Close(Some(err.close_frame()));
        let _ = write_frame(&mut self.socket, frame, self.timing.write_wait).await;
        let _ = self.socket.close().await;
    }
}

/// Identity of an admitted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionKey {
    pub conn: ConnectionId,
    pub room_id: String,
    pub user_id: String,
}

/// A connection admitted to a room.
pub struct Subscription {
    conn: Connection,
    key: SubscriptionKey,
    send_rx: mpsc::Receiver<Utf8Bytes>,
}

impl Subscription {
    pub(crate) fn new(
        conn: Connection,
        user_id: &str,
        room_id: &str,
        send_rx: mpsc::Receiver<Utf8Bytes>,
    ) -> Self {
        let key = SubscriptionKey {
            conn: conn.id,
            room_id: room_id.to_owned(),
            user_id: user_id.to_owned(),
        };
        Self { conn, key, send_rx }
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    pub async fn send_event(&mut self, event: &OutboundEvent) -> anyhow::Result<()> {
        self.conn.send_event(event).await
    }

    pub async fn reject(self, err: &AuthError) {
        self.conn.reject(err).await;
    }

    /// Start the write pump and run the read pump until the connection ends
    /// or the hub shuts down.
    pub async fn run(self, router: Arc<EventRouter>) {
        let Subscription { conn, key, send_rx } = self;
        let timing = conn.timing;
        let (sink, stream) = conn.socket.split();
        let (close_tx, close_rx) = oneshot::channel();
        let closed = router.hub().shutdown().child_token();

        tokio::spawn(write_pump(sink, send_rx, close_rx, timing, closed.clone()));
        read_pump(stream, key, router, timing, close_tx, closed).await;
    }
}

/// Sole writer of an admitted socket.
///
/// Delivers queued payloads as text frames and pings every `ping_period`.
/// Ends when the queue is closed (hub dropped the connection), a close frame
/// arrives from the read pump, or a write fails.
pub async fn write_pump<S>(
    mut sink: S,
    mut send_rx: mpsc::Receiver<Utf8Bytes>,
    mut close_rx: oneshot::Receiver<Option<CloseFrame>>,
    timing: Timing,
    closed: CancellationToken,
) where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let wait = timing.write_wait;
    let mut ticker =
        tokio::time::interval_at(Instant::now() + timing.ping_period, timing.ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            payload = send_rx.recv() => match payload {
                Some(text) => {
                    if let Err(e) = write_frame(&mut sink, Message::Text(text), wait).await {
                        tracing::debug!(err = %e, "write failed");
                        break;
                    }
                }
                None => {
                    let _ = write_frame(&mut sink, Message::Close(None), wait).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                if let Err(e) = write_frame(&mut sink, Message::Ping(Bytes::new()), wait).await {
                    tracing::debug!(err = %e, "ping failed");
                    break;
                }
            }
            frame = &mut close_rx => {
                let _ = write_frame(&mut sink, Message::Close(frame.ok().flatten()), wait).await;
                break;
            }
        }
    }

    let _ = sink.close().await;
    closed.cancel();
}

/// Sole reader of an admitted socket.
///
/// Reads fail once `pong_wait` passes without a pong. On exit the member is
/// retreated, the socket closed (code 4002 when a handler forced it), the
/// subscription unregistered and `user_left` broadcast if the room survives.
pub async fn read_pump<R, E>(
    mut stream: R,
    key: SubscriptionKey,
    router: Arc<EventRouter>,
    timing: Timing,
    close_tx: oneshot::Sender<Option<CloseFrame>>,
    closed: CancellationToken,
) where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let room = key.room_id.as_str();
    let user = key.user_id.as_str();
    let mut deadline = Instant::now() + timing.pong_wait;

    let force_close = loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => break false,
            frame = tokio::time::timeout_at(deadline, stream.next()) => frame,
        };
        let msg = match frame {
            Err(_) => {
                tracing::debug!(room, user, "pong wait elapsed");
                break false;
            }
            Ok(None) => break false,
            Ok(Some(Err(e))) => {
                tracing::debug!(room, user, err = %e, "read failed");
                break false;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        let text = match msg {
            Message::Text(text) => text,
            Message::Pong(_) => {
                deadline = Instant::now() + timing.pong_wait;
                continue;
            }
            Message::Close(_) => break false,
            Message::Ping(_) | Message::Binary(_) => continue,
        };

        let event = match InboundEvent::parse(&text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(room, user, err = %e, "malformed event");
                continue;
            }
        };

        match router.dispatch_event(room, user, &event.kind, event.value).await {
            Dispatched::ForceClose => break true,
            Dispatched::Denied(e) | Dispatched::Rejected(e) => {
                tracing::warn!(room, user, event = %event.kind, err = %e, "event rejected");
            }
            Dispatched::Unknown => {
                tracing::debug!(room, user, event = %event.kind, "no handler for event");
            }
            Dispatched::Broadcast(_) | Dispatched::Handled => {}
        }
    };

    let roster = router.retreat(room, user).await;
    let frame = force_close.then(|| CloseCode::Abandoned.frame("abandoned"));
    let _ = close_tx.send(frame);

    let hub = router.hub();
    hub.unregister(room, key.conn);
    if hub.room_exists(room).await {
        match RoomMessage::event(room, &OutboundEvent::new(USER_LEFT, roster, user)) {
            Ok(msg) => hub.broadcast(msg),
            Err(e) => tracing::error!(room, user, err = %e, "failed to encode user_left"),
        }
    }
    tracing::debug!(room, user, force_close, "connection closed");
}

/// Write one frame, bounded by `wait`.
async fn write_frame<S>(sink: &mut S, msg: Message, wait: Duration) -> anyhow::Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    match tokio::time::timeout(wait, sink.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => anyhow::bail!("socket write failed: {e}"),
        Err(_) => anyhow::bail!("socket write timed out after {wait:?}"),
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
