// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event dispatch table with facilitator gating.
//!
//! Each feature registers its own handlers when it builds its router. Socket
//! reads and REST calls both go through [`EventRouter::dispatch_event`], so an
//! event produces the same broadcast whichever way it arrives.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;

use crate::error::DispatchError;
use crate::hub::{Hub, RoomMessage};
use crate::protocol::OutboundEvent;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

type HandlerFn = Arc<dyn Fn(EventContext) -> BoxFuture<anyhow::Result<Reply>> + Send + Sync>;
type ConfirmFn = Arc<dyn Fn(String, String) -> BoxFuture<anyhow::Result<()>> + Send + Sync>;
type RetreatFn = Arc<dyn Fn(String, String) -> BoxFuture<anyhow::Result<String>> + Send + Sync>;

/// Input to an event handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub room_id: String,
    pub user_id: String,
    pub value: String,
}

/// What a handler wants done after it ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Send this event to everyone in the room.
    Broadcast(OutboundEvent),
    /// Nothing to send.
    Silent,
    /// End the caller's session (voluntary leave). Nothing is broadcast.
    ForceClose,
}

/// Result of one dispatch.
#[derive(Debug)]
pub enum Dispatched {
    /// The handler's event was broadcast with this payload.
    Broadcast(Utf8Bytes),
    /// The handler ran but nothing was broadcast.
    Handled,
    /// The handler asked for the session to end.
    ForceClose,
    /// Facilitator check failed; the handler never ran.
    Denied(anyhow::Error),
    /// The handler returned an error.
    Rejected(anyhow::Error),
    /// No handler for this event type.
    Unknown,
}

pub struct EventRouter {
    hub: Hub,
    handlers: HashMap<String, HandlerFn>,
    facilitator_only: HashSet<String>,
    confirm_facilitator: Option<ConfirmFn>,
    retreat_user: Option<RetreatFn>,
}

impl EventRouter {
    pub fn builder(hub: Hub) -> EventRouterBuilder {
        EventRouterBuilder {
            hub,
            handlers: HashMap::new(),
            facilitator_only: HashSet::new(),
            confirm_facilitator: None,
            retreat_user: None,
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Gate, run and broadcast one event.
    ///
    /// Facilitator-only events need `confirm_facilitator` to pass first. A
    /// broadcast is only sent while the room still has connections.
    pub async fn dispatch_event(
        &self,
        room_id: &str,
        user_id: &str,
        kind: &str,
        value: String,
    ) -> Dispatched {
        if self.facilitator_only.contains(kind) {
            let Some(confirm) = &self.confirm_facilitator else {
                return Dispatched::Denied(anyhow::anyhow!("no facilitator check configured"));
            };
            if let Err(e) = confirm(room_id.to_owned(), user_id.to_owned()).await {
                return Dispatched::Denied(e);
            }
        }

        let Some(handler) = self.handlers.get(kind) else {
            return Dispatched::Unknown;
        };
        let ctx = EventContext { room_id: room_id.to_owned(), user_id: user_id.to_owned(), value };
        let event = match handler(ctx).await {
            Ok(Reply::Broadcast(event)) => event,
            Ok(Reply::Silent) => return Dispatched::Handled,
            Ok(Reply::ForceClose) => return Dispatched::ForceClose,
            Err(e) => return Dispatched::Rejected(e),
        };

        let msg = match RoomMessage::event(room_id, &event) {
            Ok(msg) => msg,
            Err(e) => return Dispatched::Rejected(e),
        };
        if !self.hub.room_exists(room_id).await {
            return Dispatched::Handled;
        }
        let data = msg.data.clone();
        self.hub.broadcast(msg);
        Dispatched::Broadcast(data)
    }

    /// Entry point for REST handlers that mutate a live room.
    pub async fn process_api_event(
        &self,
        user_id: &str,
        room_id: &str,
        kind: &str,
        value: String,
    ) -> Result<(), DispatchError> {
        match self.dispatch_event(room_id, user_id, kind, value).await {
            Dispatched::Broadcast(_) | Dispatched::Handled | Dispatched::ForceClose => Ok(()),
            Dispatched::Denied(e) => Err(DispatchError::NotFacilitator(e)),
            Dispatched::Rejected(e) => Err(DispatchError::Rejected(e)),
            Dispatched::Unknown => Err(DispatchError::UnknownEvent(kind.to_owned())),
        }
    }

    /// Run the retreat callback and return the refreshed roster, or an empty
    /// value when there is no callback or it failed.
    pub async fn retreat(&self, room_id: &str, user_id: &str) -> String {
        let Some(retreat) = &self.retreat_user else {
            return String::new();
        };
        match retreat(room_id.to_owned(), user_id.to_owned()).await {
            Ok(roster) => roster,
            Err(e) => {
                tracing::error!(room = room_id, user = user_id, err = %e, "retreat failed");
                String::new()
            }
        }
    }
}

pub struct EventRouterBuilder {
    hub: Hub,
    handlers: HashMap<String, HandlerFn>,
    facilitator_only: HashSet<String>,
    confirm_facilitator: Option<ConfirmFn>,
    retreat_user: Option<RetreatFn>,
}

impl EventRouterBuilder {
    pub fn on<F, Fut>(mut self, kind: &str, handler: F) -> Self
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Reply>> + Send + 'static,
    {
        let handler: HandlerFn =
            Arc::new(move |ctx: EventContext| -> BoxFuture<anyhow::Result<Reply>> {
                Box::pin(handler(ctx))
            });
        self.handlers.insert(kind.to_owned(), handler);
        self
    }

    /// Register a handler that only a room facilitator may trigger.
    pub fn facilitator_only<F, Fut>(mut self, kind: &str, handler: F) -> Self
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Reply>> + Send + 'static,
    {
        self.facilitator_only.insert(kind.to_owned());
        self.on(kind, handler)
    }

    pub fn confirm_facilitator<F, Fut>(mut self, confirm: F) -> Self
    where
        F: Fn(String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let confirm: ConfirmFn =
            Arc::new(move |room: String, user: String| -> BoxFuture<anyhow::Result<()>> {
                Box::pin(confirm(room, user))
            });
        self.confirm_facilitator = Some(confirm);
        self
    }

    pub fn retreat_user<F, Fut>(mut self, retreat: F) -> Self
    where
        F: Fn(String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        let retreat: RetreatFn =
            Arc::new(move |room: String, user: String| -> BoxFuture<anyhow::Result<String>> {
                Box::pin(retreat(room, user))
            });
        self.retreat_user = Some(retreat);
        self
    }

    pub fn build(self) -> Arc<EventRouter> {
        Arc::new(EventRouter {
            hub: self.hub,
            handlers: self.handlers,
            facilitator_only: self.facilitator_only,
            confirm_facilitator: self.confirm_facilitator,
            retreat_user: self.retreat_user,
        })
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
