// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Planning-poker battles on their own hub.

pub mod events;
pub mod store;

use std::sync::Arc;

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use axum::routing::MethodRouter;
use tokio_util::sync::CancellationToken;

use crate::connection::Timing;
use crate::dispatch::EventRouter;
use crate::error::AuthError;
use crate::hub::Hub;
use crate::transport::ws::{
    websocket_route, Admitted, AuthFuture, JoinGate, OriginPolicy, RoomAuthority,
};

use self::store::ArenaStore;

/// Header carrying the caller's user id.
pub const USER_HEADER: &str = "x-user-id";
/// Cookie carrying the caller's user id when the header is absent.
pub const USER_COOKIE: &str = "user_id";
/// Path parameter holding the battle id.
pub const ROOM_PARAM: &str = "battleId";

/// Resolve the caller from the `x-user-id` header or the `user_id` cookie.
pub fn user_id(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(user) = from_header {
        return Some(user.to_owned());
    }
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == USER_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_owned())
}

/// The arena feature: store, event table and hub.
#[derive(Clone)]
pub struct Arena {
    pub store: Arc<ArenaStore>,
    pub router: Arc<EventRouter>,
}

impl Arena {
    /// Spawn the arena hub on the current runtime. Its sockets close once
    /// `shutdown` is cancelled.
    pub fn new(timing: Timing, shutdown: CancellationToken) -> Self {
        let store = Arc::new(ArenaStore::new());
        let hub = Hub::spawn(timing).with_shutdown(shutdown);
        let router = events::build_router(hub, Arc::clone(&store));
        Self { store, router }
    }

    pub fn hub(&self) -> &Hub {
        self.router.hub()
    }

    pub fn websocket_route<S>(&self, origins: OriginPolicy) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let authority = Arc::new(ArenaAuthority { store: Arc::clone(&self.store) });
        websocket_route(ROOM_PARAM, origins, authority, Arc::clone(&self.router))
    }
}

struct ArenaAuthority {
    store: Arc<ArenaStore>,
}

impl RoomAuthority for ArenaAuthority {
    fn authenticate<'a>(
        &'a self,
        headers: &'a HeaderMap,
        room_id: &'a str,
    ) -> AuthFuture<'a, Result<String, AuthError>> {
        Box::pin(async move {
            let user = user_id(headers).ok_or_else(|| AuthError::unauthorized("unauthorized"))?;
            if !self.store.exists(room_id).await {
                return Err(AuthError::room_not_found("battle not found"));
            }
            if self.store.is_active(room_id, &user).await {
                return Err(AuthError::duplicate_session("duplicate session"));
            }
            Ok(user)
        })
    }

    fn join_gate<'a>(
        &'a self,
        room_id: &'a str,
        user_id: &'a str,
    ) -> AuthFuture<'a, anyhow::Result<JoinGate>> {
        Box::pin(self.store.join_gate(room_id, user_id))
    }

    fn admit<'a>(
        &'a self,
        room_id: &'a str,
        user_id: &'a str,
    ) -> AuthFuture<'a, anyhow::Result<Admitted>> {
        Box::pin(async move {
            let roster = self.store.join(room_id, user_id).await?;
            let snapshot = self.store.snapshot(room_id).await?;
            Ok(Admitted { snapshot, roster })
        })
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
