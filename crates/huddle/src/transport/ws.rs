// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Room socket upgrade and the shared join protocol.
//!
//! A feature mounts [`websocket_route`] with its own [`RoomAuthority`], which
//! resolves identity and owns room membership. Everything after that (origin
//! check, join-code challenge, admission, pumps) is the same for every feature.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::ws::WebSocket;
use axum::extract::{Path, WebSocketUpgrade};
use axum::http::header::{HOST, ORIGIN};
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};

use crate::connection::Connection;
use crate::dispatch::EventRouter;
use crate::error::{ApiError, AuthError};
use crate::hub::RoomMessage;
use crate::protocol::{
    OutboundEvent, AUTH_ROOM, INIT, JOIN_CODE_INCORRECT, JOIN_CODE_REQUIRED, USER_JOINED,
};

pub type AuthFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Allowed websocket origins: the app domain, one subdomain of it, or the
/// host the request was sent to. Ports are part of the match, so a domain
/// served on a non-default port is configured as `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    app_domain: String,
    subdomain_host: String,
}

impl OriginPolicy {
    pub fn new(app_domain: &str, subdomain: &str) -> Self {
        Self {
            app_domain: app_domain.to_ascii_lowercase(),
            subdomain_host: format!("{subdomain}.{app_domain}").to_ascii_lowercase(),
        }
    }

    /// Whether a browser `Origin` may open a socket. `host` is the request's
    /// `Host` header, port included.
    pub fn allows(&self, origin: &str, host: Option<&str>) -> bool {
        let Ok(uri) = origin.parse::<Uri>() else {
            return false;
        };
        let (Some(_), Some(authority)) = (uri.scheme(), uri.authority()) else {
            return false;
        };
        let authority = authority.as_str();
        authority.eq_ignore_ascii_case(&self.app_domain)
            || authority.eq_ignore_ascii_case(&self.subdomain_host)
            || host.is_some_and(|host| authority.eq_ignore_ascii_case(host))
    }

    /// Check the request's `Origin` header. Requests without one come from
    /// non-browser clients and pass; a present header must be allowed.
    pub fn check(&self, headers: &HeaderMap) -> bool {
        let Some(origin) = headers.get(ORIGIN) else {
            return true;
        };
        let host = headers.get(HOST).and_then(|v| v.to_str().ok());
        origin.to_str().is_ok_and(|origin| self.allows(origin, host))
    }
}

/// Join requirements for one user in one room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinGate {
    /// The user joined this room before and skips the join code.
    pub already_member: bool,
    /// Join code the room is protected with, if any.
    pub join_code: Option<String>,
}

/// What a newly admitted member is told.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admitted {
    /// Full room state for the joining connection only.
    pub snapshot: String,
    /// Current roster, broadcast to the whole room.
    pub roster: String,
}

/// Identity and membership rules of one feature.
pub trait RoomAuthority: Send + Sync + 'static {
    /// Resolve the user behind an upgrade request and check the room.
    fn authenticate<'a>(
        &'a self,
        headers: &'a HeaderMap,
        room_id: &'a str,
    ) -> AuthFuture<'a, Result<String, AuthError>>;

    fn join_gate<'a>(
        &'a self,
        room_id: &'a str,
        user_id: &'a str,
    ) -> AuthFuture<'a, anyhow::Result<JoinGate>>;

    /// Persist the membership and return what the new member should see.
    fn admit<'a>(
        &'a self,
        room_id: &'a str,
        user_id: &'a str,
    ) -> AuthFuture<'a, anyhow::Result<Admitted>>;
}

struct RoomRoute {
    room_param: &'static str,
    origins: OriginPolicy,
    authority: Arc<dyn RoomAuthority>,
    router: Arc<EventRouter>,
}

/// Websocket endpoint for one feature. The room id is read from the path
/// parameter named `room_param`.
pub fn websocket_route<S>(
    room_param: &'static str,
    origins: OriginPolicy,
    authority: Arc<dyn RoomAuthority>,
    router: Arc<EventRouter>,
) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    let route = Arc::new(RoomRoute { room_param, origins, authority, router });
    get(
        move |Path(params): Path<HashMap<String, String>>,
              headers: HeaderMap,
              ws: WebSocketUpgrade| {
            let route = Arc::clone(&route);
            async move { upgrade(route, params, headers, ws) }
        },
    )
}

fn upgrade(
    route: Arc<RoomRoute>,
    params: HashMap<String, String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(room_id) = params.get(route.room_param).cloned() else {
        return ApiError::BadRequest.to_http_response("missing room id").into_response();
    };

    if !route.origins.check(&headers) {
        tracing::debug!(room = %room_id, origin = ?headers.get(ORIGIN), "origin rejected");
        return ApiError::Forbidden.to_http_response("origin not allowed").into_response();
    }

    ws.on_upgrade(move |socket| serve(route, socket, headers, room_id)).into_response()
}

async fn serve(route: Arc<RoomRoute>, socket: WebSocket, headers: HeaderMap, room_id: String) {
    let mut conn = route.router.hub().new_connection(socket);

    let user_id = match route.authority.authenticate(&headers, &room_id).await {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::debug!(room = %room_id, conn = conn.id(), err = %e, "connection refused");
            conn.reject(&e).await;
            return;
        }
    };

    match join_room(&mut conn, route.authority.as_ref(), &room_id, &user_id).await {
        Ok(Challenge::Passed) => {}
        Ok(Challenge::Disconnected) => {
            tracing::debug!(room = %room_id, user = %user_id, "left during join challenge");
            return;
        }
        Err(e) => {
            tracing::debug!(room = %room_id, user = %user_id, err = %e, "join refused");
            conn.reject(&e).await;
            return;
        }
    }

    admit(conn, &route, &room_id, &user_id).await;
}

#[derive(Debug, PartialEq, Eq)]
enum Challenge {
    Passed,
    Disconnected,
}

/// Run the join-code challenge if the room needs one. Wrong codes are answered
/// with `join_code_incorrect` and the user may try again.
async fn join_room(
    conn: &mut Connection,
    authority: &dyn RoomAuthority,
    room_id: &str,
    user_id: &str,
) -> Result<Challenge, AuthError> {
    let gate = authority.join_gate(room_id, user_id).await.map_err(|e| {
        tracing::error!(room = room_id, user = user_id, err = %e, "join gate lookup failed");
        AuthError::internal("failed to look up room")
    })?;
    let already_member = gate.already_member;
    let Some(code) = gate.join_code.filter(|code| !already_member && !code.is_empty()) else {
        return Ok(Challenge::Passed);
    };

    if conn.send_event(&OutboundEvent::new(JOIN_CODE_REQUIRED, "", user_id)).await.is_err() {
        return Ok(Challenge::Disconnected);
    }
    while let Some(event) = conn.next_event().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(room = room_id, user = user_id, err = %e, "malformed event");
                continue;
            }
        };
        if event.kind != AUTH_ROOM {
            tracing::debug!(
                room = room_id,
                user = user_id,
                event = %event.kind,
                "ignored before join"
            );
            continue;
        }
        if constant_time_eq(&event.value, &code) {
            return Ok(Challenge::Passed);
        }
        let incorrect = OutboundEvent::new(JOIN_CODE_INCORRECT, "", user_id);
        if conn.send_event(&incorrect).await.is_err() {
            break;
        }
    }
    Ok(Challenge::Disconnected)
}

/// Register the member, send it the snapshot and tell the room, then pump
/// until the connection ends.
async fn admit(conn: Connection, route: &RoomRoute, room_id: &str, user_id: &str) {
    let hub = route.router.hub();
    let mut sub = hub.new_subscriber(conn, user_id, room_id);

    let admitted = match route.authority.admit(room_id, user_id).await {
        Ok(admitted) => admitted,
        Err(e) => {
            tracing::error!(room = room_id, user = user_id, err = %e, "admission failed");
            hub.unregister(room_id, sub.key().conn);
            sub.reject(&AuthError::internal("failed to join room")).await;
            return;
        }
    };

    // A failed write surfaces again in the read pump, which cleans up.
    if let Err(e) = sub.send_event(&OutboundEvent::new(INIT, admitted.snapshot, user_id)).await {
        tracing::debug!(room = room_id, user = user_id, err = %e, "init not delivered");
    }
    let joined = OutboundEvent::new(USER_JOINED, admitted.roster, user_id);
    match RoomMessage::event(room_id, &joined) {
        Ok(msg) => hub.broadcast(msg),
        Err(e) => tracing::error!(room = room_id, user = user_id, err = %e, "encode failed"),
    }
    tracing::debug!(room = room_id, user = user_id, conn = sub.key().conn, "joined");

    sub.run(Arc::clone(&route.router)).await;
}

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
