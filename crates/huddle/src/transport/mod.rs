// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport.

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let arena_ws = state.arena.websocket_route(state.config.origin_policy());
    Router::new()
        .route("/api/v1/health", get(http::health))
        // Battles
        .route("/api/battles", post(http::create_battle))
        .route("/api/battles/{battleId}", get(http::get_battle))
        .route("/api/battles/{battleId}/stories", post(http::add_story))
        // Room sockets
        .route("/api/arena/{battleId}", arena_ws)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
