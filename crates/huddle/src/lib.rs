// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Huddle: real-time room broadcast hub for collaborative planning tools.
//!
//! Each feature spawns its own [`hub::Hub`], registers its socket events on an
//! [`dispatch::EventRouter`] and mounts [`transport::ws::websocket_route`] with
//! a [`transport::ws::RoomAuthority`] that knows its users and rooms.

pub mod arena;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod state;
pub mod test_support;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::state::AppState;
use crate::transport::build_router;

/// Run the server until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let state = Arc::new(AppState::new(config, CancellationToken::new()));
    let shutdown = state.shutdown.clone();

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down");
        }
        signal.cancel();
    });

    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("huddle listening on {}", listener.local_addr()?);
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
