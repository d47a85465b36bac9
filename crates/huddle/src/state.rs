// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio_util::sync::CancellationToken;

use crate::arena::Arena;
use crate::config::Config;

/// Shared server state.
pub struct AppState {
    pub config: Config,
    pub arena: Arena,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build state and spawn the feature hubs. Must run inside a tokio runtime.
    pub fn new(config: Config, shutdown: CancellationToken) -> Self {
        let arena = Arena::new(config.timing(), shutdown.clone());
        Self { config, arena, shutdown }
    }
}
