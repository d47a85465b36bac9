// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::arena::{self, events};
use crate::error::ApiError;
use crate::state::AppState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub rooms: usize,
    pub connections: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBattleRequest {
    pub name: String,
    #[serde(default)]
    pub join_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddStoryRequest {
    pub name: String,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = s.arena.hub().stats().await;
    Json(HealthResponse {
        status: "running".to_owned(),
        rooms: stats.rooms,
        connections: stats.connections,
    })
}

/// `POST /api/battles`: the caller becomes the battle's facilitator.
pub async fn create_battle(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateBattleRequest>,
) -> impl IntoResponse {
    let Some(user) = arena::user_id(&headers) else {
        return ApiError::Unauthorized.to_http_response("user id required").into_response();
    };
    if req.name.trim().is_empty() {
        return ApiError::BadRequest.to_http_response("battle name is required").into_response();
    }

    let battle = s.arena.store.create_battle(req.name.trim(), &user, req.join_code).await;
    tracing::debug!(room = %battle.id, user = %user, "battle created");
    (StatusCode::CREATED, Json(battle)).into_response()
}

/// `GET /api/battles/{battleId}`
pub async fn get_battle(
    State(s): State<Arc<AppState>>,
    Path(battle_id): Path<String>,
) -> impl IntoResponse {
    match s.arena.store.get(&battle_id).await {
        Some(battle) => Json(battle).into_response(),
        None => ApiError::RoomNotFound.to_http_response("battle not found").into_response(),
    }
}

/// `POST /api/battles/{battleId}/stories`: same effect and broadcast as the
/// `add_story` socket event.
pub async fn add_story(
    State(s): State<Arc<AppState>>,
    Path(battle_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AddStoryRequest>,
) -> impl IntoResponse {
    let Some(user) = arena::user_id(&headers) else {
        return ApiError::Unauthorized.to_http_response("user id required").into_response();
    };
    if !s.arena.store.exists(&battle_id).await {
        return ApiError::RoomNotFound.to_http_response("battle not found").into_response();
    }

    let value = serde_json::json!({ "name": req.name }).to_string();
    if let Err(e) =
        s.arena.router.process_api_event(&user, &battle_id, events::ADD_STORY, value).await
    {
        tracing::debug!(room = %battle_id, user = %user, err = %e, "add story refused");
        return e.api_error().to_http_response(e.to_string()).into_response();
    }

    match s.arena.store.get(&battle_id).await {
        Some(battle) => (StatusCode::CREATED, Json(battle)).into_response(),
        None => ApiError::RoomNotFound.to_http_response("battle not found").into_response(),
    }
}
