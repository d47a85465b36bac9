// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the room socket protocol.
//!
//! Every frame is a JSON text frame. Inbound frames carry `{"type", "value"}`;
//! outbound frames add the `userId` of the member the event is about. `value`
//! is an opaque string, usually itself JSON-encoded by the feature.

use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};

/// Full room snapshot, sent only to the joining connection.
pub const INIT: &str = "init";
/// Roster update after a member was admitted.
pub const USER_JOINED: &str = "user_joined";
/// Roster update after a member's socket went away.
pub const USER_LEFT: &str = "user_left";
/// The room needs a join code before admission.
pub const JOIN_CODE_REQUIRED: &str = "join_code_required";
/// The submitted join code did not match.
pub const JOIN_CODE_INCORRECT: &str = "join_code_incorrect";
/// Client answer to a join-code challenge.
pub const AUTH_ROOM: &str = "auth_room";

/// Client -> server event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: String,
}

/// Server -> client event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    pub user_id: String,
}

impl OutboundEvent {
    pub fn new(kind: &str, value: impl Into<String>, user_id: &str) -> Self {
        Self { kind: kind.to_owned(), value: value.into(), user_id: user_id.to_owned() }
    }

    /// Encode as a text frame payload. Socket and REST dispatch both go through
    /// here, so the same event always produces the same bytes.
    pub fn to_text(&self) -> anyhow::Result<Utf8Bytes> {
        Ok(serde_json::to_string(self)?.into())
    }
}

impl InboundEvent {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
