// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::extract::ws::CloseFrame;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Application close codes sent on the room socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    Unauthorized,
    Abandoned,
    DuplicateSession,
    RoomNotFound,
    Internal,
}

impl CloseCode {
    pub fn code(&self) -> u16 {
        match self {
            Self::Unauthorized => 4001,
            Self::Abandoned => 4002,
            Self::DuplicateSession => 4003,
            Self::RoomNotFound => 4004,
            Self::Internal => 4005,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Abandoned => "ABANDONED",
            Self::DuplicateSession => "DUPLICATE_SESSION",
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn frame(&self, reason: &str) -> CloseFrame {
        CloseFrame { code: self.code(), reason: reason.to_owned().into() }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

/// Terminates a socket before room admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    pub code: CloseCode,
    pub message: String,
}

impl AuthError {
    pub fn new(code: CloseCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(CloseCode::Unauthorized, message)
    }

    pub fn duplicate_session(message: impl Into<String>) -> Self {
        Self::new(CloseCode::DuplicateSession, message)
    }

    pub fn room_not_found(message: impl Into<String>) -> Self {
        Self::new(CloseCode::RoomNotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CloseCode::Internal, message)
    }

    pub fn close_frame(&self) -> CloseFrame {
        self.code.frame(&self.message)
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AuthError {}

/// Error codes for the REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    Unauthorized,
    BadRequest,
    Forbidden,
    RoomNotFound,
    Internal,
}

impl ApiError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::Forbidden => 403,
            Self::RoomNotFound => 404,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::Forbidden => "FORBIDDEN",
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Why an event pushed through the REST entry point was not applied.
#[derive(Debug)]
pub enum DispatchError {
    /// The event is facilitator-only and the caller is not one.
    NotFacilitator(anyhow::Error),
    /// The handler rejected the event.
    Rejected(anyhow::Error),
    /// No handler is registered for the event type.
    UnknownEvent(String),
}

impl DispatchError {
    pub fn api_error(&self) -> ApiError {
        match self {
            Self::NotFacilitator(_) => ApiError::Forbidden,
            Self::Rejected(_) | Self::UnknownEvent(_) => ApiError::BadRequest,
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFacilitator(e) => write!(f, "facilitator required: {e}"),
            Self::Rejected(e) => write!(f, "event rejected: {e}"),
            Self::UnknownEvent(kind) => write!(f, "unknown event type: {kind}"),
        }
    }
}

impl std::error::Error for DispatchError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
