//! Unified error taxonomy (spec §7).
//!
//! `AppError` is the one type every service-layer function returns. The
//! mapping to HTTP status codes and to JSON-RPC error codes each happen in
//! exactly one place, below, so the REST and MCP surfaces never disagree
//! about what a given failure means.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    UpstreamUnavailable,
    Store,
    Protocol,
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind, code: code.into(), message: message.into() }
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, code, message)
    }

    pub fn upstream_unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamUnavailable, code, message)
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Store, "store.internal", message)
    }

    pub fn protocol(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, code, message)
    }

    pub fn http_status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Store => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Protocol => StatusCode::BAD_REQUEST,
        }
    }

    /// JSON-RPC error code per the §7/§4.F.2 taxonomy. Envelope-level
    /// protocol errors (parse/method-not-found) are constructed directly by
    /// the MCP dispatcher and do not go through this path.
    pub fn json_rpc_code(&self) -> i64 {
        match self.kind {
            ErrorKind::Store => -32000,
            ErrorKind::NotFound => -32001,
            ErrorKind::Conflict => -32002,
            ErrorKind::UpstreamUnavailable => -32003,
            ErrorKind::Validation => -32602,
            ErrorKind::Protocol => -32600,
        }
    }

    /// Detail surfaced to clients; the internal message is logged in full
    /// beforehand by the caller, never re-exposed verbatim for store errors.
    pub fn public_message(&self) -> String {
        match self.kind {
            ErrorKind::Store => "an internal error occurred".to_string(),
            _ => self.message.clone(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "unhandled store error");
        AppError::store(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "sqlite error");
        AppError::store(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body = ErrorBody {
            error: ErrorDetail { code: self.code.clone(), message: self.public_message(), detail: None },
        };
        (status, Json(body)).into_response()
    }
}
