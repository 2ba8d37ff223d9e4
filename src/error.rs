//! Unified application error model and mapping helpers.
//! Frontends (HTTP and WebSocket) report failures through `AppError` so remote callers
//! only ever see the coarse kinds below, never which sub-check failed.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::identity::{AccountError, AdmissionError, RegistryError, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    Conflict { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    Unavailable { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Unavailable { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Unavailable { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn unavailable<S: Into<String>>(code: S, msg: S) -> Self { AppError::Unavailable { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::Conflict { .. } => 409,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::Unavailable { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }

    /// WebSocket close code used when a realtime connection is refused or dropped.
    /// 4401/4403 mirror the HTTP statuses in the private-use range.
    pub fn ws_close_code(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 1008,
            AppError::Auth { .. } => 4401,
            AppError::Forbidden { .. } => 4403,
            AppError::Conflict { .. } | AppError::Internal { .. } => 1011,
            AppError::Unavailable { .. } => 1013,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::InvalidCredential => AppError::auth("invalid_credential", "Token not valid"),
            AdmissionError::Forbidden => AppError::forbidden("forbidden", "insufficient role"),
            AdmissionError::Cancelled => AppError::unavailable("cancelled", "request aborted"),
            AdmissionError::StoreUnavailable(_) => AppError::unavailable("unavailable", "identity store unavailable"),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::user("bad_request", rejection.body_text())
    }
}

impl From<RegistryError> for AppError {
    fn from(_: RegistryError) -> Self {
        AppError::internal("connection_refused", "connection refused")
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => AppError::conflict("conflict", "User already exists"),
            StoreError::Cancelled => AppError::unavailable("cancelled", "request aborted"),
            StoreError::Unavailable(_) => AppError::internal("internal", "Please check server logs"),
        }
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidCredentials => AppError::auth("invalid_credential", "Invalid credentials"),
            AccountError::Store(e) => e.into(),
            AccountError::Token(e) => {
                tracing::error!(target: "auth", "token minting failed: {e}");
                AppError::internal("internal", "Please check server logs")
            }
            AccountError::Hash(e) => {
                tracing::error!(target: "auth", "password hashing failed: {e}");
                AppError::internal("internal", "Please check server logs")
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: details stay in the logs
        tracing::error!(target: "app", "internal error: {err:#}");
        AppError::internal("internal", "Please check server logs")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "status": "error",
            "code": self.code_str(),
            "message": self.message(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
        assert_eq!(AppError::conflict("conflict", "dup").http_status(), 409);
        assert_eq!(AppError::auth("auth", "no").http_status(), 401);
        assert_eq!(AppError::forbidden("forbidden", "no").http_status(), 403);
        assert_eq!(AppError::unavailable("unavailable", "later").http_status(), 503);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
    }

    #[test]
    fn admission_errors_collapse_to_three_kinds() {
        let invalid: AppError = AdmissionError::InvalidCredential.into();
        assert_eq!(invalid.http_status(), 401);
        assert_eq!(invalid.ws_close_code(), 4401);

        let forbidden: AppError = AdmissionError::Forbidden.into();
        assert_eq!(forbidden.http_status(), 403);
        assert_eq!(forbidden.ws_close_code(), 4403);

        let cancelled: AppError = AdmissionError::Cancelled.into();
        assert_eq!(cancelled.http_status(), 503);
        assert_eq!(cancelled.code_str(), "cancelled");
    }

    #[test]
    fn registry_failure_is_connection_refused() {
        let err: AppError = RegistryError::Inconsistent("dangling index".into()).into();
        assert_eq!(err.code_str(), "connection_refused");
        // internal detail never reaches the caller
        assert!(!err.message().contains("dangling"));
    }
}
