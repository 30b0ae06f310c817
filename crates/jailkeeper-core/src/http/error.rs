//! Mapping from core errors to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use super::types::ErrorResponse;
use crate::allowlist::AllowListError;
use crate::channel::ChannelError;
use crate::daemon::DaemonError;
use crate::engine::ReconcileError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error(transparent)]
    Daemon(#[from] DaemonError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    AllowList(#[from] AllowListError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::Daemon(e) => match e {
                DaemonError::Channel(ChannelError::Unavailable(_)) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "daemon_unavailable")
                }
                DaemonError::Channel(ChannelError::Daemon { .. }) => {
                    (StatusCode::BAD_GATEWAY, "daemon_error")
                }
                DaemonError::Channel(ChannelError::Io(_)) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "channel_io")
                }
                DaemonError::Parse(_) => (StatusCode::BAD_GATEWAY, "unexpected_response"),
                DaemonError::Command(_) | DaemonError::InvalidAddress(_) => {
                    (StatusCode::BAD_REQUEST, "validation")
                }
            },
            Self::Reconcile(ReconcileError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "validation")
            }
            Self::Reconcile(ReconcileError::Filesystem(e)) | Self::Store(e) => store_status(e),
            Self::AllowList(AllowListError::InvalidEntries(_)) => {
                (StatusCode::BAD_REQUEST, "validation")
            }
            Self::AllowList(AllowListError::Store(e)) => store_status(e),
            Self::AllowList(AllowListError::Malformed { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "filesystem")
            }
        }
    }
}

fn store_status(e: &StoreError) -> (StatusCode, &'static str) {
    match e {
        StoreError::InvalidName(_) => (StatusCode::BAD_REQUEST, "validation"),
        StoreError::Io { .. } | StoreError::Fragment(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "filesystem")
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.classify();
        if status.is_server_error() {
            warn!(%status, error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: self.to_string(),
            kind: kind.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
