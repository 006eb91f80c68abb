// HTTP error mapping for the API.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use clandraw_core::archive::ArchiveError;
use clandraw_core::auth::AuthError;
use clandraw_core::import::ImportError;
use clandraw_core::roster::{DrawCountError, RosterError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Validation(String),

    #[error("upload exceeds the size limit")]
    PayloadTooLarge,

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(_) => StatusCode::FORBIDDEN,
            ApiError::Validation(_) | ApiError::Import(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Archive(e) => match e {
                ArchiveError::Auth(_) | ArchiveError::ForbiddenPath(_) => StatusCode::FORBIDDEN,
                ArchiveError::NotAnImage { .. } => StatusCode::BAD_REQUEST,
                ArchiveError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                ArchiveError::NotFound(_) => StatusCode::NOT_FOUND,
                ArchiveError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Roster(e) => match e {
                RosterError::Auth(_) => StatusCode::FORBIDDEN,
                RosterError::Unavailable => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DrawCountError> for ApiError {
    fn from(e: DrawCountError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::Validation(e.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}
