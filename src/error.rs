//! Unified error taxonomy and HTTP mapping.
//! Every component failure is folded into `ApiError` at the operation
//! boundary; raw platform errors never reach a response body. Containment
//! violations and filesystem permission failures share one opaque client
//! message so error bodies cannot be used to probe tree structure.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// A virtual path resolved to a location outside the configured root.
    #[error("forbidden")]
    OutsideRoot,
    /// The filesystem denied access to a path that is inside the root.
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("already exists")]
    AlreadyExists,
    #[error("name conflict")]
    NameConflict,
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    /// Unexpected I/O failure. The source is logged server-side; the client
    /// only ever sees the generic message.
    #[error("internal error")]
    Io(#[source] std::io::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    /// Map to HTTP status code. Duplicate-target mutations count as malformed
    /// requests, not conflicts, so both land on 400.
    pub fn http_status(&self) -> StatusCode {
        match self {
            ApiError::OutsideRoot | ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound | ApiError::NotADirectory => StatusCode::NOT_FOUND,
            ApiError::AlreadyExists | ApiError::NameConflict | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ApiError::NotFound,
            // A file sitting where a directory component was expected reads
            // as a missing resource, same as the original path not existing.
            std::io::ErrorKind::NotADirectory => ApiError::NotFound,
            std::io::ErrorKind::PermissionDenied => ApiError::Forbidden,
            std::io::ErrorKind::AlreadyExists => ApiError::AlreadyExists,
            _ => ApiError::Io(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Io(source) = &self {
            tracing::error!("request failed with I/O error: {source}");
        }
        let status = self.http_status();
        let body = Json(json!({ "error": self.to_string() }));
        if matches!(self, ApiError::Unauthorized) {
            let headers = [(header::WWW_AUTHENTICATE, "Basic realm=\"atticd\"")];
            (status, headers, body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}
