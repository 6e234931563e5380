//! Shared-password Basic-Auth gate.
//! A single password is configured at startup (or not at all); every
//! request is checked independently, with no session state. The decoded
//! credential matches when it equals the password outright or when its
//! part after the first colon does, so clients may send any username.

use axum::http::HeaderMap;
use base64::Engine;

use crate::error::{ApiError, ApiResult};

/// Enforce the gate for one request. With no password configured this is
/// a no-op.
pub fn require(headers: &HeaderMap, password: Option<&str>) -> ApiResult<()> {
    let Some(expected) = password else {
        return Ok(());
    };
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if credential_matches(provided, expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn credential_matches(header: &str, expected: &str) -> bool {
    let Some((kind, value)) = header.split_once(' ') else {
        return false;
    };
    if kind != "Basic" {
        return false;
    }
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(value.trim()) else {
        return false;
    };
    let Ok(text) = String::from_utf8(decoded) else {
        return false;
    };
    text == expected || text.split_once(':').map(|(_, p)| p) == Some(expected)
}
