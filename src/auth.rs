//! Shared-key bearer authentication for the `/v1` and `/api` routes.
//!
//! With no key configured every request passes. Otherwise the caller must send
//! `Authorization: Bearer <key>`; an `sk-` prefix on either side is ignored.

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use regex::Regex;
use serde_json::json;
use std::sync::{Arc, LazyLock};
use subtle::ConstantTimeEq;
use tracing::debug;

static BEARER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Bearer\s+(?:sk-)?(.+)$").expect("valid bearer pattern"));

/// The key callers must present, if any.
#[derive(Clone, Default)]
pub struct ApiKeyAuth {
    key: Option<Arc<str>>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthFailure {
    MissingHeader,
    BadFormat,
    WrongKey,
}

impl AuthFailure {
    fn message(&self) -> &'static str {
        match self {
            Self::MissingHeader => "Missing API key in Authorization header",
            Self::BadFormat => "Invalid Authorization header format",
            Self::WrongKey => "Invalid API key",
        }
    }
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": self.message() }))).into_response()
    }
}

impl ApiKeyAuth {
    /// An empty key disables the check.
    pub fn new(key: Option<String>) -> Self {
        let key = key
            .map(|k| strip_sk(k.trim()).to_string())
            .filter(|k| !k.is_empty())
            .map(Arc::from);
        Self { key }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Check an `Authorization` header value against the configured key.
    pub fn check(&self, header: Option<&str>) -> Result<(), AuthFailure> {
        let Some(expected) = &self.key else {
            return Ok(());
        };
        let header = header.ok_or(AuthFailure::MissingHeader)?;
        let provided = BEARER
            .captures(header.trim())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or(AuthFailure::BadFormat)?;
        if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(AuthFailure::WrongKey)
        }
    }
}

fn strip_sk(key: &str) -> &str {
    match key.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("sk-") => &key[3..],
        _ => key,
    }
}

pub async fn require_api_key(
    State(auth): State<ApiKeyAuth>,
    request: Request,
    next: Next,
) -> Response {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().unwrap_or_default());
    match auth.check(value) {
        Ok(()) => next.run(request).await,
        Err(failure) => {
            debug!(path = %request.uri().path(), reason = ?failure, "rejected request");
            failure.into_response()
        }
    }
}
