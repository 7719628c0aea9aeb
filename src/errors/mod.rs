// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Errors returned by the HTTP intake server.
//!
//! Every error carries a reference code that is logged together with the
//! internal details, so a report from the add-on can be matched with the
//! daemon log. Internal details never reach the response body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use rand::Rng;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Generate a unique error reference code.
/// Format: ERR-YYYYMMDD-XXXXXX (e.g., ERR-20240115-A3F8K2)
pub fn generate_reference_code() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let date = Utc::now().format("%Y%m%d");
    let mut rng = rand::thread_rng();
    let random: String = (0..6)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("ERR-{}-{}", date, random)
}

/// User-facing error of an intake request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "error_type", rename_all = "snake_case")]
pub enum ApiError {
    /// Malformed or invalid request (400)
    InvalidRequest {
        message: String,
        reference: String,
        field: Option<String>,
    },

    /// Unknown task (404)
    NotFound { message: String, reference: String },

    /// Request body too large (413)
    PayloadTooLarge { message: String, reference: String },
}

impl ApiError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    pub fn reference(&self) -> &str {
        match self {
            ApiError::InvalidRequest { reference, .. }
            | ApiError::NotFound { reference, .. }
            | ApiError::PayloadTooLarge { reference, .. } => reference,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::InvalidRequest { message, .. }
            | ApiError::NotFound { message, .. }
            | ApiError::PayloadTooLarge { message, .. } => message,
        }
    }

    /// A request that failed validation. `internal_details` is only logged.
    pub fn invalid_request(
        user_message: &str,
        field: Option<&str>,
        internal_details: Option<&str>,
    ) -> Self {
        let reference = generate_reference_code();
        tracing::warn!(
            reference = %reference,
            field = ?field,
            internal_details = %internal_details.map(sanitize_error_details).unwrap_or_default(),
            "Invalid request: {}",
            user_message
        );

        Self::InvalidRequest {
            message: user_message.to_string(),
            reference,
            field: field.map(str::to_string),
        }
    }

    pub fn not_found(resource: &str) -> Self {
        let reference = generate_reference_code();
        tracing::debug!(reference = %reference, resource = %resource, "Resource not found");

        Self::NotFound {
            message: format!("The requested {} was not found.", resource),
            reference,
        }
    }

    pub fn payload_too_large(max_size: usize) -> Self {
        let reference = generate_reference_code();
        tracing::warn!(reference = %reference, max_size, "Payload too large");

        Self::PayloadTooLarge {
            message: format!("Request body too large. Maximum size is {} bytes.", max_size),
            reference,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (reference {})", self.message(), self.reference())
    }
}

impl std::error::Error for ApiError {}

/// JSON body of an error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ApiError,
    pub status: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let response = ErrorResponse {
            status: status.as_u16(),
            error: self,
        };

        let body = serde_json::to_string(&response).unwrap_or_else(|_| {
            r#"{"error":{"message":"An unexpected error occurred.","reference":"ERR-FALLBACK"},"status":500}"#.to_string()
        });

        (status, [("content-type", "application/json")], body).into_response()
    }
}

/// Secrets that may show up in rejected request bodies.
static SANITIZE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"Bearer [a-zA-Z0-9-._~+/]+=*", "Bearer [TOKEN_REDACTED]"),
        (r#"("api_key"\s*:\s*")[^"]*"#, "${1}[REDACTED]"),
        (r"\b[A-Za-z0-9]{40,}\b", "[SECRET_REDACTED]"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
        Ok(re) => Some((re, replacement)),
        Err(e) => {
            tracing::error!("Invalid sanitize pattern {}: {}", pattern, e);
            None
        }
    })
    .collect()
});

/// Strip API keys and tokens from text headed for the log.
pub fn sanitize_error_details(details: &str) -> String {
    SANITIZE_PATTERNS
        .iter()
        .fold(details.to_string(), |text, (re, replacement)| {
            re.replace_all(&text, *replacement).into_owned()
        })
}

pub type ApiResult<T> = Result<T, ApiError>;
