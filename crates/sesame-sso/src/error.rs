//! Error types for SSO client operations
//!
//! Provider responses are normalized here: every non-2xx reply becomes one
//! error carrying the operation label, HTTP status, the provider's error code
//! and a readable description. Nothing is retried.

use serde::Deserialize;

use crate::store::StoreError;

/// Longest slice of a raw response body quoted in an error description.
const MAX_BODY_EXCERPT: usize = 200;

/// Errors from SSO client operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    /// State missing, expired or already consumed. Callers typically match on
    /// this variant and send the user back to the login page.
    #[error("invalid or expired state parameter (possible CSRF)")]
    InvalidState,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{context} failed: {message}")]
    Transport {
        context: &'static str,
        message: String,
    },

    #[error("{context} failed: endpoint not found (HTTP 404)")]
    EndpointNotFound { context: &'static str },

    #[error("{context} failed{}: {description}", provider_detail(.status, .code))]
    Provider {
        context: &'static str,
        status: Option<u16>,
        code: Option<String>,
        description: String,
    },

    #[error("state store error: {0}")]
    Store(#[from] StoreError),
}

/// Result alias for SSO client operations.
pub type Result<T> = std::result::Result<T, Error>;

fn provider_detail(status: &Option<u16>, code: &Option<String>) -> String {
    match (status, code) {
        (Some(status), Some(code)) => format!(" (HTTP {status}, {code})"),
        (Some(status), None) => format!(" (HTTP {status})"),
        (None, Some(code)) => format!(" ({code})"),
        (None, None) => String::new(),
    }
}

/// OAuth error body (`error`/`error_description`) or a plain `message`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
}

/// Reject empty (or whitespace-only) required arguments before any I/O.
pub(crate) fn require_non_empty(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{name} must not be empty")));
    }
    Ok(())
}

/// Map a reqwest send/decode failure into a transport error.
pub(crate) fn transport(context: &'static str, err: reqwest::Error) -> Error {
    crate::metrics::record_provider_error(context);
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_decode() {
        format!("invalid response body: {err}")
    } else {
        format!("request failed: {err}")
    };
    Error::Transport { context, message }
}

/// Pass a successful response through; turn anything else into an error.
pub(crate) async fn check_response(
    context: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    crate::metrics::record_provider_error(context);
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(Error::EndpointNotFound { context });
    }

    let body = response.text().await.unwrap_or_default();
    Err(provider_error(context, status, &body))
}

fn provider_error(context: &'static str, status: reqwest::StatusCode, body: &str) -> Error {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let description = parsed
        .error_description
        .or(parsed.message)
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.chars().take(MAX_BODY_EXCERPT).collect())
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected response")
                .to_string()
        });

    Error::Provider {
        context,
        status: Some(status.as_u16()),
        code: parsed.error,
        description,
    }
}
