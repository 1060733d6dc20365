//! OAuth token endpoint interactions
//!
//! Code exchange and refresh POST to `/oauth/token`; revocation POSTs to
//! `/oauth/revoke`. All three authenticate the client with HTTP Basic
//! (`client_id:client_secret`) and send form-encoded bodies.
//!
//! These functions do not check CSRF state; `SsoClient::exchange_code` does
//! that before calling `exchange_code` here.

use std::time::{Duration, SystemTime};

use common::Secret;
use serde::Deserialize;
use tracing::debug;

use crate::config::{Endpoints, SsoConfig};
use crate::error::{Result, check_response, require_non_empty, transport};

const EXCHANGE: &str = "token exchange";
const REFRESH: &str = "token refresh";
const REVOKE: &str = "token revocation";

/// Tokens returned by the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time. Token values
/// are redacted in Debug output.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: Secret<String>,
    #[serde(default)]
    pub refresh_token: Option<Secret<String>>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenSet {
    /// Absolute expiry given the time the response was received.
    ///
    /// `None` when the provider gave no lifetime or one too large to represent.
    pub fn expires_at(&self, issued_at: SystemTime) -> Option<SystemTime> {
        self.expires_in
            .and_then(|secs| issued_at.checked_add(Duration::from_secs(secs)))
    }
}

/// Which kind of token a revocation request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

impl TokenTypeHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenTypeHint::AccessToken => "access_token",
            TokenTypeHint::RefreshToken => "refresh_token",
        }
    }
}

impl std::str::FromStr for TokenTypeHint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "access_token" | "access" => Ok(TokenTypeHint::AccessToken),
            "refresh_token" | "refresh" => Ok(TokenTypeHint::RefreshToken),
            other => Err(format!("unknown token type hint: {other}")),
        }
    }
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code(
    http: &reqwest::Client,
    endpoints: &Endpoints,
    config: &SsoConfig,
    code: &str,
) -> Result<TokenSet> {
    require_non_empty("code", code)?;

    let response = http
        .post(endpoints.token.clone())
        .basic_auth(&config.client_id, Some(config.client_secret.expose()))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| transport(EXCHANGE, e))?;

    let tokens = check_response(EXCHANGE, response)
        .await?
        .json::<TokenSet>()
        .await
        .map_err(|e| transport(EXCHANGE, e))?;
    debug!(expires_in = ?tokens.expires_in, "authorization code exchanged");
    Ok(tokens)
}

/// Obtain a fresh access token with a refresh token.
pub async fn refresh_token(
    http: &reqwest::Client,
    endpoints: &Endpoints,
    config: &SsoConfig,
    refresh_token: &str,
) -> Result<TokenSet> {
    require_non_empty("refresh_token", refresh_token)?;

    let response = http
        .post(endpoints.token.clone())
        .basic_auth(&config.client_id, Some(config.client_secret.expose()))
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await
        .map_err(|e| transport(REFRESH, e))?;

    let tokens = check_response(REFRESH, response)
        .await?
        .json::<TokenSet>()
        .await
        .map_err(|e| transport(REFRESH, e))?;
    debug!(expires_in = ?tokens.expires_in, "access token refreshed");
    Ok(tokens)
}

/// Revoke an access or refresh token. Any 2xx counts as success.
pub async fn revoke_token(
    http: &reqwest::Client,
    endpoints: &Endpoints,
    config: &SsoConfig,
    token: &str,
    hint: TokenTypeHint,
) -> Result<()> {
    require_non_empty("token", token)?;

    let response = http
        .post(endpoints.revoke.clone())
        .basic_auth(&config.client_id, Some(config.client_secret.expose()))
        .form(&[("token", token), ("token_type_hint", hint.as_str())])
        .send()
        .await
        .map_err(|e| transport(REVOKE, e))?;

    check_response(REVOKE, response).await?;
    debug!(hint = hint.as_str(), "token revoked");
    Ok(())
}
