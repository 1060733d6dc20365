//! Client configuration and resolved provider endpoints

use std::time::Duration;

use common::Secret;
use reqwest::Url;

use crate::constants::{
    AUTHORIZE_PATH, CREDENTIALS_PATH, DEFAULT_REQUEST_TIMEOUT, REVOKE_PATH, TOKEN_PATH,
    USERINFO_PATH,
};
use crate::error::{Error, Result};
use crate::store::StoreConfig;

/// Static configuration for one registered SSO client.
///
/// `base_url`, `client_id`, `client_secret` and `redirect_uri` are required;
/// the rest have defaults (no scope, 10s timeout, default store tuning).
#[derive(Debug, Clone)]
pub struct SsoConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub redirect_uri: String,
    /// Scope used when a request does not override it; empty means none.
    pub scope: Option<String>,
    pub timeout: Duration,
    /// Tuning for the bundled in-memory state store.
    pub store: StoreConfig,
}

impl SsoConfig {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<Secret<String>>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scope: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            store: StoreConfig::default(),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_store_config(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Check required fields before anything touches the network.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("base_url", self.base_url.as_str()),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{name} is required")));
            }
        }
        if self.client_secret.expose().trim().is_empty() {
            return Err(Error::Config("client_secret is required".into()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Absolute provider URLs derived once from the base address.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub authorize: Url,
    pub token: Url,
    pub revoke: Url,
    pub userinfo: Url,
    pub credentials: Url,
}

impl Endpoints {
    /// Resolve every endpoint path against `base_url`.
    ///
    /// Paths are appended, not joined, so a base with a path prefix
    /// (`https://host/sso`) keeps it.
    pub fn from_base(base_url: &str) -> Result<Self> {
        let base = base_url.trim_end_matches('/');
        let endpoint = |path: &str| {
            Url::parse(&format!("{base}{path}"))
                .map_err(|e| Error::Config(format!("invalid base_url {base_url}: {e}")))
        };
        Ok(Self {
            authorize: endpoint(AUTHORIZE_PATH)?,
            token: endpoint(TOKEN_PATH)?,
            revoke: endpoint(REVOKE_PATH)?,
            userinfo: endpoint(USERINFO_PATH)?,
            credentials: endpoint(CREDENTIALS_PATH)?,
        })
    }
}
