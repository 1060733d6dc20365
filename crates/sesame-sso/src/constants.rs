//! Sesame SSO protocol constants and defaults
//!
//! Endpoint paths are relative to the configured SSO base address. Defaults
//! apply when the caller leaves the corresponding option unset.

use std::time::Duration;

/// Browser-facing authorization endpoint (public, no client auth)
pub const AUTHORIZE_PATH: &str = "/oauth/authorize";

/// Token endpoint for code exchange and refresh (Basic client auth)
pub const TOKEN_PATH: &str = "/oauth/token";

/// Token revocation endpoint (Basic client auth)
pub const REVOKE_PATH: &str = "/oauth/revoke";

/// OpenID userinfo endpoint (Bearer access token)
pub const USERINFO_PATH: &str = "/api/oauth/userinfo";

/// Provider-specific credentials endpoint (Bearer access token)
pub const CREDENTIALS_PATH: &str = "/api/oauth/sesame-token";

/// Random bytes per CSRF state value; hex output is twice as long.
pub const STATE_BYTES: usize = 32;

/// How long an issued state stays valid.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(600);

/// Upper bound on outstanding states held by the in-memory store.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Background sweep period (clamped to the TTL if the TTL is shorter).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Per-request timeout for calls to the SSO provider.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Downstream API host template; `{region}` is the lowercased region.
pub const API_BASE_TEMPLATE: &str = "https://back-{region}.sesametime.com";
