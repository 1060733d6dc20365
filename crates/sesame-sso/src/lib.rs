//! Sesame SSO client library
//!
//! OAuth 2.0 / OpenID Connect client for the Sesame single-sign-on provider,
//! meant for trusted backend processes. It builds authorization URLs with
//! single-use CSRF states, exchanges codes for tokens, and wraps the refresh,
//! revocation, userinfo and credentials endpoints.
//!
//! Login flow:
//! 1. `SsoClient::authorization_url()` issues a state via `state::generate_state()`
//!    and records it in the `StateStore`
//! 2. The user authenticates; the provider redirects back with `code` + `state`
//! 3. `SsoClient::exchange_code()` consumes the state with `StateStore::take()`
//!    and, only if it was live, calls the token endpoint
//! 4. `SsoClient::sesame_credentials()` yields the region used to reach the
//!    downstream API (`userinfo::api_base_url()`)
//!
//! The bundled `MemoryStore` sweeps expired states in the background; other
//! backends implement `StateStore` and must provide an atomic `take`.

pub mod authorize;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod state;
pub mod store;
mod sweep;
pub mod token;
pub mod userinfo;

pub use authorize::{AuthorizationRequest, AuthorizationUrl};
pub use client::SsoClient;
pub use common::Secret;
pub use config::{Endpoints, SsoConfig};
pub use error::{Error, Result};
pub use state::generate_state;
pub use store::{EvictionPolicy, MemoryStore, StateData, StateStore, StoreConfig, StoreError};
pub use token::{TokenSet, TokenTypeHint};
pub use userinfo::{SesameCredentials, UserInfo, api_base_url};
