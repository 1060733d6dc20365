//! `SsoClient`: the entry point tying state handling to provider calls
//!
//! Flow:
//! 1. `authorization_url()` issues a state, stores it, returns URL + state
//! 2. the provider redirects back with `code` and `state`
//! 3. `exchange_code()` consumes the state (one-time) and only then calls
//!    the token endpoint
//! 4. `refresh_token()`, `revoke_token()`, `userinfo()` and
//!    `sesame_credentials()` are direct provider calls

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::authorize::{AuthorizationRequest, AuthorizationUrl, build_authorization_url};
use crate::config::{Endpoints, SsoConfig};
use crate::error::{Error, Result, require_non_empty};
use crate::state::generate_state;
use crate::store::{MemoryStore, StateData, StateStore};
use crate::token::{self, TokenSet, TokenTypeHint};
use crate::userinfo::{self, SesameCredentials, UserInfo};

/// OAuth 2.0 / OpenID Connect client for the Sesame SSO provider.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct SsoClient {
    config: SsoConfig,
    endpoints: Endpoints,
    http: reqwest::Client,
    store: Arc<dyn StateStore>,
}

impl SsoClient {
    /// Build a client backed by an in-memory state store.
    ///
    /// Fails with `Error::Config` if a required field is missing. Call from
    /// inside a tokio runtime so the store's background sweep can start.
    pub fn new(config: SsoConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(MemoryStore::new(config.store.clone()));
        Self::with_store(config, store)
    }

    /// Build a client with a caller-provided state store.
    pub fn with_store(config: SsoConfig, store: Arc<dyn StateStore>) -> Result<Self> {
        config.validate()?;
        let endpoints = Endpoints::from_base(&config.base_url)?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("building HTTP client: {e}")))?;

        info!(
            base_url = %config.base_url,
            client_id = %config.client_id,
            timeout_secs = config.timeout.as_secs(),
            "sso client initialized"
        );

        Ok(Self {
            config,
            endpoints,
            http,
            store,
        })
    }

    pub fn config(&self) -> &SsoConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// The state store shared with this client.
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Issue a state and build the login URL that carries it.
    pub async fn authorization_url(
        &self,
        request: AuthorizationRequest,
    ) -> Result<AuthorizationUrl> {
        self.authorization_url_with_data(request, StateData::new())
            .await
    }

    /// Like `authorization_url`, storing `data` alongside the state.
    pub async fn authorization_url_with_data(
        &self,
        request: AuthorizationRequest,
        data: StateData,
    ) -> Result<AuthorizationUrl> {
        let state = generate_state();
        self.store.set(&state, data, None).await?;
        crate::metrics::record_state_issued();

        let url = build_authorization_url(
            &self.endpoints.authorize,
            &self.config.client_id,
            &self.config.redirect_uri,
            self.config.scope.as_deref(),
            &state,
            &request,
        );
        debug!(
            extra_params = request.extra_params.len(),
            "authorization url issued"
        );
        Ok(AuthorizationUrl { url, state })
    }

    /// Consume a callback state. `true` only for the first check of a live
    /// state this client issued.
    pub async fn validate_state(&self, state: &str) -> Result<bool> {
        Ok(self.consume_state(state).await?.is_some())
    }

    /// Consume a callback state, returning the data stored with it.
    pub async fn consume_state(&self, state: &str) -> Result<Option<StateData>> {
        if state.is_empty() {
            crate::metrics::record_validation(false);
            return Ok(None);
        }
        let data = self.store.take(state).await?;
        crate::metrics::record_validation(data.is_some());
        if data.is_none() {
            warn!("rejected unknown, expired or replayed state");
        }
        Ok(data)
    }

    /// Exchange an authorization code after validating its state.
    ///
    /// An invalid state fails with `Error::InvalidState` before any request
    /// is sent. A valid state is consumed even if the exchange then fails.
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<TokenSet> {
        require_non_empty("code", code)?;
        if !self.validate_state(state).await? {
            return Err(Error::InvalidState);
        }
        token::exchange_code(&self.http, &self.endpoints, &self.config, code).await
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet> {
        token::refresh_token(&self.http, &self.endpoints, &self.config, refresh_token).await
    }

    pub async fn revoke_token(&self, token: &str, hint: TokenTypeHint) -> Result<()> {
        token::revoke_token(&self.http, &self.endpoints, &self.config, token, hint).await
    }

    pub async fn userinfo(&self, access_token: &str) -> Result<UserInfo> {
        userinfo::fetch_userinfo(&self.http, &self.endpoints, access_token).await
    }

    pub async fn sesame_credentials(&self, access_token: &str) -> Result<SesameCredentials> {
        userinfo::fetch_sesame_credentials(&self.http, &self.endpoints, access_token).await
    }

    /// Stop the state store's background work. Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.store.stop();
    }
}

impl std::fmt::Debug for SsoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StoreError, StoreFuture};
    use mockito::{Matcher, Server};
    use reqwest::Url;
    use tokio::time::Instant;

    fn test_config(base: &str) -> SsoConfig {
        SsoConfig::new(base, "client-1", "s3cret", "https://app.example.com/cb")
    }

    fn param(url: &str, name: &str) -> Option<String> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    #[tokio::test]
    async fn missing_client_id_fails_at_construction() {
        let mut config = test_config("https://sso.example.com");
        config.client_id = String::new();
        let err = SsoClient::new(config).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn login_url_without_scope_or_extras() {
        let client = SsoClient::new(test_config("https://sso.example.com")).unwrap();
        let login = client
            .authorization_url(AuthorizationRequest::new())
            .await
            .unwrap();

        assert_eq!(param(&login.url, "client_id").as_deref(), Some("client-1"));
        assert_eq!(
            param(&login.url, "redirect_uri").as_deref(),
            Some("https://app.example.com/cb")
        );
        assert_eq!(param(&login.url, "response_type").as_deref(), Some("code"));
        assert_eq!(param(&login.url, "state"), Some(login.state.clone()));
        assert!(param(&login.url, "scope").is_none());
        assert_eq!(login.state.len(), 64);
        assert!(client.store().has(&login.state).await.unwrap());
    }

    #[tokio::test]
    async fn login_url_with_scope_and_prompt() {
        let client = SsoClient::new(test_config("https://sso.example.com")).unwrap();
        let login = client
            .authorization_url(
                AuthorizationRequest::new()
                    .scope("openid profile")
                    .param("prompt", "login"),
            )
            .await
            .unwrap();

        assert_eq!(
            param(&login.url, "scope").as_deref(),
            Some("openid profile")
        );
        assert!(login.url.contains("scope=openid+profile"));
        assert_eq!(param(&login.url, "prompt").as_deref(), Some("login"));
    }

    #[tokio::test]
    async fn issued_states_are_distinct() {
        let client = SsoClient::new(test_config("https://sso.example.com")).unwrap();
        let a = client
            .authorization_url(AuthorizationRequest::new())
            .await
            .unwrap();
        let b = client
            .authorization_url(AuthorizationRequest::new())
            .await
            .unwrap();
        assert_ne!(a.state, b.state);
    }

    #[tokio::test]
    async fn state_validates_once() {
        let client = SsoClient::new(test_config("https://sso.example.com")).unwrap();
        let login = client
            .authorization_url(AuthorizationRequest::new())
            .await
            .unwrap();

        assert!(client.validate_state(&login.state).await.unwrap());
        assert!(!client.validate_state(&login.state).await.unwrap());
        assert!(!client.validate_state(&login.state).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_and_empty_states_fail() {
        let client = SsoClient::new(test_config("https://sso.example.com")).unwrap();
        assert!(!client.validate_state("never-issued").await.unwrap());
        assert!(!client.validate_state("").await.unwrap());
    }

    #[tokio::test]
    async fn stored_data_comes_back_on_consume() {
        let client = SsoClient::new(test_config("https://sso.example.com")).unwrap();
        let login = client
            .authorization_url_with_data(
                AuthorizationRequest::new(),
                StateData::new().with("return_to", "/settings"),
            )
            .await
            .unwrap();

        let data = client.consume_state(&login.state).await.unwrap().unwrap();
        assert_eq!(data.extra["return_to"], "/settings");
    }

    #[tokio::test]
    async fn exchange_with_unissued_state_makes_no_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .expect(0)
            .create_async()
            .await;

        let client = SsoClient::new(test_config(&server.url())).unwrap();
        let err = client
            .exchange_code("code-1", "forged-state")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidState), "got {err:?}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn exchange_succeeds_and_state_cannot_be_replayed() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "code-1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"at_1","refresh_token":"rt_1","expires_in":3600,"token_type":"Bearer"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = SsoClient::new(test_config(&server.url())).unwrap();
        let login = client
            .authorization_url(AuthorizationRequest::new())
            .await
            .unwrap();

        let tokens = client.exchange_code("code-1", &login.state).await.unwrap();
        assert_eq!(tokens.access_token.expose(), "at_1");
        assert_eq!(tokens.refresh_token.as_ref().unwrap().expose(), "rt_1");
        assert_eq!(tokens.expires_in, Some(3600));
        assert_eq!(tokens.token_type, "Bearer");

        let err = client
            .exchange_code("code-1", &login.state)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_code_does_not_burn_state() {
        let client = SsoClient::new(test_config("http://127.0.0.1:9")).unwrap();
        let login = client
            .authorization_url(AuthorizationRequest::new())
            .await
            .unwrap();

        let err = client.exchange_code("", &login.state).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(client.validate_state(&login.state).await.unwrap());
    }

    #[tokio::test]
    async fn expired_state_is_rejected() {
        let client = SsoClient::new(test_config("https://sso.example.com")).unwrap();
        let past = Instant::now() - std::time::Duration::from_millis(1);
        client
            .store()
            .set("stale", StateData::new(), Some(past))
            .await
            .unwrap();

        let err = client.exchange_code("code", "stale").await.unwrap_err();
        assert!(matches!(err, Error::InvalidState));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callbacks_have_one_winner() {
        let client = Arc::new(SsoClient::new(test_config("https://sso.example.com")).unwrap());
        let login = client
            .authorization_url(AuthorizationRequest::new())
            .await
            .unwrap();

        let mut handles = vec![];
        for _ in 0..16 {
            let client = client.clone();
            let state = login.state.clone();
            handles.push(tokio::spawn(async move {
                client.validate_state(&state).await.unwrap()
            }));
        }

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    /// A store whose backend is always down.
    struct UnreachableStore;

    impl StateStore for UnreachableStore {
        fn set<'a>(
            &'a self,
            _key: &'a str,
            _value: StateData,
            _expires_at: Option<Instant>,
        ) -> StoreFuture<'a, ()> {
            Box::pin(async { Err(StoreError::Backend("connection refused".into())) })
        }

        fn get<'a>(&'a self, _key: &'a str) -> StoreFuture<'a, Option<StateData>> {
            Box::pin(async { Err(StoreError::Backend("connection refused".into())) })
        }

        fn has<'a>(&'a self, _key: &'a str) -> StoreFuture<'a, bool> {
            Box::pin(async { Err(StoreError::Backend("connection refused".into())) })
        }

        fn delete<'a>(&'a self, _key: &'a str) -> StoreFuture<'a, ()> {
            Box::pin(async { Err(StoreError::Backend("connection refused".into())) })
        }

        fn take<'a>(&'a self, _key: &'a str) -> StoreFuture<'a, Option<StateData>> {
            Box::pin(async { Err(StoreError::Backend("connection refused".into())) })
        }
    }

    #[tokio::test]
    async fn store_failures_propagate_instead_of_reading_as_absent() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .expect(0)
            .create_async()
            .await;

        let client =
            SsoClient::with_store(test_config(&server.url()), Arc::new(UnreachableStore)).unwrap();

        let err = client
            .authorization_url(AuthorizationRequest::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Backend(_))));

        let err = client.exchange_code("code", "state").await.unwrap_err();
        assert!(
            matches!(err, Error::Store(_)),
            "backend outage must not look like a CSRF failure: {err:?}"
        );
        mock.assert_async().await;
        client.shutdown();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_store_keeps_working() {
        let client = SsoClient::new(test_config("https://sso.example.com")).unwrap();
        client.shutdown();
        client.shutdown();

        let login = client
            .authorization_url(AuthorizationRequest::new())
            .await
            .unwrap();
        assert!(client.validate_state(&login.state).await.unwrap());
    }

    #[tokio::test]
    async fn debug_output_hides_secret() {
        let client = SsoClient::new(test_config("https://sso.example.com")).unwrap();
        let debug = format!("{client:?}");
        assert!(debug.contains("client-1"));
        assert!(!debug.contains("s3cret"));
    }

    #[tokio::test]
    async fn revoke_404_is_distinguished() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/oauth/revoke")
            .with_status(404)
            .create_async()
            .await;

        let client = SsoClient::new(test_config(&server.url())).unwrap();
        let err = client
            .revoke_token("at_1", TokenTypeHint::AccessToken)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EndpointNotFound { .. }));
        assert!(err.to_string().contains("endpoint not found"));
    }
}
