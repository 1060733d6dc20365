//! Authorization request URL construction
//!
//! The URL carries `client_id`, `redirect_uri`, `response_type=code`, the
//! freshly issued `state`, an optional `scope`, then any caller-supplied
//! parameters. A caller parameter with the same name as an earlier one
//! replaces it in place, so each key appears once.

use reqwest::Url;

/// Per-call options for an authorization URL.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationRequest {
    /// Overrides the configured default scope; `Some("")` requests no scope.
    pub scope: Option<String>,
    /// Extra query parameters such as `prompt` or `login_hint`.
    pub extra_params: Vec<(String, String)>,
}

impl AuthorizationRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.push((name.into(), value.into()));
        self
    }
}

/// A login URL and the state embedded in it.
///
/// The caller keeps `state` (e.g. in its session) to compare with the value
/// returned on the callback. Debug output redacts the state, including the
/// copy embedded in the URL query.
#[derive(Clone)]
pub struct AuthorizationUrl {
    pub url: String,
    pub state: String,
}

impl std::fmt::Debug for AuthorizationUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let url = if self.state.is_empty() {
            self.url.clone()
        } else {
            self.url.replace(&self.state, "[REDACTED]")
        };
        f.debug_struct("AuthorizationUrl")
            .field("url", &url)
            .field("state", &"[REDACTED]")
            .finish()
    }
}

/// Build the authorize URL for an already-stored `state`.
pub fn build_authorization_url(
    authorize_endpoint: &Url,
    client_id: &str,
    redirect_uri: &str,
    default_scope: Option<&str>,
    state: &str,
    request: &AuthorizationRequest,
) -> String {
    let mut params: Vec<(String, String)> = vec![
        ("client_id".into(), client_id.into()),
        ("redirect_uri".into(), redirect_uri.into()),
        ("response_type".into(), "code".into()),
        ("state".into(), state.into()),
    ];

    let scope = request
        .scope
        .as_deref()
        .or(default_scope)
        .map(str::trim)
        .filter(|scope| !scope.is_empty());
    if let Some(scope) = scope {
        params.push(("scope".into(), scope.into()));
    }

    for (name, value) in &request.extra_params {
        match params.iter_mut().find(|(existing, _)| existing == name) {
            Some(slot) => slot.1 = value.clone(),
            None => params.push((name.clone(), value.clone())),
        }
    }

    let mut url = authorize_endpoint.clone();
    url.query_pairs_mut().clear().extend_pairs(&params);
    url.into()
}
