//! Bearer-authenticated reads: userinfo claims and Sesame credentials
//!
//! Both endpoints take the user's access token. The credentials response
//! carries the region used to locate the downstream Sesame API.

use common::Secret;
use serde::Deserialize;
use tracing::debug;

use crate::config::Endpoints;
use crate::constants::API_BASE_TEMPLATE;
use crate::error::{Result, check_response, require_non_empty, transport};

const USERINFO: &str = "userinfo";
const CREDENTIALS: &str = "sesame credentials";

/// OpenID claims as returned by the provider.
pub type UserInfo = serde_json::Map<String, serde_json::Value>;

/// Provider-specific credentials for the downstream Sesame API.
///
/// Accepts both camelCase and snake_case field names; fields this type does
/// not model are kept in `extra`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SesameCredentials {
    #[serde(default, alias = "private_token")]
    pub private_token: Option<Secret<String>>,
    #[serde(default, alias = "public_token")]
    pub public_token: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default, alias = "associated_accounts")]
    pub associated_accounts: Vec<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SesameCredentials {
    /// Downstream API base URL for this account's region, if one was given.
    pub fn api_base_url(&self) -> Option<String> {
        self.region
            .as_deref()
            .map(str::trim)
            .filter(|region| !region.is_empty())
            .map(api_base_url)
    }
}

/// `https://back-<region lowercased>.sesametime.com`
pub fn api_base_url(region: &str) -> String {
    API_BASE_TEMPLATE.replace("{region}", &region.to_lowercase())
}

/// Fetch the userinfo claims for an access token.
pub async fn fetch_userinfo(
    http: &reqwest::Client,
    endpoints: &Endpoints,
    access_token: &str,
) -> Result<UserInfo> {
    require_non_empty("access_token", access_token)?;

    let response = http
        .get(endpoints.userinfo.clone())
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| transport(USERINFO, e))?;

    let claims = check_response(USERINFO, response)
        .await?
        .json::<UserInfo>()
        .await
        .map_err(|e| transport(USERINFO, e))?;
    debug!(claims = claims.len(), "fetched userinfo");
    Ok(claims)
}

/// Fetch the Sesame credentials bound to an access token.
pub async fn fetch_sesame_credentials(
    http: &reqwest::Client,
    endpoints: &Endpoints,
    access_token: &str,
) -> Result<SesameCredentials> {
    require_non_empty("access_token", access_token)?;

    let response = http
        .get(endpoints.credentials.clone())
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| transport(CREDENTIALS, e))?;

    let credentials = check_response(CREDENTIALS, response)
        .await?
        .json::<SesameCredentials>()
        .await
        .map_err(|e| transport(CREDENTIALS, e))?;
    debug!(
        region = credentials.region.as_deref().unwrap_or("unknown"),
        associated_accounts = credentials.associated_accounts.len(),
        "fetched sesame credentials"
    );
    Ok(credentials)
}
