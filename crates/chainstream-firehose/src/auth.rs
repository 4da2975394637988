//! Short-lived API token issuance and caching.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Tokens this close to expiry are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// An issued token and its unix expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiToken {
    pub token: String,
    pub expires_at: i64,
}

impl ApiToken {
    pub fn is_fresh(&self, now: i64) -> bool {
        self.expires_at - EXPIRY_MARGIN_SECS > now
    }
}

#[derive(Serialize)]
struct IssueRequest<'a> {
    api_key: &'a str,
}

/// Exchanges an API key for tokens and caches the current one.
pub struct ApiTokenStore {
    http: reqwest::Client,
    auth_url: String,
    api_key: String,
    cached: Mutex<Option<ApiToken>>,
}

impl ApiTokenStore {
    pub fn new(http: reqwest::Client, auth_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            auth_url: auth_url.into(),
            api_key: api_key.into(),
            cached: Mutex::new(None),
        }
    }

    /// The cached token if still fresh, otherwise a newly issued one.
    pub async fn token(&self) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        if let Some(cached) = self.cached_token(now) {
            return Ok(cached);
        }

        let issued = self.issue().await?;
        tracing::debug!(expires_at = issued.expires_at, "issued API token");
        let token = issued.token.clone();
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(issued);
        Ok(token)
    }

    /// Drop the cached token; the next call issues a fresh one.
    pub fn release(&self) {
        self.cached.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn is_cached(&self) -> bool {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Seed the cache with a known token.
    pub fn store(&self, token: ApiToken) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn cached_token(&self, now: i64) -> Option<String> {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|t| t.is_fresh(now))
            .map(|t| t.token.clone())
    }

    async fn issue(&self) -> Result<ApiToken, AuthError> {
        let resp = self
            .http
            .post(&self.auth_url)
            .json(&IssueRequest { api_key: &self.api_key })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Status { status, body });
        }

        Ok(resp.json::<ApiToken>().await?)
    }
}

impl std::fmt::Debug for ApiTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiTokenStore")
            .field("auth_url", &self.auth_url)
            .field("cached", &self.is_cached())
            .finish()
    }
}
