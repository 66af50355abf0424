use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::transfer::remote::{RemoteError, RemoteErrorKind};

/// Tokens closer than this to expiry are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Clone, Debug, PartialEq, Eq)]
/// A bearer token and its expiry.
pub struct AccessToken {
    /// Bearer value.
    pub token: String,
    /// Absolute expiry.
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn usable_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - chrono::Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }
}

/// Something that can mint a fresh [`AccessToken`].
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    /// Perform one exchange.
    async fn exchange(&self) -> Result<AccessToken, RemoteError>;
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// OAuth 2.0 refresh-token grant against a token endpoint.
pub struct OAuthRefreshExchange {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

impl OAuthRefreshExchange {
    /// Exchange client credentials and a refresh token at `token_url`.
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RemoteError::protocol(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
        })
    }
}

#[async_trait::async_trait]
impl TokenSource for OAuthRefreshExchange {
    async fn exchange(&self) -> Result<AccessToken, RemoteError> {
        tracing::debug!(url = %self.token_url, "exchanging refresh token");
        let resp = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| RemoteError::new(RemoteErrorKind::Network, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            // A rejected grant will not get better on retry.
            let kind = match RemoteErrorKind::from_status(status.as_u16()) {
                RemoteErrorKind::Unauthorized => RemoteErrorKind::Client(401),
                k => k,
            };
            return Err(RemoteError::new(kind, format!("token exchange: {body}")));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| RemoteError::protocol(format!("token response: {e}")))?;
        Ok(AccessToken {
            token: body.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(body.expires_in),
        })
    }
}

/// Process-wide access token cache with single-flight refresh.
///
/// The lock is held across the exchange, so concurrent callers that find the token stale wait for
/// the first caller's refresh instead of starting their own.
pub struct TokenManager {
    source: Box<dyn TokenSource>,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenManager {
    /// Manager minting tokens from `source`.
    pub fn new(source: impl TokenSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cached: Mutex::new(None),
        }
    }

    /// A bearer value valid for at least the expiry margin.
    pub async fn bearer(&self) -> Result<String, RemoteError> {
        let mut slot = self.cached.lock().await;
        if let Some(tok) = slot.as_ref()
            && tok.usable_at(Utc::now())
        {
            return Ok(tok.token.clone());
        }
        let fresh = self.source.exchange().await?;
        tracing::info!(expires_at = %fresh.expires_at, "access token refreshed");
        let token = fresh.token.clone();
        *slot = Some(fresh);
        Ok(token)
    }

    /// Drop the cached token if it is still `stale`; a token refreshed meanwhile is kept.
    pub async fn invalidate(&self, stale: &str) {
        let mut slot = self.cached.lock().await;
        if slot.as_ref().is_some_and(|t| t.token == stale) {
            *slot = None;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transfer/token.rs"]
mod tests;
