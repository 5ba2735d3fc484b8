//! Access tokens for the two services.
//!
//! The authorization flows themselves live outside the engine; this module
//! only reads what they stored in the OS keyring and refreshes an expired
//! Google token:
//!
//! - `notion_token`: Notion integration token
//! - `google`: JSON-encoded [`OAuthTokens`]
//! - `google_client_id` / `google_client_secret`: OAuth client credentials
//!
//! `SYNK_NOTION_TOKEN` / `SYNK_GOOGLE_TOKEN` override the keyring.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::keyring_store;
use super::traits::{IdentityProvider, Service};
use crate::error::{Result, SyncError};

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>, // Unix timestamp
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// OAuth client credentials used for refreshing.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

/// Check if stored tokens are expired (with 60s buffer).
pub fn is_expired(tokens: &OAuthTokens) -> bool {
    match tokens.expires_at {
        Some(exp) => chrono::Utc::now().timestamp() > exp - 60,
        None => false,
    }
}

/// Refresh an access token. A rejected refresh (`error` in the body or a
/// 4xx) means the grant is gone and the user has to log in again.
pub async fn refresh_token(
    http: &Client,
    client: &OAuthClient,
    refresh: &str,
) -> Result<OAuthTokens> {
    let params = [
        ("client_id", client.client_id.as_str()),
        ("client_secret", client.client_secret.as_str()),
        ("refresh_token", refresh),
        ("grant_type", "refresh_token"),
    ];

    let resp = http.post(&client.token_url).form(&params).send().await?;
    let status = resp.status();
    if status.is_server_error() {
        return Err(SyncError::Api {
            service: Service::Google,
            status: status.as_u16(),
            body: resp.text().await.unwrap_or_default(),
        });
    }

    let body: serde_json::Value = resp.json().await?;
    if !status.is_success() || body.get("error").is_some() {
        tracing::warn!(error = %body["error"], "Google token refresh rejected");
        return Err(SyncError::AuthenticationExpired {
            service: Service::Google,
        });
    }

    let expires_at = body
        .get("expires_in")
        .and_then(|v| v.as_i64())
        .map(|ei| chrono::Utc::now().timestamp() + ei);

    Ok(OAuthTokens {
        access_token: body["access_token"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        refresh_token: body
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .map(String::from)
            .or_else(|| Some(refresh.to_string())),
        expires_at,
        token_type: body["token_type"]
            .as_str()
            .unwrap_or("Bearer")
            .to_string(),
        scope: body.get("scope").and_then(|v| v.as_str()).map(String::from),
    })
}

fn keyring_value(key: &str) -> Option<String> {
    match keyring_store::get(key) {
        Ok(value) => value.filter(|v| !v.is_empty()),
        Err(e) => {
            tracing::warn!(key, error = %e, "Keyring unavailable");
            None
        }
    }
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Identity provider backed by the OS keyring.
pub struct KeyringIdentity {
    http: Client,
    token_url: String,
}

impl KeyringIdentity {
    pub fn new(token_url: &str) -> Self {
        Self {
            http: Client::new(),
            token_url: token_url.to_string(),
        }
    }

    async fn google_token(&self) -> Result<String> {
        let expired = || SyncError::AuthenticationExpired {
            service: Service::Google,
        };

        let tokens: OAuthTokens = keyring_value("google")
            .and_then(|json| serde_json::from_str(&json).ok())
            .ok_or_else(expired)?;
        if !is_expired(&tokens) {
            return Ok(tokens.access_token);
        }

        let refresh = tokens.refresh_token.as_deref().ok_or_else(expired)?;
        let client = OAuthClient {
            client_id: keyring_value("google_client_id").ok_or_else(expired)?,
            client_secret: keyring_value("google_client_secret").ok_or_else(expired)?,
            token_url: self.token_url.clone(),
        };

        let refreshed = refresh_token(&self.http, &client, refresh).await?;
        let json = serde_json::to_string(&refreshed)?;
        if let Err(e) = keyring_store::set("google", &json) {
            tracing::warn!(error = %e, "Failed to persist refreshed Google token");
        }
        tracing::debug!("Refreshed Google access token");
        Ok(refreshed.access_token)
    }
}

impl Default for KeyringIdentity {
    fn default() -> Self {
        Self::new(GOOGLE_TOKEN_URL)
    }
}

#[async_trait]
impl IdentityProvider for KeyringIdentity {
    async fn access_token(&self, service: Service) -> Result<String> {
        match service {
            Service::Notion => env_override("SYNK_NOTION_TOKEN")
                .or_else(|| keyring_value("notion_token"))
                .ok_or(SyncError::AuthenticationExpired { service }),
            Service::Google => match env_override("SYNK_GOOGLE_TOKEN") {
                Some(token) => Ok(token),
                None => self.google_token().await,
            },
        }
    }
}
