//! OAuth webmail transport (Gmail REST API)

use super::smtp::{build_mime, new_message_id};
use super::{check_response, http_client, OutgoingMessage, SendReceipt, Transport, TransportSettings};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use mailcast_common::config::OAuthConfig;
use mailcast_common::types::ProviderId;
use mailcast_common::{Error, Result};
use mailcast_storage::models::{ProviderKind, ProviderSecret};
use mailcast_storage::repository::ProviderRepository;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Tokens expiring within this window are refreshed before use
const REFRESH_MARGIN_SECS: i64 = 5 * 60;

#[derive(Debug, Clone)]
struct TokenState {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenState {
    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(REFRESH_MARGIN_SECS) >= expires_at,
            None => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GmailSendResponse {
    id: String,
}

/// Sends through a mailbox authorized via OAuth
pub struct OAuthMailTransport {
    provider_id: ProviderId,
    email: String,
    client: reqwest::Client,
    oauth: OAuthConfig,
    tokens: Mutex<TokenState>,
    providers: Option<Arc<dyn ProviderRepository>>,
}

impl OAuthMailTransport {
    pub fn new(
        provider_id: ProviderId,
        secret: &ProviderSecret,
        settings: &TransportSettings,
        providers: Option<Arc<dyn ProviderRepository>>,
    ) -> Result<Self> {
        let ProviderSecret::OauthMail {
            email,
            access_token,
            refresh_token,
            expires_at,
        } = secret
        else {
            return Err(Error::Configuration("Not an OAuth mail provider".to_string()));
        };

        Ok(Self {
            provider_id,
            email: email.clone(),
            client: http_client(settings.request_timeout)?,
            oauth: settings.oauth.clone(),
            tokens: Mutex::new(TokenState {
                access_token: access_token.clone(),
                refresh_token: refresh_token.clone(),
                expires_at: *expires_at,
            }),
            providers,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/gmail/v1/users/me/{}", self.oauth.gmail_api_base.trim_end_matches('/'), path)
    }

    /// A usable access token, refreshed through the token endpoint when close to expiry
    async fn access_token(&self) -> Result<String> {
        let mut tokens = self.tokens.lock().await;
        if !tokens.needs_refresh(Utc::now()) {
            return Ok(tokens.access_token.clone());
        }

        let refresh_token = tokens.refresh_token.clone().ok_or_else(|| {
            Error::Provider("Access token expired and no refresh token available".to_string())
        })?;
        let (client_id, client_secret) = match (&self.oauth.client_id, &self.oauth.client_secret) {
            (Some(id), Some(secret)) => (id.clone(), secret.clone()),
            _ => {
                return Err(Error::Configuration(
                    "OAuth client credentials are not configured".to_string(),
                ))
            }
        };

        let response = self
            .client
            .post(&self.oauth.token_url)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Token refresh request failed: {}", e)))?;
        let refreshed: TokenResponse = check_response(response, "Token refresh")
            .await?
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Invalid token response: {}", e)))?;

        tokens.access_token = refreshed.access_token;
        tokens.expires_at = refreshed
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        info!(provider_id = %self.provider_id, "Refreshed OAuth access token");

        if let Some(providers) = &self.providers {
            let secret = ProviderSecret::OauthMail {
                email: self.email.clone(),
                access_token: tokens.access_token.clone(),
                refresh_token: tokens.refresh_token.clone(),
                expires_at: tokens.expires_at,
            };
            if let Err(e) = providers.update_secret(self.provider_id, secret).await {
                warn!(provider_id = %self.provider_id, error = %e, "Failed to persist refreshed token");
            }
        }

        Ok(tokens.access_token.clone())
    }
}

#[async_trait]
impl Transport for OAuthMailTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<SendReceipt> {
        let token = self.access_token().await?;
        let message_id = new_message_id(&message.from_address);
        let raw = URL_SAFE_NO_PAD.encode(build_mime(message, &message_id)?);

        let response = self
            .client
            .post(self.api_url("messages/send"))
            .bearer_auth(token)
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Gmail send request failed: {}", e)))?;
        let sent: GmailSendResponse = check_response(response, "Gmail send")
            .await?
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Invalid Gmail response: {}", e)))?;

        Ok(SendReceipt {
            message_id: sent.id,
            provider: ProviderKind::OauthMail,
        })
    }

    async fn test_connection(&self) -> Result<()> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(self.api_url("profile"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Gmail profile request failed: {}", e)))?;
        check_response(response, "Gmail profile").await?;
        Ok(())
    }
}
