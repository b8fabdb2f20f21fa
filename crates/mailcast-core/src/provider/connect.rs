//! OAuth mailbox connection (authorization-code flow)

use super::{check_response, http_client};
use chrono::{Duration, Utc};
use mailcast_common::config::OAuthConfig;
use mailcast_common::{Error, Result};
use mailcast_storage::models::{CreateProvider, ProviderConfig, ProviderSecret};
use mailcast_storage::repository::ProviderRepository;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
struct CodeExchangeResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Account behind an authorized access token
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthUser {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Outcome of a completed connect flow
#[derive(Debug, Clone, Serialize)]
pub struct OAuthConnection {
    pub provider: ProviderConfig,
    /// `false` when an existing provider for the same mailbox was refreshed
    pub created: bool,
}

struct ClientCredentials<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    redirect_uri: &'a str,
}

/// Drives the authorization-code flow against the configured OAuth endpoints
pub struct OAuthConnector {
    client: reqwest::Client,
    oauth: OAuthConfig,
}

impl OAuthConnector {
    pub fn new(oauth: OAuthConfig, timeout: std::time::Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            oauth,
        })
    }

    fn credentials(&self) -> Result<ClientCredentials<'_>> {
        match (
            self.oauth.client_id.as_deref(),
            self.oauth.client_secret.as_deref(),
            self.oauth.redirect_uri.as_deref(),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Ok(ClientCredentials {
                client_id,
                client_secret,
                redirect_uri,
            }),
            _ => Err(Error::Configuration(
                "OAuth client id, client secret and redirect URI must be configured".to_string(),
            )),
        }
    }

    /// URL the user visits to grant mailbox access.
    ///
    /// Offline access with forced consent so the grant carries a refresh token.
    pub fn authorization_url(&self, state: Option<&str>) -> Result<String> {
        let creds = self.credentials()?;
        let scope = self.oauth.scopes.join(" ");
        let mut params = vec![
            ("client_id", creds.client_id),
            ("redirect_uri", creds.redirect_uri),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ];
        if let Some(state) = state.filter(|s| !s.is_empty()) {
            params.push(("state", state));
        }

        Url::parse_with_params(&self.oauth.auth_url, &params)
            .map(String::from)
            .map_err(|e| Error::Configuration(format!("Invalid OAuth authorization URL: {}", e)))
    }

    async fn exchange_code(&self, code: &str) -> Result<CodeExchangeResponse> {
        let creds = self.credentials()?;
        let response = self
            .client
            .post(&self.oauth.token_url)
            .form(&[
                ("code", code),
                ("client_id", creds.client_id),
                ("client_secret", creds.client_secret),
                ("redirect_uri", creds.redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Code exchange request failed: {}", e)))?;

        check_response(response, "Code exchange")
            .await?
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Invalid token response: {}", e)))
    }

    async fn user_info(&self, access_token: &str) -> Result<OAuthUser> {
        let response = self
            .client
            .get(&self.oauth.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("User info request failed: {}", e)))?;
        let user: OAuthUser = check_response(response, "User info")
            .await?
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Invalid user info response: {}", e)))?;

        if user.email.trim().is_empty() {
            return Err(Error::Provider("User info did not include an email".to_string()));
        }
        Ok(user)
    }

    async fn check_mailbox_access(&self, access_token: &str) -> Result<()> {
        let url = format!(
            "{}/gmail/v1/users/me/profile",
            self.oauth.gmail_api_base.trim_end_matches('/')
        );
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Gmail profile request failed: {}", e)))?;
        check_response(response, "Gmail profile").await?;
        Ok(())
    }

    /// Exchange `code` and store the mailbox as an OAuth mail provider.
    ///
    /// A provider already holding the same mailbox gets the new tokens; its
    /// refresh token is kept when the grant does not carry a new one. A new
    /// provider becomes default only when it is the first provider.
    pub async fn connect(&self, providers: &dyn ProviderRepository, code: &str) -> Result<OAuthConnection> {
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::Validation("Authorization code is required".to_string()));
        }

        let tokens = self.exchange_code(code).await?;
        let user = self.user_info(&tokens.access_token).await?;
        self.check_mailbox_access(&tokens.access_token).await?;

        let expires_at = tokens.expires_in.map(|secs| Utc::now() + Duration::seconds(secs));
        let existing = providers.list().await?.into_iter().find(|p| {
            matches!(&p.secret, ProviderSecret::OauthMail { email, .. } if email.eq_ignore_ascii_case(&user.email))
        });

        let (id, created) = match existing {
            Some(existing) => {
                let kept_refresh = match &existing.secret {
                    ProviderSecret::OauthMail { refresh_token, .. } => refresh_token.clone(),
                    _ => None,
                };
                let secret = ProviderSecret::OauthMail {
                    email: user.email.clone(),
                    access_token: tokens.access_token,
                    refresh_token: tokens.refresh_token.or(kept_refresh),
                    expires_at,
                };
                providers.update(existing.id, None, None, Some(secret)).await?;
                (existing.id, false)
            }
            None => {
                let display = user
                    .name
                    .as_deref()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or(user.email.as_str());
                let created = providers
                    .create(CreateProvider {
                        name: format!("Gmail - {}", display),
                        from_address: Some(user.email.clone()),
                        secret: ProviderSecret::OauthMail {
                            email: user.email.clone(),
                            access_token: tokens.access_token,
                            refresh_token: tokens.refresh_token,
                            expires_at,
                        },
                    })
                    .await?;
                (created.id, true)
            }
        };

        // Mailbox access was just verified
        let provider = providers.mark_tested(id, true, Utc::now()).await?;
        info!(provider_id = %provider.id, email = %user.email, created, "Connected OAuth mailbox");

        Ok(OAuthConnection { provider, created })
    }
}
