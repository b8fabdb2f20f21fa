//! Provider Module - Outbound transports selected by provider kind

mod api;
mod connect;
mod oauth;
mod registry;
mod smtp;

pub use api::ApiTransport;
pub use connect::{OAuthConnection, OAuthConnector, OAuthUser};
pub use oauth::OAuthMailTransport;
pub use registry::{resolve_active_provider, sender_address, test_provider, ProviderTestResult};
pub use smtp::SmtpTransport;

use async_trait::async_trait;
use mailcast_common::config::OAuthConfig;
use mailcast_common::Config;
use mailcast_common::{Error, Result};
use mailcast_storage::models::{ProviderConfig, ProviderKind, ProviderSecret};
use mailcast_storage::repository::ProviderRepository;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// A fully rendered message for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub from_address: String,
    pub from_name: Option<String>,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

impl OutgoingMessage {
    /// `Name <address>` when a display name is set
    pub fn from_header(&self) -> String {
        match self.from_name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => format!("{} <{}>", name, self.from_address),
            None => self.from_address.clone(),
        }
    }
}

/// Result of a successful hand-off to a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    pub message_id: String,
    pub provider: ProviderKind,
}

/// A way of delivering messages through one configured provider
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> Result<SendReceipt>;

    /// Check credentials and reachability without sending anything
    async fn test_connection(&self) -> Result<()>;
}

/// Endpoints and client credentials shared by HTTP transports
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub oauth: OAuthConfig,
    pub resend_base_url: String,
    pub request_timeout: Duration,
}

impl TransportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            oauth: config.oauth.clone(),
            ..Self::default()
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            oauth: OAuthConfig::default(),
            resend_base_url: "https://api.resend.com".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Build the transport matching a provider's kind.
///
/// `providers` is used to persist refreshed OAuth access tokens.
pub fn build_transport(
    config: &ProviderConfig,
    settings: &TransportSettings,
    providers: Option<Arc<dyn ProviderRepository>>,
) -> Result<Arc<dyn Transport>> {
    match &config.secret {
        ProviderSecret::Smtp { .. } => Ok(Arc::new(SmtpTransport::new(&config.secret)?)),
        ProviderSecret::OauthMail { .. } => Ok(Arc::new(OAuthMailTransport::new(
            config.id,
            &config.secret,
            settings,
            providers,
        )?)),
        ProviderSecret::TransactionalApi { .. } => {
            Ok(Arc::new(ApiTransport::new(&config.secret, settings)?))
        }
    }
}

/// Creates transports for provider configs
pub trait TransportFactory: Send + Sync {
    fn build(&self, config: &ProviderConfig) -> Result<Arc<dyn Transport>>;
}

/// Factory producing the real SMTP/OAuth/API transports
pub struct DefaultTransportFactory {
    settings: TransportSettings,
    providers: Arc<dyn ProviderRepository>,
}

impl DefaultTransportFactory {
    pub fn new(settings: TransportSettings, providers: Arc<dyn ProviderRepository>) -> Self {
        Self { settings, providers }
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn build(&self, config: &ProviderConfig) -> Result<Arc<dyn Transport>> {
        build_transport(config, &self.settings, Some(self.providers.clone()))
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Turn a non-success HTTP response into a provider error carrying the body
pub(crate) async fn check_response(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(512).collect();
    Err(Error::Provider(format!("{} failed with HTTP {}: {}", what, status.as_u16(), body)))
}
