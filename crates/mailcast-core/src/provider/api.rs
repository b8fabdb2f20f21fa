//! Transactional email API transport (Resend-style `POST /emails`)

use super::{check_response, http_client, OutgoingMessage, SendReceipt, Transport, TransportSettings};
use async_trait::async_trait;
use mailcast_common::{Error, Result};
use mailcast_storage::models::{ProviderKind, ProviderSecret};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: String,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

/// Sends through a transactional HTTP API authenticated with a bearer key
pub struct ApiTransport {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl ApiTransport {
    pub fn new(secret: &ProviderSecret, settings: &TransportSettings) -> Result<Self> {
        let ProviderSecret::TransactionalApi { api_key, base_url, .. } = secret else {
            return Err(Error::Configuration("Not a transactional API provider".to_string()));
        };
        if api_key.is_empty() {
            return Err(Error::Configuration("API key is required".to_string()));
        }

        let base_url = base_url
            .clone()
            .unwrap_or_else(|| settings.resend_base_url.clone())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api_key: api_key.clone(),
            base_url,
            client: http_client(settings.request_timeout)?,
        })
    }
}

#[async_trait]
impl Transport for ApiTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<SendReceipt> {
        let body = SendEmailRequest {
            from: message.from_header(),
            to: [message.to.as_str()],
            subject: &message.subject,
            html: &message.html_body,
            text: Some(message.text_body.as_str()).filter(|t| !t.is_empty()),
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Email API request failed: {}", e)))?;
        let sent: SendEmailResponse = check_response(response, "Email API send")
            .await?
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Invalid email API response: {}", e)))?;

        Ok(SendReceipt {
            message_id: sent.id,
            provider: ProviderKind::TransactionalApi,
        })
    }

    async fn test_connection(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/domains", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Email API request failed: {}", e)))?;
        check_response(response, "Email API check").await?;
        Ok(())
    }
}
