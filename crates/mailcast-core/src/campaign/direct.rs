//! Direct Send - One-off messages outside the campaign queue

use super::pipeline::{mark_item, Delivery};
use crate::provider::{resolve_active_provider, sender_address, OutgoingMessage, TransportFactory};
use crate::tracking::LinkTracker;
use mailcast_common::types::{CampaignId, EmailAddress, ProviderId};
use mailcast_common::{Error, Result};
use mailcast_storage::models::{EventKind, ProviderKind, TrackingEvent};
use mailcast_storage::repository::Repositories;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Direct send request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectSendRequest {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    #[serde(default)]
    pub text_body: String,
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    /// Defaults to the default provider
    #[serde(default)]
    pub provider_id: Option<ProviderId>,
    /// Attribute the send to a campaign: events, counters and tracking links
    #[serde(default)]
    pub campaign_id: Option<CampaignId>,
    #[serde(default = "default_tracking")]
    pub tracking: bool,
}

fn default_tracking() -> bool {
    true
}

/// Direct send response
#[derive(Debug, Clone, Serialize)]
pub struct DirectSendResult {
    pub message_id: String,
    pub provider: ProviderKind,
    pub to: String,
}

pub struct DirectSender {
    repos: Repositories,
    factory: Arc<dyn TransportFactory>,
    tracker: LinkTracker,
    default_from: String,
}

impl DirectSender {
    pub fn new(
        repos: Repositories,
        factory: Arc<dyn TransportFactory>,
        tracker: LinkTracker,
        default_from: impl Into<String>,
    ) -> Self {
        Self {
            repos,
            factory,
            tracker,
            default_from: default_from.into(),
        }
    }

    pub async fn send(&self, request: DirectSendRequest) -> Result<DirectSendResult> {
        let to = request.to.trim().to_string();
        if EmailAddress::parse(&to).is_none() {
            return Err(Error::Validation(format!("Invalid recipient email address: {}", to)));
        }
        if request.subject.trim().is_empty() {
            return Err(Error::Validation("Subject is required".to_string()));
        }

        if let Some(campaign_id) = request.campaign_id {
            if self.repos.campaigns.get(campaign_id).await?.is_none() {
                return Err(Error::NotFound(format!("Campaign {} not found", campaign_id)));
            }
        }

        let provider =
            resolve_active_provider(self.repos.providers.as_ref(), request.provider_id).await?;
        let transport = self.factory.build(&provider)?;

        let html_body = match request.campaign_id {
            Some(campaign_id) if request.tracking => {
                self.tracker.instrument(&request.html_body, campaign_id, &to)
            }
            _ => request.html_body,
        };

        let message = OutgoingMessage {
            from_address: sender_address(
                request.from_address.as_deref(),
                &provider,
                &self.default_from,
            ),
            from_name: request.from_name,
            to: to.clone(),
            subject: request.subject,
            html_body,
            text_body: request.text_body,
        };

        let result = transport.send(&message).await;

        if let Some(campaign_id) = request.campaign_id {
            let (delivery, event) = match &result {
                Ok(receipt) => (
                    Delivery::Sent(receipt.clone()),
                    TrackingEvent::new(
                        campaign_id,
                        &to,
                        EventKind::Sent,
                        serde_json::json!({ "messageId": receipt.message_id, "provider": receipt.provider }),
                    ),
                ),
                Err(e) => (
                    Delivery::Failed(e.to_string()),
                    TrackingEvent::new(
                        campaign_id,
                        &to,
                        EventKind::Bounced,
                        serde_json::json!({ "error": e.to_string(), "provider": provider.kind() }),
                    ),
                ),
            };

            // Only a still-pending queue item of this recipient is updated
            let target = to.clone();
            if let Err(e) = self
                .repos
                .campaigns
                .update_with(
                    campaign_id,
                    Box::new(move |campaign| {
                        mark_item(campaign, &target, delivery);
                        Ok(())
                    }),
                )
                .await
            {
                error!(campaign_id = %campaign_id, error = %e, "Failed to update campaign after direct send");
            }
            if let Err(e) = self.repos.events.append(event).await {
                error!(campaign_id = %campaign_id, error = %e, "Failed to record direct send event");
            }
        }

        match result {
            Ok(receipt) => {
                info!(to = %to, provider = %receipt.provider, "Direct message sent");
                Ok(DirectSendResult {
                    message_id: receipt.message_id,
                    provider: receipt.provider,
                    to,
                })
            }
            Err(e) => {
                warn!(to = %to, error = %e, "Direct message failed");
                Err(e)
            }
        }
    }
}
