//! Send Pipeline - Delivers due queue items of a sending campaign

use super::manager::apply_transition;
use super::template::TemplateRenderer;
use crate::provider::{
    resolve_active_provider, sender_address, OutgoingMessage, SendReceipt, Transport,
    TransportFactory,
};
use crate::tracking::LinkTracker;
use chrono::Utc;
use mailcast_common::config::SendingConfig;
use mailcast_common::types::CampaignId;
use mailcast_common::{Error, Result};
use mailcast_storage::models::{
    Campaign, CampaignStatus, EventKind, ProviderKind, QueueStatus, TrackingEvent,
};
use mailcast_storage::repository::Repositories;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Pipeline tuning taken from the `sending` config section
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub batch_size: usize,
    pub default_from: String,
}

impl PipelineSettings {
    pub fn from_config(config: &SendingConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            default_from: config.default_from.clone(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&SendingConfig::default())
    }
}

/// Summary of one `process_batch` run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub campaign_id: CampaignId,
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    pub remaining: usize,
    pub status: CampaignStatus,
    pub daily_limit_reached: bool,
}

/// Result of handing one queue item to the transport
pub(crate) enum Delivery {
    Sent(SendReceipt),
    Failed(String),
    /// Recipient missing from the campaign snapshot
    Skipped,
}

/// Removes the campaign from the in-flight set when the run ends
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<CampaignId>>,
    campaign_id: CampaignId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.campaign_id);
    }
}

/// Send Pipeline
pub struct SendPipeline {
    repos: Repositories,
    factory: Arc<dyn TransportFactory>,
    tracker: LinkTracker,
    renderer: TemplateRenderer,
    settings: PipelineSettings,
    in_flight: Mutex<HashSet<CampaignId>>,
}

impl SendPipeline {
    pub fn new(
        repos: Repositories,
        factory: Arc<dyn TransportFactory>,
        tracker: LinkTracker,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            repos,
            factory,
            tracker,
            renderer: TemplateRenderer::new(),
            settings,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn try_acquire(&self, campaign_id: CampaignId) -> Result<InFlightGuard<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(campaign_id) {
            return Err(Error::Conflict(format!(
                "Campaign {} is already being processed",
                campaign_id
            )));
        }
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            campaign_id,
        })
    }

    /// Whether a run for this campaign is in progress
    pub fn is_processing(&self, campaign_id: CampaignId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&campaign_id)
    }

    /// Deliver up to `batch_size` due pending items of a sending campaign
    pub async fn process_batch(&self, campaign_id: CampaignId) -> Result<BatchReport> {
        let _guard = self.try_acquire(campaign_id)?;

        let campaign = self
            .repos
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Campaign {} not found", campaign_id)))?;

        if campaign.status != CampaignStatus::Sending {
            return Err(Error::Validation(format!(
                "Campaign is not sending (status: {})",
                campaign.status
            )));
        }

        let provider =
            resolve_active_provider(self.repos.providers.as_ref(), campaign.provider_id).await?;
        let transport = self.factory.build(&provider)?;
        let from_address = sender_address(
            campaign.settings.from_address.as_deref(),
            &provider,
            &self.settings.default_from,
        );

        let now = Utc::now();
        let today = now.date_naive();
        let sent_today = campaign
            .queue
            .iter()
            .filter(|item| item.sent_at.is_some_and(|at| at.date_naive() == today))
            .count();
        let allowance = (campaign.settings.daily_limit as usize).saturating_sub(sent_today);

        let due: Vec<String> = campaign
            .queue
            .iter()
            .filter(|item| item.status == QueueStatus::Pending && item.scheduled_at <= now)
            .take(self.settings.batch_size.min(allowance))
            .map(|item| item.contact_email.clone())
            .collect();

        let mut report = BatchReport {
            campaign_id,
            attempted: 0,
            sent: 0,
            failed: 0,
            skipped: 0,
            remaining: campaign.pending_count(),
            status: campaign.status,
            daily_limit_reached: allowance == 0,
        };

        if report.daily_limit_reached {
            info!(campaign_id = %campaign_id, limit = campaign.settings.daily_limit, "Daily limit reached");
            return Ok(report);
        }

        debug!(campaign_id = %campaign_id, items = due.len(), "Processing campaign batch");

        let interval = Duration::from_secs(campaign.settings.interval_seconds);
        let mut interrupted = false;

        for (index, email) in due.iter().enumerate() {
            let delivery = self
                .deliver(&campaign, transport.as_ref(), &from_address, email)
                .await;
            report.attempted += 1;
            match &delivery {
                Delivery::Sent(_) => report.sent += 1,
                Delivery::Failed(_) => report.failed += 1,
                Delivery::Skipped => report.skipped += 1,
            }
            self.record(campaign_id, email, delivery, provider.kind()).await?;

            if index + 1 == due.len() {
                break;
            }
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }

            let status = self
                .repos
                .campaigns
                .get(campaign_id)
                .await?
                .map(|c| c.status);
            if status != Some(CampaignStatus::Sending) {
                info!(campaign_id = %campaign_id, status = ?status, "Campaign left sending, stopping batch");
                interrupted = true;
                break;
            }
        }

        let campaign = if interrupted {
            self.repos
                .campaigns
                .get(campaign_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Campaign {} not found", campaign_id)))?
        } else {
            self.finish(campaign_id).await?
        };

        report.remaining = campaign.pending_count();
        report.status = campaign.status;
        report.daily_limit_reached =
            sent_today + report.sent >= campaign.settings.daily_limit as usize;

        info!(
            campaign_id = %campaign_id,
            sent = report.sent,
            failed = report.failed,
            remaining = report.remaining,
            status = %report.status,
            "Campaign batch finished"
        );
        Ok(report)
    }

    async fn deliver(
        &self,
        campaign: &Campaign,
        transport: &dyn Transport,
        from_address: &str,
        email: &str,
    ) -> Delivery {
        let Some(contact) = campaign.contact(email) else {
            warn!(campaign_id = %campaign.id, email = %email, "Recipient missing from campaign, skipping");
            return Delivery::Skipped;
        };

        let rendered = self.renderer.render_message(&campaign.template, contact);
        let html_body = if campaign.settings.tracking_enabled {
            self.tracker.instrument(&rendered.html_body, campaign.id, email)
        } else {
            rendered.html_body
        };

        let message = OutgoingMessage {
            from_address: from_address.to_string(),
            from_name: campaign.settings.from_name.clone(),
            to: email.to_string(),
            subject: rendered.subject,
            html_body,
            text_body: rendered.text_body,
        };

        match transport.send(&message).await {
            Ok(receipt) => {
                debug!(campaign_id = %campaign.id, email = %email, message_id = %receipt.message_id, "Message sent");
                Delivery::Sent(receipt)
            }
            Err(e) => {
                warn!(campaign_id = %campaign.id, email = %email, error = %e, "Message delivery failed");
                Delivery::Failed(e.to_string())
            }
        }
    }

    /// Persist one item's outcome, then append its event
    async fn record(
        &self,
        campaign_id: CampaignId,
        email: &str,
        delivery: Delivery,
        provider: ProviderKind,
    ) -> Result<()> {
        let event = match &delivery {
            Delivery::Sent(receipt) => Some(TrackingEvent::new(
                campaign_id,
                email,
                EventKind::Sent,
                serde_json::json!({ "messageId": receipt.message_id, "provider": provider }),
            )),
            Delivery::Failed(reason) => Some(TrackingEvent::new(
                campaign_id,
                email,
                EventKind::Bounced,
                serde_json::json!({ "error": reason, "provider": provider }),
            )),
            Delivery::Skipped => None,
        };

        let target = email.to_string();
        self.repos
            .campaigns
            .update_with(
                campaign_id,
                Box::new(move |campaign| {
                    mark_item(campaign, &target, delivery);
                    Ok(())
                }),
            )
            .await?;

        if let Some(event) = event {
            if let Err(e) = self.repos.events.append(event).await {
                error!(campaign_id = %campaign_id, error = %e, "Failed to record delivery event");
            }
        }
        Ok(())
    }

    /// Complete the campaign once nothing is pending
    async fn finish(&self, campaign_id: CampaignId) -> Result<Campaign> {
        let now = Utc::now();
        let campaign = self
            .repos
            .campaigns
            .update_with(
                campaign_id,
                Box::new(move |campaign| {
                    if campaign.status == CampaignStatus::Sending && campaign.pending_count() == 0 {
                        apply_transition(campaign, CampaignStatus::Completed, now)?;
                    }
                    Ok(())
                }),
            )
            .await?;

        if campaign.status == CampaignStatus::Completed {
            info!(
                campaign_id = %campaign_id,
                sent = campaign.counters.sent,
                failed = campaign.counters.failed,
                "Campaign completed"
            );
        }
        Ok(campaign)
    }
}

/// Apply a delivery outcome to the recipient's pending item and the counters.
///
/// Items that are no longer pending are left alone, so an outcome is counted once.
pub(crate) fn mark_item(campaign: &mut Campaign, email: &str, delivery: Delivery) {
    let Some(item) = campaign
        .queue
        .iter_mut()
        .find(|item| item.contact_email == email && item.status == QueueStatus::Pending)
    else {
        return;
    };

    match delivery {
        Delivery::Sent(receipt) => {
            item.status = QueueStatus::Sent;
            item.sent_at = Some(Utc::now());
            item.message_id = Some(receipt.message_id);
            campaign.counters.sent += 1;
        }
        Delivery::Failed(reason) => {
            item.status = QueueStatus::Failed;
            item.error = Some(reason);
            campaign.counters.failed += 1;
        }
        Delivery::Skipped => {
            item.status = QueueStatus::Failed;
            item.error = Some("Recipient not found in campaign".to_string());
        }
    }
}
