//! Campaign Manager - Handles campaign lifecycle and queue creation

use super::template::detect_variables;
use crate::contacts::segment;
use chrono::{DateTime, Utc};
use mailcast_common::types::{CampaignId, EmailAddress};
use mailcast_common::{Error, Result};
use mailcast_storage::models::{
    Campaign, CampaignStatus, Contact, Counters, CreateCampaign, QueueItem, QueueStatus,
    TemplateSnapshot,
};
use mailcast_storage::repository::Repositories;
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

/// Move a campaign to `next`, enforcing the status machine.
///
/// Leaving `draft` creates one pending queue item per recipient, due at `at`.
/// On error the campaign is left untouched.
pub fn apply_transition(campaign: &mut Campaign, next: CampaignStatus, at: DateTime<Utc>) -> Result<()> {
    if !campaign.status.can_transition_to(next) {
        return Err(Error::Validation(format!(
            "Cannot move campaign from {} to {}",
            campaign.status, next
        )));
    }

    if campaign.status == CampaignStatus::Draft {
        campaign.queue = campaign
            .recipients
            .iter()
            .map(|contact| QueueItem::pending(contact.email.clone(), at))
            .collect();
    }

    match next {
        CampaignStatus::Sending if campaign.started_at.is_none() => campaign.started_at = Some(at),
        CampaignStatus::Completed | CampaignStatus::Stopped => campaign.completed_at = Some(at),
        _ => {}
    }

    campaign.status = next;
    Ok(())
}

/// Campaign Manager - Manages campaign lifecycle
pub struct CampaignManager {
    repos: Repositories,
}

impl CampaignManager {
    /// Create a new campaign manager
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Create a draft campaign, snapshotting its template and recipients
    pub async fn create_campaign(&self, input: CreateCampaign) -> Result<Campaign> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("Campaign name is required".to_string()));
        }
        if input.settings.daily_limit == 0 {
            return Err(Error::Validation("Daily limit must be greater than zero".to_string()));
        }

        let template = self.resolve_template(&input).await?;
        let recipients = self.resolve_recipients(&input).await?;
        if recipients.is_empty() {
            return Err(Error::Validation("Campaign has no recipients".to_string()));
        }

        if let Some(provider_id) = input.provider_id {
            if self.repos.providers.get(provider_id).await?.is_none() {
                return Err(Error::NotFound(format!("Provider {} not found", provider_id)));
            }
        }

        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::new_v4(),
            name,
            template,
            template_id: input.template_id,
            provider_id: input.provider_id,
            recipients,
            settings: input.settings,
            status: CampaignStatus::Draft,
            counters: Counters::default(),
            queue: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        };

        let campaign = self.repos.campaigns.create(campaign).await?;
        info!(
            campaign_id = %campaign.id,
            recipients = campaign.recipients.len(),
            "Campaign created"
        );
        Ok(campaign)
    }

    async fn resolve_template(&self, input: &CreateCampaign) -> Result<TemplateSnapshot> {
        let mut snapshot = match (input.template_id, &input.template) {
            (Some(template_id), _) => self
                .repos
                .templates
                .get(template_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Template {} not found", template_id)))?
                .snapshot(),
            (None, Some(inline)) => inline.clone(),
            (None, None) => return Err(Error::Validation("A template is required".to_string())),
        };

        if snapshot.subject.trim().is_empty() {
            return Err(Error::Validation("Template subject is required".to_string()));
        }
        if snapshot.variables.is_empty() {
            snapshot.variables = detect_variables([
                snapshot.subject.as_str(),
                snapshot.html_body.as_str(),
                snapshot.text_body.as_str(),
            ]);
        }
        Ok(snapshot)
    }

    /// Stored list (optionally narrowed by a segment) or explicit recipients
    async fn resolve_recipients(&self, input: &CreateCampaign) -> Result<Vec<Contact>> {
        let segment = match input.segment_id {
            Some(segment_id) => Some(
                self.repos
                    .segments
                    .get(segment_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("Segment {} not found", segment_id)))?,
            ),
            None => None,
        };

        let list_id = input.contact_list_id.or(segment.as_ref().map(|s| s.list_id));
        let contacts = match list_id {
            Some(list_id) => {
                self.repos
                    .contact_lists
                    .get(list_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("Contact list {} not found", list_id)))?
                    .contacts
            }
            None => input.recipients.clone(),
        };

        let contacts = match &segment {
            Some(segment) => segment::evaluate(&contacts, &segment.rule_set),
            None => contacts,
        };

        let mut seen = HashSet::new();
        let mut recipients = Vec::with_capacity(contacts.len());
        for contact in contacts {
            if EmailAddress::parse(&contact.email).is_none() {
                return Err(Error::Validation(format!(
                    "Invalid recipient email address: {}",
                    contact.email
                )));
            }
            if seen.insert(contact.email.clone()) {
                recipients.push(contact);
            }
        }
        Ok(recipients)
    }

    async fn transition(&self, campaign_id: CampaignId, next: CampaignStatus) -> Result<Campaign> {
        let now = Utc::now();
        let campaign = self
            .repos
            .campaigns
            .update_with(
                campaign_id,
                Box::new(move |campaign| apply_transition(campaign, next, now)),
            )
            .await?;
        info!(campaign_id = %campaign_id, status = %campaign.status, "Campaign status changed");
        Ok(campaign)
    }

    /// Schedule a draft campaign; recipients become due at `at`, the
    /// campaign's configured start time, or now
    pub async fn schedule_campaign(
        &self,
        campaign_id: CampaignId,
        at: Option<DateTime<Utc>>,
    ) -> Result<Campaign> {
        let campaign = self
            .repos
            .campaigns
            .update_with(
                campaign_id,
                Box::new(move |campaign| {
                    let start = at.or(campaign.settings.start_time).unwrap_or_else(Utc::now);
                    apply_transition(campaign, CampaignStatus::Scheduled, start)?;
                    campaign.settings.start_time = Some(start);
                    Ok(())
                }),
            )
            .await?;

        info!(
            campaign_id = %campaign_id,
            recipients = campaign.queue.len(),
            start_time = ?campaign.settings.start_time,
            "Campaign scheduled"
        );
        Ok(campaign)
    }

    /// Start sending immediately, from `draft` or `scheduled`
    pub async fn start_campaign(&self, campaign_id: CampaignId) -> Result<Campaign> {
        let now = Utc::now();
        let campaign = self
            .repos
            .campaigns
            .update_with(
                campaign_id,
                Box::new(move |campaign| {
                    if campaign.status == CampaignStatus::Paused {
                        return Err(Error::Validation(
                            "Campaign is paused; resume it instead".to_string(),
                        ));
                    }
                    apply_transition(campaign, CampaignStatus::Sending, now)?;
                    // Starting early pulls future-dated items forward
                    for item in campaign.queue.iter_mut() {
                        if item.status == QueueStatus::Pending && item.scheduled_at > now {
                            item.scheduled_at = now;
                        }
                    }
                    Ok(())
                }),
            )
            .await?;

        info!(campaign_id = %campaign_id, "Campaign started sending");
        Ok(campaign)
    }

    /// Pause a sending campaign
    pub async fn pause_campaign(&self, campaign_id: CampaignId) -> Result<Campaign> {
        self.transition(campaign_id, CampaignStatus::Paused).await
    }

    /// Resume a paused campaign
    pub async fn resume_campaign(&self, campaign_id: CampaignId) -> Result<Campaign> {
        let now = Utc::now();
        let campaign = self
            .repos
            .campaigns
            .update_with(
                campaign_id,
                Box::new(move |campaign| {
                    if campaign.status != CampaignStatus::Paused {
                        return Err(Error::Validation(format!(
                            "Only paused campaigns can be resumed (status: {})",
                            campaign.status
                        )));
                    }
                    apply_transition(campaign, CampaignStatus::Sending, now)
                }),
            )
            .await?;

        info!(campaign_id = %campaign_id, "Campaign resumed");
        Ok(campaign)
    }

    /// Stop a campaign for good
    pub async fn stop_campaign(&self, campaign_id: CampaignId) -> Result<Campaign> {
        self.transition(campaign_id, CampaignStatus::Stopped).await
    }

    /// Delete a campaign; a campaign that is sending must be paused or stopped first
    pub async fn delete_campaign(&self, campaign_id: CampaignId) -> Result<bool> {
        if let Some(campaign) = self.repos.campaigns.get(campaign_id).await? {
            if campaign.status == CampaignStatus::Sending {
                return Err(Error::Conflict(
                    "Cannot delete a campaign while it is sending".to_string(),
                ));
            }
        }
        let deleted = self.repos.campaigns.delete(campaign_id).await?;
        if deleted {
            info!(campaign_id = %campaign_id, "Campaign deleted");
        }
        Ok(deleted)
    }

    /// Move scheduled campaigns whose start time has passed to `sending`
    pub async fn promote_due(&self, now: DateTime<Utc>) -> Result<Vec<CampaignId>> {
        let due: Vec<CampaignId> = self
            .repos
            .campaigns
            .list()
            .await?
            .into_iter()
            .filter(|c| c.status == CampaignStatus::Scheduled)
            .filter(|c| c.settings.start_time.map_or(true, |start| start <= now))
            .map(|c| c.id)
            .collect();

        let mut promoted = Vec::with_capacity(due.len());
        for campaign_id in due {
            self.transition(campaign_id, CampaignStatus::Sending).await?;
            promoted.push(campaign_id);
        }
        Ok(promoted)
    }
}
