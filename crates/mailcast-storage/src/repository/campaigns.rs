//! Campaign repository

use async_trait::async_trait;
use chrono::Utc;
use mailcast_common::types::CampaignId;
use mailcast_common::Result;
use std::sync::Arc;

use crate::file::{FileStorage, JsonCollection};
use crate::models::Campaign;

/// Closure applied to a campaign inside a single store write
pub type CampaignMutation = Box<dyn FnOnce(&mut Campaign) -> Result<()> + Send>;

/// Campaign repository trait
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn create(&self, campaign: Campaign) -> Result<Campaign>;
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>>;
    async fn list(&self) -> Result<Vec<Campaign>>;
    /// Read-modify-write one campaign; nothing is stored if `f` fails
    async fn update_with(&self, id: CampaignId, f: CampaignMutation) -> Result<Campaign>;
    async fn delete(&self, id: CampaignId) -> Result<bool>;
}

/// File-backed campaign repository
pub struct FileCampaignRepository {
    items: JsonCollection<Campaign>,
}

impl FileCampaignRepository {
    pub fn new(storage: Arc<dyn FileStorage>) -> Self {
        Self {
            items: JsonCollection::new(storage, "campaigns.json"),
        }
    }
}

#[async_trait]
impl CampaignRepository for FileCampaignRepository {
    async fn create(&self, campaign: Campaign) -> Result<Campaign> {
        self.items.insert(campaign).await
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        self.items.find(id).await
    }

    async fn list(&self) -> Result<Vec<Campaign>> {
        let mut campaigns = self.items.load().await?;
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(campaigns)
    }

    async fn update_with(&self, id: CampaignId, f: CampaignMutation) -> Result<Campaign> {
        self.items
            .modify(id, "Campaign", move |campaign| {
                f(campaign)?;
                campaign.updated_at = Utc::now();
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: CampaignId) -> Result<bool> {
        self.items.remove(id).await
    }
}
