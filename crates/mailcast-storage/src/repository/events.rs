//! Tracking event log

use async_trait::async_trait;
use mailcast_common::types::CampaignId;
use mailcast_common::Result;
use std::sync::Arc;
use tracing::debug;

use crate::file::{FileStorage, JsonLines};
use crate::models::TrackingEvent;

/// Event repository trait
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Append an event; events are never deduplicated or rewritten
    async fn append(&self, event: TrackingEvent) -> Result<()>;
    /// Events of one campaign, in append order
    async fn list_by_campaign(&self, campaign_id: CampaignId) -> Result<Vec<TrackingEvent>>;
    async fn list(&self) -> Result<Vec<TrackingEvent>>;
}

/// File-backed event log, one JSON record per line
pub struct FileEventRepository {
    items: JsonLines<TrackingEvent>,
}

impl FileEventRepository {
    pub fn new(storage: Arc<dyn FileStorage>) -> Self {
        Self {
            items: JsonLines::new(storage, "events.jsonl"),
        }
    }
}

#[async_trait]
impl EventRepository for FileEventRepository {
    async fn append(&self, event: TrackingEvent) -> Result<()> {
        debug!(campaign_id = %event.campaign_id, kind = %event.kind, "Appending tracking event");
        self.items.append(&event).await
    }

    async fn list_by_campaign(&self, campaign_id: CampaignId) -> Result<Vec<TrackingEvent>> {
        Ok(self
            .items
            .load()
            .await?
            .into_iter()
            .filter(|e| e.campaign_id == campaign_id)
            .collect())
    }

    async fn list(&self) -> Result<Vec<TrackingEvent>> {
        self.items.load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::LocalStorage;
    use crate::models::EventKind;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_append_keeps_duplicates_in_order() {
        let dir = TempDir::new().unwrap();
        let repo = FileEventRepository::new(Arc::new(LocalStorage::from_path(dir.path()).unwrap()));
        let campaign = Uuid::new_v4();
        let other = Uuid::new_v4();

        repo.append(TrackingEvent::new(campaign, "a@x.com", EventKind::Open, serde_json::json!({})))
            .await
            .unwrap();
        repo.append(TrackingEvent::new(campaign, "a@x.com", EventKind::Open, serde_json::json!({})))
            .await
            .unwrap();
        repo.append(TrackingEvent::new(
            campaign,
            "a@x.com",
            EventKind::Click,
            serde_json::json!({ "url": "https://example.com" }),
        ))
        .await
        .unwrap();
        repo.append(TrackingEvent::new(other, "b@x.com", EventKind::Open, serde_json::json!({})))
            .await
            .unwrap();

        let events = repo.list_by_campaign(campaign).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].kind, EventKind::Click);
        assert_eq!(events[2].url(), Some("https://example.com"));
        assert_eq!(repo.list().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_append_does_not_rewrite_earlier_events() {
        let dir = TempDir::new().unwrap();
        let storage: Arc<dyn FileStorage> = Arc::new(LocalStorage::from_path(dir.path()).unwrap());
        let repo = FileEventRepository::new(storage.clone());
        let campaign = Uuid::new_v4();

        repo.append(TrackingEvent::new(campaign, "a@x.com", EventKind::Sent, serde_json::json!({})))
            .await
            .unwrap();
        let before = storage.read("events.jsonl").await.unwrap().unwrap();

        repo.append(TrackingEvent::new(campaign, "a@x.com", EventKind::Open, serde_json::json!({})))
            .await
            .unwrap();
        let after = storage.read("events.jsonl").await.unwrap().unwrap();

        assert!(after.starts_with(&before));
        assert_eq!(String::from_utf8(after).unwrap().lines().count(), 2);

        // A fresh handle reads the same log back
        let reopened = FileEventRepository::new(storage);
        let kinds: Vec<EventKind> = reopened
            .list_by_campaign(campaign)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![EventKind::Sent, EventKind::Open]);
    }
}
