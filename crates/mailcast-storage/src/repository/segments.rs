//! Segment repository

use async_trait::async_trait;
use mailcast_common::types::SegmentId;
use mailcast_common::Result;
use std::sync::Arc;

use crate::file::{FileStorage, JsonCollection};
use crate::models::Segment;

/// Segment repository trait
#[async_trait]
pub trait SegmentRepository: Send + Sync {
    async fn create(&self, segment: Segment) -> Result<Segment>;
    async fn get(&self, id: SegmentId) -> Result<Option<Segment>>;
    async fn list(&self) -> Result<Vec<Segment>>;
    async fn delete(&self, id: SegmentId) -> Result<bool>;
}

/// File-backed segment repository
pub struct FileSegmentRepository {
    items: JsonCollection<Segment>,
}

impl FileSegmentRepository {
    pub fn new(storage: Arc<dyn FileStorage>) -> Self {
        Self {
            items: JsonCollection::new(storage, "segments.json"),
        }
    }
}

#[async_trait]
impl SegmentRepository for FileSegmentRepository {
    async fn create(&self, segment: Segment) -> Result<Segment> {
        self.items.insert(segment).await
    }

    async fn get(&self, id: SegmentId) -> Result<Option<Segment>> {
        self.items.find(id).await
    }

    async fn list(&self) -> Result<Vec<Segment>> {
        self.items.load().await
    }

    async fn delete(&self, id: SegmentId) -> Result<bool> {
        self.items.remove(id).await
    }
}
