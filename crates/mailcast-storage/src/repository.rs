//! Repository layer for data access

pub mod campaigns;
pub mod contact_lists;
pub mod events;
pub mod providers;
pub mod segments;
pub mod templates;

use mailcast_common::config::StorageConfig;
use mailcast_common::Result;
use std::sync::Arc;

use crate::file::{FileStorage, LocalStorage};

// Re-export repository traits
pub use campaigns::{CampaignMutation, CampaignRepository};
pub use contact_lists::ContactListRepository;
pub use events::EventRepository;
pub use providers::ProviderRepository;
pub use segments::SegmentRepository;
pub use templates::TemplateRepository;

// Re-export file-backed implementations
pub use campaigns::FileCampaignRepository;
pub use contact_lists::FileContactListRepository;
pub use events::FileEventRepository;
pub use providers::FileProviderRepository;
pub use segments::FileSegmentRepository;
pub use templates::FileTemplateRepository;

/// Every repository, shared behind trait objects
#[derive(Clone)]
pub struct Repositories {
    pub campaigns: Arc<dyn CampaignRepository>,
    pub providers: Arc<dyn ProviderRepository>,
    pub templates: Arc<dyn TemplateRepository>,
    pub contact_lists: Arc<dyn ContactListRepository>,
    pub segments: Arc<dyn SegmentRepository>,
    pub events: Arc<dyn EventRepository>,
}

impl Repositories {
    /// Open file-backed repositories under the configured data directory
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let storage: Arc<dyn FileStorage> = Arc::new(LocalStorage::new(config)?);
        Ok(Self::from_storage(storage))
    }

    pub fn from_storage(storage: Arc<dyn FileStorage>) -> Self {
        Self {
            campaigns: Arc::new(FileCampaignRepository::new(storage.clone())),
            providers: Arc::new(FileProviderRepository::new(storage.clone())),
            templates: Arc::new(FileTemplateRepository::new(storage.clone())),
            contact_lists: Arc::new(FileContactListRepository::new(storage.clone())),
            segments: Arc::new(FileSegmentRepository::new(storage.clone())),
            events: Arc::new(FileEventRepository::new(storage)),
        }
    }
}
