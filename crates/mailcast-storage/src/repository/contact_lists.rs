//! Contact list repository

use async_trait::async_trait;
use mailcast_common::types::ContactListId;
use mailcast_common::Result;
use std::sync::Arc;

use crate::file::{FileStorage, JsonCollection};
use crate::models::ContactList;

/// Contact list repository trait
#[async_trait]
pub trait ContactListRepository: Send + Sync {
    async fn create(&self, list: ContactList) -> Result<ContactList>;
    async fn get(&self, id: ContactListId) -> Result<Option<ContactList>>;
    async fn list(&self) -> Result<Vec<ContactList>>;
    async fn delete(&self, id: ContactListId) -> Result<bool>;
}

/// File-backed contact list repository
pub struct FileContactListRepository {
    items: JsonCollection<ContactList>,
}

impl FileContactListRepository {
    pub fn new(storage: Arc<dyn FileStorage>) -> Self {
        Self {
            items: JsonCollection::new(storage, "contact_lists.json"),
        }
    }
}

#[async_trait]
impl ContactListRepository for FileContactListRepository {
    async fn create(&self, list: ContactList) -> Result<ContactList> {
        self.items.insert(list).await
    }

    async fn get(&self, id: ContactListId) -> Result<Option<ContactList>> {
        self.items.find(id).await
    }

    async fn list(&self) -> Result<Vec<ContactList>> {
        self.items.load().await
    }

    async fn delete(&self, id: ContactListId) -> Result<bool> {
        self.items.remove(id).await
    }
}
