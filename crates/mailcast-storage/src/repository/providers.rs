//! Provider configuration repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailcast_common::types::ProviderId;
use mailcast_common::{Error, Result};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::file::{FileStorage, JsonCollection};
use crate::models::{CreateProvider, ProviderConfig, ProviderSecret};

/// Provider repository trait
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    /// Store a new config; the first config created becomes default
    async fn create(&self, input: CreateProvider) -> Result<ProviderConfig>;
    async fn get(&self, id: ProviderId) -> Result<Option<ProviderConfig>>;
    async fn list(&self) -> Result<Vec<ProviderConfig>>;
    async fn get_default(&self) -> Result<Option<ProviderConfig>>;
    /// Replace the editable fields of a config
    async fn update(
        &self,
        id: ProviderId,
        name: Option<String>,
        from_address: Option<String>,
        secret: Option<ProviderSecret>,
    ) -> Result<ProviderConfig>;
    /// Record a connectivity test outcome
    async fn mark_tested(&self, id: ProviderId, active: bool, at: DateTime<Utc>) -> Result<ProviderConfig>;
    /// Persist a refreshed secret (e.g. a renewed access token)
    async fn update_secret(&self, id: ProviderId, secret: ProviderSecret) -> Result<()>;
    /// Make `id` the only default
    async fn set_default(&self, id: ProviderId) -> Result<ProviderConfig>;
    /// Delete a config; deleting the default promotes the first remaining one
    async fn delete(&self, id: ProviderId) -> Result<bool>;
}

/// File-backed provider repository
pub struct FileProviderRepository {
    items: JsonCollection<ProviderConfig>,
}

impl FileProviderRepository {
    pub fn new(storage: Arc<dyn FileStorage>) -> Self {
        Self {
            items: JsonCollection::new(storage, "providers.json"),
        }
    }
}

#[async_trait]
impl ProviderRepository for FileProviderRepository {
    async fn create(&self, input: CreateProvider) -> Result<ProviderConfig> {
        let created = self
            .items
            .update(move |configs| {
                let now = Utc::now();
                let config = ProviderConfig {
                    id: Uuid::new_v4(),
                    name: input.name,
                    is_default: configs.is_empty(),
                    is_active: false,
                    from_address: input.from_address,
                    secret: input.secret,
                    last_tested_at: None,
                    created_at: now,
                    updated_at: now,
                };
                configs.push(config.clone());
                Ok(config)
            })
            .await?;

        info!(provider_id = %created.id, kind = %created.kind(), default = created.is_default, "Provider created");
        Ok(created)
    }

    async fn get(&self, id: ProviderId) -> Result<Option<ProviderConfig>> {
        self.items.find(id).await
    }

    async fn list(&self) -> Result<Vec<ProviderConfig>> {
        self.items.load().await
    }

    async fn get_default(&self) -> Result<Option<ProviderConfig>> {
        Ok(self.items.load().await?.into_iter().find(|c| c.is_default))
    }

    async fn update(
        &self,
        id: ProviderId,
        name: Option<String>,
        from_address: Option<String>,
        secret: Option<ProviderSecret>,
    ) -> Result<ProviderConfig> {
        self.items
            .modify(id, "Provider", move |config| {
                if let Some(name) = name {
                    config.name = name;
                }
                if from_address.is_some() {
                    config.from_address = from_address;
                }
                if let Some(secret) = secret {
                    if secret.kind() != config.kind() {
                        return Err(Error::Validation(format!(
                            "Cannot change provider kind from {} to {}",
                            config.kind(),
                            secret.kind()
                        )));
                    }
                    config.secret = secret;
                    // New credentials must be re-tested
                    config.is_active = false;
                }
                config.updated_at = Utc::now();
                Ok(())
            })
            .await
    }

    async fn mark_tested(&self, id: ProviderId, active: bool, at: DateTime<Utc>) -> Result<ProviderConfig> {
        self.items
            .modify(id, "Provider", move |config| {
                config.is_active = active;
                config.last_tested_at = Some(at);
                config.updated_at = at;
                Ok(())
            })
            .await
    }

    async fn update_secret(&self, id: ProviderId, secret: ProviderSecret) -> Result<()> {
        self.items
            .modify(id, "Provider", move |config| {
                config.secret = secret;
                config.updated_at = Utc::now();
                Ok(())
            })
            .await
            .map(|_| ())
    }

    async fn set_default(&self, id: ProviderId) -> Result<ProviderConfig> {
        let config = self
            .items
            .update(move |configs| {
                if !configs.iter().any(|c| c.id == id) {
                    return Err(Error::NotFound(format!("Provider {} not found", id)));
                }
                let now = Utc::now();
                let mut selected = None;
                for config in configs.iter_mut() {
                    let is_target = config.id == id;
                    if config.is_default != is_target {
                        config.is_default = is_target;
                        config.updated_at = now;
                    }
                    if is_target {
                        selected = Some(config.clone());
                    }
                }
                selected.ok_or_else(|| Error::NotFound(format!("Provider {} not found", id)))
            })
            .await?;

        info!(provider_id = %id, "Default provider changed");
        Ok(config)
    }

    async fn delete(&self, id: ProviderId) -> Result<bool> {
        self.items
            .update(move |configs| {
                let Some(index) = configs.iter().position(|c| c.id == id) else {
                    return Ok(false);
                };
                let removed = configs.remove(index);
                if removed.is_default {
                    if let Some(first) = configs.first_mut() {
                        first.is_default = true;
                        first.updated_at = Utc::now();
                        info!(provider_id = %first.id, "Default provider reassigned");
                    }
                }
                Ok(true)
            })
            .await
    }
}
