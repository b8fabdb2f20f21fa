//! Template repository

use async_trait::async_trait;
use chrono::Utc;
use mailcast_common::types::TemplateId;
use mailcast_common::Result;
use std::sync::Arc;

use crate::file::{FileStorage, JsonCollection};
use crate::models::Template;

/// Template repository trait
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn create(&self, template: Template) -> Result<Template>;
    async fn get(&self, id: TemplateId) -> Result<Option<Template>>;
    async fn list(&self) -> Result<Vec<Template>>;
    /// Replace a stored template, keeping its id and creation time
    async fn update(&self, template: Template) -> Result<Template>;
    async fn delete(&self, id: TemplateId) -> Result<bool>;
}

/// File-backed template repository
pub struct FileTemplateRepository {
    items: JsonCollection<Template>,
}

impl FileTemplateRepository {
    pub fn new(storage: Arc<dyn FileStorage>) -> Self {
        Self {
            items: JsonCollection::new(storage, "templates.json"),
        }
    }
}

#[async_trait]
impl TemplateRepository for FileTemplateRepository {
    async fn create(&self, template: Template) -> Result<Template> {
        self.items.insert(template).await
    }

    async fn get(&self, id: TemplateId) -> Result<Option<Template>> {
        self.items.find(id).await
    }

    async fn list(&self) -> Result<Vec<Template>> {
        self.items.load().await
    }

    async fn update(&self, template: Template) -> Result<Template> {
        self.items
            .modify(template.id, "Template", move |stored| {
                let created_at = stored.created_at;
                *stored = template;
                stored.created_at = created_at;
                stored.updated_at = Utc::now();
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: TemplateId) -> Result<bool> {
        self.items.remove(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::LocalStorage;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_template_crud() {
        let dir = TempDir::new().unwrap();
        let repo = FileTemplateRepository::new(Arc::new(LocalStorage::from_path(dir.path()).unwrap()));

        let now = Utc::now();
        let template = repo
            .create(Template {
                id: Uuid::new_v4(),
                name: "Welcome".into(),
                subject: "Hi {{name}}".into(),
                html_body: "<p>Hello</p>".into(),
                text_body: String::new(),
                variables: vec!["name".into()],
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let mut edited = template.clone();
        edited.subject = "Hello {{name}}".into();
        let updated = repo.update(edited).await.unwrap();
        assert_eq!(updated.subject, "Hello {{name}}");
        assert_eq!(updated.created_at, template.created_at);

        assert_eq!(repo.list().await.unwrap().len(), 1);
        assert!(repo.delete(template.id).await.unwrap());
        assert!(repo.get(template.id).await.unwrap().is_none());
    }
}
