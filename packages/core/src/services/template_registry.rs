//! Template Registry
//!
//! Read-mostly cache of page templates. The tree never enforces template
//! fields; the registry supplies defaults when a page is created and
//! validates page data when an editor asks.

use crate::db::SiteStore;
use crate::models::{Template, ValidationError};
use crate::services::error::SiteError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct TemplateRegistry {
    store: Arc<dyn SiteStore>,
    templates: Arc<RwLock<BTreeMap<String, Template>>>,
}

impl TemplateRegistry {
    pub fn new(store: Arc<dyn SiteStore>) -> Self {
        Self {
            store,
            templates: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Replace the cache with the store's templates
    pub async fn load(&self) -> Result<usize, SiteError> {
        let loaded = self
            .store
            .list_templates()
            .await
            .map_err(SiteError::backing_store)?;
        let mut templates = self.templates.write().await;
        *templates = loaded.into_iter().map(|t| (t.id.clone(), t)).collect();
        Ok(templates.len())
    }

    /// Templates ordered by id
    pub async fn list(&self) -> Vec<Template> {
        self.templates.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Result<Template, SiteError> {
        self.templates
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SiteError::template_not_found(id))
    }

    /// Insert or replace a template
    pub async fn save(&self, template: Template) -> Result<(), SiteError> {
        self.store
            .upsert_template(template.clone())
            .await
            .map_err(SiteError::backing_store)?;
        tracing::debug!("Saved template {}", template.id);
        self.templates
            .write()
            .await
            .insert(template.id.clone(), template);
        Ok(())
    }

    /// Initial page data for a new page using `template_id`
    pub async fn default_page_data(&self, template_id: &str) -> Result<Map<String, Value>, SiteError> {
        Ok(self.get(template_id).await?.default_page_data())
    }

    /// Every problem with `data` under `template_id`, in field order
    pub async fn validate_page_data(
        &self,
        template_id: &str,
        data: &Map<String, Value>,
    ) -> Result<Vec<ValidationError>, SiteError> {
        Ok(self.get(template_id).await?.validate_page_data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{FieldType, TemplateField};
    use serde_json::json;

    #[tokio::test]
    async fn test_save_get_and_defaults() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let registry = TemplateRegistry::new(store.clone());
        registry
            .save(Template::new("landing", "Landing").with_fields(vec![
                TemplateField::new("cta", "Call to action", FieldType::Text)
                    .required()
                    .with_default(json!("Sign up")),
            ]))
            .await?;

        let fresh = TemplateRegistry::new(store);
        assert_eq!(fresh.load().await?, 1);
        assert_eq!(fresh.get("landing").await?.name, "Landing");
        assert_eq!(fresh.default_page_data("landing").await?["cta"], json!("Sign up"));

        let problems = fresh
            .validate_page_data("landing", &Map::new())
            .await?;
        assert_eq!(problems, vec![ValidationError::MissingField("cta".into())]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_template() {
        let registry = TemplateRegistry::new(Arc::new(MemoryStore::new()));
        assert_eq!(
            registry.get("nope").await.unwrap_err(),
            SiteError::template_not_found("nope")
        );
    }
}
