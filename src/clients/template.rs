use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{Error, Result, anyhow};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// XML skeletons by template name, loaded lazily from `<dir>/<name>.xml`.
pub struct TemplateLibrary {
    template_dir: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl TemplateLibrary {
    pub fn new(template_dir: impl AsRef<Path>) -> Self {
        let template_dir = template_dir.as_ref().to_path_buf();

        info!(template_dir = %template_dir.display(), "Template library initialised");

        Self {
            template_dir,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a template without touching the filesystem.
    pub async fn insert(&self, name: &str, template: String) {
        self.cache.write().await.insert(name.to_string(), template);
    }

    pub async fn fetch_template(&self, name: &str) -> Result<String, Error> {
        if let Some(template) = self.cache.read().await.get(name) {
            return Ok(template.clone());
        }

        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(anyhow!("Invalid template name '{}'", name));
        }

        let path = self.template_dir.join(format!("{}.xml", name));

        debug!(template = name, path = %path.display(), "Loading template from disk");

        let template = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow!("Failed to load template {}: {}", path.display(), e))?;

        self.cache
            .write()
            .await
            .insert(name.to_string(), template.clone());

        Ok(template)
    }
}
