//! Tree display preferences
//!
//! The sitemap's collapsed/expanded state. It is persisted next to the
//! editor's other settings but carries no meaning for the tree itself.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tokio::fs;

/// Display preferences for the sitemap tree
///
/// All fields use `#[serde(default)]` so older preference files load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreePreferences {
    #[serde(default)]
    pub collapsed: BTreeSet<String>,
}

impl TreePreferences {
    pub fn is_collapsed(&self, page_id: &str) -> bool {
        self.collapsed.contains(page_id)
    }

    /// Flip a page's collapsed state, returning the new state
    pub fn toggle_collapsed(&mut self, page_id: &str) -> bool {
        if self.collapsed.remove(page_id) {
            false
        } else {
            self.collapsed.insert(page_id.to_string());
            true
        }
    }

    /// Drop entries for pages that no longer exist
    pub fn retain_known(&mut self, known: impl Fn(&str) -> bool) {
        self.collapsed.retain(|id| known(id));
    }

    /// Load preferences, falling back to defaults when the file is missing
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read preferences from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse preferences in {}", path.display()))
    }

    /// Save preferences (write-to-temp, then rename)
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .context("Failed to create preferences directory")?;
        }
        let serialized =
            serde_json::to_string_pretty(self).context("Failed to serialize preferences")?;

        let temp_file = path.with_extension("json.tmp");
        fs::write(&temp_file, serialized)
            .await
            .context("Failed to write preferences")?;
        fs::rename(&temp_file, path)
            .await
            .context("Failed to save preferences")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_toggle_collapsed() {
        let mut prefs = TreePreferences::default();
        assert!(prefs.toggle_collapsed("about"));
        assert!(prefs.is_collapsed("about"));
        assert!(!prefs.toggle_collapsed("about"));
        assert!(!prefs.is_collapsed("about"));
    }

    #[tokio::test]
    async fn test_round_trip_through_file() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("nested").join("tree.json");

        assert_eq!(TreePreferences::load_from(&path).await?, TreePreferences::default());

        let mut prefs = TreePreferences::default();
        prefs.toggle_collapsed("blog");
        prefs.save_to(&path).await?;

        let loaded = TreePreferences::load_from(&path).await?;
        assert!(loaded.is_collapsed("blog"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_fields_use_defaults() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("tree.json");
        tokio::fs::write(&path, "{}").await?;
        assert!(TreePreferences::load_from(&path).await?.collapsed.is_empty());
        Ok(())
    }
}
