//! Persistence for the category mapping table.
//!
//! The table is advisory, so unlike the catalog a corrupt file is not
//! fatal: it is moved aside and the classifier restarts from defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::warn;

use crate::domain::mapping::CategoryMappingTable;

pub struct MappingStore {
    path: PathBuf,
    cache: RwLock<CategoryMappingTable>,
}

impl MappingStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = if path.exists() {
            let content = fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read mapping table at {}", path.display()))?;
            match serde_json::from_str(&content) {
                Ok(table) => table,
                Err(e) => {
                    let backup = path.with_extension("json.bak");
                    warn!(error = %e, backup = %backup.display(), "mapping table unparsable, starting from defaults");
                    fs::copy(&path, &backup)
                        .await
                        .context("failed to back up unparsable mapping table")?;
                    CategoryMappingTable::seeded()
                }
            }
        } else {
            CategoryMappingTable::seeded()
        };
        Ok(Self { path, cache: RwLock::new(table) })
    }

    /// Snapshot for one classification call. Reads may race with a learning
    /// write; last writer wins.
    pub async fn snapshot(&self) -> CategoryMappingTable {
        self.cache.read().await.clone()
    }

    /// Applies a mutation under the write lock and persists when it
    /// reports a change.
    pub async fn update<F>(&self, mutate: F) -> Result<bool>
    where
        F: FnOnce(&mut CategoryMappingTable) -> bool,
    {
        let mut cache = self.cache.write().await;
        if !mutate(&mut cache) {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let content =
            serde_json::to_string_pretty(&*cache).context("failed to serialize mapping table")?;
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("failed to write mapping table at {}", self.path.display()))?;
        Ok(true)
    }
}
