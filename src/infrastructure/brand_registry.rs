//! Persisted registry of confirmed brand names.
//!
//! Brands the target system has accepted at least once, each with a locally
//! generated sequential id. The block-list keeps known-problematic names
//! (single letters, garbled imports) out of classification even when they
//! are present in the file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::options::BrandOption;
use crate::domain::text;

pub struct BrandRegistry {
    path: PathBuf,
    blocklist: Vec<String>,
    cache: RwLock<Vec<BrandOption>>,
}

impl BrandRegistry {
    pub async fn open(path: impl Into<PathBuf>, blocklist: &[String]) -> Result<Self> {
        let path = path.into();
        let brands = if path.exists() {
            let content = fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read brand registry at {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("brand registry at {} is corrupt", path.display()))?
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            blocklist: blocklist.iter().map(|b| text::normalize(b)).collect(),
            cache: RwLock::new(brands),
        })
    }

    /// Brands eligible for suggestion: everything confirmed, minus the
    /// block-list and single-character names.
    pub async fn known_brands(&self) -> Vec<BrandOption> {
        self.cache
            .read()
            .await
            .iter()
            .filter(|b| {
                let name = text::normalize(&b.name);
                name.len() > 1 && !self.blocklist.iter().any(|blocked| *blocked == name)
            })
            .cloned()
            .collect()
    }

    /// Records a brand name the target system accepted, assigning the next
    /// sequential id. Re-confirming a known name returns its existing id.
    pub async fn confirm(&self, name: &str) -> Result<BrandOption> {
        let normalized = text::normalize(name);
        let mut cache = self.cache.write().await;
        if let Some(existing) = cache.iter().find(|b| text::normalize(&b.name) == normalized) {
            return Ok(existing.clone());
        }
        let next_id = cache
            .iter()
            .filter_map(|b| b.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let brand = BrandOption::new(next_id.to_string(), name.trim().to_uppercase());
        cache.push(brand.clone());
        info!(brand = %brand.name, id = %brand.id, "brand confirmed");
        self.persist(&cache).await?;
        Ok(brand)
    }

    async fn persist(&self, brands: &[BrandOption]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let content =
            serde_json::to_string_pretty(brands).context("failed to serialize brand registry")?;
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("failed to write brand registry at {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn confirm_assigns_sequential_ids() {
        let dir = tempfile::tempdir().unwrap();
        let registry = BrandRegistry::open(dir.path().join("brands.json"), &[]).await.unwrap();
        let a = registry.confirm("Samsung").await.unwrap();
        let b = registry.confirm("Dell").await.unwrap();
        assert_eq!(a.id, "1");
        assert_eq!(b.id, "2");
        assert_eq!(a.name, "SAMSUNG");
    }

    #[tokio::test]
    async fn reconfirming_returns_the_existing_id() {
        let dir = tempfile::tempdir().unwrap();
        let registry = BrandRegistry::open(dir.path().join("brands.json"), &[]).await.unwrap();
        let first = registry.confirm("SAMSUNG").await.unwrap();
        let again = registry.confirm("samsung").await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(registry.known_brands().await.len(), 1);
    }

    #[tokio::test]
    async fn blocklisted_and_single_letter_names_are_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let blocklist = vec!["ZZZZZ".to_string()];
        let registry = BrandRegistry::open(dir.path().join("brands.json"), &blocklist).await.unwrap();
        registry.confirm("ZZZZZ").await.unwrap();
        registry.confirm("X").await.unwrap();
        registry.confirm("DELL").await.unwrap();
        let known = registry.known_brands().await;
        assert_eq!(known.len(), 1);
        assert_eq!(known[0].name, "DELL");
    }

    #[tokio::test]
    async fn registry_survives_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brands.json");
        {
            let registry = BrandRegistry::open(&path, &[]).await.unwrap();
            registry.confirm("DELL").await.unwrap();
        }
        let reopened = BrandRegistry::open(&path, &[]).await.unwrap();
        assert_eq!(reopened.known_brands().await.len(), 1);
    }
}
