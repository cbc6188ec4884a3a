//! Flat-file catalog store.
//!
//! One JSON file, rewritten in full on every change, fronted by an
//! in-memory cache. Writes take the write lock for their whole duration so
//! there is a single writer at a time; reads clone out of the cache.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::catalog::CatalogEntry;
use crate::domain::text;

/// Aggregate counts over the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub total: usize,
    pub active: usize,
    pub system_created: usize,
    pub registered_today: usize,
    pub registered_this_week: usize,
    pub registered_this_month: usize,
    pub average_cost: Option<Decimal>,
    pub average_sale_price: Option<Decimal>,
    pub by_category: BTreeMap<String, usize>,
}

/// Append-only record store of confirmed registrations.
pub struct CatalogStore {
    path: PathBuf,
    cache: RwLock<Vec<CatalogEntry>>,
}

impl CatalogStore {
    /// Opens the store, loading the backing file when it exists. An
    /// unparsable file is an error: the catalog is the idempotency record
    /// and must never be silently reset.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read catalog at {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("catalog at {} is corrupt", path.display()))?
        } else {
            Vec::new()
        };
        info!(path = %path.display(), entries = entries.len(), "catalog store opened");
        Ok(Self { path, cache: RwLock::new(entries) })
    }

    /// Snapshot of every entry.
    pub async fn all(&self) -> Vec<CatalogEntry> {
        self.cache.read().await.clone()
    }

    pub async fn find_by_code(&self, generated_code: &str) -> Option<CatalogEntry> {
        self.cache
            .read()
            .await
            .iter()
            .find(|e| e.generated_code == generated_code)
            .cloned()
    }

    /// Case-insensitive free-text search over descriptions.
    pub async fn search(&self, query: &str) -> Vec<CatalogEntry> {
        let needle = text::normalize(query);
        self.cache
            .read()
            .await
            .iter()
            .filter(|e| text::normalize(&e.description).contains(&needle))
            .cloned()
            .collect()
    }

    /// Entries matching an arbitrary predicate, for similarity lookups.
    pub async fn find_matching<F>(&self, predicate: F) -> Vec<CatalogEntry>
    where
        F: Fn(&CatalogEntry) -> bool,
    {
        self.cache.read().await.iter().filter(|e| predicate(e)).cloned().collect()
    }

    /// Appends a confirmed entry and persists the whole file. Re-appending
    /// an already-known generated code updates the existing record instead
    /// of duplicating it.
    pub async fn append(&self, entry: CatalogEntry) -> Result<()> {
        let mut cache = self.cache.write().await;
        if let Some(existing) = cache.iter_mut().find(|e| e.generated_code == entry.generated_code) {
            warn!(code = %entry.generated_code, "catalog entry re-appended, updating in place");
            *existing = entry;
        } else {
            cache.push(entry);
        }
        self.persist(&cache).await
    }

    /// Soft-deletes an entry. Records are never removed from the file.
    pub async fn deactivate(&self, generated_code: &str) -> Result<bool> {
        let mut cache = self.cache.write().await;
        let Some(entry) = cache.iter_mut().find(|e| e.generated_code == generated_code) else {
            return Ok(false);
        };
        entry.active = false;
        entry.updated_at = chrono::Utc::now();
        self.persist(&cache).await?;
        Ok(true)
    }

    /// The `n` most recently created entries, newest first.
    pub async fn recent(&self, n: usize) -> Vec<CatalogEntry> {
        let cache = self.cache.read().await;
        let mut entries: Vec<CatalogEntry> = cache.clone();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(n);
        entries
    }

    pub async fn stats(&self) -> CatalogStats {
        let cache = self.cache.read().await;
        let now = chrono::Utc::now();
        let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
        for entry in cache.iter() {
            *by_category.entry(entry.category_name.clone()).or_default() += 1;
        }
        let registered_since = |days: i64| {
            cache
                .iter()
                .filter(|e| now.signed_duration_since(e.created_at) <= chrono::Duration::days(days))
                .count()
        };
        let average = |values: Vec<Decimal>| {
            let count = Decimal::from(values.len());
            if count.is_zero() {
                None
            } else {
                let sum: Decimal = values.into_iter().sum();
                Some((sum / count).round_dp(2))
            }
        };
        CatalogStats {
            total: cache.len(),
            active: cache.iter().filter(|e| e.active).count(),
            system_created: cache.iter().filter(|e| e.system_created).count(),
            registered_today: registered_since(1),
            registered_this_week: registered_since(7),
            registered_this_month: registered_since(30),
            average_cost: average(cache.iter().map(|e| e.cost).collect()),
            average_sale_price: average(cache.iter().map(|e| e.sale_price).collect()),
            by_category,
        }
    }

    async fn persist(&self, entries: &[CatalogEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let content = serde_json::to_string_pretty(entries).context("failed to serialize catalog")?;
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("failed to write catalog at {}", self.path.display()))?;
        Ok(())
    }
}
