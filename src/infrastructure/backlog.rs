//! Durable backlog of failed registrations.
//!
//! One JSON file per processing day (`failures-YYYY-MM-DD.json`), rewritten
//! in full on every change. A request appears at most once across all files:
//! enqueueing replaces any previous record with the same request id.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::error::FailureReason;
use crate::domain::failure::FailureRecord;

pub struct FailureBacklog {
    dir: PathBuf,
    write_guard: Mutex<()>,
}

impl FailureBacklog {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create backlog dir {}", dir.display()))?;
        Ok(Self { dir, write_guard: Mutex::new(()) })
    }

    /// Parks a failed request. Any earlier record for the same request id is
    /// dropped first, so a request is never parked twice.
    pub async fn enqueue(&self, record: FailureRecord) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        self.remove_locked(&record.request.request_id).await?;
        let path = self.file_for(record.failed_at.date_naive());
        let mut records = read_records(&path).await?;
        info!(
            request_id = %record.request.request_id,
            reason = ?record.reason,
            "parking failed request in backlog"
        );
        records.push(record);
        write_records(&path, &records).await
    }

    /// Removes and returns every parked record, oldest file first. Used by
    /// the re-drive loop; records that fail again get re-enqueued by the
    /// caller.
    pub async fn take_all(&self) -> Result<Vec<FailureRecord>> {
        let _guard = self.write_guard.lock().await;
        let mut all = Vec::new();
        for path in self.backlog_files().await? {
            all.extend(read_records(&path).await?);
            fs::remove_file(&path)
                .await
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
        Ok(all)
    }

    /// Every parked record without removing anything.
    pub async fn all(&self) -> Result<Vec<FailureRecord>> {
        let mut records = Vec::new();
        for path in self.backlog_files().await? {
            records.extend(read_records(&path).await?);
        }
        Ok(records)
    }

    pub async fn by_reason(&self, reason: FailureReason) -> Result<Vec<FailureRecord>> {
        Ok(self.all().await?.into_iter().filter(|r| r.reason == reason).collect())
    }

    /// Removes one record by request id. Returns whether anything was
    /// removed.
    pub async fn remove(&self, request_id: &str) -> Result<bool> {
        let _guard = self.write_guard.lock().await;
        self.remove_locked(request_id).await
    }

    /// Drops records older than `horizon_days` and deletes emptied files.
    /// Returns the number of records pruned.
    pub async fn prune_older_than(&self, horizon_days: i64) -> Result<usize> {
        let _guard = self.write_guard.lock().await;
        let now = Utc::now();
        let horizon = Duration::days(horizon_days);
        let mut pruned = 0;
        for path in self.backlog_files().await? {
            let records = read_records(&path).await?;
            let before = records.len();
            let kept: Vec<FailureRecord> = records
                .into_iter()
                .filter(|r| !r.is_older_than(now, horizon))
                .collect();
            let dropped = before - kept.len();
            if dropped == 0 {
                continue;
            }
            pruned += dropped;
            if kept.is_empty() {
                fs::remove_file(&path)
                    .await
                    .with_context(|| format!("failed to remove {}", path.display()))?;
            } else {
                write_records(&path, &kept).await?;
            }
        }
        if pruned > 0 {
            info!(pruned, horizon_days, "pruned aged backlog records");
        }
        Ok(pruned)
    }

    async fn remove_locked(&self, request_id: &str) -> Result<bool> {
        for path in self.backlog_files().await? {
            let records = read_records(&path).await?;
            let before = records.len();
            let kept: Vec<FailureRecord> = records
                .into_iter()
                .filter(|r| r.request.request_id != request_id)
                .collect();
            if kept.len() == before {
                continue;
            }
            if kept.is_empty() {
                fs::remove_file(&path)
                    .await
                    .with_context(|| format!("failed to remove {}", path.display()))?;
            } else {
                write_records(&path, &kept).await?;
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "failures-{:04}-{:02}-{:02}.json",
            date.year(),
            date.month(),
            date.day()
        ))
    }

    async fn backlog_files(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut dir = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("failed to list backlog dir {}", self.dir.display()))?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("failures-") && name.ends_with(".json") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

async fn read_records(path: &Path) -> Result<Vec<FailureRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read backlog file {}", path.display()))?;
    match serde_json::from_str(&content) {
        Ok(records) => Ok(records),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unparsable backlog file");
            Ok(Vec::new())
        }
    }
}

async fn write_records(path: &Path, records: &[FailureRecord]) -> Result<()> {
    let content = serde_json::to_string_pretty(records).context("failed to serialize backlog")?;
    fs::write(path, content)
        .await
        .with_context(|| format!("failed to write backlog file {}", path.display()))?;
    Ok(())
}
