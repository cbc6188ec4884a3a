//! Maintenance entry point: inspects the catalog and prunes the backlog.
//!
//! The pipeline itself is embedded by the service that owns the browser
//! sessions; this binary only covers the operator chores that need no
//! browser at all.

use anyhow::Result;
use catalog_autoreg::infrastructure::backlog::FailureBacklog;
use catalog_autoreg::infrastructure::catalog_store::CatalogStore;
use catalog_autoreg::infrastructure::logging::init_logging;
use catalog_autoreg::ConfigManager;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "automation.json".into());
    let config = ConfigManager::new(&config_path).load().await?;

    let catalog = CatalogStore::open(config.data_dir.join("catalog.json")).await?;
    let stats = catalog.stats().await;
    info!(
        total = stats.total,
        active = stats.active,
        system_created = stats.system_created,
        registered_today = stats.registered_today,
        registered_this_week = stats.registered_this_week,
        average_cost = ?stats.average_cost,
        average_sale_price = ?stats.average_sale_price,
        "catalog status"
    );
    for (category, count) in &stats.by_category {
        info!(category = %category, count, "category usage");
    }

    let backlog = FailureBacklog::open(config.data_dir.join("backlog")).await?;
    let pruned = backlog.prune_older_than(config.retry.backlog_prune_days).await?;
    let pending = backlog.all().await?.len();
    info!(pruned, pending, "backlog status");
    Ok(())
}
