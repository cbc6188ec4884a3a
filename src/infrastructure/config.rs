//! Configuration infrastructure
//!
//! One JSON file holds everything an operator may need to touch when the
//! target application changes: selector candidates, timing, retry caps,
//! business defaults. Selector lists are configuration on purpose, so a UI
//! change in the target system is a config edit, not a release.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use crate::domain::services::DedupConfig;

/// Complete pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationConfig {
    /// URL of the target application's working page.
    pub work_url: String,
    /// Directory holding the catalog store, mapping table, brand registry
    /// and failure backlog.
    pub data_dir: PathBuf,
    /// Markup applied over cost to derive the sale price, in percent.
    pub markup_percent: Decimal,
    pub default_unit: String,
    pub tax_rate: Decimal,
    pub tax_regime_code: String,
    /// Category used when classification resolves nothing.
    pub default_category_id: String,
    pub default_category_name: String,
    /// Brand used when no confident brand match exists.
    pub generic_brand_id: String,
    /// Brand names never suggested even when present in the registry.
    pub brand_blocklist: Vec<String>,
    /// Maximum concurrent automation sessions.
    pub session_pool_size: usize,
    pub dedup: DedupConfig,
    pub retry: RetryConfig,
    pub timing: FormTimingConfig,
    pub selectors: SelectorConfig,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            work_url: "https://app.example.com/catalog".into(),
            data_dir: PathBuf::from("data"),
            markup_percent: dec!(45.00),
            default_unit: "PC".into(),
            tax_rate: dec!(17.00),
            tax_regime_code: "00".into(),
            default_category_id: "136".into(),
            default_category_name: "DIVERSOS".into(),
            generic_brand_id: "1".into(),
            brand_blocklist: Vec::new(),
            session_pool_size: 4,
            dedup: DedupConfig::default(),
            retry: RetryConfig::default(),
            timing: FormTimingConfig::default(),
            selectors: SelectorConfig::default(),
        }
    }
}

impl AutomationConfig {
    /// Sale price derived from a cost: cost plus markup, rounded to cents.
    pub fn sale_price(&self, cost: Decimal) -> Decimal {
        (cost * (Decimal::ONE + self.markup_percent / dec!(100))).round_dp(2)
    }
}

/// Retry caps at every granularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Cross-operation cap: full registration attempts per request.
    pub max_attempts: u32,
    /// Intra-operation cap: submit attempts within one form lifecycle.
    pub save_attempts: u32,
    /// Per-record cap when re-driving the backlog.
    pub backlog_attempts: u32,
    /// Backlog records older than this are pruned.
    pub backlog_prune_days: i64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            save_attempts: 5,
            backlog_attempts: 2,
            backlog_prune_days: 1,
        }
    }
}

/// Poll intervals and deadlines for every UI wait, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormTimingConfig {
    pub poll_interval_ms: u64,
    /// Deadline per submit attempt for the save-confirmation poll.
    pub save_timeout_ms: u64,
    /// Deadline for the generated-code capture wait.
    pub code_timeout_ms: u64,
    /// Deadline per step of the form-detection ladder.
    pub detect_timeout_ms: u64,
    /// Fixed settle wait after actions that trigger a page reaction.
    pub settle_ms: u64,
}

impl Default for FormTimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            save_timeout_ms: 10_000,
            code_timeout_ms: 15_000,
            detect_timeout_ms: 5_000,
            settle_ms: 500,
        }
    }
}

/// Ordered selector candidates per logical field, first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorConfig {
    pub new_button: Vec<String>,
    pub description: Vec<String>,
    pub classification_code: Vec<String>,
    pub classification_suggestion: Vec<String>,
    pub unit: Vec<String>,
    pub category: Vec<String>,
    pub brand: Vec<String>,
    pub tax_widget: Vec<String>,
    pub tax_option: Vec<String>,
    pub cost: Vec<String>,
    pub sale_price: Vec<String>,
    pub save_button: Vec<String>,
    pub generated_code: Vec<String>,
    pub error_message: Vec<String>,
    pub modal: Vec<String>,
    pub login_user: Vec<String>,
    pub login_password: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        fn list(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }
        Self {
            new_button: list(&["#btNovo", "button#novo", "a.btn-novo"]),
            description: list(&["#descricao", "input[name='descricao']"]),
            classification_code: list(&["#dsNcm", "input[name='ncm']"]),
            classification_suggestion: list(&[".ncm-suggestion li", ".autocomplete-item"]),
            unit: list(&["#cdUnidade", "select[name='unidade']"]),
            category: list(&["#cdGrupo", "select[name='grupo']"]),
            brand: list(&["#COD_MARCA", "select[name='marca']"]),
            tax_widget: list(&["#cstWidget", ".cst-dropdown"]),
            tax_option: list(&[".cst-dropdown-option", "li[data-cst]"]),
            cost: list(&["#vlCusto", "input[name='custo']"]),
            sale_price: list(&["#vlVenda", "input[name='venda']"]),
            save_button: list(&["#btnSalvar", "button[type='submit']"]),
            generated_code: list(&["#cod_produto", "input[name='codigo']"]),
            error_message: list(&[".alert-danger", ".toast-error", ".validation-summary-errors"]),
            modal: list(&[".modal.show", ".ui-dialog:visible", "[role='dialog']"]),
            login_user: list(&["#usuario", "input[name='usuario']"]),
            login_password: list(&["#senha", "input[name='senha']"]),
        }
    }
}

/// Loads and saves the configuration file.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self { config_path: config_path.into() }
    }

    /// Loads the config, creating a default file when none exists. A file
    /// that no longer parses is moved aside and replaced with defaults so
    /// the operator keeps the broken copy.
    pub async fn load(&self) -> Result<AutomationConfig> {
        if !self.config_path.exists() {
            let config = AutomationConfig::default();
            self.save(&config).await?;
            info!(path = %self.config_path.display(), "created default configuration");
            return Ok(config);
        }
        let content = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("failed to read config at {}", self.config_path.display()))?;
        match serde_json::from_str::<AutomationConfig>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                let backup = self.config_path.with_extension("json.bak");
                warn!(error = %e, backup = %backup.display(), "config unparsable, resetting to defaults");
                fs::copy(&self.config_path, &backup)
                    .await
                    .context("failed to back up unparsable config")?;
                let config = AutomationConfig::default();
                self.save(&config).await?;
                Ok(config)
            }
        }
    }

    pub async fn save(&self, config: &AutomationConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let content = serde_json::to_string_pretty(config).context("failed to serialize config")?;
        fs::write(&self.config_path, content)
            .await
            .with_context(|| format!("failed to write config at {}", self.config_path.display()))?;
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sale_price_applies_markup_and_rounds() {
        let config = AutomationConfig::default();
        assert_eq!(config.sale_price(dec!(2500.00)), dec!(3625.00));
        assert_eq!(config.sale_price(dec!(19.99)), dec!(28.99));
    }

    #[tokio::test]
    async fn missing_config_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().join("automation.json"));
        let config = manager.load().await.unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert!(manager.config_path().exists());
    }

    #[tokio::test]
    async fn unparsable_config_is_backed_up_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("automation.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        let manager = ConfigManager::new(&path);
        let config = manager.load().await.unwrap();
        assert_eq!(config.session_pool_size, 4);
        assert!(path.with_extension("json.bak").exists());
    }

    #[tokio::test]
    async fn config_round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().join("automation.json"));
        let mut config = AutomationConfig::default();
        config.retry.max_attempts = 5;
        config.selectors.new_button = vec!["#custom".into()];
        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.retry.max_attempts, 5);
        assert_eq!(loaded.selectors.new_button, vec!["#custom".to_string()]);
    }
}
