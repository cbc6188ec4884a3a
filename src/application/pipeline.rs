//! End-to-end registration pipeline.
//!
//! Wires the dedup engine, the classifiers, the form machine and the
//! recovery manager into the flow a single request travels: validate,
//! dedup, classify, drive the form, persist, learn. Failures go through
//! bounded recovery-and-retry before landing in the durable backlog.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::catalog::CatalogEntry;
use crate::domain::error::RegistrationError;
use crate::domain::failure::FailureRecord;
use crate::domain::options::{BrandOption, CategoryOption};
use crate::domain::registration::{RegistrationRequest, RegistrationResponse};
use crate::domain::services::{BrandClassifier, DedupEngine, GroupClassifier};
use crate::infrastructure::backlog::FailureBacklog;
use crate::infrastructure::brand_registry::BrandRegistry;
use crate::infrastructure::catalog_store::CatalogStore;
use crate::infrastructure::config::AutomationConfig;
use crate::infrastructure::form_machine::{FormMachine, FormPlan};
use crate::infrastructure::mapping_store::MappingStore;
use crate::infrastructure::page::{AutomationContext, LoginHandler, SessionProvider};
use crate::infrastructure::recovery::RecoveryManager;

/// Running counters, exposed for operator inspection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub processed: u64,
    pub registered: u64,
    pub duplicates: u64,
    pub failures: u64,
    pub recoveries: u64,
    pub backlog_recovered: u64,
}

/// Data captured from one successful form run.
struct AttemptOutcome {
    generated_code: String,
    category_id: String,
    category_name: String,
    brand_id: Option<String>,
    brand_name: Option<String>,
    sale_price: rust_decimal::Decimal,
    category_options: Vec<CategoryOption>,
}

pub struct RegistrationPipeline {
    config: AutomationConfig,
    catalog: Arc<CatalogStore>,
    mappings: Arc<MappingStore>,
    brands: Arc<BrandRegistry>,
    backlog: Arc<FailureBacklog>,
    dedup: DedupEngine,
    groups: GroupClassifier,
    brand_classifier: BrandClassifier,
    sessions: Arc<dyn SessionProvider>,
    recovery: RecoveryManager,
    session_slots: Semaphore,
    cancel: CancellationToken,
    stats: Mutex<PipelineStats>,
}

impl RegistrationPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AutomationConfig,
        catalog: Arc<CatalogStore>,
        mappings: Arc<MappingStore>,
        brands: Arc<BrandRegistry>,
        backlog: Arc<FailureBacklog>,
        sessions: Arc<dyn SessionProvider>,
        login: Arc<dyn LoginHandler>,
        cancel: CancellationToken,
    ) -> Self {
        let recovery = RecoveryManager::new(
            config.work_url.clone(),
            config.selectors.clone(),
            config.timing.clone(),
            login,
            cancel.clone(),
        );
        Self {
            dedup: DedupEngine::new(config.dedup.clone()),
            groups: GroupClassifier,
            brand_classifier: BrandClassifier::new(
                config.generic_brand_id.clone(),
                &config.brand_blocklist,
            ),
            session_slots: Semaphore::new(config.session_pool_size),
            recovery,
            config,
            catalog,
            mappings,
            brands,
            backlog,
            sessions,
            cancel,
            stats: Mutex::new(PipelineStats::default()),
        }
    }

    pub async fn stats(&self) -> PipelineStats {
        *self.stats.lock().await
    }

    /// Processes one request end to end and always produces a response.
    /// Unrecoverable failures are parked in the backlog before returning.
    pub async fn process(&self, request: RegistrationRequest) -> RegistrationResponse {
        self.stats.lock().await.processed += 1;

        if let Err(e) = request.validate() {
            self.stats.lock().await.failures += 1;
            return RegistrationResponse::failed(&e, &request, 0);
        }

        let entries = self.catalog.all().await;
        if let Some(code) = self.dedup.find_existing(
            &request.description,
            &request.cleaned_classification_code(),
            request.cost,
            &entries,
        ) {
            info!(request_id = %request.request_id, code = %code, "duplicate, skipping registration");
            self.stats.lock().await.duplicates += 1;
            return RegistrationResponse::already_existed(code, &request);
        }

        match self.register_with_retries(&request).await {
            Ok((outcome, attempt)) => {
                self.finish_success(&request, &outcome).await;
                RegistrationResponse::registered(
                    outcome.generated_code.clone(),
                    &request,
                    outcome.sale_price,
                    outcome.category_name.clone(),
                    attempt,
                )
            }
            Err((error, attempts)) => {
                self.finish_failure(&request, &error, attempts).await;
                RegistrationResponse::failed(&error, &request, attempts)
            }
        }
    }

    /// Re-drives every parked request, removing records that succeed and
    /// re-parking the rest. Records past the per-record attempt cap or the
    /// age horizon are dropped. Returns how many requests recovered.
    pub async fn redrive_backlog(&self) -> Result<usize> {
        self.backlog.prune_older_than(self.config.retry.backlog_prune_days).await?;
        let records = self.backlog.take_all().await?;
        if records.is_empty() {
            return Ok(0);
        }
        info!(count = records.len(), "re-driving failure backlog");
        let attempt_cap = self.config.retry.max_attempts * self.config.retry.backlog_attempts;
        let mut recovered = 0;
        for record in records {
            if self.cancel.is_cancelled() {
                self.backlog.enqueue(record).await?;
                continue;
            }
            if record.attempts >= attempt_cap {
                warn!(
                    request_id = %record.request.request_id,
                    attempts = record.attempts,
                    "dropping backlog record past its attempt cap"
                );
                continue;
            }
            let mut request = record.request;
            request.attempts = record.attempts;
            let response = self.process(request).await;
            if response.success {
                recovered += 1;
            }
        }
        self.stats.lock().await.backlog_recovered += recovered as u64;
        Ok(recovered)
    }

    /// Cross-operation retry loop: run an attempt, and on a retryable error
    /// recover the session before the next one. Returns the outcome plus
    /// the attempt number that succeeded, or the final error plus total
    /// attempts made.
    async fn register_with_retries(
        &self,
        request: &RegistrationRequest,
    ) -> Result<(AttemptOutcome, u32), (RegistrationError, u32)> {
        let _slot = match self.session_slots.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return Err((
                    RegistrationError::Unexpected(anyhow::anyhow!("session pool closed")),
                    0,
                ))
            }
        };
        let context = match self.sessions.acquire().await {
            Ok(context) => context,
            Err(e) => return Err((RegistrationError::Unexpected(e), 0)),
        };

        let result = self.retry_loop(request, context.as_ref()).await;
        if let Err(e) = context.close().await {
            warn!(error = %e, "session close failed, ignoring");
        }
        result
    }

    async fn retry_loop(
        &self,
        request: &RegistrationRequest,
        context: &dyn AutomationContext,
    ) -> Result<(AttemptOutcome, u32), (RegistrationError, u32)> {
        let max_attempts = self.config.retry.max_attempts;
        let mut last_error = None;
        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                return Err((
                    RegistrationError::Unexpected(anyhow::anyhow!("registration cancelled")),
                    attempt - 1,
                ));
            }
            match self.run_attempt(request, context).await {
                Ok(outcome) => return Ok((outcome, attempt)),
                Err(e) if !e.is_retryable() => return Err((e, attempt)),
                Err(e) => {
                    warn!(
                        request_id = %request.request_id,
                        attempt,
                        error = %e,
                        "registration attempt failed"
                    );
                    last_error = Some(e);
                    if attempt == max_attempts {
                        break;
                    }
                    match self.recovery.recover_session(context).await {
                        Ok(true) => self.stats.lock().await.recoveries += 1,
                        Ok(false) => {
                            return Err((
                                last_error.unwrap_or(RegistrationError::SessionExpired),
                                attempt,
                            ))
                        }
                        Err(e) => return Err((RegistrationError::Unexpected(e), attempt)),
                    }
                }
            }
        }
        Err((
            last_error.unwrap_or_else(|| {
                RegistrationError::Unexpected(anyhow::anyhow!("retries exhausted"))
            }),
            max_attempts,
        ))
    }

    /// One full pass: open the form, harvest its option lists, classify,
    /// fill and confirm.
    async fn run_attempt(
        &self,
        request: &RegistrationRequest,
        context: &dyn AutomationContext,
    ) -> Result<AttemptOutcome, RegistrationError> {
        let mut machine = FormMachine::new(
            context,
            &self.config.selectors,
            &self.config.timing,
            &self.config.retry,
            &self.cancel,
        );
        let form_page = machine.open_form().await?;

        let category_options = machine.category_options(&form_page).await?;
        let brand_options = machine.brand_options(&form_page).await?;

        let (category_id, category_name) = self.classify_category(request, &category_options).await;
        let (brand_id, brand_name) = self.classify_brand(request, &brand_options).await;

        let sale_price = self.config.sale_price(request.cost);
        let plan = FormPlan {
            description: request.description.clone(),
            classification_code: request.cleaned_classification_code(),
            unit: self.config.default_unit.clone(),
            category_id: category_id.clone(),
            brand_id: brand_id.clone(),
            cost: request.cost,
            sale_price,
            tax_regime_code: self.config.tax_regime_code.clone(),
        };
        let generated_code = machine.complete(&form_page, &plan).await?;

        Ok(AttemptOutcome {
            generated_code,
            category_id,
            category_name,
            brand_id,
            brand_name,
            sale_price,
            category_options,
        })
    }

    /// Category classification with graceful degradation: an empty option
    /// list or a miss falls back to the configured default category.
    async fn classify_category(
        &self,
        request: &RegistrationRequest,
        options: &[CategoryOption],
    ) -> (String, String) {
        if options.is_empty() {
            info!(
                request_id = %request.request_id,
                "no category options available, degrading to the default category"
            );
            return (
                self.config.default_category_id.clone(),
                self.config.default_category_name.clone(),
            );
        }
        let table = self.mappings.snapshot().await;
        match self.groups.suggest_category(&request.description, options, &table) {
            Some(id) => {
                let name = options
                    .iter()
                    .find(|o| o.id == id)
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| self.config.default_category_name.clone());
                (id, name)
            }
            None => (
                self.config.default_category_id.clone(),
                self.config.default_category_name.clone(),
            ),
        }
    }

    /// Brand classification against the persisted registry, reconciled with
    /// the options actually on the form. Generic means "no brand".
    async fn classify_brand(
        &self,
        request: &RegistrationRequest,
        form_options: &[BrandOption],
    ) -> (Option<String>, Option<String>) {
        let available = if form_options.is_empty() {
            self.brands.known_brands().await
        } else {
            form_options.to_vec()
        };
        let suggested_id = self.brand_classifier.suggest_brand(&request.description, &available);
        let suggested_name = available
            .iter()
            .find(|b| b.id == suggested_id)
            .map(|b| b.name.clone())
            .unwrap_or_default();

        let resolved = if form_options.is_empty() {
            suggested_id
        } else {
            self.brand_classifier.resolve_against_form_options(
                &suggested_id,
                &suggested_name,
                form_options,
            )
        };
        if resolved == self.config.generic_brand_id {
            return (Some(resolved), None);
        }
        let name = form_options
            .iter()
            .find(|b| b.id == resolved)
            .map(|b| b.name.clone())
            .or(Some(suggested_name).filter(|n| !n.is_empty()));
        (Some(resolved), name)
    }

    /// Persists the confirmed entry, feeds the learners, clears any stale
    /// backlog record.
    async fn finish_success(&self, request: &RegistrationRequest, outcome: &AttemptOutcome) {
        let now = chrono::Utc::now();
        let entry = CatalogEntry {
            generated_code: outcome.generated_code.clone(),
            description: request.description.clone(),
            classification_code: request.cleaned_classification_code(),
            cost: request.cost,
            sale_price: outcome.sale_price,
            category_id: outcome.category_id.clone(),
            category_name: outcome.category_name.clone(),
            brand_id: outcome.brand_id.clone(),
            brand_name: outcome.brand_name.clone(),
            unit: self.config.default_unit.clone(),
            tax_rate: self.config.tax_rate,
            tax_regime_code: self.config.tax_regime_code.clone(),
            markup_percent: self.config.markup_percent,
            created_at: now,
            updated_at: now,
            system_created: true,
            active: true,
        };
        if let Err(e) = self.catalog.append(entry).await {
            // the registration itself succeeded; losing the local record is
            // recoverable via reconciliation, so don't fail the request
            warn!(error = %e, code = %outcome.generated_code, "failed to persist catalog entry");
        }

        // never learn the default fallback: a direct mapping to it would
        // shadow the partial-name fallback for those tokens forever
        let classified = outcome.category_id != self.config.default_category_id;
        if classified && !outcome.category_options.is_empty() {
            let learn = self.mappings.update(|table| {
                self.groups.learn(
                    &request.description,
                    &outcome.category_id,
                    &outcome.category_options,
                    table,
                )
            });
            if let Err(e) = learn.await {
                warn!(error = %e, "failed to persist learned category mappings");
            }
        }

        if let Some(name) = &outcome.brand_name {
            if let Err(e) = self.brands.confirm(name).await {
                warn!(error = %e, brand = %name, "failed to record confirmed brand");
            }
        }

        if let Err(e) = self.backlog.remove(&request.request_id).await {
            warn!(error = %e, "failed to clear stale backlog record");
        }
        self.stats.lock().await.registered += 1;
    }

    async fn finish_failure(
        &self,
        request: &RegistrationRequest,
        error: &RegistrationError,
        attempts: u32,
    ) {
        self.stats.lock().await.failures += 1;
        let mut parked = request.clone();
        parked.attempts += attempts;
        let record = FailureRecord::new(parked, error, request.attempts + attempts);
        if let Err(e) = self.backlog.enqueue(record).await {
            warn!(error = %e, request_id = %request.request_id, "failed to park request in backlog");
        }
    }
}
