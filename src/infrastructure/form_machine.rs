//! Form automation state machine.
//!
//! Drives one registration through the target UI: open a fresh entry form,
//! work out where it actually rendered, fill it, submit, and confirm via
//! the asynchronously-populated identifier field. The machine holds no
//! UI-library specifics beyond the selector strings it is configured with,
//! and talks to the browser exclusively through [`PageDriver`].
//!
//! Success has exactly one definition here: the generated-identifier field
//! holds a valid value. Everything else (dialogs, toasts, button state) is
//! treated as a hint, because the target application emits them
//! inconsistently.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::error::RegistrationError;
use crate::domain::options::{BrandOption, CategoryOption};
use crate::infrastructure::config::{FormTimingConfig, RetryConfig, SelectorConfig};
use crate::infrastructure::page::{AutomationContext, ElementRef, PageDriver};
use crate::infrastructure::poll::{poll_until, PollOutcome};

/// Everything the machine needs to fill one form. Built by the pipeline
/// after dedup and classification.
#[derive(Debug, Clone)]
pub struct FormPlan {
    pub description: String,
    pub classification_code: String,
    pub unit: String,
    pub category_id: String,
    /// `None` skips brand selection entirely.
    pub brand_id: Option<String>,
    pub cost: Decimal,
    pub sale_price: Decimal,
    pub tax_regime_code: String,
}

/// Lifecycle phases, for logging and post-mortem inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormPhase {
    Idle,
    FormRequested,
    FormLocated,
    FormFilled,
    SubmitAttempted,
    Confirmed,
    Failed,
}

/// Signal observed while waiting for save confirmation.
enum SaveSignal {
    Code(String),
    ErrorMessage(String),
}

pub struct FormMachine<'a> {
    context: &'a dyn AutomationContext,
    selectors: &'a SelectorConfig,
    timing: &'a FormTimingConfig,
    retry: &'a RetryConfig,
    cancel: &'a CancellationToken,
    phase: FormPhase,
}

impl<'a> FormMachine<'a> {
    pub fn new(
        context: &'a dyn AutomationContext,
        selectors: &'a SelectorConfig,
        timing: &'a FormTimingConfig,
        retry: &'a RetryConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self { context, selectors, timing, retry, cancel, phase: FormPhase::Idle }
    }

    pub fn phase(&self) -> FormPhase {
        self.phase
    }

    /// Runs the whole form lifecycle and returns the generated identifier.
    /// The form page is closed afterwards when it is distinct from the main
    /// page, success or not.
    pub async fn register(&mut self, plan: &FormPlan) -> Result<String, RegistrationError> {
        let form_page = self.open_form().await?;
        self.complete(&form_page, plan).await
    }

    /// First half of the lifecycle: request and locate the form. Callers
    /// that need to read the form's option lists before filling use this
    /// with [`Self::complete`].
    pub async fn open_form(&mut self) -> Result<Arc<dyn PageDriver>, RegistrationError> {
        self.transition(FormPhase::FormRequested);
        let form_page = self.locate_form().await?;
        self.transition(FormPhase::FormLocated);
        Ok(form_page)
    }

    /// Second half: fill, submit, confirm, and close the form page when it
    /// is distinct from the main page.
    pub async fn complete(
        &mut self,
        form_page: &Arc<dyn PageDriver>,
        plan: &FormPlan,
    ) -> Result<String, RegistrationError> {
        let result = self.fill_and_submit(form_page, plan).await;
        self.close_if_secondary(form_page).await;
        match &result {
            Ok(code) => {
                self.transition(FormPhase::Confirmed);
                info!(code = %code, "registration confirmed");
            }
            Err(e) => {
                self.transition(FormPhase::Failed);
                warn!(error = %e, "form lifecycle failed");
            }
        }
        result
    }

    /// Reads the category options currently offered by the form's select.
    pub async fn category_options(
        &self,
        page: &Arc<dyn PageDriver>,
    ) -> Result<Vec<CategoryOption>, RegistrationError> {
        let raw = self.select_options(page, &self.selectors.category).await?;
        Ok(raw.into_iter().map(|(id, name)| CategoryOption::new(id, name)).collect())
    }

    /// Reads the brand options currently offered by the form's select.
    pub async fn brand_options(
        &self,
        page: &Arc<dyn PageDriver>,
    ) -> Result<Vec<BrandOption>, RegistrationError> {
        let raw = self.select_options(page, &self.selectors.brand).await?;
        Ok(raw.into_iter().map(|(id, name)| BrandOption::new(id, name)).collect())
    }

    async fn select_options(
        &self,
        page: &Arc<dyn PageDriver>,
        candidates: &[String],
    ) -> Result<Vec<(String, String)>, RegistrationError> {
        for selector in candidates {
            let option_selector = format!("{selector} option");
            let elements =
                page.find_all(&option_selector).await.map_err(RegistrationError::Unexpected)?;
            if elements.is_empty() {
                continue;
            }
            let mut options = Vec::with_capacity(elements.len());
            for element in elements {
                let value = page
                    .get_attribute(&element, "value")
                    .await
                    .map_err(RegistrationError::Unexpected)?
                    .unwrap_or_default();
                if value.trim().is_empty() {
                    continue;
                }
                let name = page.inner_text(&element).await.map_err(RegistrationError::Unexpected)?;
                options.push((value, name.trim().to_string()));
            }
            return Ok(options);
        }
        Ok(Vec::new())
    }

    async fn fill_and_submit(
        &mut self,
        page: &Arc<dyn PageDriver>,
        plan: &FormPlan,
    ) -> Result<String, RegistrationError> {
        self.fill_form(page, plan).await?;
        self.transition(FormPhase::FormFilled);
        self.submit_and_confirm(page).await
    }

    // ---- form detection ladder ----

    /// Clicks the "create new" action and works out where the form rendered:
    /// new tab, modal, new window, current page, or (last resort) any open
    /// page that has the form fields.
    async fn locate_form(&self) -> Result<Arc<dyn PageDriver>, RegistrationError> {
        let main = self.context.main_page();
        let pages_before = self.pages().await?.len();

        let Some(new_button) = self.find_first(&main, &self.selectors.new_button).await? else {
            return Err(RegistrationError::FormNotFound(
                "create-new control not present on main page".into(),
            ));
        };
        main.click(&new_button).await.map_err(RegistrationError::Unexpected)?;

        if let Some(page) = self.wait_for_new_tab(pages_before).await? {
            debug!("form rendered in a new tab");
            return Ok(page);
        }
        if self.wait_for_modal(&main).await? {
            debug!("form rendered as a modal on the main page");
            return Ok(main);
        }
        if let Some(page) = self.find_form_window(&main).await? {
            debug!("form rendered in a separate window");
            return Ok(page);
        }
        if self.find_first(&main, &self.selectors.description).await?.is_some() {
            debug!("form rendered inline on the current page");
            return Ok(main);
        }
        if let Some(page) = self.aggressive_form_scan().await? {
            debug!("form located by scanning all open pages");
            return Ok(page);
        }
        Err(RegistrationError::FormNotFound(
            "form did not appear as a tab, modal, window, or inline fields".into(),
        ))
    }

    async fn wait_for_new_tab(
        &self,
        pages_before: usize,
    ) -> Result<Option<Arc<dyn PageDriver>>, RegistrationError> {
        let outcome = poll_until(
            self.interval(),
            Duration::from_millis(self.timing.detect_timeout_ms),
            self.cancel,
            || async move {
                let pages = self.context.pages().await?;
                Ok((pages.len() > pages_before).then(|| pages.last().cloned()).flatten())
            },
        )
        .await
        .map_err(RegistrationError::Unexpected)?;
        match outcome {
            PollOutcome::Completed(page) => {
                page.bring_to_front().await.map_err(RegistrationError::Unexpected)?;
                Ok(Some(page))
            }
            PollOutcome::TimedOut => Ok(None),
            PollOutcome::Cancelled => Err(self.cancelled()),
        }
    }

    async fn wait_for_modal(&self, main: &Arc<dyn PageDriver>) -> Result<bool, RegistrationError> {
        let outcome = poll_until(
            self.interval(),
            Duration::from_millis(self.timing.detect_timeout_ms),
            self.cancel,
            || async move {
                for selector in &self.selectors.modal {
                    if main.is_visible(selector).await? {
                        return Ok(Some(()));
                    }
                }
                Ok(None)
            },
        )
        .await
        .map_err(RegistrationError::Unexpected)?;
        match outcome {
            // a visible modal only counts when the form fields are inside it
            PollOutcome::Completed(()) => Ok(self
                .find_first(main, &self.selectors.description)
                .await?
                .is_some()),
            PollOutcome::TimedOut => Ok(false),
            PollOutcome::Cancelled => Err(self.cancelled()),
        }
    }

    /// Looks for an open page, other than the main one, whose URL or title
    /// marks it as the entry form.
    async fn find_form_window(
        &self,
        main: &Arc<dyn PageDriver>,
    ) -> Result<Option<Arc<dyn PageDriver>>, RegistrationError> {
        let main_url = main.current_url().await.map_err(RegistrationError::Unexpected)?;
        for page in self.pages().await? {
            if Arc::ptr_eq(&page, main) {
                continue;
            }
            let url = page.current_url().await.map_err(RegistrationError::Unexpected)?;
            let title = page.title().await.map_err(RegistrationError::Unexpected)?;
            let looks_like_form = url != main_url
                && (url.to_lowercase().contains("cadastro")
                    || title.to_lowercase().contains("cadastro")
                    || title.to_lowercase().contains("novo"));
            if looks_like_form {
                page.bring_to_front().await.map_err(RegistrationError::Unexpected)?;
                return Ok(Some(page));
            }
        }
        Ok(None)
    }

    /// Last-resort sweep: any open page carrying both the description field
    /// and the identifier field is accepted as the form.
    async fn aggressive_form_scan(&self) -> Result<Option<Arc<dyn PageDriver>>, RegistrationError> {
        for page in self.pages().await? {
            let has_description = self.find_first(&page, &self.selectors.description).await?.is_some();
            let has_code_field =
                self.find_first(&page, &self.selectors.generated_code).await?.is_some();
            if has_description && has_code_field {
                page.bring_to_front().await.map_err(RegistrationError::Unexpected)?;
                return Ok(Some(page));
            }
        }
        Ok(None)
    }

    // ---- filling ----

    async fn fill_form(
        &self,
        page: &Arc<dyn PageDriver>,
        plan: &FormPlan,
    ) -> Result<(), RegistrationError> {
        let description = self.require(page, &self.selectors.description, "description").await?;
        page.fill(&description, &plan.description)
            .await
            .map_err(RegistrationError::Unexpected)?;

        self.fill_classification(page, &plan.classification_code).await?;

        let unit = self.require(page, &self.selectors.unit, "unit").await?;
        page.fill(&unit, &plan.unit).await.map_err(RegistrationError::Unexpected)?;

        let category = self.require(page, &self.selectors.category, "category").await?;
        page.fill(&category, &plan.category_id)
            .await
            .map_err(RegistrationError::Unexpected)?;

        self.select_tax_regime(page, &plan.tax_regime_code).await?;

        let cost = self.require(page, &self.selectors.cost, "cost").await?;
        page.fill(&cost, &format_money(plan.cost))
            .await
            .map_err(RegistrationError::Unexpected)?;

        let sale_price = self.require(page, &self.selectors.sale_price, "sale price").await?;
        page.fill(&sale_price, &format_money(plan.sale_price))
            .await
            .map_err(RegistrationError::Unexpected)?;

        if let Some(brand_id) = &plan.brand_id {
            // brand failure never blocks registration
            if let Err(e) = self.fill_brand(page, brand_id).await {
                warn!(error = %e, "brand selection failed, registering without a brand");
            }
        }
        Ok(())
    }

    /// Classification uses a type-ahead widget: type character by character,
    /// click the suggestion when one appears, tab out otherwise.
    async fn fill_classification(
        &self,
        page: &Arc<dyn PageDriver>,
        code: &str,
    ) -> Result<(), RegistrationError> {
        let field = self.require(page, &self.selectors.classification_code, "classification").await?;
        page.click(&field).await.map_err(RegistrationError::Unexpected)?;
        for ch in code.chars() {
            page.press_key(&field, &ch.to_string())
                .await
                .map_err(RegistrationError::Unexpected)?;
        }
        page.wait_for_timeout(self.timing.settle_ms).await;
        match self.find_first(page, &self.selectors.classification_suggestion).await? {
            Some(suggestion) => {
                page.click(&suggestion).await.map_err(RegistrationError::Unexpected)?
            }
            None => page
                .press_key(&field, "Tab")
                .await
                .map_err(RegistrationError::Unexpected)?,
        }
        Ok(())
    }

    /// The tax field is a custom dropdown widget: open it, click the option
    /// carrying the regime code, and it closes itself on selection.
    async fn select_tax_regime(
        &self,
        page: &Arc<dyn PageDriver>,
        regime_code: &str,
    ) -> Result<(), RegistrationError> {
        let widget = self.require(page, &self.selectors.tax_widget, "tax widget").await?;
        page.click(&widget).await.map_err(RegistrationError::Unexpected)?;
        page.wait_for_timeout(self.timing.settle_ms).await;
        for selector in &self.selectors.tax_option {
            let options = page.find_all(selector).await.map_err(RegistrationError::Unexpected)?;
            for option in options {
                let value = page
                    .get_attribute(&option, "data-value")
                    .await
                    .map_err(RegistrationError::Unexpected)?;
                if value.as_deref() == Some(regime_code) {
                    page.click(&option).await.map_err(RegistrationError::Unexpected)?;
                    return Ok(());
                }
            }
        }
        Err(RegistrationError::Unexpected(anyhow!(
            "tax regime option {regime_code} not present in dropdown"
        )))
    }

    async fn fill_brand(&self, page: &Arc<dyn PageDriver>, brand_id: &str) -> Result<()> {
        let Some(brand) = self.find_first(page, &self.selectors.brand).await? else {
            return Err(anyhow!("brand select not found"));
        };
        page.fill(&brand, brand_id).await?;
        // the select silently ignores values it has no option for
        let selected = page.get_attribute(&brand, "value").await?.unwrap_or_default();
        if selected != brand_id {
            return Err(anyhow!("brand select rejected value {brand_id}, kept {selected:?}"));
        }
        Ok(())
    }

    // ---- submit and confirmation ----

    async fn submit_and_confirm(
        &mut self,
        page: &Arc<dyn PageDriver>,
    ) -> Result<String, RegistrationError> {
        // a previous attempt may have silently succeeded
        if let Some(code) = self.read_generated_code(page).await? {
            info!(code = %code, "form already in saved state, skipping submit");
            return Ok(code);
        }

        let mut last_error: Option<String> = None;
        for attempt in 1..=self.retry.save_attempts {
            self.transition(FormPhase::SubmitAttempted);
            let Some(save) = self.find_first(page, &self.selectors.save_button).await? else {
                return Err(RegistrationError::SaveFailed("save control not found".into()));
            };
            let enabled = page.is_enabled(&save).await.map_err(RegistrationError::Unexpected)?;
            if !enabled {
                // a disabled save control can itself mean the save happened
                if let Some(code) = self.read_generated_code(page).await? {
                    return Ok(code);
                }
                debug!(attempt, "save control disabled, waiting before retry");
                page.wait_for_timeout(self.timing.settle_ms).await;
                continue;
            }
            page.click(&save).await.map_err(RegistrationError::Unexpected)?;

            // shared reborrow so the probe closure stays FnMut
            let this = &*self;
            let outcome = poll_until(
                this.interval(),
                Duration::from_millis(this.timing.save_timeout_ms),
                this.cancel,
                || async move { this.probe_save_signal(page).await },
            )
            .await
            .map_err(RegistrationError::Unexpected)?;

            match outcome {
                PollOutcome::Completed(SaveSignal::Code(code)) => return Ok(code),
                PollOutcome::Completed(SaveSignal::ErrorMessage(message)) => {
                    warn!(attempt, message = %message, "target application rejected the save");
                    last_error = Some(message);
                }
                PollOutcome::TimedOut => {
                    warn!(attempt, "no save confirmation within the deadline");
                }
                PollOutcome::Cancelled => return Err(self.cancelled()),
            }
        }

        // the identifier field sometimes lags the final attempt; a silent
        // save (no code, no error ever observed) is its own failure kind
        match (self.wait_for_generated_code(page).await?, last_error) {
            (Some(code), _) => Ok(code),
            (None, Some(message)) => Err(RegistrationError::SaveFailed(message)),
            (None, None) => Err(RegistrationError::CodeNotGenerated(
                "no identifier appeared after exhausting save attempts".into(),
            )),
        }
    }

    async fn probe_save_signal(&self, page: &Arc<dyn PageDriver>) -> Result<Option<SaveSignal>> {
        if let Some(code) = self.read_generated_code(page).await.map_err(flatten)? {
            return Ok(Some(SaveSignal::Code(code)));
        }
        for selector in &self.selectors.error_message {
            if page.is_visible(selector).await? {
                let message = match page.find(selector).await? {
                    Some(element) => page.inner_text(&element).await?,
                    None => String::from("unspecified form error"),
                };
                return Ok(Some(SaveSignal::ErrorMessage(message)));
            }
        }
        Ok(None)
    }

    /// Active wait for the identifier field, used when the save looked
    /// accepted but the field had not populated yet.
    async fn wait_for_generated_code(
        &self,
        page: &Arc<dyn PageDriver>,
    ) -> Result<Option<String>, RegistrationError> {
        let outcome = poll_until(
            self.interval(),
            Duration::from_millis(self.timing.code_timeout_ms),
            self.cancel,
            || async move { self.read_generated_code(page).await.map_err(flatten) },
        )
        .await
        .map_err(RegistrationError::Unexpected)?;
        match outcome {
            PollOutcome::Completed(code) => Ok(Some(code)),
            PollOutcome::TimedOut => Ok(None),
            PollOutcome::Cancelled => Err(self.cancelled()),
        }
    }

    async fn read_generated_code(
        &self,
        page: &Arc<dyn PageDriver>,
    ) -> Result<Option<String>, RegistrationError> {
        let Some(field) = self.find_first(page, &self.selectors.generated_code).await? else {
            return Ok(None);
        };
        let value = page
            .get_attribute(&field, "value")
            .await
            .map_err(RegistrationError::Unexpected)?
            .unwrap_or_default();
        Ok(is_valid_generated_code(&value).then(|| value.trim().to_string()))
    }

    // ---- helpers ----

    async fn find_first(
        &self,
        page: &Arc<dyn PageDriver>,
        candidates: &[String],
    ) -> Result<Option<ElementRef>, RegistrationError> {
        for selector in candidates {
            if let Some(element) =
                page.find(selector).await.map_err(RegistrationError::Unexpected)?
            {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    async fn require(
        &self,
        page: &Arc<dyn PageDriver>,
        candidates: &[String],
        field: &str,
    ) -> Result<ElementRef, RegistrationError> {
        self.find_first(page, candidates).await?.ok_or_else(|| {
            RegistrationError::Unexpected(anyhow!("{field} field not found on located form"))
        })
    }

    async fn pages(&self) -> Result<Vec<Arc<dyn PageDriver>>, RegistrationError> {
        self.context.pages().await.map_err(RegistrationError::Unexpected)
    }

    async fn close_if_secondary(&self, form_page: &Arc<dyn PageDriver>) {
        if Arc::ptr_eq(form_page, &self.context.main_page()) {
            return;
        }
        if let Err(e) = form_page.close().await {
            debug!(error = %e, "form page close failed, ignoring");
        }
    }

    fn transition(&mut self, next: FormPhase) {
        debug!(from = ?self.phase, to = ?next, "form phase transition");
        self.phase = next;
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(self.timing.poll_interval_ms)
    }

    fn cancelled(&self) -> RegistrationError {
        RegistrationError::Unexpected(anyhow!("registration cancelled"))
    }
}

fn flatten(e: RegistrationError) -> anyhow::Error {
    anyhow!(e)
}

fn format_money(value: Decimal) -> String {
    value.round_dp(2).to_string()
}

/// A generated identifier counts as valid only when it is non-empty, not a
/// run of zeros, plausibly sized, and mostly numeric.
pub fn is_valid_generated_code(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.chars().all(|c| c == '0') {
        return false;
    }
    if trimmed.len() < 4 || trimmed.len() > 10 {
        return false;
    }
    trimmed.chars().filter(|c| c.is_ascii_digit()).count() >= 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case("PRD00123", true)]
    #[case("123456", true)]
    #[case("  100123  ", true)]
    #[case("", false)]
    #[case("000000", false)]
    #[case("123", false)]
    #[case("12345678901", false)]
    #[case("ABCDEF12", false)]
    fn generated_code_validity_rules(#[case] value: &str, #[case] valid: bool) {
        assert_eq!(is_valid_generated_code(value), valid, "value: {value:?}");
    }

    #[test]
    fn money_formatting_keeps_two_decimals() {
        assert_eq!(format_money(dec!(3625.00)), "3625.00");
        assert_eq!(format_money(dec!(19.999)), "20.00");
    }
}
