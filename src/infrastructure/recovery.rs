//! Session recovery between registration attempts.
//!
//! When a whole attempt fails the pipeline calls in here before retrying:
//! reload the working page, figure out whether the session fell back to the
//! login screen, re-authenticate if so, and verify the working page is
//! actually usable again. Stray tabs left behind by a crashed attempt are
//! closed along the way.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::infrastructure::config::{FormTimingConfig, SelectorConfig};
use crate::infrastructure::page::{AutomationContext, LoginHandler, PageDriver};

/// What the current page looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Login,
    Application,
    Unknown,
}

pub struct RecoveryManager {
    work_url: String,
    selectors: SelectorConfig,
    timing: FormTimingConfig,
    login: Arc<dyn LoginHandler>,
    cancel: CancellationToken,
}

impl RecoveryManager {
    pub fn new(
        work_url: impl Into<String>,
        selectors: SelectorConfig,
        timing: FormTimingConfig,
        login: Arc<dyn LoginHandler>,
        cancel: CancellationToken,
    ) -> Self {
        Self { work_url: work_url.into(), selectors, timing, login, cancel }
    }

    /// Probes incidental signals to decide where the session landed: login
    /// fields mean the login screen, the create-new control means the
    /// working page.
    pub async fn classify_page(&self, page: &dyn PageDriver) -> Result<PageKind> {
        for selector in &self.selectors.login_user {
            if page.is_visible(selector).await? {
                for password in &self.selectors.login_password {
                    if page.is_visible(password).await? {
                        return Ok(PageKind::Login);
                    }
                }
            }
        }
        for selector in &self.selectors.new_button {
            if page.find(selector).await?.is_some() {
                return Ok(PageKind::Application);
            }
        }
        Ok(PageKind::Unknown)
    }

    /// Full recovery pass. Returns `Ok(true)` when the working page is back
    /// with its create-new control enabled; `Ok(false)` when recovery ran
    /// but the page never became usable.
    pub async fn recover_session(&self, context: &dyn AutomationContext) -> Result<bool> {
        if self.cancel.is_cancelled() {
            return Ok(false);
        }
        info!("attempting session recovery");
        self.close_extra_tabs(context).await;

        let main = context.main_page();
        main.navigate(&self.work_url)
            .await
            .context("failed to reload the working page")?;
        main.wait_for_timeout(self.timing.settle_ms).await;

        match self.classify_page(main.as_ref()).await? {
            PageKind::Login => {
                info!("session fell back to the login screen, re-authenticating");
                if !self.login.login(main.as_ref()).await? {
                    warn!("re-authentication failed");
                    return Ok(false);
                }
                main.navigate(&self.work_url)
                    .await
                    .context("failed to return to the working page after login")?;
                main.wait_for_timeout(self.timing.settle_ms).await;
            }
            PageKind::Application => debug!("session still authenticated"),
            PageKind::Unknown => {
                warn!("page after reload is neither login nor working page");
                return Ok(false);
            }
        }

        self.verify_working_page(main.as_ref()).await
    }

    /// The working page counts as recovered only when the create-new
    /// control is present and enabled.
    async fn verify_working_page(&self, page: &dyn PageDriver) -> Result<bool> {
        for selector in &self.selectors.new_button {
            if let Some(button) = page.find(selector).await? {
                let enabled = page.is_enabled(&button).await?;
                if enabled {
                    info!("session recovered");
                    return Ok(true);
                }
                warn!(selector = %selector, "create-new control present but disabled");
                return Ok(false);
            }
        }
        warn!("create-new control missing after recovery");
        Ok(false)
    }

    /// Closes every page except the main one. Best-effort: close errors are
    /// logged and ignored.
    pub async fn close_extra_tabs(&self, context: &dyn AutomationContext) {
        let Ok(pages) = context.pages().await else {
            return;
        };
        let main = context.main_page();
        for page in pages {
            if Arc::ptr_eq(&page, &main) {
                continue;
            }
            debug!("closing stray tab");
            if let Err(e) = page.close().await {
                debug!(error = %e, "stray tab close failed, ignoring");
            }
        }
    }
}
