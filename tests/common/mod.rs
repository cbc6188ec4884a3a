//! Scripted fakes for the page-automation boundary.
//!
//! `FakePage` plays back a configurable form: which selectors exist, what
//! the select options are, and how the save control behaves. The pipeline
//! under test cannot tell it apart from a real browser page.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use catalog_autoreg::application::RegistrationPipeline;
use catalog_autoreg::infrastructure::backlog::FailureBacklog;
use catalog_autoreg::infrastructure::brand_registry::BrandRegistry;
use catalog_autoreg::infrastructure::catalog_store::CatalogStore;
use catalog_autoreg::infrastructure::config::AutomationConfig;
use catalog_autoreg::infrastructure::mapping_store::MappingStore;
use catalog_autoreg::infrastructure::page::{
    AutomationContext, ElementRef, LoginHandler, PageDriver, SessionProvider,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const NEW_BUTTON: &str = "#btNovo";
pub const DESCRIPTION: &str = "#descricao";
pub const CLASSIFICATION: &str = "#dsNcm";
pub const UNIT: &str = "#cdUnidade";
pub const CATEGORY: &str = "#cdGrupo";
pub const BRAND: &str = "#COD_MARCA";
pub const TAX_WIDGET: &str = "#cstWidget";
pub const TAX_OPTIONS: &str = ".cst-dropdown-option";
pub const COST: &str = "#vlCusto";
pub const SALE_PRICE: &str = "#vlVenda";
pub const SAVE_BUTTON: &str = "#btnSalvar";
pub const CODE_FIELD: &str = "#cod_produto";
pub const ERROR_BOX: &str = ".alert-danger";

#[derive(Debug, Clone)]
pub enum SaveBehavior {
    /// Clicking save populates the identifier field with this value.
    ConfirmWithCode(String),
    /// Clicking save raises a visible error message.
    ShowError(String),
    /// Clicking save does nothing observable.
    Silent,
}

#[derive(Debug, Default)]
struct PageState {
    present: HashSet<String>,
    fields: HashMap<String, String>,
    options: HashMap<String, Vec<(String, String)>>,
    code_value: String,
    save_enabled: bool,
    error_message: Option<String>,
    clicks: Vec<String>,
    navigations: Vec<String>,
    closed: bool,
}

pub struct FakePage {
    url: String,
    title: String,
    state: Mutex<PageState>,
    save_behavior: Mutex<SaveBehavior>,
    fix_on_navigate: Mutex<Option<SaveBehavior>>,
    tab_to_open: Mutex<Option<Arc<FakePage>>>,
    siblings: Mutex<Option<Arc<Mutex<Vec<Arc<FakePage>>>>>>,
}

impl FakePage {
    pub fn new(url: &str, title: &str) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            title: title.to_string(),
            state: Mutex::new(PageState { save_enabled: true, ..Default::default() }),
            save_behavior: Mutex::new(SaveBehavior::Silent),
            fix_on_navigate: Mutex::new(None),
            tab_to_open: Mutex::new(None),
            siblings: Mutex::new(None),
        })
    }

    /// A working page whose entry form renders inline: every form field is
    /// on the page itself.
    pub fn inline_form(code_on_save: &str) -> Arc<Self> {
        let page = Self::new("https://app.example.com/catalog", "Catalog");
        page.add_form_fields();
        page.state.lock().unwrap().present.insert(NEW_BUTTON.into());
        page.set_save_behavior(SaveBehavior::ConfirmWithCode(code_on_save.into()));
        page
    }

    /// A working page with only the create-new control; the form opens as a
    /// separate tab.
    pub fn bare_main() -> Arc<Self> {
        let page = Self::new("https://app.example.com/catalog", "Catalog");
        page.state.lock().unwrap().present.insert(NEW_BUTTON.into());
        page
    }

    /// A standalone form tab.
    pub fn form_tab(code_on_save: &str) -> Arc<Self> {
        let page = Self::new("https://app.example.com/cadastro", "Novo Produto");
        page.add_form_fields();
        page.set_save_behavior(SaveBehavior::ConfirmWithCode(code_on_save.into()));
        page
    }

    fn add_form_fields(&self) {
        let mut state = self.state.lock().unwrap();
        for selector in [
            DESCRIPTION, CLASSIFICATION, UNIT, CATEGORY, BRAND, TAX_WIDGET, COST, SALE_PRICE,
            SAVE_BUTTON, CODE_FIELD,
        ] {
            state.present.insert(selector.into());
        }
        state.options.insert(
            format!("{CATEGORY} option"),
            vec![
                ("101".into(), "INFORMATICA".into()),
                ("102".into(), "ELETRODOMESTICOS".into()),
                ("136".into(), "DIVERSOS".into()),
            ],
        );
        state.options.insert(
            format!("{BRAND} option"),
            vec![
                ("1".into(), "GENERICA".into()),
                ("7".into(), "SAMSUNG".into()),
                ("9".into(), "DELL".into()),
            ],
        );
        state.options.insert(
            TAX_OPTIONS.into(),
            vec![("00".into(), "Regime 00".into()), ("20".into(), "Regime 20".into())],
        );
    }

    pub fn set_save_behavior(&self, behavior: SaveBehavior) {
        *self.save_behavior.lock().unwrap() = behavior;
    }

    /// Heals the page the next time something navigates it: the error goes
    /// away and save starts behaving as given. Models a target application
    /// fixed by a session reload.
    pub fn fix_on_navigate(&self, behavior: SaveBehavior) {
        *self.fix_on_navigate.lock().unwrap() = Some(behavior);
    }

    pub fn clear_error(&self) {
        self.state.lock().unwrap().error_message = None;
    }

    pub fn set_save_enabled(&self, enabled: bool) {
        self.state.lock().unwrap().save_enabled = enabled;
    }

    pub fn preset_code(&self, code: &str) {
        self.state.lock().unwrap().code_value = code.to_string();
    }

    pub fn remove_category_options(&self) {
        self.state.lock().unwrap().options.remove(&format!("{CATEGORY} option"));
    }

    pub fn open_tab_on_new(&self, page: Arc<FakePage>) {
        *self.tab_to_open.lock().unwrap() = Some(page);
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn filled(&self, selector: &str) -> Option<String> {
        self.state.lock().unwrap().fields.get(selector).cloned()
    }

    pub fn was_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn option_entry(&self, handle: &str) -> Option<(String, String)> {
        let mut parts = handle.splitn(3, "::");
        parts.next()?;
        let key = parts.next()?;
        let index: usize = parts.next()?.parse().ok()?;
        self.state.lock().unwrap().options.get(key)?.get(index).cloned()
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.state.lock().unwrap().navigations.push(url.to_string());
        if let Some(behavior) = self.fix_on_navigate.lock().unwrap().take() {
            *self.save_behavior.lock().unwrap() = behavior;
            self.state.lock().unwrap().error_message = None;
        }
        Ok(())
    }

    async fn find(&self, selector: &str) -> Result<Option<ElementRef>> {
        let state = self.state.lock().unwrap();
        if selector == ERROR_BOX && state.error_message.is_some() {
            return Ok(Some(ElementRef::new(ERROR_BOX)));
        }
        Ok(state.present.contains(selector).then(|| ElementRef::new(selector)))
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<ElementRef>> {
        let state = self.state.lock().unwrap();
        let Some(options) = state.options.get(selector) else {
            return Ok(Vec::new());
        };
        Ok((0..options.len())
            .map(|i| ElementRef::new(format!("opt::{selector}::{i}")))
            .collect())
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        let handle = element.0.clone();
        self.state.lock().unwrap().clicks.push(handle.clone());
        if handle == NEW_BUTTON {
            if let Some(tab) = self.tab_to_open.lock().unwrap().take() {
                if let Some(siblings) = self.siblings.lock().unwrap().as_ref() {
                    siblings.lock().unwrap().push(tab);
                }
            }
        }
        if handle == SAVE_BUTTON {
            let behavior = self.save_behavior.lock().unwrap().clone();
            let mut state = self.state.lock().unwrap();
            match behavior {
                SaveBehavior::ConfirmWithCode(code) => state.code_value = code,
                SaveBehavior::ShowError(message) => state.error_message = Some(message),
                SaveBehavior::Silent => {}
            }
        }
        Ok(())
    }

    async fn fill(&self, element: &ElementRef, value: &str) -> Result<()> {
        self.state.lock().unwrap().fields.insert(element.0.clone(), value.to_string());
        Ok(())
    }

    async fn press_key(&self, element: &ElementRef, key: &str) -> Result<()> {
        if key.chars().count() == 1 {
            let mut state = self.state.lock().unwrap();
            state.fields.entry(element.0.clone()).or_default().push_str(key);
        }
        Ok(())
    }

    async fn get_attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        if element.0.starts_with("opt::") {
            return Ok(match name {
                "value" | "data-value" => self.option_entry(&element.0).map(|(id, _)| id),
                _ => None,
            });
        }
        if element.0 == CODE_FIELD && name == "value" {
            return Ok(Some(self.state.lock().unwrap().code_value.clone()));
        }
        Ok(self.state.lock().unwrap().fields.get(&element.0).cloned())
    }

    async fn inner_text(&self, element: &ElementRef) -> Result<String> {
        if element.0.starts_with("opt::") {
            return Ok(self.option_entry(&element.0).map(|(_, name)| name).unwrap_or_default());
        }
        if element.0 == ERROR_BOX {
            return Ok(self.state.lock().unwrap().error_message.clone().unwrap_or_default());
        }
        Ok(String::new())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        if selector == ERROR_BOX {
            return Ok(state.error_message.is_some());
        }
        Ok(state.present.contains(selector))
    }

    async fn is_enabled(&self, element: &ElementRef) -> Result<bool> {
        if element.0 == SAVE_BUTTON {
            return Ok(self.state.lock().unwrap().save_enabled);
        }
        Ok(true)
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.title.clone())
    }

    async fn bring_to_front(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }

    async fn wait_for_timeout(&self, _ms: u64) {}
}

pub struct FakeContext {
    pages: Arc<Mutex<Vec<Arc<FakePage>>>>,
    main: Arc<FakePage>,
}

impl FakeContext {
    pub fn new(main: Arc<FakePage>) -> Arc<Self> {
        let pages = Arc::new(Mutex::new(vec![main.clone()]));
        *main.siblings.lock().unwrap() = Some(pages.clone());
        Arc::new(Self { pages, main })
    }
}

#[async_trait]
impl AutomationContext for FakeContext {
    async fn pages(&self) -> Result<Vec<Arc<dyn PageDriver>>> {
        Ok(self
            .pages
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.clone() as Arc<dyn PageDriver>)
            .collect())
    }

    fn main_page(&self) -> Arc<dyn PageDriver> {
        self.main.clone()
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct FakeSessions {
    context: Arc<FakeContext>,
}

impl FakeSessions {
    pub fn new(context: Arc<FakeContext>) -> Arc<Self> {
        Arc::new(Self { context })
    }
}

#[async_trait]
impl SessionProvider for FakeSessions {
    async fn acquire(&self) -> Result<Arc<dyn AutomationContext>> {
        Ok(self.context.clone())
    }
}

pub struct AlwaysLogin;

#[async_trait]
impl LoginHandler for AlwaysLogin {
    async fn login(&self, _page: &dyn PageDriver) -> Result<bool> {
        Ok(true)
    }
}

pub struct RefusingSessions;

#[async_trait]
impl SessionProvider for RefusingSessions {
    async fn acquire(&self) -> Result<Arc<dyn AutomationContext>> {
        Err(anyhow!("no sessions available"))
    }
}

/// Pipeline plus everything it owns, on a throwaway data directory.
pub struct Harness {
    pub pipeline: RegistrationPipeline,
    pub catalog: Arc<CatalogStore>,
    pub backlog: Arc<FailureBacklog>,
    pub mappings: Arc<MappingStore>,
    _dir: TempDir,
}

/// Millisecond-scale timings so ladder timeouts don't slow the suite.
pub fn fast_config(dir: &TempDir) -> AutomationConfig {
    let mut config = AutomationConfig::default();
    config.data_dir = dir.path().to_path_buf();
    config.timing.poll_interval_ms = 2;
    config.timing.save_timeout_ms = 40;
    config.timing.code_timeout_ms = 40;
    config.timing.detect_timeout_ms = 10;
    config.timing.settle_ms = 1;
    config
}

pub async fn harness(main: Arc<FakePage>) -> Harness {
    let sessions = FakeSessions::new(FakeContext::new(main));
    harness_with_sessions(sessions).await
}

pub async fn harness_with_sessions(sessions: Arc<dyn SessionProvider>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(&dir);
    harness_with_config(sessions, config, dir).await
}

pub async fn harness_with_config(
    sessions: Arc<dyn SessionProvider>,
    config: AutomationConfig,
    dir: TempDir,
) -> Harness {
    let catalog = Arc::new(CatalogStore::open(dir.path().join("catalog.json")).await.unwrap());
    let mappings = Arc::new(MappingStore::open(dir.path().join("mappings.json")).await.unwrap());
    let brands = Arc::new(
        BrandRegistry::open(dir.path().join("brands.json"), &config.brand_blocklist)
            .await
            .unwrap(),
    );
    let backlog = Arc::new(FailureBacklog::open(dir.path().join("backlog")).await.unwrap());
    let pipeline = RegistrationPipeline::new(
        config,
        catalog.clone(),
        mappings.clone(),
        brands,
        backlog.clone(),
        sessions,
        Arc::new(AlwaysLogin),
        CancellationToken::new(),
    );
    Harness { pipeline, catalog, backlog, mappings, _dir: dir }
}
