//! Page-automation capability boundary.
//!
//! Everything the pipeline knows about the browser goes through these
//! traits: element lookup, click, fill, attribute reads, page lifecycle.
//! Production wires a real browser-control implementation; tests wire
//! scripted fakes. Nothing above this module may import a UI library.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Opaque handle to a located element, minted by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }
}

/// One browser page (tab). All operations against a single page are called
/// sequentially by the pipeline; implementations need not serialize
/// internally.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn find(&self, selector: &str) -> Result<Option<ElementRef>>;
    async fn find_all(&self, selector: &str) -> Result<Vec<ElementRef>>;
    async fn click(&self, element: &ElementRef) -> Result<()>;
    async fn fill(&self, element: &ElementRef, value: &str) -> Result<()>;
    async fn press_key(&self, element: &ElementRef, key: &str) -> Result<()>;
    async fn get_attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>>;
    async fn inner_text(&self, element: &ElementRef) -> Result<String>;
    async fn is_visible(&self, selector: &str) -> Result<bool>;
    async fn is_enabled(&self, element: &ElementRef) -> Result<bool>;
    async fn current_url(&self) -> Result<String>;
    async fn title(&self) -> Result<String>;
    async fn bring_to_front(&self) -> Result<()>;
    /// Closing is best-effort cleanup; errors are for the caller to suppress.
    async fn close(&self) -> Result<()>;

    /// Fixed settle wait. Fakes override this to a no-op.
    async fn wait_for_timeout(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// One isolated automation context: a main page plus any pages the target
/// application opened on top of it.
#[async_trait]
pub trait AutomationContext: Send + Sync {
    /// All currently open pages, oldest first. Index 0 is the main page.
    async fn pages(&self) -> Result<Vec<Arc<dyn PageDriver>>>;
    fn main_page(&self) -> Arc<dyn PageDriver>;
    /// Releases the context and every page it owns.
    async fn close(&self) -> Result<()>;
}

/// Authenticates a page that landed on the login screen.
#[async_trait]
pub trait LoginHandler: Send + Sync {
    async fn login(&self, page: &dyn PageDriver) -> Result<bool>;
}

/// Creates fresh automation contexts, one per in-flight registration.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn AutomationContext>>;
}
