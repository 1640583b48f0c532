//! Page objects for the blog client.
//!
//! Each page object wraps a [`Page`] and exposes named locators plus the
//! multi-step interactions scenarios repeat (log in, delete a row, publish a
//! post). Locators are built fresh on every call and resolve lazily, so a
//! page object never holds on to elements from an earlier render.

mod admin;
mod details;
mod editor;
mod home;
mod login;

pub use admin::{AdminDashboard, RowAction};
pub use details::BlogDetailsPage;
pub use editor::{BlogEditor, PostForm};
pub use home::HomePage;
pub use login::{LoginPage, ADMIN_URL_PATTERN};

use crate::expect::expect;
use crate::locator::Locator;
use crate::page::Page;
use crate::result::ProbeResult;
use async_trait::async_trait;

/// A page or view of the application under test
#[async_trait]
pub trait PageObject: Send + Sync {
    /// Path the page lives at, relative to the base URL
    fn path(&self) -> String;

    /// Page this object drives
    fn page(&self) -> &Page;

    /// Element that is visible once the page has rendered
    fn ready_marker(&self) -> ProbeResult<Locator>;

    /// Name used in logs
    fn page_name(&self) -> &'static str {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("page")
    }

    /// Wait for the ready marker
    async fn wait_loaded(&self) -> ProbeResult<()> {
        expect(&self.ready_marker()?).to_be_visible().await
    }

    /// Navigate here and wait until rendered
    async fn open(&self) -> ProbeResult<()> {
        tracing::debug!(page = self.page_name(), path = %self.path(), "opening");
        self.page().goto(&self.path()).await?;
        self.wait_loaded().await
    }
}
