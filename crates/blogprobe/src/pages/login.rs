use super::PageObject;
use crate::expect::expect_page;
use crate::locator::Locator;
use crate::page::Page;
use crate::result::ProbeResult;
use crate::selector::TextMatch;

/// URL of the admin area after a successful login
pub const ADMIN_URL_PATTERN: &str = r"^https?://[^/]+/admin/?$";

/// `/login`: username/password form with Login and Register tabs
#[derive(Debug, Clone)]
pub struct LoginPage {
    page: Page,
}

impl LoginPage {
    /// Wrap `page`
    #[must_use]
    pub fn new(page: &Page) -> Self {
        Self { page: page.clone() }
    }

    /// Username field
    pub fn username_input(&self) -> ProbeResult<Locator> {
        self.page.locator(r#"input[type="text"]"#)
    }

    /// Password field
    pub fn password_input(&self) -> ProbeResult<Locator> {
        self.page.locator(r#"input[type="password"]"#)
    }

    /// Login submit button
    pub fn login_button(&self) -> ProbeResult<Locator> {
        self.page
            .get_by_role("button", Some(TextMatch::exact("Login")))
    }

    /// Register tab
    pub fn register_tab(&self) -> ProbeResult<Locator> {
        self.page
            .get_by_role("tab", Some(TextMatch::exact("Register")))
    }

    /// Register submit button inside the form
    pub fn register_button(&self) -> ProbeResult<Locator> {
        self.page
            .locator("form")?
            .get_by_role("button", Some(TextMatch::exact("Register")))
    }

    /// Alert shown for rejected credentials
    pub fn error_message(&self) -> ProbeResult<Locator> {
        self.page.locator(r#"[class*="MuiAlert-message"]"#)
    }

    /// Fill the form and press Login; does not wait for the outcome
    pub async fn submit_login(&self, username: &str, password: &str) -> ProbeResult<()> {
        self.username_input()?.fill(username).await?;
        self.password_input()?.fill(password).await?;
        self.login_button()?.click().await
    }

    /// Open the page, log in and wait for the admin area
    pub async fn login(&self, username: &str, password: &str) -> ProbeResult<String> {
        self.open().await?;
        self.submit_login(username, password).await?;
        expect_page(&self.page)
            .to_have_url_matching(ADMIN_URL_PATTERN)
            .await
    }

    /// Open the page, switch to Register and submit
    pub async fn register(&self, username: &str, password: &str) -> ProbeResult<()> {
        self.open().await?;
        self.register_tab()?.click().await?;
        self.username_input()?.fill(username).await?;
        self.password_input()?.fill(password).await?;
        self.register_button()?.click().await
    }
}

impl PageObject for LoginPage {
    fn path(&self) -> String {
        "/login".to_string()
    }

    fn page(&self) -> &Page {
        &self.page
    }

    fn ready_marker(&self) -> ProbeResult<Locator> {
        self.password_input()
    }
}
