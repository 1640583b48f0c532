use super::PageObject;
use crate::expect::parse_count;
use crate::locator::Locator;
use crate::page::Page;
use crate::result::{ProbeError, ProbeResult};
use crate::selector::TextMatch;

/// `/`: blog card grid with search, pagination and theme toggle
#[derive(Debug, Clone)]
pub struct HomePage {
    page: Page,
}

impl HomePage {
    /// Wrap `page`
    #[must_use]
    pub fn new(page: &Page) -> Self {
        Self { page: page.clone() }
    }

    /// Every blog card on the current page
    pub fn blog_cards(&self) -> ProbeResult<Locator> {
        self.page.locator("div.MuiCard-root")
    }

    /// The card whose heading contains `title`
    pub fn card(&self, title: &str) -> ProbeResult<Locator> {
        Ok(self
            .blog_cards()?
            .filter_has_text(TextMatch::contains(title)))
    }

    /// Card headings
    pub fn card_titles(&self) -> ProbeResult<Locator> {
        self.blog_cards()?.locator("h2")
    }

    /// "Read More" on the card for `title`
    pub fn read_more(&self, title: &str) -> ProbeResult<Locator> {
        self.card(title)?
            .get_by_role("button", Some(TextMatch::exact("Read More")))
    }

    /// "Read" chip on the card for `title`
    pub fn read_chip(&self, title: &str) -> ProbeResult<Locator> {
        Ok(self
            .card(title)?
            .locator(".MuiChip-label")?
            .filter_has_text(TextMatch::exact("Read")))
    }

    /// Search box
    pub fn search_input(&self) -> ProbeResult<Locator> {
        self.page
            .get_by_placeholder(TextMatch::exact("Search blogs..."))
    }

    /// Type a keyword and submit with Enter
    pub async fn search(&self, keyword: &str) -> ProbeResult<()> {
        let input = self.search_input()?;
        input.fill(keyword).await?;
        input.press("Enter").await
    }

    /// Next-page control
    pub fn next_page(&self) -> ProbeResult<Locator> {
        self.page.locator(r#"[aria-label="Go to next page"]"#)
    }

    /// Previous-page control
    pub fn previous_page(&self) -> ProbeResult<Locator> {
        self.page.locator(r#"[aria-label="Go to previous page"]"#)
    }

    /// Highlighted page number
    pub fn current_page_indicator(&self) -> ProbeResult<Locator> {
        self.page
            .locator(r#".MuiPaginationItem-circular[aria-current="true"]"#)
    }

    /// Number shown on the highlighted page button
    pub async fn current_page(&self) -> ProbeResult<i64> {
        let text = self.current_page_indicator()?.inner_text().await?;
        parse_count(&text).ok_or_else(|| {
            ProbeError::invalid_state(format!("page indicator {text:?} is not a number"))
        })
    }

    /// Open `/?page=<n>` directly
    pub async fn open_page(&self, n: u32) -> ProbeResult<()> {
        self.page.goto(&format!("/?page={n}")).await?;
        self.wait_loaded().await
    }

    /// Header theme toggle; its title names the mode it switches to
    pub fn theme_toggle(&self) -> ProbeResult<Locator> {
        self.page.locator(".MuiIconButton-colorInherit")
    }

    /// Flip the theme
    pub async fn toggle_theme(&self) -> ProbeResult<()> {
        self.theme_toggle()?.click().await
    }
}

impl PageObject for HomePage {
    fn path(&self) -> String {
        "/".to_string()
    }

    fn page(&self) -> &Page {
        &self.page
    }

    fn ready_marker(&self) -> ProbeResult<Locator> {
        Ok(self.blog_cards()?.first())
    }
}
