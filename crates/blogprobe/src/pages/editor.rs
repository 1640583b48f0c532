use super::PageObject;
use crate::locator::Locator;
use crate::page::Page;
use crate::result::ProbeResult;
use crate::selector::TextMatch;

/// Values entered in the post editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostForm {
    /// Title
    pub title: String,
    /// Body typed into the rich-text editor
    pub content: String,
    /// Teaser
    pub excerpt: String,
    /// Category option label
    pub category: String,
}

/// `/admin/blog/new`: post editor
#[derive(Debug, Clone)]
pub struct BlogEditor {
    page: Page,
}

impl BlogEditor {
    /// Wrap `page`
    #[must_use]
    pub fn new(page: &Page) -> Self {
        Self { page: page.clone() }
    }

    /// Title field
    pub fn title_input(&self) -> ProbeResult<Locator> {
        Ok(self.page.locator(".MuiInputBase-root input")?.first())
    }

    /// Rich-text body
    pub fn content_editor(&self) -> ProbeResult<Locator> {
        self.page.locator(".ql-editor")
    }

    /// Excerpt field
    pub fn excerpt_input(&self) -> ProbeResult<Locator> {
        Ok(self.page.locator(".MuiInputBase-root textarea")?.first())
    }

    /// Category dropdown trigger
    pub fn category_dropdown(&self) -> ProbeResult<Locator> {
        self.page
            .get_by_role("combobox", Some(TextMatch::exact("Category")))
    }

    /// Option in the open dropdown
    pub fn option(&self, label: &str) -> ProbeResult<Locator> {
        self.page
            .get_by_role("option", Some(TextMatch::contains_ignore_case(label)))
    }

    /// "Publish Now"
    pub fn publish_button(&self) -> ProbeResult<Locator> {
        self.page
            .get_by_role("button", Some(TextMatch::exact("Publish Now")))
    }

    /// "Save"
    pub fn save_button(&self) -> ProbeResult<Locator> {
        self.page
            .get_by_role("button", Some(TextMatch::exact("Save")))
    }

    /// Open the dropdown and pick `category`
    pub async fn select_category(&self, category: &str) -> ProbeResult<()> {
        self.category_dropdown()?.click().await?;
        self.option(category)?.click().await
    }

    /// Enter every field and publish
    pub async fn publish(&self, form: &PostForm) -> ProbeResult<()> {
        self.title_input()?.type_text(&form.title).await?;
        self.content_editor()?.type_text(&form.content).await?;
        self.excerpt_input()?.type_text(&form.excerpt).await?;
        self.select_category(&form.category).await?;
        self.publish_button()?.click().await
    }
}

impl PageObject for BlogEditor {
    fn path(&self) -> String {
        "/admin/blog/new".to_string()
    }

    fn page(&self) -> &Page {
        &self.page
    }

    fn ready_marker(&self) -> ProbeResult<Locator> {
        self.title_input()
    }
}
