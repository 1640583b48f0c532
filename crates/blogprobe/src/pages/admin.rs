use super::{BlogEditor, PageObject};
use crate::driver::NetworkRecord;
use crate::expect::{expect, expect_page};
use crate::locator::Locator;
use crate::page::{Page, ResponseMatcher};
use crate::result::ProbeResult;
use crate::selector::TextMatch;

/// Per-row buttons in the admin blog table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    /// Open the public page
    View,
    /// Open the editor
    Edit,
    /// Ask to delete
    Delete,
}

impl RowAction {
    /// Button title
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::View => "View",
            Self::Edit => "Edit",
            Self::Delete => "Delete",
        }
    }
}

/// `/admin`: table of posts with row actions
#[derive(Debug, Clone)]
pub struct AdminDashboard {
    page: Page,
}

impl AdminDashboard {
    /// Wrap `page`
    #[must_use]
    pub fn new(page: &Page) -> Self {
        Self { page: page.clone() }
    }

    /// "New Blog Post" button
    pub fn new_blog_button(&self) -> ProbeResult<Locator> {
        self.page
            .get_by_role("button", Some(TextMatch::contains_ignore_case("New Blog Post")))
    }

    /// Table rows
    pub fn rows(&self) -> ProbeResult<Locator> {
        self.page.locator(".MuiTableBody-root .MuiTableRow-root")
    }

    /// Row whose text contains `title`
    pub fn row(&self, title: &str) -> ProbeResult<Locator> {
        Ok(self.rows()?.filter_has_text(TextMatch::contains(title)))
    }

    /// Action button in the row for `title`
    pub fn row_action(&self, title: &str, action: RowAction) -> ProbeResult<Locator> {
        self.row(title)?
            .locator(&format!(r#"button[title="{}"]"#, action.title()))
    }

    /// Confirmation dialog
    pub fn confirm_dialog(&self) -> ProbeResult<Locator> {
        self.page.get_by_role("dialog", None)
    }

    /// Destructive confirm button in the dialog
    pub fn confirm_delete_button(&self) -> ProbeResult<Locator> {
        Ok(self
            .page
            .locator(".MuiButton-containedError")?
            .filter_has_text(TextMatch::exact("Delete")))
    }

    /// Cancel button in the dialog
    pub fn cancel_button(&self) -> ProbeResult<Locator> {
        Ok(self
            .page
            .locator(".MuiButton-textPrimary")?
            .filter_has_text(TextMatch::exact("Cancel")))
    }

    /// Delete the row for `title`, confirm, and wait for the DELETE call and
    /// for the row to disappear
    pub async fn delete_blog(&self, title: &str) -> ProbeResult<NetworkRecord> {
        self.row_action(title, RowAction::Delete)?.click().await?;
        expect(&self.confirm_dialog()?)
            .to_contain_text("Delete Blog Post")
            .await?;
        let confirm = self.confirm_delete_button()?;
        let record = self
            .page
            .expect_response(
                &ResponseMatcher::url("/api/blogs/").method("DELETE"),
                || confirm.click(),
            )
            .await?;
        expect(&self.row(title)?).to_have_count(0).await?;
        Ok(record)
    }

    /// Start deleting `title`, then cancel; the dialog closes and the row stays
    pub async fn cancel_delete(&self, title: &str) -> ProbeResult<()> {
        self.row_action(title, RowAction::Delete)?.click().await?;
        expect(&self.confirm_dialog()?).to_be_visible().await?;
        self.cancel_button()?.click().await?;
        expect(&self.confirm_dialog()?).to_be_hidden().await?;
        expect(&self.row(title)?).to_have_count(1).await
    }

    /// Open the editor for a new post
    pub async fn open_new_blog(&self) -> ProbeResult<BlogEditor> {
        self.new_blog_button()?.click().await?;
        expect_page(&self.page)
            .to_have_url_containing("/admin/blog/new")
            .await?;
        let editor = BlogEditor::new(&self.page);
        editor.wait_loaded().await?;
        Ok(editor)
    }
}

impl PageObject for AdminDashboard {
    fn path(&self) -> String {
        "/admin".to_string()
    }

    fn page(&self) -> &Page {
        &self.page
    }

    fn ready_marker(&self) -> ProbeResult<Locator> {
        self.new_blog_button()
    }
}
