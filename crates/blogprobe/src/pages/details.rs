use super::PageObject;
use crate::expect::parse_count;
use crate::locator::Locator;
use crate::page::Page;
use crate::result::{ProbeError, ProbeResult};
use crate::selector::TextMatch;

/// `/blog/<id>`: post body, like counter and comments
#[derive(Debug, Clone)]
pub struct BlogDetailsPage {
    page: Page,
    id: u64,
}

impl BlogDetailsPage {
    /// Details of blog `id`
    #[must_use]
    pub fn new(page: &Page, id: u64) -> Self {
        Self {
            page: page.clone(),
            id,
        }
    }

    /// Blog id
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Container holding the post heading and body
    pub fn content(&self) -> ProbeResult<Locator> {
        Ok(self.page.locator("div:has(> h2)")?.first())
    }

    /// Thumb-up button
    pub fn like_button(&self) -> ProbeResult<Locator> {
        self.page
            .locator(r#"button:has(svg[data-testid="ThumbUpIcon"])"#)
    }

    /// "<n> likes" label
    pub fn like_label(&self) -> ProbeResult<Locator> {
        self.page.get_by_text(TextMatch::pattern(r"likes$")?)
    }

    /// Current like count
    pub async fn likes(&self) -> ProbeResult<i64> {
        let text = self.like_label()?.inner_text().await?;
        parse_count(&text)
            .ok_or_else(|| ProbeError::invalid_state(format!("like label {text:?} has no count")))
    }

    /// Press like
    pub async fn like(&self) -> ProbeResult<()> {
        self.like_button()?.click().await
    }

    /// Comment list entries
    pub fn comments(&self) -> ProbeResult<Locator> {
        self.page.locator("ul:has(li)")?.locator("li")
    }

    /// Author field of the comment form
    pub fn comment_author_input(&self) -> ProbeResult<Locator> {
        self.page.locator(r#"input[type="text"][required]"#)
    }

    /// Body field of the comment form
    pub fn comment_body_input(&self) -> ProbeResult<Locator> {
        self.page.locator("textarea[required]")
    }

    /// Author line of the newest comment
    pub fn latest_comment_author(&self) -> ProbeResult<Locator> {
        Ok(self
            .page
            .locator(r#"h6[class*="MuiTypography-subtitle2"]"#)?
            .first())
    }

    /// Fill and submit the comment form
    pub async fn add_comment(&self, author: &str, body: &str) -> ProbeResult<()> {
        self.comment_author_input()?.fill(author).await?;
        self.comment_body_input()?.fill(body).await?;
        self.page.locator("button[type=submit]")?.click().await
    }
}

impl PageObject for BlogDetailsPage {
    fn path(&self) -> String {
        format!("/blog/{}", self.id)
    }

    fn page(&self) -> &Page {
        &self.page
    }

    fn ready_marker(&self) -> ProbeResult<Locator> {
        self.like_label()
    }
}
