//! Page facade: navigation, locator factories and network waits.

use crate::driver::{Capture, NetworkRecord, SharedDriver};
use crate::locator::{Locator, LocatorOptions};
use crate::poll::{self, Check, Condition};
use crate::result::{ProbeError, ProbeResult};
use crate::selector::{Selector, TextMatch};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Matches completed network responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMatcher {
    /// Substring of the request URL
    pub url_contains: String,
    /// HTTP method, compared case-insensitively
    #[serde(default)]
    pub method: Option<String>,
    /// Exact status
    #[serde(default)]
    pub status: Option<u16>,
}

impl ResponseMatcher {
    /// Match any response whose URL contains `part`
    #[must_use]
    pub fn url(part: impl Into<String>) -> Self {
        Self {
            url_contains: part.into(),
            method: None,
            status: None,
        }
    }

    /// Restrict to a method
    #[must_use]
    pub fn method(mut self, method: &str) -> Self {
        self.method = Some(method.to_uppercase());
        self
    }

    /// Restrict to a status
    #[must_use]
    pub const fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Test a record
    #[must_use]
    pub fn matches(&self, record: &NetworkRecord) -> bool {
        record.url.contains(&self.url_contains)
            && self
                .method
                .as_deref()
                .map_or(true, |m| record.method.eq_ignore_ascii_case(m))
            && self.status.map_or(true, |s| record.status == s)
    }
}

impl fmt::Display for ResponseMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} *{}*", self.method.as_deref().unwrap_or("ANY"), self.url_contains)?;
        if let Some(status) = self.status {
            write!(f, " -> {status}")?;
        }
        Ok(())
    }
}

/// A page in the application under test
#[derive(Debug, Clone)]
pub struct Page {
    driver: SharedDriver,
    base_url: String,
    options: LocatorOptions,
}

impl Page {
    /// Wrap a driver; relative paths resolve against `base_url`
    #[must_use]
    pub fn new(driver: SharedDriver, base_url: impl Into<String>) -> Self {
        Self {
            driver,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            options: LocatorOptions::default(),
        }
    }

    /// Options applied to every locator created from this page
    #[must_use]
    pub fn with_options(mut self, options: LocatorOptions) -> Self {
        self.options = options;
        self
    }

    /// Locator options
    #[must_use]
    pub const fn options(&self) -> &LocatorOptions {
        &self.options
    }

    /// Underlying driver
    #[must_use]
    pub const fn driver(&self) -> &SharedDriver {
        &self.driver
    }

    /// Base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a path
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    /// Navigate to a path or absolute URL
    pub async fn goto(&self, path: &str) -> ProbeResult<()> {
        let url = self.url_for(path);
        tracing::info!(%url, "goto");
        self.driver.goto(&url).await
    }

    /// Reload, keeping persisted browser state
    pub async fn reload(&self) -> ProbeResult<()> {
        self.driver.reload().await
    }

    /// Current URL
    pub async fn url(&self) -> ProbeResult<String> {
        self.driver.current_url().await
    }

    // -------------------------------------------------------------------------
    // Locator factories
    // -------------------------------------------------------------------------

    /// Locator for any selector tree
    #[must_use]
    pub fn select(&self, selector: Selector) -> Locator {
        Locator::new(self.driver.clone(), selector).with_options(self.options.clone())
    }

    /// CSS locator
    pub fn locator(&self, css: &str) -> ProbeResult<Locator> {
        Ok(self.select(Selector::css(css)?))
    }

    /// Locator by ARIA role
    pub fn get_by_role(&self, role: &str, name: Option<TextMatch>) -> ProbeResult<Locator> {
        Ok(self.select(Selector::role(role, name)?))
    }

    /// Locator by visible text
    pub fn get_by_text(&self, text: TextMatch) -> ProbeResult<Locator> {
        Ok(self.select(Selector::text(text)?))
    }

    /// Locator by label text
    pub fn get_by_label(&self, text: TextMatch) -> ProbeResult<Locator> {
        Ok(self.select(Selector::label(text)?))
    }

    /// Locator by placeholder
    pub fn get_by_placeholder(&self, text: TextMatch) -> ProbeResult<Locator> {
        Ok(self.select(Selector::placeholder(text)?))
    }

    /// Locator by `data-testid`
    pub fn get_by_test_id(&self, id: &str) -> ProbeResult<Locator> {
        Ok(self.select(Selector::test_id(id)?))
    }

    // -------------------------------------------------------------------------
    // Browser state
    // -------------------------------------------------------------------------

    /// Read local storage
    pub async fn local_storage(&self, key: &str) -> ProbeResult<Option<String>> {
        self.driver.local_storage(key).await
    }

    /// Screenshot or DOM dump
    pub async fn capture(&self) -> ProbeResult<Capture> {
        self.driver.capture().await
    }

    // -------------------------------------------------------------------------
    // Waits
    // -------------------------------------------------------------------------

    /// Wait until the URL matches
    pub async fn wait_for_url(&self, matcher: &TextMatch) -> ProbeResult<String> {
        let what = Condition::new("page url", "match", matcher.to_string());
        let driver = &self.driver;
        let polled = poll::wait_until(&what, &self.options.poll(), move || async move {
            let url = driver.current_url().await?;
            Ok::<_, ProbeError>(if matcher.matches(&url) {
                Check::Pass(url)
            } else {
                Check::pending(url)
            })
        })
        .await?;
        Ok(polled.value)
    }

    async fn response_cursor(&self) -> ProbeResult<u64> {
        Ok(self
            .driver
            .responses()
            .await?
            .iter()
            .map(|r| r.seq)
            .max()
            .unwrap_or(0))
    }

    async fn response_after(&self, cursor: u64, matcher: &ResponseMatcher) -> ProbeResult<NetworkRecord> {
        let what = Condition::new("network", "receive a response", matcher.to_string());
        let driver = &self.driver;
        let polled = poll::wait_until(&what, &self.options.poll(), move || async move {
            let responses = driver.responses().await?;
            let fresh: Vec<&NetworkRecord> = responses.iter().filter(|r| r.seq > cursor).collect();
            let hit = fresh.iter().find(|r| matcher.matches(r)).map(|r| (*r).clone());
            Ok::<_, ProbeError>(match hit {
                Some(record) => Check::Pass(record),
                None => Check::pending(format!("{} new responses, none matching", fresh.len())),
            })
        })
        .await?;
        Ok(polled.value)
    }

    /// Wait for a response that arrives after this call
    pub async fn wait_for_response(&self, matcher: &ResponseMatcher) -> ProbeResult<NetworkRecord> {
        let cursor = self.response_cursor().await?;
        self.response_after(cursor, matcher).await
    }

    /// Run `action` and wait for the response it triggers.
    ///
    /// The cursor is taken before the action runs, so a response that lands
    /// while the action is still in flight is not missed.
    pub async fn expect_response<F, Fut>(
        &self,
        matcher: &ResponseMatcher,
        action: F,
    ) -> ProbeResult<NetworkRecord>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProbeResult<()>>,
    {
        let cursor = self.response_cursor().await?;
        action().await?;
        let record = self.response_after(cursor, matcher).await?;
        tracing::debug!(url = %record.url, status = record.status, "response observed");
        Ok(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dom::{El, VirtualPage};
    use std::sync::Arc;
    use std::time::Duration;

    fn record(method: &str, url: &str, status: u16) -> NetworkRecord {
        NetworkRecord {
            seq: 1,
            method: method.into(),
            url: url.into(),
            status,
            body: None,
        }
    }

    #[test]
    fn test_response_matcher() {
        let m = ResponseMatcher::url("/api/blogs/").method("delete");
        assert!(m.matches(&record("DELETE", "http://localhost:3001/api/blogs/7", 200)));
        assert!(!m.matches(&record("GET", "http://localhost:3001/api/blogs/7", 200)));
        let m = m.status(204);
        assert!(!m.matches(&record("DELETE", "http://localhost:3001/api/blogs/7", 200)));
        assert_eq!(m.to_string(), "DELETE */api/blogs/* -> 204");
    }

    #[test]
    fn test_url_for() {
        let vp = VirtualPage::new("http://app.test");
        let page = Page::new(Arc::new(vp), "http://localhost:5173/");
        assert_eq!(page.url_for("/login"), "http://localhost:5173/login");
        assert_eq!(page.url_for("login"), "http://localhost:5173/login");
        assert_eq!(page.url_for("http://x/y"), "http://x/y");
    }

    async fn api_page() -> Page {
        let vp = VirtualPage::new("http://app.test");
        vp.route("/", |state| {
            state.render(vec![El::new("button").attr("id", "del").text("Delete")]);
            state.fetch("GET", "http://api.test/api/blogs", 200, None, Duration::ZERO, |_| {});
        })
        .unwrap();
        vp.on("click", "#del", |state, _| {
            state.fetch(
                "DELETE",
                "http://api.test/api/blogs/1",
                200,
                Some(serde_json::json!({"message": "Blog deleted"})),
                Duration::from_millis(30),
                |state| {
                    let btn = state.doc().query_css("#del").unwrap()[0];
                    state.doc_mut().remove(btn);
                },
            );
        })
        .unwrap();
        let page = Page::new(Arc::new(vp), "http://app.test");
        page.goto("/").await.unwrap();
        page
    }

    #[tokio::test(start_paused = true)]
    async fn test_expect_response_sees_only_new_responses() {
        let page = api_page().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        let matcher = ResponseMatcher::url("/api/blogs").method("DELETE");
        let del = page.locator("#del").unwrap();
        let record = page
            .expect_response(&matcher, || del.click())
            .await
            .unwrap();
        assert_eq!(record.status, 200);
        assert_eq!(record.body.unwrap()["message"], "Blog deleted");
        assert_eq!(page.locator("#del").unwrap().count().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_response_ignores_earlier_ones() {
        let page = api_page().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        let _ = page.driver().responses().await.unwrap();
        let mut options = page.options().clone();
        options.timeout = Duration::from_millis(200);
        let page = page.with_options(options);
        let err = page
            .wait_for_response(&ResponseMatcher::url("/api/blogs").method("GET"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { .. }));
    }
}
