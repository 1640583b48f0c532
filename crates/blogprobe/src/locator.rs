//! Locators: lazy, re-resolvable element handles.
//!
//! A [`Locator`] pairs a [`Selector`] with the driver it runs against. It
//! holds no element reference; every query, action and assertion resolves
//! the selector against the live document again. Locators are strict by
//! default: actions and single-element queries wait until the selector
//! matches exactly one element.

use crate::action::{self, ActionKind};
use crate::driver::{ElementSnapshot, SharedDriver};
use crate::poll::{self, Backoff, Check, Condition, PollOptions, DEFAULT_TIMEOUT_MS};
use crate::result::{ProbeError, ProbeResult};
use crate::selector::{Selector, TextMatch};
use std::time::Duration;

/// Locator options for customizing behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorOptions {
    /// Timeout for auto-waiting
    pub timeout: Duration,
    /// Delay schedule between attempts
    pub backoff: Backoff,
    /// Whether to require a single-element match
    pub strict: bool,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            backoff: Backoff::default(),
            strict: true,
        }
    }
}

impl LocatorOptions {
    /// Poll options derived from these settings
    #[must_use]
    pub fn poll(&self) -> PollOptions {
        PollOptions::new()
            .with_timeout(self.timeout)
            .with_backoff(self.backoff.clone())
    }
}

/// Element state for [`Locator::wait_for`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// At least one match in the document
    Attached,
    /// No match in the document
    Detached,
    /// A visible match
    Visible,
    /// No match, or the match is hidden
    Hidden,
}

/// A lazy element handle
#[derive(Debug, Clone)]
pub struct Locator {
    driver: SharedDriver,
    selector: Selector,
    options: LocatorOptions,
}

impl Locator {
    /// Create a locator from a selector
    #[must_use]
    pub fn new(driver: SharedDriver, selector: Selector) -> Self {
        Self {
            driver,
            selector,
            options: LocatorOptions::default(),
        }
    }

    /// The selector tree
    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    /// The driver this locator resolves against
    #[must_use]
    pub const fn driver(&self) -> &SharedDriver {
        &self.driver
    }

    /// Current options
    #[must_use]
    pub const fn options(&self) -> &LocatorOptions {
        &self.options
    }

    /// Human-readable selector
    #[must_use]
    pub fn describe(&self) -> String {
        self.selector.describe()
    }

    /// Replace all options
    #[must_use]
    pub fn with_options(mut self, options: LocatorOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the auto-wait timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Allow actions on the first of several matches
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.options.strict = strict;
        self
    }

    fn derive(&self, selector: Selector) -> Self {
        Self {
            driver: self.driver.clone(),
            selector,
            options: self.options.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // Scoping
    // -------------------------------------------------------------------------

    /// CSS selector evaluated inside this locator's matches
    pub fn locator(&self, css: &str) -> ProbeResult<Self> {
        Ok(self.within(Selector::css(css)?))
    }

    /// Any selector evaluated inside this locator's matches
    #[must_use]
    pub fn within(&self, child: Selector) -> Self {
        self.derive(self.selector.clone().scoped(child))
    }

    /// Descendants by ARIA role
    pub fn get_by_role(&self, role: &str, name: Option<TextMatch>) -> ProbeResult<Self> {
        Ok(self.within(Selector::role(role, name)?))
    }

    /// Descendants by text
    pub fn get_by_text(&self, text: TextMatch) -> ProbeResult<Self> {
        Ok(self.within(Selector::text(text)?))
    }

    /// Descendants by `data-testid`
    pub fn get_by_test_id(&self, id: &str) -> ProbeResult<Self> {
        Ok(self.within(Selector::test_id(id)?))
    }

    /// Keep matches whose text matches
    #[must_use]
    pub fn filter_has_text(&self, text: TextMatch) -> Self {
        self.derive(self.selector.clone().has_text(text))
    }

    /// First match
    #[must_use]
    pub fn first(&self) -> Self {
        self.nth(0)
    }

    /// Last match
    #[must_use]
    pub fn last(&self) -> Self {
        self.nth(-1)
    }

    /// Match by position; negative counts from the end
    #[must_use]
    pub fn nth(&self, index: i32) -> Self {
        self.derive(self.selector.clone().nth(index))
    }

    /// Union with another locator
    #[must_use]
    pub fn or(&self, other: &Self) -> Self {
        self.derive(self.selector.clone().or(other.selector.clone()))
    }

    // -------------------------------------------------------------------------
    // Resolution and queries
    // -------------------------------------------------------------------------

    /// Snapshot every current match
    pub async fn resolve(&self) -> ProbeResult<Vec<ElementSnapshot>> {
        self.driver.query(&self.selector).await
    }

    /// Reduce matches to the single element an action or strict query uses
    pub(crate) fn pick(&self, mut found: Vec<ElementSnapshot>) -> Check<ElementSnapshot> {
        match found.len() {
            0 => Check::pending("no matching elements"),
            n if n > 1 && self.options.strict => {
                Check::pending(format!("{n} matching elements (strict mode)"))
            }
            _ => Check::Pass(found.swap_remove(0)),
        }
    }

    async fn wait_single(&self, condition: &str) -> ProbeResult<ElementSnapshot> {
        let what = Condition::new(self.describe(), condition, "exactly one element");
        let this = self;
        let polled = poll::wait_until(&what, &self.options.poll(), move || async move {
            Ok::<_, ProbeError>(this.pick(this.resolve().await?))
        })
        .await?;
        Ok(polled.value)
    }

    /// Number of current matches (no waiting)
    pub async fn count(&self) -> ProbeResult<usize> {
        Ok(self.resolve().await?.len())
    }

    /// Text content of the single match, waiting for it to exist
    pub async fn text_content(&self) -> ProbeResult<String> {
        Ok(self.wait_single("be attached").await?.text)
    }

    /// Rendered text of the single match, waiting for it to be visible
    pub async fn inner_text(&self) -> ProbeResult<String> {
        self.wait_for(ElementState::Visible).await?;
        self.text_content().await
    }

    /// Form value of the single match
    pub async fn input_value(&self) -> ProbeResult<String> {
        let snap = self.wait_single("be attached").await?;
        snap.value.ok_or_else(|| {
            ProbeError::invalid_state(format!(
                "{} resolved to <{}>, which has no value",
                self.describe(),
                snap.tag
            ))
        })
    }

    /// Attribute of the single match
    pub async fn get_attribute(&self, name: &str) -> ProbeResult<Option<String>> {
        let snap = self.wait_single("be attached").await?;
        Ok(snap.attr(name).map(str::to_string))
    }

    /// Whether the first match is visible right now (no waiting)
    pub async fn is_visible(&self) -> ProbeResult<bool> {
        Ok(self.resolve().await?.first().is_some_and(|s| s.visible))
    }

    /// Whether the first match is enabled right now (no waiting)
    pub async fn is_enabled(&self) -> ProbeResult<bool> {
        Ok(self.resolve().await?.first().is_some_and(|s| s.enabled))
    }

    /// Whether the first match is checked right now (no waiting)
    pub async fn is_checked(&self) -> ProbeResult<bool> {
        Ok(self.resolve().await?.first().is_some_and(|s| s.checked))
    }

    /// Texts of every current match (no waiting)
    pub async fn all_texts(&self) -> ProbeResult<Vec<String>> {
        Ok(self.resolve().await?.into_iter().map(|s| s.text).collect())
    }

    /// Wait until the locator reaches a state
    pub async fn wait_for(&self, state: ElementState) -> ProbeResult<()> {
        let (condition, expected) = match state {
            ElementState::Attached => ("be attached", "at least one element"),
            ElementState::Detached => ("be detached", "no elements"),
            ElementState::Visible => ("be visible", "a visible element"),
            ElementState::Hidden => ("be hidden", "no visible element"),
        };
        let what = Condition::new(self.describe(), condition, expected);
        let this = self;
        poll::wait_until(&what, &self.options.poll(), move || async move {
            let found = this.resolve().await?;
            let visible = found.iter().filter(|s| s.visible).count();
            let done = match state {
                ElementState::Attached => !found.is_empty(),
                ElementState::Detached => found.is_empty(),
                ElementState::Visible => visible > 0,
                ElementState::Hidden => visible == 0,
            };
            Ok::<_, ProbeError>(if done {
                Check::Pass(())
            } else {
                Check::pending(format!("{} elements, {visible} visible", found.len()))
            })
        })
        .await
        .map(|_| ())
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    /// Click the element
    pub async fn click(&self) -> ProbeResult<()> {
        action::execute(self, &ActionKind::Click).await
    }

    /// Replace the element's value
    pub async fn fill(&self, value: &str) -> ProbeResult<()> {
        action::execute(self, &ActionKind::Fill(value.to_string())).await
    }

    /// Type text one key at a time
    pub async fn type_text(&self, text: &str) -> ProbeResult<()> {
        action::execute(self, &ActionKind::Type(text.to_string())).await
    }

    /// Ensure a checkbox is checked
    pub async fn check(&self) -> ProbeResult<()> {
        action::execute(self, &ActionKind::Check).await
    }

    /// Ensure a checkbox is unchecked
    pub async fn uncheck(&self) -> ProbeResult<()> {
        action::execute(self, &ActionKind::Uncheck).await
    }

    /// Choose an option by value or label
    pub async fn select_option(&self, value: &str) -> ProbeResult<()> {
        action::execute(self, &ActionKind::SelectOption(value.to_string())).await
    }

    /// Hover the element
    pub async fn hover(&self) -> ProbeResult<()> {
        action::execute(self, &ActionKind::Hover).await
    }

    /// Press a key while the element is focused
    pub async fn press(&self, key: &str) -> ProbeResult<()> {
        action::execute(self, &ActionKind::PressKey(key.to_string())).await
    }
}
