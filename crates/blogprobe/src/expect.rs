//! Retrying assertions.
//!
//! ```ignore
//! expect(&page.get_by_text(TextMatch::contains("likes"))?)
//!     .to_have_text("6 likes")
//!     .await?;
//! ```
//!
//! Each assertion polls the live page until the expectation holds or the
//! locator's timeout passes. The failure carries the last observed value.

use crate::actionability::Unmet;
use crate::driver::ElementSnapshot;
use crate::locator::Locator;
use crate::page::Page;
use crate::poll::{self, Check, Condition, PollOptions};
use crate::result::{ProbeError, ProbeResult};
use crate::selector::TextMatch;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Start an assertion on a locator
#[must_use]
pub fn expect(locator: &Locator) -> LocatorAssertions {
    LocatorAssertions {
        locator: locator.clone(),
        negate: false,
        timeout: None,
    }
}

/// Start an assertion on a page
#[must_use]
pub fn expect_page(page: &Page) -> PageAssertions {
    PageAssertions {
        page: page.clone(),
        timeout: None,
    }
}

/// Assertions on the element(s) a locator resolves to
#[derive(Debug, Clone)]
pub struct LocatorAssertions {
    locator: Locator,
    negate: bool,
    timeout: Option<Duration>,
}

impl LocatorAssertions {
    /// Invert the next assertion
    #[must_use]
    pub fn not(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// Override the locator's timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn options(&self) -> PollOptions {
        let options = self.locator.options().poll();
        match self.timeout {
            Some(t) => options.with_timeout(t),
            None => options,
        }
    }

    /// Poll a predicate over the single matched element (`None` when absent)
    async fn element<F>(&self, condition: &str, expected: String, test: F) -> ProbeResult<()>
    where
        F: Fn(Option<&ElementSnapshot>) -> (bool, String) + Sync,
    {
        let condition = if self.negate {
            format!("not {condition}")
        } else {
            condition.to_string()
        };
        let what = Condition::new(self.locator.describe(), condition, expected);
        let locator = &self.locator;
        let negate = self.negate;
        let test = &test;
        let ambiguous = &AtomicBool::new(false);
        let result = poll::wait_until(&what, &self.options(), move || async move {
            let found = locator.resolve().await?;
            let strict_violation = found.len() > 1 && locator.options().strict;
            ambiguous.store(strict_violation, Ordering::Relaxed);
            if strict_violation {
                return Ok(Check::pending(format!(
                    "{} matching elements (strict mode)",
                    found.len()
                )));
            }
            let (holds, observed) = test(found.first());
            Ok::<_, ProbeError>(if holds == negate {
                Check::pending(observed)
            } else {
                Check::Pass(())
            })
        })
        .await;

        // Ambiguity fails both polarities; name it instead of the assertion.
        match result {
            Ok(_) => Ok(()),
            Err(ProbeError::Timeout {
                target,
                actual,
                elapsed_ms,
                attempts,
                ..
            }) if ambiguous.load(Ordering::Relaxed) => Err(ProbeError::Timeout {
                target,
                condition: Unmet::Ambiguous.condition().to_string(),
                expected: "exactly one element (strict mode)".to_string(),
                actual,
                elapsed_ms,
                attempts,
            }),
            Err(e) => Err(e),
        }
    }

    /// Element is present and visible
    pub async fn to_be_visible(&self) -> ProbeResult<()> {
        self.element("be visible", "visible".into(), |s| match s {
            Some(s) => (s.visible, if s.visible { "visible" } else { "hidden" }.into()),
            None => (false, "no matching elements".into()),
        })
        .await
    }

    /// Element is absent or hidden
    pub async fn to_be_hidden(&self) -> ProbeResult<()> {
        self.element("be hidden", "hidden".into(), |s| match s {
            Some(s) => (!s.visible, if s.visible { "visible" } else { "hidden" }.into()),
            None => (true, "no matching elements".into()),
        })
        .await
    }

    /// Element is enabled
    pub async fn to_be_enabled(&self) -> ProbeResult<()> {
        self.element("be enabled", "enabled".into(), |s| match s {
            Some(s) => (s.enabled, if s.enabled { "enabled" } else { "disabled" }.into()),
            None => (false, "no matching elements".into()),
        })
        .await
    }

    /// Element is disabled
    pub async fn to_be_disabled(&self) -> ProbeResult<()> {
        self.element("be disabled", "disabled".into(), |s| match s {
            Some(s) => (!s.enabled, if s.enabled { "enabled" } else { "disabled" }.into()),
            None => (false, "no matching elements".into()),
        })
        .await
    }

    /// Checkbox is checked
    pub async fn to_be_checked(&self) -> ProbeResult<()> {
        self.element("be checked", "checked".into(), |s| match s {
            Some(s) => (s.checked, if s.checked { "checked" } else { "unchecked" }.into()),
            None => (false, "no matching elements".into()),
        })
        .await
    }

    async fn text_matches(&self, condition: &str, matcher: TextMatch) -> ProbeResult<()> {
        let expected = matcher.to_string();
        self.element(condition, expected, move |s| match s {
            Some(s) => (matcher.matches(&s.text), format!("{:?}", s.text)),
            None => (false, "no matching elements".into()),
        })
        .await
    }

    /// Whole normalized text equals
    pub async fn to_have_text(&self, expected: &str) -> ProbeResult<()> {
        self.text_matches("have text", TextMatch::exact(expected)).await
    }

    /// Normalized text contains
    pub async fn to_contain_text(&self, expected: &str) -> ProbeResult<()> {
        self.text_matches("contain text", TextMatch::contains(expected)).await
    }

    /// Normalized text matches a regular expression
    pub async fn to_match_text(&self, pattern: &str) -> ProbeResult<()> {
        self.text_matches("match text", TextMatch::pattern(pattern)?).await
    }

    /// Form value equals
    pub async fn to_have_value(&self, expected: &str) -> ProbeResult<()> {
        self.element("have value", format!("{expected:?}"), |s| match s {
            Some(ElementSnapshot {
                value: Some(v), ..
            }) => (v == expected, format!("{v:?}")),
            Some(s) => (false, format!("<{}> without a value", s.tag)),
            None => (false, "no matching elements".into()),
        })
        .await
    }

    /// Attribute equals
    pub async fn to_have_attribute(&self, name: &str, expected: &str) -> ProbeResult<()> {
        self.element(
            &format!("have attribute {name}"),
            format!("{expected:?}"),
            |s| match s.map(|s| s.attr(name)) {
                Some(Some(v)) => (v == expected, format!("{v:?}")),
                Some(None) => (false, "attribute absent".into()),
                None => (false, "no matching elements".into()),
            },
        )
        .await
    }

    /// Exactly `n` matches (strictness does not apply)
    pub async fn to_have_count(&self, n: usize) -> ProbeResult<()> {
        let condition = if self.negate {
            "not have count"
        } else {
            "have count"
        };
        let what = Condition::new(self.locator.describe(), condition, n.to_string());
        let locator = &self.locator;
        let negate = self.negate;
        poll::wait_until(&what, &self.options(), move || async move {
            let count = locator.count().await?;
            Ok::<_, ProbeError>(if (count == n) == negate {
                Check::pending(count.to_string())
            } else {
                Check::Pass(())
            })
        })
        .await
        .map(|_| ())
    }
}

/// Assertions on page-level state
#[derive(Debug, Clone)]
pub struct PageAssertions {
    page: Page,
    timeout: Option<Duration>,
}

impl PageAssertions {
    /// Override the page's timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn url(&self, matcher: TextMatch) -> ProbeResult<String> {
        let page = match self.timeout {
            Some(t) => {
                let mut options = self.page.options().clone();
                options.timeout = t;
                self.page.clone().with_options(options)
            }
            None => self.page.clone(),
        };
        page.wait_for_url(&matcher).await
    }

    /// URL contains a substring
    pub async fn to_have_url_containing(&self, part: &str) -> ProbeResult<String> {
        self.url(TextMatch::contains(part)).await
    }

    /// URL matches a regular expression
    pub async fn to_have_url_matching(&self, pattern: &str) -> ProbeResult<String> {
        self.url(TextMatch::pattern(pattern)?).await
    }
}

/// Leading integer of a counter label such as `"5 likes"` or `"Views: 12"`
#[must_use]
pub fn parse_count(text: &str) -> Option<i64> {
    let start = text.find(|c: char| c.is_ascii_digit() || c == '-')?;
    let digits: String = text[start..]
        .chars()
        .enumerate()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && *c == '-'))
        .map(|(_, c)| c)
        .collect();
    digits.parse().ok()
}

/// Read a stable baseline, run `action`, then wait for the same reader to
/// report `baseline + delta`.
///
/// With `monotonic` set, a value past the target (in the direction of
/// `delta`) fails immediately as an assertion mismatch, since the counter
/// can never come back. Otherwise the wait runs to its timeout.
pub async fn expect_delta<R, RF, A, AF>(
    target: &str,
    options: &PollOptions,
    read: R,
    action: A,
    delta: i64,
    monotonic: bool,
) -> ProbeResult<i64>
where
    R: Fn() -> RF,
    RF: Future<Output = ProbeResult<i64>>,
    A: FnOnce() -> AF,
    AF: Future<Output = ProbeResult<()>>,
{
    let read = &read;
    let baseline = poll::stable_value(target, options, read).await?;
    let wanted = baseline.checked_add(delta).ok_or_else(|| {
        ProbeError::invalid_state(format!(
            "{target}: baseline {baseline} {delta:+} is out of range"
        ))
    })?;
    action().await?;
    let what = Condition::new(
        target,
        format!("change by {delta:+}"),
        format!("{wanted} (baseline {baseline})"),
    );
    let polled = poll::wait_until(&what, options, move || async move {
        let value = read().await?;
        let overshot = if delta >= 0 {
            value > wanted
        } else {
            value < wanted
        };
        Ok::<_, ProbeError>(if value == wanted {
            Check::Pass(value)
        } else if monotonic && overshot {
            Check::terminal(value.to_string())
        } else {
            Check::pending(value.to_string())
        })
    })
    .await?;
    Ok(polled.value)
}
