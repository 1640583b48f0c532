//! Action executor.
//!
//! An action waits until its target is actionable, then dispatches exactly
//! once. Preconditions are re-evaluated from fresh snapshots on every
//! attempt; if the element is replaced between the final check and the
//! dispatch, the driver reports it detached and the precondition wait
//! starts again with whatever time is left.

use crate::actionability::{ActionableState, Requirement, Unmet};
use crate::driver::{ElementSnapshot, Input};
use crate::locator::Locator;
use crate::poll::{self, Check, Condition};
use crate::result::{ProbeError, ProbeResult};
use std::sync::Mutex;
use tokio::time::Instant;
use tracing::Instrument;

/// User-level actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Click
    Click,
    /// Replace the value
    Fill(String),
    /// Type key by key
    Type(String),
    /// Make a checkbox checked
    Check,
    /// Make a checkbox unchecked
    Uncheck,
    /// Choose an option
    SelectOption(String),
    /// Hover
    Hover,
    /// Press a key
    PressKey(String),
}

impl ActionKind {
    /// Short name for diagnostics
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Fill(_) => "fill",
            Self::Type(_) => "type",
            Self::Check => "check",
            Self::Uncheck => "uncheck",
            Self::SelectOption(_) => "select_option",
            Self::Hover => "hover",
            Self::PressKey(_) => "press",
        }
    }

    /// Preconditions this action needs
    #[must_use]
    pub const fn requirement(&self) -> Requirement {
        match self {
            Self::Click | Self::Check | Self::Uncheck => Requirement::POINTER,
            Self::Hover => Requirement::HOVER,
            Self::Fill(_) | Self::Type(_) => Requirement::TEXT_ENTRY,
            Self::SelectOption(_) | Self::PressKey(_) => Requirement::FOCUS,
        }
    }

    fn input(&self) -> Input {
        match self {
            Self::Click | Self::Check | Self::Uncheck => Input::Click,
            Self::Fill(v) => Input::Fill(v.clone()),
            Self::Type(v) => Input::Type(v.clone()),
            Self::SelectOption(v) => Input::Select(v.clone()),
            Self::Hover => Input::Hover,
            Self::PressKey(k) => Input::Press(k.clone()),
        }
    }

    const fn wants_checked(&self) -> Option<bool> {
        match self {
            Self::Check => Some(true),
            Self::Uncheck => Some(false),
            _ => None,
        }
    }
}

/// Run an action against a locator
pub async fn execute(locator: &Locator, action: &ActionKind) -> ProbeResult<()> {
    let span = tracing::debug_span!("action", action = action.name(), selector = %locator.describe());
    run(locator, action).instrument(span).await
}

async fn run(locator: &Locator, action: &ActionKind) -> ProbeResult<()> {
    let deadline = Instant::now() + locator.options().timeout;
    let what = Condition::new(
        locator.describe(),
        format!("be actionable for {}", action.name()),
        "one visible, enabled, stable element",
    );
    let req = action.requirement();
    let last_unmet = Mutex::new(None::<Unmet>);

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let options = locator.options().poll().with_timeout(remaining);
        let unmet = &last_unmet;
        let ready = poll::wait_until(&what, &options, move || async move {
            let check = probe(locator, req).await?;
            if let Ok(mut slot) = unmet.lock() {
                *slot = check.1;
            }
            Ok::<_, ProbeError>(check.0)
        })
        .await;

        let target = match ready {
            Ok(polled) => polled.value,
            Err(ProbeError::Timeout { .. }) if rejection(&last_unmet).is_some() => {
                let reason = rejection(&last_unmet).map_or_else(String::new, |u| u.to_string());
                return Err(ProbeError::ActionRejected {
                    selector: locator.describe(),
                    action: action.name().to_string(),
                    reason,
                });
            }
            Err(ProbeError::Timeout {
                target,
                expected,
                actual,
                elapsed_ms,
                attempts,
                ..
            }) => {
                let condition = unmet_of(&last_unmet)
                    .map_or_else(|| what.condition.clone(), |u| u.condition().to_string());
                return Err(ProbeError::Timeout {
                    target,
                    condition,
                    expected,
                    actual,
                    elapsed_ms,
                    attempts,
                });
            }
            Err(e) => return Err(e),
        };

        if let Some(wanted) = action.wants_checked() {
            if target.checked == wanted {
                return Ok(());
            }
        }

        match locator
            .driver()
            .dispatch(locator.selector(), target.index, &action.input())
            .await
        {
            Ok(()) => {
                tracing::debug!("dispatched");
                return match action.wants_checked() {
                    Some(wanted) => confirm_checked(locator, action, target.index, wanted).await,
                    None => Ok(()),
                };
            }
            Err(e) if e.is_retryable() && Instant::now() < deadline => {
                tracing::debug!(error = %e, "target detached before dispatch; retrying");
            }
            Err(e) => return Err(e),
        }
    }
}

fn unmet_of(cell: &Mutex<Option<Unmet>>) -> Option<Unmet> {
    cell.lock().ok().and_then(|slot| *slot)
}

fn rejection(cell: &Mutex<Option<Unmet>>) -> Option<Unmet> {
    unmet_of(cell).filter(|u| u.is_rejection())
}

/// One precondition evaluation; returns the check and the first unmet
/// condition seen
async fn probe(
    locator: &Locator,
    req: Requirement,
) -> ProbeResult<(Check<ElementSnapshot>, Option<Unmet>)> {
    let found = locator.resolve().await?;
    let unmet = if found.is_empty() {
        Unmet::NotAttached
    } else {
        Unmet::Ambiguous
    };
    let before = match locator.pick(found) {
        Check::Pass(snap) => snap,
        Check::Pending { observed } | Check::Terminal { observed } => {
            return Ok((Check::pending(observed), Some(unmet)));
        }
    };

    let after = if req.stable {
        locator.driver().animation_frame().await?;
        let found = locator.resolve().await?;
        match found.into_iter().nth(before.index) {
            Some(snap) => snap,
            None => {
                return Ok((
                    Check::pending("element detached between frames"),
                    Some(Unmet::NotAttached),
                ))
            }
        }
    } else {
        before.clone()
    };

    let state = if req.stable {
        ActionableState::from_frames(&before, &after)
    } else {
        ActionableState::from_frames(&after, &after)
    };
    Ok(match state.unmet(req) {
        Some(unmet) => (Check::pending(unmet.to_string()), Some(unmet)),
        None => (Check::Pass(after), None),
    })
}

/// Wait for the dispatched-to match to reach `wanted`
async fn confirm_checked(
    locator: &Locator,
    action: &ActionKind,
    index: usize,
    wanted: bool,
) -> ProbeResult<()> {
    let what = Condition::new(
        locator.describe(),
        format!("be {} after {}", if wanted { "checked" } else { "unchecked" }, action.name()),
        wanted.to_string(),
    );
    poll::wait_until(&what, &locator.options().poll(), move || async move {
        let found = locator.resolve().await?;
        Ok::<_, ProbeError>(match found.get(index) {
            Some(s) if s.checked == wanted => Check::Pass(()),
            Some(s) => Check::pending(s.checked.to_string()),
            None => Check::pending(format!("no match at index {index}")),
        })
    })
    .await
    .map(|_| ())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dom::{El, VirtualPage};
    use crate::driver::{BoundingBox, Driver, SharedDriver};
    use crate::selector::Selector;
    use std::sync::Arc;
    use std::time::Duration;

    async fn form_page() -> (VirtualPage, SharedDriver) {
        let page = VirtualPage::new("http://app.test");
        page.route("/", |state| {
            state.render(vec![El::new("form").children(vec![
                El::new("input").attr("id", "name").attr("type", "text"),
                El::new("input")
                    .attr("id", "ro")
                    .attr("type", "text")
                    .flag("readonly"),
                El::new("input").attr("id", "agree").attr("type", "checkbox"),
                El::new("button").attr("id", "off").flag("disabled").text("Off"),
                El::new("button").attr("id", "go").attr("type", "button").text("Go"),
                El::new("div").attr("class", "row").text("a"),
                El::new("div").attr("class", "row").text("b"),
            ])]);
        })
        .unwrap();
        page.goto("http://app.test/").await.unwrap();
        let driver: SharedDriver = Arc::new(page.clone());
        (page, driver)
    }

    fn loc(driver: &SharedDriver, css: &str) -> Locator {
        Locator::new(driver.clone(), Selector::css(css).unwrap()).with_timeout(Duration::from_secs(1))
    }

    fn event_names(page: &VirtualPage) -> Vec<String> {
        page.events().unwrap().into_iter().map(|e| e.event).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_selector_times_out_naming_selector() {
        let (page, driver) = form_page().await;
        page.clear_events().unwrap();
        let err = loc(&driver, "#missing").click().await.unwrap_err();
        match err {
            ProbeError::Timeout {
                target, condition, ..
            } => {
                assert_eq!(target, "css=#missing");
                assert_eq!(condition, "be attached");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(event_names(&page).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_button_is_rejected_without_dispatch() {
        let (page, driver) = form_page().await;
        page.clear_events().unwrap();
        let err = loc(&driver, "#off").click().await.unwrap_err();
        assert!(
            matches!(err, ProbeError::ActionRejected { ref reason, .. } if reason.contains("disabled")),
            "{err:?}"
        );
        assert!(event_names(&page).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_only_fill_is_rejected() {
        let (_page, driver) = form_page().await;
        let err = loc(&driver, "#ro").fill("x").await.unwrap_err();
        assert!(matches!(err, ProbeError::ActionRejected { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ambiguous_selector_times_out_unless_relaxed() {
        let (page, driver) = form_page().await;
        let err = loc(&driver, ".row").click().await.unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { ref condition, .. } if condition.contains("exactly one")));
        page.clear_events().unwrap();
        loc(&driver, ".row").strict(false).click().await.unwrap();
        assert!(event_names(&page).contains(&"click".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_late_enable() {
        let (page, driver) = form_page().await;
        page.update(|s| {
            s.schedule(Duration::from_millis(400), |s| {
                let off = s.doc().query_css("#off").unwrap()[0];
                s.doc_mut().remove_attr(off, "disabled");
            });
        })
        .unwrap();
        let started = Instant::now();
        loc(&driver, "#off").click().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_animation_to_settle() {
        let (page, driver) = form_page().await;
        page.update(|s| {
            let go = s.doc().query_css("#go").unwrap()[0];
            s.doc_mut().animate(go, 5);
        })
        .unwrap();
        page.clear_events().unwrap();
        loc(&driver, "#go").click().await.unwrap();
        let clicks = event_names(&page).iter().filter(|e| *e == "click").count();
        assert_eq!(clicks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_covered_element_rejected() {
        let (page, driver) = form_page().await;
        page.update(|s| {
            let go = s.doc().query_css("#go").unwrap()[0];
            s.doc_mut().set_covered(go, true);
        })
        .unwrap();
        let err = loc(&driver, "#go").click().await.unwrap_err();
        assert!(matches!(err, ProbeError::ActionRejected { ref reason, .. } if reason.contains("covered")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_covered_input_is_not_filled() {
        let (page, driver) = form_page().await;
        page.update(|s| {
            let name = s.doc().query_css("#name").unwrap()[0];
            s.doc_mut().set_covered(name, true);
        })
        .unwrap();
        page.clear_events().unwrap();
        let name = loc(&driver, "#name");
        let err = name.fill("admin").await.unwrap_err();
        assert!(
            matches!(err, ProbeError::ActionRejected { ref action, ref reason, .. }
                if action == "fill" && reason.contains("covered")),
            "{err:?}"
        );
        assert!(event_names(&page).is_empty());
        assert_eq!(name.input_value().await.unwrap(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_waits_for_animating_input() {
        let (page, driver) = form_page().await;
        page.update(|s| {
            let name = s.doc().query_css("#name").unwrap()[0];
            s.doc_mut().animate(name, 5);
        })
        .unwrap();
        page.clear_events().unwrap();
        let started = Instant::now();
        let name = loc(&driver, "#name");
        name.fill("admin").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(16 * 5));
        let first = name.resolve().await.unwrap()[0].bounds;
        driver.animation_frame().await.unwrap();
        assert_eq!(name.resolve().await.unwrap()[0].bounds, first);
        assert_eq!(name.input_value().await.unwrap(), "admin");
    }

    #[tokio::test(start_paused = true)]
    async fn test_covered_input_rejects_key_press() {
        let (page, driver) = form_page().await;
        page.update(|s| {
            let name = s.doc().query_css("#name").unwrap()[0];
            s.doc_mut().set_covered(name, true);
        })
        .unwrap();
        let err = loc(&driver, "#name").press("Enter").await.unwrap_err();
        assert!(matches!(err, ProbeError::ActionRejected { ref reason, .. } if reason.contains("covered")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_size_element_is_not_visible() {
        let (page, driver) = form_page().await;
        page.update(|s| {
            let go = s.doc().query_css("#go").unwrap()[0];
            s.doc_mut().set_layout(go, BoundingBox::new(0.0, 0.0, 0.0, 0.0));
        })
        .unwrap();
        let err = loc(&driver, "#go").click().await.unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { ref condition, .. } if condition == "be visible"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_is_idempotent() {
        let (page, driver) = form_page().await;
        let agree = loc(&driver, "#agree");
        agree.check().await.unwrap();
        assert!(agree.is_checked().await.unwrap());
        page.clear_events().unwrap();
        agree.check().await.unwrap();
        assert!(event_names(&page).is_empty());
        agree.uncheck().await.unwrap();
        assert!(!agree.is_checked().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_confirms_the_dispatched_match() {
        let page = VirtualPage::new("http://app.test");
        page.route("/", |state| {
            state.render(vec![El::new("form").children(vec![
                El::new("input").attr("class", "opt").attr("type", "checkbox"),
                El::new("input")
                    .attr("class", "opt")
                    .attr("type", "checkbox")
                    .checked(true),
            ])]);
        })
        .unwrap();
        page.goto("http://app.test/").await.unwrap();
        let driver: SharedDriver = Arc::new(page.clone());
        let opts = loc(&driver, ".opt").strict(false);

        confirm_checked(&opts, &ActionKind::Check, 1, true).await.unwrap();
        let err = confirm_checked(&opts, &ActionKind::Check, 0, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { .. }));
        let err = confirm_checked(&opts, &ActionKind::Check, 2, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { ref actual, .. } if actual.contains("index 2")), "{err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_and_type_reach_the_input() {
        let (page, driver) = form_page().await;
        let name = loc(&driver, "#name");
        name.fill("admin").await.unwrap();
        assert_eq!(name.input_value().await.unwrap(), "admin");
        name.type_text("123").await.unwrap();
        assert_eq!(name.input_value().await.unwrap(), "admin123");
        assert!(event_names(&page).contains(&"keypress".to_string()));
    }
}
