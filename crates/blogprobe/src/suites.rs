//! UI scenarios for the blog application.
//!
//! Each builder returns a [`Scenario`] whose steps read the page from the
//! [`ScenarioContext`], so the same scenario runs against a `VirtualPage`
//! in tests and against Chromium from the CLI.

use crate::config::Credentials;
use crate::expect::{expect, expect_delta, expect_page};
use crate::oracle::{self, Theme};
use crate::page::{Page, ResponseMatcher};
use crate::pages::{
    AdminDashboard, BlogDetailsPage, HomePage, LoginPage, PageObject, ADMIN_URL_PATTERN,
};
use crate::poll::{self, Check, Condition};
use crate::result::{ProbeError, ProbeResult};
use crate::scenario::{Scenario, ScenarioContext, Suite};
use std::time::Duration;

/// Suite name used in reports
pub const UI_SUITE: &str = "ui";

/// Alert text for rejected credentials
pub const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// How long a repeat like may wait before it must be refused
const SECOND_LIKE_TIMEOUT: Duration = Duration::from_millis(300);

/// Every UI scenario, aimed at the seeded baseline (post 1 is "Seeded Post 1")
#[must_use]
pub fn ui_suite(credentials: &Credentials) -> Suite {
    Suite::new(UI_SUITE)
        .scenario(login_succeeds(credentials))
        .scenario(login_rejects_wrong_password(credentials))
        .scenario(like_increments_once(1))
        .scenario(pagination_moves_forward())
        .scenario(theme_round_trip())
        .scenario(read_marks_persist(2, "Seeded Post 2"))
}

/// Valid credentials land on the admin dashboard after a 200 login response
#[must_use]
pub fn login_succeeds(credentials: &Credentials) -> Scenario {
    let c = credentials.clone();
    Scenario::new("login succeeds")
        .step("submit credentials", move |ctx: ScenarioContext| {
            let c = c.clone();
            async move {
                let page = ctx.page()?;
                let login = LoginPage::new(page);
                login.open().await?;
                let matcher = ResponseMatcher::url("/api/auth/login")
                    .method("POST")
                    .status(200);
                page.expect_response(&matcher, || login.submit_login(&c.username, &c.password))
                    .await?;
                Ok(())
            }
        })
        .step("dashboard shown", |ctx: ScenarioContext| async move {
            let page = ctx.page()?;
            expect_page(page)
                .to_have_url_matching(ADMIN_URL_PATTERN)
                .await?;
            AdminDashboard::new(page).wait_loaded().await
        })
}

/// A wrong password shows the alert and keeps the user on `/login`
#[must_use]
pub fn login_rejects_wrong_password(credentials: &Credentials) -> Scenario {
    let username = credentials.username.clone();
    Scenario::new("login rejects wrong password").step(
        "submit wrong password",
        move |ctx: ScenarioContext| {
            let username = username.clone();
            async move {
                let page = ctx.page()?;
                let login = LoginPage::new(page);
                login.open().await?;
                login.submit_login(&username, "wrongpass").await?;
                expect(&login.error_message()?)
                    .to_contain_text(INVALID_CREDENTIALS)
                    .await?;
                expect_page(page).to_have_url_containing("/login").await?;
                Ok(())
            }
        },
    )
}

/// One like moves the counter by exactly one and disables the button
#[must_use]
pub fn like_increments_once(blog_id: u64) -> Scenario {
    Scenario::new("like increments once")
        .step("open post", move |ctx: ScenarioContext| async move {
            BlogDetailsPage::new(ctx.page()?, blog_id).open().await
        })
        .step("like", move |ctx: ScenarioContext| async move {
            let page = ctx.page()?;
            let details = BlogDetailsPage::new(page, blog_id);
            let after = expect_delta(
                "like count",
                &page.options().poll(),
                || details.likes(),
                || details.like(),
                1,
                true,
            )
            .await?;
            ctx.remember("likes", &after)
        })
        .step("second like refused", move |ctx: ScenarioContext| async move {
            let details = BlogDetailsPage::new(ctx.page()?, blog_id);
            expect(&details.like_button()?).to_be_disabled().await?;
            match details
                .like_button()?
                .with_timeout(SECOND_LIKE_TIMEOUT)
                .click()
                .await
            {
                Err(ProbeError::ActionRejected { ref reason, .. }) if reason.contains("disabled") => {}
                Ok(()) => {
                    return Err(ProbeError::AssertionMismatch {
                        target: "second like".into(),
                        expected: "rejected".into(),
                        actual: "clicked".into(),
                    })
                }
                Err(e) => return Err(e),
            }
            let expected: i64 = ctx.recall("likes")?;
            let actual = details.likes().await?;
            if actual == expected {
                Ok(())
            } else {
                Err(ProbeError::AssertionMismatch {
                    target: "like count".into(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                })
            }
        })
}

/// Nine posts at eight per page: next leads to page 2 with one card
#[must_use]
pub fn pagination_moves_forward() -> Scenario {
    Scenario::new("pagination moves forward")
        .step("first page controls", |ctx: ScenarioContext| async move {
            let home = HomePage::new(ctx.page()?);
            home.open().await?;
            expect(&home.previous_page()?).to_be_disabled().await?;
            expect(&home.next_page()?).to_be_enabled().await?;
            Ok(())
        })
        .step("go to page 2", |ctx: ScenarioContext| async move {
            let page = ctx.page()?;
            let home = HomePage::new(page);
            home.next_page()?.click().await?;
            expect(&home.current_page_indicator()?)
                .to_have_text("2")
                .await?;
            expect_page(page).to_have_url_containing("page=2").await?;
            expect(&home.blog_cards()?).to_have_count(1).await
        })
}

/// Toggling the theme twice restores the original mode, and the stored
/// value survives a reload
#[must_use]
pub fn theme_round_trip() -> Scenario {
    Scenario::new("theme round trip")
        .step("toggle once", |ctx: ScenarioContext| async move {
            let page = ctx.page()?;
            let home = HomePage::new(page);
            home.open().await?;
            let initial = oracle::theme(page).await?.unwrap_or(Theme::Light);
            ctx.remember("initial", &initial)?;
            home.toggle_theme().await?;
            wait_for_theme(page, initial.toggled()).await?;
            expect(&home.theme_toggle()?)
                .to_have_attribute("title", toggle_title(initial.toggled()))
                .await
        })
        .step("survives reload", |ctx: ScenarioContext| async move {
            let page = ctx.page()?;
            let initial: Theme = ctx.recall("initial")?;
            page.reload().await?;
            HomePage::new(page).wait_loaded().await?;
            wait_for_theme(page, initial.toggled()).await?;
            Ok(())
        })
        .step("toggle back", |ctx: ScenarioContext| async move {
            let page = ctx.page()?;
            let initial: Theme = ctx.recall("initial")?;
            let home = HomePage::new(page);
            home.toggle_theme().await?;
            wait_for_theme(page, initial).await?;
            expect(&home.theme_toggle()?)
                .to_have_attribute("title", toggle_title(initial))
                .await
        })
}

/// Opening a post marks its card as read, and the mark survives a reload
#[must_use]
pub fn read_marks_persist(blog_id: u64, title: &str) -> Scenario {
    let title = title.to_string();
    let open_title = title.clone();
    Scenario::new("read marks persist")
        .step("read post", move |ctx: ScenarioContext| {
            let title = open_title.clone();
            async move {
                let page = ctx.page()?;
                let home = HomePage::new(page);
                home.open().await?;
                home.read_more(&title)?.click().await?;
                expect_page(page)
                    .to_have_url_containing(&format!("/blog/{blog_id}"))
                    .await?;
                BlogDetailsPage::new(page, blog_id).wait_loaded().await
            }
        })
        .step("card marked", move |ctx: ScenarioContext| {
            let title = title.clone();
            async move {
                let page = ctx.page()?;
                let home = HomePage::new(page);
                home.open().await?;
                expect(&home.read_chip(&title)?).to_be_visible().await?;
                let ids = oracle::read_blog_ids(page).await?;
                if !ids.contains(&blog_id.to_string()) {
                    return Err(ProbeError::AssertionMismatch {
                        target: oracle::READ_BLOGS_KEY.into(),
                        expected: format!("contains {blog_id}"),
                        actual: format!("{ids:?}"),
                    });
                }
                page.reload().await?;
                home.wait_loaded().await?;
                expect(&home.read_chip(&title)?).to_be_visible().await
            }
        })
}

/// Title the toggle carries while `current` is active
fn toggle_title(current: Theme) -> &'static str {
    match current {
        Theme::Light => "Switch to dark mode",
        Theme::Dark => "Switch to light mode",
    }
}

async fn wait_for_theme(page: &Page, want: Theme) -> ProbeResult<Theme> {
    let what = Condition::new(oracle::THEME_KEY, "hold theme", want.as_str());
    let polled = poll::wait_until(&what, &page.options().poll(), || async move {
        Ok::<_, ProbeError>(match oracle::theme(page).await? {
            Some(theme) if theme == want => Check::Pass(theme),
            other => Check::pending(format!("{other:?}")),
        })
    })
    .await?;
    Ok(polled.value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod builder_tests {
        use super::*;

        #[test]
        fn test_ui_suite_contents() {
            let suite = ui_suite(&Credentials::default());
            assert_eq!(suite.name(), UI_SUITE);
            let names: Vec<&str> = suite.scenarios().iter().map(Scenario::name).collect();
            assert_eq!(
                names,
                vec![
                    "login succeeds",
                    "login rejects wrong password",
                    "like increments once",
                    "pagination moves forward",
                    "theme round trip",
                    "read marks persist",
                ]
            );
        }

        #[test]
        fn test_like_steps() {
            assert_eq!(
                like_increments_once(3).step_names(),
                vec!["open post", "like", "second like refused"]
            );
        }

        #[test]
        fn test_toggle_title() {
            assert_eq!(toggle_title(Theme::Dark), "Switch to light mode");
            assert_eq!(toggle_title(Theme::Light), "Switch to dark mode");
        }
    }

    mod context_tests {
        use super::*;
        use crate::scenario::ScenarioStatus;

        #[tokio::test]
        async fn test_pageless_context_fails_first_step() {
            let report = pagination_moves_forward().run(ScenarioContext::new()).await;
            assert_eq!(report.status, ScenarioStatus::Failed);
            assert_eq!(report.steps.len(), 2);
            assert_eq!(report.steps[1].status, crate::scenario::StepStatus::Skipped);
            assert_eq!(report.error.unwrap().step.as_deref(), Some("first page controls"));
        }
    }
}
