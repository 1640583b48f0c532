//! API contract probes.
//!
//! Each probe is one scenario: send a request the server must accept or
//! refuse, then check the status code and the shape of the body.

use crate::api::{ApiResponse, BlogApi, BlogDraft, CommentDraft};
use crate::config::Credentials;
use crate::result::{ProbeError, ProbeResult};
use crate::scenario::{Scenario, Suite};
use std::future::Future;

/// Suite name used in reports
pub const CONTRACT_SUITE: &str = "api-contract";

/// Required blog fields, each probed by leaving it out
pub const REQUIRED_BLOG_FIELDS: [&str; 4] = ["title", "content", "category", "excerpt"];

fn expect_status_in(response: &ApiResponse, what: &str, allowed: &[u16]) -> ProbeResult<()> {
    if allowed.contains(&response.status) {
        return Ok(());
    }
    Err(ProbeError::AssertionMismatch {
        target: what.to_string(),
        expected: format!("status in {allowed:?}"),
        actual: format!("status {} with body {}", response.status, response.body),
    })
}

fn expect_rejected(response: &ApiResponse, what: &str, status: u16) -> ProbeResult<()> {
    response.expect_status(what, status)?;
    response.expect_field(what, "error")?;
    Ok(())
}

fn probe<F, Fut>(name: impl Into<String>, api: &BlogApi, f: F) -> Scenario
where
    F: Fn(BlogApi) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProbeResult<()>> + Send + 'static,
{
    let api = api.clone();
    Scenario::new(name).step("request", move |_| f(api.clone()))
}

/// Every contract probe against `api`
#[must_use]
pub fn contract_suite(api: &BlogApi, credentials: &Credentials) -> Suite {
    let mut suite = Suite::new(CONTRACT_SUITE)
        .scenario(login_succeeds(api, credentials))
        .scenario(login_rejects_wrong_password(api, credentials));
    for field in REQUIRED_BLOG_FIELDS {
        suite = suite.scenario(create_requires_field(api, credentials, field));
    }
    suite
        .scenario(create_requires_auth(api))
        .scenario(deleted_blog_is_gone(api, credentials))
        .scenario(public_blog_schema(api, 1))
        .scenario(comment_requires_content(api))
        .scenario(comment_requires_author(api))
        .scenario(author_comment_rejects_bad_token(api))
        .scenario(duplicate_registration_conflicts(api, credentials))
}

/// Valid credentials return 200 and a token
#[must_use]
pub fn login_succeeds(api: &BlogApi, credentials: &Credentials) -> Scenario {
    let c = credentials.clone();
    probe("login succeeds", api, move |api| {
        let c = c.clone();
        async move {
            let response = api.login(&c.username, &c.password).await?;
            response.expect_status("login", 200)?;
            match response.field("token") {
                Some(token) if token.as_str().is_some_and(|t| !t.is_empty()) => Ok(()),
                _ => Err(ProbeError::AssertionMismatch {
                    target: "login".into(),
                    expected: "non-empty `token`".into(),
                    actual: response.body.to_string(),
                }),
            }
        }
    })
}

/// A wrong password is refused with 401 or 403
#[must_use]
pub fn login_rejects_wrong_password(api: &BlogApi, credentials: &Credentials) -> Scenario {
    let username = credentials.username.clone();
    probe("login rejects wrong password", api, move |api| {
        let username = username.clone();
        async move {
            let response = api.login(&username, "wrongpass").await?;
            expect_status_in(&response, "login with wrong password", &[401, 403])
        }
    })
}

/// Creating a blog without `field` is a 400 with an `error` message
#[must_use]
pub fn create_requires_field(api: &BlogApi, credentials: &Credentials, field: &'static str) -> Scenario {
    let c = credentials.clone();
    probe(format!("create blog without {field} is rejected"), api, move |api| {
        let c = c.clone();
        async move {
            let api = api.authenticate(&c.username, &c.password).await?;
            let draft = BlogDraft::complete(&format!("Missing {field}")).without(field);
            let response = api.create_blog(&draft).await?;
            expect_rejected(&response, &format!("create without {field}"), 400)
        }
    })
}

/// Creating a blog without a token is a 401
#[must_use]
pub fn create_requires_auth(api: &BlogApi) -> Scenario {
    probe("unauthenticated create is rejected", api, |api| async move {
        let response = api.create_blog(&BlogDraft::complete("Unauthorized blog")).await?;
        response.expect_status("unauthenticated create", 401)?;
        Ok(())
    })
}

/// Deleting a blog answers with a message and the blog then reads as 404
#[must_use]
pub fn deleted_blog_is_gone(api: &BlogApi, credentials: &Credentials) -> Scenario {
    let api = api.clone();
    let c = credentials.clone();
    Scenario::new("deleted blog is gone").step("create, delete, re-read", move |ctx| {
        let api = api.clone();
        let c = c.clone();
        async move {
            let api = api.authenticate(&c.username, &c.password).await?;
            let created = api.create_blog(&BlogDraft::complete("Short-lived")).await?;
            expect_status_in(&created, "create", &[200, 201])?;
            let id = created
                .expect_field("create", "id")?
                .as_u64()
                .ok_or_else(|| ProbeError::AssertionMismatch {
                    target: "create".into(),
                    expected: "numeric `id`".into(),
                    actual: created.body.to_string(),
                })?;

            let cleanup = api.clone();
            ctx.defer(format!("delete blog {id}"), move || async move {
                let response = cleanup.delete_blog(id).await?;
                expect_status_in(&response, "cleanup delete", &[200, 204, 404])
            });

            let deleted = api.delete_blog(id).await?;
            deleted.expect_status("delete", 200)?;
            let message = deleted.str_field("message").unwrap_or_default();
            if !message.to_lowercase().contains("deleted") {
                return Err(ProbeError::AssertionMismatch {
                    target: "delete".into(),
                    expected: "message containing \"deleted\"".into(),
                    actual: deleted.body.to_string(),
                });
            }

            api.get_blog(id).await?.expect_status("re-read deleted blog", 404)?;
            Ok(())
        }
    })
}

/// A public blog exposes id, non-empty title and content, and numeric views
#[must_use]
pub fn public_blog_schema(api: &BlogApi, id: u64) -> Scenario {
    probe(format!("public blog {id} has the expected shape"), api, move |api| async move {
        let response = api.get_public_blog(id).await?;
        response.expect_status("public blog", 200)?;
        let mismatch = |expected: &str| ProbeError::AssertionMismatch {
            target: format!("public blog {id}"),
            expected: expected.to_string(),
            actual: response.body.to_string(),
        };
        if response.field("id").and_then(serde_json::Value::as_u64) != Some(id) {
            return Err(mismatch("matching `id`"));
        }
        for text in ["title", "content"] {
            if response.str_field(text).map_or(true, str::is_empty) {
                return Err(mismatch(&format!("non-empty `{text}`")));
            }
        }
        if !response.field("views").is_some_and(serde_json::Value::is_number) {
            return Err(mismatch("numeric `views`"));
        }
        Ok(())
    })
}

/// A public comment without content is a 400
#[must_use]
pub fn comment_requires_content(api: &BlogApi) -> Scenario {
    probe("public comment without content is rejected", api, |api| async move {
        let comment = CommentDraft {
            blog_id: 2,
            content: None,
            author_name: Some("John".into()),
        };
        let response = api.add_comment(&comment).await?;
        expect_rejected(&response, "comment without content", 400)
    })
}

/// A public comment without an author is a 400
#[must_use]
pub fn comment_requires_author(api: &BlogApi) -> Scenario {
    probe("public comment without author is rejected", api, |api| async move {
        let comment = CommentDraft {
            blog_id: 2,
            content: Some("jj".into()),
            author_name: None,
        };
        api.add_comment(&comment)
            .await?
            .expect_status("comment without author", 400)?;
        Ok(())
    })
}

/// An author comment with a forged token is a 403 naming the token problem
#[must_use]
pub fn author_comment_rejects_bad_token(api: &BlogApi) -> Scenario {
    probe("author comment with invalid token is forbidden", api, |api| async move {
        let forged = api.with_token("invalid.jwt.token");
        let comment = CommentDraft {
            blog_id: 2,
            content: Some("This comment should not be created".into()),
            author_name: Some("admin".into()),
        };
        let response = forged.add_author_comment(&comment).await?;
        response.expect_status("author comment", 403)?;
        let error = response.error_message().unwrap_or_default().to_lowercase();
        if ["unauthorized", "invalid", "token", "expired"]
            .iter()
            .any(|word| error.contains(word))
        {
            Ok(())
        } else {
            Err(ProbeError::AssertionMismatch {
                target: "author comment".into(),
                expected: "error about the token".into(),
                actual: response.body.to_string(),
            })
        }
    })
}

/// Registering an existing username is a 409
#[must_use]
pub fn duplicate_registration_conflicts(api: &BlogApi, credentials: &Credentials) -> Scenario {
    let username = credentials.username.clone();
    probe("duplicate registration conflicts", api, move |api| {
        let username = username.clone();
        async move {
            let response = api.register(&username, "admin12").await?;
            expect_rejected(&response, "duplicate registration", 409)
        }
    })
}
