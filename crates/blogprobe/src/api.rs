//! JSON client for the blog application's HTTP API.
//!
//! Responses are returned whatever their status: a 400 or 404 is data for a
//! contract probe to assert on, not a transport failure. Only connection and
//! protocol problems surface as [`ProbeError::Http`].

use crate::result::{ProbeError, ProbeResult};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Fields that change on every reseed and are left out of fingerprints
const VOLATILE_FIELDS: [&str; 3] = ["createdAt", "updatedAt", "publishedAt"];

/// Status and parsed body of an API call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// JSON body; a non-JSON body is kept as a string, an empty one as null
    pub body: Value,
}

impl ApiResponse {
    /// 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Top-level body field
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    /// Top-level string field
    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    /// The `error` message, if the body carries one
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.str_field("error")
    }

    /// Fail with `AssertionMismatch` unless the status is `expected`
    pub fn expect_status(&self, what: &str, expected: u16) -> ProbeResult<&Self> {
        if self.status == expected {
            Ok(self)
        } else {
            Err(ProbeError::AssertionMismatch {
                target: what.to_string(),
                expected: format!("status {expected}"),
                actual: format!("status {} with body {}", self.status, self.body),
            })
        }
    }

    /// Fail with `AssertionMismatch` unless the body has field `name`
    pub fn expect_field(&self, what: &str, name: &str) -> ProbeResult<&Value> {
        self.field(name).ok_or_else(|| ProbeError::AssertionMismatch {
            target: what.to_string(),
            expected: format!("body with `{name}`"),
            actual: self.body.to_string(),
        })
    }
}

/// Blog creation payload. Every field is optional so validation probes can
/// leave any one of them out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogDraft {
    /// Title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// HTML body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Teaser
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    /// Category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// `draft` or `published`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl BlogDraft {
    /// A draft with every required field set
    #[must_use]
    pub fn complete(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            content: Some("<p>Valid content</p>".to_string()),
            excerpt: Some("Excerpt".to_string()),
            category: Some("Technology".to_string()),
            tags: Vec::new(),
            status: Some("published".to_string()),
        }
    }

    /// Copy with `field` removed; unknown names leave the draft unchanged
    #[must_use]
    pub fn without(mut self, field: &str) -> Self {
        match field {
            "title" => self.title = None,
            "content" => self.content = None,
            "excerpt" => self.excerpt = None,
            "category" => self.category = None,
            "status" => self.status = None,
            _ => {}
        }
        self
    }
}

/// Public comment payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDraft {
    /// Target blog
    pub blog_id: u64,
    /// Body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
}

/// Client for the blog API
#[derive(Debug, Clone)]
pub struct BlogApi {
    base_url: String,
    client: reqwest::Client,
    token: Option<String>,
}

impl BlogApi {
    /// Client for `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ProbeResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    /// Client reusing an existing reqwest client
    #[must_use]
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            token: None,
        }
    }

    /// Base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Copy that sends `Authorization: Bearer <token>`
    #[must_use]
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..self.clone()
        }
    }

    /// Whether a bearer token is attached
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> ProbeResult<ApiResponse> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        tracing::debug!(%method, %url, status, "api call");
        Ok(ApiResponse { status, body })
    }

    /// `POST /api/auth/login`
    pub async fn login(&self, username: &str, password: &str) -> ProbeResult<ApiResponse> {
        let body = serde_json::json!({ "username": username, "password": password });
        self.send(Method::POST, "/api/auth/login", Some(&body)).await
    }

    /// Log in and return a client carrying the issued token
    pub async fn authenticate(&self, username: &str, password: &str) -> ProbeResult<Self> {
        let response = self.login(username, password).await?;
        response.expect_status("login", 200)?;
        let token = response
            .str_field("token")
            .ok_or_else(|| ProbeError::AssertionMismatch {
                target: "login".to_string(),
                expected: "body with a `token` string".to_string(),
                actual: response.body.to_string(),
            })?;
        Ok(self.with_token(token))
    }

    /// `POST /api/auth/register`
    pub async fn register(&self, username: &str, password: &str) -> ProbeResult<ApiResponse> {
        let body = serde_json::json!({ "username": username, "password": password });
        self.send(Method::POST, "/api/auth/register", Some(&body)).await
    }

    /// `POST /api/blogs`
    pub async fn create_blog(&self, draft: &BlogDraft) -> ProbeResult<ApiResponse> {
        let body = serde_json::to_value(draft)?;
        self.send(Method::POST, "/api/blogs", Some(&body)).await
    }

    /// `GET /api/blogs`
    pub async fn list_blogs(&self) -> ProbeResult<ApiResponse> {
        self.send(Method::GET, "/api/blogs", None).await
    }

    /// `GET /api/blogs/{id}`
    pub async fn get_blog(&self, id: u64) -> ProbeResult<ApiResponse> {
        self.send(Method::GET, &format!("/api/blogs/{id}"), None).await
    }

    /// `GET /api/blogs/public/{id}`
    pub async fn get_public_blog(&self, id: u64) -> ProbeResult<ApiResponse> {
        self.send(Method::GET, &format!("/api/blogs/public/{id}"), None)
            .await
    }

    /// `DELETE /api/blogs/{id}`
    pub async fn delete_blog(&self, id: u64) -> ProbeResult<ApiResponse> {
        self.send(Method::DELETE, &format!("/api/blogs/{id}"), None)
            .await
    }

    /// `POST /api/blogs/{id}/like`
    pub async fn like_blog(&self, id: u64) -> ProbeResult<ApiResponse> {
        self.send(Method::POST, &format!("/api/blogs/{id}/like"), None)
            .await
    }

    /// `POST /api/comments` (public, no auth)
    pub async fn add_comment(&self, comment: &CommentDraft) -> ProbeResult<ApiResponse> {
        let body = serde_json::to_value(comment)?;
        self.send(Method::POST, "/api/comments", Some(&body)).await
    }

    /// `POST /api/comments/author` (authenticated)
    pub async fn add_author_comment(&self, comment: &CommentDraft) -> ProbeResult<ApiResponse> {
        let body = serde_json::to_value(comment)?;
        self.send(Method::POST, "/api/comments/author", Some(&body))
            .await
    }

    /// SHA-256 of the blog listing with volatile timestamps removed
    pub async fn dataset_fingerprint(&self) -> ProbeResult<String> {
        let response = self.list_blogs().await?;
        response.expect_status("blog listing", 200)?;
        fingerprint(&response.body)
    }
}

fn strip_volatile(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for key in VOLATILE_FIELDS {
                let _ = map.remove(key);
            }
            map.values_mut().for_each(strip_volatile);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_volatile),
        _ => {}
    }
}

/// Canonical fingerprint of a JSON document: object keys sorted, volatile
/// timestamps dropped
pub fn fingerprint(body: &Value) -> ProbeResult<String> {
    let mut canonical = body.clone();
    strip_volatile(&mut canonical);
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}
