//! Read-only views of state the blog client persists in local storage.
//!
//! These are oracles for assertions. Scenarios never branch on them.

use crate::page::Page;
use crate::result::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Local-storage key holding the JSON array of read blog ids
pub const READ_BLOGS_KEY: &str = "readBlogs";

/// Local-storage key holding the theme preference
pub const THEME_KEY: &str = "themeMode";

/// Persisted theme preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light mode
    Light,
    /// Dark mode
    Dark,
}

impl Theme {
    /// Stored value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    /// The other theme
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    /// Parse a stored value
    pub fn parse(raw: &str) -> ProbeResult<Self> {
        match raw.trim().trim_matches('"') {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(ProbeError::invalid_state(format!(
                "unrecognised {THEME_KEY} value {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse the read-blogs array. Ids may be stored as numbers or strings.
pub fn parse_read_blog_ids(raw: &str) -> ProbeResult<Vec<String>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(raw)?;
    values
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => Ok(s),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            other => Err(ProbeError::invalid_state(format!(
                "unexpected {READ_BLOGS_KEY} entry {other}"
            ))),
        })
        .collect()
}

/// Blog ids the client has marked as read; empty when nothing is stored
pub async fn read_blog_ids(page: &Page) -> ProbeResult<Vec<String>> {
    match page.local_storage(READ_BLOGS_KEY).await? {
        Some(raw) => parse_read_blog_ids(&raw),
        None => Ok(Vec::new()),
    }
}

/// Stored theme, if any
pub async fn theme(page: &Page) -> ProbeResult<Option<Theme>> {
    page.local_storage(THEME_KEY)
        .await?
        .map(|raw| Theme::parse(&raw))
        .transpose()
}
