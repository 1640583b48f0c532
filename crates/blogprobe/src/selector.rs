//! Selector trees: the declarative half of a locator.
//!
//! A [`Selector`] describes *how* to find elements, never *which* elements
//! were found. Every evaluation re-resolves the tree against the live
//! document, so a selector built before a re-render still finds the new
//! nodes afterwards.
//!
//! Constructors validate eagerly. A malformed CSS string, an empty matcher or
//! an uncompilable pattern is an [`ProbeError::InvalidSelector`] at build
//! time and is never retried by the poller.

use crate::css::{self, AttrOp};
use crate::dom::normalize_whitespace;
use crate::result::{ProbeError, ProbeResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Text matching
// =============================================================================

/// A compiled regular expression that serializes as its source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern(Regex);

impl Pattern {
    /// Compile a pattern
    pub fn new(source: &str) -> ProbeResult<Self> {
        if source.is_empty() {
            return Err(ProbeError::invalid_selector(source, "empty pattern"));
        }
        Regex::new(source)
            .map(Self)
            .map_err(|e| ProbeError::invalid_selector(source, e.to_string()))
    }

    /// Pattern source
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Test a string
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Pattern {}

impl TryFrom<String> for Pattern {
    type Error = ProbeError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Self::new(&source)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.as_str().to_string()
    }
}

/// How element text is compared; actual text is whitespace-normalized first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TextMatch {
    /// Whole normalized text equals
    Exact {
        /// Expected text
        text: String,
    },
    /// Normalized text contains a substring
    Contains {
        /// Expected substring
        text: String,
        /// Compare case-insensitively
        ignore_case: bool,
    },
    /// Normalized text matches a regular expression
    Pattern {
        /// Compiled expression
        pattern: Pattern,
    },
}

impl TextMatch {
    /// Exact match
    #[must_use]
    pub fn exact(text: impl Into<String>) -> Self {
        Self::Exact { text: text.into() }
    }

    /// Case-sensitive substring match
    #[must_use]
    pub fn contains(text: impl Into<String>) -> Self {
        Self::Contains {
            text: text.into(),
            ignore_case: false,
        }
    }

    /// Case-insensitive substring match
    #[must_use]
    pub fn contains_ignore_case(text: impl Into<String>) -> Self {
        Self::Contains {
            text: text.into(),
            ignore_case: true,
        }
    }

    /// Regular expression match
    pub fn pattern(source: &str) -> ProbeResult<Self> {
        Ok(Self::Pattern {
            pattern: Pattern::new(source)?,
        })
    }

    /// Test raw element text
    #[must_use]
    pub fn matches(&self, actual: &str) -> bool {
        let actual = normalize_whitespace(actual);
        match self {
            Self::Exact { text } => actual == normalize_whitespace(text),
            Self::Contains { text, ignore_case } => {
                let expected = normalize_whitespace(text);
                if *ignore_case {
                    actual.to_lowercase().contains(&expected.to_lowercase())
                } else {
                    actual.contains(&expected)
                }
            }
            Self::Pattern { pattern } => pattern.is_match(&actual),
        }
    }

    fn check_not_blank(&self, context: &str) -> ProbeResult<()> {
        match self {
            Self::Exact { text } | Self::Contains { text, .. } if text.trim().is_empty() => Err(
                ProbeError::invalid_selector(context, "text matcher must not be empty"),
            ),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact { text } => write!(f, "={text:?}"),
            Self::Contains {
                text,
                ignore_case: false,
            } => write!(f, "~{text:?}"),
            Self::Contains {
                text,
                ignore_case: true,
            } => write!(f, "~{text:?}i"),
            Self::Pattern { pattern } => write!(f, "=/{}/", pattern.as_str()),
        }
    }
}

// =============================================================================
// Selector tree
// =============================================================================

/// Immutable tree of element matchers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selector {
    /// CSS selector list
    Css {
        /// Source text
        css: String,
    },
    /// ARIA role with optional accessible-name filter
    Role {
        /// Role name
        role: String,
        /// Accessible name filter
        name: Option<TextMatch>,
    },
    /// Deepest elements whose text matches
    Text {
        /// Text filter
        text: TextMatch,
    },
    /// Attribute comparison
    Attribute {
        /// Attribute name
        name: String,
        /// Operator
        op: AttrOp,
        /// Operand (ignored for `Exists`)
        value: String,
    },
    /// Form controls by associated label text
    Label {
        /// Label filter
        text: TextMatch,
    },
    /// Inputs by placeholder
    Placeholder {
        /// Placeholder filter
        text: TextMatch,
    },
    /// `data-testid` equality
    TestId {
        /// Test id
        id: String,
    },
    /// `child` evaluated inside each `parent` match
    Scoped {
        /// Outer selector
        parent: Box<Selector>,
        /// Inner selector
        child: Box<Selector>,
    },
    /// Matches of `base` whose full text matches
    HasText {
        /// Base selector
        base: Box<Selector>,
        /// Text filter
        text: TextMatch,
    },
    /// One match of `base` by position; negative counts from the end
    Nth {
        /// Base selector
        base: Box<Selector>,
        /// Position (`-1` is the last match)
        index: i32,
    },
    /// Union of two selectors, in document order
    Or {
        /// Left alternative
        first: Box<Selector>,
        /// Right alternative
        second: Box<Selector>,
    },
}

impl Selector {
    /// CSS selector; parsed immediately
    pub fn css(source: impl Into<String>) -> ProbeResult<Self> {
        let css = source.into();
        if css.trim().is_empty() {
            return Err(ProbeError::invalid_selector(css, "empty CSS selector"));
        }
        let _ = css::parse(&css)?;
        Ok(Self::Css { css })
    }

    /// ARIA role, optionally filtered by accessible name
    pub fn role(role: impl Into<String>, name: Option<TextMatch>) -> ProbeResult<Self> {
        let role = role.into();
        if role.is_empty() || !role.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(ProbeError::invalid_selector(
                format!("role={role}"),
                "role must be a lowercase ARIA role name",
            ));
        }
        if let Some(name) = &name {
            name.check_not_blank(&format!("role={role}"))?;
        }
        Ok(Self::Role { role, name })
    }

    /// Elements by visible text
    pub fn text(text: TextMatch) -> ProbeResult<Self> {
        text.check_not_blank(&format!("text{text}"))?;
        Ok(Self::Text { text })
    }

    /// Attribute comparison; `op` is a CSS operator token (`""`, `=`, `*=`, ...)
    pub fn attribute(
        name: impl Into<String>,
        op: &str,
        value: impl Into<String>,
    ) -> ProbeResult<Self> {
        let name = name.into();
        let value = value.into();
        let source = format!("[{name}{op}{value:?}]");
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
        {
            return Err(ProbeError::invalid_selector(source, "invalid attribute name"));
        }
        let op = match op {
            "" => AttrOp::Exists,
            "=" => AttrOp::Equals,
            "*=" => AttrOp::Contains,
            "^=" => AttrOp::Prefix,
            "$=" => AttrOp::Suffix,
            "~=" => AttrOp::Word,
            "|=" => AttrOp::DashPrefix,
            other => {
                return Err(ProbeError::invalid_selector(
                    source,
                    format!("unknown attribute operator `{other}`"),
                ))
            }
        };
        Ok(Self::Attribute {
            name: name.to_lowercase(),
            op,
            value,
        })
    }

    /// Form controls by label
    pub fn label(text: TextMatch) -> ProbeResult<Self> {
        text.check_not_blank(&format!("label{text}"))?;
        Ok(Self::Label { text })
    }

    /// Inputs by placeholder
    pub fn placeholder(text: TextMatch) -> ProbeResult<Self> {
        text.check_not_blank(&format!("placeholder{text}"))?;
        Ok(Self::Placeholder { text })
    }

    /// `[data-testid="id"]`
    pub fn test_id(id: impl Into<String>) -> ProbeResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ProbeError::invalid_selector("testid=", "empty test id"));
        }
        Ok(Self::TestId { id })
    }

    /// Evaluate `child` inside each match of `self`
    #[must_use]
    pub fn scoped(self, child: Self) -> Self {
        Self::Scoped {
            parent: Box::new(self),
            child: Box::new(child),
        }
    }

    /// Keep matches whose text matches
    #[must_use]
    pub fn has_text(self, text: TextMatch) -> Self {
        Self::HasText {
            base: Box::new(self),
            text,
        }
    }

    /// Pick one match by position
    #[must_use]
    pub fn nth(self, index: i32) -> Self {
        Self::Nth {
            base: Box::new(self),
            index,
        }
    }

    /// First match
    #[must_use]
    pub fn first(self) -> Self {
        self.nth(0)
    }

    /// Last match
    #[must_use]
    pub fn last(self) -> Self {
        self.nth(-1)
    }

    /// Union with another selector
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or {
            first: Box::new(self),
            second: Box::new(other),
        }
    }

    /// Re-check a tree that did not come through the constructors
    /// (for instance one read back from a report)
    pub fn validate(&self) -> ProbeResult<()> {
        match self {
            Self::Css { css } => Self::css(css.clone()).map(|_| ()),
            Self::Role { role, name } => Self::role(role.clone(), name.clone()).map(|_| ()),
            Self::Text { text } | Self::Label { text } | Self::Placeholder { text } => {
                text.check_not_blank(&self.describe())
            }
            Self::Attribute { name, op, value } => {
                Self::attribute(name.clone(), op.token(), value.clone()).map(|_| ())
            }
            Self::TestId { id } => Self::test_id(id.clone()).map(|_| ()),
            Self::Scoped { parent, child } => {
                parent.validate()?;
                child.validate()
            }
            Self::HasText { base, text } => {
                base.validate()?;
                text.check_not_blank(&self.describe())
            }
            Self::Nth { base, .. } => base.validate(),
            Self::Or { first, second } => {
                first.validate()?;
                second.validate()
            }
        }
    }

    /// Human-readable form used in diagnostics
    #[must_use]
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css { css } => write!(f, "css={css}"),
            Self::Role { role, name: None } => write!(f, "role={role}"),
            Self::Role {
                role,
                name: Some(name),
            } => write!(f, "role={role}[name{name}]"),
            Self::Text { text } => write!(f, "text{text}"),
            Self::Attribute {
                name,
                op: AttrOp::Exists,
                ..
            } => write!(f, "attr=[{name}]"),
            Self::Attribute { name, op, value } => {
                write!(f, "attr=[{name}{}{value:?}]", op.token())
            }
            Self::Label { text } => write!(f, "label{text}"),
            Self::Placeholder { text } => write!(f, "placeholder{text}"),
            Self::TestId { id } => write!(f, "testid={id}"),
            Self::Scoped { parent, child } => write!(f, "{parent} >> {child}"),
            Self::HasText { base, text } => write!(f, "{base} >> has-text{text}"),
            Self::Nth { base, index } => write!(f, "{base} >> nth={index}"),
            Self::Or { first, second } => write!(f, "({first} | {second})"),
        }
    }
}
