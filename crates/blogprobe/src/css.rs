//! CSS selector parsing and matching for the in-memory document.
//!
//! Covers the subset the blog suite relies on: type/universal, `#id`,
//! `.class`, attribute operators (with the `i` flag), the four combinators,
//! selector lists and a handful of structural pseudo-classes including
//! `:has()` and `:not()`. Anything else is rejected at parse time so a typo
//! fails immediately rather than silently matching nothing.

use crate::dom::{Document, NodeId};
use crate::result::{ProbeError, ProbeResult};

/// Comma-separated list of complex selectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList(pub Vec<Complex>);

/// Compound selectors joined by combinators, left to right
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Complex {
    /// The combinator stored with each compound links it to the previous one;
    /// the first entry's combinator is ignored.
    pub parts: Vec<(Combinator, Compound)>,
}

/// How two compounds relate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// `a b`
    Descendant,
    /// `a > b`
    Child,
    /// `a + b`
    Adjacent,
    /// `a ~ b`
    Sibling,
}

/// A sequence of simple selectors that all apply to one element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    /// Tag name, lowercase; `None` for `*` or omitted
    pub tag: Option<String>,
    /// `#id` parts
    pub ids: Vec<String>,
    /// `.class` parts
    pub classes: Vec<String>,
    /// `[attr...]` parts
    pub attrs: Vec<AttrSelector>,
    /// `:pseudo` parts
    pub pseudos: Vec<Pseudo>,
}

/// Attribute comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrOp {
    /// `[a]`
    Exists,
    /// `[a=v]`
    Equals,
    /// `[a*=v]`
    Contains,
    /// `[a^=v]`
    Prefix,
    /// `[a$=v]`
    Suffix,
    /// `[a~=v]`
    Word,
    /// `[a|=v]`
    DashPrefix,
}

impl AttrOp {
    /// CSS token for this operator
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Exists => "",
            Self::Equals => "=",
            Self::Contains => "*=",
            Self::Prefix => "^=",
            Self::Suffix => "$=",
            Self::Word => "~=",
            Self::DashPrefix => "|=",
        }
    }

    /// Compare an attribute value
    #[must_use]
    pub fn test(self, actual: &str, expected: &str, ignore_case: bool) -> bool {
        let (actual, expected) = if ignore_case {
            (actual.to_lowercase(), expected.to_lowercase())
        } else {
            (actual.to_string(), expected.to_string())
        };
        match self {
            Self::Exists => true,
            Self::Equals => actual == expected,
            Self::Contains => !expected.is_empty() && actual.contains(&expected),
            Self::Prefix => !expected.is_empty() && actual.starts_with(&expected),
            Self::Suffix => !expected.is_empty() && actual.ends_with(&expected),
            Self::Word => actual.split_whitespace().any(|w| w == expected),
            Self::DashPrefix => actual == expected || actual.starts_with(&format!("{expected}-")),
        }
    }
}

/// `[name op value i]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSelector {
    /// Attribute name, lowercase
    pub name: String,
    /// Operator
    pub op: AttrOp,
    /// Value (empty for `Exists`)
    pub value: String,
    /// `i` flag
    pub ignore_case: bool,
}

/// Supported pseudo-classes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pseudo {
    /// `:first-child`
    FirstChild,
    /// `:last-child`
    LastChild,
    /// `:nth-child(n)`, 1-based
    NthChild(usize),
    /// `:checked`
    Checked,
    /// `:disabled`
    Disabled,
    /// `:enabled`
    Enabled,
    /// `:empty`
    Empty,
    /// `:not(list)`
    Not(SelectorList),
    /// `:has(list)` / `:has(> list)`
    Has {
        /// Only direct children are considered
        child_only: bool,
        /// Relative selector
        list: SelectorList,
    },
}

/// Parse a CSS selector list
pub fn parse(source: &str) -> ProbeResult<SelectorList> {
    if source.trim().is_empty() {
        return Err(ProbeError::invalid_selector(source, "empty CSS selector"));
    }
    let mut parser = Parser {
        source,
        chars: source.chars().collect(),
        pos: 0,
    };
    let list = parser.parse_list()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(parser.error(format!(
            "unexpected `{}` at offset {}",
            parser.chars[parser.pos], parser.pos
        )));
    }
    Ok(list)
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: impl Into<String>) -> ProbeError {
        ProbeError::invalid_selector(self.source, reason)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn expect(&mut self, want: char) -> ProbeResult<()> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(self.error(format!("expected `{want}`, found `{c}`"))),
            None => Err(self.error(format!("expected `{want}`, found end of input"))),
        }
    }

    fn parse_list(&mut self) -> ProbeResult<SelectorList> {
        let mut complexes = Vec::new();
        loop {
            self.skip_ws();
            complexes.push(self.parse_complex()?);
            self.skip_ws();
            if self.peek() == Some(',') {
                self.pos += 1;
                continue;
            }
            break;
        }
        Ok(SelectorList(complexes))
    }

    fn parse_complex(&mut self) -> ProbeResult<Complex> {
        let mut parts = vec![(Combinator::Descendant, self.parse_compound()?)];
        loop {
            let had_ws = self.skip_ws();
            let combinator = match self.peek() {
                Some('>') => Combinator::Child,
                Some('+') => Combinator::Adjacent,
                Some('~') => Combinator::Sibling,
                Some(',' | ')') | None => break,
                Some(_) if had_ws => Combinator::Descendant,
                Some(c) => return Err(self.error(format!("unexpected `{c}`"))),
            };
            if combinator != Combinator::Descendant {
                self.pos += 1;
                self.skip_ws();
            }
            parts.push((combinator, self.parse_compound()?));
        }
        Ok(Complex { parts })
    }

    fn parse_compound(&mut self) -> ProbeResult<Compound> {
        let mut compound = Compound::default();
        let start = self.pos;
        match self.peek() {
            Some('*') => {
                self.pos += 1;
            }
            Some(c) if is_ident_start(c) => {
                compound.tag = Some(self.parse_ident()?.to_lowercase());
            }
            _ => {}
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.ids.push(self.parse_ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.parse_ident()?);
                }
                Some('[') => compound.attrs.push(self.parse_attr()?),
                Some(':') => compound.pseudos.push(self.parse_pseudo()?),
                _ => break,
            }
        }
        if self.pos == start {
            return Err(match self.peek() {
                Some(c) => self.error(format!("expected a selector, found `{c}`")),
                None => self.error("expected a selector after combinator"),
            });
        }
        Ok(compound)
    }

    fn parse_ident(&mut self) -> ProbeResult<String> {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                match self.bump() {
                    Some(escaped) => ident.push(escaped),
                    None => return Err(self.error("dangling escape")),
                }
            } else if is_ident_char(c) {
                ident.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if ident.is_empty() {
            return Err(self.error(format!("expected identifier at offset {}", self.pos)));
        }
        Ok(ident)
    }

    fn parse_attr(&mut self) -> ProbeResult<AttrSelector> {
        self.expect('[')?;
        self.skip_ws();
        let name = self.parse_ident()?.to_lowercase();
        self.skip_ws();
        let op = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(AttrSelector {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                    ignore_case: false,
                });
            }
            Some('=') => AttrOp::Equals,
            Some('*') => AttrOp::Contains,
            Some('^') => AttrOp::Prefix,
            Some('$') => AttrOp::Suffix,
            Some('~') => AttrOp::Word,
            Some('|') => AttrOp::DashPrefix,
            Some(c) => return Err(self.error(format!("unknown attribute operator `{c}`"))),
            None => return Err(self.error("unterminated attribute selector")),
        };
        self.pos += 1;
        if op != AttrOp::Equals {
            self.expect('=')?;
        }
        self.skip_ws();
        let value = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some('\\') => match self.bump() {
                            Some(c) => value.push(c),
                            None => return Err(self.error("dangling escape")),
                        },
                        Some(c) if c == q => break,
                        Some(c) => value.push(c),
                        None => return Err(self.error("unterminated string")),
                    }
                }
                value
            }
            _ => self.parse_ident()?,
        };
        self.skip_ws();
        let ignore_case = match self.peek() {
            Some('i' | 'I') => {
                self.pos += 1;
                self.skip_ws();
                true
            }
            Some('s' | 'S') => {
                self.pos += 1;
                self.skip_ws();
                false
            }
            _ => false,
        };
        self.expect(']')?;
        Ok(AttrSelector {
            name,
            op,
            value,
            ignore_case,
        })
    }

    fn parse_pseudo(&mut self) -> ProbeResult<Pseudo> {
        self.expect(':')?;
        let name = self.parse_ident()?.to_lowercase();
        let pseudo = match name.as_str() {
            "first-child" => Pseudo::FirstChild,
            "last-child" => Pseudo::LastChild,
            "checked" => Pseudo::Checked,
            "disabled" => Pseudo::Disabled,
            "enabled" => Pseudo::Enabled,
            "empty" => Pseudo::Empty,
            "nth-child" => {
                self.expect('(')?;
                self.skip_ws();
                let digits = self.parse_ident()?;
                let n = digits
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| self.error(format!("unsupported :nth-child({digits})")))?;
                self.skip_ws();
                self.expect(')')?;
                Pseudo::NthChild(n)
            }
            "not" => {
                self.expect('(')?;
                let list = self.parse_list()?;
                self.expect(')')?;
                Pseudo::Not(list)
            }
            "has" => {
                self.expect('(')?;
                self.skip_ws();
                let child_only = if self.peek() == Some('>') {
                    self.pos += 1;
                    true
                } else {
                    false
                };
                let list = self.parse_list()?;
                self.expect(')')?;
                Pseudo::Has { child_only, list }
            }
            other => return Err(self.error(format!("unsupported pseudo-class `:{other}`"))),
        };
        Ok(pseudo)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}

// =============================================================================
// MATCHING
// =============================================================================

impl SelectorList {
    /// Whether `node` matches any selector in the list
    #[must_use]
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.0.iter().any(|c| c.matches(doc, node))
    }
}

impl Complex {
    /// Whether `node` is the subject of this complex selector
    #[must_use]
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        match_from(doc, &self.parts, self.parts.len() - 1, node)
    }
}

fn match_from(doc: &Document, parts: &[(Combinator, Compound)], idx: usize, node: NodeId) -> bool {
    let (combinator, compound) = &parts[idx];
    if !compound.matches(doc, node) {
        return false;
    }
    if idx == 0 {
        return true;
    }
    match combinator {
        Combinator::Child => doc
            .parent_element(node)
            .is_some_and(|p| match_from(doc, parts, idx - 1, p)),
        Combinator::Descendant => {
            let mut cursor = doc.parent_element(node);
            while let Some(ancestor) = cursor {
                if match_from(doc, parts, idx - 1, ancestor) {
                    return true;
                }
                cursor = doc.parent_element(ancestor);
            }
            false
        }
        Combinator::Adjacent => doc
            .previous_sibling(node)
            .is_some_and(|s| match_from(doc, parts, idx - 1, s)),
        Combinator::Sibling => {
            let mut cursor = doc.previous_sibling(node);
            while let Some(sibling) = cursor {
                if match_from(doc, parts, idx - 1, sibling) {
                    return true;
                }
                cursor = doc.previous_sibling(sibling);
            }
            false
        }
    }
}

impl Compound {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(el) = doc.get(node) else {
            return false;
        };
        if el.is_document() {
            return false;
        }
        if let Some(tag) = &self.tag {
            if el.tag() != tag {
                return false;
            }
        }
        if !self.ids.iter().all(|id| el.attr("id") == Some(id.as_str())) {
            return false;
        }
        if !self.classes.iter().all(|c| el.has_class(c)) {
            return false;
        }
        for attr in &self.attrs {
            match el.attr(&attr.name) {
                Some(actual) if attr.op.test(actual, &attr.value, attr.ignore_case) => {}
                _ => return false,
            }
        }
        self.pseudos.iter().all(|p| p.matches(doc, node))
    }
}

impl Pseudo {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        match self {
            Self::FirstChild => doc.previous_sibling(node).is_none(),
            Self::LastChild => doc.next_sibling(node).is_none(),
            Self::NthChild(n) => doc.sibling_index(node) == Some(n - 1),
            Self::Checked => doc.get(node).is_some_and(crate::dom::Node::is_checked),
            Self::Disabled => doc.is_disabled(node),
            Self::Enabled => !doc.is_disabled(node),
            Self::Empty => doc.children(node).is_empty() && doc.text_content(node).is_empty(),
            Self::Not(list) => !list.matches(doc, node),
            Self::Has { child_only, list } => {
                if *child_only {
                    doc.children(node).iter().any(|c| list.matches(doc, *c))
                } else {
                    doc.descendants(node).into_iter().any(|d| list.matches(doc, d))
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dom::El;
    use proptest::prelude::*;

    fn doc() -> Document {
        Document::from_body(vec![
            El::new("form").attr("id", "login").children(vec![
                El::new("input").attr("type", "text").attr("name", "username"),
                El::new("input").attr("type", "password").attr("name", "password"),
                El::new("button")
                    .attr("type", "submit")
                    .attr("class", "MuiButton-root primary")
                    .text("LOGIN"),
            ]),
            El::new("ul").children(vec![
                El::new("li").text("one"),
                El::new("li").text("two"),
                El::new("li").attr("class", "read").text("three"),
            ]),
            El::new("button").child(El::new("svg").attr("data-testid", "ThumbUpIcon")),
        ])
    }

    fn select(doc: &Document, css: &str) -> Vec<String> {
        let list = parse(css).unwrap();
        doc.descendants(doc.root())
            .into_iter()
            .filter(|n| list.matches(doc, *n))
            .map(|n| doc.text_content(n))
            .collect()
    }

    #[test]
    fn test_type_class_and_attribute() {
        let d = doc();
        assert_eq!(select(&d, "button[type=\"submit\"]"), vec!["LOGIN"]);
        assert_eq!(select(&d, "button.primary"), vec!["LOGIN"]);
        assert_eq!(select(&d, "[class*=\"MuiButton\"]"), vec!["LOGIN"]);
        assert_eq!(select(&d, "input[name=USERNAME i]").len(), 1);
        assert_eq!(select(&d, "input[type=\"text\"], input[name=\"username\"]").len(), 1);
    }

    #[test]
    fn test_combinators() {
        let d = doc();
        assert_eq!(select(&d, "form > button").len(), 1);
        assert_eq!(select(&d, "ul li").len(), 3);
        assert_eq!(select(&d, "li + li"), vec!["two", "three"]);
        assert_eq!(select(&d, "li:first-child ~ li.read"), vec!["three"]);
        assert!(select(&d, "ul > button").is_empty());
    }

    #[test]
    fn test_structural_pseudos() {
        let d = doc();
        assert_eq!(select(&d, "li:last-child"), vec!["three"]);
        assert_eq!(select(&d, "li:nth-child(2)"), vec!["two"]);
        assert_eq!(select(&d, "li:not(.read)"), vec!["one", "two"]);
        assert_eq!(select(&d, "ul:has(li)").len(), 1);
        assert_eq!(
            select(&d, "button:has(svg[data-testid=\"ThumbUpIcon\"])").len(),
            1
        );
        assert!(select(&d, "form:has(> li)").is_empty());
    }

    #[test]
    fn test_malformed_selectors_rejected() {
        for bad in [
            "",
            "   ",
            "button[",
            "button[type=\"submit\"",
            "a >",
            "> a",
            "div:hover",
            "div:nth-child(odd)",
            "input[name!=x]",
            "a,,b",
        ] {
            let err = parse(bad).unwrap_err();
            assert!(
                matches!(err, ProbeError::InvalidSelector { .. }),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_escaped_identifier() {
        let list = parse("#a\\:b").unwrap();
        assert_eq!(list.0[0].parts[0].1.ids, vec!["a:b".to_string()]);
    }

    proptest! {
        #[test]
        fn prop_simple_compounds_parse(tag in "[a-z]{1,8}", class in "[a-z][a-z0-9-]{0,8}") {
            let source = format!("{tag}.{class} > {tag}");
            let list = parse(&source).unwrap();
            prop_assert_eq!(list.0.len(), 1);
            prop_assert_eq!(list.0[0].parts.len(), 2);
            prop_assert_eq!(list.0[0].parts[1].0, Combinator::Child);
        }

        #[test]
        fn prop_parser_never_panics(source in "\\PC{0,40}") {
            let _ = parse(&source);
        }
    }
}
