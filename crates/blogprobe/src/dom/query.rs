//! Selector resolution against a [`Document`].

use super::{normalize_whitespace, Document, NodeId};
use crate::result::ProbeResult;
use crate::selector::{Selector, TextMatch};
use std::collections::HashSet;

/// Resolve a selector tree to matching nodes, in document order
pub fn resolve(doc: &Document, selector: &Selector) -> ProbeResult<Vec<NodeId>> {
    resolve_within(doc, selector, doc.root())
}

fn resolve_within(doc: &Document, selector: &Selector, scope: NodeId) -> ProbeResult<Vec<NodeId>> {
    let candidates = doc.descendants(scope);
    let found = match selector {
        Selector::Css { css } => {
            let list = crate::css::parse(css)?;
            candidates
                .into_iter()
                .filter(|n| list.matches(doc, *n))
                .collect()
        }
        Selector::Role { role, name } => candidates
            .into_iter()
            .filter(|n| doc.is_visible(*n))
            .filter(|n| role_of(doc, *n).as_deref() == Some(role.as_str()))
            .filter(|n| {
                name.as_ref()
                    .map_or(true, |m| m.matches(&accessible_name(doc, *n)))
            })
            .collect(),
        Selector::Text { text } => deepest_text_matches(doc, candidates, text),
        Selector::Attribute { name, op, value } => candidates
            .into_iter()
            .filter(|n| {
                doc.get(*n)
                    .and_then(|node| node.attr(name))
                    .is_some_and(|actual| op.test(actual, value, false))
            })
            .collect(),
        Selector::Label { text } => labelled_controls(doc, &candidates, text),
        Selector::Placeholder { text } => candidates
            .into_iter()
            .filter(|n| {
                doc.get(*n)
                    .and_then(|node| node.attr("placeholder"))
                    .is_some_and(|p| text.matches(p))
            })
            .collect(),
        Selector::TestId { id } => candidates
            .into_iter()
            .filter(|n| doc.get(*n).and_then(|node| node.attr("data-testid")) == Some(id))
            .collect(),
        Selector::Scoped { parent, child } => {
            let mut hits = HashSet::new();
            for p in resolve_within(doc, parent, scope)? {
                hits.extend(resolve_within(doc, child, p)?);
            }
            in_document_order(candidates, &hits)
        }
        Selector::HasText { base, text } => resolve_within(doc, base, scope)?
            .into_iter()
            .filter(|n| text.matches(&doc.text_content(*n)))
            .collect(),
        Selector::Nth { base, index } => {
            let all = resolve_within(doc, base, scope)?;
            let pick = if *index < 0 {
                all.len().checked_sub(index.unsigned_abs() as usize)
            } else {
                Some(*index as usize)
            };
            pick.and_then(|i| all.get(i).copied()).into_iter().collect()
        }
        Selector::Or { first, second } => {
            let mut hits: HashSet<NodeId> =
                resolve_within(doc, first, scope)?.into_iter().collect();
            hits.extend(resolve_within(doc, second, scope)?);
            in_document_order(candidates, &hits)
        }
    };
    Ok(found)
}

fn in_document_order(candidates: Vec<NodeId>, hits: &HashSet<NodeId>) -> Vec<NodeId> {
    candidates.into_iter().filter(|n| hits.contains(n)).collect()
}

/// Text selectors match the innermost element carrying the text, not every
/// ancestor that contains it
fn deepest_text_matches(doc: &Document, candidates: Vec<NodeId>, text: &TextMatch) -> Vec<NodeId> {
    let matching: Vec<NodeId> = candidates
        .into_iter()
        .filter(|n| {
            doc.get(*n)
                .is_some_and(|node| !matches!(node.tag(), "script" | "style" | "head"))
        })
        .filter(|n| text.matches(&doc.text_content(*n)))
        .collect();
    let set: HashSet<NodeId> = matching.iter().copied().collect();
    matching
        .into_iter()
        .filter(|n| !doc.descendants(*n).iter().any(|d| set.contains(d)))
        .collect()
}

fn labelled_controls(doc: &Document, candidates: &[NodeId], text: &TextMatch) -> Vec<NodeId> {
    let allowed: HashSet<NodeId> = candidates.iter().copied().collect();
    let mut hits = HashSet::new();
    for label in doc.descendants(doc.root()) {
        let Some(node) = doc.get(label) else { continue };
        if node.tag() != "label" || !text.matches(&doc.text_content(label)) {
            continue;
        }
        let target = match node.attr("for") {
            Some(id) => doc.element_by_id(id),
            None => doc.descendants(label).into_iter().find(|d| is_labelable(doc, *d)),
        };
        hits.extend(target);
    }
    for n in candidates {
        if doc
            .get(*n)
            .and_then(|node| node.attr("aria-label"))
            .is_some_and(|l| text.matches(l))
        {
            let _ = hits.insert(*n);
        }
    }
    hits.retain(|n| allowed.contains(n));
    in_document_order(candidates.to_vec(), &hits)
}

fn is_labelable(doc: &Document, id: NodeId) -> bool {
    doc.get(id)
        .is_some_and(|n| matches!(n.tag(), "input" | "textarea" | "select" | "button"))
}

/// Explicit or implicit ARIA role
#[must_use]
pub fn role_of(doc: &Document, id: NodeId) -> Option<String> {
    let node = doc.get(id)?;
    if let Some(explicit) = node.attr("role").and_then(|r| r.split_whitespace().next()) {
        return Some(explicit.to_string());
    }
    let role = match node.tag() {
        "button" => "button",
        "a" | "area" if node.attr("href").is_some() => "link",
        "input" => match node.attr("type").unwrap_or("text") {
            "button" | "submit" | "reset" | "image" => "button",
            "checkbox" => "checkbox",
            "radio" => "radio",
            "range" => "slider",
            "number" => "spinbutton",
            "search" => "searchbox",
            "text" | "email" | "tel" | "url" => "textbox",
            _ => return None,
        },
        "textarea" => "textbox",
        "select" if node.attr("multiple").is_some() => "listbox",
        "select" => "combobox",
        "option" => "option",
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => "heading",
        "ul" | "ol" => "list",
        "li" => "listitem",
        "nav" => "navigation",
        "main" => "main",
        "header" => "banner",
        "footer" => "contentinfo",
        "article" => "article",
        "dialog" => "dialog",
        "form" => "form",
        "table" => "table",
        "tr" => "row",
        "td" => "cell",
        "th" => "columnheader",
        "img" if node.attr("alt").is_some_and(|a| !a.is_empty()) => "img",
        "img" => "presentation",
        _ => return None,
    };
    Some(role.to_string())
}

/// Accessible name: aria-label, aria-labelledby, associated label, then
/// content or alternative text depending on the element
#[must_use]
pub fn accessible_name(doc: &Document, id: NodeId) -> String {
    let Some(node) = doc.get(id) else {
        return String::new();
    };
    if let Some(label) = node.attr("aria-label").filter(|l| !l.trim().is_empty()) {
        return normalize_whitespace(label);
    }
    if let Some(ids) = node.attr("aria-labelledby") {
        let joined: Vec<String> = ids
            .split_whitespace()
            .filter_map(|i| doc.element_by_id(i))
            .map(|n| doc.text_content(n))
            .collect();
        if !joined.is_empty() {
            return normalize_whitespace(&joined.join(" "));
        }
    }
    match node.tag() {
        "input" | "textarea" | "select" => {
            if matches!(node.attr("type"), Some("submit" | "button" | "reset")) {
                return node.value().to_string();
            }
            if let Some(text) = label_text_for(doc, id) {
                return text;
            }
            node.attr("title")
                .or_else(|| node.attr("placeholder"))
                .map(normalize_whitespace)
                .unwrap_or_default()
        }
        "img" => node.attr("alt").map(normalize_whitespace).unwrap_or_default(),
        _ => {
            let text = normalize_whitespace(&doc.text_content(id));
            if text.is_empty() {
                node.attr("title").map(normalize_whitespace).unwrap_or_default()
            } else {
                text
            }
        }
    }
}

fn label_text_for(doc: &Document, control: NodeId) -> Option<String> {
    let html_id = doc.get(control)?.attr("id");
    if let Some(html_id) = html_id {
        let by_for = doc.descendants(doc.root()).into_iter().find(|n| {
            doc.get(*n)
                .is_some_and(|node| node.tag() == "label" && node.attr("for") == Some(html_id))
        });
        if let Some(label) = by_for {
            return Some(normalize_whitespace(&doc.text_content(label)));
        }
    }
    doc.closest(control, "label")
        .map(|label| normalize_whitespace(&doc.text_content(label)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dom::El;

    fn blog_list() -> Document {
        Document::from_body(vec![
            El::new("form").children(vec![
                El::new("label").attr("for", "username").text("Username"),
                El::new("input").attr("id", "username").attr("type", "text"),
                El::new("label").text("Password").child(
                    El::new("input")
                        .attr("type", "password")
                        .attr("placeholder", "Enter password"),
                ),
                El::new("button").attr("type", "submit").text("Login"),
            ]),
            El::new("ul").children(vec![
                El::new("li").attr("class", "card").children(vec![
                    El::new("h2").text("Getting Started"),
                    El::new("p").text("5 likes"),
                ]),
                El::new("li").attr("class", "card").children(vec![
                    El::new("h2").text("Advanced Rust"),
                    El::new("p").text("2 likes"),
                ]),
            ]),
            El::new("button")
                .attr("aria-label", "Toggle theme")
                .child(El::new("svg").attr("data-testid", "DarkModeIcon")),
        ])
    }

    fn tags(doc: &Document, nodes: &[NodeId]) -> Vec<String> {
        nodes
            .iter()
            .map(|n| doc.get(*n).unwrap().tag().to_string())
            .collect()
    }

    #[test]
    fn test_role_with_name() {
        let doc = blog_list();
        let sel = Selector::role("button", Some(TextMatch::exact("Login"))).unwrap();
        let hits = resolve(&doc, &sel).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(doc.text_content(hits[0]), "Login");

        let toggle = Selector::role("button", Some(TextMatch::contains("theme"))).unwrap();
        assert_eq!(resolve(&doc, &toggle).unwrap().len(), 1);
        let textboxes = Selector::role("textbox", None).unwrap();
        assert_eq!(resolve(&doc, &textboxes).unwrap().len(), 1);
    }

    #[test]
    fn test_text_picks_deepest_element() {
        let doc = blog_list();
        let sel = Selector::text(TextMatch::contains("Getting")).unwrap();
        let hits = resolve(&doc, &sel).unwrap();
        assert_eq!(tags(&doc, &hits), vec!["h2"]);
    }

    #[test]
    fn test_label_for_and_wrapping() {
        let doc = blog_list();
        let user = resolve(&doc, &Selector::label(TextMatch::exact("Username")).unwrap()).unwrap();
        assert_eq!(doc.get(user[0]).unwrap().attr("id"), Some("username"));
        let pass = resolve(&doc, &Selector::label(TextMatch::exact("Password")).unwrap()).unwrap();
        assert_eq!(doc.get(pass[0]).unwrap().attr("type"), Some("password"));
        let by_placeholder =
            resolve(&doc, &Selector::placeholder(TextMatch::contains("password")).unwrap())
                .unwrap();
        assert_eq!(by_placeholder, pass);
    }

    #[test]
    fn test_scoped_has_text_and_nth() {
        let doc = blog_list();
        let card = Selector::css("li.card")
            .unwrap()
            .has_text(TextMatch::contains("Advanced"));
        let likes = card.scoped(Selector::css("p").unwrap());
        let hits = resolve(&doc, &likes).unwrap();
        assert_eq!(doc.text_content(hits[0]), "2 likes");

        let last = Selector::css("li").unwrap().last();
        let hits = resolve(&doc, &last).unwrap();
        assert!(doc.text_content(hits[0]).contains("Advanced"));
        assert!(resolve(&doc, &Selector::css("li").unwrap().nth(5))
            .unwrap()
            .is_empty());
        assert!(resolve(&doc, &Selector::css("li").unwrap().nth(-3))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_or_keeps_document_order_without_duplicates() {
        let doc = blog_list();
        let sel = Selector::css("p")
            .unwrap()
            .or(Selector::css("h2").unwrap())
            .or(Selector::css("p").unwrap());
        let hits = resolve(&doc, &sel).unwrap();
        assert_eq!(tags(&doc, &hits), vec!["h2", "p", "h2", "p"]);
    }

    #[test]
    fn test_test_id_and_attribute() {
        let doc = blog_list();
        let icon = resolve(&doc, &Selector::test_id("DarkModeIcon").unwrap()).unwrap();
        assert_eq!(tags(&doc, &icon), vec!["svg"]);
        let submit = resolve(&doc, &Selector::attribute("type", "=", "submit").unwrap()).unwrap();
        assert_eq!(submit.len(), 1);
    }

    #[test]
    fn test_password_inputs_have_no_role() {
        let doc = blog_list();
        let pass = doc.query_css("input[type=password]").unwrap()[0];
        assert_eq!(role_of(&doc, pass), None);
        assert_eq!(accessible_name(&doc, pass), "Password");
    }
}
