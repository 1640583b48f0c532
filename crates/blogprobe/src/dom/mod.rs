//! In-memory DOM used by [`VirtualPage`].
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Removing a subtree
//! frees its slots, so a stale id simply stops resolving; nothing outside this
//! module holds node references across driver calls.

mod page;
mod query;

pub use page::{DispatchedEvent, EventContext, PageState, VirtualPage};
pub use query::{accessible_name, resolve, role_of};

use crate::driver::BoundingBox;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Arena index of a node
pub type NodeId = usize;

const DOCUMENT_TAG: &str = "#document";
const ROW_HEIGHT: f32 = 24.0;

/// A single element node
#[derive(Debug, Clone)]
pub struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    value: String,
    checked: bool,
    layout: BoundingBox,
    covered: bool,
    animating: u32,
}

impl Node {
    fn new(tag: &str, id: NodeId) -> Self {
        Self {
            tag: tag.to_lowercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
            children: Vec::new(),
            parent: None,
            value: String::new(),
            checked: false,
            layout: BoundingBox::new(0.0, id as f32 * ROW_HEIGHT, 200.0, ROW_HEIGHT),
            covered: false,
            animating: 0,
        }
    }

    /// Lowercase tag name
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Attribute value
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// All attributes
    #[must_use]
    pub const fn attrs(&self) -> &BTreeMap<String, String> {
        &self.attrs
    }

    /// Whether the `class` attribute contains `class`
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|w| w == class))
    }

    /// Checked state of checkboxes and radios
    #[must_use]
    pub const fn is_checked(&self) -> bool {
        self.checked
    }

    /// Current form value
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The node's own text (excluding children)
    #[must_use]
    pub fn own_text(&self) -> &str {
        &self.text
    }

    pub(crate) fn is_document(&self) -> bool {
        self.tag == DOCUMENT_TAG
    }

    fn is_form_control(&self) -> bool {
        matches!(
            self.tag.as_str(),
            "input" | "textarea" | "select" | "button" | "option" | "fieldset"
        )
    }

    fn style_hides(&self) -> bool {
        self.attr("style").is_some_and(|style| {
            let compact: String = style.chars().filter(|c| !c.is_whitespace()).collect();
            compact.contains("display:none") || compact.contains("visibility:hidden")
        })
    }
}

/// Element builder used to construct documents
#[derive(Debug, Clone)]
pub struct El {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    value: Option<String>,
    checked: bool,
    children: Vec<El>,
}

impl El {
    /// Start a new element
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            text: String::new(),
            value: None,
            checked: false,
            children: Vec::new(),
        }
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into().to_lowercase(), value.into()));
        self
    }

    /// Set a boolean attribute such as `disabled` or `required`
    #[must_use]
    pub fn flag(self, name: impl Into<String>) -> Self {
        self.attr(name, "")
    }

    /// Set the element's own text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set the initial form value
    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Set the initial checked state
    #[must_use]
    pub const fn checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    /// Append a child
    #[must_use]
    pub fn child(mut self, child: El) -> Self {
        self.children.push(child);
        self
    }

    /// Append several children
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = El>) -> Self {
        self.children.extend(children);
        self
    }
}

/// Arena-backed document tree
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Option<Node>>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(Node::new(DOCUMENT_TAG, 0))],
            root: 0,
        }
    }

    /// Create a document whose body holds `elements`
    #[must_use]
    pub fn from_body(elements: Vec<El>) -> Self {
        let mut doc = Self::new();
        for el in elements {
            doc.append(doc.root, el);
        }
        doc
    }

    /// The synthetic document node
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Look up a live node
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id).and_then(Option::as_mut)
    }

    /// Whether `id` still refers to a node attached to the document
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(node) = self.get(current) else {
                return false;
            };
            if current == self.root {
                return true;
            }
            cursor = node.parent;
        }
        false
    }

    /// Build `el` and append it under `parent`, returning the new node id
    pub fn append(&mut self, parent: NodeId, el: El) -> NodeId {
        let id = self.nodes.len();
        let mut node = Node::new(&el.tag, id);
        for (name, value) in el.attrs {
            let _ = node.attrs.insert(name, value);
        }
        node.text = el.text;
        node.checked = el.checked;
        node.value = el
            .value
            .or_else(|| node.attrs.get("value").cloned())
            .unwrap_or_default();
        node.parent = Some(parent);
        self.nodes.push(Some(node));
        if let Some(p) = self.get_mut(parent) {
            p.children.push(id);
        }
        for child in el.children {
            let _ = self.append(id, child);
        }
        id
    }

    /// Remove a node and its subtree
    pub fn remove(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        if let Some(parent) = self.get(id).and_then(|n| n.parent) {
            if let Some(p) = self.get_mut(parent) {
                p.children.retain(|c| *c != id);
            }
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(current).and_then(Option::take) {
                stack.extend(node.children);
            }
        }
    }

    /// Remove every child of `id`
    pub fn clear_children(&mut self, id: NodeId) {
        for child in self.children(id).to_vec() {
            self.remove(child);
        }
    }

    /// Replace the whole document body
    pub fn replace_body(&mut self, elements: Vec<El>) {
        self.clear_children(self.root);
        for el in elements {
            let _ = self.append(self.root, el);
        }
    }

    /// Child element ids
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map_or(&[], |n| n.children.as_slice())
    }

    /// Parent, unless it is the document node
    #[must_use]
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)
            .and_then(|n| n.parent)
            .filter(|p| *p != self.root)
    }

    /// Index among the parent's children
    #[must_use]
    pub fn sibling_index(&self, id: NodeId) -> Option<usize> {
        let parent = self.get(id)?.parent?;
        self.children(parent).iter().position(|c| *c == id)
    }

    /// Previous sibling element
    #[must_use]
    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.get(id)?.parent?;
        let idx = self.sibling_index(id)?;
        idx.checked_sub(1).map(|i| self.children(parent)[i])
    }

    /// Next sibling element
    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.get(id)?.parent?;
        let idx = self.sibling_index(id)?;
        self.children(parent).get(idx + 1).copied()
    }

    /// All descendants of `id` in document order, excluding `id`
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Ancestors from the parent up to (excluding) the document node
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.parent_element(id);
        while let Some(current) = cursor {
            out.push(current);
            cursor = self.parent_element(current);
        }
        out
    }

    /// Closest inclusive ancestor with the given tag
    #[must_use]
    pub fn closest(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|n| self.get(*n).is_some_and(|node| node.tag == tag))
    }

    /// Concatenated own text of the node and its descendants
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        if let Some(node) = self.get(id) {
            out.push_str(&node.text);
            for child in &node.children {
                self.collect_text(*child, out);
            }
        }
    }

    /// First node (document order) with the given `id` attribute
    #[must_use]
    pub fn element_by_id(&self, html_id: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|n| self.get(*n).and_then(|node| node.attr("id")) == Some(html_id))
    }

    /// Nodes matching a CSS selector, in document order
    pub fn query_css(&self, css: &str) -> crate::result::ProbeResult<Vec<NodeId>> {
        let list = crate::css::parse(css)?;
        Ok(self
            .descendants(self.root)
            .into_iter()
            .filter(|n| list.matches(self, *n))
            .collect())
    }

    /// Whether the node or an ancestor hides it
    #[must_use]
    pub fn is_visible(&self, id: NodeId) -> bool {
        if !self.is_attached(id) {
            return false;
        }
        let hidden = std::iter::once(id)
            .chain(self.ancestors(id))
            .filter_map(|n| self.get(n))
            .any(|n| n.attrs.contains_key("hidden") || n.style_hides() || n.tag == "template");
        if hidden {
            return false;
        }
        self.get(id)
            .is_some_and(|n| n.layout.width > 0.0 && n.layout.height > 0.0)
    }

    /// `disabled` on the node, `aria-disabled="true"`, or a disabled fieldset ancestor
    #[must_use]
    pub fn is_disabled(&self, id: NodeId) -> bool {
        let Some(node) = self.get(id) else {
            return true;
        };
        if node.attr("aria-disabled") == Some("true") {
            return true;
        }
        if !node.is_form_control() {
            return false;
        }
        if node.attrs.contains_key("disabled") {
            return true;
        }
        self.ancestors(id).into_iter().any(|a| {
            self.get(a)
                .is_some_and(|n| n.tag == "fieldset" && n.attrs.contains_key("disabled"))
        })
    }

    /// Whether text entry is possible
    #[must_use]
    pub fn is_editable(&self, id: NodeId) -> bool {
        let Some(node) = self.get(id) else {
            return false;
        };
        if self.is_disabled(id) || node.attrs.contains_key("readonly") {
            return false;
        }
        match node.tag.as_str() {
            "textarea" => true,
            "input" => !matches!(
                node.attr("type").unwrap_or("text"),
                "checkbox" | "radio" | "button" | "submit" | "reset" | "hidden" | "image" | "file"
            ),
            _ => self.content_editable(id),
        }
    }

    fn content_editable(&self, id: NodeId) -> bool {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .filter_map(|n| self.get(n))
            .find_map(|n| n.attr("contenteditable"))
            .is_some_and(|v| v.is_empty() || v == "true")
    }

    /// Whether pointer events reach the node
    #[must_use]
    pub fn receives_events(&self, id: NodeId) -> bool {
        !std::iter::once(id)
            .chain(self.ancestors(id))
            .filter_map(|n| self.get(n))
            .any(|n| {
                n.covered
                    || n.attr("style").is_some_and(|s| {
                        s.chars()
                            .filter(|c| !c.is_whitespace())
                            .collect::<String>()
                            .contains("pointer-events:none")
                    })
            })
    }

    /// Layout box, shifted while an animation is in flight
    #[must_use]
    pub fn bounds(&self, id: NodeId) -> Option<BoundingBox> {
        let node = self.get(id)?;
        let shift = node.animating as f32 * 7.0;
        Some(BoundingBox::new(
            node.layout.x + shift,
            node.layout.y,
            node.layout.width,
            node.layout.height,
        ))
    }

    /// Editable value: form value for controls, text for contenteditable hosts
    #[must_use]
    pub fn input_value(&self, id: NodeId) -> Option<String> {
        let node = self.get(id)?;
        match node.tag.as_str() {
            "input" | "textarea" | "select" => Some(node.value.clone()),
            _ if self.content_editable(id) => Some(self.text_content(id)),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Mutation helpers for application handlers
    // -------------------------------------------------------------------------

    /// Set or replace an attribute
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let Some(node) = self.get_mut(id) {
            let _ = node.attrs.insert(name.to_lowercase(), value.into());
        }
    }

    /// Remove an attribute
    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(node) = self.get_mut(id) {
            let _ = node.attrs.remove(name);
        }
    }

    /// Replace the node's own text
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        if let Some(node) = self.get_mut(id) {
            node.text = text.into();
        }
    }

    /// Replace the form value
    pub fn set_value(&mut self, id: NodeId, value: impl Into<String>) {
        if let Some(node) = self.get_mut(id) {
            node.value = value.into();
        }
    }

    /// Set the checked state
    pub fn set_checked(&mut self, id: NodeId, checked: bool) {
        if let Some(node) = self.get_mut(id) {
            node.checked = checked;
        }
    }

    /// Mark the node as covered by an overlay
    pub fn set_covered(&mut self, id: NodeId, covered: bool) {
        if let Some(node) = self.get_mut(id) {
            node.covered = covered;
        }
    }

    /// Override the layout box
    pub fn set_layout(&mut self, id: NodeId, layout: BoundingBox) {
        if let Some(node) = self.get_mut(id) {
            node.layout = layout;
        }
    }

    /// Keep the node moving for `frames` animation frames
    pub fn animate(&mut self, id: NodeId, frames: u32) {
        if let Some(node) = self.get_mut(id) {
            node.animating = frames;
        }
    }

    /// Advance every running animation by one frame
    pub fn tick_animations(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            node.animating = node.animating.saturating_sub(1);
        }
    }

    /// Serialize to HTML for diagnostics
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in self.children(self.root) {
            self.write_html(*child, 0, &mut out);
        }
        out
    }

    fn write_html(&self, id: NodeId, depth: usize, out: &mut String) {
        let Some(node) = self.get(id) else {
            return;
        };
        let indent = "  ".repeat(depth);
        let _ = write!(out, "{indent}<{}", node.tag);
        for (name, value) in &node.attrs {
            if value.is_empty() {
                let _ = write!(out, " {name}");
            } else {
                let _ = write!(out, " {name}=\"{}\"", value.replace('"', "&quot;"));
            }
        }
        out.push('>');
        out.push_str(&node.text);
        if node.children.is_empty() {
            let _ = writeln!(out, "</{}>", node.tag);
            return;
        }
        out.push('\n');
        for child in &node.children {
            self.write_html(*child, depth + 1, out);
        }
        let _ = writeln!(out, "{indent}</{}>", node.tag);
    }
}

/// Collapse runs of whitespace and trim, as text matching does
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::from_body(vec![El::new("div").attr("id", "card").children(vec![
            El::new("h2").text("Getting Started"),
            El::new("p").text("5 ").child(El::new("span").text("likes")),
            El::new("button").flag("disabled").text("Like"),
            El::new("div").attr("style", "display: none").child(El::new("p").text("secret")),
        ])])
    }

    #[test]
    fn test_text_content_concatenates_descendants() {
        let doc = sample();
        let p = doc.query_css("p").unwrap()[0];
        assert_eq!(doc.text_content(p), "5 likes");
        assert_eq!(normalize_whitespace("  a \n  b "), "a b");
    }

    #[test]
    fn test_visibility_inherits_hidden_ancestor() {
        let doc = sample();
        let secret = doc.query_css("div > p").unwrap();
        let hidden = secret
            .iter()
            .copied()
            .find(|n| doc.text_content(*n) == "secret")
            .unwrap();
        assert!(!doc.is_visible(hidden));
        let h2 = doc.query_css("h2").unwrap()[0];
        assert!(doc.is_visible(h2));
    }

    #[test]
    fn test_disabled_and_editable() {
        let mut doc = sample();
        let button = doc.query_css("button").unwrap()[0];
        assert!(doc.is_disabled(button));
        doc.remove_attr(button, "disabled");
        assert!(!doc.is_disabled(button));
        assert!(!doc.is_editable(button));
        let input = doc.append(doc.root(), El::new("input").attr("type", "text"));
        assert!(doc.is_editable(input));
        doc.set_attr(input, "readonly", "");
        assert!(!doc.is_editable(input));
    }

    #[test]
    fn test_removed_subtree_is_detached() {
        let mut doc = sample();
        let card = doc.element_by_id("card").unwrap();
        let h2 = doc.query_css("h2").unwrap()[0];
        assert!(doc.is_attached(h2));
        doc.remove(card);
        assert!(!doc.is_attached(h2));
        assert!(doc.get(h2).is_none());
        assert!(doc.query_css("h2").unwrap().is_empty());
    }

    #[test]
    fn test_animation_shifts_bounds_until_ticked() {
        let mut doc = sample();
        let h2 = doc.query_css("h2").unwrap()[0];
        let rest = doc.bounds(h2).unwrap();
        doc.animate(h2, 2);
        assert_ne!(doc.bounds(h2).unwrap(), rest);
        doc.tick_animations();
        doc.tick_animations();
        assert_eq!(doc.bounds(h2).unwrap(), rest);
    }

    #[test]
    fn test_to_html_round_trips_structure() {
        let html = sample().to_html();
        assert!(html.contains("<div id=\"card\">"));
        assert!(html.contains("<button disabled>Like</button>"));
    }
}
