//! `VirtualPage`: a [`Driver`] backed by the in-memory [`Document`].
//!
//! An application is modelled as routes (render a document for a path),
//! event handlers (mutate state when an event reaches a matching element)
//! and timers. Handlers typically schedule their visible effect a few
//! milliseconds later, which reproduces the asynchronous rendering that the
//! retry protocol exists to tolerate. Due timers fire lazily at the start
//! of every driver call, measured on the tokio clock so paused-time tests
//! stay deterministic.

use super::{query, Document, El, NodeId};
use crate::css::{self, SelectorList};
use crate::driver::{Capture, CaptureFormat, Driver, ElementSnapshot, Input, NetworkRecord};
use crate::result::{ProbeError, ProbeResult};
use crate::selector::Selector;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

const FRAME: Duration = Duration::from_millis(16);

type RenderFn = Arc<dyn Fn(&mut PageState) + Send + Sync>;
type HandlerFn = Arc<dyn Fn(&mut PageState, &EventContext) + Send + Sync>;
type TimerFn = Box<dyn FnOnce(&mut PageState) + Send>;

/// The event currently being delivered to a handler
#[derive(Debug, Clone)]
pub struct EventContext {
    /// Event type (`click`, `input`, `submit`, ...)
    pub event: String,
    /// Node the event was dispatched on
    pub target: NodeId,
    /// Node whose handler is running (the target or an ancestor)
    pub current: NodeId,
    /// Key name for keyboard events
    pub key: Option<String>,
}

/// One entry of the dispatched-event log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedEvent {
    /// Event type
    pub event: String,
    /// Target tag name
    pub tag: String,
    /// Target `id` attribute, if any
    pub id: Option<String>,
}

#[derive(Clone)]
struct Route {
    prefix: String,
    render: RenderFn,
}

#[derive(Clone)]
struct Handler {
    event: String,
    selector: SelectorList,
    callback: HandlerFn,
}

struct Timer {
    due: Instant,
    seq: u64,
    run: TimerFn,
}

/// Mutable state of a virtual page, handed to routes, handlers and timers
pub struct PageState {
    origin: String,
    url: String,
    doc: Document,
    routes: Vec<Route>,
    handlers: Vec<Handler>,
    timers: Vec<Timer>,
    storage: BTreeMap<String, String>,
    responses: Vec<NetworkRecord>,
    events: Vec<DispatchedEvent>,
    focused: Option<NodeId>,
    next_seq: u64,
}

impl fmt::Debug for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageState")
            .field("url", &self.url)
            .field("routes", &self.routes.len())
            .field("handlers", &self.handlers.len())
            .field("pending_timers", &self.timers.len())
            .field("responses", &self.responses.len())
            .finish_non_exhaustive()
    }
}

impl PageState {
    fn new(origin: &str) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            url: "about:blank".to_string(),
            doc: Document::new(),
            routes: Vec::new(),
            handlers: Vec::new(),
            timers: Vec::new(),
            storage: BTreeMap::new(),
            responses: Vec::new(),
            events: Vec::new(),
            focused: None,
            next_seq: 0,
        }
    }

    /// The live document
    #[must_use]
    pub const fn doc(&self) -> &Document {
        &self.doc
    }

    /// The live document, mutably
    pub fn doc_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Full current URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Path component of the current URL, without the query string
    #[must_use]
    pub fn path(&self) -> &str {
        let rest = self.url.strip_prefix(&self.origin).unwrap_or(&self.url);
        rest.split(['?', '#']).next().unwrap_or("/")
    }

    /// Query-string parameter of the current URL
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.url.split_once('?')?.1;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    }

    /// Replace the body with freshly rendered elements
    pub fn render(&mut self, elements: Vec<El>) {
        self.doc.replace_body(elements);
        self.focused = None;
    }

    /// Client-side navigation: update the URL and render the matching route.
    /// Pending timers from the previous view are dropped.
    pub fn navigate(&mut self, target: &str) {
        self.url = if target.starts_with('/') {
            format!("{}{target}", self.origin)
        } else {
            target.to_string()
        };
        self.timers.clear();
        self.render_current();
    }

    /// Change the URL without re-rendering (history.replaceState)
    pub fn replace_url(&mut self, target: &str) {
        self.url = format!("{}{target}", self.origin);
    }

    fn render_current(&mut self) {
        let path = self.path().to_string();
        let route = self
            .routes
            .iter()
            .filter(|r| path.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len())
            .map(|r| Arc::clone(&r.render));
        self.doc = Document::new();
        self.focused = None;
        match route {
            Some(render) => render(self),
            None => self.render(vec![El::new("h1").text("Not Found")]),
        }
    }

    /// Run `f` after `delay` on the page clock
    pub fn schedule(&mut self, delay: Duration, f: impl FnOnce(&mut Self) + Send + 'static) {
        let seq = self.bump_seq();
        self.timers.push(Timer {
            due: Instant::now() + delay,
            seq,
            run: Box::new(f),
        });
    }

    /// Simulate a network round trip: after `latency` record the response,
    /// then run `on_done`
    pub fn fetch(
        &mut self,
        method: &str,
        url: &str,
        status: u16,
        body: Option<serde_json::Value>,
        latency: Duration,
        on_done: impl FnOnce(&mut Self) + Send + 'static,
    ) {
        let method = method.to_uppercase();
        let url = url.to_string();
        self.schedule(latency, move |state| {
            let seq = state.bump_seq();
            state.responses.push(NetworkRecord {
                seq,
                method,
                url,
                status,
                body,
            });
            on_done(state);
        });
    }

    /// Read local storage
    #[must_use]
    pub fn storage(&self, key: &str) -> Option<&str> {
        self.storage.get(key).map(String::as_str)
    }

    /// Write local storage
    pub fn set_storage(&mut self, key: &str, value: impl Into<String>) {
        let _ = self.storage.insert(key.to_string(), value.into());
    }

    /// Currently focused node
    #[must_use]
    pub const fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn flush_timers(&mut self) {
        let now = Instant::now();
        loop {
            let next = self
                .timers
                .iter()
                .enumerate()
                .filter(|(_, t)| t.due <= now)
                .min_by_key(|(_, t)| (t.due, t.seq))
                .map(|(i, _)| i);
            let Some(i) = next else { break };
            let timer = self.timers.swap_remove(i);
            (timer.run)(self);
        }
    }

    // -------------------------------------------------------------------------
    // Event delivery
    // -------------------------------------------------------------------------

    /// Dispatch an event at `target` and bubble it to the document
    pub fn emit(&mut self, event: &str, target: NodeId, key: Option<&str>) {
        if let Some(node) = self.doc.get(target) {
            self.events.push(DispatchedEvent {
                event: event.to_string(),
                tag: node.tag().to_string(),
                id: node.attr("id").map(str::to_string),
            });
        }
        let path: Vec<NodeId> = std::iter::once(target)
            .chain(self.doc.ancestors(target))
            .collect();
        let handlers: Vec<Handler> = self
            .handlers
            .iter()
            .filter(|h| h.event == event)
            .cloned()
            .collect();
        for current in path {
            for handler in &handlers {
                if !self.doc.is_attached(current) || !handler.selector.matches(&self.doc, current) {
                    continue;
                }
                let ctx = EventContext {
                    event: event.to_string(),
                    target,
                    current,
                    key: key.map(str::to_string),
                };
                (handler.callback)(self, &ctx);
            }
        }
    }

    fn focus(&mut self, target: NodeId) {
        if self.focused != Some(target) {
            self.focused = Some(target);
            self.emit("focus", target, None);
        }
    }

    fn click(&mut self, target: NodeId) {
        for event in ["pointerdown", "mousedown"] {
            self.emit(event, target, None);
        }
        self.focus(target);
        for event in ["pointerup", "mouseup"] {
            self.emit(event, target, None);
        }
        let toggles = self.doc.get(target).is_some_and(|n| {
            n.tag() == "input" && matches!(n.attr("type"), Some("checkbox" | "radio"))
        });
        if toggles {
            let checked = self.doc.get(target).is_some_and(super::Node::is_checked);
            self.doc.set_checked(target, !checked);
        }
        self.emit("click", target, None);
        if toggles {
            self.emit("input", target, None);
            self.emit("change", target, None);
        }
        if self.is_submit_control(target) {
            if let Some(form) = self.doc.closest(target, "form") {
                self.emit("submit", form, None);
                return;
            }
        }
        if let Some(href) = self
            .doc
            .closest(target, "a")
            .and_then(|a| self.doc.get(a))
            .and_then(|a| a.attr("href"))
            .map(str::to_string)
        {
            self.navigate(&href);
        }
    }

    fn is_submit_control(&self, target: NodeId) -> bool {
        self.doc.get(target).is_some_and(|n| match n.tag() {
            "button" => matches!(n.attr("type"), None | Some("submit")),
            "input" => matches!(n.attr("type"), Some("submit" | "image")),
            _ => false,
        })
    }

    fn write_value(&mut self, target: NodeId, value: String) {
        let is_control = self
            .doc
            .get(target)
            .is_some_and(|n| matches!(n.tag(), "input" | "textarea" | "select"));
        if is_control {
            self.doc.set_value(target, value);
        } else {
            self.doc.clear_children(target);
            self.doc.set_text(target, value);
        }
    }

    fn fill(&mut self, target: NodeId, value: &str) {
        self.focus(target);
        self.write_value(target, value.to_string());
        self.emit("input", target, None);
        self.emit("change", target, None);
    }

    fn type_text(&mut self, target: NodeId, text: &str) {
        self.focus(target);
        for ch in text.chars() {
            let key = ch.to_string();
            self.emit("keydown", target, Some(&key));
            self.emit("keypress", target, Some(&key));
            let mut value = self.doc.input_value(target).unwrap_or_default();
            value.push(ch);
            self.write_value(target, value);
            self.emit("input", target, Some(&key));
            self.emit("keyup", target, Some(&key));
        }
    }

    fn press(&mut self, target: NodeId, key: &str) {
        self.focus(target);
        self.emit("keydown", target, Some(key));
        let submits = key == "Enter"
            && self
                .doc
                .get(target)
                .is_some_and(|n| n.tag() == "input");
        if submits {
            if let Some(form) = self.doc.closest(target, "form") {
                self.emit("submit", form, None);
            }
        }
        if self.doc.is_attached(target) {
            self.emit("keyup", target, Some(key));
        }
    }

    fn hover(&mut self, target: NodeId) {
        for event in ["pointerover", "mouseover", "mousemove"] {
            self.emit(event, target, None);
        }
    }

    fn select(&mut self, target: NodeId, wanted: &str, selector: &Selector) -> ProbeResult<()> {
        let option = self.doc.descendants(target).into_iter().find(|o| {
            self.doc.get(*o).is_some_and(|n| {
                n.tag() == "option"
                    && (n.attr("value") == Some(wanted)
                        || super::normalize_whitespace(&self.doc.text_content(*o)) == wanted)
            })
        });
        let Some(option) = option else {
            return Err(ProbeError::ActionRejected {
                selector: selector.describe(),
                action: "select".to_string(),
                reason: format!("no option with value or label {wanted:?}"),
            });
        };
        let value = self
            .doc
            .get(option)
            .and_then(|n| n.attr("value").map(str::to_string))
            .unwrap_or_else(|| super::normalize_whitespace(&self.doc.text_content(option)));
        for o in self.doc.descendants(target) {
            self.doc.remove_attr(o, "selected");
        }
        self.doc.set_attr(option, "selected", "");
        self.doc.set_value(target, value);
        self.emit("input", target, None);
        self.emit("change", target, None);
        Ok(())
    }

    fn snapshot(&self, index: usize, id: NodeId) -> Option<ElementSnapshot> {
        let node = self.doc.get(id)?;
        Some(ElementSnapshot {
            index,
            tag: node.tag().to_string(),
            text: super::normalize_whitespace(&self.doc.text_content(id)),
            value: self.doc.input_value(id),
            attributes: node.attrs().clone(),
            visible: self.doc.is_visible(id),
            enabled: !self.doc.is_disabled(id),
            editable: self.doc.is_editable(id),
            checked: node.is_checked(),
            bounds: self.doc.bounds(id).filter(|_| self.doc.is_visible(id)),
            receives_events: self.doc.receives_events(id),
        })
    }
}

/// In-memory page implementing [`Driver`]
#[derive(Clone)]
pub struct VirtualPage {
    state: Arc<Mutex<PageState>>,
}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_lock() {
            Ok(state) => f.debug_tuple("VirtualPage").field(&*state).finish(),
            Err(_) => f.write_str("VirtualPage(<locked>)"),
        }
    }
}

impl VirtualPage {
    /// Create a page for an application served at `origin`
    #[must_use]
    pub fn new(origin: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(PageState::new(origin))),
        }
    }

    fn lock(&self) -> ProbeResult<MutexGuard<'_, PageState>> {
        self.state
            .lock()
            .map_err(|_| ProbeError::driver("virtual page state poisoned by a panicking handler"))
    }

    /// Run `f` against the page state after firing due timers
    pub fn update<R>(&self, f: impl FnOnce(&mut PageState) -> R) -> ProbeResult<R> {
        let mut state = self.lock()?;
        state.flush_timers();
        Ok(f(&mut state))
    }

    /// Register a route; the longest matching path prefix wins
    pub fn route(
        &self,
        prefix: &str,
        render: impl Fn(&mut PageState) + Send + Sync + 'static,
    ) -> ProbeResult<()> {
        self.lock()?.routes.push(Route {
            prefix: prefix.to_string(),
            render: Arc::new(render),
        });
        Ok(())
    }

    /// Register an event handler for elements matching `css`
    pub fn on(
        &self,
        event: &str,
        css: &str,
        handler: impl Fn(&mut PageState, &EventContext) + Send + Sync + 'static,
    ) -> ProbeResult<()> {
        let selector = css::parse(css)?;
        self.lock()?.handlers.push(Handler {
            event: event.to_string(),
            selector,
            callback: Arc::new(handler),
        });
        Ok(())
    }

    /// Dispatched-event log, oldest first
    pub fn events(&self) -> ProbeResult<Vec<DispatchedEvent>> {
        Ok(self.lock()?.events.clone())
    }

    /// Forget logged events
    pub fn clear_events(&self) -> ProbeResult<()> {
        self.lock()?.events.clear();
        Ok(())
    }
}

#[async_trait]
impl Driver for VirtualPage {
    async fn goto(&self, url: &str) -> ProbeResult<()> {
        tracing::debug!(url, "virtual navigation");
        self.update(|state| state.navigate(url))
    }

    async fn reload(&self) -> ProbeResult<()> {
        self.update(|state| {
            let url = state.url.clone();
            state.navigate(&url);
        })
    }

    async fn current_url(&self) -> ProbeResult<String> {
        self.update(|state| state.url.clone())
    }

    async fn query(&self, selector: &Selector) -> ProbeResult<Vec<ElementSnapshot>> {
        let mut state = self.lock()?;
        state.flush_timers();
        let nodes = query::resolve(&state.doc, selector)?;
        Ok(nodes
            .into_iter()
            .enumerate()
            .filter_map(|(i, n)| state.snapshot(i, n))
            .collect())
    }

    async fn dispatch(&self, selector: &Selector, index: usize, input: &Input) -> ProbeResult<()> {
        let mut state = self.lock()?;
        state.flush_timers();
        let target = query::resolve(&state.doc, selector)?
            .get(index)
            .copied()
            .ok_or_else(|| ProbeError::Detached {
                selector: selector.describe(),
            })?;
        tracing::trace!(selector = %selector, input = input.name(), "virtual dispatch");
        match input {
            Input::Click => state.click(target),
            Input::Hover => state.hover(target),
            Input::Fill(value) => state.fill(target, value),
            Input::Type(text) => state.type_text(target, text),
            Input::Press(key) => state.press(target, key),
            Input::Select(value) => state.select(target, value, selector)?,
        }
        Ok(())
    }

    async fn local_storage(&self, key: &str) -> ProbeResult<Option<String>> {
        self.update(|state| state.storage(key).map(str::to_string))
    }

    async fn responses(&self) -> ProbeResult<Vec<NetworkRecord>> {
        self.update(|state| state.responses.clone())
    }

    async fn capture(&self) -> ProbeResult<Capture> {
        self.update(|state| {
            Capture::new(
                CaptureFormat::Html,
                state.doc.to_html().into_bytes(),
                state.url.clone(),
            )
        })
    }

    async fn animation_frame(&self) -> ProbeResult<()> {
        tokio::time::sleep(FRAME).await;
        self.update(|state| state.doc.tick_animations())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::selector::TextMatch;

    fn counter_app() -> VirtualPage {
        let page = VirtualPage::new("http://app.test");
        page.route("/", |state| {
            state.render(vec![El::new("main").children(vec![
                El::new("p").attr("id", "count").text("0"),
                El::new("button").attr("id", "inc").text("Add"),
                El::new("input").attr("id", "agree").attr("type", "checkbox"),
                El::new("form").attr("id", "f").children(vec![
                    El::new("input").attr("id", "q").attr("type", "text"),
                    El::new("select").attr("id", "cat").children(vec![
                        El::new("option").attr("value", "tech").text("Technology"),
                        El::new("option").attr("value", "life").text("Lifestyle"),
                    ]),
                ]),
                El::new("a").attr("href", "/about").text("About"),
            ])]);
        })
        .unwrap();
        page.route("/about", |state| {
            state.render(vec![El::new("h1").text("About")]);
        })
        .unwrap();
        page.on("click", "#inc", |state, _| {
            state.schedule(Duration::from_millis(100), |state| {
                let count = state.doc().query_css("#count").unwrap()[0];
                let next = state.doc().text_content(count).parse::<u32>().unwrap() + 1;
                state.doc_mut().set_text(count, next.to_string());
            });
        })
        .unwrap();
        page
    }

    fn css(s: &str) -> Selector {
        Selector::css(s).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_effects_land_after_latency() {
        let page = counter_app();
        page.goto("http://app.test/").await.unwrap();
        page.dispatch(&css("#inc"), 0, &Input::Click).await.unwrap();
        assert_eq!(page.query(&css("#count")).await.unwrap()[0].text, "0");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(page.query(&css("#count")).await.unwrap()[0].text, "1");
    }

    #[tokio::test]
    async fn test_click_event_sequence() {
        let page = counter_app();
        page.goto("http://app.test/").await.unwrap();
        page.clear_events().unwrap();
        page.dispatch(&css("#agree"), 0, &Input::Click).await.unwrap();
        let events: Vec<String> = page
            .events()
            .unwrap()
            .into_iter()
            .map(|e| e.event)
            .collect();
        assert_eq!(
            events,
            vec![
                "pointerdown",
                "mousedown",
                "focus",
                "pointerup",
                "mouseup",
                "click",
                "input",
                "change"
            ]
        );
        assert!(page.query(&css("#agree")).await.unwrap()[0].checked);
    }

    #[tokio::test]
    async fn test_type_emits_per_character_and_enter_submits() {
        let page = counter_app();
        page.goto("http://app.test/").await.unwrap();
        page.clear_events().unwrap();
        page.dispatch(&css("#q"), 0, &Input::Type("ab".into()))
            .await
            .unwrap();
        page.dispatch(&css("#q"), 0, &Input::Press("Enter".into()))
            .await
            .unwrap();
        let events = page.events().unwrap();
        assert_eq!(events.iter().filter(|e| e.event == "keypress").count(), 2);
        assert!(events.iter().any(|e| e.event == "submit" && e.tag == "form"));
        assert_eq!(
            page.query(&css("#q")).await.unwrap()[0].value.as_deref(),
            Some("ab")
        );
    }

    #[tokio::test]
    async fn test_select_by_label_sets_value() {
        let page = counter_app();
        page.goto("http://app.test/").await.unwrap();
        page.dispatch(&css("#cat"), 0, &Input::Select("Lifestyle".into()))
            .await
            .unwrap();
        let snap = &page.query(&css("#cat")).await.unwrap()[0];
        assert_eq!(snap.value.as_deref(), Some("life"));
        let err = page
            .dispatch(&css("#cat"), 0, &Input::Select("Sports".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::ActionRejected { .. }));
    }

    #[tokio::test]
    async fn test_anchor_click_navigates() {
        let page = counter_app();
        page.goto("http://app.test/").await.unwrap();
        let link = Selector::text(TextMatch::exact("About")).unwrap();
        page.dispatch(&link, 0, &Input::Click).await.unwrap();
        assert_eq!(page.current_url().await.unwrap(), "http://app.test/about");
        assert_eq!(page.query(&css("h1")).await.unwrap()[0].text, "About");
    }

    #[tokio::test]
    async fn test_dispatch_to_missing_index_is_detached() {
        let page = counter_app();
        page.goto("http://app.test/").await.unwrap();
        let err = page
            .dispatch(&css("#inc"), 1, &Input::Click)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unknown_route_renders_not_found() {
        let page = VirtualPage::new("http://app.test");
        page.goto("http://app.test/nowhere").await.unwrap();
        let capture = page.capture().await.unwrap();
        assert!(String::from_utf8(capture.data).unwrap().contains("Not Found"));
    }

    #[test]
    fn test_path_and_query_param() {
        let mut state = PageState::new("http://app.test/");
        state.replace_url("/blogs?page=2&q=rust");
        assert_eq!(state.path(), "/blogs");
        assert_eq!(state.query_param("page").as_deref(), Some("2"));
        assert_eq!(state.query_param("missing"), None);
    }
}
