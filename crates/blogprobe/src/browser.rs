//! Chromium control over CDP.
//!
//! [`ChromiumDriver`] implements [`Driver`] against a real browser. Selector
//! trees are serialized to JSON and evaluated by an in-page resolver that
//! mirrors the in-memory engine, so both drivers agree on what a selector
//! means. Pointer and keyboard input go through the CDP `Input` domain:
//! `fill` selects the current contents with Ctrl+A (Meta+A on macOS),
//! deletes them with Backspace and inserts the new text, and `type` sends a
//! keyDown/keyUp pair per character. Only `<select>` elements are set
//! through script, since they take no text input.

use crate::driver::{
    Capture, CaptureFormat, Driver, DriverConfig, ElementSnapshot, Input, NetworkRecord, Point,
};
use crate::result::{ProbeError, ProbeResult};
use crate::selector::Selector;
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Installed on every new document: selector resolver plus a network log
/// kept in `sessionStorage` so it survives reloads.
const RUNTIME_JS: &str = r#"
(() => {
  if (window.__blogprobe) return;
  const NET_KEY = '__blogprobe_net';
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
  const textOf = (el) => norm(el.textContent);
  const matchText = (m, actual) => {
    const a = norm(actual);
    if (m.mode === 'exact') return a === norm(m.text);
    if (m.mode === 'contains') {
      return m.ignore_case ? a.toLowerCase().includes(norm(m.text).toLowerCase())
                           : a.includes(norm(m.text));
    }
    return new RegExp(m.pattern).test(a);
  };
  const IMPLICIT = {
    button: 'button', textarea: 'textbox', option: 'option', h1: 'heading', h2: 'heading',
    h3: 'heading', h4: 'heading', h5: 'heading', h6: 'heading', ul: 'list', ol: 'list',
    li: 'listitem', nav: 'navigation', main: 'main', header: 'banner', footer: 'contentinfo',
    article: 'article', dialog: 'dialog', form: 'form', table: 'table', tr: 'row', td: 'cell',
    th: 'columnheader'
  };
  const INPUT_ROLES = {
    button: 'button', submit: 'button', reset: 'button', image: 'button', checkbox: 'checkbox',
    radio: 'radio', range: 'slider', number: 'spinbutton', search: 'searchbox', text: 'textbox',
    email: 'textbox', tel: 'textbox', url: 'textbox'
  };
  const roleOf = (el) => {
    const explicit = (el.getAttribute('role') || '').trim().split(/\s+/)[0];
    if (explicit) return explicit;
    const tag = el.tagName.toLowerCase();
    if ((tag === 'a' || tag === 'area') && el.hasAttribute('href')) return 'link';
    if (tag === 'input') return INPUT_ROLES[(el.getAttribute('type') || 'text').toLowerCase()] || null;
    if (tag === 'select') return el.multiple ? 'listbox' : 'combobox';
    if (tag === 'img') return el.getAttribute('alt') ? 'img' : 'presentation';
    return IMPLICIT[tag] || null;
  };
  const labelFor = (el) => {
    if (el.id) {
      const l = document.querySelector(`label[for="${CSS.escape(el.id)}"]`);
      if (l) return textOf(l);
    }
    const wrap = el.closest('label');
    return wrap ? textOf(wrap) : null;
  };
  const nameOf = (el) => {
    const aria = el.getAttribute('aria-label');
    if (aria && aria.trim()) return norm(aria);
    const by = el.getAttribute('aria-labelledby');
    if (by) {
      const parts = by.split(/\s+/).map((i) => document.getElementById(i)).filter(Boolean);
      if (parts.length) return norm(parts.map(textOf).join(' '));
    }
    const tag = el.tagName.toLowerCase();
    if (tag === 'input' || tag === 'textarea' || tag === 'select') {
      if (['submit', 'button', 'reset'].includes(el.type)) return el.value;
      return labelFor(el) ?? norm(el.getAttribute('title') || el.getAttribute('placeholder') || '');
    }
    if (tag === 'img') return norm(el.getAttribute('alt') || '');
    return textOf(el) || norm(el.getAttribute('title') || '');
  };
  const visible = (el) => {
    if (!el.isConnected) return false;
    const style = getComputedStyle(el);
    if (style.visibility === 'hidden' || style.display === 'none') return false;
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0;
  };
  const attrTest = (op, actual, expected) => {
    switch (op) {
      case 'exists': return true;
      case 'equals': return actual === expected;
      case 'contains': return expected !== '' && actual.includes(expected);
      case 'prefix': return expected !== '' && actual.startsWith(expected);
      case 'suffix': return expected !== '' && actual.endsWith(expected);
      case 'word': return actual.split(/\s+/).includes(expected);
      case 'dash_prefix': return actual === expected || actual.startsWith(expected + '-');
      default: return false;
    }
  };
  const order = (nodes) => {
    const set = new Set(nodes);
    return Array.from(document.querySelectorAll('*')).filter((n) => set.has(n));
  };
  const all = (scope) => Array.from(scope.querySelectorAll('*'));
  const resolve = (sel, scope) => {
    switch (sel.kind) {
      case 'css': return Array.from(scope.querySelectorAll(sel.css));
      case 'role': return all(scope).filter((el) => roleOf(el) === sel.role && visible(el)
        && (!sel.name || matchText(sel.name, nameOf(el))));
      case 'text': {
        const hits = all(scope).filter((el) => !['SCRIPT', 'STYLE', 'HEAD'].includes(el.tagName)
          && matchText(sel.text, el.textContent));
        return hits.filter((el) => !hits.some((o) => o !== el && el.contains(o)));
      }
      case 'attribute': return all(scope).filter((el) => el.hasAttribute(sel.name)
        && attrTest(sel.op, el.getAttribute(sel.name), sel.value));
      case 'label': {
        const hits = new Set();
        for (const l of document.querySelectorAll('label')) {
          if (!matchText(sel.text, l.textContent)) continue;
          const t = l.htmlFor ? document.getElementById(l.htmlFor)
                              : l.querySelector('input,textarea,select,button');
          if (t) hits.add(t);
        }
        for (const el of all(scope)) {
          const aria = el.getAttribute('aria-label');
          if (aria && matchText(sel.text, aria)) hits.add(el);
        }
        return order(Array.from(hits)).filter((el) => scope.contains(el));
      }
      case 'placeholder': return all(scope).filter((el) => el.hasAttribute('placeholder')
        && matchText(sel.text, el.getAttribute('placeholder')));
      case 'test_id': return all(scope).filter((el) => el.getAttribute('data-testid') === sel.id);
      case 'scoped': {
        const out = new Set();
        for (const p of resolve(sel.parent, scope)) for (const c of resolve(sel.child, p)) out.add(c);
        return order(Array.from(out));
      }
      case 'has_text': return resolve(sel.base, scope).filter((el) => matchText(sel.text, el.textContent));
      case 'nth': {
        const found = resolve(sel.base, scope);
        const i = sel.index < 0 ? found.length + sel.index : sel.index;
        return i >= 0 && i < found.length ? [found[i]] : [];
      }
      case 'or': return order([...resolve(sel.first, scope), ...resolve(sel.second, scope)]);
      default: throw new Error(`unknown selector kind ${sel.kind}`);
    }
  };
  const snapshot = (el, index) => {
    const r = el.getBoundingClientRect();
    const attributes = {};
    for (const a of el.attributes) attributes[a.name] = a.value;
    const tag = el.tagName.toLowerCase();
    const formish = tag === 'input' || tag === 'textarea' || tag === 'select';
    const cx = r.x + r.width / 2, cy = r.y + r.height / 2;
    const top = visible(el) ? document.elementFromPoint(cx, cy) : null;
    return {
      index, tag, attributes,
      text: textOf(el),
      value: formish ? el.value : null,
      visible: visible(el),
      enabled: !el.disabled && !el.closest('fieldset[disabled]') && el.getAttribute('aria-disabled') !== 'true',
      editable: (formish && !el.readOnly && !el.disabled) || el.isContentEditable,
      checked: !!el.checked,
      bounds: r.width > 0 || r.height > 0 ? { x: r.x, y: r.y, width: r.width, height: r.height } : null,
      receives_events: !!top && (top === el || el.contains(top)),
    };
  };
  const log = () => JSON.parse(sessionStorage.getItem(NET_KEY) || '[]');
  const record = (method, url, status, text) => {
    let body = null;
    try { body = text ? JSON.parse(text) : null; } catch (_) { body = null; }
    const entries = log();
    const seq = entries.length ? entries[entries.length - 1].seq + 1 : 1;
    entries.push({ seq, method: method.toUpperCase(), url: new URL(url, location.href).href, status, body });
    sessionStorage.setItem(NET_KEY, JSON.stringify(entries));
  };
  const origFetch = window.fetch.bind(window);
  window.fetch = async (input, init) => {
    const res = await origFetch(input, init);
    const method = (init && init.method) || (input && input.method) || 'GET';
    const url = typeof input === 'string' ? input : input.url;
    res.clone().text().then((t) => record(method, url, res.status, t)).catch(() => {});
    return res;
  };
  const open = XMLHttpRequest.prototype.open;
  XMLHttpRequest.prototype.open = function (method, url, ...rest) {
    this.addEventListener('loadend', () => record(method, url, this.status,
      this.responseType === '' || this.responseType === 'text' ? this.responseText : null));
    return open.call(this, method, url, ...rest);
  };
  window.__blogprobe = {
    query: (sel) => resolve(sel, document).map(snapshot),
    nth: (sel, i) => resolve(sel, document)[i] || null,
    responses: log,
  };
})();
"#;

fn cdp_err(e: impl std::fmt::Display) -> ProbeError {
    ProbeError::driver(e.to_string())
}

/// Key name to (`code`, virtual key code, text) for keys scenarios press
fn key_definition(key: &str) -> Option<(&'static str, i64, Option<&'static str>)> {
    Some(match key {
        "Enter" => ("Enter", 13, Some("\r")),
        "Tab" => ("Tab", 9, None),
        "Escape" => ("Escape", 27, None),
        "Backspace" => ("Backspace", 8, None),
        "Delete" => ("Delete", 46, None),
        "ArrowUp" => ("ArrowUp", 38, None),
        "ArrowDown" => ("ArrowDown", 40, None),
        "ArrowLeft" => ("ArrowLeft", 37, None),
        "ArrowRight" => ("ArrowRight", 39, None),
        " " | "Space" => ("Space", 32, Some(" ")),
        _ => return None,
    })
}

/// CDP modifier bits
const MODIFIER_CTRL: i64 = 2;
const MODIFIER_META: i64 = 4;

/// One keyDown/keyUp pair
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyStroke {
    key: String,
    code: String,
    virtual_key: i64,
    text: Option<String>,
    modifiers: i64,
}

impl KeyStroke {
    /// A named key such as `Enter` or `Backspace`
    fn named(key: &str) -> Option<Self> {
        key_definition(key).map(|(code, virtual_key, text)| Self {
            key: key.to_string(),
            code: code.to_string(),
            virtual_key,
            text: text.map(str::to_string),
            modifiers: 0,
        })
    }

    /// A printable character; `\n` is sent as Enter
    fn typed(ch: char) -> Self {
        if ch == '\n' {
            if let Some(enter) = Self::named("Enter") {
                return enter;
            }
        }
        let upper = ch.to_ascii_uppercase();
        let (code, virtual_key) = if ch.is_ascii_alphabetic() {
            (format!("Key{upper}"), i64::from(upper as u8))
        } else if ch.is_ascii_digit() {
            (format!("Digit{ch}"), i64::from(ch as u8))
        } else if ch == ' ' {
            ("Space".to_string(), 32)
        } else {
            (String::new(), 0)
        };
        Self {
            key: ch.to_string(),
            code,
            virtual_key,
            text: Some(ch.to_string()),
            modifiers: 0,
        }
    }

    /// Select-all chord for the platform the browser runs on
    fn select_all() -> Self {
        Self {
            key: "a".to_string(),
            code: "KeyA".to_string(),
            virtual_key: 65,
            text: None,
            modifiers: if cfg!(target_os = "macos") {
                MODIFIER_META
            } else {
                MODIFIER_CTRL
            },
        }
    }
}

/// Trusted input sent to the focused element
#[derive(Debug, Clone, PartialEq, Eq)]
enum TextInput {
    Key(KeyStroke),
    Insert(String),
}

/// Replace the focused control's contents the way a user would
fn fill_plan(value: &str) -> Vec<TextInput> {
    let mut plan = vec![TextInput::Key(KeyStroke::select_all())];
    plan.extend(KeyStroke::named("Backspace").map(TextInput::Key));
    if !value.is_empty() {
        plan.push(TextInput::Insert(value.to_string()));
    }
    plan
}

/// One key stroke per character
fn type_plan(text: &str) -> Vec<TextInput> {
    text.chars().map(|ch| TextInput::Key(KeyStroke::typed(ch))).collect()
}

/// Expression that runs `call` against the element the selector resolves to
fn element_script(selector: &Selector, index: usize, call: &str) -> ProbeResult<String> {
    let json = serde_json::to_string(selector)?;
    Ok(format!(
        "(() => {{ const el = window.__blogprobe.nth({json}, {index}); \
         if (!el) return null; {call} }})()"
    ))
}

/// JS body that focuses a fill target.
///
/// Returns true when the element takes typed input. A `<select>` is set
/// directly (firing `input` and `change`) and returns false.
fn fill_focus_call(value: &str) -> ProbeResult<String> {
    let value = serde_json::to_string(value)?;
    Ok(format!(
        "el.focus(); \
         if (el.tagName === 'SELECT') {{ \
           Object.getOwnPropertyDescriptor(HTMLSelectElement.prototype, 'value').set.call(el, {value}); \
           el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
           el.dispatchEvent(new Event('change', {{ bubbles: true }})); return false; }} \
         return true;"
    ))
}

/// JS body that picks an `<option>` by value or label
fn select_call(choice: &str) -> ProbeResult<String> {
    let choice = serde_json::to_string(choice)?;
    Ok(format!(
        "const opt = Array.from(el.options || []).find((o) => o.value === {choice} \
           || o.label.trim() === {choice}); \
         if (!opt) return false; el.value = opt.value; \
         el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
         el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true;"
    ))
}

/// Chromium-backed [`Driver`]
#[derive(Debug)]
pub struct ChromiumDriver {
    browser: Mutex<Browser>,
    page: CdpPage,
    config: DriverConfig,
    handler: tokio::task::JoinHandle<()>,
}

impl ChromiumDriver {
    /// Launch Chromium and open a blank page with the runtime installed
    pub async fn launch(config: DriverConfig) -> ProbeResult<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(config.viewport_width, config.viewport_height)
            .request_timeout(config.navigation_timeout)
            .no_sandbox();
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(ref path) = config.executable_path {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder.build().map_err(ProbeError::driver)?;

        let (browser, mut handler) = Browser::launch(cdp_config).await.map_err(cdp_err)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(cdp_err)?;
        let _ = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(RUNTIME_JS))
            .await
            .map_err(cdp_err)?;
        tracing::info!(
            headless = config.headless,
            width = config.viewport_width,
            height = config.viewport_height,
            "chromium launched"
        );
        Ok(Self {
            browser: Mutex::new(browser),
            page,
            config,
            handler,
        })
    }

    /// Launch settings
    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Evaluate and decode; results travel as a JSON string so `null`
    /// survives the CDP round trip
    async fn eval<T: DeserializeOwned>(&self, expression: String) -> ProbeResult<T> {
        let wrapped = format!("(async () => JSON.stringify((await ({expression})) ?? null))()");
        let json: String = self
            .page
            .evaluate(wrapped)
            .await
            .map_err(cdp_err)?
            .into_value()
            .map_err(cdp_err)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Run `call` on the `index`-th match; `Detached` if it is gone
    async fn on_element(&self, selector: &Selector, index: usize, call: &str) -> ProbeResult<bool> {
        let result: Option<bool> = self.eval(element_script(selector, index, call)?).await?;
        result.ok_or_else(|| ProbeError::Detached {
            selector: selector.describe(),
        })
    }

    async fn center(&self, selector: &Selector, index: usize) -> ProbeResult<Point> {
        let script = element_script(
            selector,
            index,
            "el.scrollIntoView({ block: 'center', inline: 'center' }); \
             const r = el.getBoundingClientRect(); \
             return [r.x + r.width / 2, r.y + r.height / 2];",
        )?;
        let xy: Option<(f32, f32)> = self.eval(script).await?;
        xy.map(|(x, y)| Point::new(x, y))
            .ok_or_else(|| ProbeError::Detached {
                selector: selector.describe(),
            })
    }

    async fn mouse(&self, kind: DispatchMouseEventType, at: Point) -> ProbeResult<()> {
        let params = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(f64::from(at.x))
            .y(f64::from(at.y))
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(ProbeError::driver)?;
        let _ = self.page.execute(params).await.map_err(cdp_err)?;
        Ok(())
    }

    async fn key(&self, key: &str) -> ProbeResult<()> {
        let stroke = KeyStroke::named(key)
            .ok_or_else(|| ProbeError::driver(format!("unsupported key {key:?}")))?;
        self.stroke(&stroke).await
    }

    async fn stroke(&self, stroke: &KeyStroke) -> ProbeResult<()> {
        let mut down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(stroke.key.clone())
            .code(stroke.code.clone())
            .windows_virtual_key_code(stroke.virtual_key)
            .modifiers(stroke.modifiers);
        if let Some(text) = &stroke.text {
            down = down.text(text.clone()).unmodified_text(text.clone());
        }
        let down = down.build().map_err(ProbeError::driver)?;
        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(stroke.key.clone())
            .code(stroke.code.clone())
            .windows_virtual_key_code(stroke.virtual_key)
            .modifiers(stroke.modifiers)
            .build()
            .map_err(ProbeError::driver)?;
        let _ = self.page.execute(down).await.map_err(cdp_err)?;
        let _ = self.page.execute(up).await.map_err(cdp_err)?;
        Ok(())
    }

    async fn send_text(&self, plan: &[TextInput]) -> ProbeResult<()> {
        for step in plan {
            match step {
                TextInput::Key(stroke) => self.stroke(stroke).await?,
                TextInput::Insert(text) => {
                    let _ = self
                        .page
                        .execute(InsertTextParams::new(text.clone()))
                        .await
                        .map_err(cdp_err)?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Driver for ChromiumDriver {
    async fn goto(&self, url: &str) -> ProbeResult<()> {
        let navigation = self.page.goto(url);
        match tokio::time::timeout(self.config.navigation_timeout, navigation).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(ProbeError::Navigation {
                url: url.to_string(),
                message: format!(
                    "no load within {}ms",
                    self.config.navigation_timeout.as_millis()
                ),
            }),
        }
    }

    async fn reload(&self) -> ProbeResult<()> {
        let _ = self.page.reload().await.map_err(cdp_err)?;
        Ok(())
    }

    async fn current_url(&self) -> ProbeResult<String> {
        Ok(self.page.url().await.map_err(cdp_err)?.unwrap_or_default())
    }

    async fn query(&self, selector: &Selector) -> ProbeResult<Vec<ElementSnapshot>> {
        let json = serde_json::to_string(selector)?;
        self.eval(format!("window.__blogprobe.query({json})")).await
    }

    async fn dispatch(&self, selector: &Selector, index: usize, input: &Input) -> ProbeResult<()> {
        tracing::debug!(selector = %selector.describe(), index, ?input, "cdp dispatch");
        match input {
            Input::Click => {
                let at = self.center(selector, index).await?;
                self.mouse(DispatchMouseEventType::MouseMoved, at).await?;
                self.mouse(DispatchMouseEventType::MousePressed, at).await?;
                self.mouse(DispatchMouseEventType::MouseReleased, at).await
            }
            Input::Hover => {
                let at = self.center(selector, index).await?;
                self.mouse(DispatchMouseEventType::MouseMoved, at).await
            }
            Input::Fill(value) => {
                if self
                    .on_element(selector, index, &fill_focus_call(value)?)
                    .await?
                {
                    self.send_text(&fill_plan(value)).await?;
                }
                Ok(())
            }
            Input::Type(text) => {
                let _ = self
                    .on_element(selector, index, "el.focus(); return true;")
                    .await?;
                self.send_text(&type_plan(text)).await
            }
            Input::Press(key) => {
                let _ = self
                    .on_element(selector, index, "el.focus(); return true;")
                    .await?;
                self.key(key).await
            }
            Input::Select(choice) => {
                if self
                    .on_element(selector, index, &select_call(choice)?)
                    .await?
                {
                    Ok(())
                } else {
                    Err(ProbeError::ActionRejected {
                        selector: selector.describe(),
                        action: "select".into(),
                        reason: format!("no option {choice:?}"),
                    })
                }
            }
        }
    }

    async fn local_storage(&self, key: &str) -> ProbeResult<Option<String>> {
        let key = serde_json::to_string(key)?;
        self.eval(format!("localStorage.getItem({key})")).await
    }

    async fn responses(&self) -> ProbeResult<Vec<NetworkRecord>> {
        self.eval("window.__blogprobe ? window.__blogprobe.responses() : []".to_string())
            .await
    }

    async fn capture(&self) -> ProbeResult<Capture> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let shot = self.page.execute(params).await.map_err(cdp_err)?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(&shot.data)
            .map_err(cdp_err)?;
        let url = self.current_url().await?;
        Ok(Capture::new(CaptureFormat::Png, data, url))
    }

    async fn animation_frame(&self) -> ProbeResult<()> {
        let _: bool = self
            .eval("new Promise((r) => requestAnimationFrame(() => r(true)))".to_string())
            .await?;
        Ok(())
    }

    async fn close(&self) -> ProbeResult<()> {
        let mut browser = self.browser.lock().await;
        let _ = browser.close().await.map_err(cdp_err)?;
        self.handler.abort();
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }
}

/// Launch Chromium and wrap it as a shared driver
pub async fn launch(config: DriverConfig) -> ProbeResult<Arc<dyn Driver>> {
    Ok(Arc::new(ChromiumDriver::launch(config).await?))
}
