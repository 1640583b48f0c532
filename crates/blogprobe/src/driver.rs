//! Driver seam between the protocol and a concrete page.
//!
//! Everything above this trait (locators, actions, the poller, scenarios) is
//! driver-agnostic. Two implementations ship with the crate:
//!
//! - [`VirtualPage`](crate::dom::VirtualPage): an in-memory DOM with
//!   simulated rendering latency, used by the test suite
//! - `ChromiumDriver` (feature `browser`): real Chromium over CDP
//!
//! Drivers take `&self` everywhere and use interior mutability, so one
//! driver can be shared as [`SharedDriver`] by a page, its locators and any
//! teardown closures a scenario registers.

use crate::result::ProbeResult;
use crate::selector::Selector;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Shared driver handle
pub type SharedDriver = Arc<dyn Driver>;

/// Point in page coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
}

impl Point {
    /// Create a point
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Bounding box for an element
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X position
    pub x: f32,
    /// Y position
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Get the center point
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Whether the box has a non-zero area
    #[must_use]
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Everything the protocol needs to know about one matched element, read in
/// a single pass so the fields are mutually consistent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Position among the selector's matches at snapshot time
    pub index: usize,
    /// Lowercase tag name
    pub tag: String,
    /// Whitespace-normalized text content
    pub text: String,
    /// Form value, when the element has one
    pub value: Option<String>,
    /// Attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Rendered and not hidden by style or an ancestor
    pub visible: bool,
    /// Not disabled
    pub enabled: bool,
    /// Accepts text entry
    pub editable: bool,
    /// Checkbox/radio state
    pub checked: bool,
    /// Layout box, if rendered
    pub bounds: Option<BoundingBox>,
    /// Pointer events reach the element (no overlay on top)
    pub receives_events: bool,
}

impl ElementSnapshot {
    /// Attribute value
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// A user input to dispatch against one element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Input {
    /// Pointer click at the element's center
    Click,
    /// Move the pointer over the element
    Hover,
    /// Replace the value in one input event
    Fill(String),
    /// Type character by character
    Type(String),
    /// Press a named key (`Enter`, `Escape`, ...)
    Press(String),
    /// Choose an `<option>` by value or label
    Select(String),
}

impl Input {
    /// Short name for logs and diagnostics
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Hover => "hover",
            Self::Fill(_) => "fill",
            Self::Type(_) => "type",
            Self::Press(_) => "press",
            Self::Select(_) => "select",
        }
    }
}

/// A completed network response observed by the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRecord {
    /// Monotonic sequence number within the page
    pub seq: u64,
    /// HTTP method
    pub method: String,
    /// Full request URL
    pub url: String,
    /// Response status
    pub status: u16,
    /// Parsed JSON body, if any
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

/// What a capture contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    /// PNG screenshot
    Png,
    /// Serialized DOM
    Html,
}

impl CaptureFormat {
    /// File extension
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Html => "html",
        }
    }
}

/// Screenshot or DOM dump taken for diagnostics
#[derive(Debug, Clone)]
pub struct Capture {
    /// Content kind
    pub format: CaptureFormat,
    /// Raw bytes
    pub data: Vec<u8>,
    /// Page URL at capture time
    pub url: String,
    /// Timestamp when the capture was taken
    pub taken_at: chrono::DateTime<chrono::Utc>,
}

impl Capture {
    /// Create a new capture
    #[must_use]
    pub fn new(format: CaptureFormat, data: Vec<u8>, url: impl Into<String>) -> Self {
        Self {
            format,
            data,
            url: url.into(),
            taken_at: chrono::Utc::now(),
        }
    }

    /// Get the size in bytes
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Check if the capture has data
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty()
    }
}

/// Browser configuration for drivers
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Timeout for navigation
    pub navigation_timeout: Duration,
    /// Executable path override
    pub executable_path: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            navigation_timeout: Duration::from_secs(30),
            executable_path: None,
        }
    }
}

impl DriverConfig {
    /// Create new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set headless mode
    #[must_use]
    pub const fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set viewport dimensions
    #[must_use]
    pub const fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set navigation timeout
    #[must_use]
    pub const fn navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Use a specific browser binary
    #[must_use]
    pub fn executable_path(mut self, path: impl Into<String>) -> Self {
        self.executable_path = Some(path.into());
        self
    }
}

/// Page automation backend
///
/// `query` and `dispatch` both resolve the selector against the live
/// document at call time. `dispatch` targets the `index`-th match of that
/// fresh resolution and fails with
/// [`ProbeError::Detached`](crate::result::ProbeError::Detached) if there is
/// no such match any more; it never acts on a node remembered from an
/// earlier call.
#[async_trait]
pub trait Driver: Send + Sync + std::fmt::Debug {
    /// Navigate to an absolute URL
    async fn goto(&self, url: &str) -> ProbeResult<()>;

    /// Reload the current page, keeping local storage
    async fn reload(&self) -> ProbeResult<()>;

    /// Current URL
    async fn current_url(&self) -> ProbeResult<String>;

    /// Snapshot every element the selector matches, in document order
    async fn query(&self, selector: &Selector) -> ProbeResult<Vec<ElementSnapshot>>;

    /// Deliver an input to the `index`-th match
    async fn dispatch(&self, selector: &Selector, index: usize, input: &Input) -> ProbeResult<()>;

    /// Read a local storage entry
    async fn local_storage(&self, key: &str) -> ProbeResult<Option<String>>;

    /// Every response observed since navigation began, oldest first
    async fn responses(&self) -> ProbeResult<Vec<NetworkRecord>>;

    /// Screenshot or DOM dump
    async fn capture(&self) -> ProbeResult<Capture>;

    /// Wait for the next rendered frame
    async fn animation_frame(&self) -> ProbeResult<()>;

    /// Release browser resources
    async fn close(&self) -> ProbeResult<()> {
        Ok(())
    }
}
