//! blogprobe: end-to-end testing harness for a blog web application
//!
//! Locators re-resolve on every use, actions wait for the target to become
//! actionable, and assertions poll until the expected state appears or a
//! timeout produces a descriptive failure. Scenarios group steps with
//! teardowns and seeded data, and suites turn them into JSON/JUnit reports.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        blogprobe                                  │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  Suite ──► Scenario ──► steps ──► Page / PageObject               │
//! │    │                        │          │                          │
//! │    ▼                        ▼          ▼                          │
//! │  Seeder               expect / poll   Locator ──► action          │
//! │  (npm / in-memory)                      │                         │
//! │                                         ▼                         │
//! │                        Driver: VirtualPage | ChromiumDriver       │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

/// Action Executor: actionability gating plus dispatch
pub mod action;
/// Per-element actionability checks
pub mod actionability;
/// Target application JSON API client
#[cfg(feature = "api")]
pub mod api;
/// Chromium driver over CDP
#[cfg(feature = "browser")]
pub mod browser;
/// Harness configuration (YAML + environment)
pub mod config;
/// API contract probes
#[cfg(feature = "api")]
pub mod contract;
/// CSS selector engine for the in-memory DOM
pub mod css;
/// In-memory DOM and the `VirtualPage` driver
pub mod dom;
/// Driver seam
pub mod driver;
/// Retrying assertions
pub mod expect;
/// External fixture seeding
pub mod fixture;
/// Locators
pub mod locator;
/// Browser-persisted application state
pub mod oracle;
/// Page facade
pub mod page;
/// Blog page objects
pub mod pages;
/// Assertion Poller
pub mod poll;
/// Report artifacts
pub mod reporter;
/// Error taxonomy
pub mod result;
/// Scenario Orchestrator
pub mod scenario;
/// Selector trees
pub mod selector;
/// UI scenarios
pub mod suites;

pub use config::{Credentials, ProbeConfig, SeedConfig, Viewport};
pub use driver::{
    BoundingBox, Capture, CaptureFormat, Driver, DriverConfig, ElementSnapshot, Input,
    NetworkRecord, Point, SharedDriver,
};
pub use expect::{expect, expect_delta, expect_page, LocatorAssertions, PageAssertions};
pub use fixture::{
    CommandSeeder, Dataset, FakeStore, InMemorySeeder, SeedReport, SeedScope, Seeder, SharedSeeder,
};
pub use locator::{ElementState, Locator, LocatorOptions};
pub use page::{Page, ResponseMatcher};
pub use pages::PageObject;
pub use poll::{Backoff, PollOptions};
pub use reporter::{ArtifactStore, FailureMode, TraceMode};
pub use result::{ErrorKind, ProbeError, ProbeResult};
pub use scenario::{
    Scenario, ScenarioContext, ScenarioReport, ScenarioStatus, Suite, SuiteReport,
};
pub use selector::{Selector, TextMatch};

#[cfg(feature = "api")]
pub use api::BlogApi;
#[cfg(feature = "browser")]
pub use browser::ChromiumDriver;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
