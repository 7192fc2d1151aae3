//! The rendered page seams: read-only element resolution and the async driver

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::OracleResult;
use crate::snapshot::DomSnapshot;

/// Browser viewport in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1280, height: 720 }
    }
}

/// Element geometry in device-independent pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Observable state of one element matched by a selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementState {
    /// Text content with whitespace runs collapsed and the ends trimmed
    #[serde(default)]
    pub text: String,

    /// Current value of form controls (inputs, selects)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,

    /// Computed style properties keyed by their camelCase name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub styles: BTreeMap<String, String>,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default = "default_visible")]
    pub visible: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
}

fn default_visible() -> bool {
    true
}

impl Default for ElementState {
    fn default() -> Self {
        Self {
            text: String::new(),
            value: None,
            attributes: BTreeMap::new(),
            styles: BTreeMap::new(),
            disabled: false,
            visible: true,
            bounds: None,
        }
    }
}

impl ElementState {
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.styles.insert(property.into(), value.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }
}

/// Read-only view of a rendered page.
///
/// Implementations resolve a selector to its matches in document order.
/// Resolution never mutates the page.
pub trait RenderedPage {
    fn resolve(&self, selector: &str) -> &[ElementState];

    fn count(&self, selector: &str) -> usize {
        self.resolve(selector).len()
    }
}

/// What a snapshot must capture for one selector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRequest {
    #[serde(default)]
    pub styles: BTreeSet<String>,
    #[serde(default)]
    pub attributes: BTreeSet<String>,
}

/// Selectors (and the style properties/attributes under them) a catalog reads
pub type ProbeSet = BTreeMap<String, ProbeRequest>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Load,
    DomContentLoaded,
    #[default]
    NetworkIdle,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

/// Region of the page to rasterize
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTarget {
    Viewport,
    FullPage,
    Element(String),
}

/// Async handle to a live page, owned by exactly one scenario.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate to a URL relative to the driver's base
    async fn navigate(&mut self, url: &str) -> OracleResult<()>;

    async fn set_viewport(&mut self, viewport: Viewport) -> OracleResult<()>;

    async fn wait_for_load(&mut self, state: LoadState) -> OracleResult<()>;

    /// Wait for a selector to reach `state`. Returns `OracleError::Timeout`
    /// when it does not within `timeout`.
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> OracleResult<()>;

    async fn fill(&mut self, selector: &str, value: &str) -> OracleResult<()>;

    async fn select(&mut self, selector: &str, value: &str) -> OracleResult<()>;

    async fn click(&mut self, selector: &str) -> OracleResult<()>;

    /// Let the page sit idle for `delay` before later operations
    async fn settle(&mut self, delay: Duration) -> OracleResult<()>;

    /// Suppress CSS animations and transitions for every later capture
    async fn disable_animations(&mut self) -> OracleResult<()>;

    /// Capture the state of every selector in `probes`
    async fn snapshot(&mut self, probes: &ProbeSet) -> OracleResult<DomSnapshot>;

    async fn screenshot(&mut self, target: &CaptureTarget) -> OracleResult<RgbaImage>;
}
