//! Captured DOM snapshots and the offline driver that replays them

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use image::{imageops, Rgba, RgbaImage};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{OracleError, OracleResult};
use crate::page::{
    BoundingBox, CaptureTarget, ElementState, LoadState, PageDriver, ProbeSet, RenderedPage,
    Viewport, WaitState,
};

/// Tallest page `render` paints, in viewport heights
const MAX_PAGE_VIEWPORTS: u32 = 20;

/// Controls that stay disabled until every required input has a value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormRule {
    pub controls: Vec<String>,
    pub required: Vec<String>,
}

/// Page state captured for a set of selectors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomSnapshot {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub viewport: Viewport,

    /// Matches per selector, in document order
    #[serde(default)]
    pub elements: BTreeMap<String, Vec<ElementState>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forms: Vec<FormRule>,
}

impl RenderedPage for DomSnapshot {
    fn resolve(&self, selector: &str) -> &[ElementState] {
        self.elements
            .get(selector)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl DomSnapshot {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            ..Default::default()
        }
    }

    pub fn with(mut self, selector: impl Into<String>, elements: Vec<ElementState>) -> Self {
        self.elements.insert(selector.into(), elements);
        self
    }

    pub fn with_form(mut self, rule: FormRule) -> Self {
        self.forms.push(rule);
        self
    }

    pub fn from_json(json: &str) -> OracleResult<Self> {
        let mut snapshot: Self = serde_json::from_str(json)?;
        snapshot.apply_form_rules();
        Ok(snapshot)
    }

    pub fn from_file(path: &Path) -> OracleResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn save(&self, path: &Path) -> OracleResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Copy of this snapshot holding only the selectors in `probes`
    pub fn restrict(&self, probes: &ProbeSet) -> DomSnapshot {
        let elements = probes
            .keys()
            .filter_map(|selector| {
                self.elements
                    .get(selector)
                    .map(|matches| (selector.clone(), matches.clone()))
            })
            .collect();

        DomSnapshot {
            url: self.url.clone(),
            viewport: self.viewport,
            elements,
            forms: Vec::new(),
        }
    }

    /// Set the value of every element matched by `selector`
    pub fn set_value(&mut self, selector: &str, value: &str) -> OracleResult<()> {
        let matches = self
            .elements
            .get_mut(selector)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| OracleError::Snapshot(format!("no element matches '{}'", selector)))?;

        for element in matches.iter_mut() {
            element.value = Some(value.to_string());
        }
        self.apply_form_rules();
        Ok(())
    }

    /// Recompute the disabled state of form controls from their required inputs
    pub fn apply_form_rules(&mut self) {
        for rule in self.forms.clone() {
            let incomplete = rule.required.iter().any(|selector| {
                self.resolve(selector)
                    .first()
                    .and_then(|el| el.value.as_deref())
                    .map_or(true, str::is_empty)
            });

            for control in &rule.controls {
                if let Some(matches) = self.elements.get_mut(control) {
                    for element in matches.iter_mut() {
                        element.disabled = incomplete;
                    }
                }
            }
        }
    }

    /// Rasterize element backgrounds into an image.
    ///
    /// Boxes paint largest first so nested elements land on top of their
    /// containers. Text is not drawn.
    pub fn render(&self, target: &CaptureTarget) -> OracleResult<RgbaImage> {
        let page_height = self
            .elements
            .values()
            .flatten()
            .filter_map(|el| el.bounds)
            .map(|b| b.bottom().ceil() as u32)
            .fold(self.viewport.height, u32::max);

        let max_height = self.viewport.height.max(1).saturating_mul(MAX_PAGE_VIEWPORTS);
        if page_height > max_height {
            return Err(OracleError::Snapshot(format!(
                "page height {}px exceeds {} viewports ({}px)",
                page_height, MAX_PAGE_VIEWPORTS, max_height
            )));
        }

        let background = self
            .resolve("body")
            .first()
            .and_then(|body| body.styles.get("backgroundColor"))
            .and_then(|c| parse_color(c))
            .unwrap_or(Rgba([255, 255, 255, 255]));

        let width = self.viewport.width.max(1);
        let mut canvas = RgbaImage::from_pixel(width, page_height.max(1), background);

        let mut boxes: Vec<(BoundingBox, Rgba<u8>)> = self
            .elements
            .iter()
            .filter(|(selector, _)| selector.as_str() != "body")
            .flat_map(|(_, matches)| matches.iter())
            .filter(|el| el.visible)
            .filter_map(|el| {
                let bounds = el.bounds?;
                let color = parse_color(el.styles.get("backgroundColor")?)?;
                Some((bounds, color))
            })
            .filter(|(_, color)| color.0[3] > 0)
            .collect();
        boxes.sort_by(|a, b| b.0.area().total_cmp(&a.0.area()));
        boxes.dedup();

        for (bounds, color) in &boxes {
            fill_rect(&mut canvas, bounds, *color);
        }

        match target {
            CaptureTarget::FullPage => Ok(canvas),
            CaptureTarget::Viewport => {
                let height = self.viewport.height.min(canvas.height()).max(1);
                Ok(imageops::crop_imm(&canvas, 0, 0, width, height).to_image())
            }
            CaptureTarget::Element(selector) => {
                let bounds = self
                    .resolve(selector)
                    .first()
                    .and_then(|el| el.bounds)
                    .ok_or_else(|| {
                        OracleError::Snapshot(format!("no bounding box for '{}'", selector))
                    })?;
                let x = bounds.x.max(0.0) as u32;
                let y = bounds.y.max(0.0) as u32;
                Ok(imageops::crop_imm(
                    &canvas,
                    x,
                    y,
                    bounds.width.ceil() as u32,
                    bounds.height.ceil() as u32,
                )
                .to_image())
            }
        }
    }
}

fn fill_rect(canvas: &mut RgbaImage, bounds: &BoundingBox, color: Rgba<u8>) {
    let x0 = bounds.x.max(0.0).round() as u32;
    let y0 = bounds.y.max(0.0).round() as u32;
    let x1 = ((bounds.x + bounds.width).round().max(0.0) as u32).min(canvas.width());
    let y1 = ((bounds.y + bounds.height).round().max(0.0) as u32).min(canvas.height());

    for y in y0..y1 {
        for x in x0..x1 {
            let under = *canvas.get_pixel(x, y);
            canvas.put_pixel(x, y, blend(under, color));
        }
    }
}

fn blend(under: Rgba<u8>, over: Rgba<u8>) -> Rgba<u8> {
    let alpha = over.0[3] as f64 / 255.0;
    let mix = |u: u8, o: u8| (o as f64 * alpha + u as f64 * (1.0 - alpha)).round() as u8;
    Rgba([
        mix(under.0[0], over.0[0]),
        mix(under.0[1], over.0[1]),
        mix(under.0[2], over.0[2]),
        255,
    ])
}

/// Parse a computed CSS color (`rgb(r, g, b)` or `rgba(r, g, b, a)`)
pub fn parse_color(value: &str) -> Option<Rgba<u8>> {
    static COLOR: OnceLock<Option<Regex>> = OnceLock::new();
    let re = COLOR
        .get_or_init(|| {
            Regex::new(r"^rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*([0-9.]+)\s*)?\)$").ok()
        })
        .as_ref()?;

    let caps = re.captures(value.trim())?;
    let channel = |i: usize| caps.get(i)?.as_str().parse::<u8>().ok();
    let alpha = match caps.get(4) {
        Some(a) => (a.as_str().parse::<f64>().ok()?.clamp(0.0, 1.0) * 255.0).round() as u8,
        None => 255,
    };
    Some(Rgba([channel(1)?, channel(2)?, channel(3)?, alpha]))
}

/// Driver that replays a captured snapshot without a browser.
///
/// Form rules in the snapshot keep submit controls in sync with filled
/// inputs. A wait that is not already satisfied can never become satisfied,
/// so it fails immediately with a timeout.
pub struct SnapshotDriver {
    snapshot: DomSnapshot,
    animations_disabled: bool,
}

impl SnapshotDriver {
    pub fn new(snapshot: DomSnapshot) -> Self {
        Self {
            snapshot,
            animations_disabled: false,
        }
    }

    pub fn from_file(path: &Path) -> OracleResult<Self> {
        info!("Replaying snapshot {}", path.display());
        Ok(Self::new(DomSnapshot::from_file(path)?))
    }

    pub fn page(&self) -> &DomSnapshot {
        &self.snapshot
    }

    pub fn animations_disabled(&self) -> bool {
        self.animations_disabled
    }

    fn require(&self, selector: &str) -> OracleResult<()> {
        if self.snapshot.count(selector) == 0 {
            return Err(OracleError::Snapshot(format!("no element matches '{}'", selector)));
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for SnapshotDriver {
    async fn navigate(&mut self, url: &str) -> OracleResult<()> {
        debug!("snapshot navigate: {}", url);
        Ok(())
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> OracleResult<()> {
        self.snapshot.viewport = viewport;
        Ok(())
    }

    async fn wait_for_load(&mut self, _state: LoadState) -> OracleResult<()> {
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> OracleResult<()> {
        let matches = self.snapshot.resolve(selector);
        let reached = match state {
            WaitState::Visible => matches.iter().any(|el| el.visible),
            WaitState::Hidden => !matches.iter().any(|el| el.visible),
            WaitState::Attached => !matches.is_empty(),
            WaitState::Detached => matches.is_empty(),
        };

        if reached {
            Ok(())
        } else {
            Err(OracleError::Timeout(format!(
                "'{}' to be {} ({} ms)",
                selector,
                state.as_str(),
                timeout.as_millis()
            )))
        }
    }

    async fn fill(&mut self, selector: &str, value: &str) -> OracleResult<()> {
        self.snapshot.set_value(selector, value)
    }

    async fn select(&mut self, selector: &str, value: &str) -> OracleResult<()> {
        self.snapshot.set_value(selector, value)
    }

    async fn click(&mut self, selector: &str) -> OracleResult<()> {
        self.require(selector)
    }

    async fn settle(&mut self, delay: Duration) -> OracleResult<()> {
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn disable_animations(&mut self) -> OracleResult<()> {
        self.animations_disabled = true;
        Ok(())
    }

    async fn snapshot(&mut self, probes: &ProbeSet) -> OracleResult<DomSnapshot> {
        Ok(self.snapshot.restrict(probes))
    }

    async fn screenshot(&mut self, target: &CaptureTarget) -> OracleResult<RgbaImage> {
        self.snapshot.render(target)
    }
}
