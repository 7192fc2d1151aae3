//! Visual diff gate: screenshot comparison against stored baselines

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{OracleError, OracleResult};

/// Allowed difference between a capture and its baseline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Differing pixels allowed before the gate fails
    #[serde(default)]
    pub max_diff_pixels: u64,

    /// Per-pixel perceptual sensitivity in [0, 1]; smaller is stricter
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    0.2
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            max_diff_pixels: 0,
            threshold: default_threshold(),
        }
    }
}

impl Tolerance {
    pub fn new(max_diff_pixels: u64, threshold: f64) -> OracleResult<Self> {
        let tolerance = Self {
            max_diff_pixels,
            threshold,
        };
        tolerance.validate()?;
        Ok(tolerance)
    }

    pub fn validate(&self) -> OracleResult<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(OracleError::InvalidTolerance(format!(
                "threshold {} is outside [0, 1]",
                self.threshold
            )));
        }
        Ok(())
    }

    /// Largest YIQ delta two pixels may have and still count as equal
    fn max_delta(&self) -> f64 {
        35215.0 * self.threshold * self.threshold
    }
}

/// Result of comparing a capture with an existing baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualDiff {
    pub pass: bool,

    pub diff_pixel_count: u64,

    pub total_pixels: u64,

    /// Whether capture and baseline have the same dimensions
    pub dimensions_match: bool,

    /// Path to the diff highlight image (if generated)
    pub diff_image_path: Option<PathBuf>,

    pub actual_hash: String,

    pub baseline_hash: String,
}

impl VisualDiff {
    pub fn diff_percent(&self) -> f64 {
        if self.total_pixels == 0 {
            0.0
        } else {
            self.diff_pixel_count as f64 / self.total_pixels as f64 * 100.0
        }
    }
}

/// Outcome of the gate. Establishing a baseline performs no comparison and
/// is never a pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VisualOutcome {
    BaselineEstablished { baseline: PathBuf },
    Compared(VisualDiff),
}

impl VisualOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, VisualOutcome::Compared(diff) if diff.pass)
    }

    pub fn diff_pixel_count(&self) -> Option<u64> {
        match self {
            VisualOutcome::Compared(diff) => Some(diff.diff_pixel_count),
            VisualOutcome::BaselineEstablished { .. } => None,
        }
    }
}

/// Configuration for visual testing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub baseline_dir: PathBuf,
    pub actual_dir: PathBuf,
    pub diff_dir: PathBuf,
    /// Tolerance for screenshots that do not set their own
    pub tolerance: Tolerance,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            baseline_dir: PathBuf::from("test-results/baselines"),
            actual_dir: PathBuf::from("test-results/screenshots"),
            diff_dir: PathBuf::from("test-results/diffs"),
            tolerance: Tolerance::default(),
        }
    }
}

/// Baseline store and comparator
pub struct VisualGate {
    baseline_dir: PathBuf,
    actual_dir: PathBuf,
    diff_dir: PathBuf,
}

impl VisualGate {
    pub fn new(config: &VisualConfig) -> OracleResult<Self> {
        std::fs::create_dir_all(&config.baseline_dir)?;
        std::fs::create_dir_all(&config.actual_dir)?;
        std::fs::create_dir_all(&config.diff_dir)?;

        Ok(Self {
            baseline_dir: config.baseline_dir.clone(),
            actual_dir: config.actual_dir.clone(),
            diff_dir: config.diff_dir.clone(),
        })
    }

    pub fn baseline_path(&self, name: &str) -> PathBuf {
        self.baseline_dir.join(format!("{}.png", name))
    }

    pub fn actual_path(&self, name: &str) -> PathBuf {
        self.actual_dir.join(format!("{}.png", name))
    }

    /// Compare a capture against the baseline stored under `name`.
    ///
    /// Without a baseline the capture becomes the baseline and the outcome is
    /// `BaselineEstablished`. Creation never replaces a baseline written
    /// concurrently; the later writer compares against it instead.
    pub fn compare(
        &self,
        name: &str,
        capture: &RgbaImage,
        tolerance: Tolerance,
    ) -> OracleResult<VisualOutcome> {
        validate_name(name)?;
        tolerance.validate()?;

        capture.save_with_format(self.actual_path(name), ImageFormat::Png)?;

        let baseline_path = self.baseline_path(name);
        if !baseline_path.exists() {
            if let Some(outcome) = self.establish(name, capture, &baseline_path)? {
                return Ok(outcome);
            }
        }

        let baseline = image::open(&baseline_path)?.to_rgba8();
        let actual_hash = hash_image(capture);
        let baseline_hash = hash_image(&baseline);

        if actual_hash == baseline_hash {
            debug!("Screenshots match exactly (same hash)");
            return Ok(VisualOutcome::Compared(VisualDiff {
                pass: true,
                diff_pixel_count: 0,
                total_pixels: u64::from(capture.width()) * u64::from(capture.height()),
                dimensions_match: true,
                diff_image_path: None,
                actual_hash,
                baseline_hash,
            }));
        }

        let dimensions_match = capture.dimensions() == baseline.dimensions();
        if !dimensions_match {
            warn!(
                "Screenshot dimensions differ for '{}': actual {:?} vs baseline {:?}",
                name,
                capture.dimensions(),
                baseline.dimensions()
            );
        }

        let (diff_pixel_count, diff_img) = diff_images(capture, &baseline, tolerance);
        let total_pixels = u64::from(diff_img.width()) * u64::from(diff_img.height());
        let pass = diff_pixel_count <= tolerance.max_diff_pixels;

        let diff_image_path = if diff_pixel_count > 0 {
            let path = self.diff_dir.join(format!("{}-diff.png", name));
            diff_img.save_with_format(&path, ImageFormat::Png)?;
            Some(path)
        } else {
            None
        };

        if !pass {
            warn!(
                "Visual regression detected in '{}': {} pixels differ (max allowed: {})",
                name, diff_pixel_count, tolerance.max_diff_pixels
            );
        }

        Ok(VisualOutcome::Compared(VisualDiff {
            pass,
            diff_pixel_count,
            total_pixels,
            dimensions_match,
            diff_image_path,
            actual_hash,
            baseline_hash,
        }))
    }

    /// Write a new baseline; `None` when another writer created it first
    fn establish(
        &self,
        name: &str,
        capture: &RgbaImage,
        baseline_path: &Path,
    ) -> OracleResult<Option<VisualOutcome>> {
        let mut staged = NamedTempFile::new_in(&self.baseline_dir)?;
        capture.write_to(&mut staged, ImageFormat::Png)?;

        match staged.persist_noclobber(baseline_path) {
            Ok(_) => {
                info!("Established baseline for '{}' (no comparison performed)", name);
                Ok(Some(VisualOutcome::BaselineEstablished {
                    baseline: baseline_path.to_path_buf(),
                }))
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                debug!("Baseline for '{}' appeared concurrently, comparing", name);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Accept the latest capture as the baseline
    pub fn update_baseline(&self, name: &str) -> OracleResult<()> {
        validate_name(name)?;
        let actual_path = self.actual_path(name);

        if !actual_path.exists() {
            return Err(OracleError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!(
                    "Cannot update baseline: actual screenshot not found: {}",
                    actual_path.display()
                ),
            )));
        }

        std::fs::copy(&actual_path, self.baseline_path(name))?;
        info!("Updated baseline for '{}'", name);
        Ok(())
    }

    /// Accept every capture in the actual-screenshot directory
    pub fn update_all_baselines(&self) -> OracleResult<Vec<String>> {
        let names = png_stems(&self.actual_dir)?;
        for name in &names {
            self.update_baseline(name)?;
        }
        Ok(names)
    }

    pub fn list_baselines(&self) -> OracleResult<Vec<String>> {
        png_stems(&self.baseline_dir)
    }

    /// Remove generated diff images
    pub fn clean_diffs(&self) -> OracleResult<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.diff_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                std::fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn png_stems(dir: &Path) -> OracleResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|e| e == "png").unwrap_or(false) {
            if let Some(name) = path.file_stem() {
                names.push(name.to_string_lossy().to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Scenario and screenshot names become file names
pub fn validate_name(name: &str) -> OracleResult<()> {
    let bad = name.trim().is_empty()
        || name.contains(['/', '\\'])
        || name == "."
        || name == ".."
        || name.contains('\0');
    if bad {
        return Err(OracleError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn hash_image(img: &RgbaImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(img.width().to_le_bytes());
    hasher.update(img.height().to_le_bytes());
    hasher.update(img.as_raw());
    hex::encode(hasher.finalize())
}

/// Count differing pixels and paint a highlight image.
///
/// Pixels outside the overlap of differently sized images always differ.
pub fn diff_images(actual: &RgbaImage, baseline: &RgbaImage, tolerance: Tolerance) -> (u64, RgbaImage) {
    let width = actual.width().max(baseline.width());
    let height = actual.height().max(baseline.height());
    let max_delta = tolerance.max_delta();

    let mut diff_img = RgbaImage::new(width, height);
    let mut diff_pixels = 0u64;

    for y in 0..height {
        for x in 0..width {
            let in_actual = x < actual.width() && y < actual.height();
            let in_baseline = x < baseline.width() && y < baseline.height();

            let differs = if in_actual && in_baseline {
                let a = actual.get_pixel(x, y);
                let b = baseline.get_pixel(x, y);
                a != b && color_delta(a, b) > max_delta
            } else {
                true
            };

            if differs {
                diff_pixels += 1;
                diff_img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            } else {
                let p = actual.get_pixel(x, y).0;
                diff_img.put_pixel(x, y, Rgba([p[0] / 2, p[1] / 2, p[2] / 2, 128]));
            }
        }
    }

    (diff_pixels, diff_img)
}

/// Squared YIQ distance between two pixels blended over white
fn color_delta(a: &Rgba<u8>, b: &Rgba<u8>) -> f64 {
    let over_white = |p: &Rgba<u8>| {
        let alpha = p.0[3] as f64 / 255.0;
        let ch = |c: u8| 255.0 + (c as f64 - 255.0) * alpha;
        (ch(p.0[0]), ch(p.0[1]), ch(p.0[2]))
    };
    let (r1, g1, b1) = over_white(a);
    let (r2, g2, b2) = over_white(b);

    let y = |r: f64, g: f64, b: f64| r * 0.298_895_31 + g * 0.586_622_47 + b * 0.114_482_23;
    let i = |r: f64, g: f64, b: f64| r * 0.595_977_99 - g * 0.274_176_10 - b * 0.321_801_89;
    let q = |r: f64, g: f64, b: f64| r * 0.211_470_17 - g * 0.522_617_11 + b * 0.311_146_94;

    let dy = y(r1, g1, b1) - y(r2, g2, b2);
    let di = i(r1, g1, b1) - i(r2, g2, b2);
    let dq = q(r1, g1, b1) - q(r2, g2, b2);

    0.5053 * dy * dy + 0.299 * di * di + 0.1957 * dq * dq
}
