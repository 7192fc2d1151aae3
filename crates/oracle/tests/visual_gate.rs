use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use refdash_oracle::page::CaptureTarget;
use refdash_oracle::visual::VisualConfig;
use refdash_oracle::{DomSnapshot, OracleError, Tolerance, VisualGate, VisualOutcome};

fn gate(root: &Path) -> VisualGate {
    VisualGate::new(&VisualConfig {
        baseline_dir: root.join("baselines"),
        actual_dir: root.join("screenshots"),
        diff_dir: root.join("diffs"),
        tolerance: Tolerance::default(),
    })
    .unwrap()
}

fn dashboard_capture() -> RgbaImage {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/dashboard.json");
    DomSnapshot::from_file(&path)
        .unwrap()
        .render(&CaptureTarget::FullPage)
        .unwrap()
}

/// Paint a `side` x `side` block at the origin
fn smudge(img: &RgbaImage, side: u32) -> RgbaImage {
    let mut out = img.clone();
    for y in 0..side {
        for x in 0..side {
            out.put_pixel(x, y, Rgba([255, 0, 255, 255]));
        }
    }
    out
}

/// The first comparison creates the baseline and is reported as such, not as a pass.
#[test]
fn missing_baseline_is_established_not_passed() {
    let dir = tempfile::tempdir().unwrap();
    let gate = gate(dir.path());
    let capture = dashboard_capture();

    let outcome = gate.compare("dashboard", &capture, Tolerance::default()).unwrap();

    match &outcome {
        VisualOutcome::BaselineEstablished { baseline } => assert!(baseline.exists()),
        other => panic!("expected an established baseline, got {:?}", other),
    }
    assert!(!outcome.passed());
    assert_eq!(outcome.diff_pixel_count(), None);
    assert_eq!(gate.list_baselines().unwrap(), vec!["dashboard".to_string()]);
}

/// A capture compared against itself always passes with zero differing pixels.
#[test]
fn identical_capture_passes_with_zero_tolerance() {
    let dir = tempfile::tempdir().unwrap();
    let gate = gate(dir.path());
    let capture = dashboard_capture();

    gate.compare("dashboard", &capture, Tolerance::default()).unwrap();
    let outcome = gate.compare("dashboard", &capture, Tolerance::default()).unwrap();

    assert!(outcome.passed());
    assert_eq!(outcome.diff_pixel_count(), Some(0));
}

/// Differences beyond max_diff_pixels fail and report the diff magnitude.
#[test]
fn tolerance_exceeded_fails_with_diff_count() {
    let dir = tempfile::tempdir().unwrap();
    let gate = gate(dir.path());
    let capture = dashboard_capture();
    let tolerance = Tolerance::new(50, 0.1).unwrap();

    gate.compare("final-comparison", &capture, tolerance).unwrap();
    let outcome = gate
        .compare("final-comparison", &smudge(&capture, 10), tolerance)
        .unwrap();

    match outcome {
        VisualOutcome::Compared(diff) => {
            assert!(!diff.pass);
            assert_eq!(diff.diff_pixel_count, 100);
            assert!(diff.dimensions_match);
            let diff_path = diff.diff_image_path.unwrap();
            assert!(diff_path.ends_with("final-comparison-diff.png"));
            assert!(diff_path.exists());
        }
        other => panic!("expected a comparison, got {:?}", other),
    }
}

/// Differences within max_diff_pixels pass.
#[test]
fn differences_within_tolerance_pass() {
    let dir = tempfile::tempdir().unwrap();
    let gate = gate(dir.path());
    let capture = dashboard_capture();
    let tolerance = Tolerance::new(100, 0.2).unwrap();

    gate.compare("target-comparison", &capture, tolerance).unwrap();
    let outcome = gate
        .compare("target-comparison", &smudge(&capture, 10), tolerance)
        .unwrap();

    assert!(outcome.passed());
    assert_eq!(outcome.diff_pixel_count(), Some(100));
}

/// An existing baseline is never replaced by a comparison.
#[test]
fn comparison_leaves_baseline_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let gate = gate(dir.path());
    let capture = dashboard_capture();

    gate.compare("header", &capture, Tolerance::default()).unwrap();
    let before = std::fs::read(gate.baseline_path("header")).unwrap();

    gate.compare("header", &smudge(&capture, 20), Tolerance::default())
        .unwrap();
    let after = std::fs::read(gate.baseline_path("header")).unwrap();

    assert_eq!(before, after);
}

/// Accepting the latest capture makes the next comparison pass.
#[test]
fn accepted_capture_becomes_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let gate = gate(dir.path());
    let capture = dashboard_capture();
    let changed = smudge(&capture, 20);

    gate.compare("metric-cards", &capture, Tolerance::default()).unwrap();
    let failed = gate.compare("metric-cards", &changed, Tolerance::default()).unwrap();
    assert!(!failed.passed());

    gate.update_baseline("metric-cards").unwrap();
    let outcome = gate.compare("metric-cards", &changed, Tolerance::default()).unwrap();
    assert!(outcome.passed());

    assert_eq!(gate.clean_diffs().unwrap(), 1);
}

/// Names that would escape the baseline directory are rejected.
#[test]
fn path_like_names_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let gate = gate(dir.path());

    let err = gate
        .compare("../outside", &dashboard_capture(), Tolerance::default())
        .unwrap_err();
    assert!(matches!(err, OracleError::InvalidName(_)));
}
