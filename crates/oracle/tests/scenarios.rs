//! Bundled scenarios run end to end against the captured dashboard fixture.

use std::path::{Path, PathBuf};

use refdash_oracle::runner::VisualResult;
use refdash_oracle::visual::VisualConfig;
use refdash_oracle::{
    Category, DomSnapshot, OracleConfig, PageDriver, RenderedPage, Scenario, ScenarioRunner,
    ScenarioStatus, SnapshotDriver, VisualOutcome,
};

fn fixture() -> DomSnapshot {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/dashboard.json");
    DomSnapshot::from_file(&path).unwrap()
}

fn scenarios() -> Vec<Scenario> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios");
    Scenario::load_all(&dir).unwrap()
}

fn scenario(name: &str) -> Scenario {
    scenarios().into_iter().find(|s| s.name == name).unwrap()
}

fn runner(root: &Path) -> ScenarioRunner {
    let config = OracleConfig {
        output_dir: root.join("results"),
        step_timeout_ms: 5_000,
        visual: VisualConfig {
            baseline_dir: root.join("baselines"),
            actual_dir: root.join("screenshots"),
            diff_dir: root.join("diffs"),
            ..Default::default()
        },
        ..Default::default()
    };
    ScenarioRunner::new(&config).unwrap()
}

fn replay(page: DomSnapshot) -> impl FnMut(&Scenario) -> refdash_oracle::OracleResult<Box<dyn PageDriver>> {
    move |_| Ok(Box::new(SnapshotDriver::new(page.clone())) as Box<dyn PageDriver>)
}

#[test]
fn bundled_scenarios_load() {
    let names: Vec<String> = scenarios().into_iter().map(|s| s.name).collect();
    assert_eq!(
        names,
        vec![
            "dashboard-content",
            "dashboard-visual",
            "form-validation",
            "iterative-refinement",
            "target-comparison",
        ]
    );

    let all = scenarios();
    let visual = Scenario::filter_by_tag(&all, "visual");
    assert_eq!(visual.len(), 2);
}

/// Save is disabled before the form is filled and enabled after.
#[tokio::test]
async fn form_scenario_tracks_save_state() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());
    let mut driver = SnapshotDriver::new(fixture());

    let report = runner
        .run_scenario(&scenario("form-validation"), &mut driver)
        .await;

    assert_eq!(report.status, ScenarioStatus::Passed, "{:?}", report);
    assert!(report.mismatches.is_empty());
    assert!(!driver.page().resolve(".add-referral-form .btn-save")[0].disabled);
}

/// A Save control that stays disabled after filling is an interaction mismatch.
#[tokio::test]
async fn form_scenario_reports_stuck_save_button() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());
    let mut page = fixture();
    page.forms.clear();
    let mut driver = SnapshotDriver::new(page);

    let report = runner
        .run_scenario(&scenario("form-validation"), &mut driver)
        .await;

    assert_eq!(report.status, ScenarioStatus::Failed);
    assert_eq!(report.mismatches.len(), 1);
    assert_eq!(report.mismatches[0].category, Category::Interaction);
    assert_eq!(
        report.mismatches[0].description,
        "Save button disabled is true, should be false [.add-referral-form .btn-save]"
    );
    assert_eq!(report.suggestions.len(), 1);
}

/// A region that never renders yields one readiness mismatch and stops the scenario.
#[tokio::test]
async fn readiness_timeout_is_a_single_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());
    let mut page = fixture();
    page.elements.remove(".metric-card");
    let mut driver = SnapshotDriver::new(page);

    let report = runner
        .run_scenario(&scenario("dashboard-visual"), &mut driver)
        .await;

    assert_eq!(report.status, ScenarioStatus::Failed);
    assert_eq!(report.mismatches.len(), 1);
    assert_eq!(report.mismatches[0].category, Category::Readiness);
    assert!(report.mismatches[0]
        .description
        .starts_with("page did not reach expected state within timeout"));
    assert!(report.visual.is_empty());
    assert!(!driver.animations_disabled());
    assert!(report.error.is_none());
}

/// First run establishes baselines (exit code 3); the second run passes (exit code 0).
#[tokio::test]
async fn suite_establishes_then_passes() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());
    let all = scenarios();

    let first = runner.run_suite(&all, replay(fixture())).await;
    assert_eq!(first.total, 5);
    assert_eq!(first.failed, 0, "{:#?}", first.scenarios);
    assert_eq!(first.baselines_established, 3);
    assert_eq!(first.exit_code(), 3);

    let visual = first
        .scenarios
        .iter()
        .find(|s| s.name == "dashboard-visual")
        .unwrap();
    assert_eq!(visual.status, ScenarioStatus::BaselineEstablished);
    assert_eq!(visual.visual.len(), 5);
    assert!(visual
        .visual
        .iter()
        .all(|v: &VisualResult| matches!(v.outcome, VisualOutcome::BaselineEstablished { .. })));

    let second = runner.run_suite(&all, replay(fixture())).await;
    assert_eq!(second.passed, 5, "{:#?}", second.scenarios);
    assert_eq!(second.exit_code(), 0);

    let path = runner.write_results(&second).unwrap();
    let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written["passed"], 5);
    assert_eq!(written["scenarios"][1]["visual"][0]["outcome"], "compared");
}

/// A visual drift beyond tolerance fails the gate independently of the color check.
#[tokio::test]
async fn visual_drift_fails_the_gate() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());
    let target = scenario("target-comparison");

    let mut baseline_driver = SnapshotDriver::new(fixture());
    let first = runner.run_scenario(&target, &mut baseline_driver).await;
    assert_eq!(first.status, ScenarioStatus::BaselineEstablished);

    let mut page = fixture();
    page.elements.get_mut(".right-section").unwrap()[0]
        .styles
        .insert("backgroundColor".to_string(), "rgb(0, 0, 0)".to_string());
    let mut driver = SnapshotDriver::new(page);
    let report = runner.run_scenario(&target, &mut driver).await;

    assert_eq!(report.status, ScenarioStatus::Failed);
    let diff = report.visual[0].outcome.diff_pixel_count().unwrap();
    assert!(diff > 100, "only {} pixels differ", diff);
    assert_eq!(report.mismatches.len(), 1);
    assert_eq!(report.mismatches[0].category, Category::Color);
}

/// Every screenshot step disables animations before capturing.
#[tokio::test]
async fn screenshots_disable_animations() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());
    let mut driver = SnapshotDriver::new(fixture());

    runner
        .run_scenario(&scenario("iterative-refinement"), &mut driver)
        .await;

    assert!(driver.animations_disabled());
}

/// A settle step delays the page itself before the next capture.
#[tokio::test]
async fn settle_delays_the_page_before_capture() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());
    let scenario = Scenario::from_yaml(
        r#"
name: settled-capture
steps:
  - action: navigate
    url: /
  - action: settle
    ms: 200
  - action: screenshot
    name: settled-capture
"#,
    )
    .unwrap();
    let mut driver = SnapshotDriver::new(fixture());

    let started = std::time::Instant::now();
    let report = runner.run_scenario(&scenario, &mut driver).await;

    assert!(started.elapsed() >= std::time::Duration::from_millis(200));
    assert_eq!(report.status, ScenarioStatus::BaselineEstablished, "{:?}", report);
}
