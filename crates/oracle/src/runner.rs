//! Scenario runner: drives a page through each scenario, collects
//! mismatches, annotates them and gates screenshots

use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::advisor::{log_suggestions, Advisor};
use crate::collector::{evaluate, log_mismatches, Mismatch};
use crate::config::OracleConfig;
use crate::error::{OracleError, OracleResult};
use crate::page::{CaptureTarget, PageDriver, Viewport, WaitState};
use crate::scenario::{Scenario, Step};
use crate::visual::{Tolerance, VisualGate, VisualOutcome};

/// Grace period on top of a wait step's own timeout
const WAIT_GRACE: Duration = Duration::from_secs(5);

/// Wait applied to `navigate.wait_for_selector`
const NAVIGATE_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    /// Nothing failed, but at least one screenshot had no baseline yet
    BaselineEstablished,
}

impl ScenarioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioStatus::Passed => "passed",
            ScenarioStatus::Failed => "failed",
            ScenarioStatus::BaselineEstablished => "baseline established",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualResult {
    pub name: String,
    #[serde(flatten)]
    pub outcome: VisualOutcome,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub status: ScenarioStatus,
    pub duration_ms: u64,
    pub mismatches: Vec<Mismatch>,
    pub suggestions: Vec<String>,
    pub visual: Vec<VisualResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScenarioReport {
    fn errored(name: &str, error: &OracleError) -> Self {
        Self {
            name: name.to_string(),
            status: ScenarioStatus::Failed,
            duration_ms: 0,
            mismatches: vec![],
            suggestions: vec![],
            visual: vec![],
            error: Some(error.to_string()),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub baselines_established: usize,
    pub duration_ms: u64,
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn from_reports(started_at: DateTime<Utc>, duration_ms: u64, scenarios: Vec<ScenarioReport>) -> Self {
        let count = |status: ScenarioStatus| scenarios.iter().filter(|s| s.status == status).count();
        let passed = count(ScenarioStatus::Passed);
        let failed = count(ScenarioStatus::Failed);
        let baselines_established = count(ScenarioStatus::BaselineEstablished);
        Self {
            started_at,
            total: scenarios.len(),
            passed,
            failed,
            baselines_established,
            duration_ms,
            scenarios,
        }
    }

    /// 0 all passed, 1 any failure, 3 only baselines established
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else if self.baselines_established > 0 {
            3
        } else {
            0
        }
    }
}

/// Per-scenario state threaded through the steps
struct ScenarioContext {
    mismatches: Vec<Mismatch>,
    visual: Vec<VisualResult>,
}

/// Runs scenarios against page drivers
pub struct ScenarioRunner {
    step_timeout: Duration,
    default_tolerance: Tolerance,
    gate: VisualGate,
    advisor: Advisor,
    results_path: PathBuf,
}

impl ScenarioRunner {
    pub fn new(config: &OracleConfig) -> OracleResult<Self> {
        config.validate()?;
        Ok(Self {
            step_timeout: config.step_timeout(),
            default_tolerance: config.visual.tolerance,
            gate: VisualGate::new(&config.visual)?,
            advisor: Advisor::with_overrides(&config.hints),
            results_path: config.results_path(),
        })
    }

    pub fn gate(&self) -> &VisualGate {
        &self.gate
    }

    /// Run scenarios in order, each with a freshly opened driver
    pub async fn run_suite<F>(&self, scenarios: &[Scenario], mut open_driver: F) -> SuiteReport
    where
        F: FnMut(&Scenario) -> OracleResult<Box<dyn PageDriver>>,
    {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut reports = Vec::with_capacity(scenarios.len());

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            let report = match open_driver(scenario) {
                Ok(mut driver) => self.run_scenario(scenario, driver.as_mut()).await,
                Err(e) => {
                    error!("✗ {} - could not open page: {}", scenario.name, e);
                    ScenarioReport::errored(&scenario.name, &e)
                }
            };
            reports.push(report);
        }

        let suite = SuiteReport::from_reports(started_at, start.elapsed().as_millis() as u64, reports);

        info!("");
        info!(
            "Results: {} passed, {} failed, {} baseline(s) established ({} ms)",
            suite.passed, suite.failed, suite.baselines_established, suite.duration_ms
        );

        suite
    }

    /// Run one scenario to completion.
    ///
    /// Mismatches do not stop the scenario. A readiness timeout is recorded
    /// as a single mismatch and ends it; any other error ends it as failed.
    pub async fn run_scenario(&self, scenario: &Scenario, driver: &mut dyn PageDriver) -> ScenarioReport {
        let start = Instant::now();
        info!("▶ {}", scenario.name);

        let mut ctx = ScenarioContext {
            mismatches: Vec::new(),
            visual: Vec::new(),
        };

        let mut outcome = self
            .bounded("viewport", self.step_timeout, driver.set_viewport(scenario.viewport))
            .await;

        if outcome.is_ok() {
            for step in &scenario.steps {
                debug!("{}: {}", scenario.name, step.describe());
                outcome = self.execute(scenario, step, driver, &mut ctx).await;
                if outcome.is_err() {
                    break;
                }
            }
        }

        let error = match outcome {
            Ok(()) => None,
            Err(OracleError::Timeout(what)) => {
                ctx.mismatches.push(Mismatch::readiness(&what));
                None
            }
            Err(e) => Some(e.to_string()),
        };

        let suggestions = self.advisor.suggest(&ctx.mismatches);
        log_mismatches(&scenario.name, &ctx.mismatches);
        log_suggestions(&suggestions);

        let visual_failed = ctx
            .visual
            .iter()
            .any(|v| matches!(&v.outcome, VisualOutcome::Compared(diff) if !diff.pass));
        let established = ctx
            .visual
            .iter()
            .any(|v| matches!(v.outcome, VisualOutcome::BaselineEstablished { .. }));

        let status = if error.is_some() || !ctx.mismatches.is_empty() || visual_failed {
            ScenarioStatus::Failed
        } else if established {
            ScenarioStatus::BaselineEstablished
        } else {
            ScenarioStatus::Passed
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match status {
            ScenarioStatus::Passed => info!("✓ {} ({} ms)", scenario.name, duration_ms),
            ScenarioStatus::BaselineEstablished => {
                info!("○ {} - baseline established ({} ms)", scenario.name, duration_ms)
            }
            ScenarioStatus::Failed => error!(
                "✗ {} - {}",
                scenario.name,
                error
                    .as_deref()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{} mismatch(es)", ctx.mismatches.len()))
            ),
        }

        ScenarioReport {
            name: scenario.name.clone(),
            status,
            duration_ms,
            mismatches: ctx.mismatches,
            suggestions,
            visual: ctx.visual,
            error,
        }
    }

    async fn execute(
        &self,
        scenario: &Scenario,
        step: &Step,
        driver: &mut dyn PageDriver,
        ctx: &mut ScenarioContext,
    ) -> OracleResult<()> {
        let limit = self.step_timeout;
        match step {
            Step::Navigate {
                url,
                wait_for_selector,
            } => {
                self.bounded(url, limit, driver.navigate(url)).await?;
                if let Some(selector) = wait_for_selector {
                    self.bounded(
                        selector,
                        NAVIGATE_WAIT + WAIT_GRACE,
                        driver.wait_for_selector(selector, WaitState::Visible, NAVIGATE_WAIT),
                    )
                    .await?;
                }
            }
            Step::Viewport { width, height } => {
                let viewport = Viewport {
                    width: *width,
                    height: *height,
                };
                self.bounded("viewport", limit, driver.set_viewport(viewport)).await?;
            }
            Step::WaitForLoad { state } => {
                self.bounded(
                    &format!("load state {}", state.as_str()),
                    limit,
                    driver.wait_for_load(*state),
                )
                .await?;
            }
            Step::Wait {
                selector,
                timeout_ms,
                state,
            } => {
                let timeout = Duration::from_millis(*timeout_ms);
                self.bounded(
                    &format!("'{}' to be {}", selector, state.as_str()),
                    timeout + WAIT_GRACE,
                    driver.wait_for_selector(selector, *state, timeout),
                )
                .await?;
            }
            Step::Check { name, expectations } => {
                let snapshot = self
                    .bounded("snapshot", limit, driver.snapshot(&expectations.probe_set()))
                    .await?;
                let found = evaluate(expectations, &snapshot);
                debug!(
                    "{}: check {} -> {} mismatch(es)",
                    scenario.name,
                    name.as_deref().unwrap_or("-"),
                    found.len()
                );
                ctx.mismatches.extend(found);
            }
            Step::Fill { selector, value } => {
                self.bounded(selector, limit, driver.fill(selector, value)).await?;
            }
            Step::Select { selector, value } => {
                self.bounded(selector, limit, driver.select(selector, value)).await?;
            }
            Step::Click { selector } => {
                self.bounded(selector, limit, driver.click(selector)).await?;
            }
            Step::Settle { ms } => {
                warn!(
                    "{}: fixed settle delay of {} ms; a readiness wait is more reliable",
                    scenario.name, ms
                );
                let delay = Duration::from_millis(*ms);
                self.bounded("settle", delay + limit, driver.settle(delay)).await?;
            }
            Step::Screenshot {
                name,
                selector,
                full_page,
                tolerance,
            } => {
                let target = match (selector, full_page) {
                    (Some(selector), _) => CaptureTarget::Element(selector.clone()),
                    (None, true) => CaptureTarget::FullPage,
                    (None, false) => CaptureTarget::Viewport,
                };
                self.bounded("disable animations", limit, driver.disable_animations())
                    .await?;
                let capture = self
                    .bounded(&format!("screenshot {}", name), limit, driver.screenshot(&target))
                    .await?;
                let outcome = self
                    .gate
                    .compare(name, &capture, tolerance.unwrap_or(self.default_tolerance))?;
                ctx.visual.push(VisualResult {
                    name: name.clone(),
                    outcome,
                });
            }
            Step::Log { message } => {
                info!("{}: {}", scenario.name, message);
            }
        }
        Ok(())
    }

    /// Bound a driver call; elapsing becomes `OracleError::Timeout`
    async fn bounded<T, F>(&self, what: &str, limit: Duration, call: F) -> OracleResult<T>
    where
        F: Future<Output = OracleResult<T>>,
    {
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(format!("{} ({} ms)", what, limit.as_millis()))),
        }
    }

    /// Write the suite report as JSON
    pub fn write_results(&self, report: &SuiteReport) -> OracleResult<PathBuf> {
        if let Some(parent) = self.results_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&self.results_path, json)?;

        info!("Results written to: {}", self.results_path.display());
        Ok(self.results_path.clone())
    }
}
