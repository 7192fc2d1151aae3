//! Declarative YAML scenarios

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OracleError, OracleResult};
use crate::expectation::Catalog;
use crate::page::{LoadState, Viewport, WaitState};
use crate::visual::{validate_name, Tolerance};

/// A scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name, also used in reports
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Viewport applied before the first step
    #[serde(default)]
    pub viewport: Viewport,

    /// Steps to execute in order
    pub steps: Vec<Step>,
}

/// A single step in a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to a URL (relative to the base URL)
    Navigate {
        url: String,
        #[serde(default)]
        wait_for_selector: Option<String>,
    },

    /// Resize the viewport mid-scenario
    Viewport { width: u32, height: u32 },

    WaitForLoad {
        #[serde(default)]
        state: LoadState,
    },

    /// Wait for an element to reach a state
    Wait {
        selector: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
        #[serde(default)]
        state: WaitState,
    },

    /// Evaluate an expectation catalog against the page
    Check {
        #[serde(default)]
        name: Option<String>,
        expectations: Catalog,
    },

    Fill { selector: String, value: String },

    Select { selector: String, value: String },

    Click { selector: String },

    /// Fixed delay; prefer a readiness wait
    Settle { ms: u64 },

    /// Capture and compare against the baseline stored under `name`
    Screenshot {
        name: String,
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        full_page: bool,
        #[serde(default)]
        tolerance: Option<Tolerance>,
    },

    /// Log a message (for debugging)
    Log { message: String },
}

fn default_wait_timeout() -> u64 {
    10_000
}

impl Step {
    /// Short label for logs
    pub fn describe(&self) -> String {
        match self {
            Step::Navigate { url, .. } => format!("navigate {}", url),
            Step::Viewport { width, height } => format!("viewport {}x{}", width, height),
            Step::WaitForLoad { state } => format!("wait for load state {}", state.as_str()),
            Step::Wait { selector, state, .. } => format!("wait for '{}' {}", selector, state.as_str()),
            Step::Check { name, expectations } => match name {
                Some(name) => format!("check {} ({} expectations)", name, expectations.len()),
                None => format!("check {} expectations", expectations.len()),
            },
            Step::Fill { selector, .. } => format!("fill '{}'", selector),
            Step::Select { selector, .. } => format!("select '{}'", selector),
            Step::Click { selector } => format!("click '{}'", selector),
            Step::Settle { ms } => format!("settle {} ms", ms),
            Step::Screenshot { name, .. } => format!("screenshot {}", name),
            Step::Log { message } => format!("log {}", message),
        }
    }

    /// Whether the step changes page state (form input or clicks)
    pub fn mutates_page(&self) -> bool {
        matches!(self, Step::Fill { .. } | Step::Select { .. } | Step::Click { .. })
    }
}

impl Scenario {
    /// Parse and validate a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> OracleResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_file(path: &Path) -> OracleResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| OracleError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, ordered by file path.
    ///
    /// Scenario names and screenshot names must be unique across the set.
    pub fn load_all(dir: &Path) -> OracleResult<Vec<Self>> {
        if !dir.is_dir() {
            return Err(OracleError::SpecParse(format!(
                "scenario directory {} does not exist",
                dir.display()
            )));
        }

        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        let mut scenarios = Vec::with_capacity(paths.len());
        for path in &paths {
            scenarios.push(Self::from_file(path)?);
        }

        let mut names = BTreeSet::new();
        let mut screenshots = BTreeSet::new();
        for scenario in &scenarios {
            if !names.insert(scenario.name.as_str()) {
                return Err(OracleError::SpecParse(format!(
                    "duplicate scenario name '{}'",
                    scenario.name
                )));
            }
            for shot in scenario.screenshot_names() {
                if !screenshots.insert(shot) {
                    return Err(OracleError::SpecParse(format!(
                        "screenshot '{}' is used by more than one scenario",
                        shot
                    )));
                }
            }
        }

        Ok(scenarios)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    pub fn validate(&self) -> OracleResult<()> {
        validate_name(&self.name)?;

        if self.steps.is_empty() {
            return Err(OracleError::SpecParse(format!(
                "scenario '{}' has no steps",
                self.name
            )));
        }

        let mut shots = BTreeSet::new();
        for step in &self.steps {
            match step {
                Step::Check { expectations, .. } => expectations.validate()?,
                Step::Screenshot {
                    name, tolerance, ..
                } => {
                    validate_name(name)?;
                    if !shots.insert(name.as_str()) {
                        return Err(OracleError::SpecParse(format!(
                            "scenario '{}' captures '{}' twice",
                            self.name, name
                        )));
                    }
                    if let Some(tolerance) = tolerance {
                        tolerance.validate()?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Every expectation the scenario checks, in step order
    pub fn catalog(&self) -> Catalog {
        let mut catalog = Catalog::new();
        for step in &self.steps {
            if let Step::Check { expectations, .. } = step {
                for expectation in expectations {
                    catalog.push(expectation.clone());
                }
            }
        }
        catalog
    }

    /// Check catalogs that read the page as loaded, before the first step
    /// that mutates it
    pub fn initial_checks(&self) -> impl Iterator<Item = &Catalog> {
        self.steps
            .iter()
            .take_while(|step| !step.mutates_page())
            .filter_map(|step| match step {
                Step::Check { expectations, .. } => Some(expectations),
                _ => None,
            })
    }

    pub fn screenshot_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|step| match step {
            Step::Screenshot { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }
}
