//! Refdash acceptance oracle
//!
//! Decides whether the rendered referral dashboard matches its target
//! design:
//! - Evaluates a declarative catalog of expectations against the page
//! - Collects every failed expectation as a categorized mismatch
//! - Maps mismatch categories to remediation hints
//! - Gates screenshots against stored baselines with a pixel tolerance
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ScenarioRunner (Rust)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  run_scenario(scenario, &mut dyn PageDriver)                │
//! │    ├── check  -> snapshot(probes) -> evaluate -> Mismatch   │
//! │    ├── screenshot -> VisualGate::compare -> VisualOutcome   │
//! │    └── Advisor::suggest(mismatches) -> hints                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PageDriver                                                 │
//! │    ├── PlaywrightDriver  (Node script per operation)        │
//! │    └── SnapshotDriver    (captured DomSnapshot, offline)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML)                                            │
//! │    ├── name, tags, viewport                                 │
//! │    └── steps: navigate | wait | check | fill | click |      │
//! │              settle | screenshot | log                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod advisor;
pub mod collector;
pub mod config;
pub mod error;
pub mod expectation;
pub mod page;
pub mod playwright;
pub mod runner;
pub mod scenario;
pub mod server;
pub mod snapshot;
pub mod visual;

pub use advisor::Advisor;
pub use collector::{evaluate, Mismatch};
pub use config::OracleConfig;
pub use error::{OracleError, OracleResult};
pub use expectation::{Catalog, Category, Comparator, Expectation, Expected, Nth, Probe};
pub use page::{PageDriver, RenderedPage};
pub use runner::{ScenarioReport, ScenarioRunner, ScenarioStatus, SuiteReport};
pub use scenario::{Scenario, Step};
pub use snapshot::{DomSnapshot, SnapshotDriver};
pub use visual::{Tolerance, VisualGate, VisualOutcome};
