//! Oracle configuration (`refdash.toml`)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OracleError, OracleResult};
use crate::expectation::Category;
use crate::playwright::PlaywrightConfig;
use crate::server::ServerConfig;
use crate::visual::VisualConfig;

pub const DEFAULT_CONFIG_FILE: &str = "refdash.toml";

/// Oracle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Directory scanned for scenario YAML files
    pub scenarios_dir: PathBuf,

    /// Where the suite report is written
    pub output_dir: PathBuf,

    /// Upper bound for any single driver call
    pub step_timeout_ms: u64,

    pub playwright: PlaywrightConfig,

    pub visual: VisualConfig,

    /// Dev server to spawn before the suite; none means it is already up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    /// Replacement remediation hints per category
    pub hints: BTreeMap<Category, String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            scenarios_dir: PathBuf::from("scenarios"),
            output_dir: PathBuf::from("test-results"),
            step_timeout_ms: 30_000,
            playwright: PlaywrightConfig::default(),
            visual: VisualConfig::default(),
            server: None,
            hints: BTreeMap::new(),
        }
    }
}

impl OracleConfig {
    /// Load configuration from file, defaults when it does not exist
    pub fn load(path: &Path) -> OracleResult<Self> {
        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> OracleResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> OracleResult<()> {
        if self.step_timeout_ms == 0 {
            return Err(OracleError::SpecParse(
                "step_timeout_ms must be greater than zero".to_string(),
            ));
        }
        self.visual.tolerance.validate()
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn results_path(&self) -> PathBuf {
        self.output_dir.join("refdash-results.json")
    }
}
