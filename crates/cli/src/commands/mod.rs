//! CLI Commands

pub mod baselines;
pub mod capture;
pub mod catalog;
pub mod run;

use anyhow::{bail, Result};
use refdash_oracle::{OracleConfig, Scenario};

/// Load scenarios from the configured directory, narrowed by name and tag
pub(crate) fn select_scenarios(
    config: &OracleConfig,
    name: Option<&str>,
    tag: Option<&str>,
) -> Result<Vec<Scenario>> {
    let mut scenarios = Scenario::load_all(&config.scenarios_dir)?;

    if let Some(name) = name {
        scenarios.retain(|s| s.name == name);
        if scenarios.is_empty() {
            bail!("scenario not found: {}", name);
        }
    }
    if let Some(tag) = tag {
        scenarios.retain(|s| s.tags.iter().any(|t| t == tag));
    }
    if scenarios.is_empty() {
        bail!(
            "no scenarios selected from {}",
            config.scenarios_dir.display()
        );
    }

    Ok(scenarios)
}
