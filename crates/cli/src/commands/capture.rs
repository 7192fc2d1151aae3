//! Capture Command

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use tracing::info;

use refdash_oracle::page::{Viewport, WaitState};
use refdash_oracle::playwright::PlaywrightDriver;
use refdash_oracle::server::ServerHandle;
use refdash_oracle::{OracleConfig, PageDriver, Step};

use crate::output::{print_message, OutputFormat};

#[derive(Args)]
pub struct CaptureArgs {
    /// Scenario whose expectations decide what is captured
    pub scenario: String,

    /// Where to write the snapshot
    #[arg(short, long, default_value = "dashboard.json")]
    pub out: PathBuf,

    /// Dashboard URL (overrides config)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Do not spawn the configured dev server
    #[arg(long)]
    pub no_server: bool,
}

/// Bring the page to the scenario's first check, then snapshot every probe
/// the scenario reads.
pub async fn execute(args: CaptureArgs, mut config: OracleConfig, format: OutputFormat) -> Result<()> {
    if let Some(url) = args.base_url {
        config.playwright.base_url = url;
    }

    let scenario = super::select_scenarios(&config, Some(&args.scenario), None)?
        .into_iter()
        .next();
    let Some(scenario) = scenario else {
        bail!("scenario not found: {}", args.scenario);
    };

    let server = match (&config.server, args.no_server) {
        (Some(server), false) => Some(ServerHandle::spawn(server).await?),
        _ => None,
    };

    let mut driver = PlaywrightDriver::new(config.playwright.clone())?;
    driver.set_viewport(scenario.viewport).await?;

    for step in &scenario.steps {
        match step {
            Step::Navigate {
                url,
                wait_for_selector,
            } => {
                driver.navigate(url).await?;
                if let Some(selector) = wait_for_selector {
                    driver
                        .wait_for_selector(selector, WaitState::Visible, Duration::from_secs(10))
                        .await?;
                }
            }
            Step::Viewport { width, height } => {
                driver
                    .set_viewport(Viewport {
                        width: *width,
                        height: *height,
                    })
                    .await?
            }
            Step::WaitForLoad { state } => driver.wait_for_load(*state).await?,
            Step::Wait {
                selector,
                timeout_ms,
                state,
            } => {
                driver
                    .wait_for_selector(selector, *state, Duration::from_millis(*timeout_ms))
                    .await?
            }
            Step::Check { .. } => break,
            _ => {}
        }
    }

    let probes = scenario.catalog().probe_set();
    info!("Capturing {} selector(s) for '{}'", probes.len(), scenario.name);

    let snapshot = driver.snapshot(&probes).await?;
    snapshot.save(&args.out)?;

    if let Some(server) = server {
        server.shutdown().await?;
    }

    print_message(
        &format!("Snapshot written to {}", args.out.display()),
        format,
    );
    Ok(())
}
