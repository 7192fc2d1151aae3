//! Run Command

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use refdash_oracle::playwright::{Browser, PlaywrightDriver};
use refdash_oracle::server::ServerHandle;
use refdash_oracle::{
    DomSnapshot, OracleConfig, PageDriver, ScenarioReport, ScenarioRunner, ScenarioStatus,
    SnapshotDriver, SuiteReport, VisualOutcome,
};

use crate::output::{print_json, print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct RunArgs {
    /// Run only the scenario with this name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Run only scenarios carrying this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Replay a captured DOM snapshot instead of driving a browser
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Accept this run's failing captures as the new baselines
    #[arg(long)]
    pub update_baselines: bool,

    /// Scenario directory (overrides config)
    #[arg(long)]
    pub scenarios: Option<PathBuf>,

    /// Dashboard URL (overrides config)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long)]
    pub browser: Option<Browser>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Do not spawn the configured dev server
    #[arg(long)]
    pub no_server: bool,

    /// Output directory for results (overrides config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// One row of the run summary
#[derive(Serialize)]
pub struct ScenarioRow {
    pub name: String,
    pub status: ScenarioStatus,
    pub mismatches: usize,
    pub visual: String,
    pub duration_ms: u64,
}

impl From<&ScenarioReport> for ScenarioRow {
    fn from(report: &ScenarioReport) -> Self {
        let visual = report
            .visual
            .iter()
            .map(|v| match &v.outcome {
                VisualOutcome::BaselineEstablished { .. } => format!("{}: new", v.name),
                VisualOutcome::Compared(diff) => format!("{}: {} px", v.name, diff.diff_pixel_count),
            })
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            name: report.name.clone(),
            status: report.status,
            mismatches: report.mismatches.len(),
            visual,
            duration_ms: report.duration_ms,
        }
    }
}

impl TableDisplay for ScenarioRow {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Status", "Mismatches", "Visual", "Duration"]
    }

    fn row(&self) -> Vec<String> {
        let status = match self.status {
            ScenarioStatus::Passed => "✓ passed".green().to_string(),
            ScenarioStatus::Failed => "✗ failed".red().to_string(),
            ScenarioStatus::BaselineEstablished => "○ baseline".yellow().to_string(),
        };
        vec![
            self.name.clone(),
            status,
            self.mismatches.to_string(),
            self.visual.clone(),
            format!("{} ms", self.duration_ms),
        ]
    }
}

pub async fn execute(args: RunArgs, mut config: OracleConfig, format: OutputFormat) -> Result<i32> {
    if let Some(dir) = args.scenarios {
        config.scenarios_dir = dir;
    }
    if let Some(dir) = args.output {
        config.output_dir = dir;
    }
    if let Some(url) = args.base_url {
        config.playwright.base_url = url;
    }
    if let Some(browser) = args.browser {
        config.playwright.browser = browser;
    }
    if args.headed {
        config.playwright.headless = false;
    }

    let scenarios = super::select_scenarios(&config, args.name.as_deref(), args.tag.as_deref())?;
    let runner = ScenarioRunner::new(&config)?;

    let suite = match &args.snapshot {
        Some(path) => {
            let page = DomSnapshot::from_file(path)
                .with_context(|| format!("loading snapshot {}", path.display()))?;
            runner
                .run_suite(&scenarios, |_| {
                    Ok(Box::new(SnapshotDriver::new(page.clone())) as Box<dyn PageDriver>)
                })
                .await
        }
        None => {
            let server = match (&config.server, args.no_server) {
                (Some(server), false) => Some(ServerHandle::spawn(server).await?),
                _ => None,
            };
            let playwright = config.playwright.clone();
            let suite = runner
                .run_suite(&scenarios, |_| {
                    Ok(Box::new(PlaywrightDriver::new(playwright.clone())?) as Box<dyn PageDriver>)
                })
                .await;
            if let Some(server) = server {
                server.shutdown().await?;
            }
            suite
        }
    };

    runner.write_results(&suite)?;
    report(&suite, format);

    if args.update_baselines {
        accept_failed_captures(&runner, &suite)?;
    }

    Ok(suite.exit_code())
}

fn report(suite: &SuiteReport, format: OutputFormat) {
    if matches!(format, OutputFormat::Json) {
        print_json(suite);
        return;
    }

    let rows: Vec<ScenarioRow> = suite.scenarios.iter().map(ScenarioRow::from).collect();
    print_list(&rows, format);

    for scenario in suite.scenarios.iter().filter(|s| s.status == ScenarioStatus::Failed) {
        println!();
        println!("{}", scenario.name.bold());
        if let Some(error) = &scenario.error {
            println!("  {} {}", "error:".red(), error);
        }
        for (i, mismatch) in scenario.mismatches.iter().enumerate() {
            println!("  {}. [{}] {}", i + 1, mismatch.category, mismatch.description);
        }
        for v in &scenario.visual {
            if let VisualOutcome::Compared(diff) = &v.outcome {
                if !diff.pass {
                    println!(
                        "  {} {} pixels differ ({:.2}%)",
                        v.name.yellow(),
                        diff.diff_pixel_count,
                        diff.diff_percent()
                    );
                }
            }
        }
        for suggestion in &scenario.suggestions {
            println!("  • {}", suggestion);
        }
    }

    println!();
    println!(
        "{} passed, {} failed, {} baseline(s) established in {} ms (started {})",
        suite.passed.to_string().green(),
        suite.failed.to_string().red(),
        suite.baselines_established.to_string().yellow(),
        suite.duration_ms,
        suite.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

fn accept_failed_captures(runner: &ScenarioRunner, suite: &SuiteReport) -> Result<()> {
    let failed: Vec<&str> = suite
        .scenarios
        .iter()
        .flat_map(|s| s.visual.iter())
        .filter(|v| matches!(&v.outcome, VisualOutcome::Compared(diff) if !diff.pass))
        .map(|v| v.name.as_str())
        .collect();

    if failed.is_empty() {
        print_warning("No failing captures to accept");
        return Ok(());
    }

    for name in failed {
        runner.gate().update_baseline(name)?;
        print_success(&format!("Accepted new baseline for '{}'", name));
    }
    Ok(())
}
