//! Baseline Commands

use anyhow::{bail, Result};
use clap::Subcommand;
use serde::Serialize;

use refdash_oracle::{OracleConfig, VisualGate};

use crate::output::{print_list, print_message, print_success, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum BaselineCommands {
    /// List stored baselines
    List,

    /// Remove generated diff images
    CleanDiffs,

    /// Accept the latest captures as baselines
    Accept {
        /// Screenshot names to accept
        names: Vec<String>,

        /// Accept every capture in the screenshot directory
        #[arg(long, conflicts_with = "names")]
        all: bool,
    },
}

#[derive(Serialize)]
pub struct BaselineRow {
    pub name: String,
    pub path: String,
}

impl TableDisplay for BaselineRow {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Path"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.name.clone(), self.path.clone()]
    }
}

pub fn execute(cmd: BaselineCommands, config: &OracleConfig, format: OutputFormat) -> Result<()> {
    let gate = VisualGate::new(&config.visual)?;

    match cmd {
        BaselineCommands::List => {
            let rows: Vec<BaselineRow> = gate
                .list_baselines()?
                .into_iter()
                .map(|name| BaselineRow {
                    path: gate.baseline_path(&name).display().to_string(),
                    name,
                })
                .collect();
            print_list(&rows, format);
        }

        BaselineCommands::CleanDiffs => {
            let removed = gate.clean_diffs()?;
            print_message(&format!("Removed {} diff image(s)", removed), format);
        }

        BaselineCommands::Accept { names, all } => {
            let accepted = if all {
                gate.update_all_baselines()?
            } else if names.is_empty() {
                bail!("name at least one screenshot or pass --all");
            } else {
                for name in &names {
                    gate.update_baseline(name)?;
                }
                names
            };

            for name in &accepted {
                print_success(&format!("Accepted baseline for '{}'", name));
            }
        }
    }

    Ok(())
}
