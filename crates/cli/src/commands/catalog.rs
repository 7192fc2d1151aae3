//! Catalog Command

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use refdash_oracle::expectation::Nth;
use refdash_oracle::{Category, Comparator, Expectation, OracleConfig, Probe};

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct CatalogArgs {
    /// Only this scenario
    #[arg(short, long)]
    pub name: Option<String>,

    /// Only scenarios carrying this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Only expectations in this category
    #[arg(short, long)]
    pub category: Option<String>,
}

#[derive(Serialize)]
pub struct ExpectationRow {
    pub scenario: String,
    pub selector: String,
    pub probe: String,
    pub comparator: Comparator,
    pub expected: String,
    pub category: Category,
}

impl ExpectationRow {
    fn new(scenario: &str, expectation: &Expectation) -> Self {
        let mut selector = expectation.selector.clone();
        match expectation.nth {
            Nth::First => {}
            Nth::Index(i) => selector.push_str(&format!(" [#{}]", i + 1)),
            Nth::Every => selector.push_str(" [every]"),
        }

        Self {
            scenario: scenario.to_string(),
            selector,
            probe: probe_label(&expectation.probe),
            comparator: expectation.comparator,
            expected: expectation.expected.to_string(),
            category: expectation.category(),
        }
    }
}

fn probe_label(probe: &Probe) -> String {
    match probe {
        Probe::Text => "text".to_string(),
        Probe::AllTexts => "all texts".to_string(),
        Probe::Value => "value".to_string(),
        Probe::Count => "count".to_string(),
        Probe::Disabled => "disabled".to_string(),
        Probe::Visible => "visible".to_string(),
        Probe::Attribute(name) => format!("attr {}", name),
        Probe::Style(property) => format!("style {}", property),
        Probe::Box(dimension) => format!("box {}", dimension.as_str()),
    }
}

impl TableDisplay for ExpectationRow {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Selector", "Probe", "Comparator", "Expected", "Category"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.scenario.clone(),
            self.selector.clone(),
            self.probe.clone(),
            self.comparator.phrase().trim_start_matches("should ").to_string(),
            self.expected.clone(),
            self.category.to_string(),
        ]
    }
}

pub fn execute(args: CatalogArgs, config: &OracleConfig, format: OutputFormat) -> Result<()> {
    let scenarios = super::select_scenarios(config, args.name.as_deref(), args.tag.as_deref())?;

    let rows: Vec<ExpectationRow> = scenarios
        .iter()
        .flat_map(|scenario| {
            scenario
                .catalog()
                .iter()
                .map(|e| ExpectationRow::new(&scenario.name, e))
                .collect::<Vec<_>>()
        })
        .filter(|row| {
            args.category
                .as_deref()
                .map_or(true, |c| row.category.as_str() == c)
        })
        .collect();

    print_list(&rows, format);
    Ok(())
}
