//! Refinement advisor: maps mismatch categories to remediation hints

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::collector::Mismatch;
use crate::expectation::Category;

/// Category -> hint lookup table
#[derive(Debug, Clone)]
pub struct Advisor {
    hints: BTreeMap<Category, String>,
}

impl Default for Advisor {
    fn default() -> Self {
        let hints = Category::ALL
            .iter()
            .map(|c| (*c, default_hint(*c).to_string()))
            .collect();
        Self { hints }
    }
}

fn default_hint(category: Category) -> &'static str {
    match category {
        Category::Readiness => "Check that the dev server is up and every dynamic region renders before the readiness waits expire",
        Category::Layout => "Adjust element dimensions and spacing in the component CSS (e.g. .header height in dashboard.component.css)",
        Category::Color => "Update color values in component CSS files",
        Category::Typography => "Align font-size and font-weight with the target typography",
        Category::Content => "Check text bindings and static copy in the component templates",
        Category::Structure => "Verify the elements rendered by the component templates (rows, inputs, buttons)",
        Category::DataBinding => "Verify the metricCards array in dashboard.component.ts",
        Category::Interaction => "Review the form validation that enables and disables the Save control",
        Category::Visibility => "Make sure the layout sections are rendered and not hidden",
    }
}

impl Advisor {
    /// Start from the default table and replace the given hints
    pub fn with_overrides(overrides: &BTreeMap<Category, String>) -> Self {
        let mut advisor = Self::default();
        for (category, hint) in overrides {
            advisor.hints.insert(*category, hint.clone());
        }
        advisor
    }

    pub fn hint(&self, category: Category) -> Option<&str> {
        self.hints.get(&category).map(String::as_str)
    }

    /// One hint per category present, in category order
    pub fn suggest(&self, mismatches: &[Mismatch]) -> Vec<String> {
        let categories: BTreeSet<Category> = mismatches.iter().map(|m| m.category).collect();
        categories
            .into_iter()
            .filter_map(|c| self.hint(c).map(str::to_string))
            .collect()
    }
}

pub fn log_suggestions(suggestions: &[String]) {
    if suggestions.is_empty() {
        return;
    }
    info!("--- Refinement suggestions ---");
    for suggestion in suggestions {
        info!("• {}", suggestion);
    }
}
