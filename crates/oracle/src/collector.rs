//! Mismatch collector: evaluates a catalog against a page, fail-slow

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::expectation::{format_number, Catalog, Category, Comparator, Expectation, Expected, Nth, Probe};
use crate::page::{ElementState, RenderedPage};

/// One failed expectation, tagged with its category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub category: Category,
    pub selector: String,
    pub expected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    pub description: String,
}

impl Mismatch {
    /// The page never reached the state a scenario waited for
    pub fn readiness(what: &str) -> Self {
        Self {
            category: Category::Readiness,
            selector: what.to_string(),
            expected: "ready".to_string(),
            actual: None,
            description: format!(
                "page did not reach expected state within timeout ({})",
                what
            ),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Evaluate every expectation in order and collect the failures.
///
/// An empty result means the page matches the catalog. Missing elements
/// are recorded as mismatches; evaluation always runs to the end.
pub fn evaluate<P>(catalog: &Catalog, page: &P) -> Vec<Mismatch>
where
    P: RenderedPage + ?Sized,
{
    let mut mismatches = Vec::new();
    for expectation in catalog {
        check(expectation, page, &mut mismatches);
    }
    debug!(
        "evaluated {} expectation(s), {} mismatch(es)",
        catalog.len(),
        mismatches.len()
    );
    mismatches
}

/// Emit mismatches to the log, numbered in evaluation order
pub fn log_mismatches(scenario: &str, mismatches: &[Mismatch]) {
    if mismatches.is_empty() {
        return;
    }
    warn!("UI mismatches found in '{}':", scenario);
    for (index, mismatch) in mismatches.iter().enumerate() {
        warn!("  {}. {}", index + 1, mismatch);
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Reading {
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<String>),
    Missing(String),
}

fn check<P>(expectation: &Expectation, page: &P, out: &mut Vec<Mismatch>)
where
    P: RenderedPage + ?Sized,
{
    let matches = page.resolve(&expectation.selector);

    match &expectation.probe {
        Probe::Count => {
            let reading = Reading::Number(matches.len() as f64);
            record(expectation, reading, None, out);
        }
        Probe::AllTexts => {
            let texts = matches.iter().map(|el| el.text.clone()).collect();
            record(expectation, Reading::List(texts), None, out);
        }
        probe => match expectation.nth {
            Nth::First => record(expectation, read(probe, matches.first()), None, out),
            Nth::Index(i) => record(expectation, read(probe, matches.get(i)), None, out),
            Nth::Every if matches.is_empty() => record(expectation, read(probe, None), None, out),
            Nth::Every => {
                for (i, element) in matches.iter().enumerate() {
                    record(expectation, read(probe, Some(element)), Some(i), out);
                }
            }
        },
    }
}

fn read(probe: &Probe, element: Option<&ElementState>) -> Reading {
    let Some(el) = element else {
        return match probe {
            // An absent element is not visible
            Probe::Visible => Reading::Bool(false),
            _ => Reading::Missing("not found".to_string()),
        };
    };

    match probe {
        Probe::Text => Reading::Text(el.text.clone()),
        Probe::Value => el
            .value
            .clone()
            .map(Reading::Text)
            .unwrap_or_else(|| Reading::Missing("has no value".to_string())),
        Probe::Attribute(name) => el
            .attributes
            .get(name)
            .cloned()
            .map(Reading::Text)
            .unwrap_or_else(|| Reading::Missing(format!("has no {} attribute", name))),
        Probe::Style(property) => el
            .styles
            .get(property)
            .cloned()
            .map(Reading::Text)
            .unwrap_or_else(|| Reading::Missing(format!("has no computed {}", property))),
        Probe::Disabled => Reading::Bool(el.disabled),
        Probe::Visible => Reading::Bool(el.visible),
        Probe::Box(dimension) => match el.bounds {
            Some(b) => Reading::Number(match dimension {
                crate::expectation::Dimension::X => b.x,
                crate::expectation::Dimension::Y => b.y,
                crate::expectation::Dimension::Width => b.width,
                crate::expectation::Dimension::Height => b.height,
            }),
            None => Reading::Missing("has no bounding box".to_string()),
        },
        Probe::Count | Probe::AllTexts => Reading::Missing("not readable per element".to_string()),
    }
}

fn holds(reading: &Reading, expected: &Expected, comparator: Comparator) -> bool {
    match (reading, expected) {
        (Reading::Text(actual), Expected::Text(want)) => match comparator {
            Comparator::Equals => actual == want,
            Comparator::Contains => actual.contains(want.as_str()),
            _ => false,
        },
        (Reading::Text(actual), Expected::Number(want)) => leading_number(actual)
            .map(|n| comparator.holds(n, *want))
            .unwrap_or(false),
        (Reading::Number(actual), Expected::Number(want)) => comparator.holds(*actual, *want),
        (Reading::Bool(actual), Expected::Bool(want)) => actual == want,
        (Reading::List(actual), Expected::List(want)) => actual == want,
        _ => false,
    }
}

fn record(expectation: &Expectation, reading: Reading, index: Option<usize>, out: &mut Vec<Mismatch>) {
    if holds(&reading, &expectation.expected, expectation.comparator) {
        return;
    }

    let probe = &expectation.probe;
    let mut subject = expectation
        .label
        .clone()
        .unwrap_or_else(|| derived_subject(&expectation.selector, probe));
    if let Some(i) = index {
        subject.push_str(&format!(" #{}", i + 1));
    }

    let expected = render_expected(probe, &expectation.expected);
    let phrase = expectation.comparator.phrase();

    let (actual, body) = match &reading {
        Reading::Missing(reason) => (None, format!("{} {}, {} {}", subject, reason, phrase, expected)),
        _ if *probe == Probe::Count => {
            let actual = render_reading(probe, &reading);
            let body = format!("Found {} {}, {} {}", actual, subject, phrase, expected);
            (Some(actual), body)
        }
        _ => {
            let actual = render_reading(probe, &reading);
            let body = format!("{} is {}, {} {}", subject, actual, phrase, expected);
            (Some(actual), body)
        }
    };

    out.push(Mismatch {
        category: expectation.category(),
        selector: expectation.selector.clone(),
        expected,
        actual,
        description: format!("{} [{}]", body, expectation.selector),
    });
}

fn quotes(probe: &Probe) -> bool {
    matches!(probe, Probe::Text | Probe::Value | Probe::Attribute(_))
}

fn render_reading(probe: &Probe, reading: &Reading) -> String {
    match reading {
        Reading::Text(t) if quotes(probe) => format!("\"{}\"", t),
        Reading::Text(t) => t.clone(),
        Reading::Number(n) if matches!(probe, Probe::Box(_)) => format!("{}px", format_number(*n)),
        Reading::Number(n) => format_number(*n),
        Reading::Bool(b) => b.to_string(),
        Reading::List(items) => format!("[{}]", items.join(", ")),
        Reading::Missing(reason) => reason.clone(),
    }
}

fn render_expected(probe: &Probe, expected: &Expected) -> String {
    match expected {
        Expected::Text(t) if quotes(probe) => format!("\"{}\"", t),
        Expected::Number(n) if matches!(probe, Probe::Box(_)) => format!("{}px", format_number(*n)),
        other => other.to_string(),
    }
}

/// "Header height" for `.header` + box height, ".btn-primary paddingTop" for styles
fn derived_subject(selector: &str, probe: &Probe) -> String {
    let name = element_name(selector);
    match probe {
        Probe::Text => format!("{} text", name),
        Probe::AllTexts => format!("{} texts", name),
        Probe::Value => format!("{} value", name),
        Probe::Count => format!("{} elements", selector),
        Probe::Disabled => format!("{} disabled state", name),
        Probe::Visible => format!("{} visibility", name),
        Probe::Attribute(attr) => format!("{} {}", name, attr),
        Probe::Style(property) => format!("{} {}", selector, property),
        Probe::Box(dimension) => format!("{} {}", name, dimension.as_str()),
    }
}

/// Readable name from the last compound of a selector: `.company-name` -> "Company name"
fn element_name(selector: &str) -> String {
    let last = selector.split_whitespace().last().unwrap_or(selector);
    let base = last
        .split(|c| c == ':' || c == '[')
        .next()
        .unwrap_or(last)
        .trim_start_matches(['.', '#']);
    let words = base.replace(['-', '_', '.'], " ");

    let mut chars = words.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => selector.to_string(),
    }
}

/// Leading number of a CSS value: "28px" -> 28, "0.5em" -> 0.5
fn leading_number(value: &str) -> Option<f64> {
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    let re = NUMBER
        .get_or_init(|| Regex::new(r"^\s*(-?\d+(?:\.\d+)?)").ok())
        .as_ref()?;
    re.captures(value)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectation::Dimension;
    use crate::page::BoundingBox;
    use crate::snapshot::DomSnapshot;
    use test_case::test_case;

    fn header_page(height: f64) -> DomSnapshot {
        DomSnapshot::default().with(
            ".header",
            vec![ElementState::default()
                .with_style("backgroundColor", "rgb(30, 58, 95)")
                .with_bounds(BoundingBox::new(0.0, 0.0, 1440.0, height))],
        )
    }

    #[test]
    fn test_header_height_mismatch_reads_naturally() {
        let catalog = Catalog::new().with(
            Expectation::equals(".header", Probe::Box(Dimension::Height), Expected::Number(50.0)).unwrap(),
        );

        let mismatches = evaluate(&catalog, &header_page(48.0));
        assert_eq!(mismatches.len(), 1);
        assert_eq!(
            mismatches[0].description,
            "Header height is 48px, should be 50px [.header]"
        );
        assert_eq!(mismatches[0].category, Category::Layout);
        assert_eq!(mismatches[0].actual.as_deref(), Some("48px"));
    }

    #[test]
    fn test_missing_element_is_recorded_not_fatal() {
        let catalog = Catalog::new()
            .with(Expectation::equals(".company-name", Probe::Text, Expected::Text("LeadSquared".into())).unwrap())
            .with(Expectation::equals(".header", Probe::Box(Dimension::Height), Expected::Number(50.0)).unwrap());

        let mismatches = evaluate(&catalog, &header_page(50.0));
        assert_eq!(mismatches.len(), 1);
        assert_eq!(
            mismatches[0].description,
            "Company name text not found, should be \"LeadSquared\" [.company-name]"
        );
        assert_eq!(mismatches[0].actual, None);
    }

    #[test]
    fn test_count_description() {
        let page = DomSnapshot::default().with(".metric-card", vec![ElementState::default(); 2]);
        let catalog = Catalog::new().with(
            Expectation::equals(".metric-card", Probe::Count, Expected::Number(3.0))
                .unwrap()
                .labeled("metric cards")
                .in_category(Category::DataBinding),
        );

        let mismatches = evaluate(&catalog, &page);
        assert_eq!(mismatches[0].description, "Found 2 metric cards, should be 3 [.metric-card]");
        assert_eq!(mismatches[0].category, Category::DataBinding);
    }

    #[test]
    fn test_every_checks_each_match() {
        let blue = ElementState::default().with_style("backgroundColor", "rgb(66, 133, 244)");
        let grey = ElementState::default().with_style("backgroundColor", "rgb(200, 200, 200)");
        let page = DomSnapshot::default().with(".action-buttons button", vec![blue.clone(), grey, blue]);

        let catalog = Catalog::new().with(
            Expectation::equals(
                ".action-buttons button",
                Probe::Style("backgroundColor".into()),
                Expected::Text("rgb(66, 133, 244)".into()),
            )
            .unwrap()
            .at(Nth::Every)
            .unwrap(),
        );

        let mismatches = evaluate(&catalog, &page);
        assert_eq!(mismatches.len(), 1);
        assert!(mismatches[0].description.contains("#2"));
        assert_eq!(mismatches[0].actual.as_deref(), Some("rgb(200, 200, 200)"));
    }

    #[test]
    fn test_absent_element_reads_as_not_visible() {
        let catalog = Catalog::new()
            .with(Expectation::equals(".modal", Probe::Visible, Expected::Bool(false)).unwrap());
        assert!(evaluate(&catalog, &DomSnapshot::default()).is_empty());
    }

    #[test_case(Comparator::GreaterThan, 80.0, true ; "greater than passes")]
    #[test_case(Comparator::GreaterThan, 100.0, false ; "greater than is strict")]
    #[test_case(Comparator::AtLeast, 100.0, true ; "at least is inclusive")]
    #[test_case(Comparator::LessThan, 100.0, false ; "less than is strict")]
    #[test_case(Comparator::AtMost, 100.0, true ; "at most is inclusive")]
    fn test_range_comparators(cmp: Comparator, bound: f64, pass: bool) {
        let page = DomSnapshot::default().with(
            ".metric-card",
            vec![ElementState::default().with_bounds(BoundingBox::new(0.0, 0.0, 150.0, 100.0))],
        );
        let catalog = Catalog::new()
            .with(Expectation::new(".metric-card", Probe::Box(Dimension::Height), Expected::Number(bound), cmp).unwrap());
        assert_eq!(evaluate(&catalog, &page).is_empty(), pass);
    }

    #[test]
    fn test_style_range_uses_leading_number() {
        let page = DomSnapshot::default()
            .with(".company-name", vec![ElementState::default().with_style("fontSize", "28px")]);
        let catalog = Catalog::new().with(
            Expectation::new(".company-name", Probe::Style("fontSize".into()), Expected::Number(24.0), Comparator::AtLeast)
                .unwrap(),
        );
        assert!(evaluate(&catalog, &page).is_empty());
    }

    #[test]
    fn test_contains_and_list_comparators() {
        let page = DomSnapshot::default()
            .with("td", vec![ElementState::default().with_text("Sanjay K"), ElementState::default().with_text("Prospect badge")])
            .with("option", vec![ElementState::default().with_text("10"), ElementState::default().with_text("25")]);

        let catalog = Catalog::new()
            .with(Expectation::new("td", Probe::Text, Expected::Text("Prospect".into()), Comparator::Contains).unwrap().at(Nth::Index(1)).unwrap())
            .with(Expectation::equals("option", Probe::AllTexts, Expected::List(vec!["10".into(), "25".into(), "50".into()])).unwrap());

        let mismatches = evaluate(&catalog, &page);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].description, "Option texts is [10, 25], should be [10, 25, 50] [option]");
    }

    #[test]
    fn test_element_name() {
        assert_eq!(element_name(".header"), "Header");
        assert_eq!(element_name(".add-referral-form .btn-save"), "Btn save");
        assert_eq!(element_name("input[placeholder=\"Email\"]"), "Input");
        assert_eq!(element_name("td:nth-child(3)"), "Td");
    }

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number("28px"), Some(28.0));
        assert_eq!(leading_number("0.5em"), Some(0.5));
        assert_eq!(leading_number("auto"), None);
    }

    #[test]
    fn test_readiness_mismatch() {
        let m = Mismatch::readiness("'.metric-card' to be visible");
        assert_eq!(m.category, Category::Readiness);
        assert!(m.description.starts_with("page did not reach expected state within timeout"));
    }
}
