//! Expectation catalog: named checks pairing a selector with an expected value

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OracleError, OracleResult};
use crate::page::ProbeSet;

/// Bounding box dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    X,
    Y,
    Width,
    Height,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::X => "x",
            Dimension::Y => "y",
            Dimension::Width => "width",
            Dimension::Height => "height",
        }
    }
}

/// The attribute path an expectation reads from an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Probe {
    /// Normalized text content
    Text,
    /// Text content of every match, in document order
    AllTexts,
    /// Form control value (inputs, dropdown selections)
    Value,
    /// Number of matches
    Count,
    Disabled,
    Visible,
    Attribute(String),
    /// Computed style property, e.g. `backgroundColor`
    Style(String),
    #[serde(rename = "box")]
    Box(Dimension),
}

impl Probe {
    /// Default mismatch category for this probe
    pub fn category(&self) -> Category {
        match self {
            Probe::Box(_) => Category::Layout,
            Probe::Style(property) => {
                let property = property.to_ascii_lowercase();
                if property.contains("color") {
                    Category::Color
                } else if property.starts_with("font")
                    || property.starts_with("line")
                    || property.starts_with("letter")
                {
                    Category::Typography
                } else {
                    Category::Layout
                }
            }
            Probe::Text | Probe::AllTexts | Probe::Value | Probe::Attribute(_) => Category::Content,
            Probe::Count => Category::Structure,
            Probe::Disabled => Category::Interaction,
            Probe::Visible => Category::Visibility,
        }
    }

    /// Whether the probe reads the match set rather than one element
    pub fn reads_all_matches(&self) -> bool {
        matches!(self, Probe::Count | Probe::AllTexts)
    }
}

/// Expected value of an expectation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expected {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Bool(b) => write!(f, "{}", b),
            Expected::Number(n) => write!(f, "{}", format_number(*n)),
            Expected::Text(t) => write!(f, "{}", t),
            Expected::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// Verbatim equality; also the comparator for counts and boolean state
    #[default]
    Equals,
    Contains,
    GreaterThan,
    AtLeast,
    LessThan,
    AtMost,
}

impl Comparator {
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            Comparator::GreaterThan | Comparator::AtLeast | Comparator::LessThan | Comparator::AtMost
        )
    }

    /// Phrase used in mismatch descriptions ("should be greater than 80")
    pub fn phrase(&self) -> &'static str {
        match self {
            Comparator::Equals => "should be",
            Comparator::Contains => "should contain",
            Comparator::GreaterThan => "should be greater than",
            Comparator::AtLeast => "should be at least",
            Comparator::LessThan => "should be less than",
            Comparator::AtMost => "should be at most",
        }
    }

    /// Check a numeric reading against a numeric expectation
    pub fn holds(&self, actual: f64, expected: f64) -> bool {
        match self {
            Comparator::Equals => actual == expected,
            Comparator::GreaterThan => actual > expected,
            Comparator::AtLeast => actual >= expected,
            Comparator::LessThan => actual < expected,
            Comparator::AtMost => actual <= expected,
            Comparator::Contains => false,
        }
    }
}

/// Which of the selector's matches an expectation reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nth {
    #[default]
    First,
    Index(usize),
    /// Check every match independently
    Every,
}

/// Mismatch category tag, declared in the order hints are reported
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Readiness,
    Layout,
    Color,
    Typography,
    Content,
    Structure,
    DataBinding,
    Interaction,
    Visibility,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Readiness,
        Category::Layout,
        Category::Color,
        Category::Typography,
        Category::Content,
        Category::Structure,
        Category::DataBinding,
        Category::Interaction,
        Category::Visibility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Readiness => "readiness",
            Category::Layout => "layout",
            Category::Color => "color",
            Category::Typography => "typography",
            Category::Content => "content",
            Category::Structure => "structure",
            Category::DataBinding => "data_binding",
            Category::Interaction => "interaction",
            Category::Visibility => "visibility",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single check against the rendered page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expectation {
    pub selector: String,

    /// Written `index: 1` / `every` in scenario files, like `probe`
    #[serde(
        default,
        skip_serializing_if = "is_first",
        with = "serde_yaml::with::singleton_map"
    )]
    pub nth: Nth,

    #[serde(with = "serde_yaml::with::singleton_map")]
    pub probe: Probe,

    pub expected: Expected,

    #[serde(default)]
    pub comparator: Comparator,

    /// Human name used in mismatch descriptions, e.g. "Header height"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Overrides the probe's default category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

fn is_first(nth: &Nth) -> bool {
    *nth == Nth::First
}

impl Expectation {
    /// Build and validate an expectation
    pub fn new(
        selector: impl Into<String>,
        probe: Probe,
        expected: Expected,
        comparator: Comparator,
    ) -> OracleResult<Self> {
        let expectation = Self {
            selector: selector.into(),
            nth: Nth::First,
            probe,
            expected,
            comparator,
            label: None,
            category: None,
        };
        expectation.validate()?;
        Ok(expectation)
    }

    pub fn equals(selector: impl Into<String>, probe: Probe, expected: Expected) -> OracleResult<Self> {
        Self::new(selector, probe, expected, Comparator::Equals)
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn in_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn at(mut self, nth: Nth) -> OracleResult<Self> {
        self.nth = nth;
        self.validate()?;
        Ok(self)
    }

    pub fn category(&self) -> Category {
        self.category.unwrap_or_else(|| self.probe.category())
    }

    /// Reject probe/expected/comparator combinations that cannot be evaluated
    pub fn validate(&self) -> OracleResult<()> {
        let invalid = |reason: &str| {
            Err(OracleError::InvalidExpectation {
                selector: self.selector.clone(),
                reason: reason.to_string(),
            })
        };

        if self.selector.trim().is_empty() {
            return invalid("selector is empty");
        }
        if self.nth == Nth::Every && self.probe.reads_all_matches() {
            return invalid("`every` cannot be combined with a probe over all matches");
        }

        match (&self.probe, &self.expected, self.comparator) {
            (Probe::Disabled | Probe::Visible, Expected::Bool(_), Comparator::Equals) => Ok(()),
            (Probe::Disabled | Probe::Visible, _, _) => {
                invalid("boolean probes take a boolean expected value and `equals`")
            }
            (Probe::Count, Expected::Number(n), cmp) if cmp != Comparator::Contains => {
                if *n < 0.0 || n.fract() != 0.0 {
                    invalid("count must be a non-negative integer")
                } else {
                    Ok(())
                }
            }
            (Probe::Count, _, _) => invalid("count takes a number and `equals` or a range comparator"),
            (Probe::Box(_), Expected::Number(_), cmp) if cmp != Comparator::Contains => Ok(()),
            (Probe::Box(_), _, _) => {
                invalid("box dimensions take a number and `equals` or a range comparator")
            }
            (Probe::AllTexts, Expected::List(_), Comparator::Equals) => Ok(()),
            (Probe::AllTexts, _, _) => invalid("all_texts takes a list and `equals`"),
            (
                Probe::Text | Probe::Value | Probe::Attribute(_) | Probe::Style(_),
                Expected::Text(_),
                Comparator::Equals | Comparator::Contains,
            ) => Ok(()),
            (Probe::Style(_), Expected::Number(_), cmp) if cmp != Comparator::Contains => Ok(()),
            _ => invalid("text probes take a string with `equals` or `contains`"),
        }
    }
}

/// Ordered collection of expectations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    expectations: Vec<Expectation>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog, validating every expectation
    pub fn from_expectations(expectations: Vec<Expectation>) -> OracleResult<Self> {
        for expectation in &expectations {
            expectation.validate()?;
        }
        Ok(Self { expectations })
    }

    pub fn with(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }

    pub fn push(&mut self, expectation: Expectation) {
        self.expectations.push(expectation);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Expectation> {
        self.expectations.iter()
    }

    pub fn len(&self) -> usize {
        self.expectations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expectations.is_empty()
    }

    pub fn validate(&self) -> OracleResult<()> {
        self.expectations.iter().try_for_each(Expectation::validate)
    }

    /// Selectors and properties a snapshot must capture to evaluate this catalog
    pub fn probe_set(&self) -> ProbeSet {
        let mut probes = ProbeSet::new();
        for expectation in &self.expectations {
            let request = probes.entry(expectation.selector.clone()).or_default();
            match &expectation.probe {
                Probe::Style(property) => {
                    request.styles.insert(property.clone());
                }
                Probe::Attribute(name) => {
                    request.attributes.insert(name.clone());
                }
                _ => {}
            }
        }
        probes
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a Expectation;
    type IntoIter = std::slice::Iter<'a, Expectation>;

    fn into_iter(self) -> Self::IntoIter {
        self.expectations.iter()
    }
}

/// Render a number without a trailing `.0` for whole values
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        let rendered = format!("{:.3}", n);
        rendered.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Probe::Box(Dimension::Height), Category::Layout ; "box is layout")]
    #[test_case(Probe::Style("backgroundColor".into()), Category::Color ; "background color")]
    #[test_case(Probe::Style("color".into()), Category::Color ; "text color")]
    #[test_case(Probe::Style("fontSize".into()), Category::Typography ; "font size")]
    #[test_case(Probe::Style("paddingTop".into()), Category::Layout ; "padding")]
    #[test_case(Probe::Count, Category::Structure ; "count")]
    #[test_case(Probe::Disabled, Category::Interaction ; "disabled")]
    #[test_case(Probe::Visible, Category::Visibility ; "visible")]
    #[test_case(Probe::Attribute("placeholder".into()), Category::Content ; "attribute")]
    fn test_default_category(probe: Probe, category: Category) {
        assert_eq!(probe.category(), category);
    }

    #[test]
    fn test_category_override_wins() {
        let e = Expectation::equals(".metric-card", Probe::Count, Expected::Number(3.0))
            .unwrap()
            .in_category(Category::DataBinding);
        assert_eq!(e.category(), Category::DataBinding);
    }

    #[test_case(Probe::Disabled, Expected::Text("true".into()), Comparator::Equals ; "disabled needs bool")]
    #[test_case(Probe::Count, Expected::Number(2.5), Comparator::Equals ; "fractional count")]
    #[test_case(Probe::Count, Expected::Number(3.0), Comparator::Contains ; "count contains")]
    #[test_case(Probe::Text, Expected::Number(3.0), Comparator::Equals ; "text needs string")]
    #[test_case(Probe::AllTexts, Expected::Text("a".into()), Comparator::Equals ; "all texts needs list")]
    #[test_case(Probe::Box(Dimension::Width), Expected::Text("150px".into()), Comparator::AtLeast ; "box needs number")]
    fn test_rejects_incompatible_expectation(probe: Probe, expected: Expected, cmp: Comparator) {
        let err = Expectation::new(".x", probe, expected, cmp).unwrap_err();
        assert!(matches!(err, OracleError::InvalidExpectation { .. }));
    }

    #[test]
    fn test_rejects_every_on_count() {
        let e = Expectation::equals(".btn", Probe::Count, Expected::Number(3.0)).unwrap();
        assert!(e.at(Nth::Every).is_err());
    }

    #[test]
    fn test_rejects_empty_selector() {
        assert!(Expectation::equals("  ", Probe::Text, Expected::Text("x".into())).is_err());
    }

    #[test]
    fn test_probe_set_merges_properties_per_selector() {
        let catalog = Catalog::new()
            .with(Expectation::equals(".btn-primary", Probe::Style("paddingTop".into()), Expected::Text("8px".into())).unwrap())
            .with(Expectation::equals(".btn-primary", Probe::Style("paddingLeft".into()), Expected::Text("20px".into())).unwrap())
            .with(Expectation::equals(".header", Probe::Box(Dimension::Height), Expected::Number(50.0)).unwrap());

        let probes = catalog.probe_set();
        assert_eq!(probes.len(), 2);
        assert_eq!(probes[".btn-primary"].styles.len(), 2);
        assert!(probes[".header"].styles.is_empty());
    }

    #[test]
    fn test_parse_expectation_yaml() {
        let yaml = r#"
selector: .metric-card .metric-value
nth:
  index: 1
probe: text
expected: "4"
label: Won value
category: data_binding
"#;
        let e: Expectation = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(e.nth, Nth::Index(1));
        assert_eq!(e.expected, Expected::Text("4".into()));
        assert_eq!(e.category(), Category::DataBinding);
        e.validate().unwrap();
    }

    #[test]
    fn test_parse_style_and_box_probes() {
        let yaml = r#"
- selector: .left-section
  probe:
    style: backgroundColor
  expected: rgb(227, 242, 253)
- selector: .header
  probe:
    box: height
  expected: 50
- selector: .referral-table tbody tr
  nth: every
  probe: visible
  expected: true
"#;
        let parsed: Vec<Expectation> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed[0].probe, Probe::Style("backgroundColor".into()));
        assert_eq!(parsed[1].probe, Probe::Box(Dimension::Height));
        assert_eq!(parsed[1].expected, Expected::Number(50.0));
        assert_eq!(parsed[2].nth, Nth::Every);
        assert_eq!(parsed[2].probe, Probe::Visible);
    }

    #[test]
    fn test_expectation_yaml_round_trips_map_syntax() {
        let e = Expectation::equals(".header", Probe::Box(Dimension::Height), Expected::Number(50.0))
            .unwrap()
            .at(Nth::Index(2))
            .unwrap();
        let yaml = serde_yaml::to_string(&e).unwrap();
        assert!(yaml.contains("index: 2"), "{}", yaml);
        assert!(yaml.contains("box: height"), "{}", yaml);
        let back: Expectation = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(50.0), "50");
        assert_eq!(format_number(48.5), "48.5");
        assert_eq!(format_number(0.125), "0.125");
    }
}
