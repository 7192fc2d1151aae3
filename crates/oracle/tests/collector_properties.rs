use std::path::PathBuf;

use refdash_oracle::advisor::Advisor;
use refdash_oracle::expectation::Dimension;
use refdash_oracle::page::BoundingBox;
use refdash_oracle::{evaluate, Catalog, Category, DomSnapshot, Expectation, Expected, Probe, Scenario};

fn fixture() -> DomSnapshot {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/dashboard.json");
    DomSnapshot::from_file(&path).unwrap()
}

fn scenarios() -> Vec<Scenario> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios");
    Scenario::load_all(&dir).unwrap()
}

fn scenario(name: &str) -> Scenario {
    scenarios()
        .into_iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("bundled scenario '{}' missing", name))
}

fn set_text(page: &mut DomSnapshot, selector: &str, index: usize, text: &str) {
    page.elements.get_mut(selector).unwrap()[index].text = text.to_string();
}

/// A page that satisfies every expectation yields no mismatches. Checks made
/// after the page is filled in are covered by the form scenario run.
#[test]
fn conforming_page_yields_no_mismatches() {
    let page = fixture();
    for scenario in scenarios() {
        for catalog in scenario.initial_checks() {
            let mismatches = evaluate(catalog, &page);
            assert!(
                mismatches.is_empty(),
                "scenario '{}' reported {:?}",
                scenario.name,
                mismatches
            );
        }
    }
}

/// One deviation yields exactly one mismatch naming the element and both values.
#[test]
fn single_deviation_yields_single_precise_mismatch() {
    let mut page = fixture();
    page.elements.get_mut(".header").unwrap()[0].bounds = Some(BoundingBox::new(0.0, 0.0, 1280.0, 48.0));

    let mismatches = evaluate(&scenario("iterative-refinement").catalog(), &page);

    assert_eq!(mismatches.len(), 1);
    let mismatch = &mismatches[0];
    assert_eq!(mismatch.category, Category::Layout);
    assert_eq!(mismatch.selector, ".header");
    assert_eq!(mismatch.description, "Header height is 48px, should be 50px [.header]");
}

/// Evaluation runs to the end and reports failures in catalog order.
#[test]
fn evaluation_is_fail_slow_and_ordered() {
    let mut page = fixture();
    page.elements.get_mut(".metric-card").unwrap().pop();
    set_text(&mut page, ".company-name", 0, "LeadSquare");
    page.elements.get_mut(".btn-save").unwrap()[0].disabled = false;

    let mismatches = evaluate(&scenario("iterative-refinement").catalog(), &page);
    let descriptions: Vec<&str> = mismatches.iter().map(|m| m.description.as_str()).collect();

    assert_eq!(
        descriptions,
        vec![
            "Company name is \"LeadSquare\", should be \"LeadSquared\" [.company-name]",
            "Found 2 metric cards, should be 3 [.metric-card]",
            "Save button disabled is false, should be true [.btn-save]",
        ]
    );
}

/// Evaluating the same catalog against the same page twice gives equal results.
#[test]
fn evaluation_is_idempotent() {
    let mut page = fixture();
    set_text(&mut page, ".metric-card .metric-value", 1, "5");
    page.elements.get_mut(".right-section").unwrap()[0].visible = false;

    let catalog = scenario("dashboard-content").catalog();
    let first = evaluate(&catalog, &page);
    let second = evaluate(&catalog, &page);

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
}

/// Displayed metric values are checked against 10/4/1 and tagged as data binding.
#[test]
fn metric_value_drift_is_a_data_binding_mismatch() {
    let mut page = fixture();
    set_text(&mut page, ".metric-card .metric-value", 0, "3");

    let mismatches = evaluate(&scenario("iterative-refinement").catalog(), &page);

    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].category, Category::DataBinding);
    assert_eq!(
        mismatches[0].description,
        "Prospect value is \"3\", should be \"10\" [.metric-card .metric-value]"
    );

    let suggestions = Advisor::default().suggest(&mismatches);
    assert_eq!(suggestions, vec!["Verify the metricCards array in dashboard.component.ts".to_string()]);
}

/// Color drift on several elements collapses to a single color hint.
#[test]
fn color_mismatches_share_one_hint() {
    let mut page = fixture();
    for selector in [".header", ".left-section", ".right-section"] {
        page.elements.get_mut(selector).unwrap()[0]
            .styles
            .insert("backgroundColor".to_string(), "rgb(0, 0, 0)".to_string());
    }

    let mismatches = evaluate(&scenario("target-comparison").catalog(), &page);
    assert_eq!(mismatches.len(), 3);
    assert!(mismatches.iter().all(|m| m.category == Category::Color));

    let suggestions = Advisor::default().suggest(&mismatches);
    assert_eq!(suggestions, vec!["Update color values in component CSS files".to_string()]);
}

/// A missing section reads as not visible rather than aborting evaluation.
#[test]
fn missing_element_is_recorded() {
    let mut page = fixture();
    page.elements.remove(".left-section");

    let catalog = Catalog::new()
        .with(Expectation::equals(".left-section", Probe::Visible, Expected::Bool(true)).unwrap())
        .with(
            Expectation::equals(".header", Probe::Box(Dimension::Height), Expected::Number(50.0))
                .unwrap(),
        );

    let mismatches = evaluate(&catalog, &page);
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].category, Category::Visibility);
    assert_eq!(
        mismatches[0].description,
        "Left section visibility is false, should be true [.left-section]"
    );
}
