//! Integration tests for diff reports: change filtering and change violations

use std::path::PathBuf;
use std::sync::Arc;
use vacuum::changes::{
    generate_change_violations, ChangeFilter, ChangeViolationOptions, DocumentChanges, API_CHANGE,
    BREAKING_CHANGE,
};
use vacuum::doctor::{DoctorDocument, NodeDoctor};
use vacuum::model::{RuleFunctionResult, Severity};
use vacuum::node::{parse_document, Node};

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn diff() -> DocumentChanges {
    DocumentChanges::load(&fixtures_path().join("changes/burgershop-diff.json")).unwrap()
}

fn result_at(rule_id: &str, line: usize) -> RuleFunctionResult {
    let node = Node::string("x").with_position(line, 1).into_ref();
    let mut result = RuleFunctionResult::new(format!("line {}", line)).with_node(&node);
    result.rule_id = rule_id.to_string();
    result
}

#[test]
fn test_load_diff_report() {
    let changes = diff();
    let stats = changes.stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.added, 1);
    assert_eq!(stats.modified, 1);
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.breaking, 1);
    assert_eq!(changes.total_breaking_changes(), 1);
}

#[test]
fn test_filter_to_changed_regions() {
    let text = std::fs::read_to_string(fixtures_path().join("burgershop.openapi.yaml")).unwrap();
    let document = parse_document(&text).unwrap();
    let doctor: Arc<dyn DoctorDocument> = Arc::new(NodeDoctor::new(&document));
    let changes = diff();
    let filter = ChangeFilter::new(Some(&changes), Some(doctor));
    assert!(filter.has_changes());
    // the removal has no line in the new document
    assert_eq!(filter.changed_line_count(), 2);

    let (kept, stats) = filter.filter_results_with_stats(vec![
        result_at("title", 3),
        result_at("info", 4),
        result_at("paths", 17),
        result_at("post", 19),
        result_at("dressings", 71),
        result_at("dressings", 72),
    ]);
    let lines: Vec<usize> = kept.iter().map(|r| r.start_line()).collect();
    assert_eq!(lines, vec![3, 17, 71, 72]);
    assert_eq!(stats.results_dropped, 2);
    assert_eq!(stats.rules_fully_filtered, vec!["info".to_string(), "post".to_string()]);
}

#[test]
fn test_changes_as_violations() {
    let options = ChangeViolationOptions {
        warn_on_changes: true,
        error_on_breaking: true,
    };
    let results = generate_change_violations(&diff(), options);
    assert_eq!(results.len(), 3);

    let breaking: Vec<_> = results.iter().filter(|r| r.rule_id == BREAKING_CHANGE).collect();
    assert_eq!(breaking.len(), 1);
    assert_eq!(breaking[0].severity(), Severity::Error);
    assert_eq!(
        breaking[0].message,
        "Breaking change: object removed 'tags' (was: 'Dressing')"
    );
    assert_eq!(breaking[0].path, "$.paths['/burgers/{burgerId}/dressings'].get.tags");
    assert_eq!(breaking[0].start_line(), 90);

    let api: Vec<_> = results.iter().filter(|r| r.rule_id == API_CHANGE).collect();
    assert_eq!(api.len(), 2);
    assert_eq!(
        api[0].message,
        "API change: modified 'title' changed from 'Burger Store' to 'Burger Shop'"
    );
    assert_eq!(api[1].message, "API change: object added 'get'");
}
