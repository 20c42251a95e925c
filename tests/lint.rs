//! Integration tests for linting documents end to end

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use vacuum::model::reports::{create_report_statistics, VacuumReport};
use vacuum::model::{Rule, RuleResultSet, Severity};
use vacuum::motor::{
    apply_rules_to_rule_set, load_ignore_file, RuleSetExecution, RuleSetExecutionResult, CIRCULAR_REFERENCES,
    RESOLVING_REFERENCES,
};
use vacuum::output::{formatter_for, LintReport};
use vacuum::config::OutputFormat;
use vacuum::rulesets::{create_rule_set_from_data, DefaultRuleSetLoader, RuleSet, RuleSets};

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn burgershop() -> Vec<u8> {
    std::fs::read(fixtures_path().join("burgershop.openapi.yaml")).unwrap()
}

fn recommended() -> RuleSet {
    RuleSets::new().generate_openapi_recommended_rule_set()
}

fn lint(rule_set: RuleSet, spec: Vec<u8>) -> RuleSetExecutionResult {
    apply_rules_to_rule_set(&RuleSetExecution::new(rule_set, spec).with_jobs(4))
}

#[test]
fn test_recommended_rules_on_burgershop() {
    let outcome = lint(recommended(), burgershop());
    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
    assert!(!outcome.cancelled);
    assert_eq!(outcome.spec_info.as_ref().unwrap().version, "3.0.3");

    let contact = outcome
        .results
        .iter()
        .find(|r| r.rule_id == "info-contact")
        .expect("info-contact result");
    assert_eq!(contact.path, "$.info.contact");
    assert_eq!(contact.severity(), Severity::Warn);

    assert!(outcome.results.iter().any(|r| r.rule_id == "operation-tags"));
    assert!(outcome.results.iter().all(|r| r.rule_id != RESOLVING_REFERENCES));
    assert!(outcome.rule_timings.contains_key("info-contact"));
}

#[test]
fn test_results_are_deterministic() {
    let key = |outcome: &RuleSetExecutionResult| -> Vec<(String, String, usize, usize)> {
        outcome
            .results
            .iter()
            .map(|r| (r.rule_id.clone(), r.path.clone(), r.start_line(), r.start_column()))
            .collect()
    };
    let first = lint(recommended(), burgershop());
    let second = apply_rules_to_rule_set(&RuleSetExecution::new(recommended(), burgershop()).with_jobs(1));
    assert_eq!(key(&first), key(&second));

    let lines: Vec<usize> = first.results.iter().map(|r| r.start_line()).collect();
    let mut sorted = lines.clone();
    sorted.sort();
    assert_eq!(lines, sorted);
}

#[test]
fn test_rule_set_overrides() {
    let path = fixtures_path().join("rulesets/recommended-tweaks.yaml");
    let supplied = create_rule_set_from_data(&std::fs::read(&path).unwrap()).unwrap();
    let rule_set = RuleSets::new()
        .with_loader(Arc::new(DefaultRuleSetLoader::for_file(&path)))
        .generate_rule_set_from_supplied(&supplied)
        .unwrap();
    assert!(rule_set.rules.contains_key("paths-kebab-case"));
    assert!(!rule_set.rules.contains_key("operation-tags"));

    let outcome = lint(rule_set, burgershop());
    let contact = outcome.results.iter().find(|r| r.rule_id == "info-contact").unwrap();
    assert_eq!(contact.severity(), Severity::Error);
    assert!(outcome.results.iter().all(|r| r.rule_id != "operation-tags"));
    assert_eq!(outcome.result_set().exit_code(false), 2);
}

#[test]
fn test_ignore_file() {
    let ignored = load_ignore_file(&fixtures_path().join("ignore.yaml")).unwrap();
    let execution = RuleSetExecution::new(recommended(), burgershop()).with_ignored_items(ignored);
    let outcome = apply_rules_to_rule_set(&execution);
    assert!(outcome.results.iter().all(|r| r.rule_id != "info-contact"));
    assert_eq!(outcome.ignored_results.len(), 1);
    assert_eq!(outcome.ignored_results[0].path, "$.info.contact");
}

#[test]
fn test_reference_problems() {
    let spec = std::fs::read(fixtures_path().join("circular.openapi.yaml")).unwrap();
    let outcome = lint(RuleSet::default(), spec.clone());
    let ids: Vec<&str> = outcome.results.iter().map(|r| r.rule_id.as_str()).collect();
    assert!(ids.contains(&CIRCULAR_REFERENCES), "{:?}", ids);
    assert!(ids.contains(&RESOLVING_REFERENCES), "{:?}", ids);

    let skipped = apply_rules_to_rule_set(&RuleSetExecution::new(RuleSet::default(), spec).skip_circular_references());
    assert!(skipped.results.iter().all(|r| r.rule_id != CIRCULAR_REFERENCES));
    assert!(skipped.results.iter().any(|r| r.rule_id == RESOLVING_REFERENCES));
}

#[test]
fn test_report_round_trip() {
    let rule_set = recommended();
    let rules: HashMap<String, Arc<Rule>> = rule_set
        .rules
        .iter()
        .map(|(id, rule)| (id.clone(), Arc::new(rule.clone())))
        .collect();

    let outcome = lint(rule_set, burgershop());
    let result_set = outcome.result_set();
    let info = outcome.spec_info.clone().unwrap();
    let statistics = create_report_statistics(outcome.index.as_ref().unwrap(), &info, &result_set);
    assert!(statistics.overall_score <= 100);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("burgershop-report.json.gz");
    VacuumReport::new(info, Some(statistics), result_set.clone())
        .write_gzip(&path)
        .unwrap();

    let loaded = VacuumReport::load_file(&path, &rules).unwrap();
    assert_eq!(loaded.spec_info.version, "3.0.3");
    assert_eq!(loaded.result_set.len(), result_set.len());
    let contact = loaded
        .result_set
        .iter()
        .find(|r| r.rule_id == "info-contact")
        .unwrap();
    assert!(contact.rule.is_some());
    assert_eq!(contact.severity(), Severity::Warn);
    assert_eq!(loaded.result_set.get_warn_count(), result_set.get_warn_count());
}

#[test]
fn test_formatters() {
    let outcome = lint(recommended(), burgershop());
    let results: RuleResultSet = outcome.result_set();
    let report = LintReport::new("burgershop.openapi.yaml", &results);

    let text = formatter_for(OutputFormat::Text, false, true).format(&report).unwrap();
    assert!(text.contains("burgershop.openapi.yaml:"));
    assert!(text.contains("[info-contact]"));

    let spectral = formatter_for(OutputFormat::Spectral, false, false).format(&report).unwrap();
    let value: serde_json::Value = serde_json::from_str(&spectral).unwrap();
    assert_eq!(value.as_array().unwrap().len(), results.len());

    let junit = formatter_for(OutputFormat::Junit, false, false).format(&report).unwrap();
    assert!(junit.contains("<testsuites"));
    assert!(junit.contains("info-contact"));
}
