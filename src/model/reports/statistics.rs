//! Document and result statistics

use crate::index::SpecIndex;
use crate::model::category::RuleCategoryRegistry;
use crate::model::result::RuleResultSet;
use crate::spec_info::SpecInfo;
use serde::{Deserialize, Serialize};

/// Issue counts for one category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStatistic {
    pub category_name: String,
    pub category_id: String,
    pub num_issues: usize,
    pub score: i32,
    pub warnings: usize,
    pub errors: usize,
    pub info: usize,
    pub hints: usize,
}

/// Statistics for a single document and its results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatistics {
    pub filesize_kb: usize,
    pub filesize_bytes: usize,
    pub spec_type: String,
    pub spec_format: String,
    pub version: String,
    pub references: usize,
    pub external_docs: usize,
    pub schemas: usize,
    pub parameters: i64,
    pub links: usize,
    pub paths: i64,
    pub operations: i64,
    pub tags: i64,
    pub examples: usize,
    pub enums: usize,
    pub security: usize,
    pub overall_score: i32,
    #[serde(default)]
    pub total_errors: usize,
    #[serde(default)]
    pub total_warnings: usize,
    #[serde(default)]
    pub total_info: usize,
    pub category_statistics: Vec<CategoryStatistic>,
}

/// Score between 10 and 100. Errors weigh 15, warnings 0.3, info 0.1.
/// A warning-only set never drops below 25; each `oas3-schema` result takes
/// a further 90.
pub fn calculate_quality_score(results: &RuleResultSet) -> i32 {
    let mut score = 100.0
        - results.get_info_count() as f64 * 0.1
        - results.get_warn_count() as f64 * 0.3
        - results.get_error_count() as f64 * 15.0;
    if results.get_error_count() == 0 && score < 0.0 {
        score = 25.0;
    }
    let schema_failures = results
        .iter()
        .filter(|r| r.rule.as_ref().is_some_and(|rule| rule.id == "oas3-schema"))
        .count();
    score -= 90.0 * schema_failures as f64;
    if score <= 0.0 {
        score = 10.0;
    }
    score as i32
}

/// Build the statistics block of a report
pub fn create_report_statistics(
    index: &SpecIndex,
    info: &SpecInfo,
    results: &RuleResultSet,
) -> ReportStatistics {
    let registry = RuleCategoryRegistry::new();
    let total = results.len();
    let category_statistics = registry
        .ordered()
        .into_iter()
        .map(|category| {
            let num_issues = results.get_results_by_rule_category(&category.id).len();
            let score = if total == 0 {
                100
            } else {
                100 - (num_issues * 100 / total) as i32
            };
            CategoryStatistic {
                category_name: category.name.clone(),
                category_id: category.id.clone(),
                num_issues,
                score,
                warnings: results.get_warnings_by_rule_category(&category.id).len(),
                errors: results.get_errors_by_rule_category(&category.id).len(),
                info: results.get_info_by_rule_category(&category.id).len(),
                hints: results.get_hints_by_rule_category(&category.id).len(),
            }
        })
        .collect();

    let bytes = info.spec_bytes().len();
    let link_count = index
        .links()
        .values()
        .flat_map(|methods| methods.values())
        .map(Vec::len)
        .sum::<usize>()
        + index.component_links().len();

    ReportStatistics {
        filesize_kb: bytes / 1024,
        filesize_bytes: bytes,
        spec_type: info.spec_type.clone(),
        spec_format: info.format().map(|f| f.to_string()).unwrap_or_default(),
        version: info.version.clone(),
        references: index.mapped_refs().len(),
        external_docs: index.external_documents().len(),
        schemas: index.all_schemas().len(),
        parameters: index.get_operations_parameter_count() + index.get_component_parameter_count(),
        links: link_count,
        paths: index.get_path_count(),
        operations: index.get_operation_count(),
        tags: index.get_total_tags_count(),
        examples: index.all_examples().len(),
        enums: index.all_enums().len(),
        security: index.security_schemes().len(),
        overall_score: calculate_quality_score(results),
        total_errors: results.get_error_count(),
        total_warnings: results.get_warn_count(),
        total_info: results.get_info_count(),
        category_statistics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexConfig;
    use crate::model::result::RuleFunctionResult;
    use crate::model::rule::{Rule, Severity};
    use crate::spec_info::extract_spec_info;
    use std::sync::Arc;

    fn results(ids: &[(&str, Severity)]) -> RuleResultSet {
        RuleResultSet::new(
            ids.iter()
                .map(|(id, sev)| {
                    let rule = Arc::new(Rule::new(id).with_severity(*sev).with_category("schemas"));
                    RuleFunctionResult::new("m").with_rule(&rule)
                })
                .collect(),
        )
    }

    #[test]
    fn test_quality_score() {
        assert_eq!(calculate_quality_score(&RuleResultSet::default()), 100);
        assert_eq!(
            calculate_quality_score(&results(&[("a", Severity::Error), ("b", Severity::Warn)])),
            84
        );
        let warnings: Vec<(&str, Severity)> = (0..400).map(|_| ("w", Severity::Warn)).collect();
        assert_eq!(calculate_quality_score(&results(&warnings)), 25);
        assert_eq!(
            calculate_quality_score(&results(&[("oas3-schema", Severity::Error)])),
            10
        );
    }

    #[test]
    fn test_report_statistics() {
        let info = extract_spec_info(
            b"openapi: 3.0.1\npaths:\n  /a:\n    get:\n      tags: [x]\ntags:\n  - name: x\n",
        )
        .unwrap();
        let root = info.root_node.clone().unwrap();
        let index = SpecIndex::new(&root, IndexConfig::default());
        let set = results(&[("a", Severity::Warn)]);
        let stats = create_report_statistics(&index, &info, &set);
        assert_eq!(stats.spec_format, "oas3");
        assert_eq!(stats.paths, 1);
        assert_eq!(stats.operations, 1);
        let registry = RuleCategoryRegistry::new();
        let expected: Vec<&str> = registry.ordered().iter().map(|c| c.id.as_str()).collect();
        let ids: Vec<&str> = stats.category_statistics.iter().map(|c| c.category_id.as_str()).collect();
        assert_eq!(ids, expected);
        assert!(ids.contains(&"owasp"));
        let schemas = stats
            .category_statistics
            .iter()
            .find(|c| c.category_id == "schemas")
            .unwrap();
        assert_eq!(schemas.num_issues, 1);
        assert_eq!(schemas.score, 0);
        assert_eq!(schemas.warnings, 1);
    }
}
