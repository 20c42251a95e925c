//! Rule results and the result set

use super::category::CATEGORY_ALL;
use super::rule::{Rule, Severity};
use crate::node::{end_node, NodeRef};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 1-based line and column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// Where a result came from when the document was assembled from several
/// sources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    pub line: usize,
    pub column: usize,
    pub absolute_location: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A single violation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleFunctionResult {
    pub message: String,
    #[serde(default)]
    pub range: Range,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub rule_id: String,
    #[serde(default)]
    pub rule_severity: Severity,
    #[serde(skip)]
    pub rule: Option<Arc<Rule>>,
    #[serde(skip)]
    pub start_node: Option<NodeRef>,
    #[serde(skip)]
    pub end_node: Option<NodeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    /// Other locations of the same defect
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_fixed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

const POOL_LIMIT: usize = 256;

thread_local! {
    static RESULT_POOL: RefCell<Vec<RuleFunctionResult>> = const { RefCell::new(Vec::new()) };
}

impl RuleFunctionResult {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Take a cleared result from this thread's pool
    pub fn pooled() -> Self {
        RESULT_POOL
            .with(|pool| pool.borrow_mut().pop())
            .unwrap_or_default()
    }

    /// Hand a result back to this thread's pool
    pub fn recycle(mut self) {
        self.message.clear();
        self.path.clear();
        self.rule_id.clear();
        self.paths.clear();
        self.rule = None;
        self.start_node = None;
        self.end_node = None;
        self.origin = None;
        self.range = Range::default();
        self.rule_severity = Severity::default();
        self.auto_fixed = false;
        self.timestamp = None;
        RESULT_POOL.with(|pool| {
            let mut pool = pool.borrow_mut();
            if pool.len() < POOL_LIMIT {
                pool.push(self);
            }
        });
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Anchor at `node`, ending where its rendering ends
    pub fn with_node(mut self, node: &NodeRef) -> Self {
        self.end_node = Some(end_node(node));
        self.start_node = Some(Arc::clone(node));
        self
    }

    pub fn with_nodes(mut self, start: &NodeRef, end: &NodeRef) -> Self {
        self.start_node = Some(Arc::clone(start));
        self.end_node = Some(Arc::clone(end));
        self
    }

    pub fn with_rule(mut self, rule: &Arc<Rule>) -> Self {
        self.rule_id = rule.id.clone();
        self.rule_severity = rule.severity;
        self.rule = Some(Arc::clone(rule));
        self
    }

    pub fn with_paths(mut self, paths: Vec<String>) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn start_line(&self) -> usize {
        match &self.start_node {
            Some(node) => node.line,
            None => self
                .origin
                .as_ref()
                .map(|o| o.line)
                .unwrap_or(self.range.start.line),
        }
    }

    pub fn start_column(&self) -> usize {
        match &self.start_node {
            Some(node) => node.column,
            None => self
                .origin
                .as_ref()
                .map(|o| o.column)
                .unwrap_or(self.range.start.character),
        }
    }

    /// Severity of the attached rule, or the flattened copy
    pub fn severity(&self) -> Severity {
        self.rule
            .as_ref()
            .map(|r| r.severity)
            .unwrap_or(self.rule_severity)
    }

    pub fn category_id(&self) -> Option<&str> {
        self.rule
            .as_ref()
            .and_then(|r| r.category.as_ref())
            .map(|c| c.id.as_str())
    }

    pub fn effective_rule_id(&self) -> &str {
        match &self.rule {
            Some(rule) if self.rule_id.is_empty() => &rule.id,
            _ => &self.rule_id,
        }
    }

    /// Fill `range`, `rule_id` and `rule_severity` from the nodes and rule.
    /// Without nodes a range read back from a report is kept as it is.
    pub fn prepare_for_serialization(&mut self) {
        let has_nodes = self.start_node.is_some() || self.end_node.is_some();
        if has_nodes || self.range == Range::default() {
            self.range = self.range_from_nodes();
        }
        if let Some(rule) = &self.rule {
            self.rule_id = rule.id.clone();
            self.rule_severity = rule.severity;
        }
    }

    fn range_from_nodes(&self) -> Range {
        let start = match &self.start_node {
            Some(node) => Position {
                line: node.line.max(1),
                character: node.column,
            },
            None => Position {
                line: self.start_line().max(1),
                character: self.start_column(),
            },
        };
        let mut end = match &self.end_node {
            Some(node) => Position {
                line: node.line,
                character: node.column,
            },
            None => start,
        };
        if end.line < start.line {
            end = start;
        }
        Range { start, end }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SeverityCounts {
    errors: usize,
    warnings: usize,
    info: usize,
    hints: usize,
}

fn count_severities<'a>(results: impl Iterator<Item = &'a RuleFunctionResult>) -> SeverityCounts {
    let mut counts = SeverityCounts::default();
    for result in results {
        match result.severity() {
            Severity::Error => counts.errors += 1,
            Severity::Warn => counts.warnings += 1,
            Severity::Info => counts.info += 1,
            Severity::Hint => counts.hints += 1,
        }
    }
    counts
}

/// All results of one rule inside a category
#[derive(Debug, Clone)]
pub struct RuleCategoryResult<'a> {
    pub rule: Option<Arc<Rule>>,
    pub rule_id: String,
    pub results: Vec<&'a RuleFunctionResult>,
    /// Results seen before any limit was applied
    pub seen: usize,
    pub health: i32,
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
    pub hints: usize,
    pub truncated: bool,
}

/// Health score: 100 minus the weighted penalty, 0 once the penalty
/// reaches 100
pub fn health_score(errors: usize, warnings: usize, info: usize) -> i32 {
    let total = errors as f64 * 10.0 + warnings as f64 * 0.5 + info as f64 * 0.01;
    if total >= 100.0 {
        0
    } else {
        100 - total.round_ties_even() as i32
    }
}

/// The results of a lint run
#[derive(Debug, Default)]
pub struct RuleResultSet {
    results: Vec<RuleFunctionResult>,
    counts: OnceCell<SeverityCounts>,
    by_category: Mutex<HashMap<String, Vec<usize>>>,
}

impl Clone for RuleResultSet {
    fn clone(&self) -> Self {
        Self::new(self.results.clone())
    }
}

impl RuleResultSet {
    pub fn new(results: Vec<RuleFunctionResult>) -> Self {
        Self {
            results,
            counts: OnceCell::new(),
            by_category: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn results(&self) -> &[RuleFunctionResult] {
        &self.results
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RuleFunctionResult> {
        self.results.iter()
    }

    /// Mutable access; memoized counts are dropped first
    pub fn results_mut(&mut self) -> &mut [RuleFunctionResult] {
        self.invalidate();
        &mut self.results
    }

    pub fn into_results(self) -> Vec<RuleFunctionResult> {
        self.results
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    fn counts(&self) -> SeverityCounts {
        *self.counts.get_or_init(|| count_severities(self.results.iter()))
    }

    fn invalidate(&mut self) {
        self.counts = OnceCell::new();
        if let Ok(map) = self.by_category.get_mut() {
            map.clear();
        }
    }

    pub fn get_error_count(&self) -> usize {
        self.counts().errors
    }

    pub fn get_warn_count(&self) -> usize {
        self.counts().warnings
    }

    pub fn get_info_count(&self) -> usize {
        self.counts().info
    }

    pub fn get_hint_count(&self) -> usize {
        self.counts().hints
    }

    /// 0 when clean, 1 for warnings when `fail_on_warn`, 2 for errors
    pub fn exit_code(&self, fail_on_warn: bool) -> i32 {
        if self.get_error_count() > 0 {
            2
        } else if fail_on_warn && self.get_warn_count() > 0 {
            1
        } else {
            0
        }
    }

    fn category_indices(&self, category: &str) -> Vec<usize> {
        if let Ok(memo) = self.by_category.lock() {
            if let Some(found) = memo.get(category) {
                return found.clone();
            }
        }
        let indices: Vec<usize> = self
            .results
            .iter()
            .enumerate()
            .filter(|(_, r)| match r.category_id() {
                Some(id) => category == CATEGORY_ALL || id == category,
                None => false,
            })
            .map(|(i, _)| i)
            .collect();
        if !indices.is_empty() {
            if let Ok(mut memo) = self.by_category.lock() {
                memo.insert(category.to_string(), indices.clone());
            }
        }
        indices
    }

    /// Results whose rule is in `category`; `all` returns every categorised
    /// result
    pub fn get_results_by_rule_category(&self, category: &str) -> Vec<&RuleFunctionResult> {
        self.category_indices(category)
            .into_iter()
            .map(|i| &self.results[i])
            .collect()
    }

    fn by_category_and_severity(&self, category: &str, severity: Severity) -> Vec<&RuleFunctionResult> {
        self.get_results_by_rule_category(category)
            .into_iter()
            .filter(|r| r.severity() == severity)
            .collect()
    }

    pub fn get_errors_by_rule_category(&self, category: &str) -> Vec<&RuleFunctionResult> {
        self.by_category_and_severity(category, Severity::Error)
    }

    pub fn get_warnings_by_rule_category(&self, category: &str) -> Vec<&RuleFunctionResult> {
        self.by_category_and_severity(category, Severity::Warn)
    }

    pub fn get_info_by_rule_category(&self, category: &str) -> Vec<&RuleFunctionResult> {
        self.by_category_and_severity(category, Severity::Info)
    }

    pub fn get_hints_by_rule_category(&self, category: &str) -> Vec<&RuleFunctionResult> {
        self.by_category_and_severity(category, Severity::Hint)
    }

    pub fn get_results_by_rule_id(&self, rule_id: &str) -> Vec<&RuleFunctionResult> {
        self.results
            .iter()
            .filter(|r| r.effective_rule_id() == rule_id)
            .collect()
    }

    pub fn get_rule_result_count(&self, rule_id: &str) -> usize {
        self.get_results_by_rule_id(rule_id).len()
    }

    /// Health of a category, see [`health_score`]
    pub fn calculate_category_health(&self, category: &str) -> i32 {
        let counts = count_severities(self.get_results_by_rule_category(category).into_iter());
        health_score(counts.errors, counts.warnings, counts.info)
    }

    /// Results of a category grouped by rule, in first-seen order
    pub fn get_rule_results_for_category(&self, category: &str) -> Vec<RuleCategoryResult<'_>> {
        self.get_rule_results_for_category_with_limit(category, 0)
    }

    /// As [`Self::get_rule_results_for_category`], keeping at most `limit`
    /// results per rule (0 keeps all)
    pub fn get_rule_results_for_category_with_limit(
        &self,
        category: &str,
        limit: usize,
    ) -> Vec<RuleCategoryResult<'_>> {
        let mut groups: Vec<RuleCategoryResult<'_>> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for result in self.get_results_by_rule_category(category) {
            let id = result.effective_rule_id().to_string();
            let slot = *positions.entry(id.clone()).or_insert_with(|| {
                groups.push(RuleCategoryResult {
                    rule: result.rule.clone(),
                    rule_id: id,
                    results: Vec::new(),
                    seen: 0,
                    health: 100,
                    errors: 0,
                    warnings: 0,
                    info: 0,
                    hints: 0,
                    truncated: false,
                });
                groups.len() - 1
            });
            let group = &mut groups[slot];
            group.seen += 1;
            match result.severity() {
                Severity::Error => group.errors += 1,
                Severity::Warn => group.warnings += 1,
                Severity::Info => group.info += 1,
                Severity::Hint => group.hints += 1,
            }
            if limit > 0 && group.results.len() >= limit {
                group.truncated = true;
            } else {
                group.results.push(result);
            }
        }
        for group in &mut groups {
            group.health = health_score(group.errors, group.warnings, group.info);
        }
        groups
    }

    /// Stable sort by start line, then rule id
    pub fn sort_results_by_line_number(&mut self) {
        self.results.sort_by(|a, b| {
            a.start_line()
                .cmp(&b.start_line())
                .then_with(|| a.effective_rule_id().cmp(b.effective_rule_id()))
        });
        self.invalidate();
    }

    /// Compute ranges and flatten rule ids and severities, one task per
    /// result
    pub fn prepare_for_serialization(&mut self) {
        self.results
            .par_iter_mut()
            .for_each(RuleFunctionResult::prepare_for_serialization);
    }

    /// Keep only results accepted by `keep`
    pub fn retain<F: FnMut(&RuleFunctionResult) -> bool>(&mut self, keep: F) {
        self.results.retain(keep);
        self.invalidate();
    }

    pub fn push(&mut self, result: RuleFunctionResult) {
        self.results.push(result);
        self.invalidate();
    }

    /// Re-attach rules by id after loading from disk
    pub fn attach_rules(&mut self, rules: &HashMap<String, Arc<Rule>>) {
        for result in &mut self.results {
            if result.rule.is_none() {
                result.rule = rules.get(&result.rule_id).cloned();
            }
        }
        self.invalidate();
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetOut<'a> {
    results: &'a [RuleFunctionResult],
    warning_count: usize,
    error_count: usize,
    info_count: usize,
}

#[derive(Deserialize)]
struct ResultSetIn {
    #[serde(default)]
    results: Vec<RuleFunctionResult>,
}

impl Serialize for RuleResultSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ResultSetOut {
            results: &self.results,
            warning_count: self.get_warn_count(),
            error_count: self.get_error_count(),
            info_count: self.get_info_count(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RuleResultSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(RuleResultSet::new(ResultSetIn::deserialize(deserializer)?.results))
    }
}
