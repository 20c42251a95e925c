//! Keep only results that touch changed regions of a document

use super::DocumentChanges;
use crate::doctor::{ancestor_paths, DoctorDocument};
use crate::model::RuleFunctionResult;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// What a filter pass removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterStats {
    pub total_results_before: usize,
    pub total_results_after: usize,
    pub results_dropped: usize,
    /// Rules that lost every result, sorted
    pub rules_fully_filtered: Vec<String>,
    /// Rules that lost some results, with the number dropped
    pub rules_partial_filtered: BTreeMap<String, usize>,
}

impl FilterStats {
    /// Share of results dropped, as a whole percentage
    pub fn dropped_percentage(&self) -> usize {
        if self.total_results_before == 0 {
            return 0;
        }
        self.results_dropped * 100 / self.total_results_before
    }
}

/// Lines and model paths changed in the new document
pub struct ChangeFilter {
    changed_lines: HashSet<usize>,
    changed_models: HashSet<String>,
    doctor: Option<Arc<dyn DoctorDocument>>,
}

impl ChangeFilter {
    /// Removed entities are not in the new document, so removals are skipped
    pub fn new(changes: Option<&DocumentChanges>, doctor: Option<Arc<dyn DoctorDocument>>) -> Self {
        let changed_lines: HashSet<usize> = changes
            .map(|changes| {
                changes
                    .all_changes()
                    .into_iter()
                    .filter(|c| !c.change_type.is_removal())
                    .filter_map(|c| c.new_line())
                    .collect()
            })
            .unwrap_or_default();

        let mut changed_models = HashSet::new();
        if let Some(doctor) = &doctor {
            for line in &changed_lines {
                for model in doctor.locate_model_by_line(*line) {
                    changed_models.extend(ancestor_paths(&model));
                }
            }
        }

        Self {
            changed_lines,
            changed_models,
            doctor,
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.changed_lines.is_empty() || !self.changed_models.is_empty()
    }

    pub fn changed_line_count(&self) -> usize {
        self.changed_lines.len()
    }

    pub fn changed_model_count(&self) -> usize {
        self.changed_models.len()
    }

    pub fn is_line_changed(&self, line: usize) -> bool {
        self.changed_lines.contains(&line)
    }

    /// Does `result` start in a changed model or on a changed line?
    pub fn is_in_changed_area(&self, result: &RuleFunctionResult) -> bool {
        if !self.has_changes() {
            return true;
        }
        let line = result.start_line();
        if let Some(doctor) = &self.doctor {
            let located = doctor
                .locate_model_by_line(line)
                .iter()
                .any(|model| self.changed_models.contains(&model.generate_json_path()));
            if located {
                return true;
            }
        }
        self.changed_lines.contains(&line)
    }

    pub fn filter_results(&self, results: Vec<RuleFunctionResult>) -> Vec<RuleFunctionResult> {
        self.filter_results_with_stats(results).0
    }

    pub fn filter_results_with_stats(
        &self,
        results: Vec<RuleFunctionResult>,
    ) -> (Vec<RuleFunctionResult>, FilterStats) {
        let mut stats = FilterStats {
            total_results_before: results.len(),
            ..Default::default()
        };
        let mut before: HashMap<String, usize> = HashMap::new();
        let mut after: HashMap<String, usize> = HashMap::new();

        let mut kept = Vec::with_capacity(results.len());
        for result in results {
            let rule_id = result.effective_rule_id().to_string();
            *before.entry(rule_id.clone()).or_default() += 1;
            if self.is_in_changed_area(&result) {
                *after.entry(rule_id).or_default() += 1;
                kept.push(result);
            }
        }

        stats.total_results_after = kept.len();
        stats.results_dropped = stats.total_results_before - stats.total_results_after;
        for (rule_id, count) in before {
            let remaining = after.get(&rule_id).copied().unwrap_or(0);
            let dropped = count - remaining;
            if dropped == 0 {
                continue;
            }
            if remaining == 0 {
                stats.rules_fully_filtered.push(rule_id);
            } else {
                stats.rules_partial_filtered.insert(rule_id, dropped);
            }
        }
        stats.rules_fully_filtered.sort();
        (kept, stats)
    }
}
