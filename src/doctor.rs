//! Model lookups over a document
//!
//! A doctor document answers two questions: which models start on a given
//! line, and at which paths does a given key/value pair appear. The node
//! backed implementation walks a document once and records every mapping
//! and sequence it meets. Shared subtrees in a resolved document are visited
//! once per place they appear, so one schema can have many paths.

use crate::jsonpath::{append_index, append_key};
use crate::node::{node_id, NodeKind, NodeRef, MAX_SEARCH_DEPTH};
use std::collections::HashMap;
use std::sync::Arc;

/// A located model
pub trait Foundational: Send + Sync {
    fn generate_json_path(&self) -> String;
    fn get_parent(&self) -> Option<Arc<dyn Foundational>>;
}

/// Model location services
pub trait DoctorDocument: Send + Sync {
    /// Models whose key (or item) starts on `line`
    fn locate_model_by_line(&self, line: usize) -> Vec<Arc<dyn Foundational>>;

    /// Every model whose value is `value`
    fn locate_models_by_key_and_value(
        &self,
        key: Option<&NodeRef>,
        value: &NodeRef,
    ) -> Vec<Arc<dyn Foundational>>;
}

#[derive(Debug)]
struct ModelEntry {
    path: String,
    line: usize,
    parent: Option<usize>,
}

#[derive(Debug)]
struct Models {
    entries: Vec<ModelEntry>,
    by_line: HashMap<usize, Vec<usize>>,
    by_node: HashMap<usize, Vec<usize>>,
    by_position: HashMap<(usize, usize), Vec<usize>>,
}

/// One model of a [`NodeDoctor`]
#[derive(Debug, Clone)]
pub struct DoctorModel {
    models: Arc<Models>,
    index: usize,
}

impl DoctorModel {
    pub fn line(&self) -> usize {
        self.models.entries[self.index].line
    }
}

impl Foundational for DoctorModel {
    fn generate_json_path(&self) -> String {
        self.models.entries[self.index].path.clone()
    }

    fn get_parent(&self) -> Option<Arc<dyn Foundational>> {
        self.models.entries[self.index].parent.map(|index| {
            Arc::new(DoctorModel {
                models: Arc::clone(&self.models),
                index,
            }) as Arc<dyn Foundational>
        })
    }
}

/// Doctor document built from a parsed (or resolved) document
#[derive(Debug, Clone)]
pub struct NodeDoctor {
    models: Arc<Models>,
}

struct Walker {
    entries: Vec<ModelEntry>,
    by_line: HashMap<usize, Vec<usize>>,
    by_node: HashMap<usize, Vec<usize>>,
    by_position: HashMap<(usize, usize), Vec<usize>>,
}

impl Walker {
    fn record(&mut self, path: String, line: usize, value: &NodeRef, parent: Option<usize>) -> usize {
        let index = self.entries.len();
        self.entries.push(ModelEntry { path, line, parent });
        self.by_line.entry(line).or_default().push(index);
        self.by_node.entry(node_id(value)).or_default().push(index);
        self.by_position
            .entry((value.line, value.column))
            .or_default()
            .push(index);
        index
    }

    fn walk(&mut self, node: &NodeRef, path: &str, parent: usize, depth: usize) {
        if depth > MAX_SEARCH_DEPTH {
            return;
        }
        match node.kind {
            NodeKind::Mapping => {
                for (key, value) in node.pairs() {
                    let value = resolve_alias(value);
                    if value.is_map() || value.is_seq() {
                        let child_path = append_key(path, &key.value);
                        let index = self.record(child_path.clone(), key.line, &value, Some(parent));
                        self.walk(&value, &child_path, index, depth + 1);
                    }
                }
            }
            NodeKind::Sequence => {
                for (i, item) in node.content.iter().enumerate() {
                    let item = resolve_alias(item);
                    if item.is_map() || item.is_seq() {
                        let child_path = append_index(path, i);
                        let index = self.record(child_path.clone(), item.line, &item, Some(parent));
                        self.walk(&item, &child_path, index, depth + 1);
                    }
                }
            }
            _ => {}
        }
    }
}

fn resolve_alias(node: &NodeRef) -> NodeRef {
    match (&node.kind, &node.alias) {
        (NodeKind::Alias, Some(target)) => resolve_alias(target),
        _ => Arc::clone(node),
    }
}

impl NodeDoctor {
    /// Walk `document` (a document node or its root mapping)
    pub fn new(document: &NodeRef) -> Self {
        let root = document.root().cloned().unwrap_or_else(|| Arc::clone(document));
        let mut walker = Walker {
            entries: Vec::new(),
            by_line: HashMap::new(),
            by_node: HashMap::new(),
            by_position: HashMap::new(),
        };
        let top = walker.record("$".to_string(), root.line.max(1), &root, None);
        walker.walk(&root, "$", top, 0);
        Self {
            models: Arc::new(Models {
                entries: walker.entries,
                by_line: walker.by_line,
                by_node: walker.by_node,
                by_position: walker.by_position,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.models.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.entries.is_empty()
    }

    fn wrap(&self, indexes: &[usize]) -> Vec<Arc<dyn Foundational>> {
        indexes
            .iter()
            .map(|&index| {
                Arc::new(DoctorModel {
                    models: Arc::clone(&self.models),
                    index,
                }) as Arc<dyn Foundational>
            })
            .collect()
    }
}

impl DoctorDocument for NodeDoctor {
    fn locate_model_by_line(&self, line: usize) -> Vec<Arc<dyn Foundational>> {
        self.models
            .by_line
            .get(&line)
            .map(|found| self.wrap(found))
            .unwrap_or_default()
    }

    fn locate_models_by_key_and_value(
        &self,
        _key: Option<&NodeRef>,
        value: &NodeRef,
    ) -> Vec<Arc<dyn Foundational>> {
        if let Some(found) = self.models.by_node.get(&node_id(value)) {
            return self.wrap(found);
        }
        self.models
            .by_position
            .get(&(value.line, value.column))
            .map(|found| self.wrap(found))
            .unwrap_or_default()
    }
}

/// Path of a model followed by the paths of all its ancestors
pub fn ancestor_paths(model: &Arc<dyn Foundational>) -> Vec<String> {
    let mut paths = vec![model.generate_json_path()];
    let mut current = model.get_parent();
    while let Some(parent) = current {
        paths.push(parent.generate_json_path());
        current = parent.get_parent();
    }
    paths
}
