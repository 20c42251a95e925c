//! Reference resolver
//!
//! Builds a copy of the document where every locatable `$ref` mapping is
//! replaced by its target. The source tree is never touched. Loops are cut
//! where they close: the closing `$ref` stays in place and the loop is
//! recorded. A mapping with both an anchor and a `$ref` is replaced by the
//! target like any other.

use crate::index::{
    CircularReferenceResult, Reference, ReferenceKind, SpecIndex,
};
use crate::jsonpath::{append_index, append_key};
use crate::node::{deep_copy, Node, NodeKind, NodeRef, MAX_SEARCH_DEPTH};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// A reference the resolver could not stitch in
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ResolvingError {
    pub message: String,
    pub node: Option<NodeRef>,
    pub path: String,
    /// Raised by a loop rather than a missing target
    pub circular: bool,
}

/// Resolves the document held by an index
pub struct Resolver<'a> {
    index: &'a SpecIndex,
    resolved: HashMap<String, NodeRef>,
    errors: Vec<ResolvingError>,
    circular: Vec<CircularReferenceResult>,
    reported_loops: HashSet<String>,
    reported_missing: HashSet<String>,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a SpecIndex) -> Self {
        Self {
            index,
            resolved: HashMap::new(),
            errors: Vec::new(),
            circular: Vec::new(),
            reported_loops: HashSet::new(),
            reported_missing: HashSet::new(),
        }
    }

    /// Produce the resolved document. An index without a document yields an
    /// empty document node.
    pub fn resolve(&mut self) -> NodeRef {
        let Some(root) = self.index.root().cloned() else {
            return Node::new(NodeKind::Document).with_position(1, 1).into_ref();
        };
        let mut journey = Vec::new();
        let resolved_root = self.rebuild(&root, "$", &mut journey, 0);
        let mut document = Node::new(NodeKind::Document).with_position(1, 1);
        if let Some(original) = self.index.document() {
            document.line = original.line;
            document.column = original.column;
        }
        debug!(
            "resolved {} references, {} loops, {} errors",
            self.resolved.len(),
            self.circular.len(),
            self.errors.len()
        );
        document.with_content(vec![resolved_root]).into_ref()
    }

    pub fn errors(&self) -> &[ResolvingError] {
        &self.errors
    }

    pub fn circular_references(&self) -> &[CircularReferenceResult] {
        &self.circular
    }

    fn rebuild(
        &mut self,
        node: &NodeRef,
        path: &str,
        journey: &mut Vec<(String, NodeRef)>,
        depth: usize,
    ) -> NodeRef {
        if depth > MAX_SEARCH_DEPTH {
            return Arc::clone(node);
        }
        match node.kind {
            NodeKind::Mapping => {
                if let Some(target) = node.get("$ref").filter(|r| r.is_string()) {
                    let definition = target.value.clone();
                    return self.substitute(node, &definition, path, journey, depth);
                }
                let mut content = Vec::with_capacity(node.content.len());
                let mut changed = false;
                for (key, value) in node.pairs() {
                    let child = self.rebuild(value, &append_key(path, &key.value), journey, depth + 1);
                    changed |= !Arc::ptr_eq(&child, value);
                    content.push(Arc::clone(key));
                    content.push(child);
                }
                if changed {
                    rebuilt(node, content)
                } else {
                    Arc::clone(node)
                }
            }
            NodeKind::Sequence => {
                let mut changed = false;
                let content: Vec<NodeRef> = node
                    .content
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let child = self.rebuild(item, &append_index(path, i), journey, depth + 1);
                        changed |= !Arc::ptr_eq(&child, item);
                        child
                    })
                    .collect();
                if changed {
                    rebuilt(node, content)
                } else {
                    Arc::clone(node)
                }
            }
            _ => Arc::clone(node),
        }
    }

    fn substitute(
        &mut self,
        node: &NodeRef,
        definition: &str,
        path: &str,
        journey: &mut Vec<(String, NodeRef)>,
        depth: usize,
    ) -> NodeRef {
        if let Some(pos) = journey.iter().position(|(d, _)| d == definition) {
            self.record_loop(journey, pos, node, path);
            return Arc::clone(node);
        }
        if let Some(done) = self.resolved.get(definition) {
            return Arc::clone(done);
        }
        let Some(target) = self
            .index
            .mapped_refs()
            .get(definition)
            .and_then(|r| r.node.clone())
        else {
            if self.reported_missing.insert(definition.to_string()) {
                self.errors.push(ResolvingError {
                    message: format!("unable to resolve reference '{}'", definition),
                    node: Some(Arc::clone(node)),
                    path: path.to_string(),
                    circular: false,
                });
            }
            return Arc::clone(node);
        };

        let result = if ReferenceKind::of(definition) == ReferenceKind::Local {
            journey.push((definition.to_string(), Arc::clone(&target)));
            let rebuilt = self.rebuild(&target, path, journey, depth + 1);
            journey.pop();
            rebuilt
        } else {
            deep_copy(&target)
        };
        self.resolved
            .insert(definition.to_string(), Arc::clone(&result));
        result
    }

    fn record_loop(
        &mut self,
        journey: &[(String, NodeRef)],
        pos: usize,
        closing: &NodeRef,
        path: &str,
    ) {
        let (definition, _) = &journey[pos];
        if !self.reported_loops.insert(definition.clone()) {
            return;
        }
        let mut steps: Vec<Reference> = journey
            .iter()
            .map(|(d, n)| Reference::new(d.clone(), Some(Arc::clone(n))))
            .collect();
        let mut loop_point = steps[pos].clone();
        loop_point.circular = true;
        loop_point.path = path.to_string();
        steps.push(loop_point.clone());
        let journey_string = steps
            .iter()
            .enumerate()
            .map(|(i, r)| {
                if i == pos {
                    format!("** {} **", r.name)
                } else {
                    r.name.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" --> ");
        self.errors.push(ResolvingError {
            message: format!("circular reference detected: {}", steps[0].name),
            node: Some(Arc::clone(closing)),
            path: path.to_string(),
            circular: true,
        });
        self.circular.push(CircularReferenceResult {
            start: steps[0].clone(),
            journey_string,
            loop_index: pos,
            loop_point,
            parent_node: Some(Arc::clone(closing)),
            journey: steps,
        });
    }
}

fn rebuilt(original: &NodeRef, content: Vec<NodeRef>) -> NodeRef {
    let mut copy = Node {
        content: Vec::new(),
        alias: None,
        ..(**original).clone()
    };
    copy.content = content;
    copy.into_ref()
}

/// Resolve the document held by `index`, returning the new document and any
/// resolving errors
pub fn resolve_document(index: &SpecIndex) -> (NodeRef, Vec<ResolvingError>) {
    let mut resolver = Resolver::new(index);
    let document = resolver.resolve();
    (document, resolver.errors().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexConfig;
    use crate::node::parse_document;

    fn index(src: &str) -> SpecIndex {
        SpecIndex::new(&parse_document(src).unwrap(), IndexConfig::default())
    }

    #[test]
    fn test_resolves_local_refs() {
        let idx = index(
            "paths:\n  /a:\n    get:\n      responses:\n        '200':\n          schema:\n            $ref: '#/definitions/Pet'\ndefinitions:\n  Pet:\n    type: object\n    properties:\n      tag:\n        $ref: '#/definitions/Tag'\n  Tag:\n    type: string\n",
        );
        let mut resolver = Resolver::new(&idx);
        let doc = resolver.resolve();
        assert!(resolver.errors().is_empty());

        let root = doc.root().unwrap();
        let schema = root.get("paths").unwrap().get("/a").unwrap().get("get").unwrap()
            .get("responses").unwrap().get("200").unwrap().get("schema").unwrap();
        assert_eq!(schema.get_str("type"), Some("object"));
        let tag = schema.get("properties").unwrap().get("tag").unwrap();
        assert_eq!(tag.get_str("type"), Some("string"));

        // the source tree keeps its $ref
        let original = idx.root().unwrap().get("paths").unwrap().get("/a").unwrap()
            .get("get").unwrap().get("responses").unwrap().get("200").unwrap()
            .get("schema").unwrap();
        assert!(original.has_key("$ref"));
    }

    #[test]
    fn test_loops_are_cut_and_recorded() {
        let idx = index(
            "components:\n  schemas:\n    A:\n      properties:\n        b:\n          $ref: '#/components/schemas/B'\n    B:\n      properties:\n        a:\n          $ref: '#/components/schemas/A'\n",
        );
        let mut resolver = Resolver::new(&idx);
        let doc = resolver.resolve();
        assert_eq!(resolver.circular_references().len(), 1);
        assert!(resolver.errors().iter().all(|e| e.circular));

        let a = doc.root().unwrap().get("components").unwrap().get("schemas").unwrap().get("A").unwrap();
        let b = a.get("properties").unwrap().get("b").unwrap();
        assert!(b.has_key("properties"));
        let back = b.get("properties").unwrap().get("a").unwrap();
        let closing = back.get("properties").unwrap().get("b").unwrap();
        assert!(closing.has_key("$ref"));
    }

    #[test]
    fn test_missing_ref_is_left_in_place() {
        let idx = index("components:\n  schemas:\n    A:\n      $ref: '#/components/schemas/Nope'\n");
        let (doc, errors) = resolve_document(&idx);
        assert_eq!(errors.len(), 1);
        assert!(!errors[0].circular);
        assert_eq!(errors[0].path, "$.components.schemas.A");
        let a = doc.root().unwrap().get("components").unwrap().get("schemas").unwrap().get("A").unwrap();
        assert!(a.has_key("$ref"));
    }

    #[test]
    fn test_empty_index_resolves_to_empty_document() {
        let idx = SpecIndex::empty();
        let (doc, errors) = resolve_document(&idx);
        assert!(doc.is_document());
        assert!(doc.root().is_none());
        assert!(errors.is_empty());
    }
}
