//! References, JSON pointers and schema cycle detection

use crate::jsonpath::append_key;
use crate::node::{NodeKind, NodeRef};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// How a `$ref` value is located
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `#/components/...`
    Local,
    /// `https://...`
    Http,
    /// `./pet.yaml#/Pet`
    File,
    Unknown,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Local => write!(f, "local"),
            ReferenceKind::Http => write!(f, "http"),
            ReferenceKind::File => write!(f, "file"),
            ReferenceKind::Unknown => write!(f, "unknown"),
        }
    }
}

impl ReferenceKind {
    pub fn of(definition: &str) -> Self {
        if definition.starts_with('#') {
            ReferenceKind::Local
        } else if definition.starts_with("http:") || definition.starts_with("https:") {
            ReferenceKind::Http
        } else if definition.contains(".json")
            || definition.contains(".yaml")
            || definition.contains(".yml")
        {
            ReferenceKind::File
        } else {
            ReferenceKind::Unknown
        }
    }
}

/// A `$ref` found in a document, or a component it points at
#[derive(Debug, Clone, Default)]
pub struct Reference {
    /// Raw pointer, e.g. `#/components/schemas/Pet`
    pub definition: String,
    /// Last pointer segment
    pub name: String,
    /// Located target, or the mapping holding the `$ref`
    pub node: Option<NodeRef>,
    /// The `$ref` key (or the key naming a component)
    pub key_node: Option<NodeRef>,
    /// JSONPath of the place this reference was found
    pub path: String,
    /// Outgoing edges, by definition
    pub relations: Vec<String>,
    pub resolved: bool,
    pub circular: bool,
    pub seen: bool,
}

impl Reference {
    pub fn new(definition: impl Into<String>, node: Option<NodeRef>) -> Self {
        let definition = definition.into();
        Self {
            name: reference_name(&definition).to_string(),
            definition,
            node,
            ..Default::default()
        }
    }

    pub fn with_key_node(mut self, key: NodeRef) -> Self {
        self.key_node = Some(key);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn kind(&self) -> ReferenceKind {
        ReferenceKind::of(&self.definition)
    }

    /// Line of the key or node, 0 when unknown
    pub fn line(&self) -> usize {
        self.key_node
            .as_ref()
            .or(self.node.as_ref())
            .map(|n| n.line)
            .unwrap_or(0)
    }
}

/// Last segment of a pointer
pub fn reference_name(definition: &str) -> &str {
    definition.rsplit('/').next().unwrap_or(definition)
}

/// Decode a JSON pointer token (`~1` is `/`, `~0` is `~`, plus percent escapes)
fn decode_token(token: &str) -> String {
    let bytes = token.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Some(v) = token
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out)
        .replace("~1", "/")
        .replace("~0", "~")
}

/// Split `file.yaml#/a/b` into the location and the fragment (without `#`)
pub fn split_reference(definition: &str) -> (&str, &str) {
    match definition.split_once('#') {
        Some((location, fragment)) => (location, fragment),
        None => (definition, ""),
    }
}

/// Walk a JSON pointer fragment (`/components/schemas/Pet`) from `root`
pub fn locate_pointer(root: &NodeRef, fragment: &str) -> Option<NodeRef> {
    let mut current = match root.root() {
        Some(r) => Arc::clone(r),
        None => Arc::clone(root),
    };
    let fragment = fragment.trim_start_matches('#');
    for raw in fragment.split('/').filter(|s| !s.is_empty()) {
        let token = decode_token(raw);
        let next = match current.resolved().kind {
            NodeKind::Mapping => current.get(&token).cloned(),
            NodeKind::Sequence => token
                .parse::<usize>()
                .ok()
                .and_then(|i| current.children().get(i).cloned()),
            _ => None,
        }?;
        current = next;
    }
    Some(current)
}

/// Convert `#/components/schemas/Pet` into `$.components.schemas['Pet']`
pub fn pointer_to_json_path(definition: &str) -> String {
    let (_, fragment) = split_reference(definition);
    let segments: Vec<String> = fragment
        .split('/')
        .filter(|s| !s.is_empty())
        .map(decode_token)
        .collect();
    let mut path = "$".to_string();
    for (i, seg) in segments.iter().enumerate() {
        if i + 1 == segments.len() {
            path = format!("{}['{}']", path, seg);
        } else {
            path = append_key(&path, seg);
        }
    }
    path
}

/// A cycle found between schemas
#[derive(Debug, Clone)]
pub struct CircularReferenceResult {
    pub journey: Vec<Reference>,
    pub journey_string: String,
    pub start: Reference,
    pub loop_index: usize,
    pub loop_point: Reference,
    /// The `$ref` that closes the loop
    pub parent_node: Option<NodeRef>,
}

impl CircularReferenceResult {
    /// JSONPath of the schema the journey starts from
    pub fn generate_journey_path(&self) -> String {
        pointer_to_json_path(&self.start.definition)
    }

    /// Does the loop only pass through array items?
    pub fn is_array_result(&self) -> bool {
        self.journey.iter().skip(1).all(|r| r.path.contains(".items"))
    }
}

fn journey_string(journey: &[Reference], loop_index: usize) -> String {
    journey
        .iter()
        .enumerate()
        .map(|(i, r)| {
            if i == loop_index {
                format!("** {} **", r.name)
            } else {
                r.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" --> ")
}

/// Collect `$ref` values reachable through `properties` and `items`.
/// Polymorphic keywords are not followed.
fn schema_edges(node: &NodeRef, path: &str, out: &mut Vec<(String, NodeRef, String)>, depth: usize) {
    if depth > 64 || !node.is_map() {
        return;
    }
    for (key, value) in node.pairs() {
        match key.value.as_str() {
            "properties" | "patternProperties" => {
                for (prop, schema) in value.pairs() {
                    let prop_path = format!("{}.{}['{}']", path, key.value, prop.value);
                    push_edge(schema, &prop_path, out, depth);
                }
            }
            "items" | "additionalProperties" => {
                let item_path = format!("{}.{}", path, key.value);
                if value.is_seq() {
                    for item in value.children() {
                        push_edge(item, &item_path, out, depth);
                    }
                } else {
                    push_edge(value, &item_path, out, depth);
                }
            }
            _ => {}
        }
    }
}

fn push_edge(schema: &NodeRef, path: &str, out: &mut Vec<(String, NodeRef, String)>, depth: usize) {
    match schema.get_pair("$ref") {
        Some((_, target)) if target.is_string() => {
            out.push((target.value.clone(), Arc::clone(target), path.to_string()));
        }
        _ => schema_edges(schema, path, out, depth + 1),
    }
}

/// Schema graph, stored as an arena indexed by position
#[derive(Debug, Default)]
pub struct SchemaGraph {
    refs: Vec<Reference>,
    by_definition: IndexMap<String, usize>,
    edge_nodes: Vec<Vec<(usize, NodeRef, String)>>,
}

impl SchemaGraph {
    /// Build the graph from named schema maps, e.g. `components.schemas`
    pub fn build(schemas: &IndexMap<String, Reference>) -> Self {
        let mut graph = SchemaGraph::default();
        for (definition, reference) in schemas {
            graph
                .by_definition
                .insert(definition.clone(), graph.refs.len());
            graph.refs.push(reference.clone());
        }
        for i in 0..graph.refs.len() {
            let mut raw = Vec::new();
            if let Some(node) = graph.refs[i].node.clone() {
                schema_edges(&node, &graph.refs[i].path, &mut raw, 0);
            }
            let mut seen = HashSet::new();
            let mut edges = Vec::new();
            for (definition, node, path) in raw {
                if let Some(&target) = graph.by_definition.get(&definition) {
                    if seen.insert(target) {
                        graph.refs[i].relations.push(definition.clone());
                        edges.push((target, node, path));
                    }
                }
            }
            graph.edge_nodes.push(edges);
        }
        graph
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn get(&self, definition: &str) -> Option<&Reference> {
        self.by_definition.get(definition).map(|&i| &self.refs[i])
    }

    /// Depth-first search for loops; each loop point is reported once
    pub fn find_cycles(&mut self) -> Vec<CircularReferenceResult> {
        let mut results = Vec::new();
        let mut reported = HashSet::new();
        let mut finished = vec![false; self.refs.len()];

        for start in 0..self.refs.len() {
            if finished[start] || self.edge_nodes[start].is_empty() {
                continue;
            }
            let mut journey = vec![start];
            self.visit(start, &mut journey, &mut finished, &mut reported, &mut results);
        }
        for r in &results {
            for step in &r.journey {
                if let Some(&i) = self.by_definition.get(&step.definition) {
                    self.refs[i].circular = true;
                }
            }
        }
        results
    }

    fn visit(
        &self,
        current: usize,
        journey: &mut Vec<usize>,
        finished: &mut [bool],
        reported: &mut HashSet<usize>,
        results: &mut Vec<CircularReferenceResult>,
    ) {
        for (target, ref_node, edge_path) in &self.edge_nodes[current] {
            if let Some(pos) = journey.iter().position(|j| j == target) {
                if reported.insert(*target) {
                    let mut steps: Vec<Reference> =
                        journey.iter().map(|&j| self.refs[j].clone()).collect();
                    let mut closing = self.refs[*target].clone();
                    closing.path = edge_path.clone();
                    closing.seen = true;
                    steps.push(closing.clone());
                    results.push(CircularReferenceResult {
                        journey_string: journey_string(&steps, pos),
                        start: steps[0].clone(),
                        loop_index: pos,
                        loop_point: closing,
                        parent_node: Some(Arc::clone(ref_node)),
                        journey: steps,
                    });
                }
                continue;
            }
            if finished[*target] {
                continue;
            }
            journey.push(*target);
            self.visit(*target, journey, finished, reported, results);
            journey.pop();
        }
        finished[current] = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::parse_document;

    #[test]
    fn test_reference_kind() {
        assert_eq!(ReferenceKind::of("#/components/schemas/Pet"), ReferenceKind::Local);
        assert_eq!(ReferenceKind::of("https://x.io/a.yaml#/Pet"), ReferenceKind::Http);
        assert_eq!(ReferenceKind::of("./pet.yaml#/Pet"), ReferenceKind::File);
        assert_eq!(ReferenceKind::of("Pet"), ReferenceKind::Unknown);
    }

    #[test]
    fn test_locate_pointer() {
        let doc = parse_document("components:\n  schemas:\n    a/b:\n      type: string\n    list:\n      - x\n      - y\n").unwrap();
        let found = locate_pointer(&doc, "#/components/schemas/a~1b").unwrap();
        assert_eq!(found.get_str("type"), Some("string"));
        let item = locate_pointer(&doc, "/components/schemas/list/1").unwrap();
        assert_eq!(item.value, "y");
        assert!(locate_pointer(&doc, "#/components/nope").is_none());
    }

    #[test]
    fn test_pointer_to_json_path() {
        assert_eq!(
            pointer_to_json_path("#/components/schemas/Pet"),
            "$.components.schemas['Pet']"
        );
        assert_eq!(pointer_to_json_path("#/definitions/Pet"), "$.definitions['Pet']");
    }

    #[test]
    fn test_find_cycles() {
        let doc = parse_document(
            "components:\n  schemas:\n    A:\n      properties:\n        b:\n          $ref: '#/components/schemas/B'\n    B:\n      properties:\n        a:\n          $ref: '#/components/schemas/A'\n    C:\n      type: string\n",
        )
        .unwrap();
        let schemas = locate_pointer(&doc, "#/components/schemas").unwrap();
        let mut map = IndexMap::new();
        for (k, v) in schemas.pairs() {
            let def = format!("#/components/schemas/{}", k.value);
            map.insert(def.clone(), Reference::new(def, Some(Arc::clone(v))));
        }
        let mut graph = SchemaGraph::build(&map);
        let cycles = graph.find_cycles();
        assert_eq!(cycles.len(), 1);
        let c = &cycles[0];
        assert_eq!(c.loop_index, 0);
        assert_eq!(c.start.name, "A");
        assert_eq!(c.journey_string, "** A ** --> B --> A");
        assert!(graph.get("#/components/schemas/A").unwrap().circular);
        assert!(!graph.get("#/components/schemas/C").unwrap().circular);

        // running again reports the same loop
        let again = SchemaGraph::build(&map).find_cycles();
        assert_eq!(again[0].journey_string, c.journey_string);
    }

    #[test]
    fn test_self_reference_through_items() {
        let doc = parse_document(
            "definitions:\n  Node:\n    properties:\n      children:\n        type: array\n        items:\n          $ref: '#/definitions/Node'\n",
        )
        .unwrap();
        let node = locate_pointer(&doc, "#/definitions/Node").unwrap();
        let mut map = IndexMap::new();
        map.insert(
            "#/definitions/Node".to_string(),
            Reference::new("#/definitions/Node", Some(node)),
        );
        let cycles = SchemaGraph::build(&map).find_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].journey.len(), 2);
        assert!(cycles[0].is_array_result());
    }
}
