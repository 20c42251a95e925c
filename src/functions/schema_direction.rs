//! Where a component schema is used: requests, responses, or both
//!
//! Works on the unresolved document. References are followed by name, and a
//! schema reaches another when it refers to it anywhere below it.

use crate::index::{is_http_method, locate_pointer, reference_name, split_reference};
use crate::node::{NodeKind, NodeRef, MAX_SEARCH_DEPTH};
use std::collections::HashSet;
use std::fmt;

/// Direction a schema flows in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaDirection {
    Both,
    Request,
    Response,
    None,
}

impl fmt::Display for SchemaDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaDirection::Both => write!(f, "both"),
            SchemaDirection::Request => write!(f, "request"),
            SchemaDirection::Response => write!(f, "response"),
            SchemaDirection::None => write!(f, "none"),
        }
    }
}

impl SchemaDirection {
    pub fn is_request(&self) -> bool {
        matches!(self, SchemaDirection::Both | SchemaDirection::Request)
    }

    pub fn is_response(&self) -> bool {
        matches!(self, SchemaDirection::Both | SchemaDirection::Response)
    }
}

/// Keywords holding a single subschema
pub(crate) const SINGLE: [&str; 10] = [
    "not",
    "items",
    "contains",
    "if",
    "then",
    "else",
    "propertyNames",
    "unevaluatedItems",
    "additionalProperties",
    "unevaluatedProperties",
];

/// Keywords holding a list of subschemas
pub(crate) const LISTS: [&str; 4] = ["allOf", "anyOf", "oneOf", "prefixItems"];

/// Keywords holding a map of subschemas
pub(crate) const MAPS: [&str; 3] = ["properties", "patternProperties", "dependentSchemas"];

struct Reach<'a> {
    root: &'a NodeRef,
    name: &'a str,
    visited: HashSet<String>,
}

impl Reach<'_> {
    fn deref(&mut self, node: &NodeRef) -> Option<NodeRef> {
        let definition = node.get_str("$ref")?;
        if !self.visited.insert(definition.to_string()) {
            return None;
        }
        let (location, fragment) = split_reference(definition);
        if !location.is_empty() {
            return None;
        }
        locate_pointer(self.root, fragment)
    }

    /// Does `schema` refer to the named schema anywhere below it
    fn reaches(&mut self, schema: &NodeRef, depth: usize) -> bool {
        if depth > MAX_SEARCH_DEPTH || !schema.is_map() {
            return false;
        }
        if let Some(definition) = schema.get_str("$ref") {
            if reference_name(definition) == self.name {
                return true;
            }
            return match self.deref(schema) {
                Some(target) => self.reaches(&target, depth + 1),
                None => false,
            };
        }
        for key in SINGLE {
            if let Some(sub) = schema.get(key) {
                if sub.is_map() && self.reaches(sub, depth + 1) {
                    return true;
                }
            }
        }
        for key in LISTS {
            if let Some(list) = schema.get(key) {
                if list.children().iter().any(|s| self.reaches(s, depth + 1)) {
                    return true;
                }
            }
        }
        for key in MAPS {
            if let Some(map) = schema.get(key) {
                if map.pairs().any(|(_, s)| self.reaches(s, depth + 1)) {
                    return true;
                }
            }
        }
        false
    }

    fn maybe_ref(&mut self, node: &NodeRef) -> NodeRef {
        match node.get_str("$ref") {
            Some(definition) => {
                let (_, fragment) = split_reference(definition);
                locate_pointer(self.root, fragment).unwrap_or_else(|| node.clone())
            }
            None => node.clone(),
        }
    }

    fn in_parameters(&mut self, parameters: Option<&NodeRef>) -> bool {
        let Some(parameters) = parameters else {
            return false;
        };
        parameters.children().iter().any(|param| {
            let param = self.maybe_ref(param);
            self.visited.clear();
            param.get("schema").is_some_and(|s| self.reaches(s, 0))
        })
    }

    fn in_content(&mut self, holder: &NodeRef) -> bool {
        let holder = self.maybe_ref(holder);
        let Some(content) = holder.get("content") else {
            return false;
        };
        let found = content.pairs().any(|(_, media)| {
            self.visited.clear();
            media.get("schema").is_some_and(|s| self.reaches(s, 0))
        });
        found
    }

    fn in_response(&mut self, response: &NodeRef) -> bool {
        if self.in_content(response) {
            return true;
        }
        let response = self.maybe_ref(response);
        let Some(headers) = response.get("headers") else {
            return false;
        };
        let found = headers.pairs().any(|(_, header)| {
            let header = self.maybe_ref(header);
            self.visited.clear();
            header.get("schema").is_some_and(|s| self.reaches(s, 0))
        });
        found
    }
}

/// Find the direction of the component schema `name`
pub fn schema_direction(root: &NodeRef, name: &str) -> SchemaDirection {
    let root = match root.kind {
        NodeKind::Document => match root.root() {
            Some(r) => r.clone(),
            None => return SchemaDirection::None,
        },
        _ => root.clone(),
    };
    let Some(paths) = root.get("paths").cloned() else {
        return SchemaDirection::None;
    };
    if name.is_empty() {
        return SchemaDirection::None;
    }

    let mut reach = Reach {
        root: &root,
        name,
        visited: HashSet::new(),
    };
    let (mut request, mut response) = (false, false);

    for (_, path_item) in paths.pairs() {
        if reach.in_parameters(path_item.get("parameters")) {
            request = true;
        }
        for (method, operation) in path_item.pairs() {
            if !is_http_method(&method.value) {
                continue;
            }
            if reach.in_parameters(operation.get("parameters")) {
                request = true;
            }
            if let Some(body) = operation.get("requestBody") {
                if reach.in_content(body) {
                    request = true;
                }
            }
            if let Some(responses) = operation.get("responses") {
                if responses.pairs().any(|(_, r)| reach.in_response(r)) {
                    response = true;
                }
            }
        }
    }

    match (request, response) {
        (true, true) => SchemaDirection::Both,
        (true, false) => SchemaDirection::Request,
        (false, true) => SchemaDirection::Response,
        (false, false) => SchemaDirection::None,
    }
}
