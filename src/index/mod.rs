//! Spec index
//!
//! One pass over a parsed document collects every `$ref`, path, operation,
//! parameter, tag and component so rule functions never have to walk the
//! whole tree again. Independent scans run in parallel on the rayon pool and
//! are assembled once all of them finish. Nothing is mutated after
//! construction, so the index is shared freely between workers.

pub mod reference;
pub mod remote;

pub use reference::{
    locate_pointer, pointer_to_json_path, reference_name, split_reference,
    CircularReferenceResult, Reference, ReferenceKind, SchemaGraph,
};
pub use remote::{FileReader, FsReader, HttpFetcher, IndexConfig, RemoteFetcher, RemoteSources};

use crate::jsonpath::{append_index, append_key};
use crate::node::{NodeKind, NodeRef, MAX_SEARCH_DEPTH};
use indexmap::{IndexMap, IndexSet};
use log::debug;
use std::sync::Arc;
use thiserror::Error;

/// Operation keys of a path item
pub const HTTP_METHODS: [&str; 8] = [
    "get", "post", "put", "patch", "options", "head", "delete", "trace",
];

pub fn is_http_method(value: &str) -> bool {
    HTTP_METHODS.contains(&value.to_lowercase().as_str())
}

/// A reference that could not be located, or a malformed one
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct IndexingError {
    pub message: String,
    /// The offending `$ref` value
    pub definition: String,
    pub node: Option<NodeRef>,
    pub key_node: Option<NodeRef>,
    /// JSONPath of the `$ref`
    pub path: String,
}

impl IndexingError {
    fn new(message: impl Into<String>, reference: &Reference) -> Self {
        Self {
            message: message.into(),
            definition: reference.definition.clone(),
            node: reference.node.clone(),
            key_node: reference.key_node.clone(),
            path: reference.path.clone(),
        }
    }
}

/// A `description` or `summary` string
#[derive(Debug, Clone)]
pub struct DescriptionReference {
    pub content: String,
    pub path: String,
    pub node: NodeRef,
    pub key_node: NodeRef,
    pub is_summary: bool,
}

/// An `enum` array and the schema that declares it
#[derive(Debug, Clone)]
pub struct EnumReference {
    pub node: NodeRef,
    pub key_node: NodeRef,
    pub schema_node: NodeRef,
    /// The sibling `type`, if any
    pub schema_type: Option<String>,
    pub path: String,
}

#[derive(Default)]
struct RefScan {
    raw: Vec<Reference>,
    enums: Vec<EnumReference>,
    examples: Vec<Reference>,
    descriptions: Vec<DescriptionReference>,
    external_docs: Vec<Reference>,
}

#[derive(Default)]
struct OperationScan {
    paths_node: Option<NodeRef>,
    path_count: usize,
    path_refs: IndexMap<String, IndexMap<String, Reference>>,
    operation_tags: IndexMap<String, IndexMap<String, Vec<Reference>>>,
    operation_ids: Vec<Reference>,
    links: IndexMap<String, IndexMap<String, Vec<Reference>>>,
    link_count: usize,
    /// (path, parameter node) in document order
    parameters: Vec<(String, NodeRef)>,
    servers: Vec<Reference>,
    security: Vec<Reference>,
}

#[derive(Default)]
struct ComponentScan {
    schemas_node: Option<NodeRef>,
    schemas: IndexMap<String, Reference>,
    parameters_node: Option<NodeRef>,
    parameters: IndexMap<String, Reference>,
    security_schemes: IndexMap<String, Reference>,
    request_bodies: IndexMap<String, Reference>,
    responses: IndexMap<String, Reference>,
    headers: IndexMap<String, Reference>,
    examples: IndexMap<String, Reference>,
    callbacks: IndexMap<String, Reference>,
    links: IndexMap<String, Reference>,
    global_tags: Vec<Reference>,
    tags_node: Option<NodeRef>,
    servers: Vec<Reference>,
    security: Vec<Reference>,
}

/// Pre-computed index of a document
#[derive(Debug, Default)]
pub struct SpecIndex {
    document: Option<NodeRef>,
    root: Option<NodeRef>,
    config: IndexConfig,
    all_refs: IndexMap<String, Reference>,
    raw_sequenced_refs: Vec<Reference>,
    all_mapped_refs: IndexMap<String, Reference>,
    paths_node: Option<NodeRef>,
    path_count: usize,
    path_refs: IndexMap<String, IndexMap<String, Reference>>,
    param_op_refs: IndexMap<String, IndexMap<String, Reference>>,
    param_comp_refs: IndexMap<String, Reference>,
    param_all_refs: IndexMap<String, Reference>,
    param_inline_duplicates: IndexMap<String, Vec<Reference>>,
    parameters_node: Option<NodeRef>,
    component_params: IndexMap<String, Reference>,
    global_tags: Vec<Reference>,
    tags_node: Option<NodeRef>,
    operation_tags: IndexMap<String, IndexMap<String, Vec<Reference>>>,
    links: IndexMap<String, IndexMap<String, Vec<Reference>>>,
    link_count: usize,
    component_links: IndexMap<String, Reference>,
    security_schemes: IndexMap<String, Reference>,
    request_bodies: IndexMap<String, Reference>,
    responses: IndexMap<String, Reference>,
    headers: IndexMap<String, Reference>,
    component_examples: IndexMap<String, Reference>,
    callbacks: IndexMap<String, Reference>,
    external_documents: Vec<Reference>,
    schemas_node: Option<NodeRef>,
    all_schemas: IndexMap<String, Reference>,
    all_enums: Vec<EnumReference>,
    all_examples: Vec<Reference>,
    all_descriptions: Vec<DescriptionReference>,
    operation_ids: Vec<Reference>,
    servers: Vec<Reference>,
    security_requirements: Vec<Reference>,
    ref_errors: Vec<IndexingError>,
    circular_references: Vec<CircularReferenceResult>,
}

impl SpecIndex {
    /// An index with no document; every count is `-1`
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index a parsed document (a `Document` node or its root mapping)
    pub fn new(document: &NodeRef, config: IndexConfig) -> Self {
        let root = match document.root() {
            Some(r) => Arc::clone(r),
            None if document.is_document() => {
                return Self {
                    document: Some(Arc::clone(document)),
                    config,
                    ..Self::default()
                }
            }
            None => Arc::clone(document),
        };

        let (refs, (ops, comps)) = rayon::join(
            || scan_refs(&root),
            || rayon::join(|| scan_operations(&root), || scan_components(&root)),
        );

        let mut index = Self {
            document: Some(Arc::clone(document)),
            root: Some(root),
            config,
            ..Self::default()
        };
        index.assemble(refs, ops, comps);
        index
    }

    fn assemble(&mut self, refs: RefScan, ops: OperationScan, comps: ComponentScan) {
        // references, deduplicated in the order they were scanned
        for reference in &refs.raw {
            if self.all_refs.contains_key(&reference.definition) {
                continue;
            }
            if reference.definition.is_empty() {
                self.ref_errors.push(IndexingError::new(
                    "schema reference is empty and cannot be processed",
                    reference,
                ));
                continue;
            }
            self.all_refs
                .insert(reference.definition.clone(), reference.clone());
        }
        self.raw_sequenced_refs = refs.raw;
        self.extract_components_from_refs();

        self.all_enums = refs.enums;
        self.all_examples = refs.examples;
        self.all_descriptions = refs.descriptions;
        self.external_documents = refs.external_docs;

        self.paths_node = ops.paths_node;
        self.path_count = ops.path_count;
        self.path_refs = ops.path_refs;
        self.operation_tags = ops.operation_tags;
        self.operation_ids = ops.operation_ids;
        self.links = ops.links;
        self.link_count = ops.link_count;

        self.schemas_node = comps.schemas_node;
        self.all_schemas = comps.schemas;
        self.parameters_node = comps.parameters_node;
        self.component_params = comps.parameters;
        self.security_schemes = comps.security_schemes;
        self.request_bodies = comps.request_bodies;
        self.responses = comps.responses;
        self.headers = comps.headers;
        self.component_examples = comps.examples;
        self.callbacks = comps.callbacks;
        self.component_links = comps.links;
        self.global_tags = comps.global_tags;
        self.tags_node = comps.tags_node;

        self.servers = comps.servers;
        self.servers.extend(ops.servers);
        self.security_requirements = comps.security;
        self.security_requirements.extend(ops.security);

        self.index_parameters(ops.parameters);

        if !self.config.skip_circular_references {
            let mut graph = SchemaGraph::build(&self.all_schemas);
            self.circular_references = graph.find_cycles();
            for result in &self.circular_references {
                if let Some(schema) = self.all_schemas.get_mut(&result.loop_point.definition) {
                    schema.circular = true;
                }
            }
        }
        debug!(
            "indexed {} refs ({} raw), {} paths, {} operations, {} schemas",
            self.all_refs.len(),
            self.raw_sequenced_refs.len(),
            self.path_count,
            self.get_operation_count(),
            self.all_schemas.len()
        );
    }

    /// Locate every discovered reference; failures become indexing errors
    fn extract_components_from_refs(&mut self) {
        let definitions: Vec<Reference> = self.all_refs.values().cloned().collect();
        for reference in definitions {
            match self.locate_component(&reference.definition) {
                Ok(Some(node)) => {
                    let mut located = Reference::new(reference.definition.clone(), Some(node))
                        .with_path(reference.path.clone());
                    located.key_node = reference.key_node.clone();
                    located.resolved = true;
                    self.all_mapped_refs
                        .insert(reference.definition.clone(), located);
                }
                Ok(None) => self.ref_errors.push(IndexingError::new(
                    format!(
                        "component '{}' does not exist in the specification",
                        reference.definition
                    ),
                    &reference,
                )),
                Err(message) => self.ref_errors.push(IndexingError::new(message, &reference)),
            }
        }
    }

    fn locate_component(&self, definition: &str) -> Result<Option<NodeRef>, String> {
        let Some(document) = &self.document else {
            return Ok(None);
        };
        let (location, fragment) = split_reference(definition);
        match ReferenceKind::of(definition) {
            ReferenceKind::Local => Ok(locate_pointer(document, fragment)),
            ReferenceKind::Http => {
                let remote = self.config.load_remote(location)?;
                Ok(locate_pointer(&remote, fragment))
            }
            ReferenceKind::File => {
                let file = self.config.load_file(location)?;
                Ok(locate_pointer(&file, fragment))
            }
            ReferenceKind::Unknown => Ok(None),
        }
    }

    /// Find a component by its reference; `None` when it cannot be located
    pub fn find_component(&self, definition: &str) -> Option<Reference> {
        if let Some(mapped) = self.all_mapped_refs.get(definition) {
            return Some(mapped.clone());
        }
        self.locate_component(definition)
            .ok()
            .flatten()
            .map(|node| Reference::new(definition, Some(node)))
    }

    fn index_parameters(&mut self, parameters: Vec<(String, NodeRef)>) {
        let mut inline_keys = IndexSet::new();
        for (path, param) in parameters {
            let entry = self.param_op_refs.entry(path.clone()).or_default();
            if let Some(target) = param.get("$ref").filter(|r| r.is_string()) {
                let definition = target.value.clone();
                let reference = self
                    .all_mapped_refs
                    .get(&definition)
                    .cloned()
                    .unwrap_or_else(|| Reference::new(definition.clone(), None));
                entry.insert(definition, reference);
                continue;
            }
            let Some(name) = param.get_str("name") else {
                continue;
            };
            let location = param.get_str("in").unwrap_or_default();
            let mut reference = Reference::new(name, Some(Arc::clone(&param)));
            reference.name = name.to_string();
            let key = inline_param_key(name, location);
            inline_keys.insert((path, key.clone()));
            entry.insert(key, reference);
        }

        for (key, component) in &self.all_mapped_refs {
            if key.contains("/parameters/") {
                self.param_comp_refs.insert(key.clone(), component.clone());
                self.param_all_refs.insert(key.clone(), component.clone());
            }
        }

        for (path, params) in &self.param_op_refs {
            for (key, value) in params {
                if !inline_keys.contains(&(path.clone(), key.clone())) {
                    continue;
                }
                self.param_inline_duplicates
                    .entry(key.clone())
                    .or_default()
                    .push(value.clone());
                self.param_all_refs
                    .insert(format!("{}:::{}", path, key), value.clone());
            }
        }
    }

    fn count(&self, n: usize) -> i64 {
        if self.root.is_none() {
            -1
        } else {
            n as i64
        }
    }

    /// The parsed document node
    pub fn document(&self) -> Option<&NodeRef> {
        self.document.as_ref()
    }

    /// The root mapping of the document
    pub fn root(&self) -> Option<&NodeRef> {
        self.root.as_ref()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// All unique references
    pub fn all_refs(&self) -> &IndexMap<String, Reference> {
        &self.all_refs
    }

    /// Every `$ref` in scan order, duplicates included
    pub fn raw_sequenced_refs(&self) -> &[Reference] {
        &self.raw_sequenced_refs
    }

    /// References that were located
    pub fn mapped_refs(&self) -> &IndexMap<String, Reference> {
        &self.all_mapped_refs
    }

    pub fn all_schemas(&self) -> &IndexMap<String, Reference> {
        &self.all_schemas
    }

    pub fn schemas_node(&self) -> Option<&NodeRef> {
        self.schemas_node.as_ref()
    }

    pub fn parameters_node(&self) -> Option<&NodeRef> {
        self.parameters_node.as_ref()
    }

    pub fn paths_node(&self) -> Option<&NodeRef> {
        self.paths_node.as_ref()
    }

    pub fn tags_node(&self) -> Option<&NodeRef> {
        self.tags_node.as_ref()
    }

    /// path -> method -> operation
    pub fn path_refs(&self) -> &IndexMap<String, IndexMap<String, Reference>> {
        &self.path_refs
    }

    /// path -> parameter key -> parameter
    pub fn operation_parameters(&self) -> &IndexMap<String, IndexMap<String, Reference>> {
        &self.param_op_refs
    }

    pub fn component_parameters(&self) -> &IndexMap<String, Reference> {
        &self.component_params
    }

    /// Inline parameters grouped by name and location
    pub fn inline_parameter_groups(&self) -> &IndexMap<String, Vec<Reference>> {
        &self.param_inline_duplicates
    }

    pub fn all_parameters(&self) -> &IndexMap<String, Reference> {
        &self.param_all_refs
    }

    pub fn global_tags(&self) -> &[Reference] {
        &self.global_tags
    }

    /// path -> method -> tags
    pub fn operation_tags(&self) -> &IndexMap<String, IndexMap<String, Vec<Reference>>> {
        &self.operation_tags
    }

    pub fn links(&self) -> &IndexMap<String, IndexMap<String, Vec<Reference>>> {
        &self.links
    }

    pub fn component_links(&self) -> &IndexMap<String, Reference> {
        &self.component_links
    }

    pub fn security_schemes(&self) -> &IndexMap<String, Reference> {
        &self.security_schemes
    }

    pub fn request_bodies(&self) -> &IndexMap<String, Reference> {
        &self.request_bodies
    }

    pub fn responses(&self) -> &IndexMap<String, Reference> {
        &self.responses
    }

    pub fn headers(&self) -> &IndexMap<String, Reference> {
        &self.headers
    }

    pub fn component_examples(&self) -> &IndexMap<String, Reference> {
        &self.component_examples
    }

    pub fn callbacks(&self) -> &IndexMap<String, Reference> {
        &self.callbacks
    }

    pub fn external_documents(&self) -> &[Reference] {
        &self.external_documents
    }

    pub fn all_enums(&self) -> &[EnumReference] {
        &self.all_enums
    }

    /// Inline `example` and `examples` values
    pub fn all_examples(&self) -> &[Reference] {
        &self.all_examples
    }

    pub fn all_descriptions(&self) -> &[DescriptionReference] {
        &self.all_descriptions
    }

    pub fn operation_ids(&self) -> &[Reference] {
        &self.operation_ids
    }

    pub fn servers(&self) -> &[Reference] {
        &self.servers
    }

    pub fn security_requirements(&self) -> &[Reference] {
        &self.security_requirements
    }

    pub fn ref_errors(&self) -> &[IndexingError] {
        &self.ref_errors
    }

    pub fn circular_references(&self) -> &[CircularReferenceResult] {
        &self.circular_references
    }

    pub fn get_path_count(&self) -> i64 {
        self.count(self.path_count)
    }

    pub fn get_operation_count(&self) -> i64 {
        self.count(self.path_refs.values().map(|m| m.len()).sum())
    }

    pub fn get_component_schema_count(&self) -> i64 {
        self.count(self.all_schemas.len())
    }

    pub fn get_global_tags_count(&self) -> i64 {
        self.count(self.global_tags.len())
    }

    /// Unique tag names used by operations
    pub fn get_operation_tags_count(&self) -> i64 {
        let names: IndexSet<&str> = self
            .operation_tags
            .values()
            .flat_map(|m| m.values())
            .flatten()
            .map(|t| t.name.as_str())
            .collect();
        self.count(names.len())
    }

    /// Unique tag names across global and operation tags
    pub fn get_total_tags_count(&self) -> i64 {
        let names: IndexSet<&str> = self
            .global_tags
            .iter()
            .chain(self.operation_tags.values().flat_map(|m| m.values()).flatten())
            .map(|t| t.name.as_str())
            .collect();
        self.count(names.len())
    }

    pub fn get_global_links_count(&self) -> i64 {
        self.count(self.link_count)
    }

    pub fn get_raw_reference_count(&self) -> i64 {
        self.count(self.raw_sequenced_refs.len())
    }

    pub fn get_component_parameter_count(&self) -> i64 {
        self.count(self.component_params.len())
    }

    /// Referenced component parameters plus inline parameter groups
    pub fn get_operations_parameter_count(&self) -> i64 {
        self.count(self.param_comp_refs.len() + self.param_inline_duplicates.len())
    }

    /// Inline parameters that appear in more than one path
    pub fn get_inline_duplicate_param_count(&self) -> i64 {
        self.count(self.param_inline_duplicates.len() - self.unique_inline_count())
    }

    /// Inline parameters that appear once
    pub fn get_inline_unique_param_count(&self) -> i64 {
        self.count(self.unique_inline_count())
    }

    fn unique_inline_count(&self) -> usize {
        self.param_inline_duplicates
            .values()
            .filter(|v| v.len() == 1)
            .count()
    }

    pub fn get_security_schemes_count(&self) -> i64 {
        self.count(self.security_schemes.len())
    }

    pub fn get_external_documents_count(&self) -> i64 {
        self.count(self.external_documents.len())
    }

    pub fn get_enum_count(&self) -> i64 {
        self.count(self.all_enums.len())
    }

    pub fn get_examples_count(&self) -> i64 {
        self.count(self.all_examples.len() + self.component_examples.len())
    }
}

fn inline_param_key(name: &str, location: &str) -> String {
    if location.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", name, location)
    }
}

fn scan_refs(root: &NodeRef) -> RefScan {
    let mut scan = RefScan::default();
    walk_refs(root, "$", &mut scan, 0);
    scan
}

fn walk_refs(node: &NodeRef, path: &str, scan: &mut RefScan, depth: usize) {
    if depth > MAX_SEARCH_DEPTH {
        return;
    }
    match node.kind {
        NodeKind::Mapping => {
            for (key, value) in node.pairs() {
                let child_path = append_key(path, &key.value);
                match key.value.as_str() {
                    "$ref" if value.is_scalar() => {
                        let reference = Reference::new(value.value.clone(), Some(Arc::clone(node)))
                            .with_key_node(Arc::clone(key))
                            .with_path(path);
                        scan.raw.push(reference);
                        continue;
                    }
                    "enum" if value.is_seq() => scan.enums.push(EnumReference {
                        node: Arc::clone(value),
                        key_node: Arc::clone(key),
                        schema_node: Arc::clone(node),
                        schema_type: node.get_str("type").map(str::to_string),
                        path: child_path.clone(),
                    }),
                    "example" | "examples" if !path.ends_with(".properties") => {
                        scan.examples.push(
                            Reference::new(child_path.clone(), Some(Arc::clone(value)))
                                .with_key_node(Arc::clone(key))
                                .with_path(child_path.clone()),
                        );
                    }
                    "description" | "summary" if value.is_string() => {
                        scan.descriptions.push(DescriptionReference {
                            content: value.value.clone(),
                            path: child_path.clone(),
                            node: Arc::clone(value),
                            key_node: Arc::clone(key),
                            is_summary: key.value == "summary",
                        })
                    }
                    "externalDocs" if value.is_map() => {
                        if let Some(url) = value.get_str("url") {
                            scan.external_docs.push(
                                Reference::new(url, Some(Arc::clone(value)))
                                    .with_key_node(Arc::clone(key))
                                    .with_path(child_path.clone()),
                            );
                        }
                    }
                    _ => {}
                }
                if matches!(value.kind, NodeKind::Mapping | NodeKind::Sequence) {
                    walk_refs(value, &child_path, scan, depth + 1);
                }
            }
        }
        NodeKind::Sequence => {
            for (i, item) in node.content.iter().enumerate() {
                walk_refs(item, &append_index(path, i), scan, depth + 1);
            }
        }
        _ => {}
    }
}

fn scan_operations(root: &NodeRef) -> OperationScan {
    let mut scan = OperationScan::default();
    let Some(paths) = root.get("paths").filter(|p| p.is_map()) else {
        return scan;
    };
    scan.paths_node = Some(Arc::clone(paths));
    scan.path_count = paths.pairs().count();

    for (path_key, path_item) in paths.pairs() {
        let path_name = path_key.value.clone();
        let item_path = append_key("$.paths", &path_name);

        for (prop, value) in path_item.pairs() {
            let prop_name = prop.value.as_str();
            if prop_name == "parameters" {
                for param in value.children() {
                    scan.parameters.push((path_name.clone(), Arc::clone(param)));
                }
                continue;
            }
            if prop_name == "servers" {
                collect_servers(value, &append_key(&item_path, "servers"), &mut scan.servers);
                continue;
            }
            if !is_http_method(prop_name) {
                continue;
            }

            let op_path = append_key(&item_path, prop_name);
            let operation = Reference::new(prop_name, Some(Arc::clone(value)))
                .with_key_node(Arc::clone(prop))
                .with_path(op_path.clone());
            scan.path_refs
                .entry(path_name.clone())
                .or_default()
                .insert(prop_name.to_string(), operation);

            for (op_key, op_value) in value.pairs() {
                match op_key.value.as_str() {
                    "parameters" => {
                        for param in op_value.children() {
                            scan.parameters.push((path_name.clone(), Arc::clone(param)));
                        }
                    }
                    "tags" => {
                        let tags: Vec<Reference> = op_value
                            .children()
                            .iter()
                            .enumerate()
                            .filter(|(_, t)| t.is_scalar())
                            .map(|(i, t)| {
                                Reference::new(t.value.clone(), Some(Arc::clone(t)))
                                    .with_path(append_index(&append_key(&op_path, "tags"), i))
                            })
                            .map(|mut r| {
                                r.name = r.definition.clone();
                                r
                            })
                            .collect();
                        scan.operation_tags
                            .entry(path_name.clone())
                            .or_default()
                            .insert(prop_name.to_string(), tags);
                    }
                    "operationId" if op_value.is_scalar() => {
                        let mut id = Reference::new(op_value.value.clone(), Some(Arc::clone(op_value)))
                            .with_key_node(Arc::clone(op_key))
                            .with_path(append_key(&op_path, "operationId"));
                        id.name = op_value.value.clone();
                        scan.operation_ids.push(id);
                    }
                    "servers" => collect_servers(
                        op_value,
                        &append_key(&op_path, "servers"),
                        &mut scan.servers,
                    ),
                    "security" => collect_security(
                        op_value,
                        &append_key(&op_path, "security"),
                        &mut scan.security,
                    ),
                    "responses" => {
                        for (code, response) in op_value.pairs() {
                            let Some(links) = response.get("links").filter(|l| l.is_map()) else {
                                continue;
                            };
                            for (link_name, link) in links.pairs() {
                                if !link.is_map() {
                                    continue;
                                }
                                let reference = Reference::new(prop_name, Some(Arc::clone(link)))
                                    .with_key_node(Arc::clone(link_name))
                                    .with_path(append_key(
                                        &append_key(&append_key(&append_key(&op_path, "responses"), &code.value), "links"),
                                        &link_name.value,
                                    ));
                                scan.links
                                    .entry(path_name.clone())
                                    .or_default()
                                    .entry(prop_name.to_string())
                                    .or_default()
                                    .push(reference);
                                scan.link_count += 1;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    scan
}

fn collect_servers(node: &NodeRef, path: &str, out: &mut Vec<Reference>) {
    for (i, server) in node.children().iter().enumerate() {
        if let Some(url) = server.get_str("url") {
            out.push(Reference::new(url, Some(Arc::clone(server))).with_path(append_index(path, i)));
        }
    }
}

fn collect_security(node: &NodeRef, path: &str, out: &mut Vec<Reference>) {
    for (i, requirement) in node.children().iter().enumerate() {
        let requirement_path = append_index(path, i);
        for (scheme, _) in requirement.pairs() {
            let mut reference = Reference::new(scheme.value.clone(), Some(Arc::clone(requirement)))
                .with_key_node(Arc::clone(scheme))
                .with_path(requirement_path.clone());
            reference.name = scheme.value.clone();
            out.push(reference);
        }
    }
}

fn component_map(node: &NodeRef, prefix: &str, json_path: &str) -> IndexMap<String, Reference> {
    node.pairs()
        .map(|(key, value)| {
            let definition = format!("{}{}", prefix, key.value);
            let mut reference = Reference::new(definition.clone(), Some(Arc::clone(value)))
                .with_key_node(Arc::clone(key))
                .with_path(format!("{}['{}']", json_path, key.value));
            reference.name = key.value.clone();
            (definition, reference)
        })
        .collect()
}

fn scan_components(root: &NodeRef) -> ComponentScan {
    let mut scan = ComponentScan::default();

    if let Some(components) = root.get("components").filter(|c| c.is_map()) {
        for (key, value) in components.pairs() {
            let section = key.value.as_str();
            let prefix = format!("#/components/{}/", section);
            let json_path = format!("$.components.{}", section);
            let map = component_map(value, &prefix, &json_path);
            match section {
                "schemas" => {
                    scan.schemas_node = Some(Arc::clone(value));
                    scan.schemas = map;
                }
                "parameters" => {
                    scan.parameters_node = Some(Arc::clone(value));
                    scan.parameters = map;
                }
                "securitySchemes" => scan.security_schemes = map,
                "requestBodies" => scan.request_bodies = map,
                "responses" => scan.responses = map,
                "headers" => scan.headers = map,
                "examples" => scan.examples = map,
                "callbacks" => scan.callbacks = map,
                "links" => scan.links = map,
                _ => {}
            }
        }
    }

    // swagger 2 keeps its components at the top level
    for (key, value) in root.pairs() {
        match key.value.as_str() {
            "definitions" if value.is_map() => {
                scan.schemas_node = Some(Arc::clone(value));
                scan.schemas = component_map(value, "#/definitions/", "$.definitions");
            }
            "parameters" if value.is_map() => {
                scan.parameters_node = Some(Arc::clone(value));
                scan.parameters = component_map(value, "#/parameters/", "$.parameters");
            }
            "responses" if value.is_map() => {
                scan.responses = component_map(value, "#/responses/", "$.responses");
            }
            "securityDefinitions" if value.is_map() => {
                scan.security_schemes =
                    component_map(value, "#/securityDefinitions/", "$.securityDefinitions");
            }
            "tags" if value.is_seq() => {
                scan.tags_node = Some(Arc::clone(value));
                for (i, tag) in value.children().iter().enumerate() {
                    let name = tag.get_str("name").unwrap_or_default().to_string();
                    let mut reference = Reference::new(name.clone(), Some(Arc::clone(tag)))
                        .with_path(format!("$.tags[{}]", i));
                    reference.name = name;
                    scan.global_tags.push(reference);
                }
            }
            "servers" => collect_servers(value, "$.servers", &mut scan.servers),
            "security" => collect_security(value, "$.security", &mut scan.security),
            _ => {}
        }
    }
    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::parse_document;

    const PETS: &str = r#"openapi: 3.0.1
info:
  title: Pets
  description: all the pets
tags:
  - name: pets
  - name: stores
paths:
  /pets:
    parameters:
      - name: limit
        in: query
    get:
      operationId: listPets
      tags: [pets]
      responses:
        '200':
          description: ok
          content:
            application/json:
              schema:
                $ref: '#/components/schemas/Pets'
          links:
            next:
              operationId: listPets
    post:
      operationId: createPet
      tags: [pets, admin]
      parameters:
        - $ref: '#/components/parameters/Trace'
      requestBody:
        content:
          application/json:
            schema:
              $ref: '#/components/schemas/Pet'
  /stores:
    get:
      parameters:
        - name: limit
          in: query
        - name: region
          in: query
      responses:
        '200':
          description: ok
components:
  parameters:
    Trace:
      name: trace
      in: header
  schemas:
    Pet:
      type: object
      properties:
        kind:
          type: string
          enum: [cat, dog]
        owner:
          $ref: '#/components/schemas/Owner'
    Owner:
      properties:
        pet:
          $ref: '#/components/schemas/Pet'
    Pets:
      type: array
      items:
        $ref: '#/components/schemas/Pet'
"#;

    fn index(src: &str) -> SpecIndex {
        SpecIndex::new(&parse_document(src).unwrap(), IndexConfig::default())
    }

    #[test]
    fn test_counts() {
        let idx = index(PETS);
        assert_eq!(idx.get_path_count(), 2);
        assert_eq!(idx.get_operation_count(), 3);
        assert_eq!(idx.get_component_schema_count(), 3);
        assert_eq!(idx.get_global_tags_count(), 2);
        assert_eq!(idx.get_operation_tags_count(), 2);
        assert_eq!(idx.get_total_tags_count(), 3);
        assert_eq!(idx.get_component_parameter_count(), 1);
        assert_eq!(idx.get_global_links_count(), 1);
        assert_eq!(idx.get_enum_count(), 1);
    }

    #[test]
    fn test_parameter_counts() {
        let idx = index(PETS);
        // limit appears under two paths, region under one, Trace is a component
        assert_eq!(idx.get_inline_duplicate_param_count(), 1);
        assert_eq!(idx.get_inline_unique_param_count(), 1);
        assert_eq!(idx.get_operations_parameter_count(), 3);
        assert!(idx.all_parameters().contains_key("/stores:::region::query"));
    }

    #[test]
    fn test_counts_are_idempotent() {
        let idx = index(PETS);
        assert_eq!(idx.get_total_tags_count(), idx.get_total_tags_count());
        assert_eq!(idx.get_operations_parameter_count(), idx.get_operations_parameter_count());
    }

    #[test]
    fn test_references() {
        let idx = index(PETS);
        assert_eq!(idx.all_refs().len(), 4);
        assert_eq!(idx.get_raw_reference_count(), 6);
        assert_eq!(idx.mapped_refs().len(), 4);
        assert!(idx.ref_errors().is_empty());
        let pet = &idx.mapped_refs()["#/components/schemas/Pet"];
        assert_eq!(pet.name, "Pet");
        assert!(pet.node.as_ref().unwrap().has_key("properties"));
    }

    #[test]
    fn test_missing_and_empty_refs_are_errors() {
        let idx = index("openapi: 3.0.0\npaths: {}\ncomponents:\n  schemas:\n    A:\n      $ref: '#/components/schemas/Nope'\n    B:\n      $ref: ''\n");
        assert_eq!(idx.ref_errors().len(), 2);
        let messages: Vec<String> = idx.ref_errors().iter().map(|e| e.to_string()).collect();
        assert!(messages.contains(&"component '#/components/schemas/Nope' does not exist in the specification".to_string()));
        assert!(messages.contains(&"schema reference is empty and cannot be processed".to_string()));
        let missing = idx
            .ref_errors()
            .iter()
            .find(|e| e.definition.ends_with("Nope"))
            .unwrap();
        assert_eq!(missing.path, "$.components.schemas.A");
    }

    #[test]
    fn test_circular_references() {
        let idx = index(PETS);
        assert_eq!(idx.circular_references().len(), 1);
        let c = &idx.circular_references()[0];
        assert_eq!(c.start.definition, "#/components/schemas/Pet");
        assert_eq!(c.journey_string, "** Pet ** --> Owner --> Pet");
    }

    #[test]
    fn test_skip_circular_references() {
        let config = IndexConfig {
            skip_circular_references: true,
            ..IndexConfig::default()
        };
        let idx = SpecIndex::new(&parse_document(PETS).unwrap(), config);
        assert!(idx.circular_references().is_empty());
    }

    #[test]
    fn test_descriptions_and_operation_ids() {
        let idx = index(PETS);
        let ids: Vec<&str> = idx.operation_ids().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(ids, vec!["listPets", "createPet"]);
        assert!(idx
            .all_descriptions()
            .iter()
            .any(|d| d.content == "all the pets" && d.path == "$.info.description"));
    }

    #[test]
    fn test_swagger_definitions() {
        let idx = index("swagger: '2.0'\npaths: {}\ndefinitions:\n  Pet:\n    type: object\nparameters:\n  limit:\n    name: limit\n    in: query\n");
        assert_eq!(idx.get_component_schema_count(), 1);
        assert!(idx.all_schemas().contains_key("#/definitions/Pet"));
        assert_eq!(idx.get_component_parameter_count(), 1);
    }

    #[test]
    fn test_empty_index() {
        let idx = SpecIndex::empty();
        assert_eq!(idx.get_path_count(), -1);
        assert_eq!(idx.get_operation_count(), -1);
        assert_eq!(idx.get_total_tags_count(), -1);
        let empty_doc = SpecIndex::new(&parse_document("").unwrap(), IndexConfig::default());
        assert_eq!(empty_doc.get_path_count(), -1);
    }

    #[test]
    fn test_http_methods() {
        assert!(is_http_method("GET"));
        assert!(is_http_method("trace"));
        assert!(!is_http_method("parameters"));
    }
}
