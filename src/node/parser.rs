//! Event-driven construction of the node tree
//!
//! `yaml-rust2` emits parser events with source markers; the builder keeps a
//! stack of open collections and wraps each node in an `Arc` once it closes.

use super::{Node, NodeKind, NodeRef, ScalarStyle, Tag};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};

/// Errors raised while parsing a document
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("unable to parse document: {0}")]
    Parse(String),

    #[error("document is empty")]
    Empty,
}

/// Parse YAML or JSON text into a document node.
///
/// The returned node has kind `Document`; its single child is the root.
pub fn parse_document(source: &str) -> Result<NodeRef, NodeError> {
    // JSON forbids raw tabs inside strings, so tabs are always insignificant
    // whitespace there; YAML flow context rejects them as indentation.
    let prepared;
    let text = if looks_like_json(source) && source.contains('\t') {
        prepared = source.replace('\t', " ");
        prepared.as_str()
    } else {
        source
    };

    let mut builder = TreeBuilder::new(text);
    let mut parser = Parser::new_from_str(text);
    parser
        .load(&mut builder, false)
        .map_err(|e| NodeError::Parse(e.to_string()))?;

    match builder.documents.into_iter().next() {
        Some(doc) => Ok(doc),
        None => Ok(Node::new(NodeKind::Document)
            .with_position(1, 1)
            .into_ref()),
    }
}

fn looks_like_json(source: &str) -> bool {
    let trimmed = source.trim();
    (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
}

fn anchor_in(text: &str) -> Option<String> {
    let pos = text.rfind('&')?;
    let name: String = text[pos + 1..]
        .chars()
        .take_while(|c| !c.is_whitespace() && !matches!(c, ',' | ']' | '}'))
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

struct OpenNode {
    node: Node,
    anchor_id: usize,
}

struct TreeBuilder<'a> {
    lines: Vec<&'a str>,
    stack: Vec<OpenNode>,
    anchors: HashMap<usize, NodeRef>,
    documents: Vec<NodeRef>,
}

impl<'a> TreeBuilder<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines().collect(),
            stack: Vec::new(),
            anchors: HashMap::new(),
            documents: Vec::new(),
        }
    }

    fn open(&mut self, node: Node, anchor_id: usize) {
        self.stack.push(OpenNode { node, anchor_id });
    }

    fn close(&mut self) {
        if let Some(open) = self.stack.pop() {
            let node = Arc::new(open.node);
            if open.anchor_id > 0 {
                self.anchors.insert(open.anchor_id, Arc::clone(&node));
            }
            self.attach(node);
        }
    }

    fn attach(&mut self, node: NodeRef) {
        match self.stack.last_mut() {
            Some(parent) => parent.node.content.push(node),
            None => self.documents.push(node),
        }
    }

    /// Source text of a 1-based line
    fn line_text(&self, line: usize) -> &'a str {
        line.checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .copied()
            .unwrap_or("")
    }

    /// Anchor name written just before a node, e.g. `&pet`
    fn anchor_name(&self, line: usize, column: usize, anchor_id: usize) -> Option<String> {
        if anchor_id == 0 {
            return None;
        }
        // Block collections are marked at their first entry, so the anchor
        // may sit later on the same line or on the line above.
        let current = self.line_text(line);
        let prefix: String = current.chars().take(column.saturating_sub(1)).collect();
        let candidates = [prefix.as_str(), current, self.line_text(line.saturating_sub(1))];
        let name = candidates.iter().find_map(|text| anchor_in(text));
        Some(name.unwrap_or_else(|| format!("anchor{}", anchor_id)))
    }

    /// Trailing `# comment` after a single-line scalar
    fn line_comment(&self, line: usize, end_column: usize) -> String {
        let text = self.line_text(line);
        let rest: String = text.chars().skip(end_column.saturating_sub(1)).collect();
        match rest.find('#') {
            Some(pos) if pos == 0 || rest[..pos].ends_with(char::is_whitespace) => {
                let before = rest[..pos].trim();
                if before.is_empty() || before == "," || before == ":" {
                    rest[pos..].trim().to_string()
                } else {
                    String::new()
                }
            }
            _ => String::new(),
        }
    }

    /// Comment lines directly above a mapping key
    fn head_comment(&self, line: usize) -> String {
        let mut collected = Vec::new();
        let mut current = line;
        while current > 1 {
            current -= 1;
            let text = self.line_text(current).trim();
            if text.starts_with('#') {
                collected.push(text);
            } else {
                break;
            }
        }
        collected.reverse();
        collected.join("\n")
    }

    fn is_mapping_key_position(&self) -> bool {
        match self.stack.last() {
            Some(open) => open.node.kind == NodeKind::Mapping && open.node.content.len() % 2 == 0,
            None => false,
        }
    }

    fn scalar_style(&self, style: TScalarStyle, line: usize, column: usize) -> ScalarStyle {
        match style {
            TScalarStyle::SingleQuoted => ScalarStyle::SingleQuoted,
            TScalarStyle::DoubleQuoted => ScalarStyle::DoubleQuoted,
            TScalarStyle::Literal => ScalarStyle::Literal,
            TScalarStyle::Plain => ScalarStyle::Plain,
            _ => {
                let text = self.line_text(line);
                match text.chars().nth(column.saturating_sub(1)) {
                    Some('>') => ScalarStyle::Folded,
                    Some('|') => ScalarStyle::Literal,
                    _ => ScalarStyle::Plain,
                }
            }
        }
    }
}

impl MarkedEventReceiver for TreeBuilder<'_> {
    fn on_event(&mut self, event: Event, mark: Marker) {
        let line = mark.line().max(1);
        let column = mark.col() + 1;
        match event {
            Event::DocumentStart => {
                self.open(Node::new(NodeKind::Document).with_position(line, column), 0);
            }
            Event::DocumentEnd => self.close(),
            Event::MappingStart(anchor_id, ..) => {
                let mut node = Node::new(NodeKind::Mapping).with_position(line, column);
                node.anchor = self.anchor_name(line, column, anchor_id);
                self.open(node, anchor_id);
            }
            Event::SequenceStart(anchor_id, ..) => {
                let mut node = Node::new(NodeKind::Sequence).with_position(line, column);
                node.anchor = self.anchor_name(line, column, anchor_id);
                self.open(node, anchor_id);
            }
            Event::MappingEnd | Event::SequenceEnd => self.close(),
            Event::Scalar(value, style, anchor_id, ..) => {
                let style = self.scalar_style(style, line, column);
                let tag = if style == ScalarStyle::Plain {
                    Tag::infer(&value)
                } else {
                    Tag::Str
                };
                let is_key = self.is_mapping_key_position();
                let mut node = Node {
                    kind: NodeKind::Scalar,
                    tag,
                    style,
                    ..Node::default()
                }
                .with_position(line, column);
                if !matches!(style, ScalarStyle::Literal | ScalarStyle::Folded) {
                    let width = value.chars().count() + if style.is_quoted() { 2 } else { 0 };
                    node.line_comment = self.line_comment(line, column + width);
                }
                if is_key {
                    node.head_comment = self.head_comment(line);
                }
                node.anchor = self.anchor_name(line, column, anchor_id);
                node.value = value;
                let node = Arc::new(node);
                if anchor_id > 0 {
                    self.anchors.insert(anchor_id, Arc::clone(&node));
                }
                self.attach(node);
            }
            Event::Alias(anchor_id) => {
                let mut node = Node::new(NodeKind::Alias).with_position(line, column);
                if let Some(target) = self.anchors.get(&anchor_id) {
                    node.tag = target.tag;
                    node.value = target.value.clone();
                    node.anchor = target.anchor.clone();
                    node.alias = Some(Arc::clone(target));
                }
                self.attach(node.into_ref());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positions_are_one_based() {
        let doc = parse_document("openapi: 3.1.0\ninfo:\n  title: Pets\n").unwrap();
        assert_eq!(doc.kind, NodeKind::Document);
        let root = doc.root().unwrap();
        let (key, value) = root.get_pair("openapi").unwrap();
        assert_eq!((key.line, key.column), (1, 1));
        assert_eq!((value.line, value.column), (1, 10));
        let info = root.get("info").unwrap();
        let (title_key, _) = info.get_pair("title").unwrap();
        assert_eq!((title_key.line, title_key.column), (3, 3));
    }

    #[test]
    fn test_parse_json_with_tabs() {
        let doc = parse_document("{\n\t\"openapi\": \"3.0.0\",\n\t\"paths\": {}\n}").unwrap();
        let root = doc.root().unwrap();
        assert!(root.is_map());
        assert_eq!(root.get_str("openapi"), Some("3.0.0"));
        let (key, _) = root.get_pair("paths").unwrap();
        assert_eq!(key.line, 3);
    }

    #[test]
    fn test_quoted_scalars_are_strings() {
        let doc = parse_document("a: \"1\"\nb: 'true'\nc: 1\n").unwrap();
        let root = doc.root().unwrap();
        assert!(root.get("a").unwrap().is_string());
        assert_eq!(root.get("a").unwrap().style, ScalarStyle::DoubleQuoted);
        assert!(root.get("b").unwrap().is_string());
        assert!(root.get("c").unwrap().is_int());
    }

    #[test]
    fn test_aliases_resolve_to_anchor() {
        let doc = parse_document("base: &pet\n  name: dog\ncopy: *pet\n").unwrap();
        let root = doc.root().unwrap();
        let base = root.get("base").unwrap();
        assert_eq!(base.anchor.as_deref(), Some("pet"));
        let copy = root.get("copy").unwrap();
        assert_eq!(copy.kind, NodeKind::Alias);
        assert!(copy.is_map());
        assert_eq!(copy.get_str("name"), Some("dog"));
    }

    #[test]
    fn test_comments_are_captured() {
        let doc = parse_document("# about a\na: 1 # one\nb: two\n").unwrap();
        let root = doc.root().unwrap();
        let (a_key, a_value) = root.get_pair("a").unwrap();
        assert_eq!(a_key.head_comment, "# about a");
        assert_eq!(a_value.line_comment, "# one");
        assert_eq!(root.get("b").unwrap().line_comment, "");
    }

    #[test]
    fn test_empty_source_is_empty_document() {
        let doc = parse_document("").unwrap();
        assert!(doc.root().is_none());
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let err = parse_document("a: [1, 2\nb: }").unwrap_err();
        assert!(matches!(err, NodeError::Parse(_)));
    }
}
