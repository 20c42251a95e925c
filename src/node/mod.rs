//! YAML/JSON document nodes with source positions
//!
//! The parser owns the tree it builds. Everything downstream holds shared
//! `NodeRef` handles and never mutates a node in place; tools that need to
//! rewrite a subtree take a [`deep_copy`] first.

pub mod field_path;
pub mod parser;

pub use field_path::{
    find_field_path, parse_field_path, FieldPathError, FieldPathOptions, FieldPathResult,
    PathSegment,
};
pub use parser::{parse_document, NodeError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Shared handle to a node. Identity (pointer equality) is meaningful.
pub type NodeRef = Arc<Node>;

/// Maximum depth for recursive key searches
pub(crate) const MAX_SEARCH_DEPTH: usize = 256;

/// Structural kind of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Document,
    Mapping,
    Sequence,
    #[default]
    Scalar,
    Alias,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Document => write!(f, "document"),
            NodeKind::Mapping => write!(f, "mapping"),
            NodeKind::Sequence => write!(f, "sequence"),
            NodeKind::Scalar => write!(f, "scalar"),
            NodeKind::Alias => write!(f, "alias"),
        }
    }
}

/// Resolved type tag of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    #[default]
    Str,
    Int,
    Float,
    Bool,
    Null,
    Map,
    Seq,
}

impl Tag {
    /// The YAML short form, e.g. `!!str`
    pub fn as_yaml(&self) -> &'static str {
        match self {
            Tag::Str => "!!str",
            Tag::Int => "!!int",
            Tag::Float => "!!float",
            Tag::Bool => "!!bool",
            Tag::Null => "!!null",
            Tag::Map => "!!map",
            Tag::Seq => "!!seq",
        }
    }

    /// Infer the tag of a plain (unquoted) scalar using the YAML 1.2 core schema
    pub fn infer(value: &str) -> Tag {
        match value {
            "" | "~" | "null" | "Null" | "NULL" => return Tag::Null,
            "true" | "True" | "TRUE" | "false" | "False" | "FALSE" => return Tag::Bool,
            ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" | "-.inf" | "-.Inf"
            | "-.INF" | ".nan" | ".NaN" | ".NAN" => return Tag::Float,
            _ => {}
        }
        if is_int_literal(value) {
            Tag::Int
        } else if is_float_literal(value) {
            Tag::Float
        } else {
            Tag::Str
        }
    }
}

fn is_int_literal(value: &str) -> bool {
    if let Some(hex) = value.strip_prefix("0x") {
        return !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    if let Some(oct) = value.strip_prefix("0o") {
        return !oct.is_empty() && oct.chars().all(|c| ('0'..='7').contains(&c));
    }
    let digits = value.strip_prefix(['-', '+']).unwrap_or(value);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn is_float_literal(value: &str) -> bool {
    let body = value.strip_prefix(['-', '+']).unwrap_or(value);
    if body.is_empty() || !body.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return false;
    }
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body, None),
    };
    let mut seen_dot = false;
    let mut seen_digit = false;
    for c in mantissa.chars() {
        match c {
            '.' if !seen_dot => seen_dot = true,
            '0'..='9' => seen_digit = true,
            _ => return false,
        }
    }
    if !seen_digit {
        return false;
    }
    match exponent {
        Some(exp) => {
            let exp = exp.strip_prefix(['-', '+']).unwrap_or(exp);
            !exp.is_empty() && exp.chars().all(|c| c.is_ascii_digit())
        }
        None => seen_dot,
    }
}

/// Presentation style of a scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScalarStyle {
    #[default]
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
}

impl ScalarStyle {
    pub fn is_quoted(&self) -> bool {
        matches!(self, ScalarStyle::SingleQuoted | ScalarStyle::DoubleQuoted)
    }
}

/// A single node of a parsed YAML or JSON document
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub kind: NodeKind,
    pub tag: Tag,
    /// Scalar text; empty for collections
    pub value: String,
    pub style: ScalarStyle,
    pub anchor: Option<String>,
    pub head_comment: String,
    pub line_comment: String,
    pub foot_comment: String,
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
    /// Children. Mappings store keys and values interleaved.
    pub content: Vec<NodeRef>,
    /// Target of an alias node
    pub alias: Option<NodeRef>,
}

impl Node {
    /// Create an empty node of the given kind
    pub fn new(kind: NodeKind) -> Self {
        let tag = match kind {
            NodeKind::Mapping => Tag::Map,
            NodeKind::Sequence => Tag::Seq,
            _ => Tag::Str,
        };
        Self {
            kind,
            tag,
            ..Default::default()
        }
    }

    /// Create a string scalar
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Scalar,
            tag: Tag::Str,
            value: value.into(),
            ..Default::default()
        }
    }

    /// Create a scalar whose tag is inferred from its text
    pub fn plain(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            kind: NodeKind::Scalar,
            tag: Tag::infer(&value),
            value,
            ..Default::default()
        }
    }

    pub fn with_position(mut self, line: usize, column: usize) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn with_content(mut self, content: Vec<NodeRef>) -> Self {
        self.content = content;
        self
    }

    pub fn with_style(mut self, style: ScalarStyle) -> Self {
        self.style = style;
        self
    }

    pub fn into_ref(self) -> NodeRef {
        Arc::new(self)
    }

    /// Follow an alias to its target; any other node is returned as-is
    pub fn resolved(&self) -> &Node {
        let mut node = self;
        let mut hops = 0;
        while let (NodeKind::Alias, Some(target)) = (node.kind, node.alias.as_ref()) {
            node = target.as_ref();
            hops += 1;
            if hops > MAX_SEARCH_DEPTH {
                break;
            }
        }
        node
    }

    pub fn is_map(&self) -> bool {
        self.resolved().kind == NodeKind::Mapping
    }

    pub fn is_seq(&self) -> bool {
        self.resolved().kind == NodeKind::Sequence
    }

    pub fn is_scalar(&self) -> bool {
        self.resolved().kind == NodeKind::Scalar
    }

    pub fn is_document(&self) -> bool {
        self.kind == NodeKind::Document
    }

    pub fn is_string(&self) -> bool {
        let n = self.resolved();
        n.kind == NodeKind::Scalar && n.tag == Tag::Str
    }

    pub fn is_int(&self) -> bool {
        let n = self.resolved();
        n.kind == NodeKind::Scalar && n.tag == Tag::Int
    }

    pub fn is_float(&self) -> bool {
        let n = self.resolved();
        n.kind == NodeKind::Scalar && n.tag == Tag::Float
    }

    pub fn is_bool(&self) -> bool {
        let n = self.resolved();
        n.kind == NodeKind::Scalar && n.tag == Tag::Bool
    }

    pub fn is_null(&self) -> bool {
        let n = self.resolved();
        n.kind == NodeKind::Scalar && n.tag == Tag::Null
    }

    /// Boolean value of a bool scalar
    pub fn as_bool(&self) -> Option<bool> {
        if !self.is_bool() {
            return None;
        }
        Some(self.resolved().value.eq_ignore_ascii_case("true"))
    }

    /// Integer value of an int scalar (decimal, hex or octal)
    pub fn as_i64(&self) -> Option<i64> {
        let n = self.resolved();
        if n.tag != Tag::Int {
            return None;
        }
        let v = n.value.as_str();
        if let Some(hex) = v.strip_prefix("0x") {
            i64::from_str_radix(hex, 16).ok()
        } else if let Some(oct) = v.strip_prefix("0o") {
            i64::from_str_radix(oct, 8).ok()
        } else {
            v.parse().ok()
        }
    }

    /// Numeric value of an int or float scalar
    pub fn as_f64(&self) -> Option<f64> {
        let n = self.resolved();
        match n.tag {
            Tag::Int => self.as_i64().map(|v| v as f64),
            Tag::Float => match n.value.as_str() {
                ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => Some(f64::INFINITY),
                "-.inf" | "-.Inf" | "-.INF" => Some(f64::NEG_INFINITY),
                ".nan" | ".NaN" | ".NAN" => Some(f64::NAN),
                other => other.parse().ok(),
            },
            _ => None,
        }
    }

    /// Key/value pairs of a mapping; empty for anything else
    pub fn pairs(&self) -> impl Iterator<Item = (&NodeRef, &NodeRef)> {
        let n = self.resolved();
        let content: &[NodeRef] = if n.kind == NodeKind::Mapping {
            &n.content
        } else {
            &[]
        };
        content.chunks_exact(2).map(|c| (&c[0], &c[1]))
    }

    /// Children of a collection, following aliases
    pub fn children(&self) -> &[NodeRef] {
        &self.resolved().content
    }

    /// Value for a key in this mapping (non-recursive)
    pub fn get(&self, key: &str) -> Option<&NodeRef> {
        self.pairs().find(|(k, _)| k.value == key).map(|(_, v)| v)
    }

    /// Key and value for a key in this mapping (non-recursive)
    pub fn get_pair(&self, key: &str) -> Option<(&NodeRef, &NodeRef)> {
        self.pairs().find(|(k, _)| k.value == key)
    }

    /// Scalar text of a key's value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .filter(|v| v.is_scalar())
            .map(|v| v.resolved().value.as_str())
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Root content of a document node, or the node itself
    pub fn root(&self) -> Option<&NodeRef> {
        if self.kind == NodeKind::Document {
            self.content.first()
        } else {
            None
        }
    }

    /// Project the node into a JSON value
    pub fn to_json(&self) -> Value {
        self.to_json_depth(0)
    }

    fn to_json_depth(&self, depth: usize) -> Value {
        if depth > MAX_SEARCH_DEPTH {
            return Value::Null;
        }
        let n = self.resolved();
        match n.kind {
            NodeKind::Document => n
                .content
                .first()
                .map(|c| c.to_json_depth(depth + 1))
                .unwrap_or(Value::Null),
            NodeKind::Mapping => {
                let mut map = serde_json::Map::new();
                for (k, v) in n.pairs() {
                    map.insert(k.value.clone(), v.to_json_depth(depth + 1));
                }
                Value::Object(map)
            }
            NodeKind::Sequence => Value::Array(
                n.content
                    .iter()
                    .map(|c| c.to_json_depth(depth + 1))
                    .collect(),
            ),
            NodeKind::Scalar => match n.tag {
                Tag::Null => Value::Null,
                Tag::Bool => Value::Bool(n.value.eq_ignore_ascii_case("true")),
                Tag::Int => match n.as_i64() {
                    Some(i) => Value::from(i),
                    None => Value::String(n.value.clone()),
                },
                Tag::Float => match n.as_f64().and_then(serde_json::Number::from_f64) {
                    Some(f) => Value::Number(f),
                    None => Value::String(n.value.clone()),
                },
                _ => Value::String(n.value.clone()),
            },
            NodeKind::Alias => Value::Null,
        }
    }

    /// Build a node tree from a JSON value. Positions are left at zero.
    pub fn from_json(value: &Value) -> NodeRef {
        let node = match value {
            Value::Null => Node {
                tag: Tag::Null,
                value: "null".to_string(),
                ..Node::new(NodeKind::Scalar)
            },
            Value::Bool(b) => Node {
                tag: Tag::Bool,
                value: b.to_string(),
                ..Node::new(NodeKind::Scalar)
            },
            Value::Number(n) => Node {
                tag: if n.is_f64() { Tag::Float } else { Tag::Int },
                value: n.to_string(),
                ..Node::new(NodeKind::Scalar)
            },
            Value::String(s) => Node::string(s.clone()),
            Value::Array(items) => {
                Node::new(NodeKind::Sequence).with_content(items.iter().map(Node::from_json).collect())
            }
            Value::Object(map) => {
                let mut content = Vec::with_capacity(map.len() * 2);
                for (k, v) in map {
                    content.push(Node::string(k.clone()).into_ref());
                    content.push(Node::from_json(v));
                }
                Node::new(NodeKind::Mapping).with_content(content)
            }
        };
        node.into_ref()
    }
}

/// Stable identity of a node handle, for use as a map key
pub fn node_id(node: &NodeRef) -> usize {
    Arc::as_ptr(node) as usize
}

/// Non-recursive lookup of `key` in a mapping
pub fn find_key_top(key: &str, node: &NodeRef) -> Option<(NodeRef, NodeRef)> {
    let target = if node.is_document() { node.root()? } else { node };
    target
        .get_pair(key)
        .map(|(k, v)| (Arc::clone(k), Arc::clone(v)))
}

/// Depth-first lookup of the first mapping key equal to `key`
pub fn find_key(key: &str, node: &NodeRef) -> Option<(NodeRef, NodeRef)> {
    find_key_depth(key, node, 0)
}

fn find_key_depth(key: &str, node: &NodeRef, depth: usize) -> Option<(NodeRef, NodeRef)> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }
    let n = node.resolved();
    match n.kind {
        NodeKind::Mapping => {
            if let Some((k, v)) = n.get_pair(key) {
                return Some((Arc::clone(k), Arc::clone(v)));
            }
            n.pairs()
                .find_map(|(_, v)| find_key_depth(key, v, depth + 1))
        }
        NodeKind::Sequence | NodeKind::Document => n
            .content
            .iter()
            .find_map(|c| find_key_depth(key, c, depth + 1)),
        _ => None,
    }
}

/// Recursive deep copy: every node is newly allocated
pub fn deep_copy(node: &NodeRef) -> NodeRef {
    let copy = Node {
        kind: node.kind,
        tag: node.tag,
        value: node.value.clone(),
        style: node.style,
        anchor: node.anchor.clone(),
        head_comment: node.head_comment.clone(),
        line_comment: node.line_comment.clone(),
        foot_comment: node.foot_comment.clone(),
        line: node.line,
        column: node.column,
        content: node.content.iter().map(deep_copy).collect(),
        alias: node.alias.as_ref().map(deep_copy),
    };
    Arc::new(copy)
}

/// The deepest last descendant of a node
pub fn last_child(node: &NodeRef) -> NodeRef {
    let mut current = Arc::clone(node);
    let mut depth = 0;
    while let Some(last) = current.children().last().cloned() {
        current = last;
        depth += 1;
        if depth > MAX_SEARCH_DEPTH {
            break;
        }
    }
    current
}

/// Synthesize a node positioned where the rendering of `node` ends.
///
/// Quoted scalars are two characters wider than their value. Block scalars
/// end on their last line. Collections end where their last descendant ends.
pub fn end_node(node: &NodeRef) -> NodeRef {
    let n = if node.is_scalar() {
        Arc::clone(node)
    } else {
        last_child(node)
    };
    let (line, column) = match n.style {
        ScalarStyle::Literal | ScalarStyle::Folded => {
            let lines: Vec<&str> = n.value.trim_end_matches('\n').lines().collect();
            let last_len = lines.last().map(|l| l.chars().count()).unwrap_or(0);
            (n.line + lines.len(), n.column + last_len)
        }
        style => {
            let width = n.value.chars().count() + if style.is_quoted() { 2 } else { 0 };
            (n.line, n.column + width)
        }
    };
    Node::string("").with_position(line.max(1), column).into_ref()
}
