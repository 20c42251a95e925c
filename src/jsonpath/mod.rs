//! JSONPath queries over the node tree
//!
//! Covers the dialect used by rule `given` expressions: child and descendant
//! navigation, wildcards, unions, slices and `?()` filters. Every match carries
//! its normalized path, e.g. `$.paths['/pets'].get`.

pub mod filter;

use crate::node::{node_id, NodeRef};
use dashmap::DashMap;
use filter::FilterExpr;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

const MAX_DEPTH: usize = 512;

static SIMPLE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$\-]*$").expect("valid key regex"));

/// JSONPath compile errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JsonPathError {
    #[error("invalid JSONPath '{path}' at position {position}: {message}")]
    Syntax {
        path: String,
        position: usize,
        message: String,
    },
}

/// A single navigation step
#[derive(Debug, Clone)]
pub enum Segment {
    Child(Selector),
    Descendant(Selector),
}

#[derive(Debug, Clone)]
pub enum Selector {
    Name(String),
    Wildcard,
    Index(i64),
    Slice(Option<i64>, Option<i64>, Option<i64>),
    Union(Vec<Selector>),
    Filter(Box<FilterExpr>),
}

/// A node selected by a query
#[derive(Debug, Clone)]
pub struct JsonPathMatch {
    pub node: NodeRef,
    /// Mapping key node, when the match was selected by key
    pub key: Option<NodeRef>,
    /// Normalized path to the match
    pub path: String,
}

/// A compiled JSONPath expression
#[derive(Debug, Clone)]
pub struct JsonPath {
    expression: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Compile an expression rooted at `$`
    pub fn compile(expression: &str) -> Result<Self, JsonPathError> {
        let trimmed = expression.trim();
        let mut cursor = Cursor::new(trimmed);
        if !cursor.eat('$') {
            return Err(cursor.error("path must start with '$'"));
        }
        let segments = parse_segments(&mut cursor)?;
        cursor.skip_ws();
        if let Some(c) = cursor.peek() {
            return Err(cursor.error(&format!("unexpected character '{}'", c)));
        }
        Ok(Self {
            expression: trimmed.to_string(),
            segments,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Run the query. A document node is unwrapped to its root.
    pub fn query(&self, node: &NodeRef) -> Vec<JsonPathMatch> {
        let root = match node.root() {
            Some(r) => Arc::clone(r),
            None => Arc::clone(node),
        };
        let start = vec![JsonPathMatch {
            node: Arc::clone(&root),
            key: None,
            path: "$".to_string(),
        }];
        let matches = evaluate(&self.segments, start, &root);

        let mut seen = HashSet::new();
        matches
            .into_iter()
            .filter(|m| seen.insert((node_id(&m.node), m.path.clone())))
            .collect()
    }

    /// Nodes only, without paths
    pub fn find_nodes(&self, node: &NodeRef) -> Vec<NodeRef> {
        self.query(node).into_iter().map(|m| m.node).collect()
    }
}

/// Concurrent cache of compiled expressions
#[derive(Debug, Default)]
pub struct JsonPathCache {
    entries: DashMap<String, Arc<JsonPath>>,
}

impl JsonPathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile once per distinct expression
    pub fn get_or_compile(&self, expression: &str) -> Result<Arc<JsonPath>, JsonPathError> {
        if let Some(found) = self.entries.get(expression) {
            return Ok(Arc::clone(found.value()));
        }
        let compiled = Arc::new(JsonPath::compile(expression)?);
        self.entries
            .insert(expression.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Append a mapping key to a normalized path
pub fn append_key(path: &str, key: &str) -> String {
    if SIMPLE_KEY.is_match(key) {
        format!("{}.{}", path, key)
    } else {
        format!("{}['{}']", path, key.replace('\'', "\\'"))
    }
}

/// Append a sequence index to a normalized path
pub fn append_index(path: &str, index: usize) -> String {
    format!("{}[{}]", path, index)
}

/// Compile and run a query in one step
pub fn find(node: &NodeRef, expression: &str) -> Result<Vec<JsonPathMatch>, JsonPathError> {
    Ok(JsonPath::compile(expression)?.query(node))
}

pub(crate) fn evaluate(
    segments: &[Segment],
    start: Vec<JsonPathMatch>,
    root: &NodeRef,
) -> Vec<JsonPathMatch> {
    let mut current = start;
    for segment in segments {
        let mut next = Vec::new();
        match segment {
            Segment::Child(selector) => {
                for m in &current {
                    select(selector, m, root, &mut next);
                }
            }
            Segment::Descendant(selector) => {
                for m in &current {
                    let mut all = Vec::new();
                    descendants(m, &mut all, 0);
                    for d in &all {
                        select(selector, d, root, &mut next);
                    }
                }
            }
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }
    current
}

fn descendants(m: &JsonPathMatch, out: &mut Vec<JsonPathMatch>, depth: usize) {
    out.push(m.clone());
    if depth > MAX_DEPTH {
        return;
    }
    for child in children_of(m) {
        descendants(&child, out, depth + 1);
    }
}

fn children_of(m: &JsonPathMatch) -> Vec<JsonPathMatch> {
    let node = m.node.resolved();
    if node.is_map() {
        node.pairs()
            .map(|(k, v)| JsonPathMatch {
                node: Arc::clone(v),
                key: Some(Arc::clone(k)),
                path: append_key(&m.path, &k.value),
            })
            .collect()
    } else if node.is_seq() {
        node.content
            .iter()
            .enumerate()
            .map(|(i, v)| JsonPathMatch {
                node: Arc::clone(v),
                key: None,
                path: append_index(&m.path, i),
            })
            .collect()
    } else {
        Vec::new()
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if index < 0 { len + index } else { index };
    if idx >= 0 && idx < len {
        Some(idx as usize)
    } else {
        None
    }
}

fn select(selector: &Selector, m: &JsonPathMatch, root: &NodeRef, out: &mut Vec<JsonPathMatch>) {
    let node = m.node.resolved();
    match selector {
        Selector::Name(name) => {
            if let Some((k, v)) = node.get_pair(name) {
                out.push(JsonPathMatch {
                    node: Arc::clone(v),
                    key: Some(Arc::clone(k)),
                    path: append_key(&m.path, name),
                });
            }
        }
        Selector::Wildcard => out.extend(children_of(m)),
        Selector::Index(index) => {
            if node.is_seq() {
                if let Some(i) = resolve_index(*index, node.content.len()) {
                    out.push(JsonPathMatch {
                        node: Arc::clone(&node.content[i]),
                        key: None,
                        path: append_index(&m.path, i),
                    });
                }
            }
        }
        Selector::Slice(start, end, step) => {
            if !node.is_seq() {
                return;
            }
            let len = node.content.len() as i64;
            let step = step.unwrap_or(1);
            if step <= 0 {
                return;
            }
            let clamp = |v: i64| if v < 0 { (len + v).max(0) } else { v.min(len) };
            let from = start.map(clamp).unwrap_or(0);
            let to = end.map(clamp).unwrap_or(len);
            let mut i = from;
            while i < to {
                let idx = i as usize;
                out.push(JsonPathMatch {
                    node: Arc::clone(&node.content[idx]),
                    key: None,
                    path: append_index(&m.path, idx),
                });
                match i.checked_add(step) {
                    Some(next) => i = next,
                    None => break,
                }
            }
        }
        Selector::Union(items) => {
            for item in items {
                select(item, m, root, out);
            }
        }
        Selector::Filter(expr) => {
            if node.is_map() {
                for (k, v) in node.pairs() {
                    let property = filter::Property::Key(k.value.clone());
                    if expr.matches(v, &property, root) {
                        out.push(JsonPathMatch {
                            node: Arc::clone(v),
                            key: Some(Arc::clone(k)),
                            path: append_key(&m.path, &k.value),
                        });
                    }
                }
            } else if node.is_seq() {
                for (i, v) in node.content.iter().enumerate() {
                    let property = filter::Property::Index(i);
                    if expr.matches(v, &property, root) {
                        out.push(JsonPathMatch {
                            node: Arc::clone(v),
                            key: None,
                            path: append_index(&m.path, i),
                        });
                    }
                }
            }
        }
    }
}

/// Character cursor shared by the path and filter parsers
pub(crate) struct Cursor<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    pub(crate) fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    pub(crate) fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    pub(crate) fn eat_str(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.pos += s.chars().count();
            true
        } else {
            false
        }
    }

    pub(crate) fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    pub(crate) fn expect(&mut self, c: char) -> Result<(), JsonPathError> {
        self.skip_ws();
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    pub(crate) fn error(&self, message: &str) -> JsonPathError {
        JsonPathError::Syntax {
            path: self.source.to_string(),
            position: self.pos,
            message: message.to_string(),
        }
    }

    pub(crate) fn quoted(&mut self) -> Result<String, JsonPathError> {
        let quote = match self.bump() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected quoted string")),
        };
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    pub(crate) fn integer(&mut self) -> Option<i64> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        match text.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                self.pos = start;
                None
            }
        }
    }

    fn name(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace()
                || matches!(
                    c,
                    '.' | '[' | ']' | '(' | ')' | '=' | '!' | '<' | '>' | '&' | '|' | ',' | '\'' | '"'
                )
            {
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        out
    }
}

/// Method calls that end a relative path inside a filter, e.g. `@.name.match(...)`
const FILTER_METHODS: [&str; 2] = [".match(", ".test("];

pub(crate) fn parse_segments(cursor: &mut Cursor) -> Result<Vec<Segment>, JsonPathError> {
    let mut segments = Vec::new();
    loop {
        match cursor.peek() {
            Some('.') if FILTER_METHODS.iter().any(|m| cursor.starts_with(m)) => break,
            Some('.') if cursor.peek_at(1) == Some('.') => {
                cursor.pos += 2;
                let selector = if cursor.peek() == Some('[') {
                    parse_bracket(cursor)?
                } else if cursor.eat('*') {
                    Selector::Wildcard
                } else {
                    let name = cursor.name();
                    if name.is_empty() {
                        return Err(cursor.error("expected name after '..'"));
                    }
                    Selector::Name(name)
                };
                segments.push(Segment::Descendant(selector));
            }
            Some('.') => {
                cursor.pos += 1;
                let selector = if cursor.eat('*') {
                    Selector::Wildcard
                } else {
                    let name = cursor.name();
                    if name.is_empty() {
                        return Err(cursor.error("expected name after '.'"));
                    }
                    Selector::Name(name)
                };
                segments.push(Segment::Child(selector));
            }
            Some('[') => segments.push(Segment::Child(parse_bracket(cursor)?)),
            _ => break,
        }
    }
    Ok(segments)
}

fn parse_bracket(cursor: &mut Cursor) -> Result<Selector, JsonPathError> {
    cursor.expect('[')?;
    cursor.skip_ws();
    let selector = match cursor.peek() {
        Some('*') => {
            cursor.bump();
            Selector::Wildcard
        }
        Some('?') => {
            cursor.bump();
            cursor.skip_ws();
            let expr = filter::parse_filter(cursor)?;
            Selector::Filter(Box::new(expr))
        }
        Some('\'' | '"') => {
            let mut names = vec![Selector::Name(cursor.quoted()?)];
            loop {
                cursor.skip_ws();
                if !cursor.eat(',') {
                    break;
                }
                cursor.skip_ws();
                names.push(Selector::Name(cursor.quoted()?));
            }
            if names.len() == 1 {
                names.remove(0)
            } else {
                Selector::Union(names)
            }
        }
        Some(c) if c.is_ascii_digit() || c == '-' || c == ':' => parse_index_or_slice(cursor)?,
        _ => return Err(cursor.error("unsupported bracket expression")),
    };
    cursor.expect(']')?;
    Ok(selector)
}

fn parse_index_or_slice(cursor: &mut Cursor) -> Result<Selector, JsonPathError> {
    let first = cursor.integer();
    cursor.skip_ws();
    if cursor.eat(':') {
        cursor.skip_ws();
        let end = cursor.integer();
        cursor.skip_ws();
        let step = if cursor.eat(':') {
            cursor.skip_ws();
            cursor.integer()
        } else {
            None
        };
        return Ok(Selector::Slice(first, end, step));
    }
    let first = first.ok_or_else(|| cursor.error("expected index"))?;
    let mut items = vec![Selector::Index(first)];
    loop {
        cursor.skip_ws();
        if !cursor.eat(',') {
            break;
        }
        cursor.skip_ws();
        let next = cursor.integer().ok_or_else(|| cursor.error("expected index"))?;
        items.push(Selector::Index(next));
    }
    if items.len() == 1 {
        Ok(items.remove(0))
    } else {
        Ok(Selector::Union(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::parse_document;

    const SPEC: &str = r#"openapi: 3.1.0
info:
  title: Pets
  x-logo: logo.png
paths:
  /pets:
    get:
      operationId: listPets
      parameters:
        - name: limit
          in: query
        - name: id
          in: path
      responses:
        '200':
          description: ok
    post:
      operationId: createPet
      responses:
        '201':
          $ref: '#/components/responses/Created'
components:
  responses:
    Created:
      description: created
"#;

    fn paths(expr: &str) -> Vec<String> {
        let doc = parse_document(SPEC).unwrap();
        find(&doc, expr).unwrap().into_iter().map(|m| m.path).collect()
    }

    #[test]
    fn test_root() {
        assert_eq!(paths("$"), vec!["$"]);
    }

    #[test]
    fn test_child_and_bracket_names() {
        assert_eq!(paths("$.info.title"), vec!["$.info.title"]);
        assert_eq!(paths("$.paths['/pets'].get"), vec!["$.paths['/pets'].get"]);
        assert_eq!(paths("$.info.x-logo"), vec!["$.info.x-logo"]);
    }

    #[test]
    fn test_wildcards() {
        assert_eq!(
            paths("$.paths[*][*].operationId"),
            vec![
                "$.paths['/pets'].get.operationId",
                "$.paths['/pets'].post.operationId"
            ]
        );
        assert_eq!(paths("$.info.*").len(), 2);
    }

    #[test]
    fn test_descendants() {
        assert_eq!(
            paths("$..$ref"),
            vec!["$.paths['/pets'].post.responses['201'].$ref"]
        );
        assert_eq!(paths("$..description").len(), 2);
    }

    #[test]
    fn test_indexes_unions_and_slices() {
        let base = "$.paths['/pets'].get.parameters";
        assert_eq!(paths(&format!("{}[0].name", base)), vec![format!("{}[0].name", base)]);
        assert_eq!(paths(&format!("{}[-1]", base)), vec![format!("{}[1]", base)]);
        assert_eq!(paths(&format!("{}[0,1]", base)).len(), 2);
        assert_eq!(paths(&format!("{}[0:1]", base)), vec![format!("{}[0]", base)]);
        assert_eq!(paths("$.paths['/pets']['get','post']").len(), 2);
    }

    #[test]
    fn test_slice_steps() {
        let base = "$.paths['/pets'].get.parameters";
        assert_eq!(paths(&format!("{}[0:2:2]", base)), vec![format!("{}[0]", base)]);
        assert_eq!(
            paths(&format!("{}[1:5:9223372036854775807]", base)),
            vec![format!("{}[1]", base)]
        );
        assert!(paths(&format!("{}[0:2:0]", base)).is_empty());
    }

    #[test]
    fn test_filters() {
        assert_eq!(
            paths("$..parameters[?(@.in == 'path')]"),
            vec!["$.paths['/pets'].get.parameters[1]"]
        );
        assert_eq!(paths("$.paths[*][?(@.operationId)]").len(), 2);
        assert_eq!(
            paths("$.paths[*][?(@property == 'post')]"),
            vec!["$.paths['/pets'].post"]
        );
        assert_eq!(paths("$.info[?(@property =~ /^x-/)]"), vec!["$.info.x-logo"]);
    }

    #[test]
    fn test_match_keys_are_reported() {
        let doc = parse_document(SPEC).unwrap();
        let matches = find(&doc, "$.info.title").unwrap();
        let key = matches[0].key.as_ref().unwrap();
        assert_eq!(key.value, "title");
        assert_eq!(key.line, 3);
    }

    #[test]
    fn test_missing_is_empty() {
        assert!(paths("$.nothing.here").is_empty());
        assert!(paths("$.info.title[0]").is_empty());
    }

    #[test]
    fn test_compile_errors() {
        assert!(JsonPath::compile("info.title").is_err());
        assert!(JsonPath::compile("$.paths[").is_err());
        assert!(JsonPath::compile("$.paths['abc").is_err());
        assert!(JsonPath::compile("$[?(@.a == )]").is_err());
    }

    #[test]
    fn test_cache_compiles_once() {
        let cache = JsonPathCache::new();
        let a = cache.get_or_compile("$.info").unwrap();
        let b = cache.get_or_compile("$.info").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_append_key_quotes_complex_keys() {
        assert_eq!(append_key("$", "info"), "$.info");
        assert_eq!(append_key("$.paths", "/pets"), "$.paths['/pets']");
        assert_eq!(append_key("$.responses", "200"), "$.responses['200']");
        assert_eq!(append_index("$.tags", 2), "$.tags[2]");
    }
}
