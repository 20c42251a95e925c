//! Field paths used by rule actions: `a.b`, `items[0].type`, `responses['200']`

use super::{find_key, find_key_top, NodeRef};
use std::sync::Arc;
use thiserror::Error;

/// Field path parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldPathError {
    #[error("field path cannot start with an index; use 'key[0]' instead of '[0]'")]
    LeadingIndex,

    #[error("empty segment in field path (consecutive dots)")]
    EmptySegment,

    #[error("unclosed bracket in field path")]
    UnclosedBracket,

    #[error("quotes cannot appear inside bracket string keys")]
    QuoteInsideKey,

    #[error("unclosed quote in bracket notation")]
    UnclosedQuote,

    #[error("expected ']' after quoted string in bracket notation")]
    ExpectedCloseBracket,

    #[error("empty index in bracket notation")]
    EmptyIndex,

    #[error("negative indices are not supported")]
    NegativeIndex,

    #[error("non-numeric content in brackets without quotes; use ['key'] for string keys")]
    NonNumericIndex,
}

/// One step of a parsed field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Plain dotted key: `name`
    Key(String),
    /// Sequence index: `[0]`
    Index(usize),
    /// Quoted map key: `['200']`
    MapKey(String),
}

/// Navigation options
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldPathOptions {
    /// Search the first segment recursively instead of at the top level only
    pub recursive_first_segment: bool,
}

/// Outcome of walking a field path
#[derive(Debug, Clone, Default)]
pub struct FieldPathResult {
    /// Key node (the element itself for sequence indexes)
    pub key_node: Option<NodeRef>,
    pub value_node: Option<NodeRef>,
    pub found: bool,
}

impl FieldPathResult {
    fn not_found() -> Self {
        Self::default()
    }
}

fn is_simple(path: &str) -> bool {
    !path.contains(['.', '[', ']', '\\'])
}

/// Parse a field path into segments
pub fn parse_field_path(path: &str) -> Result<Vec<PathSegment>, FieldPathError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    if is_simple(path) {
        return Ok(vec![PathSegment::Key(path.to_string())]);
    }

    let chars: Vec<char> = path.chars().collect();
    if chars[0] == '[' {
        return Err(FieldPathError::LeadingIndex);
    }

    let mut segments = Vec::with_capacity(4);
    let mut current = String::new();
    let n = chars.len();
    let mut i = 0;

    while i < n {
        match chars[i] {
            '\\' => {
                match chars.get(i + 1) {
                    Some(&next @ ('.' | '\\')) => current.push(next),
                    Some(&next) => {
                        current.push('\\');
                        current.push(next);
                    }
                    None => {
                        current.push('\\');
                        i += 1;
                        continue;
                    }
                }
                i += 2;
            }
            '.' => {
                if current.is_empty() {
                    return Err(FieldPathError::EmptySegment);
                }
                segments.push(PathSegment::Key(std::mem::take(&mut current)));
                i += 1;
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current)));
                } else if segments.is_empty() {
                    return Err(FieldPathError::LeadingIndex);
                }
                i += 1;
                if i >= n {
                    return Err(FieldPathError::UnclosedBracket);
                }
                let open = chars[i];
                if open == '\'' || open == '"' {
                    i += 1;
                    let start = i;
                    while i < n && chars[i] != open {
                        if chars[i] == '\'' || chars[i] == '"' {
                            return Err(FieldPathError::QuoteInsideKey);
                        }
                        i += 1;
                    }
                    if i >= n {
                        return Err(FieldPathError::UnclosedQuote);
                    }
                    let key: String = chars[start..i].iter().collect();
                    i += 1;
                    if i >= n || chars[i] != ']' {
                        return Err(FieldPathError::ExpectedCloseBracket);
                    }
                    i += 1;
                    segments.push(PathSegment::MapKey(key));
                } else {
                    let start = i;
                    while i < n && chars[i] != ']' {
                        i += 1;
                    }
                    if i >= n {
                        return Err(FieldPathError::UnclosedBracket);
                    }
                    let content: String = chars[start..i].iter().collect();
                    i += 1;
                    segments.push(PathSegment::Index(parse_index(&content)?));
                }
                if i < n && chars[i] == '.' {
                    i += 1;
                }
            }
            c => {
                current.push(c);
                i += 1;
            }
        }
    }

    if !current.is_empty() {
        segments.push(PathSegment::Key(current));
    }
    Ok(segments)
}

fn parse_index(content: &str) -> Result<usize, FieldPathError> {
    if content.is_empty() {
        return Err(FieldPathError::EmptyIndex);
    }
    match content.parse::<i64>() {
        Ok(v) if v < 0 => Err(FieldPathError::NegativeIndex),
        Ok(v) => usize::try_from(v).map_err(|_| FieldPathError::NonNumericIndex),
        Err(_) if content.starts_with('-') => Err(FieldPathError::NegativeIndex),
        Err(_) => Err(FieldPathError::NonNumericIndex),
    }
}

/// Walk `path` from `node`. Invalid paths are reported as not found.
pub fn find_field_path(path: &str, node: &NodeRef, opts: FieldPathOptions) -> FieldPathResult {
    if path.is_empty() {
        return FieldPathResult::not_found();
    }
    let lookup = |key: &str, target: &NodeRef, first: bool| {
        if first && opts.recursive_first_segment {
            find_key(key, target)
        } else {
            find_key_top(key, target)
        }
    };

    if is_simple(path) {
        return match lookup(path, node, true) {
            Some((k, v)) => FieldPathResult {
                key_node: Some(k),
                value_node: Some(v),
                found: true,
            },
            None => FieldPathResult::not_found(),
        };
    }

    let segments = match parse_field_path(path) {
        Ok(s) if !s.is_empty() => s,
        _ => return FieldPathResult::not_found(),
    };

    let mut current = Arc::clone(node);
    let mut key_node = None;
    let mut value_node = None;

    for (i, segment) in segments.iter().enumerate() {
        let (k, v) = match segment {
            PathSegment::Key(key) | PathSegment::MapKey(key) => match lookup(key, &current, i == 0)
            {
                Some(pair) => pair,
                None => return FieldPathResult::not_found(),
            },
            PathSegment::Index(idx) => {
                if !current.is_seq() {
                    return FieldPathResult::not_found();
                }
                match current.children().get(*idx) {
                    Some(item) => (Arc::clone(item), Arc::clone(item)),
                    None => return FieldPathResult::not_found(),
                }
            }
        };

        if let Some(next) = segments.get(i + 1) {
            let shape_ok = match next {
                PathSegment::Index(_) => v.is_seq(),
                _ => v.is_map(),
            };
            if !shape_ok {
                return FieldPathResult::not_found();
            }
            current = Arc::clone(&v);
        }
        key_node = Some(k);
        value_node = Some(v);
    }

    FieldPathResult {
        key_node,
        value_node,
        found: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::parse_document;

    fn key(s: &str) -> PathSegment {
        PathSegment::Key(s.to_string())
    }

    #[test]
    fn test_parse_dotted() {
        assert_eq!(
            parse_field_path("a.b.c").unwrap(),
            vec![key("a"), key("b"), key("c")]
        );
    }

    #[test]
    fn test_parse_escaped_dot() {
        assert_eq!(parse_field_path("a\\.b").unwrap(), vec![key("a.b")]);
        assert_eq!(parse_field_path("a\\\\b").unwrap(), vec![key("a\\b")]);
        assert_eq!(parse_field_path("a\\nb").unwrap(), vec![key("a\\nb")]);
    }

    #[test]
    fn test_parse_indexes_and_map_keys() {
        assert_eq!(
            parse_field_path("items[0].type").unwrap(),
            vec![key("items"), PathSegment::Index(0), key("type")]
        );
        assert_eq!(
            parse_field_path("responses['200']").unwrap(),
            vec![key("responses"), PathSegment::MapKey("200".to_string())]
        );
        assert_eq!(
            parse_field_path("paths[\"/pets\"].get").unwrap(),
            vec![key("paths"), PathSegment::MapKey("/pets".to_string()), key("get")]
        );
        assert_eq!(
            parse_field_path("a[0][1]").unwrap(),
            vec![key("a"), PathSegment::Index(0), PathSegment::Index(1)]
        );
    }

    #[test]
    fn test_parse_simple_fast_path() {
        assert_eq!(parse_field_path("description").unwrap(), vec![key("description")]);
        assert!(parse_field_path("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_field_path("a..b"), Err(FieldPathError::EmptySegment));
        assert_eq!(parse_field_path("[0].x"), Err(FieldPathError::LeadingIndex));
        assert_eq!(parse_field_path("items[-1]"), Err(FieldPathError::NegativeIndex));
        assert_eq!(parse_field_path("items[0"), Err(FieldPathError::UnclosedBracket));
        assert_eq!(parse_field_path("items["), Err(FieldPathError::UnclosedBracket));
        assert_eq!(parse_field_path("items[]"), Err(FieldPathError::EmptyIndex));
        assert_eq!(parse_field_path("items[abc]"), Err(FieldPathError::NonNumericIndex));
        assert_eq!(parse_field_path("r['a\"b']"), Err(FieldPathError::QuoteInsideKey));
        assert_eq!(parse_field_path("r['abc"), Err(FieldPathError::UnclosedQuote));
        assert_eq!(parse_field_path("r['abc'x"), Err(FieldPathError::ExpectedCloseBracket));
    }

    #[test]
    fn test_error_messages() {
        let err = parse_field_path("a..b").unwrap_err();
        assert!(err.to_string().contains("empty segment"));
        let err = parse_field_path("[0].x").unwrap_err();
        assert!(err.to_string().contains("cannot start with an index"));
        let err = parse_field_path("items[-1]").unwrap_err();
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn test_find_field_path() {
        let doc = parse_document(
            "paths:\n  /pets:\n    get:\n      responses:\n        '200':\n          description: ok\ntags:\n  - name: a\n  - name: b\n",
        )
        .unwrap();
        let root = doc.root().unwrap();

        let r = find_field_path("paths['/pets'].get.responses['200'].description", root, FieldPathOptions::default());
        assert!(r.found);
        assert_eq!(r.value_node.unwrap().value, "ok");

        let r = find_field_path("tags[1].name", root, FieldPathOptions::default());
        assert!(r.found);
        assert_eq!(r.value_node.unwrap().value, "b");

        let r = find_field_path("tags[5].name", root, FieldPathOptions::default());
        assert!(!r.found);

        let r = find_field_path("paths.missing", root, FieldPathOptions::default());
        assert!(!r.found);
    }

    #[test]
    fn test_find_field_path_recursive_first_segment() {
        let doc = parse_document("info:\n  contact:\n    name: x\n").unwrap();
        let root = doc.root().unwrap();
        assert!(!find_field_path("contact.name", root, FieldPathOptions::default()).found);
        let opts = FieldPathOptions {
            recursive_first_segment: true,
        };
        let r = find_field_path("contact.name", root, opts);
        assert!(r.found);
        assert_eq!(r.value_node.unwrap().value, "x");
    }

    #[test]
    fn test_find_field_path_escaped_key() {
        let doc = parse_document("a.b: dotted\n").unwrap();
        let root = doc.root().unwrap();
        let r = find_field_path("a\\.b", root, FieldPathOptions::default());
        assert!(r.found);
        assert_eq!(r.value_node.unwrap().value, "dotted");
    }
}
