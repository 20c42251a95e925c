//! Filter expressions: `[?(@.in == 'query' && !@.deprecated)]`

use super::{evaluate, parse_segments, Cursor, JsonPathError, JsonPathMatch, Segment};
use crate::node::{Node, NodeRef, Tag};
use regex::Regex;
use std::cmp::Ordering;
use std::sync::Arc;

/// Key or index of the element a filter is testing
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone)]
pub enum Operand {
    /// `@` followed by an optional relative path
    Current(Vec<Segment>),
    /// `$` followed by a path
    Root(Vec<Segment>),
    /// `@property`
    Property,
    Literal(Literal),
    List(Vec<Literal>),
    Regex(Regex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Nin,
    Matches,
}

#[derive(Debug, Clone)]
pub enum FilterExpr {
    Or(Box<FilterExpr>, Box<FilterExpr>),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
    Exists(Operand),
    Compare(Operand, CmpOp, Operand),
}

/// Parse a filter following `?`. Accepts `?(expr)` and bare `?expr`.
pub(crate) fn parse_filter(cursor: &mut Cursor) -> Result<FilterExpr, JsonPathError> {
    parse_or(cursor)
}

fn parse_or(cursor: &mut Cursor) -> Result<FilterExpr, JsonPathError> {
    let mut left = parse_and(cursor)?;
    loop {
        cursor.skip_ws();
        if !cursor.eat_str("||") {
            return Ok(left);
        }
        let right = parse_and(cursor)?;
        left = FilterExpr::Or(Box::new(left), Box::new(right));
    }
}

fn parse_and(cursor: &mut Cursor) -> Result<FilterExpr, JsonPathError> {
    let mut left = parse_unary(cursor)?;
    loop {
        cursor.skip_ws();
        if !cursor.eat_str("&&") {
            return Ok(left);
        }
        let right = parse_unary(cursor)?;
        left = FilterExpr::And(Box::new(left), Box::new(right));
    }
}

fn parse_unary(cursor: &mut Cursor) -> Result<FilterExpr, JsonPathError> {
    cursor.skip_ws();
    if cursor.peek() == Some('!') && cursor.peek_at(1) != Some('=') {
        cursor.bump();
        let inner = parse_unary(cursor)?;
        return Ok(FilterExpr::Not(Box::new(inner)));
    }
    if cursor.peek() == Some('(') {
        cursor.bump();
        let inner = parse_or(cursor)?;
        cursor.expect(')')?;
        return Ok(inner);
    }
    parse_comparison(cursor)
}

fn parse_comparison(cursor: &mut Cursor) -> Result<FilterExpr, JsonPathError> {
    let left = parse_operand(cursor)?;

    // method sugar: @property.match(/re/)
    if cursor.eat_str(".match(") || cursor.eat_str(".test(") {
        cursor.skip_ws();
        let right = parse_operand(cursor)?;
        cursor.expect(')')?;
        return Ok(FilterExpr::Compare(left, CmpOp::Matches, right));
    }

    cursor.skip_ws();
    let op = if cursor.eat_str("===") || cursor.eat_str("==") {
        CmpOp::Eq
    } else if cursor.eat_str("!==") || cursor.eat_str("!=") {
        CmpOp::Ne
    } else if cursor.eat_str("=~") {
        CmpOp::Matches
    } else if cursor.eat_str("<=") {
        CmpOp::Le
    } else if cursor.eat_str(">=") {
        CmpOp::Ge
    } else if cursor.eat_str("<") {
        CmpOp::Lt
    } else if cursor.eat_str(">") {
        CmpOp::Gt
    } else if cursor.eat_str("nin ") {
        CmpOp::Nin
    } else if cursor.eat_str("in ") {
        CmpOp::In
    } else {
        return Ok(FilterExpr::Exists(left));
    };
    cursor.skip_ws();
    let right = parse_operand(cursor)?;
    Ok(FilterExpr::Compare(left, op, right))
}

fn parse_operand(cursor: &mut Cursor) -> Result<Operand, JsonPathError> {
    cursor.skip_ws();
    match cursor.peek() {
        Some('@') => {
            cursor.bump();
            if cursor.eat_str("property") {
                return Ok(Operand::Property);
            }
            Ok(Operand::Current(parse_segments(cursor)?))
        }
        Some('$') => {
            cursor.bump();
            Ok(Operand::Root(parse_segments(cursor)?))
        }
        Some('\'' | '"') => Ok(Operand::Literal(Literal::Str(cursor.quoted()?))),
        Some('/') => parse_regex(cursor),
        Some('[') => {
            cursor.bump();
            let mut items = Vec::new();
            loop {
                cursor.skip_ws();
                if cursor.eat(']') {
                    break;
                }
                items.push(parse_literal(cursor)?);
                cursor.skip_ws();
                if !cursor.eat(',') {
                    cursor.expect(']')?;
                    break;
                }
            }
            Ok(Operand::List(items))
        }
        Some(_) => Ok(Operand::Literal(parse_literal(cursor)?)),
        None => Err(cursor.error("expected operand")),
    }
}

fn parse_literal(cursor: &mut Cursor) -> Result<Literal, JsonPathError> {
    cursor.skip_ws();
    match cursor.peek() {
        Some('\'' | '"') => return Ok(Literal::Str(cursor.quoted()?)),
        Some(c) if c.is_ascii_digit() || c == '-' => {
            let mut text = String::new();
            while let Some(c) = cursor.peek() {
                if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                    text.push(c);
                    cursor.bump();
                } else {
                    break;
                }
            }
            return text
                .parse::<f64>()
                .map(Literal::Num)
                .map_err(|_| cursor.error("invalid number"));
        }
        _ => {}
    }
    for (word, literal) in [
        ("true", Literal::Bool(true)),
        ("false", Literal::Bool(false)),
        ("null", Literal::Null),
        ("undefined", Literal::Null),
    ] {
        if cursor.eat_str(word) {
            return Ok(literal);
        }
    }
    Err(cursor.error("expected literal"))
}

fn parse_regex(cursor: &mut Cursor) -> Result<Operand, JsonPathError> {
    cursor.bump();
    let mut pattern = String::new();
    loop {
        match cursor.bump() {
            Some('\\') => {
                if let Some(next) = cursor.bump() {
                    if next != '/' {
                        pattern.push('\\');
                    }
                    pattern.push(next);
                }
            }
            Some('/') => break,
            Some(c) => pattern.push(c),
            None => return Err(cursor.error("unterminated regular expression")),
        }
    }
    let mut flags = String::new();
    while let Some(c) = cursor.peek() {
        if matches!(c, 'i' | 'm' | 's' | 'g' | 'u') {
            if c != 'g' && c != 'u' {
                flags.push(c);
            }
            cursor.bump();
        } else {
            break;
        }
    }
    let full = if flags.is_empty() {
        pattern
    } else {
        format!("(?{}){}", flags, pattern)
    };
    Regex::new(&full)
        .map(Operand::Regex)
        .map_err(|e| cursor.error(&format!("invalid regular expression: {}", e)))
}

/// Resolved value of an operand for one candidate
enum Value {
    Missing,
    Node(NodeRef),
    Lit(Literal),
    List(Vec<Literal>),
    Regex(Regex),
}

fn scalar_literal(node: &Node) -> Option<Literal> {
    let n = node.resolved();
    if !n.is_scalar() {
        return None;
    }
    Some(match n.tag {
        Tag::Null => Literal::Null,
        Tag::Bool => Literal::Bool(n.value.eq_ignore_ascii_case("true")),
        Tag::Int | Tag::Float => match n.as_f64() {
            Some(f) => Literal::Num(f),
            None => Literal::Str(n.value.clone()),
        },
        _ => Literal::Str(n.value.clone()),
    })
}

impl Value {
    fn literal(&self) -> Option<Literal> {
        match self {
            Value::Node(n) => scalar_literal(n),
            Value::Lit(l) => Some(l.clone()),
            _ => None,
        }
    }

    fn text(&self) -> Option<String> {
        match self.literal()? {
            Literal::Str(s) => Some(s),
            Literal::Num(n) => Some(format_number(n)),
            Literal::Bool(b) => Some(b.to_string()),
            Literal::Null => None,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Missing => false,
            Value::Node(n) => match scalar_literal(n) {
                Some(Literal::Bool(b)) => b,
                Some(Literal::Null) => false,
                _ => true,
            },
            Value::Lit(Literal::Bool(b)) => *b,
            Value::Lit(Literal::Null) => false,
            Value::Lit(Literal::Str(s)) => !s.is_empty(),
            Value::Lit(Literal::Num(n)) => *n != 0.0,
            Value::List(_) | Value::Regex(_) => true,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn literal_eq(a: &Literal, b: &Literal) -> bool {
    match (a, b) {
        (Literal::Num(x), Literal::Num(y)) => x == y,
        (Literal::Str(x), Literal::Str(y)) => x == y,
        (Literal::Bool(x), Literal::Bool(y)) => x == y,
        (Literal::Null, Literal::Null) => true,
        _ => false,
    }
}

fn literal_cmp(a: &Literal, b: &Literal) -> Option<Ordering> {
    match (a, b) {
        (Literal::Num(x), Literal::Num(y)) => x.partial_cmp(y),
        (Literal::Str(x), Literal::Str(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

impl FilterExpr {
    /// Test a candidate `node` reached through `property`
    pub fn matches(&self, node: &NodeRef, property: &Property, root: &NodeRef) -> bool {
        match self {
            FilterExpr::Or(a, b) => a.matches(node, property, root) || b.matches(node, property, root),
            FilterExpr::And(a, b) => {
                a.matches(node, property, root) && b.matches(node, property, root)
            }
            FilterExpr::Not(inner) => !inner.matches(node, property, root),
            FilterExpr::Exists(op) => resolve(op, node, property, root).truthy(),
            FilterExpr::Compare(left, op, right) => {
                let l = resolve(left, node, property, root);
                let r = resolve(right, node, property, root);
                compare(&l, *op, &r)
            }
        }
    }
}

fn compare(l: &Value, op: CmpOp, r: &Value) -> bool {
    match op {
        CmpOp::Eq => match (l.literal(), r.literal()) {
            (Some(a), Some(b)) => literal_eq(&a, &b),
            _ => false,
        },
        CmpOp::Ne => !compare(l, CmpOp::Eq, r),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ord = match (l.literal(), r.literal()) {
                (Some(a), Some(b)) => literal_cmp(&a, &b),
                _ => None,
            };
            match (ord, op) {
                (Some(o), CmpOp::Lt) => o == Ordering::Less,
                (Some(o), CmpOp::Le) => o != Ordering::Greater,
                (Some(o), CmpOp::Gt) => o == Ordering::Greater,
                (Some(o), CmpOp::Ge) => o != Ordering::Less,
                _ => false,
            }
        }
        CmpOp::In | CmpOp::Nin => {
            let found = match l.literal() {
                Some(needle) => match r {
                    Value::List(items) => items.iter().any(|i| literal_eq(i, &needle)),
                    Value::Node(n) if n.is_seq() => n
                        .children()
                        .iter()
                        .filter_map(|c| scalar_literal(c))
                        .any(|i| literal_eq(&i, &needle)),
                    _ => false,
                },
                None => false,
            };
            if op == CmpOp::In {
                found
            } else {
                !found
            }
        }
        CmpOp::Matches => match (l.text(), r) {
            (Some(text), Value::Regex(re)) => re.is_match(&text),
            (Some(text), other) => match other.text().and_then(|p| Regex::new(&p).ok()) {
                Some(re) => re.is_match(&text),
                None => false,
            },
            _ => false,
        },
    }
}

fn resolve(op: &Operand, node: &NodeRef, property: &Property, root: &NodeRef) -> Value {
    match op {
        Operand::Current(segments) => first_match(segments, node, root),
        Operand::Root(segments) => first_match(segments, root, root),
        Operand::Property => Value::Lit(match property {
            Property::Key(k) => Literal::Str(k.clone()),
            Property::Index(i) => Literal::Num(*i as f64),
        }),
        Operand::Literal(l) => Value::Lit(l.clone()),
        Operand::List(items) => Value::List(items.clone()),
        Operand::Regex(re) => Value::Regex(re.clone()),
    }
}

fn first_match(segments: &[Segment], start: &NodeRef, root: &NodeRef) -> Value {
    if segments.is_empty() {
        return Value::Node(Arc::clone(start));
    }
    let begin = vec![JsonPathMatch {
        node: Arc::clone(start),
        key: None,
        path: "@".to_string(),
    }];
    match evaluate(segments, begin, root).into_iter().next() {
        Some(m) => Value::Node(m.node),
        None => Value::Missing,
    }
}

#[cfg(test)]
mod tests {
    use crate::jsonpath::find;
    use crate::node::parse_document;

    const DOC: &str = r#"items:
  - name: a
    in: query
    required: true
    size: 3
  - name: b
    in: header
    required: false
    size: 10
  - name: c
    in: path
    tags: [x, y]
"#;

    fn names(expr: &str) -> Vec<String> {
        let doc = parse_document(DOC).unwrap();
        find(&doc, expr)
            .unwrap()
            .into_iter()
            .filter_map(|m| m.node.get_str("name").map(str::to_string))
            .collect()
    }

    #[test]
    fn test_boolean_operators() {
        assert_eq!(names("$.items[?(@.required)]"), vec!["a"]);
        assert_eq!(names("$.items[?(!@.required)]"), vec!["b", "c"]);
        assert_eq!(
            names("$.items[?(@.in == 'query' || @.in == 'path')]"),
            vec!["a", "c"]
        );
        assert_eq!(names("$.items[?(@.in != 'query' && @.size)]"), vec!["b"]);
    }

    #[test]
    fn test_numeric_comparisons() {
        assert_eq!(names("$.items[?(@.size > 5)]"), vec!["b"]);
        assert_eq!(names("$.items[?(@.size <= 3)]"), vec!["a"]);
    }

    #[test]
    fn test_membership_and_regex() {
        assert_eq!(names("$.items[?(@.in in ['path', 'header'])]"), vec!["b", "c"]);
        assert_eq!(names("$.items[?(@.name =~ /^[ab]$/)]"), vec!["a", "b"]);
        assert_eq!(names("$.items[?(@.name.match(/C/i))]"), vec!["c"]);
        assert_eq!(names("$.items[?('x' in @.tags)]"), vec!["c"]);
    }

    #[test]
    fn test_strict_equality_and_grouping() {
        assert_eq!(names("$.items[?(@.in === 'header')]"), vec!["b"]);
        assert_eq!(
            names("$.items[?((@.in == 'query' || @.in == 'header') && @.size > 5)]"),
            vec!["b"]
        );
    }

    #[test]
    fn test_property_index() {
        assert_eq!(names("$.items[?(@property == 2)]"), vec!["c"]);
    }
}
