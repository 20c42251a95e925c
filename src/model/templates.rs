//! Message builders shared by the rule functions

pub fn field_validation(message: &str, field: &str, condition: &str) -> String {
    format!("{}: `{}` must be {}", message, field, condition)
}

pub fn field_must_not(message: &str, field: &str, condition: &str) -> String {
    format!("{}: `{}` must not be {}", message, field, condition)
}

pub fn field_message(message: &str, field: &str, detail: &str) -> String {
    format!("{}: `{}` {}", message, field, detail)
}

pub fn missing_required(kind: &str, item: &str, context: &str) -> String {
    format!("missing {} `{}` for `{}`", kind, item, context)
}

pub fn xor(message: &str, first: &str, second: &str) -> String {
    format!(
        "{}: `{}` and `{}` must not be both defined or undefined",
        message, first, second
    )
}

pub fn alphabetical(message: &str, value: &str, before: &str) -> String {
    format!(
        "{}: `{}` must be placed before `{}` (alphabetical)",
        message, value, before
    )
}

pub fn numerical_ordering(message: &str, value: &str, other: &str) -> String {
    format!(
        "{}: `{}` is less than `{}`, they need to be swapped (numerical ordering)",
        message, value, other
    )
}

pub fn enumeration(message: &str, value: &str, values: &str) -> String {
    format!("{}: `{}` must equal to one of: {}", message, value, values)
}

pub fn pattern_mismatch(message: &str, value: &str, pattern: &str) -> String {
    format!(
        "{}: `{}` does not match the expression `{}`",
        message, value, pattern
    )
}

pub fn pattern_match(message: &str, pattern: &str) -> String {
    format!("{}: matches the expression `{}`", message, pattern)
}

pub fn regex_error(message: &str, pattern: &str, error: &str) -> String {
    format!(
        "{}: `{}` cannot be compiled into a regular expression [`{}`]",
        message, pattern, error
    )
}

pub fn type_error(message: &str, value: &str, kind: &str, error: &str) -> String {
    format!("{}: `{}` is a {}. {}", message, value, kind, error)
}

pub fn kebab_case(segments: &str) -> String {
    format!("path segments `{}` do not use kebab-case", segments)
}

pub fn unknown_schema_type(kind: &str) -> String {
    format!("unknown schema type: `{}`", kind)
}

pub fn verb_in_path(path: &str, verb: &str) -> String {
    format!("path `{}` contains an HTTP Verb `{}`", path, verb)
}

pub fn missing_example(property: &str) -> String {
    format!(
        "media type schema property `{}` is missing `examples` or `example`",
        property
    )
}

pub fn required_field_missing(field: &str) -> String {
    format!("`required` field `{}` is not defined in `properties`", field)
}

pub fn response_missing_header(code: &str, headers: &str) -> String {
    format!(
        "response with code `{}`, must contain one of the defined headers: `{}`",
        code, headers
    )
}

pub fn api_key_in_url(key: &str) -> String {
    format!("API keys must not be passed via URL parameters (`{}`)", key)
}

pub fn credentials_in_url(param: &str) -> String {
    format!(
        "URL parameters must not contain credentials, passwords, or secrets (`{}`)",
        param
    )
}

pub fn security_not_defined(path: &str, method: &str) -> String {
    format!(
        "`security` was not defined for path `{}` in method `{}`",
        path, method
    )
}

pub fn security_empty(path: &str, method: &str) -> String {
    format!("`security` is empty for path `{}` in method `{}`", path, method)
}

pub fn security_null_elements(path: &str, method: &str) -> String {
    format!(
        "`security` has null elements for path `{}` in method `{}`",
        path, method
    )
}

/// `base.field`
pub fn path_field(base: &str, field: &str) -> String {
    format!("{}.{}", base, field)
}

/// `base[i]`
pub fn path_index(base: &str, index: usize) -> String {
    format!("{}[{}]", base, index)
}

/// `base['field']`
pub fn path_quoted(base: &str, field: &str) -> String {
    format!("{}['{}']", base, field)
}

/// `base.property[i]`
pub fn path_field_index(base: &str, property: &str, index: usize) -> String {
    format!("{}.{}[{}]", base, property, index)
}
