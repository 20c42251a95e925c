//! Spec sniffing: type, version and format label of a document

use crate::node::{parse_document, NodeError, NodeRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub const OPENAPI: &str = "openapi";
pub const SWAGGER: &str = "swagger";
pub const ASYNCAPI: &str = "asyncapi";

/// Errors raised while sniffing a spec
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecInfoError {
    #[error("unable to parse specification: {0}")]
    Parse(String),

    #[error("spec is defined as an openapi spec, but is using a swagger (2.0), or unknown version")]
    OpenApiVersion,

    #[error("spec is defined as a swagger (openapi 2.0) spec, but is an openapi 3 or unknown version")]
    SwaggerVersion,

    #[error("spec type not supported by vacuum, sorry")]
    Unsupported,
}

impl From<NodeError> for SpecInfoError {
    fn from(e: NodeError) -> Self {
        SpecInfoError::Parse(e.to_string())
    }
}

/// Spec flavor label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    #[serde(rename = "oas2")]
    Oas2,
    /// Any 3.x document when used as a rule format; 3.0 when used as a document label
    #[serde(rename = "oas3")]
    Oas3,
    /// Only 3.0
    #[serde(rename = "oas3_0")]
    Oas30,
    #[serde(rename = "oas3_1")]
    Oas31,
    #[serde(rename = "oas3_2")]
    Oas32,
    #[serde(rename = "asyncapi")]
    AsyncApi,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Oas2 => write!(f, "oas2"),
            Format::Oas3 => write!(f, "oas3"),
            Format::Oas30 => write!(f, "oas3_0"),
            Format::Oas31 => write!(f, "oas3_1"),
            Format::Oas32 => write!(f, "oas3_2"),
            Format::AsyncApi => write!(f, "asyncapi"),
        }
    }
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "oas2" => Ok(Format::Oas2),
            "oas3" => Ok(Format::Oas3),
            "oas3_0" => Ok(Format::Oas30),
            "oas3_1" => Ok(Format::Oas31),
            "oas3_2" => Ok(Format::Oas32),
            "asyncapi" => Ok(Format::AsyncApi),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

/// Does a rule declared for `rule_format` apply to a document labelled `doc_format`?
///
/// `oas3` covers every 3.x label; `oas3_0` matches only the plain 3.0 label;
/// everything else is an exact match.
pub fn format_matches(rule_format: Format, doc_format: Format) -> bool {
    match rule_format {
        Format::Oas3 => matches!(doc_format, Format::Oas3 | Format::Oas30 | Format::Oas31 | Format::Oas32),
        Format::Oas30 => matches!(doc_format, Format::Oas3 | Format::Oas30),
        other => other == doc_format,
    }
}

/// String form of [`format_matches`]; unknown labels never match
pub fn format_matches_str(rule_format: &str, doc_format: &str) -> bool {
    match (rule_format.parse(), doc_format.parse()) {
        (Ok(r), Ok(d)) => format_matches(r, d),
        _ => false,
    }
}

/// Whether the raw bytes were JSON or YAML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    Yaml,
    Json,
}

/// Everything known about a spec before indexing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecInfo {
    /// `openapi`, `swagger` or `asyncapi`
    pub spec_type: String,
    pub version: String,
    pub spec_format: Option<Format>,
    pub file_type: FileType,
    /// Source text
    pub spec: Arc<str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip)]
    pub root_node: Option<NodeRef>,
}

impl Default for SpecInfo {
    fn default() -> Self {
        Self {
            spec_type: String::new(),
            version: String::new(),
            spec_format: None,
            file_type: FileType::default(),
            spec: Arc::from(""),
            file_name: None,
            root_node: None,
        }
    }
}

impl SpecInfo {
    /// The format label used for rule matching
    pub fn format(&self) -> Option<Format> {
        self.spec_format
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn spec_bytes(&self) -> &[u8] {
        self.spec.as_bytes()
    }

    /// Parse the stored text again when the tree was not carried along
    pub fn ensure_root(&mut self) -> Result<NodeRef, SpecInfoError> {
        if let Some(root) = &self.root_node {
            return Ok(Arc::clone(root));
        }
        let root = parse_document(&self.spec)?;
        self.root_node = Some(Arc::clone(&root));
        Ok(root)
    }
}

fn major_version(version: &str) -> Option<u32> {
    version.trim().chars().next().and_then(|c| c.to_digit(10))
}

fn label_for(spec_type: &str, version: &str) -> Option<Format> {
    match spec_type {
        SWAGGER => Some(Format::Oas2),
        OPENAPI if version.starts_with("3.1") => Some(Format::Oas31),
        OPENAPI if version.starts_with("3.2") => Some(Format::Oas32),
        OPENAPI => Some(Format::Oas3),
        ASYNCAPI => Some(Format::AsyncApi),
        _ => None,
    }
}

/// Parse `spec` and work out what kind of document it is
pub fn extract_spec_info(spec: &[u8]) -> Result<SpecInfo, SpecInfoError> {
    let text = String::from_utf8_lossy(spec);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SpecInfoError::Parse("document is empty".to_string()));
    }
    let file_type = if trimmed.starts_with('{') && trimmed.ends_with('}') {
        FileType::Json
    } else {
        FileType::Yaml
    };

    let root_node = parse_document(&text)?;
    let root = root_node
        .root()
        .filter(|r| r.is_map())
        .ok_or(SpecInfoError::Unsupported)?;

    let mut spec_type = String::new();
    let mut version = String::new();

    if let Some(v) = root.get(OPENAPI).filter(|v| v.is_scalar()) {
        version = v.resolved().value.trim().to_string();
        if major_version(&version).map_or(true, |m| m < 3) {
            return Err(SpecInfoError::OpenApiVersion);
        }
        spec_type = OPENAPI.to_string();
    }
    if let Some(v) = root.get(SWAGGER).filter(|v| v.is_scalar()) {
        version = v.resolved().value.trim().to_string();
        if major_version(&version).map_or(true, |m| m > 2) {
            return Err(SpecInfoError::SwaggerVersion);
        }
        spec_type = SWAGGER.to_string();
    }
    if let Some(v) = root.get(ASYNCAPI).filter(|v| v.is_scalar()) {
        version = v.resolved().value.trim().to_string();
        spec_type = ASYNCAPI.to_string();
    }

    if spec_type.is_empty() {
        return Err(SpecInfoError::Unsupported);
    }

    Ok(SpecInfo {
        spec_format: label_for(&spec_type, &version),
        spec_type,
        version,
        file_type,
        spec: Arc::from(text.as_ref()),
        file_name: None,
        root_node: Some(Arc::clone(&root_node)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_matches() {
        assert!(format_matches_str("oas3", "oas3_1"));
        assert!(!format_matches_str("oas3_0", "oas3_1"));
        assert!(!format_matches_str("oas3", "oas2"));
        assert!(format_matches_str("oas3_0", "oas3"));
        assert!(format_matches_str("oas3", "oas3_2"));
        assert!(format_matches_str("oas3_1", "oas3_1"));
        assert!(!format_matches_str("oas3_1", "oas3_2"));
        assert!(format_matches_str("oas2", "oas2"));
        assert!(!format_matches_str("nope", "oas2"));
    }

    #[test]
    fn test_extract_openapi_3_1() {
        let info = extract_spec_info(b"openapi: 3.1.0\ninfo:\n  title: x\n").unwrap();
        assert_eq!(info.spec_type, "openapi");
        assert_eq!(info.version, "3.1.0");
        assert_eq!(info.format(), Some(Format::Oas31));
        assert_eq!(info.file_type, FileType::Yaml);
        assert!(info.root_node.is_some());
    }

    #[test]
    fn test_extract_json_swagger() {
        let info = extract_spec_info(br#"{"swagger": "2.0", "info": {}}"#).unwrap();
        assert_eq!(info.spec_type, "swagger");
        assert_eq!(info.format(), Some(Format::Oas2));
        assert_eq!(info.file_type, FileType::Json);
    }

    #[test]
    fn test_extract_asyncapi() {
        let info = extract_spec_info(b"asyncapi: 2.6.0\n").unwrap();
        assert_eq!(info.spec_type, "asyncapi");
        assert_eq!(info.format(), Some(Format::AsyncApi));
    }

    #[test]
    fn test_version_mismatches() {
        assert_eq!(
            extract_spec_info(b"openapi: 2.0\n").unwrap_err(),
            SpecInfoError::OpenApiVersion
        );
        assert_eq!(
            extract_spec_info(b"swagger: 3.0.0\n").unwrap_err(),
            SpecInfoError::SwaggerVersion
        );
        assert_eq!(
            extract_spec_info(b"title: nothing\n").unwrap_err(),
            SpecInfoError::Unsupported
        );
    }

    #[test]
    fn test_unparseable() {
        let err = extract_spec_info(b"a: [1, 2\nb: }").unwrap_err();
        assert!(err.to_string().starts_with("unable to parse specification"));
        assert!(extract_spec_info(b"   ").is_err());
    }
}
