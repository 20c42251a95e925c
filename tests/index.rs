//! Index counts over the burgershop document

use std::fs;
use std::path::PathBuf;
use vacuum::index::{IndexConfig, SpecIndex};
use vacuum::node::parse_document;

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn burgershop_index() -> SpecIndex {
    let source = fs::read_to_string(fixtures_path().join("burgershop-full.openapi.yaml")).unwrap();
    let document = parse_document(&source).unwrap();
    SpecIndex::new(&document, IndexConfig::default())
}

#[test]
fn test_burgershop_counts() {
    let index = burgershop_index();
    assert_eq!(index.get_path_count(), 5);
    assert_eq!(index.get_operation_count(), 5);
    assert_eq!(index.get_component_schema_count(), 5);
    assert_eq!(index.get_global_tags_count(), 2);
    assert_eq!(index.get_operation_tags_count(), 2);
    assert!(index.ref_errors().is_empty());
}

#[test]
fn test_burgershop_parameter_counts() {
    let index = burgershop_index();
    assert_eq!(index.get_component_parameter_count(), 0);
    // burgerId is declared under two paths, dressingId under one
    assert_eq!(index.get_operations_parameter_count(), 2);
    assert_eq!(index.get_inline_duplicate_param_count(), 1);
    assert_eq!(index.get_inline_unique_param_count(), 1);
}
