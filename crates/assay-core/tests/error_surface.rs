use std::path::Path;

use assay_core::errors::{AssayError, ErrorInfo};
use assay_core::serde::{from_json_slice, to_canonical_json_bytes};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("plate", "P1")
        .with_context("well", "B3")
}

#[test]
fn parse_mismatch_surface() {
    let err = AssayError::ParseMismatch(sample_info("read.no_reader", "no reader accepted the file"));
    assert_eq!(err.info().code, "read.no_reader");
    assert!(err.info().context.contains_key("plate"));
}

#[test]
fn missing_metadata_lists_fields() {
    let err = AssayError::MissingMetadata(
        ErrorInfo::new("details.missing", "details incomplete").with_context("fields", "researcher,date"),
    );
    assert_eq!(err.info().context["fields"], "researcher,date");
    assert!(err.to_string().starts_with("missing metadata:"));
}

#[test]
fn io_helper_records_path() {
    let err = AssayError::io("archive.open", Path::new("/tmp/a.zip"), "not found");
    assert!(matches!(err, AssayError::Io(_)));
    assert_eq!(err.info().context["path"], "/tmp/a.zip");
}

#[test]
fn hint_is_displayed() {
    let err = AssayError::Config(sample_info("rules.inconsistent", "two locators").with_hint("keep one"));
    let text = err.to_string();
    assert!(text.contains("code: rules.inconsistent"));
    assert!(text.contains("plate=P1, well=B3"));
    assert!(text.ends_with("hint: keep one"));
}

#[test]
fn errors_survive_json() {
    let err = AssayError::InvalidWell(sample_info("plate.invalid_well", "row out of range"));
    let bytes = to_canonical_json_bytes(&err).unwrap();
    let back: AssayError = from_json_slice(&bytes).unwrap();
    assert_eq!(back, err);
}
