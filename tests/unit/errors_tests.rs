/*!
 * Tests for the error taxonomy
 */

use legacy_migrate::errors::{CorrespondenceError, ImportError, SourceError, TargetError};

#[test]
fn test_importError_row_shouldNameTableAndSourceId() {
    let error = ImportError::row("products", 7, "category 99 is not migrated");
    let message = error.to_string();

    assert!(message.contains("products"));
    assert!(message.contains('7'));
    assert!(message.contains("category 99 is not migrated"));
    assert!(!error.is_structural());
}

#[test]
fn test_importError_structural_shouldBeStructural() {
    let error = ImportError::structural("urls", "count failed");
    assert!(error.is_structural());
    assert!(error.to_string().contains("count failed"));
}

#[test]
fn test_importError_fromLowerLayers_shouldNotBeStructural() {
    let from_mapping: ImportError = CorrespondenceError::MappingNotFound {
        family: "tax".to_string(),
        source_id: 1960,
    }
    .into();
    let from_target: ImportError = TargetError::rejected("product", "duplicate ref").into();
    let from_source: ImportError = SourceError::MissingColumn("ref".to_string()).into();

    for error in [from_mapping, from_target, from_source] {
        assert!(!error.is_structural(), "{} should not be structural", error);
    }
}

#[test]
fn test_appError_fromImportError_shouldKeepMessage() {
    let error: legacy_migrate::AppError = ImportError::structural("categories", "chunk read failed").into();
    assert!(error.to_string().contains("chunk read failed"));
}
