/*!
 * Business rules shared by the bundled target sinks.
 *
 * The real target engine enforces far more; these are the checks the
 * migration depends on: required fields, unique product references,
 * localized text stored per locale.
 */

use serde_json::Value;

use crate::errors::TargetError;

use super::command::{EntityKind, Fields};

/// Fields stored per locale under `i18n.<locale>`
const LOCALIZED_FIELDS: [&str; 4] = ["title", "chapo", "description", "postscriptum"];

/// Fields a create command must carry, non-empty
pub fn required_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Product => &[
            "ref",
            "locale",
            "title",
            "default_category_id",
            "tax_rule_id",
            "currency_id",
        ],
        EntityKind::Category => &["locale", "title"],
        EntityKind::ProductImage | EntityKind::ProductDocument => &["product_id", "file"],
        EntityKind::Tax => &["locale", "title", "type"],
        EntityKind::TaxRule => &["locale", "title"],
    }
}

/// Field that must be unique among records of a kind
pub fn unique_field(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Product => Some("ref"),
        _ => None,
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Check a create payload
pub fn validate_create(kind: EntityKind, fields: &Fields) -> Result<(), TargetError> {
    for field in required_fields(kind) {
        if is_blank(fields.get(*field)) {
            return Err(TargetError::rejected(
                kind.as_str(),
                format!("field '{}' is required", field),
            ));
        }
    }
    Ok(())
}

/// Check an update payload: required fields may be omitted but not blanked
pub fn validate_update(kind: EntityKind, fields: &Fields) -> Result<(), TargetError> {
    for field in required_fields(kind) {
        if fields.contains_key(*field) && is_blank(fields.get(*field)) {
            return Err(TargetError::rejected(
                kind.as_str(),
                format!("field '{}' cannot be emptied", field),
            ));
        }
    }
    Ok(())
}

/// Merge a command payload into a stored record
///
/// When the payload names a locale, its localized fields go to
/// `i18n.<locale>` and leave other locales untouched.
pub fn merge_fields(record: &mut Fields, fields: &Fields) {
    let locale = fields
        .get("locale")
        .and_then(Value::as_str)
        .map(str::to_string);

    for (key, value) in fields {
        let localized = LOCALIZED_FIELDS.contains(&key.as_str());
        match (&locale, localized) {
            (Some(locale), true) => {
                let i18n = record
                    .entry("i18n")
                    .or_insert_with(|| Value::Object(Fields::new()));
                if let Value::Object(i18n) = i18n {
                    let translation = i18n
                        .entry(locale.clone())
                        .or_insert_with(|| Value::Object(Fields::new()));
                    if let Value::Object(translation) = translation {
                        translation.insert(key.clone(), value.clone());
                    }
                }
            }
            (_, _) if key == "locale" => {
                // The first locale a record was created with stays its default
                record.entry("locale").or_insert_with(|| value.clone());
            }
            _ => {
                record.insert(key.clone(), value.clone());
            }
        }
    }
}
