/*!
 * Commands accepted by the target system.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::TargetError;

/// Field map of a target record
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Kinds of records the target creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Category,
    Product,
    ProductImage,
    ProductDocument,
    Tax,
    TaxRule,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Product => "product",
            Self::ProductImage => "product_image",
            Self::ProductDocument => "product_document",
            Self::Tax => "tax",
            Self::TaxRule => "tax_rule",
        }
    }

    /// Rewrite-rule view name of this kind, when URLs can point at it
    pub fn view_name(&self) -> Option<&'static str> {
        match self {
            Self::Category => Some("category"),
            Self::Product => Some("product"),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship between two existing target records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Link {
    /// Content associated to a product
    ProductContent { product_id: i64, content_id: i64 },
    /// Product shown as an accessory of another product
    ProductAccessory { product_id: i64, accessory_id: i64 },
    /// Tax applied by a tax rule in a country
    TaxRuleTax {
        tax_rule_id: i64,
        tax_id: i64,
        country_id: i64,
    },
}

impl Link {
    pub fn relation(&self) -> &'static str {
        match self {
            Link::ProductContent { .. } => "product_content",
            Link::ProductAccessory { .. } => "product_accessory",
            Link::TaxRuleTax { .. } => "tax_rule_tax",
        }
    }

    /// (from, to) pair identifying the link within its relation
    pub fn endpoints(&self) -> (i64, i64) {
        match self {
            Link::ProductContent { product_id, content_id } => (*product_id, *content_id),
            Link::ProductAccessory { product_id, accessory_id } => (*product_id, *accessory_id),
            Link::TaxRuleTax { tax_rule_id, tax_id, .. } => (*tax_rule_id, *tax_id),
        }
    }

    /// Target records that must exist before the link can be created
    pub fn required_records(&self) -> Vec<(EntityKind, i64)> {
        match self {
            Link::ProductContent { product_id, .. } => vec![(EntityKind::Product, *product_id)],
            Link::ProductAccessory { product_id, accessory_id } => vec![
                (EntityKind::Product, *product_id),
                (EntityKind::Product, *accessory_id),
            ],
            Link::TaxRuleTax { tax_rule_id, tax_id, .. } => vec![
                (EntityKind::TaxRule, *tax_rule_id),
                (EntityKind::Tax, *tax_id),
            ],
        }
    }

    /// Extra attributes stored with the link
    pub fn data(&self) -> Fields {
        let mut data = Fields::new();
        if let Link::TaxRuleTax { country_id, .. } = self {
            data.insert("country_id".to_string(), (*country_id).into());
        }
        data
    }
}

/// A URL rewrite rule pointing at a target view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub url: String,
    pub view: String,
    pub view_id: i64,
    pub view_locale: String,
    /// Canonical rule this one redirects to; `None` for the canonical URL
    pub redirected: Option<i64>,
}

/// A create/update command sent to the target
#[derive(Debug, Clone, PartialEq)]
pub enum TargetCommand {
    Create { kind: EntityKind, fields: Fields },
    Update { kind: EntityKind, id: i64, fields: Fields },
    UpdatePosition { kind: EntityKind, id: i64, position: i64 },
    AssignTemplate { product_id: i64, template_id: i64, currency_id: i64 },
    Link(Link),
    RegisterRewrite(RewriteRule),
}

impl TargetCommand {
    /// Build a Create command from a serializable draft
    pub fn create<T: Serialize>(kind: EntityKind, draft: &T) -> Result<Self, TargetError> {
        Ok(TargetCommand::Create {
            kind,
            fields: to_fields(kind, draft)?,
        })
    }

    /// Build an Update command from a serializable draft
    pub fn update<T: Serialize>(kind: EntityKind, id: i64, draft: &T) -> Result<Self, TargetError> {
        Ok(TargetCommand::Update {
            kind,
            id,
            fields: to_fields(kind, draft)?,
        })
    }

    /// Short description used in log lines
    pub fn describe(&self) -> String {
        match self {
            TargetCommand::Create { kind, .. } => format!("create {}", kind),
            TargetCommand::Update { kind, id, .. } => format!("update {} {}", kind, id),
            TargetCommand::UpdatePosition { kind, id, position } => {
                format!("move {} {} to position {}", kind, id, position)
            }
            TargetCommand::AssignTemplate { product_id, template_id, .. } => {
                format!("assign template {} to product {}", template_id, product_id)
            }
            TargetCommand::Link(link) => {
                let (from, to) = link.endpoints();
                format!("link {} {} -> {}", link.relation(), from, to)
            }
            TargetCommand::RegisterRewrite(rule) => format!("register rewrite '{}'", rule.url),
        }
    }
}

fn to_fields<T: Serialize>(kind: EntityKind, draft: &T) -> Result<Fields, TargetError> {
    match serde_json::to_value(draft) {
        Ok(serde_json::Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(TargetError::rejected(
            kind.as_str(),
            format!("expected an object payload, got {}", other),
        )),
        Err(e) => Err(TargetError::rejected(kind.as_str(), e.to_string())),
    }
}

/// Result of a successfully applied command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A record was created with this id
    Created(i64),
    /// The command modified existing records
    Applied,
}

impl CommandOutcome {
    pub fn created_id(self) -> Option<i64> {
        match self {
            CommandOutcome::Created(id) => Some(id),
            CommandOutcome::Applied => None,
        }
    }
}

// =========================================================================
// Drafts
// =========================================================================

/// Product creation/update payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    #[serde(rename = "ref")]
    pub reference: String,
    pub locale: String,
    pub title: String,
    pub default_category_id: i64,
    pub visible: bool,
    pub base_price: f64,
    pub base_weight: f64,
    pub tax_rule_id: i64,
    pub currency_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postscriptum: Option<String>,
}

/// Category creation/update payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDraft {
    pub locale: String,
    pub title: String,
    /// Target id of the parent; 0 for a root category
    pub parent_id: i64,
    pub visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postscriptum: Option<String>,
}

/// Tax creation/update payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxDraft {
    pub locale: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub tax_type: String,
    pub requirements: serde_json::Value,
}

/// Tax rule creation/update payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRuleDraft {
    pub locale: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Image or document attached to a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDraft {
    pub product_id: i64,
    pub file: String,
    pub position: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Locale-only update of a title (used for translations of taxes and rules)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleDraft {
    pub locale: String,
    pub title: String,
}
