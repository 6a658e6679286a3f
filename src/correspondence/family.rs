use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical family of migrated records; partitions the correspondence table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityFamily {
    Categories,
    Products,
    Templates,
    Tax,
    Contents,
    Folders,
}

impl EntityFamily {
    /// Every family, in a stable order
    pub const ALL: [EntityFamily; 6] = [
        EntityFamily::Categories,
        EntityFamily::Products,
        EntityFamily::Templates,
        EntityFamily::Tax,
        EntityFamily::Contents,
        EntityFamily::Folders,
    ];

    /// Name stored in the `entity_family` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Products => "products",
            Self::Templates => "templates",
            Self::Tax => "tax",
            Self::Contents => "contents",
            Self::Folders => "folders",
        }
    }
}

impl fmt::Display for EntityFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityFamily {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_lowercase();
        EntityFamily::ALL
            .into_iter()
            .find(|family| family.as_str() == name)
            .ok_or_else(|| anyhow::anyhow!("Invalid entity family: {}", s))
    }
}

/// Correspondence key of a legacy tax rate: the percentage scaled by 1000
///
/// Several products share one rate, so this key folds them onto one tax rule.
pub fn tax_rate_key(rate: f64) -> i64 {
    (rate * 1000.0).round() as i64
}
