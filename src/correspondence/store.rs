/*!
 * Persistent correspondence store.
 *
 * Maps `(entity family, legacy id)` to the identifier the target system
 * assigned. Entries are inserted one at a time right after a target record
 * is created, read by any importer that needs to remap a foreign key, and
 * bulk-deleted per family before a fresh migration of that family.
 */

use log::debug;
use rusqlite::{params, OptionalExtension};

use crate::database::DatabaseConnection;
use crate::errors::CorrespondenceError;

use super::family::EntityFamily;

/// Outcome of a correspondence lookup
///
/// `NotFound` is an ordinary answer: the existence probe treats it as
/// "not migrated yet", while foreign-key resolution turns it into
/// `CorrespondenceError::MappingNotFound` through [`Lookup::require`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Found(i64),
    NotFound,
}

impl Lookup {
    /// The mapped target id, if any
    pub fn target(self) -> Option<i64> {
        match self {
            Lookup::Found(id) => Some(id),
            Lookup::NotFound => None,
        }
    }

    pub fn is_found(self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// Treat a missing mapping as an error
    pub fn require(self, family: EntityFamily, source_id: i64) -> Result<i64, CorrespondenceError> {
        match self {
            Lookup::Found(id) => Ok(id),
            Lookup::NotFound => Err(CorrespondenceError::MappingNotFound {
                family: family.to_string(),
                source_id,
            }),
        }
    }
}

/// Shared correspondence table, scoped by entity family
#[derive(Clone, Debug)]
pub struct CorrespondenceStore {
    db: DatabaseConnection,
}

impl CorrespondenceStore {
    /// Create a store over an initialized state database
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a store with an in-memory database (for testing)
    pub fn new_in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(DatabaseConnection::new_in_memory()?))
    }

    /// Delete every entry of a family; returns the number of entries removed
    pub async fn reset(&self, family: EntityFamily) -> Result<u64, CorrespondenceError> {
        let deleted = self
            .db
            .execute_async(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM correspondence WHERE entity_family = ?1",
                    [family.as_str()],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(storage_error)?;

        debug!("Reset {} correspondence: {} entries removed", family, deleted);
        Ok(deleted)
    }

    /// Register a new mapping; never overwrites an existing one
    pub async fn add_entry(
        &self,
        family: EntityFamily,
        source_id: i64,
        target_id: i64,
    ) -> Result<(), CorrespondenceError> {
        let inserted = self
            .db
            .execute_async(move |conn| {
                let result = conn.execute(
                    "INSERT INTO correspondence (entity_family, source_id, target_id, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        family.as_str(),
                        source_id,
                        target_id,
                        chrono::Utc::now().to_rfc3339()
                    ],
                );

                match result {
                    Ok(_) => Ok(true),
                    Err(rusqlite::Error::SqliteFailure(err, _))
                        if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(storage_error)?;

        if !inserted {
            return Err(CorrespondenceError::DuplicateMapping {
                family: family.to_string(),
                source_id,
            });
        }

        debug!("Mapped {} {} -> {}", family, source_id, target_id);
        Ok(())
    }

    /// Look up the target id of a legacy record
    pub async fn get_target(
        &self,
        family: EntityFamily,
        source_id: i64,
    ) -> Result<Lookup, CorrespondenceError> {
        let target = self
            .db
            .execute_async(move |conn| {
                let target: Option<i64> = conn
                    .query_row(
                        "SELECT target_id FROM correspondence
                         WHERE entity_family = ?1 AND source_id = ?2",
                        params![family.as_str(), source_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(target)
            })
            .await
            .map_err(storage_error)?;

        Ok(match target {
            Some(id) => Lookup::Found(id),
            None => Lookup::NotFound,
        })
    }

    /// Resolve a mapping that must exist (a required foreign key)
    pub async fn require_target(
        &self,
        family: EntityFamily,
        source_id: i64,
    ) -> Result<i64, CorrespondenceError> {
        self.get_target(family, source_id)
            .await?
            .require(family, source_id)
    }

    /// Number of entries in a family
    pub async fn count(&self, family: EntityFamily) -> Result<u64, CorrespondenceError> {
        self.db
            .execute_async(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM correspondence WHERE entity_family = ?1",
                    [family.as_str()],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(storage_error)
    }
}

fn storage_error(error: anyhow::Error) -> CorrespondenceError {
    CorrespondenceError::Storage(format!("{:#}", error))
}
