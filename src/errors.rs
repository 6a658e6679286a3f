/*!
 * Error types for the legacy-migrate application.
 *
 * This module contains custom error types for the different layers of the
 * migration engine, using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors raised by the correspondence store
#[derive(Error, Debug)]
pub enum CorrespondenceError {
    /// An entry for this (family, source id) pair already exists
    #[error("Duplicate mapping: {family} source ID {source_id} is already mapped")]
    DuplicateMapping {
        /// Entity family of the entry
        family: String,
        /// Legacy identifier
        source_id: i64,
    },

    /// A required mapping is missing
    #[error("No {family} mapping for source ID {source_id}")]
    MappingNotFound {
        /// Entity family of the lookup
        family: String,
        /// Legacy identifier
        source_id: i64,
    },

    /// The backing database failed
    #[error("Correspondence storage error: {0}")]
    Storage(String),
}

impl CorrespondenceError {
    /// Whether this error reports a missing mapping
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::MappingNotFound { .. })
    }
}

/// Errors raised while reading the legacy store
#[derive(Error, Debug)]
pub enum SourceError {
    /// The query could not be executed
    #[error("Source query failed: {0}")]
    Query(String),

    /// A row lacks a column the importer expects
    #[error("Missing column '{0}' in source row")]
    MissingColumn(String),

    /// A column holds a value of the wrong shape
    #[error("Invalid value in column '{column}': {message}")]
    InvalidValue {
        /// Column name
        column: String,
        /// What was wrong with it
        message: String,
    },

    /// A table or column name is not a plain identifier
    #[error("Invalid SQL identifier: '{0}'")]
    InvalidIdentifier(String),
}

/// Errors returned by the target command sink
#[derive(Error, Debug)]
pub enum TargetError {
    /// The target refused the command (business rule or validation failure)
    #[error("Target rejected {kind} command: {message}")]
    Rejected {
        /// Entity kind the command addressed
        kind: String,
        /// Rejection reason
        message: String,
    },

    /// The command referenced a target record that does not exist
    #[error("Target {kind} with ID {id} not found")]
    NotFound {
        /// Entity kind
        kind: String,
        /// Target identifier
        id: i64,
    },

    /// The target store itself failed
    #[error("Target storage error: {0}")]
    Storage(String),
}

impl TargetError {
    /// Create a Rejected error
    pub fn rejected(kind: impl Into<String>, message: impl Into<String>) -> Self {
        TargetError::Rejected {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by importers and the orchestrator
#[derive(Error, Debug)]
pub enum ImportError {
    /// A single source row could not be migrated
    #[error("Failed to migrate {table} row ID={source_id}: {reason}")]
    RowMigration {
        /// Table being migrated
        table: String,
        /// Legacy identifier of the row
        source_id: i64,
        /// Why the row failed
        reason: String,
    },

    /// Count or chunk read failure; aborts the chunk
    #[error("Structural failure while migrating {table}: {message}")]
    Structural {
        /// Table being migrated
        table: String,
        /// What failed
        message: String,
    },

    /// Correspondence store failure
    #[error("Correspondence error: {0}")]
    Mapping(#[from] CorrespondenceError),

    /// Source read failure
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Target write failure
    #[error("Target error: {0}")]
    Target(#[from] TargetError),
}

impl ImportError {
    /// Create a RowMigration error
    pub fn row(table: impl Into<String>, source_id: i64, reason: impl Into<String>) -> Self {
        ImportError::RowMigration {
            table: table.into(),
            source_id,
            reason: reason.into(),
        }
    }

    /// Create a Structural error
    pub fn structural(table: impl Into<String>, message: impl Into<String>) -> Self {
        ImportError::Structural {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts the chunk rather than a single row
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Structural { .. })
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from the migration engine
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Error from the correspondence store
    #[error("Correspondence error: {0}")]
    Correspondence(#[from] CorrespondenceError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
