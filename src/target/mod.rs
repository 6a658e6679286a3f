/*!
 * Write side of the migration: the target system's command interface.
 *
 * Importers never touch target storage directly. They send create/update
 * commands through a [`TargetSink`], which applies the target's business
 * rules and answers with the identifier it assigned.
 *
 * Two sinks are bundled:
 * - [`MemoryTarget`]: in-process store used for dry runs and tests
 * - [`SqliteTarget`]: JSON documents in a SQLite file
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::TargetError;

pub mod command;
pub mod memory;
pub mod rules;
pub mod sqlite;

pub use command::{
    CategoryDraft, CommandOutcome, EntityKind, Fields, Link, MediaDraft, ProductDraft,
    RewriteRule, TargetCommand, TaxDraft, TaxRuleDraft, TitleDraft,
};
pub use memory::MemoryTarget;
pub use sqlite::SqliteTarget;

/// Command interface of the target system
#[async_trait]
pub trait TargetSink: Send + Sync + Debug {
    /// Apply one command
    async fn execute(&self, command: TargetCommand) -> Result<CommandOutcome, TargetError>;

    /// Delete every record of a kind, with its links and rewrite rules
    async fn purge(&self, kind: EntityKind) -> Result<u64, TargetError>;

    /// Id of the rewrite rule registered for a URL
    async fn find_rewrite_by_url(&self, url: &str) -> Result<Option<i64>, TargetError>;

    /// Id of the canonical (non-redirecting) rule for a view in a locale
    async fn find_default_rewrite(
        &self,
        view: &str,
        view_id: i64,
        locale: &str,
    ) -> Result<Option<i64>, TargetError>;

    /// Apply a create command and return the new record's id
    async fn create(&self, command: TargetCommand) -> Result<i64, TargetError> {
        let description = command.describe();
        self.execute(command).await?.created_id().ok_or_else(|| {
            TargetError::Storage(format!("'{}' did not report a new record id", description))
        })
    }
}
