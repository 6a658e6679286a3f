/*!
 * Target store persisted as JSON documents in SQLite.
 *
 * Stands in for the target engine when migrating to a file: every record is
 * one row `(kind, id, fields)` with the same business rules as the memory
 * store.
 */

use async_trait::async_trait;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::errors::TargetError;

use super::command::{CommandOutcome, EntityKind, Fields, Link, RewriteRule, TargetCommand};
use super::rules;
use super::TargetSink;

const TARGET_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS records (
        kind TEXT NOT NULL,
        id INTEGER NOT NULL,
        fields TEXT NOT NULL,
        PRIMARY KEY (kind, id)
    );

    CREATE TABLE IF NOT EXISTS sequences (
        kind TEXT PRIMARY KEY,
        last_id INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS links (
        relation TEXT NOT NULL,
        from_id INTEGER NOT NULL,
        to_id INTEGER NOT NULL,
        data TEXT NOT NULL DEFAULT '{}',
        PRIMARY KEY (relation, from_id, to_id)
    );

    CREATE TABLE IF NOT EXISTS rewrite_urls (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL UNIQUE,
        view TEXT NOT NULL,
        view_id INTEGER NOT NULL,
        view_locale TEXT NOT NULL,
        redirected INTEGER REFERENCES rewrite_urls(id)
    );

    CREATE INDEX IF NOT EXISTS idx_rewrite_urls_view
        ON rewrite_urls(view, view_id, view_locale);
"#;

/// SQLite-backed target store
#[derive(Clone)]
pub struct SqliteTarget {
    path: PathBuf,
    connection: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTarget").field("path", &self.path).finish()
    }
}

fn storage(error: rusqlite::Error) -> TargetError {
    TargetError::Storage(error.to_string())
}

fn json_error(error: serde_json::Error) -> TargetError {
    TargetError::Storage(format!("Invalid stored record: {}", error))
}

/// SQL value comparable with `json_extract` output
fn json_param(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;

    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Sql::Integer(i),
            None => Sql::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}

impl SqliteTarget {
    /// Open (or create) a target store file
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create target directory: {:?}", parent))?;
            }
        }

        info!("Opening target store at: {:?}", path);
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open target store: {:?}", path))?;
        Self::with_connection(path, conn)
    }

    /// Create a target store in memory (for testing)
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(PathBuf::from(":memory:"), conn)
    }

    fn with_connection(path: PathBuf, conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(TARGET_SCHEMA)?;
        Ok(Self {
            path,
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of one record
    pub async fn record(&self, kind: EntityKind, id: i64) -> Result<Option<Fields>, TargetError> {
        self.run(move |conn| load_record(conn, kind, id)).await
    }

    /// Number of records of a kind
    pub async fn count(&self, kind: EntityKind) -> Result<u64, TargetError> {
        self.run(move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM records WHERE kind = ?1",
                    [kind.as_str()],
                    |row| row.get(0),
                )
                .map_err(storage)?;
            Ok(count as u64)
        })
        .await
    }

    async fn run<F, T>(&self, f: F) -> Result<T, TargetError>
    where
        F: FnOnce(&mut Connection) -> Result<T, TargetError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.connection.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| TargetError::Storage(format!("Failed to acquire target lock: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| TargetError::Storage(format!("Target task panicked: {}", e)))?
    }
}

fn load_record(conn: &Connection, kind: EntityKind, id: i64) -> Result<Option<Fields>, TargetError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT fields FROM records WHERE kind = ?1 AND id = ?2",
            params![kind.as_str(), id],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage)?;

    raw.map(|raw| serde_json::from_str(&raw).map_err(json_error))
        .transpose()
}

fn require_record(tx: &Transaction, kind: EntityKind, id: i64) -> Result<Fields, TargetError> {
    load_record(tx, kind, id)?.ok_or_else(|| TargetError::NotFound {
        kind: kind.to_string(),
        id,
    })
}

fn store_record(tx: &Transaction, kind: EntityKind, id: i64, record: &Fields) -> Result<(), TargetError> {
    let raw = serde_json::to_string(record).map_err(json_error)?;
    tx.execute(
        "INSERT INTO records (kind, id, fields) VALUES (?1, ?2, ?3)
         ON CONFLICT(kind, id) DO UPDATE SET fields = excluded.fields",
        params![kind.as_str(), id, raw],
    )
    .map_err(storage)?;
    Ok(())
}

fn check_unique(
    tx: &Transaction,
    kind: EntityKind,
    fields: &Fields,
    except: Option<i64>,
) -> Result<(), TargetError> {
    let Some(field) = rules::unique_field(kind) else {
        return Ok(());
    };
    let Some(value) = fields.get(field) else {
        return Ok(());
    };

    let taken: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM records
             WHERE kind = ?1 AND id != ?2 AND json_extract(fields, ?3) = ?4",
            params![
                kind.as_str(),
                except.unwrap_or(0),
                format!("$.{}", field),
                json_param(value)
            ],
            |row| row.get(0),
        )
        .map_err(storage)?;

    if taken > 0 {
        return Err(TargetError::rejected(
            kind.as_str(),
            format!("{} {} is already used", field, value),
        ));
    }
    Ok(())
}

fn next_id(tx: &Transaction, kind: EntityKind) -> Result<i64, TargetError> {
    tx.execute(
        "INSERT INTO sequences (kind, last_id) VALUES (?1, 1)
         ON CONFLICT(kind) DO UPDATE SET last_id = last_id + 1",
        [kind.as_str()],
    )
    .map_err(storage)?;

    tx.query_row(
        "SELECT last_id FROM sequences WHERE kind = ?1",
        [kind.as_str()],
        |row| row.get(0),
    )
    .map_err(storage)
}

fn add_link(tx: &Transaction, link: &Link) -> Result<(), TargetError> {
    for (kind, id) in link.required_records() {
        require_record(tx, kind, id)?;
    }

    let relation = link.relation();
    let (from_id, to_id) = link.endpoints();
    if relation == "product_accessory" && from_id == to_id {
        return Err(TargetError::rejected(
            relation,
            "a product cannot be its own accessory",
        ));
    }

    let data = serde_json::to_string(&link.data()).map_err(json_error)?;
    let inserted = tx
        .execute(
            "INSERT OR IGNORE INTO links (relation, from_id, to_id, data) VALUES (?1, ?2, ?3, ?4)",
            params![relation, from_id, to_id, data],
        )
        .map_err(storage)?;

    if inserted == 0 {
        return Err(TargetError::rejected(
            relation,
            format!("{} -> {} already exists", from_id, to_id),
        ));
    }
    Ok(())
}

fn register_rewrite(tx: &Transaction, rule: &RewriteRule) -> Result<i64, TargetError> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM rewrite_urls WHERE url = ?1",
            [&rule.url],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage)?;
    if existing.is_some() {
        return Err(TargetError::rejected(
            "rewrite_url",
            format!("URL '{}' is already registered", rule.url),
        ));
    }

    if let Some(redirect) = rule.redirected {
        let known: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM rewrite_urls WHERE id = ?1",
                [redirect],
                |row| row.get(0),
            )
            .map_err(storage)?;
        if known == 0 {
            return Err(TargetError::NotFound {
                kind: "rewrite_url".to_string(),
                id: redirect,
            });
        }
    }

    tx.execute(
        "INSERT INTO rewrite_urls (url, view, view_id, view_locale, redirected)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![rule.url, rule.view, rule.view_id, rule.view_locale, rule.redirected],
    )
    .map_err(storage)?;
    Ok(tx.last_insert_rowid())
}

fn apply(tx: &Transaction, command: TargetCommand) -> Result<CommandOutcome, TargetError> {
    match command {
        TargetCommand::Create { kind, fields } => {
            rules::validate_create(kind, &fields)?;
            check_unique(tx, kind, &fields, None)?;

            let id = next_id(tx, kind)?;
            let mut record = Fields::new();
            rules::merge_fields(&mut record, &fields);
            store_record(tx, kind, id, &record)?;
            Ok(CommandOutcome::Created(id))
        }
        TargetCommand::Update { kind, id, fields } => {
            rules::validate_update(kind, &fields)?;
            let mut record = require_record(tx, kind, id)?;
            check_unique(tx, kind, &fields, Some(id))?;

            rules::merge_fields(&mut record, &fields);
            store_record(tx, kind, id, &record)?;
            Ok(CommandOutcome::Applied)
        }
        TargetCommand::UpdatePosition { kind, id, position } => {
            let mut record = require_record(tx, kind, id)?;
            record.insert("position".to_string(), position.into());
            store_record(tx, kind, id, &record)?;
            Ok(CommandOutcome::Applied)
        }
        TargetCommand::AssignTemplate {
            product_id,
            template_id,
            currency_id,
        } => {
            let mut record = require_record(tx, EntityKind::Product, product_id)?;
            record.insert("template_id".to_string(), template_id.into());
            record.insert("currency_id".to_string(), currency_id.into());
            store_record(tx, EntityKind::Product, product_id, &record)?;
            Ok(CommandOutcome::Applied)
        }
        TargetCommand::Link(link) => {
            add_link(tx, &link)?;
            Ok(CommandOutcome::Applied)
        }
        TargetCommand::RegisterRewrite(rule) => {
            Ok(CommandOutcome::Created(register_rewrite(tx, &rule)?))
        }
    }
}

#[async_trait]
impl TargetSink for SqliteTarget {
    async fn execute(&self, command: TargetCommand) -> Result<CommandOutcome, TargetError> {
        debug!("Target: {}", command.describe());

        self.run(move |conn| {
            let tx = conn.transaction().map_err(storage)?;
            let outcome = apply(&tx, command)?;
            tx.commit().map_err(storage)?;
            Ok(outcome)
        })
        .await
    }

    async fn purge(&self, kind: EntityKind) -> Result<u64, TargetError> {
        self.run(move |conn| {
            let tx = conn.transaction().map_err(storage)?;

            let removed = tx
                .execute("DELETE FROM records WHERE kind = ?1", [kind.as_str()])
                .map_err(storage)?;

            let relations: &[&str] = match kind {
                EntityKind::Product => &["product_content", "product_accessory"],
                EntityKind::Tax | EntityKind::TaxRule => &["tax_rule_tax"],
                _ => &[],
            };
            for relation in relations {
                tx.execute("DELETE FROM links WHERE relation = ?1", [relation])
                    .map_err(storage)?;
            }

            if let Some(view) = kind.view_name() {
                // Redirects first, they reference canonical rules
                tx.execute(
                    "DELETE FROM rewrite_urls WHERE view = ?1 AND redirected IS NOT NULL",
                    [view],
                )
                .map_err(storage)?;
                tx.execute("DELETE FROM rewrite_urls WHERE view = ?1", [view])
                    .map_err(storage)?;
            }

            tx.commit().map_err(storage)?;
            Ok(removed as u64)
        })
        .await
    }

    async fn find_rewrite_by_url(&self, url: &str) -> Result<Option<i64>, TargetError> {
        let url = url.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT id FROM rewrite_urls WHERE url = ?1",
                [url],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)
        })
        .await
    }

    async fn find_default_rewrite(
        &self,
        view: &str,
        view_id: i64,
        locale: &str,
    ) -> Result<Option<i64>, TargetError> {
        let view = view.to_string();
        let locale = locale.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT id FROM rewrite_urls
                 WHERE view = ?1 AND view_id = ?2 AND view_locale = ?3 AND redirected IS NULL
                 ORDER BY id LIMIT 1",
                params![view, view_id, locale],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)
        })
        .await
    }
}
