/*!
 * In-process target store.
 */

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

use crate::errors::TargetError;

use super::command::{CommandOutcome, EntityKind, Fields, Link, RewriteRule, TargetCommand};
use super::rules;
use super::TargetSink;

#[derive(Debug, Clone, PartialEq)]
struct StoredLink {
    relation: &'static str,
    from_id: i64,
    to_id: i64,
    data: Fields,
}

#[derive(Debug, Default)]
struct MemoryState {
    last_ids: HashMap<EntityKind, i64>,
    records: BTreeMap<(EntityKind, i64), Fields>,
    links: Vec<StoredLink>,
    rewrites: BTreeMap<i64, RewriteRule>,
    last_rewrite_id: i64,
}

impl MemoryState {
    fn exists(&self, kind: EntityKind, id: i64) -> bool {
        self.records.contains_key(&(kind, id))
    }

    fn require(&self, kind: EntityKind, id: i64) -> Result<(), TargetError> {
        if self.exists(kind, id) {
            Ok(())
        } else {
            Err(TargetError::NotFound {
                kind: kind.to_string(),
                id,
            })
        }
    }

    fn check_unique(&self, kind: EntityKind, fields: &Fields, except: Option<i64>) -> Result<(), TargetError> {
        let Some(field) = rules::unique_field(kind) else {
            return Ok(());
        };
        let Some(value) = fields.get(field) else {
            return Ok(());
        };

        let taken = self
            .records
            .iter()
            .any(|((k, id), record)| *k == kind && Some(*id) != except && record.get(field) == Some(value));

        if taken {
            return Err(TargetError::rejected(
                kind.as_str(),
                format!("{} {} is already used", field, value),
            ));
        }
        Ok(())
    }

    fn apply(&mut self, command: TargetCommand) -> Result<CommandOutcome, TargetError> {
        match command {
            TargetCommand::Create { kind, fields } => {
                rules::validate_create(kind, &fields)?;
                self.check_unique(kind, &fields, None)?;

                let id = {
                    let last = self.last_ids.entry(kind).or_insert(0);
                    *last += 1;
                    *last
                };
                let mut record = Fields::new();
                rules::merge_fields(&mut record, &fields);
                self.records.insert((kind, id), record);
                Ok(CommandOutcome::Created(id))
            }
            TargetCommand::Update { kind, id, fields } => {
                rules::validate_update(kind, &fields)?;
                self.require(kind, id)?;
                self.check_unique(kind, &fields, Some(id))?;

                if let Some(record) = self.records.get_mut(&(kind, id)) {
                    rules::merge_fields(record, &fields);
                }
                Ok(CommandOutcome::Applied)
            }
            TargetCommand::UpdatePosition { kind, id, position } => {
                self.require(kind, id)?;
                if let Some(record) = self.records.get_mut(&(kind, id)) {
                    record.insert("position".to_string(), position.into());
                }
                Ok(CommandOutcome::Applied)
            }
            TargetCommand::AssignTemplate {
                product_id,
                template_id,
                currency_id,
            } => {
                self.require(EntityKind::Product, product_id)?;
                if let Some(record) = self.records.get_mut(&(EntityKind::Product, product_id)) {
                    record.insert("template_id".to_string(), template_id.into());
                    record.insert("currency_id".to_string(), currency_id.into());
                }
                Ok(CommandOutcome::Applied)
            }
            TargetCommand::Link(link) => {
                self.add_link(&link)?;
                Ok(CommandOutcome::Applied)
            }
            TargetCommand::RegisterRewrite(rule) => {
                if self.rewrites.values().any(|r| r.url == rule.url) {
                    return Err(TargetError::rejected(
                        "rewrite_url",
                        format!("URL '{}' is already registered", rule.url),
                    ));
                }
                if let Some(redirect) = rule.redirected {
                    if !self.rewrites.contains_key(&redirect) {
                        return Err(TargetError::NotFound {
                            kind: "rewrite_url".to_string(),
                            id: redirect,
                        });
                    }
                }
                self.last_rewrite_id += 1;
                let id = self.last_rewrite_id;
                self.rewrites.insert(id, rule);
                Ok(CommandOutcome::Created(id))
            }
        }
    }

    fn add_link(&mut self, link: &Link) -> Result<(), TargetError> {
        for (kind, id) in link.required_records() {
            self.require(kind, id)?;
        }

        let relation = link.relation();
        let (from_id, to_id) = link.endpoints();
        if relation == "product_accessory" && from_id == to_id {
            return Err(TargetError::rejected(
                relation,
                "a product cannot be its own accessory",
            ));
        }
        if self
            .links
            .iter()
            .any(|l| l.relation == relation && l.from_id == from_id && l.to_id == to_id)
        {
            return Err(TargetError::rejected(
                relation,
                format!("{} -> {} already exists", from_id, to_id),
            ));
        }

        self.links.push(StoredLink {
            relation,
            from_id,
            to_id,
            data: link.data(),
        });
        Ok(())
    }

    fn purge(&mut self, kind: EntityKind) -> u64 {
        let before = self.records.len();
        self.records.retain(|(k, _), _| *k != kind);
        let removed = (before - self.records.len()) as u64;

        let relations: &[&str] = match kind {
            EntityKind::Product => &["product_content", "product_accessory"],
            EntityKind::Tax | EntityKind::TaxRule => &["tax_rule_tax"],
            _ => &[],
        };
        self.links.retain(|l| !relations.contains(&l.relation));

        if let Some(view) = kind.view_name() {
            self.rewrites.retain(|_, rule| rule.view != view);
        }

        removed
    }
}

/// Target store kept in memory
///
/// Ids are assigned per kind starting at 1 and never reused, even after a
/// purge.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    state: Mutex<MemoryState>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records of a kind
    pub fn count(&self, kind: EntityKind) -> usize {
        self.state
            .lock()
            .records
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Copy of one record
    pub fn record(&self, kind: EntityKind, id: i64) -> Option<Fields> {
        self.state.lock().records.get(&(kind, id)).cloned()
    }

    /// All records of a kind, ordered by id
    pub fn records(&self, kind: EntityKind) -> Vec<(i64, Fields)> {
        self.state
            .lock()
            .records
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|((_, id), fields)| (*id, fields.clone()))
            .collect()
    }

    /// Endpoints of every link in a relation, in creation order
    pub fn links(&self, relation: &str) -> Vec<(i64, i64)> {
        self.state
            .lock()
            .links
            .iter()
            .filter(|l| l.relation == relation)
            .map(|l| (l.from_id, l.to_id))
            .collect()
    }

    /// Registered rewrite rules, ordered by id
    pub fn rewrites(&self) -> Vec<(i64, RewriteRule)> {
        self.state
            .lock()
            .rewrites
            .iter()
            .map(|(id, rule)| (*id, rule.clone()))
            .collect()
    }
}

#[async_trait]
impl TargetSink for MemoryTarget {
    async fn execute(&self, command: TargetCommand) -> Result<CommandOutcome, TargetError> {
        debug!("Target: {}", command.describe());
        self.state.lock().apply(command)
    }

    async fn purge(&self, kind: EntityKind) -> Result<u64, TargetError> {
        Ok(self.state.lock().purge(kind))
    }

    async fn find_rewrite_by_url(&self, url: &str) -> Result<Option<i64>, TargetError> {
        Ok(self
            .state
            .lock()
            .rewrites
            .iter()
            .find(|(_, rule)| rule.url == url)
            .map(|(id, _)| *id))
    }

    async fn find_default_rewrite(
        &self,
        view: &str,
        view_id: i64,
        locale: &str,
    ) -> Result<Option<i64>, TargetError> {
        Ok(self
            .state
            .lock()
            .rewrites
            .iter()
            .find(|(_, rule)| {
                rule.view == view
                    && rule.view_id == view_id
                    && rule.view_locale == locale
                    && rule.redirected.is_none()
            })
            .map(|(id, _)| *id))
    }
}
