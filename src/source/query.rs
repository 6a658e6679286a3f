/*!
 * Declarative read queries against the legacy store.
 *
 * Importers describe what they need (table, equality filters, ordering,
 * window) and the source backend renders it. Identifiers are validated and
 * values are always bound as parameters.
 */

use crate::errors::SourceError;

use super::row::SourceValue;

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Equals(String, SourceValue),
    Like(String, String),
}

/// A read-only query over one legacy table
#[derive(Debug, Clone, PartialEq)]
pub struct SourceQuery {
    table: String,
    distinct: Option<String>,
    predicates: Vec<Predicate>,
    /// Ascending sort keys, in priority order
    order_by: Vec<String>,
    window: Option<(u64, u64)>,
}

impl SourceQuery {
    /// Select every column of `table`
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            distinct: None,
            predicates: Vec::new(),
            order_by: Vec::new(),
            window: None,
        }
    }

    /// Select the distinct values of one column
    pub fn distinct(table: &str, column: &str) -> Self {
        Self {
            distinct: Some(column.to_string()),
            ..Self::table(table)
        }
    }

    /// Keep rows where `column = value`
    pub fn filter(mut self, column: &str, value: impl Into<SourceValue>) -> Self {
        self.predicates
            .push(Predicate::Equals(column.to_string(), value.into()));
        self
    }

    /// Keep rows where `column LIKE pattern`
    pub fn filter_like(mut self, column: &str, pattern: &str) -> Self {
        self.predicates
            .push(Predicate::Like(column.to_string(), pattern.to_string()));
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.push(column.to_string());
        self
    }

    /// Restrict the result to `[offset, offset + limit)`
    pub fn window(mut self, offset: u64, limit: u64) -> Self {
        self.window = Some((offset, limit));
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Render the SELECT statement and its bound parameters
    pub fn to_sql(&self) -> Result<(String, Vec<SourceValue>), SourceError> {
        let projection = match &self.distinct {
            Some(column) => format!("DISTINCT {}", identifier(column)?),
            None => "*".to_string(),
        };
        let mut sql = format!("SELECT {} FROM {}", projection, identifier(&self.table)?);
        let params = self.push_where(&mut sql)?;

        if !self.order_by.is_empty() {
            let columns = self
                .order_by
                .iter()
                .map(|column| Ok(format!("{} ASC", identifier(column)?)))
                .collect::<Result<Vec<_>, SourceError>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&columns.join(", "));
        }

        if let Some((offset, limit)) = self.window {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
        }

        Ok((sql, params))
    }

    /// Render a COUNT statement over the same rows, ignoring order and window
    pub fn to_count_sql(&self) -> Result<(String, Vec<SourceValue>), SourceError> {
        let counted = match &self.distinct {
            Some(column) => format!("COUNT(DISTINCT {})", identifier(column)?),
            None => "COUNT(*)".to_string(),
        };
        let mut sql = format!("SELECT {} FROM {}", counted, identifier(&self.table)?);
        let params = self.push_where(&mut sql)?;
        Ok((sql, params))
    }

    fn push_where(&self, sql: &mut String) -> Result<Vec<SourceValue>, SourceError> {
        let mut clauses = Vec::with_capacity(self.predicates.len());
        let mut params = Vec::with_capacity(self.predicates.len());

        for (index, predicate) in self.predicates.iter().enumerate() {
            match predicate {
                Predicate::Equals(column, value) => {
                    clauses.push(format!("{} = ?{}", identifier(column)?, index + 1));
                    params.push(value.clone());
                }
                Predicate::Like(column, pattern) => {
                    clauses.push(format!("{} LIKE ?{}", identifier(column)?, index + 1));
                    params.push(SourceValue::Text(pattern.clone()));
                }
            }
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        Ok(params)
    }
}

fn identifier(name: &str) -> Result<&str, SourceError> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(name)
    } else {
        Err(SourceError::InvalidIdentifier(name.to_string()))
    }
}
