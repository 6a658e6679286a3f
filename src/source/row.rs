/*!
 * Rows and values read from the legacy store.
 */

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::SourceError;

/// A single column value from the legacy store
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SourceValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SourceValue::Null)
    }
}

impl fmt::Display for SourceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceValue::Null => write!(f, "NULL"),
            SourceValue::Integer(v) => write!(f, "{}", v),
            SourceValue::Real(v) => write!(f, "{}", v),
            SourceValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for SourceValue {
    fn from(value: i64) -> Self {
        SourceValue::Integer(value)
    }
}

impl From<f64> for SourceValue {
    fn from(value: f64) -> Self {
        SourceValue::Real(value)
    }
}

impl From<&str> for SourceValue {
    fn from(value: &str) -> Self {
        SourceValue::Text(value.to_string())
    }
}

impl From<String> for SourceValue {
    fn from(value: String) -> Self {
        SourceValue::Text(value)
    }
}

impl From<ValueRef<'_>> for SourceValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SourceValue::Null,
            ValueRef::Integer(v) => SourceValue::Integer(v),
            ValueRef::Real(v) => SourceValue::Real(v),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                SourceValue::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

impl ToSql for SourceValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SourceValue::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            SourceValue::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            SourceValue::Real(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            SourceValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

/// One legacy row, addressed by column name
///
/// Legacy stores are loosely typed: integers often arrive as text, so the
/// getters coerce where the conversion is lossless.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRow {
    values: BTreeMap<String, SourceValue>,
}

impl SourceRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for fixtures
    pub fn with(mut self, column: &str, value: impl Into<SourceValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<SourceValue>) {
        self.values.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&SourceValue> {
        self.values.get(column)
    }

    fn require(&self, column: &str) -> Result<&SourceValue, SourceError> {
        self.values
            .get(column)
            .ok_or_else(|| SourceError::MissingColumn(column.to_string()))
    }

    pub fn get_i64(&self, column: &str) -> Result<i64, SourceError> {
        match self.require(column)? {
            SourceValue::Integer(v) => Ok(*v),
            SourceValue::Real(v) if v.fract() == 0.0 => Ok(*v as i64),
            SourceValue::Text(v) => v.trim().parse().map_err(|_| SourceError::InvalidValue {
                column: column.to_string(),
                message: format!("'{}' is not an integer", v),
            }),
            other => Err(SourceError::InvalidValue {
                column: column.to_string(),
                message: format!("expected an integer, found {}", other),
            }),
        }
    }

    pub fn get_f64(&self, column: &str) -> Result<f64, SourceError> {
        match self.require(column)? {
            SourceValue::Integer(v) => Ok(*v as f64),
            SourceValue::Real(v) => Ok(*v),
            SourceValue::Text(v) => v.trim().parse().map_err(|_| SourceError::InvalidValue {
                column: column.to_string(),
                message: format!("'{}' is not a number", v),
            }),
            SourceValue::Null => Err(SourceError::InvalidValue {
                column: column.to_string(),
                message: "expected a number, found NULL".to_string(),
            }),
        }
    }

    /// Number where NULL and a missing column both mean "absent"; other text still fails
    pub fn get_opt_f64(&self, column: &str) -> Result<Option<f64>, SourceError> {
        match self.values.get(column) {
            Some(value) if !value.is_null() => self.get_f64(column).map(Some),
            _ => Ok(None),
        }
    }

    /// Text value; numbers are rendered, NULL is an error
    pub fn get_string(&self, column: &str) -> Result<String, SourceError> {
        match self.require(column)? {
            SourceValue::Null => Err(SourceError::InvalidValue {
                column: column.to_string(),
                message: "expected text, found NULL".to_string(),
            }),
            value => Ok(value.to_string()),
        }
    }

    /// Text value where NULL and a missing column both mean "absent"
    pub fn get_opt_string(&self, column: &str) -> Option<String> {
        match self.values.get(column) {
            None | Some(SourceValue::Null) => None,
            Some(value) => Some(value.to_string()),
        }
    }

    /// Legacy flags are stored as 0/1 integers
    pub fn get_bool(&self, column: &str) -> Result<bool, SourceError> {
        Ok(self.get_i64(column)? != 0)
    }
}
