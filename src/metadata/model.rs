use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MetadataValue – a single cell of a cohort table
// ---------------------------------------------------------------------------

/// A dynamically-typed metadata cell, as guessed from the source table.
///
/// Predicates compare cells with `==`, so an integer cell never matches a
/// string predicate and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Null,
}

impl MetadataValue {
    /// Guess the type of a raw cell.
    pub fn guess(raw: &str) -> Self {
        if raw.is_empty() {
            return MetadataValue::Null;
        }
        if let Ok(i) = raw.parse::<i64>() {
            return MetadataValue::Integer(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return MetadataValue::Float(f);
        }
        match raw {
            "True" | "true" => MetadataValue::Bool(true),
            "False" | "false" => MetadataValue::Bool(false),
            _ => MetadataValue::String(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; whole floats and integer-looking strings are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Integer(i) => Some(*i),
            MetadataValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            MetadataValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Null => write!(f, "<null>"),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Integer(i)
    }
}

// ---------------------------------------------------------------------------
// MetadataRow / MetadataTable
// ---------------------------------------------------------------------------

/// One row of a cohort table: column name → value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataRow {
    pub fields: BTreeMap<String, MetadataValue>,
}

impl MetadataRow {
    pub fn get(&self, field: &str) -> Option<&MetadataValue> {
        self.fields.get(field)
    }

    /// Builder-style insert, mostly for fixtures.
    pub fn with(mut self, field: &str, value: impl Into<MetadataValue>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }
}

/// A loaded cohort table. Column order follows the source header.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    /// Identifier used in error messages (usually the source path).
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<MetadataRow>,
}

impl MetadataTable {
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<MetadataRow>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    /// Build a table from rows, taking the union of their fields as columns.
    pub fn from_rows(name: impl Into<String>, rows: Vec<MetadataRow>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.fields.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        Self::new(name, columns, rows)
    }

    pub fn has_column(&self, field: &str) -> bool {
        self.columns.iter().any(|c| c == field)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
