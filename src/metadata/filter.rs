use serde::{Deserialize, Serialize};

use super::model::{MetadataRow, MetadataTable, MetadataValue};
use crate::error::{Error, Result};

/// Exact-match test on one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub equals: MetadataValue,
}

impl Predicate {
    pub fn new(field: &str, equals: impl Into<MetadataValue>) -> Self {
        Self {
            field: field.to_string(),
            equals: equals.into(),
        }
    }

    fn matches(&self, row: &MetadataRow) -> bool {
        row.get(&self.field) == Some(&self.equals)
    }
}

/// Fail with [`Error::Schema`] unless every named field is a column of `table`.
pub fn require_columns<'a>(
    table: &MetadataTable,
    fields: impl IntoIterator<Item = &'a str>,
) -> Result<()> {
    for field in fields {
        if !table.has_column(field) {
            return Err(Error::Schema {
                field: field.to_string(),
                table: table.name.clone(),
            });
        }
    }
    Ok(())
}

/// Return the rows passing every predicate, in table order.
///
/// The predicates form a conjunction of equality tests: a row failing any one
/// of them is excluded. Every predicate field must be a table column.
pub fn filter<'t>(table: &'t MetadataTable, predicates: &[Predicate]) -> Result<Vec<&'t MetadataRow>> {
    require_columns(table, predicates.iter().map(|p| p.field.as_str()))?;

    Ok(table
        .rows
        .iter()
        .filter(|row| predicates.iter().all(|p| p.matches(row)))
        .collect())
}
