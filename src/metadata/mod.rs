//! Cohort metadata: typed tables, CSV loading and exact-match filtering.
//!
//! ```text
//!  cohort .csv ──▶ loader ──▶ MetadataTable ──▶ filter(predicates) ──▶ rows
//! ```

pub mod filter;
pub mod loader;
pub mod model;

pub use filter::{filter, require_columns, Predicate};
pub use loader::load_csv;
pub use model::{MetadataRow, MetadataTable, MetadataValue};
