//! Cohort reconciliation and candidate assembly.
//!
//! ```text
//!  MetadataTable ──filter──▶ rows ──reconcile──▶ Eligibility
//!                                                    │
//!  directory listing ─────────────intersect──────────┴──▶ Vec<LabeledItem>
//! ```

pub mod candidates;
pub mod config;
pub mod reconcile;

use std::collections::BTreeSet;

use tracing::info;

pub use candidates::{CandidateItem, CandidateSetBuilder, ItemKind, LabeledItem};
pub use config::{default_cohorts, CohortConfig, CohortSource, GroupRule, RegroupKey, Template, TemplatePart};
pub use reconcile::{reconcile, FileGroup, ReconciledCohort};

use crate::error::Result;
use crate::metadata::{filter, require_columns, MetadataTable};

/// The authoritative file set a cohort contributes, independent of disk contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Flat(BTreeSet<String>),
    Grouped(ReconciledCohort),
}

impl Eligibility {
    /// Flat view used for directory intersection.
    pub fn files(&self) -> &BTreeSet<String> {
        match self {
            Eligibility::Flat(files) => files,
            Eligibility::Grouped(cohort) => &cohort.eligible,
        }
    }
}

/// Filter `table` with the cohort predicates and derive its eligibility set.
pub fn eligibility(cohort: &CohortConfig, table: &MetadataTable) -> Result<Eligibility> {
    let rows = filter(table, &cohort.predicates)?;

    let out = match &cohort.source {
        CohortSource::Flat {
            id_field,
            extension,
        } => {
            require_columns(table, [id_field.as_str()])?;
            let files: BTreeSet<String> = rows
                .iter()
                .filter_map(|row| row.get(id_field))
                .filter(|v| !v.is_null())
                .map(|id| format!("{id}.{extension}"))
                .collect();
            Eligibility::Flat(files)
        }
        CohortSource::Grouped { rule, .. } => Eligibility::Grouped(reconcile(table, &rows, rule)?),
    };

    info!(
        cohort = %cohort.name,
        rows = table.len(),
        matched = rows.len(),
        eligible = out.files().len(),
        "built eligibility set"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataRow;
    use std::collections::BTreeMap;

    fn tumor_row(pid: &str, sid: i64, file: &str) -> MetadataRow {
        MetadataRow::default()
            .with("Series", "T2")
            .with("Plane", "Axial")
            .with("ModelFilter", "T2_Axial")
            .with("PID", pid)
            .with("SID", sid)
            .with("FileName_df", file)
    }

    #[test]
    fn test_flat_eligibility_is_unique_ids() {
        let cohort = config::normal_cohort();
        let base = MetadataRow::default()
            .with("Series", "T2")
            .with("Plane", "Axial")
            .with("ModelFilter", "T2 ax")
            .with("SeriesDescription", "AX T2 FRFSE")
            .with("is_Duplicate", "NO");
        let rows = vec![
            base.clone().with("Patient_ID", "N01"),
            base.clone().with("Patient_ID", "N01"),
            base.clone().with("Patient_ID", "N02").with("is_Duplicate", "YES"),
            base.with("Patient_ID", "N03"),
        ];
        let table = MetadataTable::from_rows("normal", rows);
        let out = eligibility(&cohort, &table).unwrap();
        let expected: BTreeSet<String> = ["N01.npz", "N03.npz"].iter().map(|s| s.to_string()).collect();
        assert_eq!(out.files(), &expected);
    }

    #[test]
    fn test_grouped_eligibility_filters_rows_first() {
        let cohort = default_cohorts().into_iter().find(|c| c.name == "st_dipg").unwrap();
        let rows = vec![
            tumor_row("DIPG0007", 2, "s4-ax-001.dcm"),
            tumor_row("DIPG0007", 2, "s4-ax-002.dcm"),
            tumor_row("DIPG0007", 2, "s4-cor-001.dcm").with("Plane", "Coronal"),
        ];
        let table = MetadataTable::from_rows("st_dipg", rows);
        let out = eligibility(&cohort, &table).unwrap();
        match &out {
            Eligibility::Grouped(c) => {
                assert_eq!(
                    c.groups["DIPG0007_ax"],
                    vec!["DIPG0007-02-s4-ax-001.dcm", "DIPG0007-02-s4-ax-002.dcm"]
                );
            }
            Eligibility::Flat(_) => panic!("expected grouped eligibility"),
        }
    }

    /// The positional key used on disk must cluster files exactly like the
    /// table-derived key, for every built-in tumor cohort.
    #[test]
    fn test_positional_key_agrees_with_table_key() {
        for cohort in default_cohorts() {
            let CohortSource::Grouped { rule, regroup, .. } = &cohort.source else {
                continue;
            };
            let subject_prefix = if rule.required_tokens == 6 { "PF-EP" } else { "DIPG" };
            let mut rows = Vec::new();
            for p in 0..6 {
                for series in ["ax", "t2fse"] {
                    for slice in 0..3 {
                        let file = format!("s{p}-{series}-{slice:03}.dcm");
                        rows.push(tumor_row(&format!("{subject_prefix}{:04}", 10 + p), p % 3, &file));
                    }
                }
            }
            let table = MetadataTable::from_rows(cohort.name.clone(), rows);
            let Eligibility::Grouped(reconciled) = eligibility(&cohort, &table).unwrap() else {
                panic!("expected grouped eligibility");
            };
            assert_eq!(reconciled.group_count(), 12, "cohort {}", cohort.name);

            let mut by_position: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for file in &reconciled.eligible {
                let key = regroup.derive(file).expect("positional key");
                by_position.entry(key).or_default().push(file.clone());
            }
            let mut from_table: Vec<Vec<String>> = reconciled.groups.values().cloned().collect();
            let mut from_disk: Vec<Vec<String>> = by_position.into_values().collect();
            from_table.sort();
            from_disk.sort();
            assert_eq!(from_table, from_disk, "cohort {}", cohort.name);
        }
    }
}
