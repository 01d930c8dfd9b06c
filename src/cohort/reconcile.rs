//! Row-to-group reconciliation for multi-file cohorts.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::config::GroupRule;
use crate::error::Result;
use crate::metadata::{require_columns, MetadataRow, MetadataTable};

/// Filenames sharing a group key, sorted lexicographically.
pub type FileGroup = Vec<String>;

/// Outcome of reconciling one cohort table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciledCohort {
    /// Surviving groups keyed by group key.
    pub groups: BTreeMap<String, FileGroup>,
    /// Union of every surviving group's filenames.
    pub eligible: BTreeSet<String>,
    /// Number of groups dropped by the structural filter.
    pub rejected: usize,
}

impl ReconciledCohort {
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// Check the structural invariant of one group.
pub fn is_valid_group(group: &[String], rule: &GroupRule) -> bool {
    group.len() <= rule.max_group_size
        && group
            .iter()
            .all(|name| rule.token_count(name) == rule.required_tokens)
}

/// Group filtered rows by key and drop groups that break the structural rule.
///
/// Rows whose filename or key cannot be rendered are skipped. `table` is only
/// consulted for its columns, so templates naming absent fields fail fast.
pub fn reconcile(table: &MetadataTable, rows: &[&MetadataRow], rule: &GroupRule) -> Result<ReconciledCohort> {
    require_columns(table, rule.filename.fields().chain(rule.key.fields()))?;

    let mut buckets: BTreeMap<String, FileGroup> = BTreeMap::new();
    for (idx, row) in rows.iter().enumerate() {
        match (rule.filename.render(row), rule.key.render(row)) {
            (Some(filename), Some(key)) => buckets.entry(key).or_default().push(filename),
            _ => warn!(table = %table.name, row = idx, "skipping row with unresolvable filename or key"),
        }
    }

    let mut out = ReconciledCohort::default();
    for (key, mut group) in buckets {
        group.sort();
        if !is_valid_group(&group, rule) {
            debug!(key = %key, size = group.len(), "dropping structurally invalid group");
            out.rejected += 1;
            continue;
        }
        out.eligible.extend(group.iter().cloned());
        out.groups.insert(key, group);
    }

    debug!(
        table = %table.name,
        groups = out.groups.len(),
        rejected = out.rejected,
        files = out.eligible.len(),
        "reconciled cohort"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::config::{Template, TemplatePart};
    use crate::error::Error;

    fn field(name: &str) -> TemplatePart {
        TemplatePart::Field { field: name.into() }
    }

    /// Filename `PID-SID(2)-Base`, key `PID_SID(2)`, three tokens.
    fn simple_rule(max_group_size: usize) -> GroupRule {
        let padded = TemplatePart::Padded {
            field: "SID".into(),
            width: 2,
        };
        GroupRule {
            filename: Template::new(vec![field("PID"), padded.clone(), field("Base")], "-"),
            key: Template::new(vec![field("PID"), padded], "_"),
            delimiter: "-".into(),
            required_tokens: 3,
            max_group_size,
        }
    }

    fn row(pid: &str, sid: i64, base: &str) -> MetadataRow {
        MetadataRow::default()
            .with("PID", pid)
            .with("SID", sid)
            .with("Base", base)
    }

    fn run(rows: Vec<MetadataRow>, rule: &GroupRule) -> Result<ReconciledCohort> {
        let table = MetadataTable::from_rows("fixture", rows);
        let refs: Vec<&MetadataRow> = table.rows.iter().collect();
        reconcile(&table, &refs, rule)
    }

    #[test]
    fn test_single_group_sorted() {
        let rows = vec![
            row("P001", 1, "c.dcm"),
            row("P001", 1, "a.dcm"),
            row("P001", 1, "b.dcm"),
        ];
        let out = run(rows, &simple_rule(10)).unwrap();
        assert_eq!(out.group_count(), 1);
        assert_eq!(
            out.groups["P001_01"],
            vec!["P001-01-a.dcm", "P001-01-b.dcm", "P001-01-c.dcm"]
        );
        assert_eq!(out.eligible.len(), 3);
        assert_eq!(out.rejected, 0);
    }

    #[test]
    fn test_oversized_group_dropped_whole() {
        let rows: Vec<MetadataRow> = (0..4)
            .map(|i| row("P002", 2, &format!("s{i}.dcm")))
            .chain(std::iter::once(row("P003", 1, "x.dcm")))
            .collect();
        let out = run(rows, &simple_rule(3)).unwrap();
        assert!(!out.groups.contains_key("P002_02"));
        assert!(out.groups.contains_key("P003_01"));
        assert_eq!(out.rejected, 1);
        assert!(out.eligible.iter().all(|f| f.starts_with("P003")));
    }

    #[test]
    fn test_cap_is_inclusive() {
        let rows: Vec<MetadataRow> = (0..3).map(|i| row("P", 1, &format!("{i}.dcm"))).collect();
        let out = run(rows, &simple_rule(3)).unwrap();
        assert_eq!(out.groups["P_01"].len(), 3);
    }

    #[test]
    fn test_token_count_violation_drops_group() {
        let rows = vec![row("P004", 1, "a.dcm"), row("P004", 1, "extra-dash.dcm")];
        let out = run(rows, &simple_rule(10)).unwrap();
        assert!(out.groups.is_empty());
        assert!(out.eligible.is_empty());
        assert_eq!(out.rejected, 1);
    }

    #[test]
    fn test_unresolvable_rows_are_skipped() {
        let rows = vec![
            row("P005", 1, "a.dcm"),
            MetadataRow::default().with("PID", "P005").with("SID", "x").with("Base", "b.dcm"),
        ];
        let out = run(rows, &simple_rule(10)).unwrap();
        assert_eq!(out.groups["P005_01"], vec!["P005-01-a.dcm"]);
    }

    #[test]
    fn test_missing_template_column_is_schema_error() {
        let rows = vec![MetadataRow::default().with("PID", "P").with("SID", 1i64)];
        let err = run(rows, &simple_rule(10)).unwrap_err();
        assert!(matches!(err, Error::Schema { ref field, .. } if field == "Base"));
    }

    #[test]
    fn test_every_retained_group_satisfies_invariant() {
        let rule = simple_rule(5);
        let mut rows = Vec::new();
        for p in 0..12 {
            for s in 0..(p % 8) {
                let base = if (p + s) % 5 == 0 { "bad-name.dcm".to_string() } else { format!("{s}.dcm") };
                rows.push(row(&format!("P{p:03}"), p % 3, &base));
            }
        }
        let out = run(rows, &rule).unwrap();
        for group in out.groups.values() {
            assert!(is_valid_group(group, &rule));
            assert!(group.windows(2).all(|w| w[0] <= w[1]));
        }
        let union: BTreeSet<String> = out.groups.values().flatten().cloned().collect();
        assert_eq!(union, out.eligible);
    }

    #[test]
    fn test_deterministic() {
        let rows: Vec<MetadataRow> = (0..20)
            .map(|i| row(&format!("P{}", i % 4), i % 2, &format!("{}.dcm", 20 - i)))
            .collect();
        let a = run(rows.clone(), &simple_rule(10)).unwrap();
        let b = run(rows, &simple_rule(10)).unwrap();
        assert_eq!(a, b);
    }
}
