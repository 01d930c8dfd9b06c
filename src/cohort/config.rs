//! Per-cohort configuration records.
//!
//! The Stanford and Seattle cohorts share one pipeline and differ only in the
//! values held here: table location, predicates, token count, group cap and
//! the positional key used to regroup files found on disk.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::metadata::{MetadataRow, Predicate};

/// One piece of a filename or group-key template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplatePart {
    /// The cell rendered as text.
    Field { field: String },
    /// An integer cell, left-zero-padded to `width` digits.
    Padded { field: String, width: usize },
    /// Token `index` of the cell split on `delimiter`.
    Token {
        field: String,
        delimiter: String,
        index: usize,
    },
}

impl TemplatePart {
    pub fn field(&self) -> &str {
        match self {
            TemplatePart::Field { field }
            | TemplatePart::Padded { field, .. }
            | TemplatePart::Token { field, .. } => field,
        }
    }

    /// Render this part for `row`; `None` when the cell is null or malformed.
    pub fn resolve(&self, row: &MetadataRow) -> Option<String> {
        let value = row.get(self.field()).filter(|v| !v.is_null())?;
        match self {
            TemplatePart::Field { .. } => Some(value.to_string()),
            TemplatePart::Padded { width, .. } => {
                let n = value.as_i64()?;
                Some(format!("{n:0width$}", width = *width))
            }
            TemplatePart::Token {
                delimiter, index, ..
            } => value
                .to_string()
                .split(delimiter.as_str())
                .nth(*index)
                .map(str::to_string),
        }
    }
}

/// Parts joined by a separator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub parts: Vec<TemplatePart>,
    pub separator: String,
}

impl Template {
    pub fn new(parts: Vec<TemplatePart>, separator: &str) -> Self {
        Self {
            parts,
            separator: separator.to_string(),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(TemplatePart::field)
    }

    pub fn render(&self, row: &MetadataRow) -> Option<String> {
        let rendered = self
            .parts
            .iter()
            .map(|p| p.resolve(row))
            .collect::<Option<Vec<_>>>()?;
        Some(rendered.join(&self.separator))
    }
}

/// Structural rules for multi-file cohorts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRule {
    /// Filename built from each row.
    pub filename: Template,
    /// Group key built from each row.
    pub key: Template,
    /// Delimiter used for the token-count check.
    pub delimiter: String,
    /// Every member must split into exactly this many tokens.
    pub required_tokens: usize,
    /// Largest group kept (inclusive).
    pub max_group_size: usize,
}

impl GroupRule {
    /// The row-level rule shared by every tumor cohort:
    /// filename `PID-SID(2)-FileName_df`, key `PID_token1(FileName_df)`.
    pub fn standard(required_tokens: usize, max_group_size: usize) -> Self {
        Self {
            filename: Template::new(
                vec![
                    TemplatePart::Field {
                        field: "PID".into(),
                    },
                    TemplatePart::Padded {
                        field: "SID".into(),
                        width: 2,
                    },
                    TemplatePart::Field {
                        field: "FileName_df".into(),
                    },
                ],
                "-",
            ),
            key: Template::new(
                vec![
                    TemplatePart::Field {
                        field: "PID".into(),
                    },
                    TemplatePart::Token {
                        field: "FileName_df".into(),
                        delimiter: "-".into(),
                        index: 1,
                    },
                ],
                "_",
            ),
            delimiter: "-".into(),
            required_tokens,
            max_group_size,
        }
    }

    pub fn token_count(&self, filename: &str) -> usize {
        filename.split(self.delimiter.as_str()).count()
    }
}

/// Positional key recovered from a filename on disk:
/// `{last chars of token[subject]}_{token[series]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegroupKey {
    pub delimiter: String,
    pub subject_token: usize,
    pub subject_suffix: usize,
    pub series_token: usize,
}

impl RegroupKey {
    pub fn new(subject_token: usize, series_token: usize) -> Self {
        Self {
            delimiter: "-".into(),
            subject_token,
            subject_suffix: 4,
            series_token,
        }
    }

    pub fn derive(&self, filename: &str) -> Option<String> {
        let tokens: Vec<&str> = filename.split(self.delimiter.as_str()).collect();
        let subject = tokens.get(self.subject_token)?;
        let series = tokens.get(self.series_token)?;
        let skip = subject.chars().count().saturating_sub(self.subject_suffix);
        let suffix: String = subject.chars().skip(skip).collect();
        Some(format!("{suffix}_{series}"))
    }
}

/// How a cohort turns its table into an eligibility set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CohortSource {
    /// One file per subject: `{id_field}.{extension}`, unique.
    Flat {
        id_field: String,
        extension: String,
    },
    /// Slice series grouped per subject and series.
    Grouped {
        rule: GroupRule,
        regroup: RegroupKey,
        /// Re-apply the token-count check after regrouping.
        #[serde(default)]
        recheck_tokens: bool,
    },
}

/// A named disease category + site with its own table and eligibility rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortConfig {
    pub name: String,
    /// Metadata CSV, relative to the source root.
    pub table: PathBuf,
    /// Directory holding the cohort files, relative to the source root.
    pub directory: PathBuf,
    pub predicates: Vec<Predicate>,
    pub source: CohortSource,
}

fn tumor_predicates() -> Vec<Predicate> {
    vec![
        Predicate::new("Series", "T2"),
        Predicate::new("Plane", "Axial"),
        Predicate::new("ModelFilter", "T2_Axial"),
    ]
}

fn tumor_cohort(
    site: &str,
    site_dir: &str,
    disease: &str,
    table_tag: &str,
    required_tokens: usize,
    max_group_size: usize,
) -> CohortConfig {
    let dipg_like = required_tokens == 5;
    let regroup = if dipg_like {
        RegroupKey::new(0, 3)
    } else {
        RegroupKey::new(1, 4)
    };
    CohortConfig {
        name: format!("{}_{}", site.to_lowercase(), disease.to_lowercase()),
        table: PathBuf::from("katie_annotated_metadata").join(format!(
            "{site}_{table_tag}_private_all_metadata_with_roi_annotated.csv"
        )),
        directory: PathBuf::from(disease)
            .join(site_dir)
            .join(format!("{site}_{table_tag}_T2_Axial"))
            .join("no_roi"),
        predicates: tumor_predicates(),
        source: CohortSource::Grouped {
            rule: GroupRule::standard(required_tokens, max_group_size),
            regroup,
            recheck_tokens: dipg_like,
        },
    }
}

/// The healthy-brain cohort (single `.npz` file per subject).
pub fn normal_cohort() -> CohortConfig {
    CohortConfig {
        name: "normal".into(),
        table: PathBuf::from("flipped_clinical_NormalPedBrainAge_StanfordCohort.csv"),
        directory: PathBuf::from("Normal"),
        predicates: vec![
            Predicate::new("Series", "T2"),
            Predicate::new("Plane", "Axial"),
            Predicate::new("ModelFilter", "T2 ax"),
            Predicate::new("SeriesDescription", "AX T2 FRFSE"),
            Predicate::new("is_Duplicate", "NO"),
        ],
        source: CohortSource::Flat {
            id_field: "Patient_ID".into(),
            extension: "npz".into(),
        },
    }
}

/// Built-in cohort table: the normal brains plus seven tumor cohorts.
pub fn default_cohorts() -> Vec<CohortConfig> {
    vec![
        normal_cohort(),
        tumor_cohort("ST", "Stanford", "DIPG", "DIPG", 5, 50),
        tumor_cohort("ST", "Stanford", "EP", "PF-EP", 6, 54),
        tumor_cohort("ST", "Stanford", "MB", "PF-MB", 6, 39),
        tumor_cohort("ST", "Stanford", "PILO", "PF-PILO", 6, 67),
        tumor_cohort("SE", "Seattle", "DIPG", "DIPG", 5, 50),
        tumor_cohort("SE", "Seattle", "EP", "PF-EP", 6, 67),
        tumor_cohort("SE", "Seattle", "MB", "PF-MB", 6, 67),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> MetadataRow {
        MetadataRow::default()
            .with("PID", "PF-EP0042")
            .with("SID", 3i64)
            .with("FileName_df", "ser7-img-0001.dcm")
    }

    #[test]
    fn test_standard_filename_and_key() {
        let rule = GroupRule::standard(6, 54);
        assert_eq!(
            rule.filename.render(&row()).as_deref(),
            Some("PF-EP0042-03-ser7-img-0001.dcm")
        );
        assert_eq!(rule.key.render(&row()).as_deref(), Some("PF-EP0042_img"));
        assert_eq!(rule.token_count("PF-EP0042-03-ser7-img-0001.dcm"), 6);
    }

    #[test]
    fn test_unresolvable_parts() {
        let rule = GroupRule::standard(6, 54);
        let no_token = row().with("FileName_df", "single.dcm");
        assert!(rule.key.render(&no_token).is_none());

        let bad_sid = row().with("SID", "abc");
        assert!(rule.filename.render(&bad_sid).is_none());

        let null_pid = row().with("PID", crate::metadata::MetadataValue::Null);
        assert!(rule.filename.render(&null_pid).is_none());
    }

    #[test]
    fn test_regroup_key_suffix() {
        let key = RegroupKey::new(1, 4);
        assert_eq!(
            key.derive("PF-EP0042-03-ser7-img-0001.dcm").as_deref(),
            Some("0042_img")
        );
        // Short subject tokens are used whole.
        assert_eq!(RegroupKey::new(0, 1).derive("ab-x").as_deref(), Some("ab_x"));
        assert!(RegroupKey::new(0, 3).derive("a-b").is_none());
    }

    #[test]
    fn test_default_cohorts_cover_all_sites() {
        let cohorts = default_cohorts();
        assert_eq!(cohorts.len(), 8);
        assert_eq!(cohorts[0].name, "normal");
        let st_mb = cohorts.iter().find(|c| c.name == "st_mb").unwrap();
        match &st_mb.source {
            CohortSource::Grouped { rule, recheck_tokens, .. } => {
                assert_eq!(rule.max_group_size, 39);
                assert_eq!(rule.required_tokens, 6);
                assert!(!recheck_tokens);
            }
            CohortSource::Flat { .. } => panic!("tumor cohorts are grouped"),
        }
        assert!(st_mb
            .directory
            .ends_with("MB/Stanford/ST_PF-MB_T2_Axial/no_roi"));
    }

    #[test]
    fn test_cohort_config_toml_roundtrip() {
        let cohort = default_cohorts().remove(1);
        let text = toml::to_string(&cohort).unwrap();
        let back: CohortConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, cohort);
    }
}
