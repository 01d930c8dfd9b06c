//! Run configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) reproduces the
//! built-in corpora: BraTS volumes plus normal brains for the autoencoder,
//! seven tumor cohorts plus normal brains for the classifier.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cohort::{default_cohorts, CohortConfig};
use crate::error::{Error, Result};
use crate::normalize::NormalizeConfig;
use crate::npz::DEFAULT_ARRAY_KEY;
use crate::split::DEFAULT_SEED;

/// The two datasets a run assembles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusKind {
    /// Train/valid, manifests without class column.
    Autoencoder,
    /// Train/valid/test, manifests with class column.
    Classifier,
}

impl CorpusKind {
    /// Directory under `data/`.
    pub const fn data_dir(self) -> &'static str {
        match self {
            CorpusKind::Autoencoder => "autoencode",
            CorpusKind::Classifier => "classifier",
        }
    }

    /// Prefix of manifest and extent files under `meta/`.
    pub const fn meta_prefix(self) -> &'static str {
        match self {
            CorpusKind::Autoencoder => "ae",
            CorpusKind::Classifier => "clf",
        }
    }

    pub const fn with_class(self) -> bool {
        matches!(self, CorpusKind::Classifier)
    }
}

/// Where the items of one label come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CorpusSource {
    /// Every visible 4-D volume in `directory` (relative to the source root).
    Volumes { directory: PathBuf, label: u32 },
    /// A named cohort; `rotate` applies to flat (compressed array) cohorts.
    Cohort {
        cohort: String,
        label: u32,
        #[serde(default)]
        rotate: bool,
    },
}

impl CorpusSource {
    pub fn label(&self) -> u32 {
        match self {
            CorpusSource::Volumes { label, .. } | CorpusSource::Cohort { label, .. } => *label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusConfig {
    pub kind: CorpusKind,
    pub sources: Vec<CorpusSource>,
}

/// Top-level settings for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Root that cohort tables and directories are resolved against.
    #[serde(default = "default_root")]
    pub source_root: PathBuf,

    /// Root receiving `data/` and `meta/`.
    #[serde(default = "default_root")]
    pub output_root: PathBuf,

    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default)]
    pub normalize: NormalizeConfig,

    /// Entry read from compressed array archives.
    #[serde(default = "default_array_key")]
    pub array_key: String,

    /// Items normalized per parallel batch; rayon's thread count when unset.
    #[serde(default)]
    pub batch_size: Option<usize>,

    #[serde(default = "default_cohorts")]
    pub cohorts: Vec<CohortConfig>,

    #[serde(default = "default_autoencoder")]
    pub autoencoder: CorpusConfig,

    #[serde(default = "default_classifier")]
    pub classifier: CorpusConfig,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_seed() -> u64 {
    DEFAULT_SEED
}
fn default_array_key() -> String {
    DEFAULT_ARRAY_KEY.to_string()
}

fn default_autoencoder() -> CorpusConfig {
    let brats = PathBuf::from("Task01_BrainTumour");
    CorpusConfig {
        kind: CorpusKind::Autoencoder,
        sources: vec![
            CorpusSource::Volumes {
                directory: brats.join("imagesTr"),
                label: 1,
            },
            CorpusSource::Volumes {
                directory: brats.join("imagesTs"),
                label: 1,
            },
            CorpusSource::Cohort {
                cohort: "normal".into(),
                label: 2,
                rotate: true,
            },
        ],
    }
}

fn default_classifier() -> CorpusConfig {
    let tumor = |cohort: &str, label| CorpusSource::Cohort {
        cohort: cohort.into(),
        label,
        rotate: false,
    };
    CorpusConfig {
        kind: CorpusKind::Classifier,
        sources: vec![
            tumor("st_dipg", 0),
            tumor("se_dipg", 0),
            tumor("st_ep", 1),
            tumor("se_ep", 1),
            tumor("st_mb", 2),
            tumor("se_mb", 2),
            tumor("st_pilo", 3),
            tumor("normal", 4),
        ],
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source_root: default_root(),
            output_root: default_root(),
            seed: default_seed(),
            normalize: NormalizeConfig::default(),
            array_key: default_array_key(),
            batch_size: None,
            cohorts: default_cohorts(),
            autoencoder: default_autoencoder(),
            classifier: default_classifier(),
        }
    }
}

impl RunConfig {
    /// Read and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn cohort(&self, name: &str) -> Option<&CohortConfig> {
        self.cohorts.iter().find(|c| c.name == name)
    }

    pub fn corpora(&self) -> [&CorpusConfig; 2] {
        [&self.autoencoder, &self.classifier]
    }

    pub fn validate(&self) -> Result<()> {
        self.normalize.validate()?;
        if self.batch_size == Some(0) {
            return Err(Error::Configuration("batch_size must be positive".into()));
        }

        let mut names = BTreeSet::new();
        for cohort in &self.cohorts {
            if !names.insert(cohort.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "cohort '{}' defined twice",
                    cohort.name
                )));
            }
        }

        for corpus in self.corpora() {
            if corpus.sources.is_empty() {
                return Err(Error::Configuration(format!(
                    "{:?} corpus has no sources",
                    corpus.kind
                )));
            }
            for source in &corpus.sources {
                if let CorpusSource::Cohort { cohort, .. } = source {
                    if !names.contains(cohort.as_str()) {
                        return Err(Error::Configuration(format!(
                            "{:?} corpus references unknown cohort '{cohort}'",
                            corpus.kind
                        )));
                    }
                }
            }
        }
        if self.autoencoder.kind == self.classifier.kind {
            return Err(Error::Configuration(
                "autoencoder and classifier corpora must differ in kind".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.normalize.target_size, 256);
        assert_eq!(cfg.normalize.volume_channel, 3);
        assert_eq!((cfg.normalize.depth_start, cfg.normalize.depth_end), (25, 125));
        assert_eq!(cfg.array_key, "T2 ax");
        assert_eq!(cfg.cohorts.len(), 8);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_normal_brains_rotation_per_corpus() {
        let cfg = RunConfig::default();
        let find = |corpus: &CorpusConfig| {
            corpus
                .sources
                .iter()
                .find_map(|s| match s {
                    CorpusSource::Cohort { cohort, label, rotate } if cohort == "normal" => {
                        Some((*label, *rotate))
                    }
                    _ => None,
                })
                .unwrap()
        };
        assert_eq!(find(&cfg.autoencoder), (2, true));
        assert_eq!(find(&cfg.classifier), (4, false));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: RunConfig = toml::from_str(
            r#"
            source_root = "/data/raw"
            seed = 7

            [normalize]
            target_size = 128
            "#,
        )
        .unwrap();
        assert_eq!(cfg.source_root, PathBuf::from("/data/raw"));
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.normalize.target_size, 128);
        assert_eq!(cfg.normalize.depth_end, 125);
        assert_eq!(cfg.classifier.sources.len(), 8);
    }

    #[test]
    fn test_custom_corpus_from_toml() {
        let cfg: RunConfig = toml::from_str(
            r#"
            [autoencoder]
            kind = "autoencoder"
            sources = [{ type = "volumes", directory = "vols", label = 1 }]
            "#,
        )
        .unwrap();
        assert_eq!(
            cfg.autoencoder.sources,
            vec![CorpusSource::Volumes {
                directory: PathBuf::from("vols"),
                label: 1
            }]
        );
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_unknown_cohort_rejected() {
        let mut cfg = RunConfig::default();
        cfg.classifier.sources.push(CorpusSource::Cohort {
            cohort: "missing".into(),
            label: 9,
            rotate: false,
        });
        assert!(matches!(cfg.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medprep.toml");
        std::fs::write(&path, "batch_size = 4\n").unwrap();
        let cfg = RunConfig::load(&path).unwrap();
        assert_eq!(cfg.batch_size, Some(4));

        std::fs::write(&path, "batch_size = 0\n").unwrap();
        assert!(RunConfig::load(&path).is_err());
        std::fs::write(&path, "seed = \"x\"\n").unwrap();
        assert!(matches!(RunConfig::load(&path), Err(Error::Toml(_))));
    }
}
