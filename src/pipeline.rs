//! End-to-end dataset assembly.
//!
//! For each corpus: build eligibility per cohort, intersect with directory
//! listings, split, then normalize and persist every split. Items of a split
//! are normalized in parallel batches and written sequentially in split
//! order, so tensor indices and manifest rows are reproducible.

use std::collections::BTreeMap;
use std::fmt;

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array3, Axis};
use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::cohort::{eligibility, CandidateSetBuilder, CohortSource, Eligibility, ItemKind, LabeledItem};
use crate::config::{CorpusConfig, CorpusKind, CorpusSource, RunConfig};
use crate::error::{Error, Result};
use crate::extent::{ExtentRecord, ExtentTracker};
use crate::io::{DirectoryLister, FsLister, TensorStore};
use crate::metadata::load_csv;
use crate::normalize::SliceNormalizer;
use crate::npz::NpzDecoder;
use crate::split::{split_three_way, split_two_way, Partitions, SplitName, HOLDOUT_FRACTION};
use crate::store::{write_extent, ManifestWriter, NpzTensorStore, OutputLayout};

/// Item and per-label counts of one planned split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPlan {
    pub split: SplitName,
    pub items: usize,
    pub labels: BTreeMap<u32, usize>,
}

/// What a run would produce for one corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusPlan {
    pub kind: CorpusKind,
    pub splits: Vec<SplitPlan>,
}

impl fmt::Display for CorpusPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:?}", self.kind)?;
        for s in &self.splits {
            let labels: Vec<String> = s.labels.iter().map(|(l, n)| format!("{l}:{n}")).collect();
            writeln!(f, "  {:<5} {:>5} items  [{}]", s.split, s.items, labels.join(" "))?;
        }
        Ok(())
    }
}

/// Items and slices written for one split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitReport {
    pub split: SplitName,
    pub items: usize,
    pub slices: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorpusReport {
    pub kind: CorpusKind,
    pub splits: Vec<SplitReport>,
    /// Extent over the training split.
    pub extent: ExtentRecord,
}

/// Summary returned by [`Pipeline::run`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunReport {
    pub corpora: Vec<CorpusReport>,
}

impl RunReport {
    pub fn total_items(&self) -> usize {
        self.corpora
            .iter()
            .flat_map(|c| &c.splits)
            .map(|s| s.items)
            .sum()
    }

    pub fn log(&self) {
        for corpus in &self.corpora {
            for s in &corpus.splits {
                info!(
                    corpus = corpus.kind.meta_prefix(),
                    split = %s.split,
                    items = s.items,
                    slices = s.slices,
                    "wrote split"
                );
            }
            info!(
                corpus = corpus.kind.meta_prefix(),
                min = corpus.extent.min,
                max = corpus.extent.max,
                "training extent"
            );
        }
    }
}

fn label_of(item: &LabeledItem) -> u32 {
    item.label
}

fn label_counts(items: &[LabeledItem]) -> BTreeMap<u32, usize> {
    let mut counts = BTreeMap::new();
    for item in items {
        *counts.entry(item.label).or_insert(0) += 1;
    }
    counts
}

fn progress_bar(len: usize, message: String, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    pb.set_style(style);
    pb.set_message(message);
    pb
}

/// Drives both corpora from a [`RunConfig`].
pub struct Pipeline<L: DirectoryLister = FsLister, S: TensorStore = NpzTensorStore> {
    config: RunConfig,
    layout: OutputLayout,
    lister: L,
    store: S,
    normalizer: SliceNormalizer,
    progress: bool,
}

impl Pipeline {
    /// Pipeline over the local filesystem with the default decoders.
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        let normalizer = SliceNormalizer::new(config.normalize.clone())
            .with_array_decoder(NpzDecoder::new(config.array_key.clone()));
        Ok(Self {
            layout: OutputLayout::new(config.output_root.clone()),
            config,
            lister: FsLister,
            store: NpzTensorStore,
            normalizer,
            progress: false,
        })
    }
}

impl<L: DirectoryLister, S: TensorStore> Pipeline<L, S> {
    pub fn with_lister<L2: DirectoryLister>(self, lister: L2) -> Pipeline<L2, S> {
        Pipeline {
            config: self.config,
            layout: self.layout,
            lister,
            store: self.store,
            normalizer: self.normalizer,
            progress: self.progress,
        }
    }

    pub fn with_store<S2: TensorStore>(self, store: S2) -> Pipeline<L, S2> {
        Pipeline {
            config: self.config,
            layout: self.layout,
            lister: self.lister,
            store,
            normalizer: self.normalizer,
            progress: self.progress,
        }
    }

    pub fn with_normalizer(mut self, normalizer: SliceNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Show an indicatif bar per split.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn batch_size(&self) -> usize {
        self.config
            .batch_size
            .unwrap_or_else(rayon::current_num_threads)
            .max(1)
    }

    /// Eligibility for every cohort referenced by either corpus.
    fn eligibilities(&self) -> Result<BTreeMap<String, Eligibility>> {
        let mut out = BTreeMap::new();
        for corpus in self.config.corpora() {
            for source in &corpus.sources {
                let CorpusSource::Cohort { cohort: name, .. } = source else {
                    continue;
                };
                if out.contains_key(name) {
                    continue;
                }
                let cohort = self
                    .config
                    .cohort(name)
                    .ok_or_else(|| Error::Configuration(format!("unknown cohort '{name}'")))?;
                let table = load_csv(self.config.source_root.join(&cohort.table))?;
                out.insert(name.clone(), eligibility(cohort, &table)?);
            }
        }
        Ok(out)
    }

    /// Labeled candidates of one corpus, sources in configuration order.
    fn candidates(
        &self,
        corpus: &CorpusConfig,
        eligible: &BTreeMap<String, Eligibility>,
    ) -> Result<Vec<LabeledItem>> {
        let builder = CandidateSetBuilder::new(&self.lister);
        let root = &self.config.source_root;
        let mut items = Vec::new();

        for source in &corpus.sources {
            let found = match source {
                CorpusSource::Volumes { directory, label } => {
                    builder.all_files(&root.join(directory), ItemKind::Volumetric, *label)?
                }
                CorpusSource::Cohort {
                    cohort: name,
                    label,
                    rotate,
                } => {
                    let cohort = self
                        .config
                        .cohort(name)
                        .ok_or_else(|| Error::Configuration(format!("unknown cohort '{name}'")))?;
                    let files = eligible
                        .get(name)
                        .map(Eligibility::files)
                        .ok_or_else(|| Error::Configuration(format!("no eligibility for '{name}'")))?;
                    let dir = root.join(&cohort.directory);
                    match &cohort.source {
                        CohortSource::Flat { .. } => builder.flat(
                            &dir,
                            files,
                            ItemKind::CompressedArray { rotate: *rotate },
                            *label,
                        )?,
                        CohortSource::Grouped {
                            rule,
                            regroup,
                            recheck_tokens,
                        } => builder.grouped(
                            &dir,
                            files,
                            regroup,
                            recheck_tokens.then_some(rule),
                            *label,
                        )?,
                    }
                }
            };
            info!(
                corpus = corpus.kind.meta_prefix(),
                source = ?source,
                items = found.len(),
                "collected candidates"
            );
            items.extend(found);
        }
        Ok(items)
    }

    fn split(&self, kind: CorpusKind, items: Vec<LabeledItem>) -> Result<Partitions<LabeledItem>> {
        match kind {
            CorpusKind::Autoencoder => split_two_way(items, label_of, HOLDOUT_FRACTION, self.config.seed),
            CorpusKind::Classifier => split_three_way(items, label_of, self.config.seed),
        }
    }

    fn partitions(&self) -> Result<Vec<(CorpusKind, Partitions<LabeledItem>)>> {
        let eligible = self.eligibilities()?;
        let mut out = Vec::new();
        for corpus in self.config.corpora() {
            let items = self.candidates(corpus, &eligible)?;
            if items.is_empty() {
                warn!(corpus = corpus.kind.meta_prefix(), "corpus has no candidates");
            }
            out.push((corpus.kind, self.split(corpus.kind, items)?));
        }
        Ok(out)
    }

    /// Split sizes and label counts without decoding or writing anything.
    pub fn plan(&self) -> Result<Vec<CorpusPlan>> {
        Ok(self
            .partitions()?
            .into_iter()
            .map(|(kind, parts)| CorpusPlan {
                kind,
                splits: parts
                    .into_named()
                    .into_iter()
                    .map(|(split, items)| SplitPlan {
                        split,
                        items: items.len(),
                        labels: label_counts(&items),
                    })
                    .collect(),
            })
            .collect())
    }

    /// Assemble both corpora on disk.
    pub fn run(&mut self) -> Result<RunReport> {
        let mut report = RunReport::default();
        for (kind, parts) in self.partitions()? {
            let named = parts.into_named();
            let splits: Vec<SplitName> = named.iter().map(|(s, _)| *s).collect();
            self.layout.create(kind, &splits)?;

            let mut tracker = ExtentTracker::new();
            let mut split_reports = Vec::with_capacity(named.len());
            for (split, items) in named {
                let feed = (split == SplitName::Train).then_some(&mut tracker);
                split_reports.push(self.process_split(kind, split, &items, feed)?);
            }

            let extent = tracker.finalize()?;
            write_extent(self.layout.extent_path(kind), &extent)?;
            report.corpora.push(CorpusReport {
                kind,
                splits: split_reports,
                extent,
            });
        }
        report.log();
        Ok(report)
    }

    fn process_split(
        &mut self,
        kind: CorpusKind,
        split: SplitName,
        items: &[LabeledItem],
        mut tracker: Option<&mut ExtentTracker>,
    ) -> Result<SplitReport> {
        let dir = self.layout.tensor_dir(kind, split);
        let mut manifest = ManifestWriter::create(self.layout.manifest_path(kind, split), kind.with_class())?;
        let batch = self.batch_size();
        let pb = progress_bar(
            items.len(),
            format!("{} {split}", kind.meta_prefix()),
            self.progress,
        );

        let normalizer = &self.normalizer;
        let mut slices = 0;
        for (b, chunk) in items.chunks(batch).enumerate() {
            let tensors: Vec<Array3<f32>> = chunk
                .par_iter()
                .map(|it| {
                    normalizer.normalize(&it.item, it.kind).map_err(|e| {
                        error!(item = ?it.item, error = %e, "normalization failed");
                        e
                    })
                })
                .collect::<Result<_>>()?;

            for (offset, (item, tensor)) in chunk.iter().zip(&tensors).enumerate() {
                let index = b * batch + offset;
                let path = self.store.store(&dir, index, tensor)?;
                let depth = tensor.len_of(Axis(0));
                manifest.append(&path, depth, item.label)?;
                if let Some(t) = tracker.as_deref_mut() {
                    t.observe(tensor);
                }
                slices += depth;
                pb.inc(1);
            }
        }
        manifest.finish()?;
        pb.finish_and_clear();

        info!(
            corpus = kind.meta_prefix(),
            split = %split,
            items = items.len(),
            slices,
            "split complete"
        );
        Ok(SplitReport {
            split,
            items: items.len(),
            slices,
        })
    }
}
