//! Candidate assembly: directory listings intersected with eligibility sets.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::config::{GroupRule, RegroupKey};
use crate::error::Result;
use crate::io::DirectoryLister;

/// Marker that hides a directory entry.
pub const HIDDEN_PREFIX: char = '.';

/// One unit of work for the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CandidateItem {
    /// A single volume or compressed array.
    Single(PathBuf),
    /// An ordered slice series.
    Group(Vec<PathBuf>),
}

impl CandidateItem {
    /// Number of files backing this item.
    pub fn file_count(&self) -> usize {
        match self {
            CandidateItem::Single(_) => 1,
            CandidateItem::Group(paths) => paths.len(),
        }
    }
}

/// How an item is decoded and oriented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// 4-D public-dataset volume.
    Volumetric,
    /// 3-D compressed array; `rotate` applies the 90° orientation fix.
    CompressedArray { rotate: bool },
    /// Ordered single-slice files, always rotated.
    Series,
}

/// A candidate with its category label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledItem {
    pub item: CandidateItem,
    pub kind: ItemKind,
    pub label: u32,
}

fn visible(names: BTreeSet<String>) -> BTreeSet<String> {
    names
        .into_iter()
        .filter(|n| !n.starts_with(HIDDEN_PREFIX))
        .collect()
}

/// Builds per-cohort candidate lists from a [`DirectoryLister`].
///
/// All outputs are sorted lexicographically at every level, so identical
/// directory contents and eligibility sets give identical lists.
pub struct CandidateSetBuilder<'a, L: DirectoryLister + ?Sized> {
    lister: &'a L,
}

impl<'a, L: DirectoryLister + ?Sized> CandidateSetBuilder<'a, L> {
    pub fn new(lister: &'a L) -> Self {
        Self { lister }
    }

    fn eligible_names(&self, dir: &Path, eligible: &BTreeSet<String>) -> Result<BTreeSet<String>> {
        let listed = visible(self.lister.list_files(dir)?);
        Ok(listed.intersection(eligible).cloned().collect())
    }

    /// Every visible file in `dir`, no eligibility filter.
    pub fn all_files(&self, dir: &Path, kind: ItemKind, label: u32) -> Result<Vec<LabeledItem>> {
        let names = visible(self.lister.list_files(dir)?);
        debug!(dir = %dir.display(), files = names.len(), "listed unfiltered source");
        Ok(names
            .into_iter()
            .map(|name| LabeledItem {
                item: CandidateItem::Single(dir.join(name)),
                kind,
                label,
            })
            .collect())
    }

    /// Flat mode: one item per eligible file.
    pub fn flat(
        &self,
        dir: &Path,
        eligible: &BTreeSet<String>,
        kind: ItemKind,
        label: u32,
    ) -> Result<Vec<LabeledItem>> {
        let names = self.eligible_names(dir, eligible)?;
        debug!(dir = %dir.display(), accepted = names.len(), "flat candidates");
        Ok(names
            .into_iter()
            .map(|name| LabeledItem {
                item: CandidateItem::Single(dir.join(name)),
                kind,
                label,
            })
            .collect())
    }

    /// Grouped mode: eligible files regrouped by their positional key.
    ///
    /// With `recheck` set, groups containing a filename of the wrong token
    /// count are dropped after regrouping.
    pub fn grouped(
        &self,
        dir: &Path,
        eligible: &BTreeSet<String>,
        regroup: &RegroupKey,
        recheck: Option<&GroupRule>,
        label: u32,
    ) -> Result<Vec<LabeledItem>> {
        let names = self.eligible_names(dir, eligible)?;

        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in names {
            match regroup.derive(&name) {
                Some(key) => groups.entry(key).or_default().push(name),
                None => warn!(file = %name, "cannot derive series key from filename"),
            }
        }

        let mut items = Vec::with_capacity(groups.len());
        for (key, mut files) in groups {
            files.sort();
            if let Some(rule) = recheck {
                if files.iter().any(|f| rule.token_count(f) != rule.required_tokens) {
                    debug!(key = %key, "dropping regrouped series with wrong token count");
                    continue;
                }
            }
            items.push(LabeledItem {
                item: CandidateItem::Group(files.into_iter().map(|f| dir.join(f)).collect()),
                kind: ItemKind::Series,
                label,
            });
        }
        debug!(dir = %dir.display(), series = items.len(), "grouped candidates");
        Ok(items)
    }
}
