//! Reproducible stratified train/valid/test partitioning.
//!
//! Each split stage draws a fixed number of members from every class using
//! the approximate-mode allocation, so class proportions are preserved up to
//! rounding. The RNG is re-seeded for every stage, which makes the result a
//! pure function of the input order, the labels, the fractions and the seed.

use std::collections::BTreeMap;
use std::fmt;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::error::{Error, Result};

/// Seed used for every split unless configured otherwise.
pub const DEFAULT_SEED: u64 = 42;

/// Fraction of items held out of training.
pub const HOLDOUT_FRACTION: f64 = 0.2;

/// Partition names, used for output directories and manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SplitName {
    Train,
    Valid,
    Test,
}

impl SplitName {
    pub const fn as_str(self) -> &'static str {
        match self {
            SplitName::Train => "train",
            SplitName::Valid => "valid",
            SplitName::Test => "test",
        }
    }
}

impl fmt::Display for SplitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Disjoint partitions covering the input exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partitions<T> {
    pub train: Vec<T>,
    pub valid: Vec<T>,
    /// Empty for two-way splits.
    pub test: Vec<T>,
}

impl<T> Partitions<T> {
    /// Non-empty partitions in processing order: train, valid, test.
    pub fn into_named(self) -> Vec<(SplitName, Vec<T>)> {
        let mut out = vec![(SplitName::Train, self.train), (SplitName::Valid, self.valid)];
        if !self.test.is_empty() {
            out.push((SplitName::Test, self.test));
        }
        out
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.valid.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split `items` in two, stratified by `label_of`.
///
/// `holdout` is the fraction going to the second partition; its size is
/// `ceil(holdout * n)`.
pub fn split_two_way<T, F>(items: Vec<T>, label_of: F, holdout: f64, seed: u64) -> Result<Partitions<T>>
where
    F: Fn(&T) -> u32,
{
    let (train, valid) = stratified_split(items, &label_of, holdout, seed)?;
    debug!(train = train.len(), valid = valid.len(), "two-way split");
    Ok(Partitions {
        train,
        valid,
        test: Vec::new(),
    })
}

/// 80/20 train vs. rest, then the rest 50/50 into valid and test.
pub fn split_three_way<T, F>(items: Vec<T>, label_of: F, seed: u64) -> Result<Partitions<T>>
where
    F: Fn(&T) -> u32,
{
    let (train, rest) = stratified_split(items, &label_of, HOLDOUT_FRACTION, seed)?;
    let (valid, test) = stratified_split(rest, &label_of, 0.5, seed)?;
    debug!(
        train = train.len(),
        valid = valid.len(),
        test = test.len(),
        "three-way split"
    );
    Ok(Partitions { train, valid, test })
}

/// One stratified shuffle-split stage: returns `(kept, held_out)`.
///
/// Every class must land in both partitions, so a three-way split also
/// populates valid and test with every class.
fn stratified_split<T, F>(items: Vec<T>, label_of: &F, holdout: f64, seed: u64) -> Result<(Vec<T>, Vec<T>)>
where
    F: Fn(&T) -> u32,
{
    if !(holdout > 0.0 && holdout < 1.0) {
        return Err(Error::Configuration(format!(
            "holdout fraction must be in (0, 1), got {holdout}"
        )));
    }

    let n = items.len();
    let n_test = (holdout * n as f64).ceil() as usize;
    let n_train = n - n_test;

    // Class member indices in input order, classes in ascending label order.
    let mut classes: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (idx, item) in items.iter().enumerate() {
        classes.entry(label_of(item)).or_default().push(idx);
    }
    let counts: Vec<usize> = classes.values().map(Vec::len).collect();

    if let Some((label, members)) = classes.iter().find(|(_, m)| m.len() < 2) {
        return Err(Error::Stratification(format!(
            "class {label} has {} member(s); at least 2 are required",
            members.len()
        )));
    }
    if n_train < classes.len() || n_test < classes.len() {
        return Err(Error::Stratification(format!(
            "partitions of {n_train} and {n_test} items cannot hold all {} classes",
            classes.len()
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let train_counts = approximate_mode(&counts, n_train, &mut rng);
    let remaining: Vec<usize> = counts.iter().zip(&train_counts).map(|(c, t)| c - t).collect();
    let test_counts = approximate_mode(&remaining, n_test, &mut rng);
    for ((label, &k_train), &k_test) in classes.keys().zip(&train_counts).zip(&test_counts) {
        if k_train == 0 || k_test == 0 {
            return Err(Error::Stratification(format!(
                "class {label} gets {k_train} kept and {k_test} held-out member(s) of {}; \
                 every class must appear in both partitions",
                k_train + k_test
            )));
        }
    }

    let mut train_idx = Vec::with_capacity(n_train);
    let mut test_idx = Vec::with_capacity(n_test);
    for (members, (&k_train, &k_test)) in classes.values().zip(train_counts.iter().zip(&test_counts)) {
        let mut shuffled = members.clone();
        shuffled.shuffle(&mut rng);
        train_idx.extend_from_slice(&shuffled[..k_train]);
        test_idx.extend_from_slice(&shuffled[k_train..k_train + k_test]);
    }
    train_idx.shuffle(&mut rng);
    test_idx.shuffle(&mut rng);

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut take = |idx: &[usize]| -> Vec<T> { idx.iter().filter_map(|&i| slots[i].take()).collect() };
    let train = take(&train_idx);
    let test = take(&test_idx);
    Ok((train, test))
}

/// Distribute `draws` over classes proportionally to `counts`.
///
/// Each class first gets the floor of its continuous share; leftover draws go
/// to the classes with the largest fractional remainder, ties resolved by the
/// RNG. No class receives more than its count.
fn approximate_mode(counts: &[usize], draws: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return vec![0; counts.len()];
    }
    let continuous: Vec<f64> = counts
        .iter()
        .map(|&c| c as f64 * draws as f64 / total as f64)
        .collect();
    let mut floored: Vec<usize> = continuous.iter().map(|c| c.floor() as usize).collect();
    let mut need = draws.saturating_sub(floored.iter().sum());

    let remainders: Vec<f64> = continuous
        .iter()
        .zip(&floored)
        .map(|(c, &f)| c - f as f64)
        .collect();
    let mut levels = remainders.clone();
    levels.sort_by(|a, b| b.total_cmp(a));
    levels.dedup();

    for level in levels {
        if need == 0 {
            break;
        }
        let tied: Vec<usize> = (0..counts.len())
            .filter(|&i| remainders[i] == level && floored[i] < counts[i])
            .collect();
        let add_now = tied.len().min(need);
        for &i in tied.choose_multiple(rng, add_now) {
            floored[i] += 1;
        }
        need -= add_now;
    }
    floored
}
