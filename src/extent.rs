//! Running intensity extent over a stream of tensors.

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Global `[min, max]` over every observed value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtentRecord {
    pub min: f64,
    pub max: f64,
}

/// Streaming min/max tracker; state is two numbers regardless of input size.
#[derive(Debug, Clone, Default)]
pub struct ExtentTracker {
    current: Option<ExtentRecord>,
    observed: usize,
}

impl ExtentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one tensor into the running extent. Empty tensors are ignored.
    pub fn observe(&mut self, tensor: &Array3<f32>) {
        let Some((lo, hi)) = tensor.iter().fold(None, |acc: Option<(f32, f32)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        }) else {
            return;
        };
        let (lo, hi) = (f64::from(lo), f64::from(hi));
        self.current = Some(match self.current {
            None => ExtentRecord { min: lo, max: hi },
            Some(r) => ExtentRecord {
                min: r.min.min(lo),
                max: r.max.max(hi),
            },
        });
        self.observed += 1;
    }

    /// Number of non-empty tensors folded in so far.
    pub fn observed(&self) -> usize {
        self.observed
    }

    pub fn finalize(&self) -> Result<ExtentRecord> {
        self.current.ok_or(Error::EmptyExtent)
    }
}
