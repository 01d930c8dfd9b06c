//! # medprep
//!
//! Deterministic assembly of brain MRI training datasets.
//!
//! A run filters cohort metadata tables, reconciles them with the files on
//! disk, splits the resulting items with a seeded stratified shuffle, and
//! writes every item as a z-scored `(slices, 256, 256)` tensor together with
//! per-slice CSV manifests and the training-split intensity extent.
//!
//! ## Quick Start
//!
//! ```ignore
//! use medprep::{Pipeline, RunConfig};
//!
//! let config = RunConfig::load("medprep.toml")?;
//! let report = Pipeline::new(config)?.run()?;
//! println!("{} items written", report.total_items());
//! ```
//!
//! ## Layout
//!
//! - [`metadata`]: CSV tables and exact-match filtering
//! - [`cohort`]: group reconciliation and candidate assembly
//! - [`split`]: stratified train/valid/test partitioning
//! - [`transforms`] and [`normalize`]: per-item geometry and intensity
//! - [`nifti`], [`npz`], [`dicom`]: default decoders
//! - [`store`] and [`extent`]: persistence and the running extent
//! - [`pipeline`]: the driver tying it together

pub mod cohort;
pub mod config;
pub mod dicom;
pub mod error;
pub mod extent;
pub mod io;
pub mod metadata;
pub mod nifti;
pub mod normalize;
pub mod npz;
pub mod pipeline;
pub mod split;
pub mod store;
pub mod transforms;

pub use config::{CorpusKind, RunConfig};
pub use error::{Error, Result};
pub use extent::{ExtentRecord, ExtentTracker};
pub use normalize::{NormalizeConfig, SliceNormalizer};
pub use pipeline::{CorpusPlan, Pipeline, RunReport};
pub use split::{split_three_way, split_two_way, SplitName};
