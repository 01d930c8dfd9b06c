//! Item normalization: decode, square, resize, reorder, orient, standardise.
//!
//! Every item becomes a `(slices, size, size)` tensor with zero mean and unit
//! variance. The pure `normalize_*` functions hold the geometry; the
//! [`SliceNormalizer`] pairs them with decoders.

use ndarray::{s, Array2, Array3, ArrayD, Axis, Ix4};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cohort::{CandidateItem, ItemKind};
use crate::dicom::DicomDecoder;
use crate::error::{Error, Result};
use crate::io::{ArrayDecoder, SeriesDecoder, VolumeDecoder};
use crate::nifti::NiftiDecoder;
use crate::npz::NpzDecoder;
use crate::transforms::{
    pad_stack_to_square, pad_to_square, resize_slice, resize_stack, rotate_slices, slices_first,
    z_score,
};

/// Output geometry and the volumetric sub-volume selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// In-plane side length of every output slice.
    pub target_size: usize,
    /// Channel taken from 4-D volumes.
    pub volume_channel: usize,
    /// First depth index kept from 4-D volumes.
    pub depth_start: usize,
    /// One past the last depth index kept.
    pub depth_end: usize,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            target_size: 256,
            volume_channel: 3,
            depth_start: 25,
            depth_end: 125,
        }
    }
}

impl NormalizeConfig {
    fn plane(&self) -> (usize, usize) {
        (self.target_size, self.target_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_size == 0 {
            return Err(Error::Configuration("target_size must be positive".into()));
        }
        if self.depth_start >= self.depth_end {
            return Err(Error::Configuration(format!(
                "empty depth window {}..{}",
                self.depth_start, self.depth_end
            )));
        }
        Ok(())
    }
}

/// 4-D `(x, y, z, channel)` volume → `(depth window, size, size)`. Not rotated.
pub fn normalize_volume(volume: ArrayD<f32>, config: &NormalizeConfig) -> Result<Array3<f32>> {
    let volume = volume.into_dimensionality::<Ix4>().map_err(|_| {
        Error::InvalidDimensions("volumetric item must have 4 dimensions (x, y, z, channel)".into())
    })?;
    let (_, _, depth, channels) = volume.dim();
    if config.volume_channel >= channels {
        return Err(Error::InvalidDimensions(format!(
            "channel {} requested from a volume with {channels} channels",
            config.volume_channel
        )));
    }
    if config.depth_start >= config.depth_end || config.depth_end > depth {
        return Err(Error::InvalidDimensions(format!(
            "depth window {}..{} outside volume depth {depth}",
            config.depth_start, config.depth_end
        )));
    }

    let sub = volume.slice(s![.., .., config.depth_start..config.depth_end, config.volume_channel]);
    let resized = resize_stack(sub, config.plane());
    z_score(slices_first(resized))
}

/// 3-D `(h, w, slices)` array → `(slices, size, size)`, optionally rotated.
pub fn normalize_stack(stack: Array3<f32>, rotate: bool, config: &NormalizeConfig) -> Result<Array3<f32>> {
    let squared = pad_stack_to_square(stack.view());
    let resized = resize_stack(squared.view(), config.plane());
    let mut out = slices_first(resized);
    if rotate {
        out = rotate_slices(&out)?;
    }
    z_score(out)
}

/// Ordered 2-D slices → `(slices, size, size)`, always rotated.
pub fn normalize_series(slices: &[Array2<f32>], config: &NormalizeConfig) -> Result<Array3<f32>> {
    if slices.is_empty() {
        return Err(Error::DegenerateInput("series has no slices".into()));
    }
    let (side, _) = config.plane();
    let mut stack = Array3::<f32>::zeros((slices.len(), side, side));
    for (mut dst, slice) in stack.axis_iter_mut(Axis(0)).zip(slices) {
        let squared = pad_to_square(slice.view());
        dst.assign(&resize_slice(squared.view(), config.plane()));
    }
    z_score(rotate_slices(&stack)?)
}

/// Decodes candidate items and normalizes them per their [`ItemKind`].
pub struct SliceNormalizer {
    volumes: Box<dyn VolumeDecoder>,
    arrays: Box<dyn ArrayDecoder>,
    series: Box<dyn SeriesDecoder>,
    config: NormalizeConfig,
}

impl SliceNormalizer {
    /// Normalizer backed by the `NIfTI`, `.npz` and DICOM decoders.
    pub fn new(config: NormalizeConfig) -> Self {
        Self {
            volumes: Box::new(NiftiDecoder),
            arrays: Box::new(NpzDecoder::default()),
            series: Box::new(DicomDecoder),
            config,
        }
    }

    pub fn with_volume_decoder(mut self, decoder: impl VolumeDecoder + 'static) -> Self {
        self.volumes = Box::new(decoder);
        self
    }

    pub fn with_array_decoder(mut self, decoder: impl ArrayDecoder + 'static) -> Self {
        self.arrays = Box::new(decoder);
        self
    }

    pub fn with_series_decoder(mut self, decoder: impl SeriesDecoder + 'static) -> Self {
        self.series = Box::new(decoder);
        self
    }

    pub fn config(&self) -> &NormalizeConfig {
        &self.config
    }

    pub fn normalize(&self, item: &CandidateItem, kind: ItemKind) -> Result<Array3<f32>> {
        trace!(?item, ?kind, "normalizing");
        match (item, kind) {
            (CandidateItem::Single(path), ItemKind::Volumetric) => {
                normalize_volume(self.volumes.decode_volume(path)?, &self.config)
            }
            (CandidateItem::Single(path), ItemKind::CompressedArray { rotate }) => {
                normalize_stack(self.arrays.decode_array(path)?, rotate, &self.config)
            }
            (CandidateItem::Group(paths), ItemKind::Series) => {
                let slices = paths
                    .iter()
                    .map(|p| self.series.decode_slice(p))
                    .collect::<Result<Vec<_>>>()?;
                normalize_series(&slices, &self.config)
            }
            (item, kind) => Err(Error::Configuration(format!(
                "item {} cannot be normalized as {kind:?}",
                describe(item)
            ))),
        }
    }
}

fn describe(item: &CandidateItem) -> String {
    match item {
        CandidateItem::Single(p) => p.display().to_string(),
        CandidateItem::Group(paths) => format!(
            "group of {} starting at {}",
            paths.len(),
            paths.first().map(|p| p.display().to_string()).unwrap_or_default()
        ),
    }
}

impl std::fmt::Debug for SliceNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliceNormalizer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
