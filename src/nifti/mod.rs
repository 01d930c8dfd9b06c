//! `NIfTI` file format support.
//!
//! Reads `.nii` and `.nii.gz` volumes (NIfTI-1 and NIfTI-2, either
//! endianness) into `f32` arrays for the volumetric corpus.

pub(crate) mod header;
pub mod io;

pub use header::{DataType, NiftiHeader, NiftiVersion};
pub use io::{decode_bytes, load, NiftiDecoder};
