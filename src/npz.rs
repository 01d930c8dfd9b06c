//! Compressed array (`.npz`) decoding.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use ndarray::{Array3, Ix3, OwnedRepr};
use ndarray_npy::{NpzReader, ReadNpzError};

use crate::error::{Error, Result};
use crate::io::ArrayDecoder;

/// Entry holding the axial T2 stack in the normal-brain archives.
pub const DEFAULT_ARRAY_KEY: &str = "T2 ax";

/// Reads one named 3-D array from an `.npz` archive as `f32`.
#[derive(Debug, Clone)]
pub struct NpzDecoder {
    key: String,
}

impl Default for NpzDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_ARRAY_KEY)
    }
}

impl NpzDecoder {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Archive member for `key`, with or without the `.npy` suffix.
fn entry_name(names: &[String], key: &str) -> Option<String> {
    let suffixed = format!("{key}.npy");
    names
        .iter()
        .find(|n| n.as_str() == key || n.as_str() == suffixed)
        .cloned()
}

fn read_as_f32<R: Read + Seek>(
    npz: &mut NpzReader<R>,
    name: &str,
) -> std::result::Result<Array3<f32>, ReadNpzError> {
    let first = match npz.by_name::<OwnedRepr<f32>, Ix3>(name) {
        Ok(arr) => return Ok(arr),
        Err(e) => e,
    };
    if let Ok(arr) = npz.by_name::<OwnedRepr<f64>, Ix3>(name) {
        return Ok(arr.mapv(|v| v as f32));
    }
    if let Ok(arr) = npz.by_name::<OwnedRepr<i16>, Ix3>(name) {
        return Ok(arr.mapv(f32::from));
    }
    if let Ok(arr) = npz.by_name::<OwnedRepr<u16>, Ix3>(name) {
        return Ok(arr.mapv(f32::from));
    }
    if let Ok(arr) = npz.by_name::<OwnedRepr<i32>, Ix3>(name) {
        return Ok(arr.mapv(|v| v as f32));
    }
    if let Ok(arr) = npz.by_name::<OwnedRepr<u8>, Ix3>(name) {
        return Ok(arr.mapv(f32::from));
    }
    Err(first)
}

impl ArrayDecoder for NpzDecoder {
    fn decode_array(&self, path: &Path) -> Result<Array3<f32>> {
        let file = File::open(path).map_err(|e| Error::decode(path, e))?;
        let mut npz = NpzReader::new(BufReader::new(file)).map_err(|e| Error::decode(path, e))?;
        let names = npz.names().map_err(|e| Error::decode(path, e))?;
        let name = entry_name(&names, &self.key).ok_or_else(|| {
            Error::decode(path, format!("no array named '{}' (found {names:?})", self.key))
        })?;
        read_as_f32(&mut npz, &name).map_err(|e| Error::decode(path, e))
    }
}
