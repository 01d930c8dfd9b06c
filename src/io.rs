//! Collaborator interfaces consumed by the pipeline.
//!
//! Decoders turn files into arrays, the lister enumerates source directories
//! and the tensor store persists normalized items. Default implementations
//! live in [`crate::nifti`], [`crate::npz`], [`crate::dicom`] and
//! [`crate::store`]; tests substitute in-memory versions.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array2, Array3, ArrayD};

use crate::error::Result;

/// Decodes a volumetric image to an array in logical index order
/// (`x, y, z[, channel]`).
pub trait VolumeDecoder: Send + Sync {
    fn decode_volume(&self, path: &Path) -> Result<ArrayD<f32>>;
}

/// Decodes a compressed single-array file to `(rows, cols, slices)`.
pub trait ArrayDecoder: Send + Sync {
    fn decode_array(&self, path: &Path) -> Result<Array3<f32>>;
}

/// Decodes one single-slice series file to `(rows, cols)`.
pub trait SeriesDecoder: Send + Sync {
    fn decode_slice(&self, path: &Path) -> Result<Array2<f32>>;
}

/// Non-recursive listing of the filenames in a directory.
///
/// Hidden entries are returned; filtering them is the caller's job.
pub trait DirectoryLister {
    fn list_files(&self, dir: &Path) -> Result<BTreeSet<String>>;
}

/// Persists one normalized tensor and returns the path it was written to.
pub trait TensorStore {
    fn store(&mut self, dir: &Path, index: usize, tensor: &Array3<f32>) -> Result<PathBuf>;
}

/// [`DirectoryLister`] over the local filesystem.
///
/// Symlinks are followed: a link to a regular file is listed, a dangling
/// link or a link to a directory is not.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLister;

impl DirectoryLister for FsLister {
    fn list_files(&self, dir: &Path) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.insert(name.to_string());
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_lister_is_flat_and_keeps_hidden() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.npz"), b"").unwrap();
        fs::write(dir.path().join(".DS_Store"), b"").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("b.npz"), b"").unwrap();

        let names = FsLister.list_files(dir.path()).unwrap();
        let expected: BTreeSet<String> = ["a.npz", ".DS_Store"].iter().map(|s| s.to_string()).collect();
        assert_eq!(names, expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_fs_lister_follows_symlinks() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        let normal = dir.path().join("Normal");
        fs::create_dir(&real).unwrap();
        fs::create_dir(&normal).unwrap();
        fs::write(real.join("N01.npz"), b"").unwrap();
        symlink(real.join("N01.npz"), normal.join("N01.npz")).unwrap();
        symlink(real.join("absent.npz"), normal.join("N02.npz")).unwrap();
        symlink(&real, normal.join("linked_dir")).unwrap();

        let names = FsLister.list_files(&normal).unwrap();
        let expected: BTreeSet<String> = ["N01.npz".to_string()].into_iter().collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_fs_lister_missing_dir_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FsLister.list_files(&dir.path().join("absent")).is_err());
    }
}
