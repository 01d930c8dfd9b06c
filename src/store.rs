//! Output persistence: tensor files, slice manifests and extent records.
//!
//! ```text
//! <output>/data/autoencode/{train,valid}/0000.npz
//! <output>/data/classifier/{train,valid,test}/0000.npz
//! <output>/meta/{ae,clf}_{split}.csv
//! <output>/meta/{ae,clf}_meta.json
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use ndarray::Array3;
use ndarray_npy::NpzWriter;
use tracing::debug;

use crate::config::CorpusKind;
use crate::error::{Error, Result};
use crate::extent::ExtentRecord;
use crate::io::TensorStore;
use crate::split::SplitName;

/// Entry name of the stored tensor inside each `.npz`.
pub const TENSOR_ENTRY: &str = "data";

/// Resolves every output path of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// `.` components are dropped, so the default root `.` gives manifest
    /// paths like `data/autoencode/train/0000.npz`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root
            .into()
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tensor_dir(&self, corpus: CorpusKind, split: SplitName) -> PathBuf {
        self.root
            .join("data")
            .join(corpus.data_dir())
            .join(split.as_str())
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.root.join("meta")
    }

    pub fn manifest_path(&self, corpus: CorpusKind, split: SplitName) -> PathBuf {
        self.meta_dir()
            .join(format!("{}_{}.csv", corpus.meta_prefix(), split.as_str()))
    }

    pub fn extent_path(&self, corpus: CorpusKind) -> PathBuf {
        self.meta_dir()
            .join(format!("{}_meta.json", corpus.meta_prefix()))
    }

    /// Create the tensor directories for `splits` and the meta directory.
    pub fn create(&self, corpus: CorpusKind, splits: &[SplitName]) -> Result<()> {
        fs::create_dir_all(self.meta_dir())?;
        for &split in splits {
            let dir = self.tensor_dir(corpus, split);
            fs::create_dir_all(&dir)?;
            debug!(dir = %dir.display(), "created output directory");
        }
        Ok(())
    }
}

/// [`TensorStore`] writing one compressed `.npz` per item, named `{index:04}.npz`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NpzTensorStore;

impl NpzTensorStore {
    pub fn file_name(index: usize) -> String {
        format!("{index:04}.npz")
    }
}

impl TensorStore for NpzTensorStore {
    fn store(&mut self, dir: &Path, index: usize, tensor: &Array3<f32>) -> Result<PathBuf> {
        let path = dir.join(Self::file_name(index));
        let encode_err = |e: ndarray_npy::WriteNpzError| {
            Error::Io(std::io::Error::other(format!(
                "failed to write {}: {e}",
                path.display()
            )))
        };
        let mut npz = NpzWriter::new_compressed(BufWriter::new(File::create(&path)?));
        npz.add_array(TENSOR_ENTRY, tensor).map_err(encode_err)?;
        let mut inner = npz.finish().map_err(encode_err)?;
        inner.flush()?;
        Ok(path)
    }
}

/// CSV manifest with one row per stored slice.
///
/// Columns are `filepath,plane` or, with a class column, `filepath,plane,class`.
pub struct ManifestWriter<W: Write> {
    writer: csv::Writer<W>,
    with_class: bool,
    rows: usize,
}

impl ManifestWriter<File> {
    pub fn create<P: AsRef<Path>>(path: P, with_class: bool) -> Result<Self> {
        Self::from_writer(File::create(path.as_ref())?, with_class)
    }
}

impl<W: Write> ManifestWriter<W> {
    pub fn from_writer(inner: W, with_class: bool) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        if with_class {
            writer.write_record(["filepath", "plane", "class"])?;
        } else {
            writer.write_record(["filepath", "plane"])?;
        }
        Ok(Self {
            writer,
            with_class,
            rows: 0,
        })
    }

    /// Add rows `0..slices` for the tensor at `tensor_path`.
    pub fn append(&mut self, tensor_path: &Path, slices: usize, label: u32) -> Result<()> {
        let path = tensor_path.display().to_string();
        let label = label.to_string();
        for plane in 0..slices {
            let plane = plane.to_string();
            if self.with_class {
                self.writer.write_record([path.as_str(), plane.as_str(), label.as_str()])?;
            } else {
                self.writer.write_record([path.as_str(), plane.as_str()])?;
            }
        }
        self.rows += slices;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and return the inner writer.
    pub fn finish(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
    }
}

/// Write `{"min": .., "max": ..}` to `path`.
pub fn write_extent<P: AsRef<Path>>(path: P, record: &ExtentRecord) -> Result<()> {
    let file = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(file, record)?;
    Ok(())
}

pub fn read_extent<P: AsRef<Path>>(path: P) -> Result<ExtentRecord> {
    let text = fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ArrayDecoder;
    use crate::npz::NpzDecoder;

    #[test]
    fn test_layout_paths() {
        let layout = OutputLayout::new("/out");
        assert_eq!(
            layout.tensor_dir(CorpusKind::Autoencoder, SplitName::Valid),
            PathBuf::from("/out/data/autoencode/valid")
        );
        assert_eq!(
            layout.manifest_path(CorpusKind::Classifier, SplitName::Test),
            PathBuf::from("/out/meta/clf_test.csv")
        );
        assert_eq!(
            layout.extent_path(CorpusKind::Autoencoder),
            PathBuf::from("/out/meta/ae_meta.json")
        );
    }

    #[test]
    fn test_current_dir_root_gives_relative_paths() {
        let layout = OutputLayout::new(".");
        assert_eq!(
            layout.tensor_dir(CorpusKind::Autoencoder, SplitName::Train),
            PathBuf::from("data/autoencode/train")
        );
        assert_eq!(layout.meta_dir(), PathBuf::from("meta"));
        assert_eq!(
            OutputLayout::new("./out").manifest_path(CorpusKind::Classifier, SplitName::Valid),
            PathBuf::from("out/meta/clf_valid.csv")
        );

        let tensor = NpzTensorStore::file_name(0);
        let mut m = ManifestWriter::from_writer(Vec::new(), false).unwrap();
        m.append(&layout.tensor_dir(CorpusKind::Autoencoder, SplitName::Train).join(tensor), 1, 1)
            .unwrap();
        let text = String::from_utf8(m.finish().unwrap()).unwrap();
        assert_eq!(text, "filepath,plane\ndata/autoencode/train/0000.npz,0\n");
    }

    #[test]
    fn test_npz_store_readable() {
        let dir = tempfile::tempdir().unwrap();
        let tensor = Array3::from_shape_fn((2, 3, 3), |(d, r, c)| (d * 9 + r * 3 + c) as f32);
        let path = NpzTensorStore.store(dir.path(), 7, &tensor).unwrap();
        assert_eq!(path.file_name().unwrap(), "0007.npz");
        let back = NpzDecoder::new(TENSOR_ENTRY).decode_array(&path).unwrap();
        assert_eq!(back, tensor);
    }

    #[test]
    fn test_manifest_rows() {
        let mut m = ManifestWriter::from_writer(Vec::new(), true).unwrap();
        m.append(Path::new("data/classifier/train/0000.npz"), 2, 4).unwrap();
        assert_eq!(m.rows(), 2);
        let text = String::from_utf8(m.finish().unwrap()).unwrap();
        assert_eq!(
            text,
            "filepath,plane,class\n\
             data/classifier/train/0000.npz,0,4\n\
             data/classifier/train/0000.npz,1,4\n"
        );

        let mut m = ManifestWriter::from_writer(Vec::new(), false).unwrap();
        m.append(Path::new("a.npz"), 1, 2).unwrap();
        let text = String::from_utf8(m.finish().unwrap()).unwrap();
        assert_eq!(text, "filepath,plane\na.npz,0\n");
    }

    #[test]
    fn test_extent_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        layout.create(CorpusKind::Autoencoder, &[SplitName::Train]).unwrap();
        assert!(layout.tensor_dir(CorpusKind::Autoencoder, SplitName::Train).is_dir());

        let record = ExtentRecord { min: -3.25, max: 9.5 };
        let path = layout.extent_path(CorpusKind::Autoencoder);
        write_extent(&path, &record).unwrap();
        assert_eq!(read_extent(&path).unwrap(), record);
    }
}
