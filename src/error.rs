//! Error types for medprep.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while assembling or normalizing a dataset.
#[derive(Debug, Error)]
pub enum Error {
    /// A metadata field required by a predicate or template is not a column of the table.
    #[error("schema error: {table} has no column '{field}'")]
    Schema {
        /// Column that was looked up.
        field: String,
        /// Human-readable table identifier (usually the file path).
        table: String,
    },

    /// A label class is too small to be represented in every partition.
    #[error("stratification failed: {0}")]
    Stratification(String),

    /// Z-score normalization is undefined for this item.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// The extent tracker was finalized without observing any tensor.
    #[error("no tensors observed; extent is undefined")]
    EmptyExtent,

    /// Array shape does not fit the requested operation.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// NIfTI header did not carry a recognised size or magic.
    #[error("invalid NIfTI magic bytes {0:?}")]
    InvalidMagic([u8; 4]),

    /// NIfTI datatype code outside the supported set.
    #[error("unsupported data type code {0}")]
    UnsupportedDataType(i16),

    /// File contents do not match the expected container format.
    #[error("invalid file format: {0}")]
    InvalidFileFormat(String),

    /// Gzip stream could not be inflated.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// A decoder collaborator (npz, DICOM) rejected the file.
    #[error("failed to decode {path}: {message}")]
    Decode {
        /// File being decoded.
        path: String,
        /// Decoder message.
        message: String,
    },

    /// Invalid run or cohort configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata or manifest CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Extent record serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run configuration parse error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn decode(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}
