//! `NIfTI` header parsing.
//!
//! Reads the subset of NIfTI-1 (348-byte) and NIfTI-2 (540-byte) headers
//! needed to locate and scale voxel data, with version and endianness
//! detected from `sizeof_hdr`.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// NIfTI format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NiftiVersion {
    #[default]
    Nifti1,
    Nifti2,
}

impl NiftiVersion {
    /// Header size in bytes for this version.
    pub const fn header_size(self) -> usize {
        match self {
            Self::Nifti1 => 348,
            Self::Nifti2 => 540,
        }
    }
}

mod offsets_v1 {
    pub const DIM: usize = 40;
    pub const DATATYPE: usize = 70;
    pub const BITPIX: usize = 72;
    pub const VOX_OFFSET: usize = 108;
    pub const SCL_SLOPE: usize = 112;
    pub const SCL_INTER: usize = 116;
    pub const MAGIC: usize = 344;
}

mod offsets_v2 {
    pub const MAGIC: usize = 4;
    pub const DATATYPE: usize = 12;
    pub const BITPIX: usize = 14;
    pub const DIM: usize = 16;
    pub const VOX_OFFSET: usize = 168;
    pub const SCL_SLOPE: usize = 176;
    pub const SCL_INTER: usize = 184;
}

/// `NIfTI` data type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum DataType {
    UInt8 = 2,
    Int16 = 4,
    Int32 = 8,
    Float32 = 16,
    Float64 = 64,
    Int8 = 256,
    UInt16 = 512,
    UInt32 = 768,
    Int64 = 1024,
    UInt64 = 1280,
    Float16 = 16384,
    BFloat16 = 16385,
}

impl DataType {
    /// Parse from `NIfTI` datatype code.
    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            2 => Ok(Self::UInt8),
            4 => Ok(Self::Int16),
            8 => Ok(Self::Int32),
            16 => Ok(Self::Float32),
            64 => Ok(Self::Float64),
            256 => Ok(Self::Int8),
            512 => Ok(Self::UInt16),
            768 => Ok(Self::UInt32),
            1024 => Ok(Self::Int64),
            1280 => Ok(Self::UInt64),
            16384 => Ok(Self::Float16),
            16385 => Ok(Self::BFloat16),
            _ => Err(Error::UnsupportedDataType(code)),
        }
    }

    /// Size of each element in bytes.
    pub const fn byte_size(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::Int16 | Self::UInt16 | Self::Float16 | Self::BFloat16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }
}

/// Header fields that locate, shape and scale the voxel block.
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
    pub version: NiftiVersion,
    /// Number of dimensions (1-7).
    pub ndim: u8,
    /// Size along each dimension; entries past `ndim` are ignored.
    pub dim: [i64; 7],
    pub datatype: DataType,
    /// Byte offset of the voxel block.
    pub vox_offset: i64,
    /// Intensity scaling; a slope of 0 means unscaled.
    pub scl_slope: f64,
    pub scl_inter: f64,
    pub(crate) little_endian: bool,
}

impl NiftiHeader {
    /// Size of NIfTI-1 header in bytes.
    pub const SIZE: usize = 348;

    pub fn header_size(&self) -> usize {
        self.version.header_size()
    }

    /// Read header from bytes with automatic version and endianness detection.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "header too short to detect version",
            )));
        }

        let sizeof_hdr_le = LittleEndian::read_i32(&bytes[0..4]);
        let sizeof_hdr_be = BigEndian::read_i32(&bytes[0..4]);

        let (version, little_endian) = if sizeof_hdr_le == 348 {
            (NiftiVersion::Nifti1, true)
        } else if sizeof_hdr_be == 348 {
            (NiftiVersion::Nifti1, false)
        } else if sizeof_hdr_le == 540 {
            (NiftiVersion::Nifti2, true)
        } else if sizeof_hdr_be == 540 {
            (NiftiVersion::Nifti2, false)
        } else {
            return Err(Error::InvalidMagic([bytes[0], bytes[1], bytes[2], bytes[3]]));
        };

        if bytes.len() < version.header_size() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "header too short: got {} bytes, need {} for {:?}",
                    bytes.len(),
                    version.header_size(),
                    version
                ),
            )));
        }

        match (version, little_endian) {
            (NiftiVersion::Nifti1, true) => Self::parse_v1::<LittleEndian>(bytes, true),
            (NiftiVersion::Nifti1, false) => Self::parse_v1::<BigEndian>(bytes, false),
            (NiftiVersion::Nifti2, true) => Self::parse_v2::<LittleEndian>(bytes, true),
            (NiftiVersion::Nifti2, false) => Self::parse_v2::<BigEndian>(bytes, false),
        }
    }

    #[allow(clippy::wildcard_imports)]
    fn parse_v1<E: ByteOrder>(bytes: &[u8], little_endian: bool) -> Result<Self> {
        use offsets_v1::*;

        let magic = &bytes[MAGIC..MAGIC + 4];
        if magic == b"ni1\0" {
            return Err(Error::InvalidFileFormat(
                "detached header/image pairs are not supported".into(),
            ));
        }
        if magic != b"n+1\0" {
            return Err(Error::InvalidMagic([magic[0], magic[1], magic[2], magic[3]]));
        }

        let ndim = check_ndim(i64::from(E::read_i16(&bytes[DIM..DIM + 2])))?;
        let mut dim = [0i64; 7];
        for (i, d) in dim.iter_mut().enumerate() {
            let offset = DIM + 2 + i * 2;
            *d = i64::from(E::read_i16(&bytes[offset..offset + 2]));
        }

        let datatype = DataType::from_code(E::read_i16(&bytes[DATATYPE..DATATYPE + 2]))?;
        check_bitpix(E::read_i16(&bytes[BITPIX..BITPIX + 2]), datatype)?;

        let vox_offset = E::read_f32(&bytes[VOX_OFFSET..VOX_OFFSET + 4]);
        if !vox_offset.is_finite() || vox_offset.fract() != 0.0 {
            return Err(Error::InvalidDimensions(format!(
                "vox_offset must be a finite integer, got {vox_offset}"
            )));
        }

        let header = Self {
            version: NiftiVersion::Nifti1,
            ndim,
            dim,
            datatype,
            vox_offset: vox_offset as i64,
            scl_slope: f64::from(E::read_f32(&bytes[SCL_SLOPE..SCL_SLOPE + 4])),
            scl_inter: f64::from(E::read_f32(&bytes[SCL_INTER..SCL_INTER + 4])),
            little_endian,
        };
        header.validate()?;
        Ok(header)
    }

    #[allow(clippy::wildcard_imports)]
    fn parse_v2<E: ByteOrder>(bytes: &[u8], little_endian: bool) -> Result<Self> {
        use offsets_v2::*;

        let magic = &bytes[MAGIC..MAGIC + 8];
        if magic == b"ni2\0\r\n\x1a\n" {
            return Err(Error::InvalidFileFormat(
                "detached header/image pairs are not supported".into(),
            ));
        }
        if magic != b"n+2\0\r\n\x1a\n" {
            return Err(Error::InvalidMagic([magic[0], magic[1], magic[2], magic[3]]));
        }

        let ndim = check_ndim(E::read_i64(&bytes[DIM..DIM + 8]))?;
        let mut dim = [0i64; 7];
        for (i, d) in dim.iter_mut().enumerate() {
            let offset = DIM + 8 + i * 8;
            *d = E::read_i64(&bytes[offset..offset + 8]);
        }

        let datatype = DataType::from_code(E::read_i16(&bytes[DATATYPE..DATATYPE + 2]))?;
        check_bitpix(E::read_i16(&bytes[BITPIX..BITPIX + 2]), datatype)?;

        let header = Self {
            version: NiftiVersion::Nifti2,
            ndim,
            dim,
            datatype,
            vox_offset: E::read_i64(&bytes[VOX_OFFSET..VOX_OFFSET + 8]),
            scl_slope: E::read_f64(&bytes[SCL_SLOPE..SCL_SLOPE + 8]),
            scl_inter: E::read_f64(&bytes[SCL_INTER..SCL_INTER + 8]),
            little_endian,
        };
        header.validate()?;
        Ok(header)
    }

    /// Image shape, `ndim` entries in file order (fastest-varying first).
    pub fn shape(&self) -> Vec<usize> {
        self.dim[..self.ndim as usize]
            .iter()
            .map(|&d| d as usize)
            .collect()
    }

    pub fn num_voxels(&self) -> usize {
        self.shape().iter().product()
    }

    /// Total size of image data in bytes.
    pub fn data_size(&self) -> usize {
        self.num_voxels() * self.datatype.byte_size()
    }

    /// `(slope, intercept)` when the header asks for intensity scaling.
    pub fn scaling(&self) -> Option<(f64, f64)> {
        let identity = self.scl_slope == 1.0 && self.scl_inter == 0.0;
        if self.scl_slope == 0.0 || !self.scl_slope.is_finite() || identity {
            None
        } else {
            Some((self.scl_slope, self.scl_inter))
        }
    }

    /// Validate dimensions and data offset.
    pub fn validate(&self) -> Result<()> {
        let mut voxels: usize = 1;
        for (i, &d) in self.dim[..self.ndim as usize].iter().enumerate() {
            if d <= 0 {
                return Err(Error::InvalidDimensions(format!(
                    "dimension {i} must be positive, got {d}"
                )));
            }
            voxels = voxels
                .checked_mul(d as usize)
                .ok_or_else(|| Error::InvalidDimensions("dimension product overflow".into()))?;
        }
        voxels
            .checked_mul(self.datatype.byte_size())
            .ok_or_else(|| Error::InvalidDimensions("data size overflow".into()))?;

        let min_offset = self.header_size() as i64;
        if self.vox_offset < min_offset {
            return Err(Error::InvalidDimensions(format!(
                "vox_offset {} before header end ({})",
                self.vox_offset, min_offset
            )));
        }
        Ok(())
    }
}

fn check_ndim(raw: i64) -> Result<u8> {
    if (1..=7).contains(&raw) {
        Ok(raw as u8)
    } else {
        Err(Error::InvalidDimensions(format!("ndim must be 1..=7, got {raw}")))
    }
}

fn check_bitpix(bitpix: i16, datatype: DataType) -> Result<()> {
    let expected = (datatype.byte_size() * 8) as i16;
    if bitpix == expected {
        Ok(())
    } else {
        Err(Error::InvalidDimensions(format!(
            "bitpix {bitpix} does not match datatype {datatype:?} (expected {expected})"
        )))
    }
}

/// Minimal little-endian NIfTI-1 header bytes (352 with padding) for tests.
#[cfg(test)]
pub(crate) fn test_header_v1(shape: &[i16], datatype: DataType) -> Vec<u8> {
    use offsets_v1::*;
    let mut bytes = vec![0u8; 352];
    LittleEndian::write_i32(&mut bytes[0..4], 348);
    LittleEndian::write_i16(&mut bytes[DIM..DIM + 2], shape.len() as i16);
    for (i, &d) in shape.iter().enumerate() {
        let offset = DIM + 2 + i * 2;
        LittleEndian::write_i16(&mut bytes[offset..offset + 2], d);
    }
    LittleEndian::write_i16(&mut bytes[DATATYPE..DATATYPE + 2], datatype as i16);
    LittleEndian::write_i16(&mut bytes[BITPIX..BITPIX + 2], (datatype.byte_size() * 8) as i16);
    LittleEndian::write_f32(&mut bytes[VOX_OFFSET..VOX_OFFSET + 4], 352.0);
    LittleEndian::write_f32(&mut bytes[SCL_SLOPE..SCL_SLOPE + 4], 1.0);
    bytes[MAGIC..MAGIC + 4].copy_from_slice(b"n+1\0");
    bytes
}
