//! `NIfTI` volume loading.
//!
//! `.nii` files are memory-mapped; `.nii.gz` files are read with a
//! sequential read-ahead hint and inflated in one streaming pass.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::bufread::MultiGzDecoder;
use half::{bf16, f16};
use memmap2::Mmap;
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use tracing::trace;

use super::header::{DataType, NiftiHeader};
use crate::error::{Error, Result};
use crate::io::VolumeDecoder;

const GZIP_BUFFER_SIZE: usize = 256 * 1024;

#[cfg(target_os = "linux")]
fn read_file_with_readahead(path: &Path) -> Result<Vec<u8>> {
    use std::os::unix::io::AsRawFd;

    let file = File::open(path)?;
    let len = file.metadata()?.len() as usize;

    // Sequential access hint; failure only loses the hint.
    unsafe {
        libc::posix_fadvise(
            file.as_raw_fd(),
            0,
            len as libc::off_t,
            libc::POSIX_FADV_SEQUENTIAL,
        );
    }

    let mut buffer = Vec::with_capacity(len);
    let mut reader = BufReader::with_capacity(GZIP_BUFFER_SIZE, file);
    reader.read_to_end(&mut buffer)?;
    Ok(buffer)
}

#[cfg(not(target_os = "linux"))]
fn read_file_with_readahead(path: &Path) -> Result<Vec<u8>> {
    Ok(std::fs::read(path)?)
}

/// ISIZE trailer per RFC 1952; only a capacity hint.
fn estimate_gzip_uncompressed_size(compressed: &[u8]) -> usize {
    if compressed.len() >= 4 {
        let trailer = &compressed[compressed.len() - 4..];
        u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]) as usize
    } else {
        compressed.len() * 4
    }
}

fn decompress_gzip(compressed: &[u8]) -> Result<Vec<u8>> {
    let cursor = std::io::Cursor::new(compressed);
    let mut decoder = MultiGzDecoder::new(BufReader::with_capacity(GZIP_BUFFER_SIZE, cursor));
    let mut output = Vec::with_capacity(estimate_gzip_uncompressed_size(compressed));
    decoder
        .read_to_end(&mut output)
        .map_err(|e| Error::Decompression(format!("gzip stream decode failed: {e}")))?;
    Ok(output)
}

fn convert<E: ByteOrder>(raw: &[u8], datatype: DataType) -> Vec<f32> {
    let step = datatype.byte_size();
    let chunks = raw.chunks_exact(step);
    match datatype {
        DataType::UInt8 => raw.iter().map(|&v| f32::from(v)).collect(),
        DataType::Int8 => raw.iter().map(|&v| f32::from(v as i8)).collect(),
        DataType::Int16 => chunks.map(|c| f32::from(E::read_i16(c))).collect(),
        DataType::UInt16 => chunks.map(|c| f32::from(E::read_u16(c))).collect(),
        DataType::Int32 => chunks.map(|c| E::read_i32(c) as f32).collect(),
        DataType::UInt32 => chunks.map(|c| E::read_u32(c) as f32).collect(),
        DataType::Int64 => chunks.map(|c| E::read_i64(c) as f32).collect(),
        DataType::UInt64 => chunks.map(|c| E::read_u64(c) as f32).collect(),
        DataType::Float16 => chunks
            .map(|c| f16::from_bits(E::read_u16(c)).to_f32())
            .collect(),
        DataType::BFloat16 => chunks
            .map(|c| bf16::from_bits(E::read_u16(c)).to_f32())
            .collect(),
        DataType::Float32 => chunks.map(E::read_f32).collect(),
        DataType::Float64 => chunks.map(|c| E::read_f64(c) as f32).collect(),
    }
}

/// Turn a complete in-memory `NIfTI` file into a scaled f32 array in
/// logical `(x, y, z, ...)` index order.
pub fn decode_bytes(bytes: &[u8]) -> Result<ArrayD<f32>> {
    let header = NiftiHeader::from_bytes(bytes)?;
    let offset = header.vox_offset as usize;
    let data_size = header.data_size();
    if bytes.len() < offset + data_size {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!(
                "file truncated: {} bytes, need {} (offset {offset} + data {data_size})",
                bytes.len(),
                offset + data_size
            ),
        )));
    }

    let raw = &bytes[offset..offset + data_size];
    let mut values = if header.little_endian {
        convert::<LittleEndian>(raw, header.datatype)
    } else {
        convert::<BigEndian>(raw, header.datatype)
    };
    if let Some((slope, inter)) = header.scaling() {
        for v in &mut values {
            *v = (f64::from(*v) * slope + inter) as f32;
        }
    }

    // NIfTI stores the first axis fastest.
    let shape = header.shape();
    ArrayD::from_shape_vec(IxDyn(&shape).f(), values)
        .map_err(|e| Error::InvalidDimensions(e.to_string()))
}

/// Load a `.nii` or `.nii.gz` file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<ArrayD<f32>> {
    let path = path.as_ref();
    let is_gzipped = path.extension().is_some_and(|e| e == "gz");
    trace!(path = %path.display(), gz = is_gzipped, "loading NIfTI");

    if is_gzipped {
        let compressed = read_file_with_readahead(path)?;
        decode_bytes(&decompress_gzip(&compressed)?)
    } else {
        let file = File::open(path)?;
        // SAFETY: read-only mapping of a file we just opened; external
        // modification can only yield inconsistent values.
        let mmap = unsafe { Mmap::map(&file)? };
        decode_bytes(&mmap)
    }
}

/// [`VolumeDecoder`] for `NIfTI` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiDecoder;

impl VolumeDecoder for NiftiDecoder {
    fn decode_volume(&self, path: &Path) -> Result<ArrayD<f32>> {
        load(path).map_err(|e| match e {
            Error::Io(_) | Error::Decompression(_) => Error::decode(path, e),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nifti::header::test_header_v1;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn float_volume(shape: &[i16]) -> (Vec<u8>, Vec<f32>) {
        let mut bytes = test_header_v1(shape, DataType::Float32);
        let n: usize = shape.iter().map(|&d| d as usize).product();
        let values: Vec<f32> = (0..n).map(|i| i as f32).collect();
        for v in &values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        (bytes, values)
    }

    #[test]
    fn test_decode_fortran_order() {
        let (bytes, _) = float_volume(&[2, 3, 4]);
        let arr = decode_bytes(&bytes).unwrap();
        assert_eq!(arr.shape(), &[2, 3, 4]);
        // linear index = x + 2*y + 6*z
        assert_eq!(arr[[1, 2, 3]], (1 + 2 * 2 + 6 * 3) as f32);
        assert_eq!(arr[[1, 0, 0]], 1.0);
    }

    #[test]
    fn test_decode_int16_with_scaling() {
        let mut bytes = test_header_v1(&[2, 2], DataType::Int16);
        LittleEndian::write_f32(&mut bytes[112..116], 0.5);
        LittleEndian::write_f32(&mut bytes[116..120], 10.0);
        for v in [-4i16, 0, 2, 8] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let arr = decode_bytes(&bytes).unwrap();
        assert_eq!(arr[[0, 0]], 8.0);
        assert_eq!(arr[[1, 1]], 14.0);
    }

    #[test]
    fn test_decode_f16() {
        let mut bytes = test_header_v1(&[2], DataType::Float16);
        for v in [1.5f32, -2.0] {
            bytes.extend_from_slice(&f16::from_f32(v).to_bits().to_le_bytes());
        }
        let arr = decode_bytes(&bytes).unwrap();
        assert_eq!(arr.as_slice_memory_order().unwrap(), &[1.5, -2.0]);
    }

    #[test]
    fn test_truncated_file() {
        let (mut bytes, _) = float_volume(&[4, 4]);
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(decode_bytes(&bytes), Err(Error::Io(_))));
    }

    #[test]
    fn test_load_plain_and_gzip_agree() {
        let dir = tempfile::tempdir().unwrap();
        let (bytes, _) = float_volume(&[3, 3, 2]);

        let plain = dir.path().join("vol.nii");
        std::fs::write(&plain, &bytes).unwrap();

        let gz = dir.path().join("vol.nii.gz");
        let mut enc = GzEncoder::new(File::create(&gz).unwrap(), Compression::fast());
        enc.write_all(&bytes).unwrap();
        enc.finish().unwrap();

        let a = NiftiDecoder.decode_volume(&plain).unwrap();
        let b = NiftiDecoder.decode_volume(&gz).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = NiftiDecoder
            .decode_volume(&dir.path().join("absent.nii.gz"))
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }
}
