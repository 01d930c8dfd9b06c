//! Single-slice DICOM decoding.

use std::path::Path;

use dicom_object::open_file;
use dicom_pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use ndarray::Array2;

use crate::error::{Error, Result};
use crate::io::SeriesDecoder;

/// Decodes the first frame of a grayscale DICOM file to `(rows, cols)`.
///
/// Values are the stored pixel values; RescaleSlope/Intercept are not applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomDecoder;

impl SeriesDecoder for DicomDecoder {
    fn decode_slice(&self, path: &Path) -> Result<Array2<f32>> {
        let obj = open_file(path).map_err(|e| Error::decode(path, e))?;
        let pixels = obj.decode_pixel_data().map_err(|e| Error::decode(path, e))?;

        let samples = pixels.samples_per_pixel();
        if samples != 1 {
            return Err(Error::decode(
                path,
                format!("expected grayscale pixels, found {samples} samples per pixel"),
            ));
        }

        let rows = pixels.rows() as usize;
        let cols = pixels.columns() as usize;
        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
        let mut values: Vec<f32> = pixels
            .to_vec_with_options(&options)
            .map_err(|e| Error::decode(path, e))?;
        if values.len() < rows * cols {
            return Err(Error::decode(
                path,
                format!("{} pixel values for a {rows}x{cols} frame", values.len()),
            ));
        }
        values.truncate(rows * cols);
        Array2::from_shape_vec((rows, cols), values).map_err(|e| Error::decode(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::{DataElement, PrimitiveValue, VR};
    use dicom_dictionary_std::{tags, uids};
    use dicom_object::{FileMetaTableBuilder, InMemDicomObject};

    /// Unsigned 16-bit MONOCHROME2 slice with a modality rescale.
    fn write_slice(path: &Path, rows: u16, cols: u16, values: &[u16], slope: &str, intercept: &str) {
        let mut obj = InMemDicomObject::new_empty();
        let us = |tag, v: u16| DataElement::new(tag, VR::US, PrimitiveValue::from(v));
        obj.put(DataElement::new(tags::SOP_CLASS_UID, VR::UI, PrimitiveValue::from(uids::MR_IMAGE_STORAGE)));
        obj.put(DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from("1.2.826.0.1.3680043.2.1")));
        obj.put(DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("MR")));
        obj.put(us(tags::SAMPLES_PER_PIXEL, 1));
        obj.put(DataElement::new(
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            PrimitiveValue::from("MONOCHROME2"),
        ));
        obj.put(us(tags::ROWS, rows));
        obj.put(us(tags::COLUMNS, cols));
        obj.put(us(tags::BITS_ALLOCATED, 16));
        obj.put(us(tags::BITS_STORED, 16));
        obj.put(us(tags::HIGH_BIT, 15));
        obj.put(us(tags::PIXEL_REPRESENTATION, 0));
        obj.put(DataElement::new(tags::RESCALE_SLOPE, VR::DS, PrimitiveValue::from(slope)));
        obj.put(DataElement::new(tags::RESCALE_INTERCEPT, VR::DS, PrimitiveValue::from(intercept)));
        obj.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::U16(values.iter().copied().collect()),
        ));

        let file = obj
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                    .media_storage_sop_class_uid(uids::MR_IMAGE_STORAGE)
                    .media_storage_sop_instance_uid("1.2.826.0.1.3680043.2.1"),
            )
            .unwrap();
        file.write_to_file(path).unwrap();
    }

    #[test]
    fn test_decodes_stored_values_without_rescale() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("slice.dcm");
        let values: Vec<u16> = (0..6).map(|v| v * 100 + 7).collect();
        write_slice(&p, 2, 3, &values, "2", "-1024");

        let slice = DicomDecoder.decode_slice(&p).unwrap();
        assert_eq!(slice.dim(), (2, 3));
        assert_eq!(slice[[0, 0]], 7.0);
        assert_eq!(slice[[1, 2]], 507.0);
        let expected: Vec<f32> = values.iter().map(|&v| f32::from(v)).collect();
        assert_eq!(slice.iter().copied().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_non_dicom_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("slice.dcm");
        std::fs::write(&p, b"not a dicom file").unwrap();
        assert!(matches!(
            DicomDecoder.decode_slice(&p),
            Err(Error::Decode { .. })
        ));
        assert!(matches!(
            DicomDecoder.decode_slice(&dir.path().join("absent.dcm")),
            Err(Error::Decode { .. })
        ));
    }
}
