//! Per-tensor intensity standardisation.

use ndarray::Array3;

use crate::error::{Error, Result};

/// Population mean and standard deviation, accumulated in f64.
pub fn moments(tensor: &Array3<f32>) -> Option<(f64, f64)> {
    let n = tensor.len();
    if n == 0 {
        return None;
    }
    let mean = tensor.iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64;
    let var = tensor
        .iter()
        .map(|&v| (f64::from(v) - mean).powi(2))
        .sum::<f64>()
        / n as f64;
    Some((mean, var.sqrt()))
}

/// Standardise to zero mean and unit (population) standard deviation.
///
/// Constant, empty or non-finite tensors are rejected with
/// [`Error::DegenerateInput`] instead of producing NaN.
pub fn z_score(mut tensor: Array3<f32>) -> Result<Array3<f32>> {
    let (mean, std) = moments(&tensor)
        .ok_or_else(|| Error::DegenerateInput("empty tensor".into()))?;
    if !mean.is_finite() || !std.is_finite() {
        return Err(Error::DegenerateInput(format!(
            "non-finite statistics (mean {mean}, std {std})"
        )));
    }
    if std == 0.0 {
        return Err(Error::DegenerateInput(format!(
            "zero standard deviation (constant value {mean})"
        )));
    }
    tensor.mapv_inplace(|v| ((f64::from(v) - mean) / std) as f32);
    Ok(tensor)
}
