//! Axis reordering and quarter-turn rotation.

use ndarray::{Array, Array3, Axis, Dimension};

use crate::error::{Error, Result};

/// Move the slice axis first: `(rows, cols, slices)` → `(slices, rows, cols)`.
pub fn slices_first(stack: Array3<f32>) -> Array3<f32> {
    stack
        .permuted_axes([2, 0, 1])
        .as_standard_layout()
        .into_owned()
}

/// Rotate by `k` quarter turns in the plane of `axes`.
///
/// One turn flips `axes.1` and then swaps the two axes, so
/// `rotate_90(img, (2, 1), 1)` maps `out[d, i, j] = img[d, n - 1 - j, i]`.
pub fn rotate_90<D: Dimension>(
    array: &Array<f32, D>,
    axes: (usize, usize),
    k: usize,
) -> Result<Array<f32, D>> {
    let ndim = array.ndim();
    if axes.0 >= ndim || axes.1 >= ndim {
        return Err(Error::InvalidDimensions(format!(
            "rotation axes ({}, {}) out of bounds for {}D array",
            axes.0, axes.1, ndim
        )));
    }
    if axes.0 == axes.1 {
        return Err(Error::InvalidDimensions(
            "rotation axes must be different".into(),
        ));
    }

    let mut view = array.view();
    for _ in 0..k % 4 {
        view.invert_axis(Axis(axes.1));
        view.swap_axes(axes.0, axes.1);
    }
    Ok(view.as_standard_layout().into_owned())
}

/// The orientation fix applied to clinical stacks (`rot90` over axes `(2, 1)`).
pub fn rotate_slices(stack: &Array3<f32>) -> Result<Array3<f32>> {
    rotate_90(stack, (2, 1), 1)
}
