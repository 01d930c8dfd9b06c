//! Zero padding of in-plane dimensions to a square.

use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3};

/// `(leading, trailing)` padding for one axis of length `len` grown to `target`.
///
/// The larger half goes first: a difference of 55 pads 28 before and 27 after.
pub const fn split_padding(len: usize, target: usize) -> (usize, usize) {
    let diff = target.saturating_sub(len);
    (diff.div_ceil(2), diff / 2)
}

/// Per-axis padding that makes a `rows x cols` plane square.
pub fn square_padding(rows: usize, cols: usize) -> [(usize, usize); 2] {
    let side = rows.max(cols);
    [split_padding(rows, side), split_padding(cols, side)]
}

/// Pad a 2-D slice with zeros so both sides equal the longer one.
pub fn pad_to_square(slice: ArrayView2<'_, f32>) -> Array2<f32> {
    let (rows, cols) = slice.dim();
    if rows == cols {
        return slice.to_owned();
    }
    let [(top, _), (left, _)] = square_padding(rows, cols);
    let side = rows.max(cols);
    let mut out = Array2::<f32>::zeros((side, side));
    out.slice_mut(s![top..top + rows, left..left + cols])
        .assign(&slice);
    out
}

/// Pad the first two axes of a `(rows, cols, slices)` stack to a square.
pub fn pad_stack_to_square(stack: ArrayView3<'_, f32>) -> Array3<f32> {
    let (rows, cols, depth) = stack.dim();
    if rows == cols {
        return stack.to_owned();
    }
    let [(top, _), (left, _)] = square_padding(rows, cols);
    let side = rows.max(cols);
    let mut out = Array3::<f32>::zeros((side, side, depth));
    out.slice_mut(s![top..top + rows, left..left + cols, ..])
        .assign(&stack);
    out
}
