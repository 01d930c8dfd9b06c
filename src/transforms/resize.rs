//! Range-preserving in-plane resize.
//!
//! Bilinear interpolation on pixel centers with zero outside the image, a
//! Gaussian anti-aliasing pass when an axis shrinks, and a final clip to the
//! source value range.

use ndarray::parallel::prelude::*;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};

/// Kernel half-width in standard deviations.
const GAUSSIAN_TRUNCATE: f64 = 4.0;

/// Anti-aliasing sigma for an axis shrinking by `factor = in / out`.
fn anti_alias_sigma(factor: f64) -> f64 {
    ((factor - 1.0) / 2.0).max(0.0)
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Convolve along one axis with zero boundary.
fn blur_axis(src: &Array2<f64>, axis: Axis, sigma: f64) -> Array2<f64> {
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;
    let mut out = Array2::<f64>::zeros(src.raw_dim());
    Zip::from(out.lanes_mut(axis))
        .and(src.lanes(axis))
        .for_each(|mut dst, lane| {
            let n = lane.len() as isize;
            for i in 0..n {
                let mut acc = 0.0;
                for (k, w) in kernel.iter().enumerate() {
                    let j = i + k as isize - radius;
                    if (0..n).contains(&j) {
                        acc += w * lane[j as usize];
                    }
                }
                dst[i as usize] = acc;
            }
        });
    out
}

/// Source sample positions and weights for one output axis.
///
/// Returns `(lower index, upper index, upper weight)`; indices may fall one
/// step outside `0..len`, where the image reads as zero.
fn axis_taps(len_in: usize, len_out: usize) -> Vec<(isize, isize, f64)> {
    let scale = len_in as f64 / len_out as f64;
    (0..len_out)
        .map(|o| {
            let pos = (o as f64 + 0.5) * scale - 0.5;
            let lo = pos.floor();
            (lo as isize, lo as isize + 1, pos - lo)
        })
        .collect()
}

/// Resize a 2-D slice to `shape`, keeping values within the source range.
pub fn resize_slice(slice: ArrayView2<'_, f32>, shape: (usize, usize)) -> Array2<f32> {
    let (rows, cols) = slice.dim();
    if (rows, cols) == shape {
        return slice.to_owned();
    }
    if rows == 0 || cols == 0 {
        return Array2::zeros(shape);
    }

    let (lo, hi) = slice
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    let mut work = slice.mapv(f64::from);
    let row_sigma = anti_alias_sigma(rows as f64 / shape.0 as f64);
    let col_sigma = anti_alias_sigma(cols as f64 / shape.1 as f64);
    if row_sigma > 0.0 {
        work = blur_axis(&work, Axis(0), row_sigma);
    }
    if col_sigma > 0.0 {
        work = blur_axis(&work, Axis(1), col_sigma);
    }

    let sample = |r: isize, c: isize| -> f64 {
        if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
            0.0
        } else {
            work[[r as usize, c as usize]]
        }
    };

    let row_taps = axis_taps(rows, shape.0);
    let col_taps = axis_taps(cols, shape.1);
    Array2::from_shape_fn(shape, |(o_r, o_c)| {
        let (r0, r1, wr) = row_taps[o_r];
        let (c0, c1, wc) = col_taps[o_c];
        let top = sample(r0, c0) * (1.0 - wc) + sample(r0, c1) * wc;
        let bottom = sample(r1, c0) * (1.0 - wc) + sample(r1, c1) * wc;
        let v = (top * (1.0 - wr) + bottom * wr) as f32;
        v.clamp(lo, hi)
    })
}

/// Resize the first two axes of a `(rows, cols, slices)` stack, slice by slice.
pub fn resize_stack(stack: ArrayView3<'_, f32>, shape: (usize, usize)) -> Array3<f32> {
    let depth = stack.len_of(Axis(2));
    let mut out = Array3::<f32>::zeros((shape.0, shape.1, depth));
    out.axis_iter_mut(Axis(2))
        .into_par_iter()
        .zip(stack.axis_iter(Axis(2)).into_par_iter())
        .for_each(|(mut dst, src)| dst.assign(&resize_slice(src, shape)));
    out
}
