//! Array transforms shared by every item kind.
//!
//! All functions work on `f32` arrays. Geometry helpers take and return
//! `(rows, cols, slices)` stacks; [`orient::slices_first`] moves to the
//! `(slices, rows, cols)` layout that is persisted.

pub mod intensity;
pub mod orient;
pub mod pad;
pub mod resize;

pub use intensity::z_score;
pub use orient::{rotate_90, rotate_slices, slices_first};
pub use pad::{pad_stack_to_square, pad_to_square, split_padding};
pub use resize::{resize_slice, resize_stack};
