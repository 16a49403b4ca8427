//! Binary persistence of [`SparseFrame`](super::frame::SparseFrame)s.
//!
//! Layout (all integers little-endian):
//! - row index, column index: `kind: u8` (0 flat, 1 multi), then for multi the level count and
//!   names, then every level as `len: u64` followed by its labels;
//! - `nrows: u64`, `ncols: u64`, `nnz: u64`, `indptr`, `indices` as `u64`, `data` as `f64`.
//!
//! The trailing empty row is not stored; it is re-created on load.

pub(crate) mod codec;
mod fs;
