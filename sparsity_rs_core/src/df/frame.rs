use super::{csr::CsrMatrix, index::Index};
use crate::toolkit::array::AFloat;

mod indexing;
mod meta;
mod ops;

pub use ops::{Axis, GroupKey};

/// A single-partition sparse table.
///
/// `data` has `n + 1` rows for `n` labels in `index`: the last row is always empty and is
/// never exposed. Alignment code gathers that row wherever a label has no match.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseFrame<T: AFloat = f64> {
    index: Index,
    columns: Index,
    data: CsrMatrix<T>,
}
