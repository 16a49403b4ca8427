use itertools::Itertools;

use super::SparseFrame;
use crate::{
    df::{
        csr::{CooMatrix, CsrMatrix},
        index::Index,
        JoinHow, Label,
    },
    error::{Result, SparsityError},
    toolkit::array::AFloat,
};

/// The axis along which two frames are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// stack rows, aligning columns
    Rows,
    /// stack columns, aligning rows
    Columns,
}

impl TryFrom<usize> for Axis {
    type Error = SparsityError;

    fn try_from(axis: usize) -> Result<Self> {
        match axis {
            0 => Ok(Axis::Rows),
            1 => Ok(Axis::Columns),
            _ => Err(SparsityError::value(format!(
                "axis must be either 0 or 1, got {}",
                axis
            ))),
        }
    }
}

/// Where the keys of a [`SparseFrame::groupby`] come from.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupKey {
    /// the row labels (whole tuples for a multi-level index)
    Index,
    /// one level of a multi-level row index
    Level(usize),
    /// an explicit key per row
    Labels(Vec<Label>),
}

/// Align the rows of `left` and `right` on their labels.
///
/// Both returned matrices have one row per joined label; a label missing on one side reads that
/// side's trailing empty row, so it contributes zeros.
fn align_rows<T: AFloat>(
    left: &SparseFrame<T>,
    right: &SparseFrame<T>,
    how: JoinHow,
) -> Result<(CsrMatrix<T>, CsrMatrix<T>, Index)> {
    let joined = left.index.join(&right.index, how)?;
    let left_rows = left.gather(&joined.left)?;
    let right_rows = right.gather(&joined.right)?;
    Ok((left_rows, right_rows, joined.index))
}

/// One-hot membership matrix of shape `(n, ncategories)` for keys that are already sorted.
fn group_matrix<T: AFloat>(sorted_keys: &[Label]) -> Result<(CsrMatrix<T>, Vec<Label>)> {
    let mut categories: Vec<Label> = Vec::new();
    let codes: Vec<usize> = sorted_keys
        .iter()
        .map(|key| {
            if categories.last() != Some(key) {
                categories.push(key.clone());
            }
            categories.len() - 1
        })
        .collect();
    let n = sorted_keys.len();
    let coo = CooMatrix::new(
        (n, categories.len()),
        (0..n).collect(),
        codes,
        vec![T::one(); n],
    )?;
    Ok((coo.to_csr(), categories))
}

impl<T: AFloat> SparseFrame<T> {
    /// Combine two frames along `axis`.
    ///
    /// [`Axis::Rows`] stacks the rows of `other` below `self` and takes the union of columns;
    /// [`Axis::Columns`] places the columns of `other` next to `self` and takes the union of
    /// row labels. When the labels of the non-joined axis are identical the storage is simply
    /// concatenated.
    pub fn join(&self, other: &Self, axis: Axis) -> Result<Self> {
        if self.index.is_multi() || other.index.is_multi() {
            return Err(SparsityError::not_implemented(
                "join on frames with a multi-level row index",
            ));
        }
        match axis {
            Axis::Rows => {
                let index = self.index.concat(&other.index)?;
                if self.columns == other.columns {
                    let data = CsrMatrix::vstack(&[&self.logical(), &other.logical()])?;
                    return Self::from_parts(data, index, self.columns.clone());
                }
                let (left, right) = (self.transpose(), other.transpose());
                let (left_rows, right_rows, columns) = align_rows(&left, &right, JoinHow::Outer)?;
                let data = CsrMatrix::hstack(&[&left_rows, &right_rows])?.transpose();
                Self::from_parts(data, index, columns)
            }
            Axis::Columns => {
                let columns = self.columns.concat(&other.columns)?;
                if self.index == other.index {
                    let data = CsrMatrix::hstack(&[&self.logical(), &other.logical()])?;
                    return Self::from_parts(data, self.index.clone(), columns);
                }
                let (left_rows, right_rows, index) = align_rows(self, other, JoinHow::Outer)?;
                let data = CsrMatrix::hstack(&[&left_rows, &right_rows])?;
                Self::from_parts(data, index, columns)
            }
        }
    }

    /// Row-aligned elementwise `op`; both frames must have identical columns.
    pub fn combine(&self, other: &Self, how: JoinHow, op: impl Fn(T, T) -> T) -> Result<Self> {
        if self.columns != other.columns {
            return Err(SparsityError::assertion(format!(
                "column labels differ ({} vs {} columns)",
                self.ncols(),
                other.ncols()
            )));
        }
        let (left_rows, right_rows, index) = align_rows(self, other, how)?;
        let data = left_rows.binop(&right_rows, op)?;
        Self::from_parts(data, index, self.columns.clone())
    }

    /// Elementwise sum over the union of row labels; a label present on one side only is
    /// added to zero.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.add_with(other, JoinHow::Outer)
    }

    pub fn add_with(&self, other: &Self, how: JoinHow) -> Result<Self> {
        self.combine(other, how, |a, b| a + b)
    }

    /// Sum the rows that share a key. The result has one row per distinct key, sorted by key.
    ///
    /// The aggregation is the sparse product `(Mᵗ · G)ᵗ` where `G[i, g] = 1` when row `i`
    /// belongs to group `g`.
    pub fn groupby(&self, by: GroupKey) -> Result<Self> {
        let n = self.nrows();
        let keys = match by {
            GroupKey::Labels(keys) => {
                if keys.len() != n {
                    return Err(SparsityError::assertion(format!(
                        "got {} group keys for {} rows",
                        keys.len(),
                        n
                    )));
                }
                keys
            }
            GroupKey::Index => self.index.to_labels(),
            GroupKey::Level(level) if self.index.is_multi() => self.index.level_values(level)?,
            GroupKey::Level(0) => self.index.to_labels(),
            GroupKey::Level(level) => {
                return Err(SparsityError::value(format!(
                    "cannot group by level {} of a flat index",
                    level
                )))
            }
        };
        let order: Vec<usize> = (0..n).sorted_by(|&a, &b| keys[a].cmp(&keys[b])).collect();
        let sorted_keys: Vec<Label> = order.iter().map(|&i| keys[i].clone()).collect();
        let (membership, categories) = group_matrix::<T>(&sorted_keys)?;
        let sorted_rows = self.data.take_rows(&order)?;
        let grouped = sorted_rows.transpose().matmul(&membership)?.transpose();
        Self::from_parts(grouped, Index::Flat(categories), self.columns.clone())
    }

    /// Rows reordered by label (stable for repeated labels).
    pub fn sort_index(&self) -> Result<Self> {
        let order = self.index.argsort();
        let data = self.data.take_rows(&order)?;
        Self::from_parts(data, self.index.take(&order), self.columns.clone())
    }

    /// Append one column labelled `key` holding `values`.
    pub fn set_column(&mut self, key: impl Into<Label>, values: &[T]) -> Result<()> {
        let n = self.nrows();
        if values.len() != n {
            return Err(SparsityError::assertion(format!(
                "got {} values for a frame with {} rows",
                values.len(),
                n
            )));
        }
        let columns = self.columns.push(key.into())?;
        let padded: Vec<T> = values.iter().copied().chain([T::zero()]).collect();
        let column = CsrMatrix::from_column(&padded);
        self.data = CsrMatrix::hstack(&[&self.data, &column])?;
        self.columns = columns;
        Ok(())
    }

    /// Left fold of [`SparseFrame::join`] over `frames`.
    pub fn concat(frames: &[Self], axis: Axis) -> Result<Self> {
        let Some((first, rest)) = frames.split_first() else {
            return Err(SparsityError::value("no frames to concatenate"));
        };
        rest.iter()
            .try_fold(first.clone(), |acc, frame| acc.join(frame, axis))
    }

    /// Stack frames vertically.
    ///
    /// Frames sharing the same columns are stacked in a single pass (multi-level row indexes
    /// included); otherwise this falls back to [`SparseFrame::concat`].
    pub fn vstack(frames: &[Self]) -> Result<Self> {
        let Some(first) = frames.first() else {
            return Err(SparsityError::value("no frames to stack"));
        };
        if frames.iter().any(|f| f.columns != first.columns) {
            return Self::concat(frames, Axis::Rows);
        }
        let blocks: Vec<CsrMatrix<T>> = frames.iter().map(|f| f.logical()).collect();
        let data = CsrMatrix::vstack(&blocks.iter().collect::<Vec<_>>())?;
        let index = frames[1..]
            .iter()
            .try_fold(first.index.clone(), |acc, f| acc.concat(&f.index))?;
        Self::from_parts(data, index, first.columns.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, s, Array2};

    fn frame(data: Array2<f64>, index: &[i64]) -> SparseFrame {
        SparseFrame::from_dense(data.view(), Some(index.iter().copied().collect()), None).unwrap()
    }

    #[test]
    fn test_axis_from_usize() {
        assert_eq!(Axis::try_from(0).unwrap(), Axis::Rows);
        assert_eq!(Axis::try_from(1).unwrap(), Axis::Columns);
        assert!(matches!(Axis::try_from(2), Err(SparsityError::Value(_))));
    }

    #[test]
    fn test_simple_join() {
        let t = SparseFrame::from_dense(Array2::<f64>::eye(10).view(), None, None).unwrap();
        let rows = t.join(&t, Axis::Rows).unwrap();
        assert_eq!(rows.shape(), (20, 10));
        assert_eq!(rows.to_dense().slice(s![10.., ..]), Array2::<f64>::eye(10));
        let cols = t.join(&t, Axis::Columns).unwrap();
        assert_eq!(cols.shape(), (10, 20));
        assert_eq!(cols.to_dense().slice(s![.., 10..]), Array2::<f64>::eye(10));
    }

    #[test]
    fn test_mutually_exclusive_join() {
        let left = frame(Array2::eye(5), &[0, 1, 2, 3, 4]);
        let right = frame(Array2::eye(5), &[5, 6, 7, 8, 9]);
        let res = left.join(&right, Axis::Columns).unwrap();
        let mut correct = Array2::<f64>::zeros((10, 10));
        correct.slice_mut(s![..5, ..5]).assign(&Array2::eye(5));
        correct.slice_mut(s![5.., 5..]).assign(&Array2::eye(5));
        assert_eq!(res.to_dense(), correct);
    }

    #[test]
    fn test_row_join_aligns_columns() {
        let left = SparseFrame::from_dense(
            array![[1., 2.]].view(),
            None,
            Some(["a", "b"].into_iter().collect()),
        )
        .unwrap();
        let right = SparseFrame::from_dense(
            array![[3., 4.]].view(),
            Some(Index::from_iter([1])),
            Some(["b", "c"].into_iter().collect()),
        )
        .unwrap();
        let res = left.join(&right, Axis::Rows).unwrap();
        assert_eq!(res.columns(), &["a", "b", "c"].into_iter().collect::<Index>());
        assert_eq!(res.to_dense(), array![[1., 2., 0.], [0., 3., 4.]]);
    }

    #[test]
    fn test_join_multi_index_not_implemented() {
        let index = Index::multi(
            vec![vec![Label::Int(0)], vec![Label::Int(0)]],
            vec!["a".into(), "b".into()],
        )
        .unwrap();
        let sf = SparseFrame::from_dense(array![[1.]].view(), Some(index), None).unwrap();
        assert!(matches!(
            sf.join(&sf, Axis::Rows),
            Err(SparsityError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_add_total_overlap() {
        let first = frame(Array2::eye(4), &[3, 1, 0, 2]);
        let second = frame(array![[10., 0., 0., 0.]], &[1]);
        let res = first.add(&second).unwrap().sort_index().unwrap();
        let mut correct = first.sort_index().unwrap().to_dense();
        correct[[1, 0]] += 10.;
        assert_eq!(res.to_dense(), correct);
        assert_eq!(res.index(), &Index::range(4));
    }

    #[test]
    fn test_add_disjoint_is_union() {
        let left = frame(array![[1., 0.], [0., 2.]], &[0, 2]);
        let right = frame(array![[3., 0.]], &[1]);
        let res = left.add(&right).unwrap();
        assert_eq!(res.index(), &Index::range(3));
        assert_eq!(res.to_dense(), array![[1., 0.], [3., 0.], [0., 2.]]);
    }

    #[test]
    fn test_add_requires_same_columns() {
        let left = frame(array![[1., 0.]], &[0]);
        let right = frame(array![[1.]], &[0]);
        assert!(matches!(left.add(&right), Err(SparsityError::Assertion(_))));
    }

    #[test]
    fn test_groupby_sums_rows() {
        let sf = frame(
            array![[1., 0.], [0., 1.], [2., 0.], [0., 3.]],
            &[7, 3, 7, 3],
        );
        let grouped = sf.groupby(GroupKey::Index).unwrap();
        assert_eq!(grouped.index(), &Index::from_iter([3, 7]));
        assert_eq!(grouped.to_dense(), array![[0., 4.], [3., 0.]]);
    }

    #[test]
    fn test_groupby_keys_and_levels() {
        let sf = frame(Array2::eye(3), &[0, 1, 2]);
        let by = vec![Label::from("b"), Label::from("a"), Label::from("b")];
        let grouped = sf.groupby(GroupKey::Labels(by)).unwrap();
        assert_eq!(grouped.to_dense(), array![[0., 1., 0.], [1., 0., 1.]]);
        assert!(matches!(
            sf.groupby(GroupKey::Labels(vec![Label::Int(0)])),
            Err(SparsityError::Assertion(_))
        ));
        assert!(matches!(
            sf.groupby(GroupKey::Level(1)),
            Err(SparsityError::Value(_))
        ));

        let index = Index::multi(
            vec![
                vec![Label::from("u1"), Label::from("u2"), Label::from("u1")],
                vec![Label::Int(0), Label::Int(1), Label::Int(2)],
            ],
            vec!["uuid".into(), "timestamp".into()],
        )
        .unwrap();
        let multi =
            SparseFrame::from_dense(Array2::<f64>::eye(3).view(), Some(index), None).unwrap();
        let by_uuid = multi.groupby(GroupKey::Level(0)).unwrap();
        assert_eq!(by_uuid.to_dense(), array![[1., 0., 1.], [0., 1., 0.]]);
    }

    #[test]
    fn test_set_column() {
        let mut sf = SparseFrame::from_dense(Array2::<f64>::eye(5).view(), None, None).unwrap();
        sf.set_column(6, &[1.; 5]).unwrap();
        let mut correct = Array2::<f64>::ones((5, 6));
        correct.slice_mut(s![.., ..5]).assign(&Array2::eye(5));
        assert_eq!(sf.to_dense(), correct);
        assert_eq!(sf.columns().get(5), Some(Label::Int(6)));
        assert!(sf.data.row_is_empty(5));
        assert!(matches!(
            sf.set_column(7, &[1.; 4]),
            Err(SparsityError::Assertion(_))
        ));
    }

    #[test]
    fn test_vstack_and_concat() {
        let a = frame(array![[1., 0.]], &[0]);
        let b = frame(array![[0., 1.]], &[1]);
        let stacked = SparseFrame::vstack(&[a.clone(), b.clone()]).unwrap();
        let folded = SparseFrame::concat(&[a, b], Axis::Rows).unwrap();
        assert_eq!(stacked, folded);
        assert!(SparseFrame::<f64>::concat(&[], Axis::Rows).is_err());
    }
}
