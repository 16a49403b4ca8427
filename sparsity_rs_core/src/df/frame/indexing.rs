use std::ops::Range;

use ndarray::Array2;

use super::SparseFrame;
use crate::{
    df::Label,
    error::{Result, SparsityError},
    toolkit::array::{split_sizes, AFloat},
};

impl<T: AFloat> SparseFrame<T> {
    /// Rows at positions `range`.
    pub fn iloc_range(&self, range: Range<usize>) -> Result<Self> {
        let n = self.nrows();
        if range.start > range.end || range.end > n {
            return Err(SparsityError::key(format!(
                "positions {:?} out of bounds for {} rows",
                range, n
            )));
        }
        let data = self.data.slice_rows(range.clone())?;
        Self::from_parts(data, self.index.slice(range), self.columns.clone())
    }

    /// Rows at `positions`, in that order.
    pub fn iloc_rows(&self, positions: &[usize]) -> Result<Self> {
        let n = self.nrows();
        if let Some(p) = positions.iter().find(|&&p| p >= n) {
            return Err(SparsityError::key(format!(
                "position {} out of bounds for {} rows",
                p, n
            )));
        }
        let data = self.data.take_rows(positions)?;
        Self::from_parts(data, self.index.take(positions), self.columns.clone())
    }

    pub fn iloc_row(&self, position: usize) -> Result<Self> {
        self.iloc_rows(&[position])
    }

    /// Rows whose labels fall in the inclusive range `[start, end]`; `None` leaves a side open.
    pub fn loc_range(&self, start: Option<&Label>, end: Option<&Label>) -> Result<Self> {
        let (lo, hi) = self.index.slice_locs(start, end)?;
        self.iloc_range(lo..hi)
    }

    /// Rows with the given labels, in that order.
    pub fn loc_labels(&self, labels: &[Label]) -> Result<Self> {
        let positions = labels
            .iter()
            .map(|label| self.index.get_loc(label))
            .collect::<Result<Vec<_>>>()?;
        self.iloc_rows(&positions)
    }

    pub fn loc_row(&self, label: &Label) -> Result<Self> {
        self.loc_labels(std::slice::from_ref(label))
    }

    /// Dense copy of the first `n` rows.
    pub fn head(&self, n: usize) -> Array2<T> {
        let n = n.min(self.nrows());
        self.data
            .slice_rows(0..n)
            .map(|rows| rows.to_dense())
            .unwrap_or_else(|_| Array2::zeros((0, self.ncols())))
    }

    /// Rows with labels in `[lo, hi)`, or `[lo, hi]` when `right_inclusive`.
    ///
    /// Rows are filtered by label, so the frame does not need to be sorted.
    pub(crate) fn boundary_slice(
        &self,
        lo: Option<&Label>,
        hi: Option<&Label>,
        right_inclusive: bool,
    ) -> Result<Self> {
        let positions: Vec<usize> = self
            .index
            .to_labels()
            .iter()
            .enumerate()
            .filter(|(_, label)| {
                let above = lo.map_or(true, |lo| *label >= lo);
                let below = hi.map_or(true, |hi| {
                    if right_inclusive {
                        *label <= hi
                    } else {
                        *label < hi
                    }
                });
                above && below
            })
            .map(|(i, _)| i)
            .collect();
        self.iloc_rows(&positions)
    }

    /// Split into `k` chunks of consecutive rows with nearly equal sizes.
    pub fn split_evenly(&self, k: usize) -> Result<Vec<Self>> {
        if k == 0 {
            return Err(SparsityError::value("cannot split a frame into 0 chunks"));
        }
        let mut start = 0;
        split_sizes(self.nrows(), k)
            .into_iter()
            .map(|size| {
                let chunk = self.iloc_range(start..start + size);
                start += size;
                chunk
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::df::index::Index;
    use chrono::NaiveDate;
    use ndarray::{s, Array2};

    fn eye(n: usize) -> SparseFrame {
        SparseFrame::from_dense(Array2::<f64>::eye(n).view(), None, None).unwrap()
    }

    #[test]
    fn test_iloc() {
        let sf = eye(5);
        let identity = Array2::<f64>::eye(5);
        assert_eq!(sf.iloc_range(0..2).unwrap().to_dense(), identity.slice(s![..2, ..]));
        assert_eq!(
            sf.iloc_rows(&[3, 4]).unwrap().to_dense(),
            identity.slice(s![3..5, ..])
        );
        assert_eq!(sf.iloc_row(3).unwrap().to_dense(), identity.slice(s![3..4, ..]));
        assert!(sf.iloc_row(5).is_err());
        assert!(sf.iloc_range(0..6).is_err());
    }

    #[test]
    fn test_loc() {
        let sf = SparseFrame::from_dense(
            Array2::<f64>::eye(5).view(),
            Some(["A", "B", "C", "D", "E"].into_iter().collect()),
            None,
        )
        .unwrap();
        let identity = Array2::<f64>::eye(5);
        assert_eq!(
            sf.loc_range(None, Some(&"B".into())).unwrap().to_dense(),
            identity.slice(s![..2, ..])
        );
        assert_eq!(
            sf.loc_labels(&["D".into(), "E".into()]).unwrap().to_dense(),
            identity.slice(s![3..5, ..])
        );
        assert!(sf.loc_row(&"Z".into()).is_err());

        let dates: Index = (1..=5)
            .map(|d| {
                NaiveDate::from_ymd_opt(2016, 10, d)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
            })
            .collect();
        let sf = SparseFrame::from_dense(Array2::<f64>::eye(5).view(), Some(dates), None).unwrap();
        let day = |d| {
            let date = NaiveDate::from_ymd_opt(2016, 10, d).unwrap();
            Label::Time(date.and_hms_opt(0, 0, 0).unwrap())
        };
        let (start, end) = (day(1), day(3));
        assert_eq!(
            sf.loc_range(Some(&start), Some(&end)).unwrap().to_dense(),
            identity.slice(s![..3, ..])
        );
    }

    #[test]
    fn test_head_never_reads_the_empty_row() {
        let sf = eye(2);
        assert_eq!(sf.head(5).dim(), (2, 2));
    }

    #[test]
    fn test_boundary_slice() {
        let sf = SparseFrame::from_dense(
            Array2::<f64>::eye(4).view(),
            Some([3, 0, 2, 1].into_iter().collect()),
            None,
        )
        .unwrap();
        let half_open = sf
            .boundary_slice(Some(&Label::Int(1)), Some(&Label::Int(3)), false)
            .unwrap();
        assert_eq!(half_open.index(), &Index::from_iter([2, 1]));
        let closed = sf
            .boundary_slice(Some(&Label::Int(1)), Some(&Label::Int(3)), true)
            .unwrap();
        assert_eq!(closed.nrows(), 3);
    }

    #[test]
    fn test_split_evenly() {
        let chunks = eye(5).split_evenly(2).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].nrows(), 3);
        assert_eq!(chunks[1].index(), &Index::from_iter([3, 4]));
        assert!(eye(1).split_evenly(0).is_err());
    }
}
