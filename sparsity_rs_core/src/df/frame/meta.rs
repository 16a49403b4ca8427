use std::{fmt, mem::size_of};

use ndarray::{Array2, ArrayView2, ArrayViewD, Ix2};

use super::SparseFrame;
use crate::{
    df::{
        csr::{CooMatrix, CsrMatrix},
        index::{Index, Indexer},
    },
    error::{Result, SparsityError},
    toolkit::{
        array::AFloat,
        hash::{Tokenize, Tokenizer},
    },
};

impl<T: AFloat> SparseFrame<T> {
    /// Wrap a CSR matrix; missing labels default to positional ranges.
    pub fn new(data: CsrMatrix<T>, index: Option<Index>, columns: Option<Index>) -> Result<Self> {
        let (n, k) = data.shape();
        let index = index.unwrap_or_else(|| Index::range(n));
        let columns = columns.unwrap_or_else(|| Index::range(k));
        if index.len() != n {
            return Err(SparsityError::shape(format!(
                "index has {} labels but data has {} rows",
                index.len(),
                n
            )));
        }
        if columns.len() != k {
            return Err(SparsityError::shape(format!(
                "columns have {} labels but data has {} columns",
                columns.len(),
                k
            )));
        }
        Ok(Self {
            index,
            columns,
            data: data.append_zero_row(),
        })
    }

    pub fn from_dense(
        data: ArrayView2<T>,
        index: Option<Index>,
        columns: Option<Index>,
    ) -> Result<Self> {
        Self::new(CsrMatrix::from_dense(data), index, columns)
    }

    /// Like [`SparseFrame::from_dense`], for arrays whose dimensionality is only known at runtime.
    pub fn from_array(
        data: ArrayViewD<T>,
        index: Option<Index>,
        columns: Option<Index>,
    ) -> Result<Self> {
        let ndim = data.ndim();
        let data = data.into_dimensionality::<Ix2>().map_err(|_| {
            SparsityError::shape(format!(
                "only two dimensional data is supported, got {} dimensions",
                ndim
            ))
        })?;
        Self::from_dense(data, index, columns)
    }

    pub fn from_coo(
        data: &CooMatrix<T>,
        index: Option<Index>,
        columns: Option<Index>,
    ) -> Result<Self> {
        Self::new(data.to_csr(), index, columns)
    }

    /// A frame without rows, used as the schema of lazily computed frames.
    pub fn empty(columns: Index) -> Self {
        Self {
            index: Index::default(),
            data: CsrMatrix::zeros(1, columns.len()),
            columns,
        }
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn columns(&self) -> &Index {
        &self.columns
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.index.len(), self.columns.len())
    }

    pub fn nrows(&self) -> usize {
        self.index.len()
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn nnz(&self) -> usize {
        self.data.nnz()
    }

    /// `true` when the frame has no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.nrows() == 0 || self.ncols() == 0
    }

    /// The logical `n × k` matrix, without the trailing empty row.
    pub fn data(&self) -> CsrMatrix<T> {
        self.logical()
    }

    pub fn to_dense(&self) -> Array2<T> {
        self.logical().to_dense()
    }

    /// Approximate memory held by the frame: labels plus CSR storage.
    pub fn size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + (self.index.len() * self.index.nlevels() + self.columns.len())
                * size_of::<crate::df::Label>()
            + self.data.nbytes()
    }

    /// The same frame with rows and columns swapped.
    pub fn transpose(&self) -> Self {
        Self {
            index: self.columns.clone(),
            columns: self.index.clone(),
            data: self.logical().transpose().append_zero_row(),
        }
    }

    /// Replace the column labels, which must keep the same width.
    pub fn with_columns(&self, columns: Index) -> Result<Self> {
        if columns.len() != self.ncols() {
            return Err(SparsityError::shape(format!(
                "cannot relabel {} columns with {} labels",
                self.ncols(),
                columns.len()
            )));
        }
        Ok(Self {
            index: self.index.clone(),
            columns,
            data: self.data.clone(),
        })
    }

    pub(crate) fn logical(&self) -> CsrMatrix<T> {
        let n = self.nrows();
        // `0..n` is always within the `n + 1` stored rows
        self.data
            .slice_rows(0..n)
            .unwrap_or_else(|_| CsrMatrix::zeros(n, self.ncols()))
    }

    /// Rows aligned to a join result: unmatched positions read the trailing empty row.
    pub(crate) fn gather(&self, indexer: &Indexer) -> Result<CsrMatrix<T>> {
        match indexer {
            Indexer::Identity => Ok(self.logical()),
            Indexer::Take(positions) => {
                let sentinel = self.nrows();
                let rows: Vec<usize> = positions.iter().map(|p| p.unwrap_or(sentinel)).collect();
                self.data.take_rows(&rows)
            }
        }
    }

    /// Assemble a frame from parts that are already consistent with each other.
    pub(crate) fn from_parts(data: CsrMatrix<T>, index: Index, columns: Index) -> Result<Self> {
        Self::new(data, Some(index), Some(columns))
    }
}

const REPR_ROWS: usize = 5;

impl<T: AFloat> fmt::Display for SparseFrame<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = self.head(REPR_ROWS);
        write!(f, "\t")?;
        for c in self.columns.to_labels() {
            write!(f, "{}\t", c)?;
        }
        writeln!(f)?;
        for (label, row) in self.index.to_labels().iter().zip(head.rows()) {
            write!(f, "{}\t", label)?;
            for v in row.iter() {
                write!(f, "{}\t", v)?;
            }
            writeln!(f)?;
        }
        write!(f, "[{} rows x {} columns]", self.nrows(), self.ncols())
    }
}

impl<T: AFloat> Tokenize for SparseFrame<T> {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        self.index.tokenize(tokenizer);
        self.columns.tokenize(tokenizer);
        self.data.indptr().tokenize(tokenizer);
        self.data.indices().tokenize(tokenizer);
        self.data
            .data()
            .iter()
            .map(|v| v.to_f64().unwrap_or(f64::NAN))
            .collect::<Vec<_>>()
            .tokenize(tokenizer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::df::Label;
    use ndarray::{Array2, ArrayD, IxDyn};

    #[test]
    fn test_new_appends_empty_row() {
        let sf = SparseFrame::from_dense(Array2::<f64>::eye(3).view(), None, None).unwrap();
        assert_eq!(sf.shape(), (3, 3));
        assert_eq!(sf.data.nrows(), 4);
        assert!(sf.data.row_is_empty(3));
        assert_eq!(sf.index(), &Index::range(3));
        assert_eq!(sf.to_dense(), Array2::<f64>::eye(3));
    }

    #[test]
    fn test_rejects_non_2d_input() {
        let cube = ArrayD::<f64>::zeros(IxDyn(&[2, 2, 2]));
        let err = SparseFrame::from_array(cube.view(), None, None).unwrap_err();
        assert!(matches!(err, SparsityError::Shape(_)));
        let flat = ArrayD::<f64>::zeros(IxDyn(&[2, 2]));
        assert!(SparseFrame::from_array(flat.view(), None, None).is_ok());
    }

    #[test]
    fn test_rejects_mismatched_labels() {
        let err = SparseFrame::from_dense(
            Array2::<f64>::eye(2).view(),
            Some(Index::range(3)),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SparsityError::Shape(_)));
    }

    #[test]
    fn test_transpose_keeps_labels() {
        let sf = SparseFrame::from_dense(
            ndarray::array![[1., 2., 0.]].view(),
            Some(["r"].into_iter().collect()),
            None,
        )
        .unwrap();
        let t = sf.transpose();
        assert_eq!(t.shape(), (3, 1));
        assert_eq!(t.columns().get(0), Some(Label::from("r")));
        assert_eq!(t.to_dense(), ndarray::array![[1.], [2.], [0.]]);
    }

    #[test]
    fn test_display() {
        let sf = SparseFrame::from_dense(Array2::<f64>::eye(2).view(), None, None).unwrap();
        let repr = sf.to_string();
        assert!(repr.ends_with("[2 rows x 2 columns]"));
    }
}
