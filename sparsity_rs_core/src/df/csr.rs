//! Compressed sparse row storage.
//!
//! Column indices are sorted within each row and never repeated. Explicit zeros are dropped by
//! every constructor and arithmetic operation.

use std::{mem::size_of, ops::Range};

use itertools::izip;
use ndarray::{Array2, ArrayView2};

use crate::error::{Result, SparsityError};
use crate::toolkit::array::AFloat;

#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix<T: AFloat> {
    nrows: usize,
    ncols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<T>,
}

/// Coordinate (triplet) format, as produced by ingestion and one-hot encoding.
///
/// Duplicate coordinates are summed when converting to CSR.
#[derive(Debug, Clone, PartialEq)]
pub struct CooMatrix<T: AFloat> {
    nrows: usize,
    ncols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    data: Vec<T>,
}

impl<T: AFloat> CooMatrix<T> {
    pub fn new(
        shape: (usize, usize),
        rows: Vec<usize>,
        cols: Vec<usize>,
        data: Vec<T>,
    ) -> Result<Self> {
        let (nrows, ncols) = shape;
        if rows.len() != cols.len() || rows.len() != data.len() {
            return Err(SparsityError::shape(format!(
                "coordinate arrays differ in length ({}, {}, {})",
                rows.len(),
                cols.len(),
                data.len()
            )));
        }
        if let Some((&r, &c)) = rows
            .iter()
            .zip(cols.iter())
            .find(|&(&r, &c)| r >= nrows || c >= ncols)
        {
            return Err(SparsityError::shape(format!(
                "coordinate ({}, {}) out of bounds for shape ({}, {})",
                r, c, nrows, ncols
            )));
        }
        Ok(Self {
            nrows,
            ncols,
            rows,
            cols,
            data,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn to_csr(&self) -> CsrMatrix<T> {
        let mut order: Vec<usize> = (0..self.data.len()).collect();
        order.sort_by_key(|&i| (self.rows[i], self.cols[i]));
        let mut indptr = vec![0; self.nrows + 1];
        let mut indices = Vec::with_capacity(order.len());
        let mut data: Vec<T> = Vec::with_capacity(order.len());
        let mut last: Option<(usize, usize)> = None;
        for i in order {
            let coord = (self.rows[i], self.cols[i]);
            if last == Some(coord) {
                if let Some(v) = data.last_mut() {
                    *v += self.data[i];
                }
                continue;
            }
            last = Some(coord);
            indptr[coord.0 + 1] += 1;
            indices.push(coord.1);
            data.push(self.data[i]);
        }
        for r in 0..self.nrows {
            indptr[r + 1] += indptr[r];
        }
        let mut csr = CsrMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            indptr,
            indices,
            data,
        };
        csr.eliminate_zeros();
        csr
    }
}

impl<T: AFloat> CsrMatrix<T> {
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            indptr: vec![0; nrows + 1],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Build from raw CSR arrays, validating the storage invariants.
    pub fn new(
        shape: (usize, usize),
        indptr: Vec<usize>,
        indices: Vec<usize>,
        data: Vec<T>,
    ) -> Result<Self> {
        let (nrows, ncols) = shape;
        if indptr.len() != nrows + 1 || indptr[0] != 0 {
            return Err(SparsityError::shape(format!(
                "indptr must have {} entries starting at 0",
                nrows + 1
            )));
        }
        if indices.len() != data.len() || indptr[nrows] != data.len() {
            return Err(SparsityError::shape(
                "indices, data and indptr disagree on the number of stored values",
            ));
        }
        for r in 0..nrows {
            let (start, end) = (indptr[r], indptr[r + 1]);
            if start > end || end > indices.len() {
                return Err(SparsityError::shape(
                    "indptr must be non-decreasing and within the stored values",
                ));
            }
            let row = &indices[start..end];
            if row.windows(2).any(|w| w[0] >= w[1]) || row.iter().any(|&c| c >= ncols) {
                return Err(SparsityError::shape(format!(
                    "row {} has unsorted, repeated or out of bounds column indices",
                    r
                )));
            }
        }
        let mut csr = Self {
            nrows,
            ncols,
            indptr,
            indices,
            data,
        };
        csr.eliminate_zeros();
        Ok(csr)
    }

    pub fn from_dense(dense: ArrayView2<T>) -> Self {
        let (nrows, ncols) = dense.dim();
        let mut indptr = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for row in dense.rows() {
            row.iter().enumerate().for_each(|(c, &v)| {
                if v != T::zero() {
                    indices.push(c);
                    data.push(v);
                }
            });
            indptr.push(data.len());
        }
        Self {
            nrows,
            ncols,
            indptr,
            indices,
            data,
        }
    }

    /// A single column holding `values`.
    pub fn from_column(values: &[T]) -> Self {
        let mut indptr = Vec::with_capacity(values.len() + 1);
        let mut data = Vec::new();
        indptr.push(0);
        values.iter().for_each(|&v| {
            if v != T::zero() {
                data.push(v);
            }
            indptr.push(data.len());
        });
        Self {
            nrows: values.len(),
            ncols: 1,
            indptr,
            indices: vec![0; data.len()],
            data,
        }
    }

    pub fn to_dense(&self) -> Array2<T> {
        let mut dense = Array2::<T>::zeros((self.nrows, self.ncols));
        for r in 0..self.nrows {
            let (cols, values) = self.row(r);
            izip!(cols, values).for_each(|(&c, &v)| dense[[r, c]] = v);
        }
        dense
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Bytes held by the three storage arrays.
    pub fn nbytes(&self) -> usize {
        (self.indptr.len() + self.indices.len()) * size_of::<usize>()
            + self.data.len() * size_of::<T>()
    }

    /// Column indices and values stored in row `r`.
    pub fn row(&self, r: usize) -> (&[usize], &[T]) {
        let (start, end) = (self.indptr[r], self.indptr[r + 1]);
        (&self.indices[start..end], &self.data[start..end])
    }

    pub fn get(&self, r: usize, c: usize) -> T {
        let (cols, values) = self.row(r);
        cols.binary_search(&c).map_or(T::zero(), |i| values[i])
    }

    pub fn row_is_empty(&self, r: usize) -> bool {
        self.indptr[r] == self.indptr[r + 1]
    }

    pub fn eliminate_zeros(&mut self) {
        if self.data.iter().all(|&v| v != T::zero()) {
            return;
        }
        let mut indptr = Vec::with_capacity(self.nrows + 1);
        let mut indices = Vec::with_capacity(self.indices.len());
        let mut data = Vec::with_capacity(self.data.len());
        indptr.push(0);
        for r in 0..self.nrows {
            let (cols, values) = self.row(r);
            izip!(cols, values).for_each(|(&c, &v)| {
                if v != T::zero() {
                    indices.push(c);
                    data.push(v);
                }
            });
            indptr.push(data.len());
        }
        self.indptr = indptr;
        self.indices = indices;
        self.data = data;
    }

    /// The same matrix with one more, empty, row at the bottom.
    pub fn append_zero_row(mut self) -> Self {
        self.indptr.push(self.data.len());
        self.nrows += 1;
        self
    }

    /// Gather rows at `rows` (repetitions allowed), in that order.
    pub fn take_rows(&self, rows: &[usize]) -> Result<Self> {
        if let Some(&r) = rows.iter().find(|&&r| r >= self.nrows) {
            return Err(SparsityError::key(format!(
                "row {} out of bounds for {} rows",
                r, self.nrows
            )));
        }
        let mut indptr = Vec::with_capacity(rows.len() + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        rows.iter().for_each(|&r| {
            let (cols, values) = self.row(r);
            indices.extend_from_slice(cols);
            data.extend_from_slice(values);
            indptr.push(data.len());
        });
        Ok(Self {
            nrows: rows.len(),
            ncols: self.ncols,
            indptr,
            indices,
            data,
        })
    }

    pub fn slice_rows(&self, range: Range<usize>) -> Result<Self> {
        if range.start > range.end || range.end > self.nrows {
            return Err(SparsityError::key(format!(
                "rows {:?} out of bounds for {} rows",
                range, self.nrows
            )));
        }
        let (start, end) = (self.indptr[range.start], self.indptr[range.end]);
        Ok(Self {
            nrows: range.len(),
            ncols: self.ncols,
            indptr: self.indptr[range.start..=range.end]
                .iter()
                .map(|&p| p - start)
                .collect(),
            indices: self.indices[start..end].to_vec(),
            data: self.data[start..end].to_vec(),
        })
    }

    pub fn vstack(blocks: &[&Self]) -> Result<Self> {
        let Some(first) = blocks.first() else {
            return Err(SparsityError::value("need at least one matrix to stack"));
        };
        let ncols = first.ncols;
        if blocks.iter().any(|b| b.ncols != ncols) {
            return Err(SparsityError::shape(
                "all matrices must have the same number of columns to be stacked vertically",
            ));
        }
        let nrows = blocks.iter().map(|b| b.nrows).sum();
        let nnz = blocks.iter().map(|b| b.nnz()).sum();
        let mut indptr = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::with_capacity(nnz);
        let mut data = Vec::with_capacity(nnz);
        indptr.push(0);
        blocks.iter().for_each(|b| {
            let offset = data.len();
            indptr.extend(b.indptr[1..].iter().map(|&p| p + offset));
            indices.extend_from_slice(&b.indices);
            data.extend_from_slice(&b.data);
        });
        Ok(Self {
            nrows,
            ncols,
            indptr,
            indices,
            data,
        })
    }

    pub fn hstack(blocks: &[&Self]) -> Result<Self> {
        let Some(first) = blocks.first() else {
            return Err(SparsityError::value("need at least one matrix to stack"));
        };
        let nrows = first.nrows;
        if blocks.iter().any(|b| b.nrows != nrows) {
            return Err(SparsityError::shape(
                "all matrices must have the same number of rows to be stacked horizontally",
            ));
        }
        let ncols = blocks.iter().map(|b| b.ncols).sum();
        let nnz = blocks.iter().map(|b| b.nnz()).sum();
        let mut indptr = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::with_capacity(nnz);
        let mut data = Vec::with_capacity(nnz);
        indptr.push(0);
        for r in 0..nrows {
            let mut col_offset = 0;
            blocks.iter().for_each(|b| {
                let (cols, values) = b.row(r);
                indices.extend(cols.iter().map(|&c| c + col_offset));
                data.extend_from_slice(values);
                col_offset += b.ncols;
            });
            indptr.push(data.len());
        }
        Ok(Self {
            nrows,
            ncols,
            indptr,
            indices,
            data,
        })
    }

    pub fn transpose(&self) -> Self {
        let mut counts = vec![0usize; self.ncols + 1];
        self.indices.iter().for_each(|&c| counts[c + 1] += 1);
        for c in 0..self.ncols {
            counts[c + 1] += counts[c];
        }
        let indptr = counts.clone();
        let mut next = counts;
        let mut indices = vec![0; self.nnz()];
        let mut data = vec![T::zero(); self.nnz()];
        // rows are visited in order, so the transposed rows come out sorted
        for r in 0..self.nrows {
            let (cols, values) = self.row(r);
            izip!(cols, values).for_each(|(&c, &v)| {
                let dst = next[c];
                indices[dst] = r;
                data[dst] = v;
                next[c] += 1;
            });
        }
        Self {
            nrows: self.ncols,
            ncols: self.nrows,
            indptr,
            indices,
            data,
        }
    }

    /// Elementwise `op` over the union of both sparsity patterns; absent entries are zero.
    pub fn binop(&self, other: &Self, op: impl Fn(T, T) -> T) -> Result<Self> {
        if self.shape() != other.shape() {
            return Err(SparsityError::shape(format!(
                "elementwise operation on shapes {:?} and {:?}",
                self.shape(),
                other.shape()
            )));
        }
        let mut indptr = Vec::with_capacity(self.nrows + 1);
        let mut indices = Vec::with_capacity(self.nnz().max(other.nnz()));
        let mut data = Vec::with_capacity(self.nnz().max(other.nnz()));
        indptr.push(0);
        for r in 0..self.nrows {
            let (ac, av) = self.row(r);
            let (bc, bv) = other.row(r);
            let (mut i, mut j) = (0, 0);
            while i < ac.len() || j < bc.len() {
                let (c, v) = if j >= bc.len() || (i < ac.len() && ac[i] < bc[j]) {
                    i += 1;
                    (ac[i - 1], op(av[i - 1], T::zero()))
                } else if i >= ac.len() || bc[j] < ac[i] {
                    j += 1;
                    (bc[j - 1], op(T::zero(), bv[j - 1]))
                } else {
                    i += 1;
                    j += 1;
                    (ac[i - 1], op(av[i - 1], bv[j - 1]))
                };
                if v != T::zero() {
                    indices.push(c);
                    data.push(v);
                }
            }
            indptr.push(data.len());
        }
        Ok(Self {
            nrows: self.nrows,
            ncols: self.ncols,
            indptr,
            indices,
            data,
        })
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        self.binop(other, |a, b| a + b)
    }

    /// Sparse matrix product `self · other` (row-by-row accumulation).
    pub fn matmul(&self, other: &Self) -> Result<Self> {
        if self.ncols != other.nrows {
            return Err(SparsityError::shape(format!(
                "cannot multiply shapes {:?} and {:?}",
                self.shape(),
                other.shape()
            )));
        }
        let mut accumulator = vec![T::zero(); other.ncols];
        let mut touched = vec![false; other.ncols];
        let mut pattern: Vec<usize> = Vec::new();
        let mut indptr = Vec::with_capacity(self.nrows + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for r in 0..self.nrows {
            let (acols, avalues) = self.row(r);
            izip!(acols, avalues).for_each(|(&k, &a)| {
                let (bcols, bvalues) = other.row(k);
                izip!(bcols, bvalues).for_each(|(&c, &b)| {
                    if !touched[c] {
                        touched[c] = true;
                        pattern.push(c);
                    }
                    accumulator[c] += a * b;
                });
            });
            pattern.sort_unstable();
            pattern.drain(..).for_each(|c| {
                let v = accumulator[c];
                if v != T::zero() {
                    indices.push(c);
                    data.push(v);
                }
                accumulator[c] = T::zero();
                touched[c] = false;
            });
            indptr.push(data.len());
        }
        Ok(Self {
            nrows: self.nrows,
            ncols: other.ncols,
            indptr,
            indices,
            data,
        })
    }
}
