//! # df
//!
//! a sparse DataFrame module: CSR storage plus row / column label indexes.
//!
//! Every [`frame::SparseFrame`] keeps one extra all-zero row below its logical rows.
//! Alignment operations map "no match on this side" to that row, so gathering an
//! unmatched label simply yields zeros instead of needing a special case.

pub mod csr;
pub mod frame;
pub mod index;
pub mod io;
pub(crate) mod label;

pub use label::Label;

/// How two label indexes are combined by [`index::Index::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinHow {
    /// keep the left labels, in left order
    Left,
    /// keep the right labels, in right order
    Right,
    /// keep labels present on both sides, in left order
    Inner,
    /// keep every label, sorted
    Outer,
}

impl JoinHow {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinHow::Left => "left",
            JoinHow::Right => "right",
            JoinHow::Inner => "inner",
            JoinHow::Outer => "outer",
        }
    }
}
