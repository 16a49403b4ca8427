//! # sparsity_core
//!
//! label-aware sparse data frames.
//!
//! The crate is organized in two layers:
//! - [`df`]: a single-partition [`SparseFrame`] backed by CSR storage, with row/column
//!   [`Index`]es, label-aligned `join`/`add` and matrix-multiplication based `groupby`.
//! - [`partitioned`]: a lazily evaluated [`PartitionedFrame`], which is a task graph of
//!   [`SparseFrame`]s keyed by partition index, together with its `divisions`.
//!
//! [`agg`] holds the aggregation helpers (one-hot encoding and windowed aggregates) and
//! [`io`] the external collaborators (event-log ingestion, persisted vocabularies).

pub mod agg;
pub mod config;
pub mod df;
pub mod error;
pub mod io;
pub mod partitioned;
pub mod toolkit;

pub use config::SparsityConfig;
pub use df::{frame::SparseFrame, index::Index, JoinHow, Label};
pub use error::{Result, SparsityError};
pub use partitioned::{PartitionedFrame, Scheduler, SyncScheduler, ThreadedScheduler};
