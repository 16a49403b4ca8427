//! # partitioned
//!
//! a lazily evaluated frame made of many [`SparseFrame`](crate::SparseFrame) partitions.
//!
//! A [`PartitionedFrame`] is a [`graph::TaskGraph`], the name of the layer holding its
//! partitions, an empty `meta` frame describing its columns, and `npartitions + 1` divisions.
//! Building a frame never computes anything; [`PartitionedFrame::compute`] hands the graph to a
//! [`Scheduler`].

mod elemwise;
mod frame;
pub mod graph;
mod repartition;
pub mod scheduler;

pub use elemwise::{elemwise, AssignValue, ElemwiseArg, Operand};
pub use frame::{finalize, PartitionedFrame};
pub use repartition::RepartitionSpec;
pub use scheduler::{Scheduler, SyncScheduler, ThreadedScheduler};
