//! # partitioned/elemwise
//!
//! partition-wise application of an operation over several arguments.
//!
//! Arguments are resolved once into a plan:
//! - aligned frames contribute their `i`-th partition to the `i`-th task;
//! - a broadcast frame (one partition, divisions equal to the min / max column label of another
//!   frame) contributes its only partition to every task;
//! - scalars are handed to every task as they are.

use uuid::Uuid;

use super::{
    frame::PartitionedFrame,
    graph::{layer_name, Key, Layer, PartitionOp, Task, TaskGraph},
};
use crate::{
    df::{frame::SparseFrame, Label},
    error::{Result, SparsityError},
    toolkit::array::AFloat,
};

#[derive(Debug, Clone)]
pub enum ElemwiseArg<T: AFloat> {
    Frame(PartitionedFrame<T>),
    Scalar(T),
}

/// What the operation receives for each [`ElemwiseArg`], in the same order.
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a, T: AFloat> {
    Frame(&'a SparseFrame<T>),
    Scalar(T),
}

impl<'a, T: AFloat> Operand<'a, T> {
    pub fn frame(&self) -> Result<&'a SparseFrame<T>> {
        match *self {
            Operand::Frame(frame) => Ok(frame),
            Operand::Scalar(v) => Err(SparsityError::value(format!(
                "expected a frame, got scalar {}",
                v
            ))),
        }
    }

    pub fn scalar(&self) -> Result<T> {
        match *self {
            Operand::Scalar(v) => Ok(v),
            Operand::Frame(_) => Err(SparsityError::value("expected a scalar, got a frame")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot<T> {
    Aligned,
    Broadcast,
    Constant(T),
}

/// Zip the frames handed to a task back with the constants of the plan.
fn operands<'a, T: AFloat>(
    slots: &[Slot<T>],
    frames: &[&'a SparseFrame<T>],
) -> Result<Vec<Operand<'a, T>>> {
    let mut frames = frames.iter();
    slots
        .iter()
        .map(|slot| match slot {
            Slot::Constant(v) => Ok(Operand::Scalar(*v)),
            Slot::Aligned | Slot::Broadcast => frames
                .next()
                .map(|&frame| Operand::Frame(frame))
                .ok_or_else(|| SparsityError::assertion("task received fewer frames than planned")),
        })
        .collect()
}

/// `frame` has one partition spanning exactly the column labels of one of `others`.
fn is_broadcastable<T: AFloat>(
    frame: &PartitionedFrame<T>,
    others: &[&PartitionedFrame<T>],
) -> bool {
    if frame.npartitions() != 1 || !frame.known_divisions() {
        return false;
    }
    others.iter().any(|other| {
        let columns = other.meta().columns().to_labels();
        let span: Vec<Option<Label>> =
            vec![columns.iter().min().cloned(), columns.iter().max().cloned()];
        !columns.is_empty() && frame.divisions() == span.as_slice()
    })
}

fn fingerprint<T: AFloat>(arg: &ElemwiseArg<T>) -> String {
    match arg {
        ElemwiseArg::Frame(frame) => frame.name().to_string(),
        ElemwiseArg::Scalar(v) => format!("scalar:{}", v),
    }
}

/// Apply `op` partition by partition.
///
/// Two or more aligned frames must share identical, known divisions. Without `meta`, the output
/// columns are inferred by running `op` on the metas of the frames. Every call builds a new
/// layer, since `op` itself takes no part in the layer name.
pub fn elemwise<T, F>(
    name: &str,
    op: F,
    args: Vec<ElemwiseArg<T>>,
    meta: Option<SparseFrame<T>>,
) -> Result<PartitionedFrame<T>>
where
    T: AFloat,
    F: Fn(&[Operand<'_, T>]) -> Result<SparseFrame<T>> + Send + Sync + 'static,
{
    let frames: Vec<&PartitionedFrame<T>> = args
        .iter()
        .filter_map(|arg| match arg {
            ElemwiseArg::Frame(frame) => Some(frame),
            ElemwiseArg::Scalar(_) => None,
        })
        .collect();
    if frames.is_empty() {
        return Err(SparsityError::value(
            "elementwise operations need at least one partitioned frame",
        ));
    }
    let mut broadcast: Vec<bool> = frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            let others: Vec<&PartitionedFrame<T>> = frames
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, &other)| other)
                .collect();
            is_broadcastable(frame, &others)
        })
        .collect();
    if broadcast.iter().all(|&b| b) {
        broadcast[0] = false;
    }
    let aligned: Vec<&PartitionedFrame<T>> = frames
        .iter()
        .zip(broadcast.iter())
        .filter(|&(_, &b)| !b)
        .map(|(&frame, _)| frame)
        .collect();
    let divisions = aligned[0].divisions().to_vec();
    if aligned.len() >= 2 {
        if let Some(unknown) = aligned.iter().find(|f| !f.known_divisions()) {
            return Err(SparsityError::value(format!(
                "{} has unknown divisions; elementwise operations over several frames need \
                 known divisions",
                unknown.name()
            )));
        }
        if aligned.iter().any(|f| f.divisions() != divisions.as_slice()) {
            return Err(SparsityError::value(
                "frames are partitioned differently, repartition them along the same divisions \
                 first",
            ));
        }
    }

    let mut flags = broadcast.iter();
    let slots: Vec<Slot<T>> = args
        .iter()
        .map(|arg| match arg {
            ElemwiseArg::Scalar(v) => Slot::Constant(*v),
            ElemwiseArg::Frame(_) => match flags.next() {
                Some(true) => Slot::Broadcast,
                _ => Slot::Aligned,
            },
        })
        .collect();

    let meta = match meta {
        Some(meta) => meta,
        None => {
            let has_constants = slots.iter().any(|s| matches!(s, Slot::Constant(_)));
            if aligned.len() >= 2 && has_constants {
                return Err(SparsityError::not_implemented(
                    "inferring meta of an elementwise operation over two or more frames and \
                     scalars",
                ));
            }
            let metas: Vec<&SparseFrame<T>> = frames.iter().map(|f| f.meta()).collect();
            op(&operands(&slots, &metas)?)?
        }
    };

    let fingerprints: Vec<String> = args.iter().map(fingerprint).collect();
    let call = Label::Uuid(Uuid::new_v4());
    let new_name = layer_name(name, &[&fingerprints, &meta, &call]);
    let npartitions = divisions.len() - 1;
    let task_op = {
        let slots = slots.clone();
        PartitionOp::new(name, move |inputs: &[&SparseFrame<T>]| {
            op(&operands(&slots, inputs)?)
        })
    };
    let layer: Layer<T> = (0..npartitions)
        .map(|i| {
            let keys = frames.iter().zip(broadcast.iter()).map(|(frame, &b)| {
                Key::new(frame.name(), if b { 0 } else { i })
            });
            (i, Task::call(task_op.clone(), keys))
        })
        .collect();
    tracing::debug!(name = %new_name, npartitions, nargs = args.len(), "elemwise");
    let graph = TaskGraph::merge(frames.iter().map(|f| f.graph()))
        .with_layer(new_name.clone(), layer);
    PartitionedFrame::new(graph, new_name, meta, divisions)
}

/// Value of a column assigned with [`PartitionedFrame::assign`].
#[derive(Debug, Clone)]
pub enum AssignValue<T: AFloat> {
    /// the same value on every row
    Scalar(T),
    /// a single-column frame partitioned like the target
    Frame(PartitionedFrame<T>),
    /// an in-memory column; not supported on partitioned frames
    Values(Vec<T>),
}

impl<T: AFloat> PartitionedFrame<T> {
    /// Append a column labelled `key` to every partition.
    ///
    /// An [`AssignValue::Frame`] is copied row by row, so each of its partitions must carry the
    /// same row labels, in the same order, as the matching partition of `self`.
    pub fn assign(&self, key: impl Into<Label>, value: AssignValue<T>) -> Result<Self> {
        let key = key.into();
        let value = match value {
            AssignValue::Scalar(v) => ElemwiseArg::Scalar(v),
            AssignValue::Frame(column) => {
                if column.meta().ncols() != 1 {
                    return Err(SparsityError::not_implemented(format!(
                        "assigning a frame with {} columns",
                        column.meta().ncols()
                    )));
                }
                ElemwiseArg::Frame(column)
            }
            AssignValue::Values(_) => {
                return Err(SparsityError::not_implemented(
                    "assigning an in-memory column to a partitioned frame",
                ))
            }
        };
        let mut meta = self.meta().clone();
        meta.set_column(key.clone(), &[])?;
        elemwise(
            "assign",
            move |operands: &[Operand<'_, T>]| {
                let [target, value] = operands else {
                    return Err(SparsityError::assertion("assign takes two operands"));
                };
                let mut frame = target.frame()?.clone();
                let values = match value {
                    Operand::Scalar(v) => vec![*v; frame.nrows()],
                    Operand::Frame(column) => {
                        if column.ncols() != 1 {
                            return Err(SparsityError::assertion(format!(
                                "expected a single column, got {}",
                                column.ncols()
                            )));
                        }
                        if column.index() != frame.index() {
                            return Err(SparsityError::assertion(
                                "the assigned column must hold the rows of the target partition",
                            ));
                        }
                        column.to_dense().column(0).to_vec()
                    }
                };
                frame.set_column(key.clone(), &values)?;
                Ok(frame)
            },
            vec![ElemwiseArg::Frame(self.clone()), value],
            Some(meta),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{df::index::Index, partitioned::scheduler::SyncScheduler};
    use ndarray::{array, Array2};

    fn eye(n: usize) -> SparseFrame {
        SparseFrame::from_dense(Array2::<f64>::eye(n).view(), None, None).unwrap()
    }

    fn add_op(operands: &[Operand<'_, f64>]) -> Result<SparseFrame> {
        operands[0].frame()?.add(operands[1].frame()?)
    }

    #[test]
    fn test_elemwise_aligned() {
        let a = PartitionedFrame::from_frame(&eye(6), 3, true).unwrap();
        let b = PartitionedFrame::from_frame(&eye(6), 3, true).unwrap();
        let sum = elemwise(
            "add",
            add_op,
            vec![ElemwiseArg::Frame(a.clone()), ElemwiseArg::Frame(b)],
            None,
        )
        .unwrap();
        assert_eq!(sum.npartitions(), 3);
        assert_eq!(sum.divisions(), a.divisions());
        assert_eq!(sum.meta().shape(), (0, 6));
        let computed = sum.compute(&SyncScheduler).unwrap();
        assert_eq!(computed.to_dense(), Array2::<f64>::eye(6) * 2.);
    }

    #[test]
    fn test_elemwise_rejects_misaligned_frames() {
        let a = PartitionedFrame::from_frame(&eye(6), 3, true).unwrap();
        let b = PartitionedFrame::from_frame(&eye(6), 2, true).unwrap();
        let err = elemwise(
            "add",
            add_op,
            vec![ElemwiseArg::Frame(a.clone()), ElemwiseArg::Frame(b)],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SparsityError::Value(_)));

        let unknown = PartitionedFrame::from_frame(&eye(6), 3, false).unwrap();
        let split = unknown.repartition_npartitions(3).unwrap();
        let err = elemwise(
            "add",
            add_op,
            vec![ElemwiseArg::Frame(unknown), ElemwiseArg::Frame(split)],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SparsityError::Value(_)));
    }

    #[test]
    fn test_elemwise_broadcast() {
        let columns: Index = (10..13).collect();
        let target = SparseFrame::from_dense(
            array![[1., 0., 0.], [0., 2., 0.], [0., 0., 3.], [1., 1., 1.]].view(),
            None,
            Some(columns.clone()),
        )
        .unwrap();
        let target = PartitionedFrame::from_frame(&target, 2, true).unwrap();
        let weights = SparseFrame::from_dense(
            array![[2.], [3.], [4.]].view(),
            Some(columns),
            None,
        )
        .unwrap();
        let weights = PartitionedFrame::from_frame(&weights, 1, true).unwrap();
        assert_eq!(weights.divisions(), &[Some(Label::Int(10)), Some(Label::Int(12))]);

        let scaled = elemwise(
            "scale",
            |operands: &[Operand<'_, f64>]| {
                let frame = operands[0].frame()?;
                let weights = operands[1].frame()?.to_dense();
                let dense = frame.to_dense() * &weights.column(0);
                SparseFrame::from_dense(
                    dense.view(),
                    Some(frame.index().clone()),
                    Some(frame.columns().clone()),
                )
            },
            vec![ElemwiseArg::Frame(target.clone()), ElemwiseArg::Frame(weights.clone())],
            Some(SparseFrame::empty((10..13).collect())),
        )
        .unwrap();
        assert_eq!(scaled.npartitions(), 2);
        let layer = scaled.graph().layer(scaled.name()).unwrap();
        assert!(layer
            .values()
            .all(|task| task.dependencies().contains(&&Key::new(weights.name(), 0))));
        let computed = scaled.compute(&SyncScheduler).unwrap();
        assert_eq!(
            computed.to_dense(),
            array![[2., 0., 0.], [0., 6., 0.], [0., 0., 12.], [2., 3., 4.]]
        );
    }

    #[test]
    fn test_elemwise_with_scalar() {
        let pf = PartitionedFrame::from_frame(&eye(4), 2, true).unwrap();
        let scaled = elemwise(
            "mul",
            |operands: &[Operand<'_, f64>]| {
                let frame = operands[0].frame()?;
                let factor = operands[1].scalar()?;
                let dense = frame.to_dense() * factor;
                SparseFrame::from_dense(dense.view(), Some(frame.index().clone()), None)
            },
            vec![ElemwiseArg::Frame(pf), ElemwiseArg::Scalar(3.)],
            None,
        )
        .unwrap();
        assert_eq!(
            scaled.compute(&SyncScheduler).unwrap().to_dense(),
            Array2::<f64>::eye(4) * 3.
        );
        assert!(elemwise("noop", add_op, vec![ElemwiseArg::Scalar(1.)], None).is_err());
    }

    #[test]
    fn test_assign() {
        let pf = PartitionedFrame::from_frame(&eye(4), 2, true).unwrap();
        let assigned = pf.assign("flag", AssignValue::Scalar(1.)).unwrap();
        assert_eq!(assigned.meta().ncols(), 5);
        let computed = assigned.compute(&SyncScheduler).unwrap();
        assert_eq!(computed.columns().get(4), Some(Label::from("flag")));
        assert_eq!(computed.to_dense().column(4).to_vec(), vec![1.; 4]);

        let column =
            SparseFrame::from_dense(array![[5.], [0.], [7.], [8.]].view(), None, None).unwrap();
        let column = PartitionedFrame::from_frame(&column, 2, true).unwrap();
        let assigned = pf.assign("score", AssignValue::Frame(column)).unwrap();
        let computed = assigned.compute(&SyncScheduler).unwrap();
        assert_eq!(computed.to_dense().column(4).to_vec(), vec![5., 0., 7., 8.]);

        assert!(matches!(
            pf.assign("bad", AssignValue::Values(vec![1.; 4])),
            Err(SparsityError::NotImplemented(_))
        ));
        assert!(matches!(
            pf.assign("bad", AssignValue::Frame(pf.clone())),
            Err(SparsityError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_assign_rejects_rows_out_of_order() {
        let pf = PartitionedFrame::from_frame(&eye(4), 2, true).unwrap();
        let parts = vec![
            SparseFrame::from_dense(array![[5.], [0.]].view(), Some(Index::from_iter([0, 1])), None)
                .unwrap(),
            SparseFrame::from_dense(array![[7.], [8.]].view(), Some(Index::from_iter([3, 2])), None)
                .unwrap(),
        ];
        let column =
            PartitionedFrame::from_partitions(parts, Some(pf.divisions().to_vec())).unwrap();
        let assigned = pf.assign("score", AssignValue::Frame(column)).unwrap();
        match assigned.compute(&SyncScheduler) {
            Err(SparsityError::Task { source, .. }) => {
                assert!(matches!(*source, SparsityError::Assertion(_)))
            }
            other => panic!("expected a task failure, got {:?}", other),
        }
    }

    #[test]
    fn test_same_name_with_other_ops_builds_distinct_layers() {
        let pf = PartitionedFrame::from_frame(&eye(4), 2, true).unwrap();
        let doubled = pf
            .map_partitions("scale", |sf: &SparseFrame| sf.add(sf), None)
            .unwrap();
        let kept = pf
            .map_partitions("scale", |sf: &SparseFrame| Ok(sf.clone()), None)
            .unwrap();
        assert_ne!(doubled.name(), kept.name());

        let scale = |factor: f64| {
            move |operands: &[Operand<'_, f64>]| {
                let frame = operands[0].frame()?;
                let dense = frame.to_dense() * factor;
                SparseFrame::from_dense(dense.view(), Some(frame.index().clone()), None)
            }
        };
        let tripled = elemwise("scale", scale(3.), vec![ElemwiseArg::Frame(pf.clone())], None)
            .unwrap();
        let halved = elemwise("scale", scale(0.5), vec![ElemwiseArg::Frame(pf)], None).unwrap();
        assert_ne!(tripled.name(), halved.name());

        let sum = elemwise(
            "add",
            add_op,
            vec![ElemwiseArg::Frame(doubled), ElemwiseArg::Frame(kept)],
            None,
        )
        .unwrap();
        let computed = sum.compute(&SyncScheduler).unwrap();
        assert_eq!(computed.to_dense(), Array2::<f64>::eye(4) * 3.);
        assert_eq!(
            halved.compute(&SyncScheduler).unwrap().to_dense(),
            Array2::<f64>::eye(4) * 0.5
        );
    }
}
