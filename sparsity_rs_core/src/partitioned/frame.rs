use std::{fmt, sync::Arc};

use uuid::Uuid;

use super::{
    graph::{layer_name, Key, Layer, PartitionOp, Task, TaskGraph},
    scheduler::Scheduler,
};
use crate::{
    df::{frame::SparseFrame, Label},
    error::{Result, SparsityError},
    toolkit::{
        array::{split_sizes, AFloat},
        hash::{Tokenize, Tokenizer},
    },
};

const REPR_COLUMNS: usize = 25;

#[derive(Debug, Clone)]
pub struct PartitionedFrame<T: AFloat = f64> {
    graph: TaskGraph<T>,
    name: String,
    meta: SparseFrame<T>,
    divisions: Vec<Option<Label>>,
}

/// The only frame passed to a single-input task.
pub(crate) fn single<'a, T: AFloat>(args: &[&'a SparseFrame<T>]) -> Result<&'a SparseFrame<T>> {
    match args {
        [frame] => Ok(*frame),
        _ => Err(SparsityError::assertion(format!(
            "expected one input frame, got {}",
            args.len()
        ))),
    }
}

pub(crate) fn vstack_op<T: AFloat>() -> PartitionOp<T> {
    PartitionOp::new("vstack", |args: &[&SparseFrame<T>]| {
        let frames: Vec<SparseFrame<T>> = args.iter().map(|&f| f.clone()).collect();
        SparseFrame::vstack(&frames)
    })
}

pub(crate) fn boundary_slice_op<T: AFloat>(
    lo: Option<Label>,
    hi: Option<Label>,
    right_inclusive: bool,
) -> PartitionOp<T> {
    PartitionOp::new("boundary_slice", move |args: &[&SparseFrame<T>]| {
        single(args)?.boundary_slice(lo.as_ref(), hi.as_ref(), right_inclusive)
    })
}

/// A zero-row frame with the columns of `frame`.
fn make_meta<T: AFloat>(frame: SparseFrame<T>) -> Result<SparseFrame<T>> {
    if frame.nrows() == 0 {
        Ok(frame)
    } else {
        frame.iloc_range(0..0)
    }
}

/// Row positions splitting sorted `labels` into at most `k` chunks, never inside a run of equal
/// labels.
fn sorted_boundaries(labels: &[Label], k: usize) -> Vec<usize> {
    let n = labels.len();
    let mut bounds = vec![0];
    let mut end = 0;
    for size in split_sizes(n, k) {
        end += size;
        let mut b = end;
        while b > 0 && b < n && labels[b - 1] == labels[b] {
            b += 1;
        }
        if b < n && bounds.last().map_or(true, |&last| b > last) {
            bounds.push(b);
        }
    }
    bounds.push(n);
    bounds
}

/// Keep the columns of `meta` on a partition result.
///
/// A result without stored values becomes `meta`; a result of the same width but other column
/// labels is relabelled.
fn enforce_meta<T: AFloat>(frame: SparseFrame<T>, meta: &SparseFrame<T>) -> Result<SparseFrame<T>> {
    if frame.nnz() == 0 {
        return Ok(meta.clone());
    }
    if frame.columns() == meta.columns() || frame.ncols() != meta.ncols() {
        Ok(frame)
    } else {
        frame.with_columns(meta.columns().clone())
    }
}

/// Stack the non-empty partition results; all empty gives `meta`.
pub fn finalize<T: AFloat>(
    partitions: Vec<SparseFrame<T>>,
    meta: &SparseFrame<T>,
) -> Result<SparseFrame<T>> {
    let non_empty: Vec<SparseFrame<T>> = partitions.into_iter().filter(|p| p.nrows() > 0).collect();
    if non_empty.is_empty() {
        return Ok(meta.clone());
    }
    SparseFrame::vstack(&non_empty)
}

impl<T: AFloat> PartitionedFrame<T> {
    /// Wrap an existing graph; `name` must hold a task for every partition.
    pub fn new(
        graph: TaskGraph<T>,
        name: impl Into<String>,
        meta: SparseFrame<T>,
        divisions: Vec<Option<Label>>,
    ) -> Result<Self> {
        let name = name.into();
        if divisions.len() < 2 {
            return Err(SparsityError::value(format!(
                "divisions must hold at least two values, got {}",
                divisions.len()
            )));
        }
        if let Some(missing) = (0..divisions.len() - 1)
            .map(|i| Key::new(name.clone(), i))
            .find(|key| !graph.contains(key))
        {
            return Err(SparsityError::key(format!(
                "partition {} is not in the graph",
                missing
            )));
        }
        Ok(Self {
            graph,
            name,
            meta: make_meta(meta)?,
            divisions,
        })
    }

    /// Split a materialized frame into `npartitions` partitions.
    ///
    /// With `sort`, rows are sorted by label first and the divisions are known; partitions may
    /// then be fewer than requested, since a run of equal labels is never split.
    pub fn from_frame(frame: &SparseFrame<T>, npartitions: usize, sort: bool) -> Result<Self> {
        if npartitions == 0 {
            return Err(SparsityError::value("npartitions must be positive"));
        }
        let name = layer_name("from_frame", &[frame, &npartitions, &sort]);
        let (parts, divisions) = if sort {
            let sorted = frame.sort_index()?;
            let labels = sorted.index().to_labels();
            let bounds = sorted_boundaries(&labels, npartitions);
            let parts = bounds
                .windows(2)
                .map(|w| sorted.iloc_range(w[0]..w[1]))
                .collect::<Result<Vec<_>>>()?;
            let divisions = match labels.last() {
                None => vec![None, None],
                Some(last) => bounds[..bounds.len() - 1]
                    .iter()
                    .map(|&b| Some(labels[b].clone()))
                    .chain([Some(last.clone())])
                    .collect(),
            };
            (parts, divisions)
        } else {
            let parts = frame.split_evenly(npartitions)?;
            let divisions = vec![None; parts.len() + 1];
            (parts, divisions)
        };
        tracing::debug!(%name, npartitions = parts.len(), sort, "partitioned frame");
        let layer: Layer<T> = parts
            .into_iter()
            .enumerate()
            .map(|(i, part)| (i, Task::literal(part)))
            .collect();
        let graph = TaskGraph::new().with_layer(name.clone(), layer);
        Self::new(graph, name, frame.clone(), divisions)
    }

    /// Wrap frames that are already split; divisions default to unknown.
    pub fn from_partitions(
        frames: Vec<SparseFrame<T>>,
        divisions: Option<Vec<Option<Label>>>,
    ) -> Result<Self> {
        let Some(first) = frames.first() else {
            return Err(SparsityError::value("no partitions given"));
        };
        let meta = first.iloc_range(0..0)?;
        let divisions = divisions.unwrap_or_else(|| vec![None; frames.len() + 1]);
        if divisions.len() != frames.len() + 1 {
            return Err(SparsityError::value(format!(
                "{} partitions need {} divisions, got {}",
                frames.len(),
                frames.len() + 1,
                divisions.len()
            )));
        }
        let name = layer_name("from_partitions", &[&frames, &divisions]);
        let layer: Layer<T> = frames
            .into_iter()
            .enumerate()
            .map(|(i, part)| (i, Task::literal(part)))
            .collect();
        let graph = TaskGraph::new().with_layer(name.clone(), layer);
        Self::new(graph, name, meta, divisions)
    }

    pub fn graph(&self) -> &TaskGraph<T> {
        &self.graph
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The zero-row frame describing the columns.
    pub fn meta(&self) -> &SparseFrame<T> {
        &self.meta
    }

    pub fn divisions(&self) -> &[Option<Label>] {
        &self.divisions
    }

    pub fn npartitions(&self) -> usize {
        self.divisions.len() - 1
    }

    /// `true` when every division is set and they are sorted.
    pub fn known_divisions(&self) -> bool {
        self.divisions.iter().all(Option::is_some)
            && self.divisions.windows(2).all(|w| w[0] <= w[1])
    }

    pub fn keys(&self) -> Vec<Key> {
        (0..self.npartitions())
            .map(|i| Key::new(self.name.clone(), i))
            .collect()
    }

    /// The part of the graph needed to compute this frame.
    pub fn optimize(&self) -> Result<TaskGraph<T>> {
        self.graph.cull(&self.keys())
    }

    /// Apply `func` to every partition.
    ///
    /// Without `meta`, the output columns are inferred by running `func` on the current meta.
    /// Closures cannot be hashed, so every call gets its own layer even for the same `name`.
    pub fn map_partitions<F>(
        &self,
        name: &str,
        func: F,
        meta: Option<SparseFrame<T>>,
    ) -> Result<Self>
    where
        F: Fn(&SparseFrame<T>) -> Result<SparseFrame<T>> + Send + Sync + 'static,
    {
        let meta = match meta {
            Some(meta) => make_meta(meta)?,
            None => make_meta(func(&self.meta)?)?,
        };
        let call = Label::Uuid(Uuid::new_v4());
        let new_name = layer_name(name, &[&self.name, &meta, &call]);
        let task_meta = meta.clone();
        let op = PartitionOp::new(name, move |args: &[&SparseFrame<T>]| {
            enforce_meta(func(single(args)?)?, &task_meta)
        });
        let layer: Layer<T> = self
            .keys()
            .into_iter()
            .enumerate()
            .map(|(i, key)| (i, Task::call(op.clone(), [key])))
            .collect();
        tracing::debug!(name = %new_name, npartitions = layer.len(), "map_partitions");
        let graph = self.graph.with_layer(new_name.clone(), layer);
        Self::new(graph, new_name, meta, self.divisions.clone())
    }

    /// Rows with labels in the inclusive range `[start, end]`.
    ///
    /// With known divisions only the overlapping partitions are kept.
    pub fn loc(&self, start: Option<&Label>, end: Option<&Label>) -> Result<Self> {
        let start = start.cloned();
        let end = end.cloned();
        let new_name = layer_name("loc", &[&self.name, &start, &end]);
        let (selected, divisions) = if self.known_divisions() {
            let bounds: Vec<&Label> = self.divisions.iter().flatten().collect();
            let n = self.npartitions();
            let selected: Vec<usize> = (0..n)
                .filter(|&i| {
                    let starts_before_end = end.as_ref().map_or(true, |e| bounds[i] <= e);
                    let ends_after_start = start.as_ref().map_or(true, |s| {
                        if i + 1 == n {
                            s <= bounds[i + 1]
                        } else {
                            s < bounds[i + 1]
                        }
                    });
                    starts_before_end && ends_after_start
                })
                .collect();
            match (selected.first(), selected.last()) {
                (Some(&lo), Some(&hi)) => {
                    let mut divisions: Vec<Option<Label>> =
                        bounds[lo..=hi + 1].iter().map(|&b| Some(b.clone())).collect();
                    let last = divisions.len() - 1;
                    if let Some(s) = start.as_ref().filter(|&s| s > bounds[lo]) {
                        divisions[0] = Some(s.clone());
                    }
                    if let Some(e) = end.as_ref().filter(|&e| e < bounds[hi + 1]) {
                        divisions[last] = Some(e.clone());
                    }
                    (selected, divisions)
                }
                _ => (vec![0], vec![None, None]),
            }
        } else {
            ((0..self.npartitions()).collect(), self.divisions.clone())
        };
        let op = boundary_slice_op(start, end, true);
        let layer: Layer<T> = selected
            .iter()
            .enumerate()
            .map(|(j, &i)| (j, Task::call(op.clone(), [Key::new(self.name.clone(), i)])))
            .collect();
        let graph = self.graph.with_layer(new_name.clone(), layer);
        Self::new(graph, new_name, self.meta.clone(), divisions)
    }

    /// Every partition, computed.
    pub fn partitions<S: Scheduler>(&self, scheduler: &S) -> Result<Vec<SparseFrame<T>>> {
        let graph = self.optimize()?;
        let values = scheduler.get(&graph, &self.keys())?;
        Ok(values
            .into_iter()
            .map(|value| Arc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone()))
            .collect())
    }

    /// Compute every partition and stack them into one frame.
    pub fn compute<S: Scheduler>(&self, scheduler: &S) -> Result<SparseFrame<T>> {
        finalize(self.partitions(scheduler)?, &self.meta)
    }
}

impl<T: AFloat> Tokenize for PartitionedFrame<T> {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        self.name.tokenize(tokenizer)
    }
}

fn join_labels<'a>(labels: impl Iterator<Item = &'a Label>) -> String {
    labels.map(|l| l.to_string()).collect::<Vec<_>>().join(", ")
}

impl<T: AFloat> fmt::Display for PartitionedFrame<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Partitioned SparseFrame Structure:")?;
        writeln!(f, "npartitions={}", self.npartitions())?;
        let divisions = if self.known_divisions() {
            join_labels(self.divisions.iter().flatten())
        } else {
            vec!["None"; self.divisions.len()].join(", ")
        };
        writeln!(f, "divisions: ({})", divisions)?;
        let columns = self.meta.columns().to_labels();
        let columns = if columns.len() > 2 * REPR_COLUMNS {
            format!(
                "{}, ..., {}",
                join_labels(columns[..REPR_COLUMNS].iter()),
                join_labels(columns[columns.len() - REPR_COLUMNS..].iter())
            )
        } else {
            join_labels(columns.iter())
        };
        writeln!(f, "columns: [{}]", columns)?;
        write!(f, "Name: {}, {} tasks", self.name, self.graph.len())
    }
}
