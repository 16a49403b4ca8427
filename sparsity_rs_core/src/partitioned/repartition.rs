use super::{
    frame::{boundary_slice_op, single, vstack_op, PartitionedFrame},
    graph::{Key, Layer, PartitionOp, Task},
};
use crate::{
    df::{frame::SparseFrame, Label},
    error::{Result, SparsityError},
    toolkit::{
        array::{interp, linspace, split_sizes, AFloat},
        hash::tokenize,
    },
};

/// Arguments of [`PartitionedFrame::repartition`]; `divisions` wins over `npartitions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepartitionSpec {
    pub npartitions: Option<usize>,
    pub divisions: Option<Vec<Label>>,
    /// allow the new divisions to widen the old ones
    pub force: bool,
}

impl RepartitionSpec {
    pub fn npartitions(npartitions: usize) -> Self {
        Self {
            npartitions: Some(npartitions),
            ..Default::default()
        }
    }

    pub fn divisions(divisions: Vec<Label>) -> Self {
        Self {
            divisions: Some(divisions),
            ..Default::default()
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

fn check_divisions(divisions: &[Label]) -> Result<()> {
    if divisions.len() < 2 {
        return Err(SparsityError::value(
            "new divisions must hold at least two values",
        ));
    }
    if divisions.windows(2).any(|w| w[0] > w[1]) {
        return Err(SparsityError::value("new divisions must be sorted"));
    }
    let interior = &divisions[..divisions.len() - 1];
    if interior.windows(2).any(|w| w[0] == w[1]) {
        return Err(SparsityError::value(
            "new divisions must be unique, except for the last element",
        ));
    }
    Ok(())
}

/// Chunk `chunk` out of `nchunks` nearly equal chunks of consecutive rows.
fn chunk_op<T: AFloat>(nchunks: usize, chunk: usize) -> PartitionOp<T> {
    PartitionOp::new("split_evenly", move |args: &[&SparseFrame<T>]| {
        let frame = single(args)?;
        let sizes = split_sizes(frame.nrows(), nchunks);
        let start: usize = sizes[..chunk].iter().sum();
        frame.iloc_range(start..start + sizes[chunk])
    })
}

impl<T: AFloat> PartitionedFrame<T> {
    pub fn repartition(&self, spec: &RepartitionSpec) -> Result<Self> {
        if let Some(divisions) = spec.divisions.as_ref() {
            return self.repartition_divisions(divisions, spec.force);
        }
        if let Some(npartitions) = spec.npartitions {
            return self.repartition_npartitions(npartitions);
        }
        Err(SparsityError::value(
            "either divisions or npartitions must be supplied",
        ))
    }

    /// Move partition boundaries to `divisions`.
    ///
    /// Every new partition stacks the slices of the old partitions overlapping its range.
    /// Unless `force` is set, the first and last divisions must stay the same; with `force`
    /// they may only widen.
    pub fn repartition_divisions(&self, divisions: &[Label], force: bool) -> Result<Self> {
        check_divisions(divisions)?;
        if !self.known_divisions() {
            return Err(SparsityError::value(
                "cannot repartition along divisions when the current divisions are unknown",
            ));
        }
        let old: Vec<&Label> = self.divisions().iter().flatten().collect();
        let (old_first, old_last) = (old[0], old[old.len() - 1]);
        let (new_first, new_last) = (&divisions[0], &divisions[divisions.len() - 1]);
        if force {
            if new_first > old_first {
                return Err(SparsityError::value(format!(
                    "new divisions must start at or before {}, got {}",
                    old_first, new_first
                )));
            }
            if new_last < old_last {
                return Err(SparsityError::value(format!(
                    "new divisions must end at or after {}, got {}",
                    old_last, new_last
                )));
            }
        } else {
            if new_first != old_first {
                return Err(SparsityError::value(format!(
                    "left side of the new divisions ({}) differs from the old one ({})",
                    new_first, old_first
                )));
            }
            if new_last != old_last {
                return Err(SparsityError::value(format!(
                    "right side of the new divisions ({}) differs from the old one ({})",
                    new_last, old_last
                )));
            }
        }

        let token = tokenize(&[&self.name(), &divisions, &force]);
        let split_name = format!("repartition-split-{}", token);
        let merge_name = format!("repartition-merge-{}", token);
        let (nold, nnew) = (old.len() - 1, divisions.len() - 1);
        let mut split_layer: Layer<T> = Layer::new();
        let mut merge_layer: Layer<T> = Layer::new();
        for j in 0..nnew {
            let (lo, hi) = (&divisions[j], &divisions[j + 1]);
            let last_new = j + 1 == nnew;
            let mut slices: Vec<Key> = Vec::new();
            for i in 0..nold {
                let (old_lo, old_hi) = (old[i], old[i + 1]);
                let starts_before_end = if last_new { old_lo <= hi } else { old_lo < hi };
                let ends_after_start = if i + 1 == nold { lo <= old_hi } else { lo < old_hi };
                if !(starts_before_end && ends_after_start) {
                    continue;
                }
                let key = Key::new(split_name.clone(), split_layer.len());
                let op = boundary_slice_op(Some(lo.clone()), Some(hi.clone()), last_new);
                split_layer.insert(key.index, Task::call(op, [Key::new(self.name(), i)]));
                slices.push(key);
            }
            let task = match slices.len() {
                0 => Task::literal(self.meta().clone()),
                1 => Task::Alias(slices.remove(0)),
                _ => Task::call(vstack_op(), slices),
            };
            merge_layer.insert(j, task);
        }
        tracing::debug!(
            from = nold,
            to = nnew,
            nslices = split_layer.len(),
            "repartition along divisions"
        );
        let graph = self
            .graph()
            .with_layer(split_name, split_layer)
            .with_layer(merge_name.clone(), merge_layer);
        let divisions = divisions.iter().cloned().map(Some).collect();
        Self::new(graph, merge_name, self.meta().clone(), divisions)
    }

    /// Change the number of partitions.
    ///
    /// - fewer: consecutive partitions are stacked, divisions are a subset of the old ones;
    /// - more, with known integer / time divisions: new divisions are interpolated between the
    ///   old ones (see [`PartitionedFrame::repartition_divisions`]);
    /// - more, otherwise: partitions are split into even chunks and divisions become unknown.
    ///   Every partition gets `npartitions / current` chunks and the first
    ///   `npartitions % current` partitions get one more.
    pub fn repartition_npartitions(&self, npartitions: usize) -> Result<Self> {
        if npartitions == 0 {
            return Err(SparsityError::value("npartitions must be positive"));
        }
        let current = self.npartitions();
        if npartitions == current {
            return Ok(self.clone());
        }
        let name = format!(
            "repartition-{}-{}",
            npartitions,
            tokenize(&[&self.name()])
        );
        if npartitions < current {
            let bounds: Vec<usize> = (0..=npartitions)
                .map(|i| i * current / npartitions)
                .collect();
            let layer: Layer<T> = bounds
                .windows(2)
                .enumerate()
                .map(|(j, w)| {
                    let mut keys: Vec<Key> =
                        (w[0]..w[1]).map(|i| Key::new(self.name(), i)).collect();
                    let task = if keys.len() == 1 {
                        Task::Alias(keys.remove(0))
                    } else {
                        Task::call(vstack_op(), keys)
                    };
                    (j, task)
                })
                .collect();
            tracing::debug!(from = current, to = npartitions, "merge partitions");
            let divisions = bounds.iter().map(|&b| self.divisions()[b].clone()).collect();
            let graph = self.graph().with_layer(name.clone(), layer);
            return Self::new(graph, name, self.meta().clone(), divisions);
        }
        if let Some(divisions) = self.interpolate_divisions(npartitions) {
            return self.repartition_divisions(&divisions, false);
        }
        let base = npartitions / current;
        let extra = npartitions % current;
        let mut layer: Layer<T> = Layer::new();
        for i in 0..current {
            let nchunks = base + usize::from(i < extra);
            for chunk in 0..nchunks {
                let task = Task::call(chunk_op(nchunks, chunk), [Key::new(self.name(), i)]);
                layer.insert(layer.len(), task);
            }
        }
        tracing::debug!(from = current, to = npartitions, "split partitions evenly");
        let graph = self.graph().with_layer(name.clone(), layer);
        Self::new(graph, name, self.meta().clone(), vec![None; npartitions + 1])
    }

    /// `npartitions + 1` divisions interpolated between known integer or time divisions.
    ///
    /// Interpolated values are rounded to the nearest label. Interior duplicates (narrow integer
    /// ranges) are collapsed, so fewer divisions may come back; the final division is always
    /// kept, so a repeated last division survives.
    fn interpolate_divisions(&self, npartitions: usize) -> Option<Vec<Label>> {
        if !self.known_divisions() {
            return None;
        }
        let old: Vec<&Label> = self.divisions().iter().flatten().collect();
        let (first, last) = (old[0], old[old.len() - 1]);
        if !old
            .iter()
            .all(|l| l.is_numeric() && l.kind_tag() == first.kind_tag())
        {
            return None;
        }
        let fp = old.iter().map(|l| l.as_f64()).collect::<Option<Vec<_>>>()?;
        let xp = linspace(0., 1., fp.len());
        let x = linspace(0., 1., npartitions + 1);
        let mut divisions = interp(&x, &xp, &fp)
            .into_iter()
            .map(|v| first.with_f64(v))
            .collect::<Option<Vec<_>>>()?;
        let n = divisions.len();
        divisions[0] = first.clone();
        divisions.truncate(n - 1);
        divisions.dedup();
        divisions.push(last.clone());
        if divisions.len() != n {
            tracing::debug!(
                requested = npartitions,
                got = divisions.len() - 1,
                "collapsed duplicate divisions"
            );
        }
        Some(divisions)
    }
}
