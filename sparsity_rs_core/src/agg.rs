//! # agg
//!
//! aggregation helpers turning raw, time-indexed event tables into sparse frames.
//!
//! The typical flow is: slice a time window out of [`EventPartitions`], one-hot encode a
//! categorical column of every partition, sum the rows of each identifier, then merge the
//! per-partition results with one final `groupby` (see [`sparse_aggregate`]).

use std::{
    collections::{BTreeSet, HashMap},
    path::PathBuf,
};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rayon::prelude::*;

use crate::{
    config::SparsityConfig,
    df::{csr::CooMatrix, frame::GroupKey, frame::SparseFrame, index::Index, Label},
    error::{Result, SparsityError},
    io::load_vocabulary,
    toolkit::array::{split_sizes, AFloat},
};

/// One-hot encode `values` against a fixed vocabulary.
///
/// Row `i` holds a single `1` in the column of `values[i]`. Values outside of `categories` are
/// an error naming them.
pub fn one_hot<T: AFloat>(values: &[Label], categories: &[Label]) -> Result<CooMatrix<T>> {
    let mut codes: HashMap<&Label, usize> = HashMap::with_capacity(categories.len());
    for (i, category) in categories.iter().enumerate() {
        codes.entry(category).or_insert(i);
    }
    let mut unknown: BTreeSet<&Label> = BTreeSet::new();
    let cols: Vec<usize> = values
        .iter()
        .filter_map(|value| {
            let code = codes.get(value).copied();
            if code.is_none() {
                unknown.insert(value);
            }
            code
        })
        .collect();
    if !unknown.is_empty() {
        let names: Vec<String> = unknown.iter().map(|l| l.to_string()).collect();
        return Err(SparsityError::value(format!(
            "unknown categorical features present [{}] during transform",
            names.join(", ")
        )));
    }
    let n = values.len();
    CooMatrix::new(
        (n, categories.len()),
        (0..n).collect(),
        cols,
        vec![T::one(); n],
    )
}

/// A raw event table: one timestamp per row plus named label columns.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    time: Vec<NaiveDateTime>,
    columns: Vec<(String, Vec<Label>)>,
}

impl EventFrame {
    pub fn new(time: Vec<NaiveDateTime>, columns: Vec<(String, Vec<Label>)>) -> Result<Self> {
        if let Some((name, values)) = columns.iter().find(|(_, v)| v.len() != time.len()) {
            return Err(SparsityError::shape(format!(
                "column '{}' has {} values but there are {} timestamps",
                name,
                values.len(),
                time.len()
            )));
        }
        Ok(Self { time, columns })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn time(&self) -> &[NaiveDateTime] {
        &self.time
    }

    pub fn column(&self, name: &str) -> Result<&[Label]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
            .ok_or_else(|| SparsityError::key(format!("no column named '{}'", name)))
    }

    fn take(&self, positions: &[usize]) -> Self {
        Self {
            time: positions.iter().map(|&i| self.time[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(name, values)| {
                    (
                        name.clone(),
                        positions.iter().map(|&i| values[i].clone()).collect(),
                    )
                })
                .collect(),
        }
    }

    /// Rows with a timestamp in `[start, end]`.
    pub fn time_slice(&self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let positions: Vec<usize> = (0..self.len())
            .filter(|&i| start <= self.time[i] && self.time[i] <= end)
            .collect();
        self.take(&positions)
    }
}

/// Time-ordered partitions of an event table.
///
/// `divisions[i]` is the first timestamp of partition `i` and the last division is the last
/// timestamp of the last partition.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPartitions {
    partitions: Vec<EventFrame>,
    divisions: Vec<NaiveDateTime>,
}

impl EventPartitions {
    pub fn new(partitions: Vec<EventFrame>, divisions: Vec<NaiveDateTime>) -> Result<Self> {
        let consistent = if partitions.is_empty() {
            divisions.is_empty()
        } else {
            divisions.len() == partitions.len() + 1
        };
        if !consistent {
            return Err(SparsityError::value(format!(
                "{} partitions cannot have {} divisions",
                partitions.len(),
                divisions.len()
            )));
        }
        if divisions.windows(2).any(|w| w[0] > w[1]) {
            return Err(SparsityError::value("divisions must be sorted"));
        }
        Ok(Self {
            partitions,
            divisions,
        })
    }

    /// Sort `frame` by time and split it into `npartitions` chunks.
    pub fn from_frame(frame: &EventFrame, npartitions: usize) -> Result<Self> {
        if npartitions == 0 {
            return Err(SparsityError::value("npartitions must be positive"));
        }
        if frame.is_empty() {
            return Self::new(Vec::new(), Vec::new());
        }
        let mut order: Vec<usize> = (0..frame.len()).collect();
        order.sort_by_key(|&i| frame.time[i]);
        let sorted = frame.take(&order);
        let mut partitions = Vec::with_capacity(npartitions);
        let mut start = 0;
        for size in split_sizes(sorted.len(), npartitions) {
            if size > 0 {
                let positions: Vec<usize> = (start..start + size).collect();
                partitions.push(sorted.take(&positions));
            }
            start += size;
        }
        let mut divisions: Vec<NaiveDateTime> = partitions.iter().map(|p| p.time[0]).collect();
        divisions.extend(sorted.time.last().copied());
        Self::new(partitions, divisions)
    }

    pub fn partitions(&self) -> &[EventFrame] {
        &self.partitions
    }

    pub fn divisions(&self) -> &[NaiveDateTime] {
        &self.divisions
    }

    pub fn npartitions(&self) -> usize {
        self.partitions.len()
    }

    /// Rows with a timestamp in `[start, end]`, keeping only the overlapping partitions.
    pub fn time_slice(&self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let selected: Vec<usize> = (0..self.npartitions())
            .filter(|&i| self.divisions[i] <= end && start <= self.divisions[i + 1])
            .collect();
        let (Some(&first), Some(&last)) = (selected.first(), selected.last()) else {
            return Self {
                partitions: Vec::new(),
                divisions: Vec::new(),
            };
        };
        let partitions = selected
            .iter()
            .map(|&i| self.partitions[i].time_slice(start, end))
            .collect();
        let mut divisions = self.divisions[first..=last + 1].to_vec();
        let n = divisions.len();
        divisions[0] = divisions[0].max(start);
        divisions[n - 1] = divisions[n - 1].min(end);
        Self {
            partitions,
            divisions,
        }
    }
}

/// Vocabulary used by [`sparse_aggregate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Categories {
    Inline(Vec<Label>),
    /// a persisted vocabulary, see [`load_vocabulary`]
    Path(PathBuf),
}

impl Categories {
    pub fn resolve(&self, config: &SparsityConfig) -> Result<Vec<Label>> {
        match self {
            Categories::Inline(categories) => Ok(categories.clone()),
            Categories::Path(path) => Ok(load_vocabulary(path, config)?),
        }
    }
}

/// One-hot encode `categorical_col` and sum the rows of every `id_col` value.
fn bag_partition<T: AFloat>(
    partition: &EventFrame,
    id_col: &str,
    categorical_col: &str,
    categories: &[Label],
    columns: &Index,
) -> Result<SparseFrame<T>> {
    let encoded = one_hot(partition.column(categorical_col)?, categories)?;
    let ids = Index::from(partition.column(id_col)?.to_vec());
    SparseFrame::from_coo(&encoded, Some(ids), Some(columns.clone()))?.groupby(GroupKey::Index)
}

/// Per-identifier category counts over a window of days before `slice_date`.
///
/// The window is `[slice_date - agg_bin.1 days, slice_date - agg_bin.0 days]` (midnight to
/// midnight, both ends included). Partitions are processed in parallel; identifiers seen in
/// several partitions are merged by a final `groupby`.
pub fn sparse_aggregate<T: AFloat>(
    raw: &EventPartitions,
    slice_date: NaiveDate,
    agg_bin: (i64, i64),
    categories: &Categories,
    id_col: &str,
    categorical_col: &str,
) -> Result<SparseFrame<T>> {
    let config = SparsityConfig::global();
    let reference = slice_date.and_time(chrono::NaiveTime::MIN);
    let start = reference - Duration::days(agg_bin.1);
    let end = reference - Duration::days(agg_bin.0);
    let sliced = raw.time_slice(start, end);
    let categories = categories.resolve(config)?;
    let columns = Index::from(categories.clone());
    tracing::debug!(
        %start,
        %end,
        npartitions = sliced.npartitions(),
        ncategories = categories.len(),
        "sparse aggregate"
    );
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .build()
        .map_err(anyhow::Error::from)?;
    let bagged: Vec<SparseFrame<T>> = pool.install(|| {
        sliced
            .partitions()
            .par_iter()
            .filter(|partition| !partition.is_empty())
            .map(|partition| {
                bag_partition(partition, id_col, categorical_col, &categories, &columns)
            })
            .collect::<Result<Vec<_>>>()
    })?;
    if bagged.is_empty() {
        return Ok(SparseFrame::empty(columns));
    }
    SparseFrame::vstack(&bagged)?.groupby(GroupKey::Index)
}
