//! # io
//!
//! external collaborators of the engine.
//!
//! - an [`EventLogReader`] decodes a binary event log into coordinate triples; the engine only
//!   consumes its output (see [`SparseFrame::from_event_log`]).
//! - a persisted vocabulary is a label count followed by its labels, in the label encoding of
//!   [`SparseFrame::save`], stored as [`SparsityConfig::vocabulary_file`] when a directory is
//!   given.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use bytes::Buf;
use uuid::Uuid;

use crate::{
    config::SparsityConfig,
    df::{
        csr::CooMatrix,
        frame::SparseFrame,
        index::Index,
        io::codec::{get_labels, put_labels},
        label::time_from_nanos,
        Label,
    },
    error::{Result, SparsityError},
    toolkit::array::AFloat,
};

/// Unit of the integer timestamps stored in an event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

impl TimeUnit {
    fn nanos_per_unit(&self) -> i64 {
        match self {
            TimeUnit::Seconds => 1_000_000_000,
            TimeUnit::Milliseconds => 1_000_000,
            TimeUnit::Microseconds => 1_000,
            TimeUnit::Nanoseconds => 1,
        }
    }

    /// Convert `ts` (in this unit, since the unix epoch) to a time label.
    pub fn to_label(&self, ts: i64) -> Option<Label> {
        ts.checked_mul(self.nanos_per_unit())
            .and_then(time_from_nanos)
            .map(Label::Time)
    }
}

/// Decoded content of an event log.
///
/// `matrix` must have shape `(uuids.len(), columns.len())`, and `timestamps` must be as long as
/// `uuids`.
#[derive(Debug, Clone)]
pub struct EventLog<T: AFloat> {
    pub uuids: Vec<Uuid>,
    pub timestamps: Vec<i64>,
    pub columns: Vec<Label>,
    pub matrix: CooMatrix<T>,
}

pub trait EventLogReader<T: AFloat>: Send + Sync {
    fn read(&self, path: &Path, field: &str) -> anyhow::Result<EventLog<T>>;
}

impl<T: AFloat> SparseFrame<T> {
    /// Build a frame from an event log, indexed by `(uuid, timestamp)`.
    ///
    /// Without `unit`, timestamps are read in [`SparsityConfig::ts_unit`].
    pub fn from_event_log(
        reader: &dyn EventLogReader<T>,
        path: impl AsRef<Path>,
        field: &str,
        unit: Option<TimeUnit>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let unit = unit.unwrap_or(SparsityConfig::global().ts_unit);
        let log = reader
            .read(path, field)
            .with_context(|| format!("failed to read field '{}' from {}", field, path.display()))?;
        let n = log.uuids.len();
        let expected = (n, log.columns.len());
        if log.matrix.shape() != expected || log.timestamps.len() != n {
            return Err(SparsityError::shape(format!(
                "event log returned a {:?} matrix with {} timestamps, expected {:?}",
                log.matrix.shape(),
                log.timestamps.len(),
                expected
            )));
        }
        let times = log
            .timestamps
            .iter()
            .map(|&ts| {
                unit.to_label(ts).ok_or_else(|| {
                    SparsityError::value(format!("timestamp {} is out of range for {:?}", ts, unit))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let uuids = log.uuids.into_iter().map(Label::Uuid).collect();
        let index = Index::multi(vec![uuids, times], vec!["uuid".into(), "timestamp".into()])?;
        SparseFrame::from_coo(&log.matrix, Some(index), Some(Index::from(log.columns)))
    }
}

fn vocabulary_path(path: &Path, config: &SparsityConfig) -> PathBuf {
    if path.is_dir() {
        path.join(config.vocabulary_file)
    } else {
        path.to_path_buf()
    }
}

/// Load a persisted vocabulary written by [`save_vocabulary`].
pub fn load_vocabulary(
    path: impl AsRef<Path>,
    config: &SparsityConfig,
) -> anyhow::Result<Vec<Label>> {
    let path = vocabulary_path(path.as_ref(), config);
    let bytes = fs::read(&path)
        .with_context(|| format!("failed to read vocabulary from {}", path.display()))?;
    let mut buf = bytes.as_slice();
    let categories = get_labels(&mut buf)
        .with_context(|| format!("failed to decode vocabulary in {}", path.display()))?;
    if buf.has_remaining() {
        anyhow::bail!(
            "{} trailing bytes after the vocabulary in {}",
            buf.remaining(),
            path.display()
        );
    }
    tracing::debug!(path = %path.display(), n = categories.len(), "loaded vocabulary");
    Ok(categories)
}

pub fn save_vocabulary(
    path: impl AsRef<Path>,
    categories: &[Label],
    config: &SparsityConfig,
) -> anyhow::Result<()> {
    let path = vocabulary_path(path.as_ref(), config);
    let mut buf = Vec::new();
    put_labels(&mut buf, categories);
    fs::write(&path, buf)
        .with_context(|| format!("failed to write vocabulary to {}", path.display()))?;
    Ok(())
}
