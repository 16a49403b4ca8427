use thiserror::Error;

use crate::partitioned::graph::Key;

#[derive(Error, Debug)]
pub enum SparsityError {
    /// input data does not have the expected dimensionality / shape
    #[error("shape error: {0}")]
    Shape(String),

    /// a structural precondition between operands does not hold
    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error("value error: {0}")]
    Value(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// a label or a position could not be resolved
    #[error("key error: {0}")]
    Key(String),

    #[error("task {key} failed: {source}")]
    Task {
        key: Key,
        #[source]
        source: Box<SparsityError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SparsityError {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }
    pub(crate) fn assertion(msg: impl Into<String>) -> Self {
        Self::Assertion(msg.into())
    }
    pub(crate) fn value(msg: impl Into<String>) -> Self {
        Self::Value(msg.into())
    }
    pub(crate) fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }
    pub(crate) fn key(msg: impl Into<String>) -> Self {
        Self::Key(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SparsityError>;
