use std::fmt;

use chrono::{DateTime, NaiveDateTime};
use uuid::Uuid;

use crate::toolkit::hash::{Tokenize, Tokenizer};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// A single row or column label.
///
/// Labels of different kinds are ordered by kind first (in declaration order), then by value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Label {
    Int(i64),
    Str(String),
    Time(NaiveDateTime),
    Uuid(Uuid),
    /// one row of a multi-level index
    Tuple(Vec<Label>),
}

impl Label {
    /// Numeric representation of integer and time labels (nanoseconds for time).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Label::Int(v) => Some(*v as f64),
            Label::Time(t) => t.and_utc().timestamp_nanos_opt().map(|n| n as f64),
            _ => None,
        }
    }

    /// Inverse of [`Label::as_f64`], producing a label of the same kind as `self`.
    ///
    /// Values are rounded to the nearest integer (nanosecond for time labels).
    pub fn with_f64(&self, value: f64) -> Option<Label> {
        if !value.is_finite() {
            return None;
        }
        let rounded = value.round() as i64;
        match self {
            Label::Int(_) => Some(Label::Int(rounded)),
            Label::Time(_) => time_from_nanos(rounded).map(Label::Time),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Label::Int(_) | Label::Time(_))
    }

    pub(crate) fn kind_tag(&self) -> u8 {
        match self {
            Label::Int(_) => 0,
            Label::Str(_) => 1,
            Label::Time(_) => 2,
            Label::Uuid(_) => 3,
            Label::Tuple(_) => 4,
        }
    }
}

pub(crate) fn time_from_nanos(nanos: i64) -> Option<NaiveDateTime> {
    let secs = nanos.div_euclid(NANOS_PER_SECOND);
    let nsecs = nanos.rem_euclid(NANOS_PER_SECOND) as u32;
    DateTime::from_timestamp(secs, nsecs).map(|t| t.naive_utc())
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(v) => write!(f, "{}", v),
            Label::Str(v) => write!(f, "{}", v),
            Label::Time(v) => write!(f, "{}", v),
            Label::Uuid(v) => write!(f, "{}", v),
            Label::Tuple(vs) => {
                write!(f, "(")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Tokenize for Label {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        tokenizer.write_tag(self.kind_tag());
        match self {
            Label::Int(v) => v.tokenize(tokenizer),
            Label::Str(v) => v.tokenize(tokenizer),
            Label::Time(v) => v
                .and_utc()
                .timestamp_nanos_opt()
                .unwrap_or(i64::MAX)
                .tokenize(tokenizer),
            Label::Uuid(v) => tokenizer.write(v.as_bytes()),
            Label::Tuple(vs) => vs.tokenize(tokenizer),
        }
    }
}

macro_rules! label_from_int {
    ($($t:ty),*) => {$(
        impl From<$t> for Label {
            fn from(v: $t) -> Self {
                Label::Int(v as i64)
            }
        }
    )*};
}
label_from_int!(i32, i64, u32, usize);

impl From<&str> for Label {
    fn from(v: &str) -> Self {
        Label::Str(v.to_string())
    }
}
impl From<String> for Label {
    fn from(v: String) -> Self {
        Label::Str(v)
    }
}
impl From<NaiveDateTime> for Label {
    fn from(v: NaiveDateTime) -> Self {
        Label::Time(v)
    }
}
impl From<Uuid> for Label {
    fn from(v: Uuid) -> Self {
        Label::Uuid(v)
    }
}
