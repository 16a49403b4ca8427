use bytes::{Buf, BufMut};
use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::{
    df::{csr::CsrMatrix, frame::SparseFrame, index::Index, label::time_from_nanos, Label},
    error::{Result, SparsityError},
    toolkit::array::AFloat,
};

fn corrupted(what: &str) -> SparsityError {
    SparsityError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("corrupted bytes: {}", what),
    ))
}

fn ensure(buf: &impl Buf, nbytes: usize, what: &str) -> Result<()> {
    if buf.remaining() < nbytes {
        Err(corrupted(what))
    } else {
        Ok(())
    }
}

fn get_len(buf: &mut impl Buf, what: &str) -> Result<usize> {
    ensure(&*buf, 8, what)?;
    usize::try_from(buf.get_u64_le()).map_err(|_| corrupted(what))
}

fn put_str(buf: &mut impl BufMut, s: &str) {
    buf.put_u64_le(s.len() as u64);
    buf.put_slice(s.as_bytes());
}

fn get_str(buf: &mut impl Buf) -> Result<String> {
    let len = get_len(buf, "string length")?;
    ensure(&*buf, len, "string")?;
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| corrupted("string is not utf-8"))
}

fn time_nanos(t: &NaiveDateTime) -> i64 {
    t.and_utc().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

pub(super) fn put_label(buf: &mut impl BufMut, label: &Label) {
    buf.put_u8(label.kind_tag());
    match label {
        Label::Int(v) => buf.put_i64_le(*v),
        Label::Str(v) => put_str(buf, v),
        Label::Time(v) => buf.put_i64_le(time_nanos(v)),
        Label::Uuid(v) => buf.put_slice(v.as_bytes()),
        Label::Tuple(vs) => {
            buf.put_u64_le(vs.len() as u64);
            vs.iter().for_each(|v| put_label(buf, v));
        }
    }
}

pub(super) fn get_label(buf: &mut impl Buf) -> Result<Label> {
    ensure(&*buf, 1, "label kind")?;
    match buf.get_u8() {
        0 => {
            ensure(&*buf, 8, "int label")?;
            Ok(Label::Int(buf.get_i64_le()))
        }
        1 => Ok(Label::Str(get_str(buf)?)),
        2 => {
            ensure(&*buf, 8, "time label")?;
            time_from_nanos(buf.get_i64_le())
                .map(Label::Time)
                .ok_or_else(|| corrupted("time label out of range"))
        }
        3 => {
            ensure(&*buf, 16, "uuid label")?;
            let mut bytes = [0u8; 16];
            buf.copy_to_slice(&mut bytes);
            Ok(Label::Uuid(Uuid::from_bytes(bytes)))
        }
        4 => {
            let len = get_len(buf, "tuple length")?;
            (0..len)
                .map(|_| get_label(buf))
                .collect::<Result<Vec<_>>>()
                .map(Label::Tuple)
        }
        tag => Err(corrupted(&format!("unknown label kind {}", tag))),
    }
}

pub(crate) fn put_labels(buf: &mut impl BufMut, labels: &[Label]) {
    buf.put_u64_le(labels.len() as u64);
    labels.iter().for_each(|l| put_label(buf, l));
}

pub(crate) fn get_labels(buf: &mut impl Buf) -> Result<Vec<Label>> {
    let len = get_len(buf, "label count")?;
    (0..len).map(|_| get_label(buf)).collect()
}

pub(super) fn put_index(buf: &mut impl BufMut, index: &Index) {
    match index {
        Index::Flat(labels) => {
            buf.put_u8(0);
            put_labels(buf, labels);
        }
        Index::Multi(multi) => {
            buf.put_u8(1);
            buf.put_u64_le(multi.names().len() as u64);
            multi.names().iter().for_each(|n| put_str(buf, n));
            multi.levels().iter().for_each(|level| put_labels(buf, level));
        }
    }
}

pub(super) fn get_index(buf: &mut impl Buf) -> Result<Index> {
    ensure(&*buf, 1, "index kind")?;
    match buf.get_u8() {
        0 => Ok(Index::Flat(get_labels(buf)?)),
        1 => {
            let nlevels = get_len(buf, "level count")?;
            let names = (0..nlevels)
                .map(|_| get_str(buf))
                .collect::<Result<Vec<_>>>()?;
            let levels = (0..nlevels)
                .map(|_| get_labels(buf))
                .collect::<Result<Vec<_>>>()?;
            Index::multi(levels, names)
        }
        tag => Err(corrupted(&format!("unknown index kind {}", tag))),
    }
}

pub(super) fn encode<T: AFloat>(frame: &SparseFrame<T>) -> Vec<u8> {
    let data = frame.data();
    let (nrows, ncols) = data.shape();
    let mut buf: Vec<u8> = Vec::with_capacity(24 + data.nbytes());
    put_index(&mut buf, frame.index());
    put_index(&mut buf, frame.columns());
    buf.put_u64_le(nrows as u64);
    buf.put_u64_le(ncols as u64);
    buf.put_u64_le(data.nnz() as u64);
    data.indptr().iter().for_each(|&p| buf.put_u64_le(p as u64));
    data.indices().iter().for_each(|&c| buf.put_u64_le(c as u64));
    data.data()
        .iter()
        .for_each(|v| buf.put_f64_le(v.to_f64().unwrap_or(f64::NAN)));
    buf
}

pub(super) fn decode<T: AFloat>(mut buf: impl Buf) -> Result<SparseFrame<T>> {
    let index = get_index(&mut buf)?;
    let columns = get_index(&mut buf)?;
    let nrows = get_len(&mut buf, "row count")?;
    let ncols = get_len(&mut buf, "column count")?;
    let nnz = get_len(&mut buf, "value count")?;
    let indptr = (0..=nrows)
        .map(|_| get_len(&mut buf, "indptr"))
        .collect::<Result<Vec<_>>>()?;
    let indices = (0..nnz)
        .map(|_| get_len(&mut buf, "indices"))
        .collect::<Result<Vec<_>>>()?;
    ensure(&buf, nnz.saturating_mul(8), "values")?;
    let data = (0..nnz)
        .map(|_| T::from_f64(buf.get_f64_le()).ok_or_else(|| corrupted("value")))
        .collect::<Result<Vec<_>>>()?;
    let csr = CsrMatrix::new((nrows, ncols), indptr, indices, data)?;
    SparseFrame::new(csr, Some(index), Some(columns))
}
