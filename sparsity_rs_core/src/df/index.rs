//! Row / column label indexes and their relational join.

use std::{collections::BTreeMap, ops::Range};

use itertools::Itertools;

use super::{JoinHow, Label};
use crate::error::{Result, SparsityError};
use crate::toolkit::hash::{Tokenize, Tokenizer};

/// An ordered sequence of labels, either flat or multi-level.
///
/// A multi-level index stores its levels as parallel vectors; one row of it is exposed as a
/// [`Label::Tuple`].
#[derive(Debug, Clone, PartialEq)]
pub enum Index {
    Flat(Vec<Label>),
    Multi(MultiIndex),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultiIndex {
    levels: Vec<Vec<Label>>,
    names: Vec<String>,
}

impl MultiIndex {
    pub fn levels(&self) -> &[Vec<Label>] {
        &self.levels
    }
    pub fn names(&self) -> &[String] {
        &self.names
    }
    fn len(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }
    fn row(&self, i: usize) -> Label {
        Label::Tuple(self.levels.iter().map(|level| level[i].clone()).collect())
    }
}

/// Positions of one side of a join into its own labels.
#[derive(Debug, Clone, PartialEq)]
pub enum Indexer {
    /// the joined labels are exactly this side's labels, no permutation needed
    Identity,
    /// for each joined label, the position on this side (`None` when absent)
    Take(Vec<Option<usize>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinedIndex {
    pub index: Index,
    pub left: Indexer,
    pub right: Indexer,
}

impl Default for Index {
    fn default() -> Self {
        Index::Flat(Vec::new())
    }
}

impl<L: Into<Label>> FromIterator<L> for Index {
    fn from_iter<I: IntoIterator<Item = L>>(iter: I) -> Self {
        Index::Flat(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<Label>> for Index {
    fn from(labels: Vec<Label>) -> Self {
        Index::Flat(labels)
    }
}

impl Index {
    /// positional index `0..n`
    pub fn range(n: usize) -> Self {
        Index::Flat((0..n as i64).map(Label::Int).collect())
    }

    pub fn multi(levels: Vec<Vec<Label>>, names: Vec<String>) -> Result<Self> {
        if levels.len() < 2 {
            return Err(SparsityError::value(
                "a multi-level index needs at least two levels",
            ));
        }
        if names.len() != levels.len() {
            return Err(SparsityError::value(format!(
                "got {} level names for {} levels",
                names.len(),
                levels.len()
            )));
        }
        let n = levels[0].len();
        if levels.iter().any(|level| level.len() != n) {
            return Err(SparsityError::shape(
                "all levels of a multi-level index must have the same length",
            ));
        }
        Ok(Index::Multi(MultiIndex { levels, names }))
    }

    pub fn len(&self) -> usize {
        match self {
            Index::Flat(labels) => labels.len(),
            Index::Multi(multi) => multi.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, Index::Multi(_))
    }

    pub fn nlevels(&self) -> usize {
        match self {
            Index::Flat(_) => 1,
            Index::Multi(multi) => multi.levels.len(),
        }
    }

    pub fn as_flat(&self) -> Option<&[Label]> {
        match self {
            Index::Flat(labels) => Some(labels),
            Index::Multi(_) => None,
        }
    }

    pub fn get(&self, i: usize) -> Option<Label> {
        if i >= self.len() {
            return None;
        }
        match self {
            Index::Flat(labels) => Some(labels[i].clone()),
            Index::Multi(multi) => Some(multi.row(i)),
        }
    }

    /// All labels, rows of a multi-level index as tuples.
    pub fn to_labels(&self) -> Vec<Label> {
        match self {
            Index::Flat(labels) => labels.clone(),
            Index::Multi(multi) => (0..multi.len()).map(|i| multi.row(i)).collect(),
        }
    }

    pub fn first(&self) -> Option<Label> {
        self.get(0)
    }

    pub fn last(&self) -> Option<Label> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    pub fn level_values(&self, level: usize) -> Result<Vec<Label>> {
        match self {
            Index::Flat(_) => Err(SparsityError::value(
                "cannot use a level on a flat index",
            )),
            Index::Multi(multi) => multi.levels.get(level).cloned().ok_or_else(|| {
                SparsityError::value(format!(
                    "level {} out of range for an index with {} levels",
                    level,
                    multi.levels.len()
                ))
            }),
        }
    }

    /// Labels at `positions`; every position must be in bounds.
    pub fn take(&self, positions: &[usize]) -> Index {
        match self {
            Index::Flat(labels) => {
                Index::Flat(positions.iter().map(|&i| labels[i].clone()).collect())
            }
            Index::Multi(multi) => Index::Multi(MultiIndex {
                levels: multi
                    .levels
                    .iter()
                    .map(|level| positions.iter().map(|&i| level[i].clone()).collect())
                    .collect(),
                names: multi.names.clone(),
            }),
        }
    }

    pub fn slice(&self, range: Range<usize>) -> Index {
        match self {
            Index::Flat(labels) => Index::Flat(labels[range].to_vec()),
            Index::Multi(multi) => Index::Multi(MultiIndex {
                levels: multi
                    .levels
                    .iter()
                    .map(|level| level[range.clone()].to_vec())
                    .collect(),
                names: multi.names.clone(),
            }),
        }
    }

    pub fn concat(&self, other: &Index) -> Result<Index> {
        match (self, other) {
            (Index::Flat(a), Index::Flat(b)) => {
                Ok(Index::Flat(a.iter().chain(b).cloned().collect()))
            }
            (Index::Multi(a), Index::Multi(b)) if a.levels.len() == b.levels.len() => {
                Ok(Index::Multi(MultiIndex {
                    levels: a
                        .levels
                        .iter()
                        .zip(&b.levels)
                        .map(|(x, y)| x.iter().chain(y).cloned().collect())
                        .collect(),
                    names: a.names.clone(),
                }))
            }
            _ => Err(SparsityError::not_implemented(
                "concatenating indexes with different numbers of levels",
            )),
        }
    }

    /// A copy with one more label at the end.
    pub fn push(&self, label: Label) -> Result<Index> {
        match self {
            Index::Flat(labels) => {
                let mut labels = labels.clone();
                labels.push(label);
                Ok(Index::Flat(labels))
            }
            Index::Multi(_) => Err(SparsityError::not_implemented(
                "appending a label to a multi-level index",
            )),
        }
    }

    pub fn is_unique(&self) -> bool {
        self.to_labels().iter().all_unique()
    }

    pub fn is_monotonic_increasing(&self) -> bool {
        match self {
            Index::Flat(labels) => labels.windows(2).all(|w| w[0] <= w[1]),
            Index::Multi(_) => self.to_labels().windows(2).all(|w| w[0] <= w[1]),
        }
    }

    /// Stable sort order of the labels.
    pub fn argsort(&self) -> Vec<usize> {
        let labels = self.to_labels();
        let mut order: Vec<usize> = (0..labels.len()).collect();
        order.sort_by(|&a, &b| labels[a].cmp(&labels[b]));
        order
    }

    /// Position of the first occurrence of `label`.
    pub fn get_loc(&self, label: &Label) -> Result<usize> {
        let found = match self {
            Index::Flat(labels) => labels.iter().position(|l| l == label),
            Index::Multi(multi) => (0..multi.len()).position(|i| &multi.row(i) == label),
        };
        found.ok_or_else(|| SparsityError::key(format!("label {} not found", label)))
    }

    /// Positional bounds of the inclusive label slice `[start, end]`.
    ///
    /// On a monotonic index the bounds need not be present; otherwise they must be.
    pub fn slice_locs(&self, start: Option<&Label>, end: Option<&Label>) -> Result<(usize, usize)> {
        let n = self.len();
        if self.is_monotonic_increasing() {
            let labels = self.to_labels();
            let lo = start.map_or(0, |s| labels.partition_point(|l| l < s));
            let hi = end.map_or(n, |e| labels.partition_point(|l| l <= e));
            return Ok((lo, hi.max(lo)));
        }
        let lo = match start {
            Some(s) => self.get_loc(s)?,
            None => 0,
        };
        let hi = match end {
            Some(e) => self.get_loc(e)? + 1,
            None => n,
        };
        Ok((lo, hi.max(lo)))
    }

    /// Relational join of two indexes.
    ///
    /// Returns the joined labels and, for each side, either [`Indexer::Identity`] or the position
    /// of every joined label on that side. Duplicate labels match many-to-many.
    pub fn join(&self, other: &Index, how: JoinHow) -> Result<JoinedIndex> {
        if self == other {
            return Ok(JoinedIndex {
                index: self.clone(),
                left: Indexer::Identity,
                right: Indexer::Identity,
            });
        }
        let (left, right) = match (self, other) {
            (Index::Flat(left), Index::Flat(right)) => (left, right),
            _ => {
                return Err(SparsityError::not_implemented(
                    "joining multi-level indexes",
                ))
            }
        };
        let pairs = join_positions(left, right, how);
        let labels: Vec<Label> = pairs
            .iter()
            .map(|&(l, r)| match (l, r) {
                (Some(i), _) => left[i].clone(),
                (None, Some(j)) => right[j].clone(),
                (None, None) => unreachable!("every joined row has at least one side"),
            })
            .collect();
        let (lpos, rpos): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Ok(JoinedIndex {
            index: Index::Flat(labels),
            left: to_indexer(lpos, left.len()),
            right: to_indexer(rpos, right.len()),
        })
    }
}

fn to_indexer(positions: Vec<Option<usize>>, len: usize) -> Indexer {
    let identity =
        positions.len() == len && positions.iter().enumerate().all(|(i, &p)| p == Some(i));
    if identity {
        Indexer::Identity
    } else {
        Indexer::Take(positions)
    }
}

fn group_positions(labels: &[Label]) -> BTreeMap<&Label, Vec<usize>> {
    let mut groups: BTreeMap<&Label, Vec<usize>> = BTreeMap::new();
    labels
        .iter()
        .enumerate()
        .for_each(|(i, label)| groups.entry(label).or_default().push(i));
    groups
}

/// `(left_position, right_position)` of every joined row.
fn join_positions(
    left: &[Label],
    right: &[Label],
    how: JoinHow,
) -> Vec<(Option<usize>, Option<usize>)> {
    let mut pairs = Vec::new();
    match how {
        JoinHow::Left | JoinHow::Inner => {
            let rgroups = group_positions(right);
            left.iter().enumerate().for_each(|(i, label)| match rgroups.get(label) {
                Some(js) => js.iter().for_each(|&j| pairs.push((Some(i), Some(j)))),
                None if how == JoinHow::Left => pairs.push((Some(i), None)),
                None => {}
            });
        }
        JoinHow::Right => {
            let lgroups = group_positions(left);
            right.iter().enumerate().for_each(|(j, label)| match lgroups.get(label) {
                Some(is) => is.iter().for_each(|&i| pairs.push((Some(i), Some(j)))),
                None => pairs.push((None, Some(j))),
            });
        }
        JoinHow::Outer => {
            let lgroups = group_positions(left);
            let rgroups = group_positions(right);
            let keys: Vec<&Label> = lgroups.keys().merge(rgroups.keys()).dedup().copied().collect();
            keys.into_iter().for_each(|label| {
                match (lgroups.get(label), rgroups.get(label)) {
                    (Some(is), Some(js)) => is
                        .iter()
                        .cartesian_product(js.iter())
                        .for_each(|(&i, &j)| pairs.push((Some(i), Some(j)))),
                    (Some(is), None) => is.iter().for_each(|&i| pairs.push((Some(i), None))),
                    (None, Some(js)) => js.iter().for_each(|&j| pairs.push((None, Some(j)))),
                    (None, None) => {}
                }
            });
        }
    }
    pairs
}

impl Tokenize for Index {
    fn tokenize(&self, tokenizer: &mut Tokenizer) {
        match self {
            Index::Flat(labels) => {
                tokenizer.write_tag(0);
                labels.tokenize(tokenizer);
            }
            Index::Multi(multi) => {
                tokenizer.write_tag(1);
                multi.names.tokenize(tokenizer);
                multi.levels.iter().for_each(|level| level.tokenize(tokenizer));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Index {
        values.iter().copied().collect()
    }

    #[test]
    fn test_identical_join_is_identity() {
        let idx = ints(&[3, 1, 2]);
        let joined = idx.join(&idx, JoinHow::Outer).unwrap();
        assert_eq!(joined.index, idx);
        assert_eq!(joined.left, Indexer::Identity);
        assert_eq!(joined.right, Indexer::Identity);
    }

    #[test]
    fn test_outer_join_is_sorted_union() {
        let left = ints(&[4, 0, 2]);
        let right = ints(&[3, 2]);
        let joined = left.join(&right, JoinHow::Outer).unwrap();
        assert_eq!(joined.index, ints(&[0, 2, 3, 4]));
        assert_eq!(
            joined.left,
            Indexer::Take(vec![Some(1), Some(2), None, Some(0)])
        );
        assert_eq!(joined.right, Indexer::Take(vec![None, Some(1), Some(0), None]));
    }

    #[test]
    fn test_left_join_keeps_left_order() {
        let left = ints(&[4, 0, 2]);
        let right = ints(&[2, 9]);
        let joined = left.join(&right, JoinHow::Left).unwrap();
        assert_eq!(joined.index, left);
        assert_eq!(joined.left, Indexer::Identity);
        assert_eq!(joined.right, Indexer::Take(vec![None, None, Some(0)]));
    }

    #[test]
    fn test_inner_and_right_join() {
        let left = ints(&[4, 0, 2]);
        let right = ints(&[2, 9, 4]);
        let inner = left.join(&right, JoinHow::Inner).unwrap();
        assert_eq!(inner.index, ints(&[4, 2]));
        assert_eq!(inner.right, Indexer::Take(vec![Some(2), Some(0)]));
        let right_join = left.join(&right, JoinHow::Right).unwrap();
        assert_eq!(right_join.index, right);
        assert_eq!(right_join.left, Indexer::Take(vec![Some(2), None, Some(0)]));
        assert_eq!(right_join.right, Indexer::Identity);
    }

    #[test]
    fn test_duplicate_labels_match_many_to_many() {
        let left = ints(&[1, 1]);
        let right = ints(&[1, 1, 2]);
        let joined = left.join(&right, JoinHow::Outer).unwrap();
        assert_eq!(joined.index.len(), 5);
    }

    #[test]
    fn test_multi_index_join_not_implemented() {
        let multi = Index::multi(
            vec![vec![Label::Int(0)], vec![Label::Int(1)]],
            vec!["a".into(), "b".into()],
        )
        .unwrap();
        assert!(multi.join(&multi, JoinHow::Outer).is_ok());
        let err = multi.join(&ints(&[0]), JoinHow::Outer).unwrap_err();
        assert!(matches!(err, SparsityError::NotImplemented(_)));
    }

    #[test]
    fn test_slice_locs() {
        let sorted: Index = ["A", "B", "C", "D", "E"].into_iter().collect();
        assert_eq!(sorted.slice_locs(None, Some(&"B".into())).unwrap(), (0, 2));
        assert_eq!(
            sorted.slice_locs(Some(&"BB".into()), Some(&"D".into())).unwrap(),
            (2, 4)
        );
        let unsorted = ints(&[5, 1, 3]);
        assert_eq!(
            unsorted.slice_locs(Some(&Label::Int(1)), None).unwrap(),
            (1, 3)
        );
        assert!(unsorted.slice_locs(Some(&Label::Int(2)), None).is_err());
    }

    #[test]
    fn test_level_values() {
        let multi = Index::multi(
            vec![
                vec![Label::Int(0), Label::Int(1)],
                vec![Label::from("x"), Label::from("y")],
            ],
            vec!["id".into(), "name".into()],
        )
        .unwrap();
        assert_eq!(
            multi.level_values(1).unwrap(),
            vec![Label::from("x"), Label::from("y")]
        );
        assert_eq!(
            multi.get(1),
            Some(Label::Tuple(vec![Label::Int(1), Label::from("y")]))
        );
        assert!(ints(&[0]).level_values(0).is_err());
    }
}
