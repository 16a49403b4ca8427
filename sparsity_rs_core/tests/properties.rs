use ndarray::{s, Array2};
use proptest::prelude::*;
use sparsity_core::df::frame::{Axis, GroupKey};
use sparsity_core::partitioned::RepartitionSpec;
use sparsity_core::{Index, Label, PartitionedFrame, SparseFrame, SyncScheduler, ThreadedScheduler};

const NCOLS: usize = 3;

/// Frames with unique integer row labels, `NCOLS` range columns and small integral values.
fn frame_strategy() -> impl Strategy<Value = SparseFrame> {
    prop::collection::btree_set(0i64..16, 1..8).prop_flat_map(|labels| {
        let n = labels.len();
        prop::collection::vec(0i32..3, n * NCOLS).prop_map(move |values| {
            let dense = Array2::from_shape_vec(
                (n, NCOLS),
                values.into_iter().map(f64::from).collect(),
            )
            .unwrap();
            let index: Index = labels.iter().copied().collect();
            SparseFrame::from_dense(dense.view(), Some(index), None).unwrap()
        })
    })
}

fn eye(n: usize) -> SparseFrame {
    SparseFrame::from_dense(Array2::<f64>::eye(n).view(), None, None).unwrap()
}

proptest! {
    #[test]
    fn join_rows_stacks_every_row(a in frame_strategy(), b in frame_strategy()) {
        let joined = a.join(&b, Axis::Rows).unwrap();
        prop_assert_eq!(joined.shape(), (a.nrows() + b.nrows(), NCOLS));
        prop_assert_eq!(joined.nnz(), a.nnz() + b.nnz());
    }

    #[test]
    fn join_rows_aligns_permuted_columns(a in frame_strategy(), b in frame_strategy()) {
        let reversed = b.to_dense().slice(s![.., ..;-1]).to_owned();
        let columns: Index = (0..NCOLS as i64).rev().collect();
        let permuted = SparseFrame::from_dense(
            reversed.view(),
            Some(b.index().clone()),
            Some(columns),
        )
        .unwrap();
        let aligned = a.join(&permuted, Axis::Rows).unwrap();
        let stacked = a.join(&b, Axis::Rows).unwrap();
        prop_assert_eq!(aligned.columns(), stacked.columns());
        prop_assert_eq!(aligned.index(), stacked.index());
        prop_assert_eq!(aligned.to_dense(), stacked.to_dense());
    }

    #[test]
    fn join_rows_zero_fills_partly_overlapping_columns(
        a in frame_strategy(),
        b in frame_strategy(),
    ) {
        let columns: Index = (1..=NCOLS as i64).collect();
        let shifted = SparseFrame::from_dense(
            b.to_dense().view(),
            Some(b.index().clone()),
            Some(columns),
        )
        .unwrap();
        let joined = a.join(&shifted, Axis::Rows).unwrap();
        prop_assert_eq!(joined.columns(), &Index::range(NCOLS + 1));
        let (na, nb) = (a.nrows(), b.nrows());
        let mut expected = Array2::<f64>::zeros((na + nb, NCOLS + 1));
        expected.slice_mut(s![..na, ..NCOLS]).assign(&a.to_dense());
        expected.slice_mut(s![na.., 1..]).assign(&b.to_dense());
        prop_assert_eq!(joined.to_dense(), expected);
        prop_assert_eq!(joined.nnz(), a.nnz() + b.nnz());
    }

    #[test]
    fn add_is_commutative(a in frame_strategy(), b in frame_strategy()) {
        let ab = a.add(&b).unwrap().sort_index().unwrap();
        let ba = b.add(&a).unwrap().sort_index().unwrap();
        prop_assert_eq!(ab.index(), ba.index());
        prop_assert_eq!(ab.to_dense(), ba.to_dense());
    }

    #[test]
    fn add_agrees_with_stacked_groupby(a in frame_strategy(), b in frame_strategy()) {
        let added = a.add(&b).unwrap().sort_index().unwrap();
        let grouped = a.join(&b, Axis::Rows).unwrap().groupby(GroupKey::Index).unwrap();
        prop_assert_eq!(added.index(), grouped.index());
        prop_assert_eq!(added.to_dense(), grouped.to_dense());
    }

    #[test]
    fn disjoint_add_is_a_zero_filled_union(a in frame_strategy(), b in frame_strategy()) {
        let shifted: Index = b.index().to_labels().into_iter().map(|l| match l {
            Label::Int(v) => Label::Int(v + 100),
            other => other,
        }).collect();
        let b = SparseFrame::from_dense(b.to_dense().view(), Some(shifted), None).unwrap();
        let added = a.add(&b).unwrap();
        prop_assert_eq!(added.nrows(), a.nrows() + b.nrows());
        prop_assert_eq!(added.nnz(), a.nnz() + b.nnz());
        let stacked = a.join(&b, Axis::Rows).unwrap();
        prop_assert_eq!(added.index(), stacked.index());
        prop_assert_eq!(added.to_dense(), stacked.to_dense());
    }

    #[test]
    fn repartition_keeps_every_row(a in frame_strategy(), n in 1usize..6, m in 1usize..6) {
        let pf = PartitionedFrame::from_frame(&a, n, true).unwrap();
        let repartitioned = pf.repartition(&RepartitionSpec::npartitions(m)).unwrap();
        let computed = repartitioned.compute(&SyncScheduler).unwrap();
        prop_assert_eq!(computed.index(), a.index());
        prop_assert_eq!(computed.to_dense(), a.to_dense());
    }
}

#[test]
fn groupby_over_single_row_partitions() {
    let pf = PartitionedFrame::from_frame(&eye(10), 10, true).unwrap();
    assert_eq!(pf.npartitions(), 10);
    let grouped = pf
        .map_partitions("groupby", |sf: &SparseFrame| sf.groupby(GroupKey::Index), None)
        .unwrap()
        .compute(&ThreadedScheduler::new(4))
        .unwrap();
    assert_eq!(grouped.to_dense(), Array2::<f64>::eye(10));
    assert_eq!(grouped.index(), &Index::range(10));
}

#[test]
fn groupby_restores_block_sums() {
    let blocks: Index = (0..12).map(|i| i / 3).collect();
    let sf = SparseFrame::from_dense(Array2::<f64>::eye(12).view(), Some(blocks), None).unwrap();
    let grouped = sf.groupby(GroupKey::Index).unwrap();
    assert_eq!(grouped.shape(), (4, 12));
    let mut expected = Array2::<f64>::zeros((4, 12));
    (0..12).for_each(|i| expected[[i / 3, i]] = 1.);
    assert_eq!(grouped.to_dense(), expected);
}

#[test]
fn shrink_then_grow_restores_divisions() {
    let labels: Vec<Label> = [0, 2, 4, 6, 8].into_iter().map(Label::Int).collect();
    let pf = PartitionedFrame::from_frame(&eye(9), 1, true)
        .unwrap()
        .repartition(&RepartitionSpec::divisions(labels.clone()))
        .unwrap();
    assert_eq!(pf.npartitions(), 4);

    let shrunk = pf.repartition(&RepartitionSpec::npartitions(2)).unwrap();
    let expected: Vec<Option<Label>> = [0, 4, 8].into_iter().map(|i| Some(Label::Int(i))).collect();
    assert_eq!(shrunk.divisions(), expected.as_slice());

    let grown = shrunk.repartition(&RepartitionSpec::npartitions(4)).unwrap();
    let restored: Vec<Option<Label>> = labels.into_iter().map(Some).collect();
    assert_eq!(grown.divisions(), restored.as_slice());
    assert_eq!(grown.compute(&SyncScheduler).unwrap().to_dense(), Array2::<f64>::eye(9));
}

#[test]
fn single_row_partitions_survive_shrink_then_grow() {
    let pf = PartitionedFrame::from_frame(&eye(10), 10, true).unwrap();
    let shrunk = pf.repartition(&RepartitionSpec::npartitions(5)).unwrap();
    assert_eq!(shrunk.npartitions(), 5);

    let grown = shrunk.repartition(&RepartitionSpec::npartitions(10)).unwrap();
    assert_eq!(grown.npartitions(), 10);
    assert_eq!(grown.divisions(), pf.divisions());
    assert_eq!(grown.compute(&SyncScheduler).unwrap(), eye(10));
}

#[test]
fn computed_frames_survive_a_save_load_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eye.sparse");
    let pf = PartitionedFrame::from_frame(&eye(6), 3, true).unwrap();
    let computed = pf.compute(&SyncScheduler).unwrap();
    computed.save(&path).unwrap();
    let loaded = SparseFrame::<f64>::load(&path).unwrap();
    assert_eq!(loaded, computed);
}
