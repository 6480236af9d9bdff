use dagcoll::{AlgorithmKind, CollectiveRequest, DataType, EngineConfig, Rank, ReduceOp};

use super::helpers::{
    COMM, SimCluster, assert_all_ok, decode_f32, decode_i32, dst_ref, encode_f32, encode_i32,
    src_ref,
};

/// Reduce per-rank i32 vectors to `root`; returns the root's result.
fn run_reduce_i32(
    cluster: &mut SimCluster,
    root: Rank,
    op: ReduceOp,
    inputs: &[Vec<i32>],
) -> Vec<i32> {
    let n = cluster.size();
    let count = inputs[0].len();
    let srcs: Vec<Vec<u8>> = inputs.iter().map(|v| encode_i32(v)).collect();
    let mut out = vec![0u8; count * 4];
    let mut handles = Vec::new();
    for r in 0..n {
        let dst = (r == root).then(|| dst_ref(&mut out));
        let src = src_ref(&srcs[r as usize]);
        let req = CollectiveRequest::reduce(4, root, op, DataType::I32, count, src, dst);
        handles.push(cluster.start(r, req).unwrap());
    }
    cluster.run();
    assert_all_ok(&mut handles);
    decode_i32(&out)
}

/// Allreduce per-rank i32 vectors; returns every rank's result.
fn run_allreduce_i32(cluster: &mut SimCluster, op: ReduceOp, inputs: &[Vec<i32>]) -> Vec<Vec<i32>> {
    let n = cluster.size();
    let count = inputs[0].len();
    let srcs: Vec<Vec<u8>> = inputs.iter().map(|v| encode_i32(v)).collect();
    let mut outs = vec![vec![0u8; count * 4]; n as usize];
    let mut handles = Vec::new();
    for r in 0..n {
        let req = CollectiveRequest::allreduce(
            6,
            op,
            DataType::I32,
            count,
            src_ref(&srcs[r as usize]),
            dst_ref(&mut outs[r as usize]),
        );
        handles.push(cluster.start(r, req).unwrap());
    }
    cluster.run();
    assert_all_ok(&mut handles);
    outs.iter().map(|o| decode_i32(o)).collect()
}

fn inputs(n: u32, count: usize) -> Vec<Vec<i32>> {
    (0..n)
        .map(|r| (0..count).map(|i| (r as i32 * 7 + i as i32 * 3) % 9 - 4).collect())
        .collect()
}

fn fold(inputs: &[Vec<i32>], op: ReduceOp) -> Vec<i32> {
    (0..inputs[0].len())
        .map(|i| {
            let column = inputs.iter().map(|v| v[i]);
            match op {
                ReduceOp::Sum => column.fold(0i32, i32::wrapping_add),
                ReduceOp::Prod => column.fold(1i32, i32::wrapping_mul),
                ReduceOp::Min => column.min().unwrap(),
                ReduceOp::Max => column.max().unwrap(),
            }
        })
        .collect()
}

#[test]
fn test_reduce_sum_to_root_0() {
    for n in [1, 2, 3, 4, 5, 8, 11] {
        let data = inputs(n, 6);
        let mut cluster = SimCluster::new(n);
        assert_eq!(
            run_reduce_i32(&mut cluster, 0, ReduceOp::Sum, &data),
            fold(&data, ReduceOp::Sum)
        );
        cluster.assert_scratch_released();
    }
}

#[test]
fn test_reduce_ops_nonzero_root() {
    let data = inputs(6, 5);
    for op in [ReduceOp::Sum, ReduceOp::Prod, ReduceOp::Min, ReduceOp::Max] {
        let mut cluster = SimCluster::new(6);
        assert_eq!(run_reduce_i32(&mut cluster, 4, op, &data), fold(&data, op), "{op}");
    }
}

#[test]
fn test_reduce_f32_sum() {
    let n = 4;
    let mut cluster = SimCluster::new(n);
    let srcs: Vec<Vec<u8>> = (0..n).map(|r| encode_f32(&[(r + 1) as f32; 4])).collect();
    let mut out = vec![0u8; 16];
    let mut handles = Vec::new();
    for r in 0..n {
        let dst = (r == 0).then(|| dst_ref(&mut out));
        let src = src_ref(&srcs[r as usize]);
        let req = CollectiveRequest::reduce(0, 0, ReduceOp::Sum, DataType::F32, 4, src, dst);
        handles.push(cluster.start(r, req).unwrap());
    }
    cluster.run();
    assert_all_ok(&mut handles);
    assert_eq!(decode_f32(&out), vec![10.0f32; 4]);
}

#[test]
fn test_allreduce_every_rank_gets_result() {
    for n in [2, 3, 5, 7, 8] {
        let data = inputs(n, 3);
        let mut cluster = SimCluster::new(n);
        let expected = fold(&data, ReduceOp::Max);
        let results = run_allreduce_i32(&mut cluster, ReduceOp::Max, &data);
        for (rank, got) in results.iter().enumerate() {
            assert_eq!(*got, expected, "n={n} rank {rank}");
        }
        cluster.assert_scratch_released();
    }
}

#[test]
fn test_allreduce_bcast_rounds_follow_reduce() {
    let n = 6;
    let data = inputs(n, 2);
    let mut cluster = SimCluster::new(n);
    run_allreduce_i32(&mut cluster, ReduceOp::Sum, &data);
    let rounds = 3;
    let log = cluster.net.message_log();
    // n - 1 messages up the tree, n - 1 back down.
    assert_eq!(log.len(), 2 * (n as usize - 1));
    assert!(log.iter().all(|m| m.tag.round < 2 * rounds));
    assert_eq!(log.iter().filter(|m| m.tag.round >= rounds).count(), n as usize - 1);
}

#[test]
fn test_all_pairs_matches_tree() {
    let n = 7;
    let data = inputs(n, 4);
    let mut tree = SimCluster::new(n);
    let config = EngineConfig {
        all_pairs_min_participants: Some(2),
        ..Default::default()
    };
    let mut direct = SimCluster::with_config(n, config);

    for op in [ReduceOp::Sum, ReduceOp::Min] {
        assert_eq!(
            run_reduce_i32(&mut tree, 2, op, &data),
            run_reduce_i32(&mut direct, 2, op, &data)
        );
        assert_eq!(
            run_allreduce_i32(&mut tree, op, &data),
            run_allreduce_i32(&mut direct, op, &data)
        );
    }
}

#[test]
fn test_all_pairs_reduce_is_one_round() {
    let config = EngineConfig {
        all_pairs_min_participants: Some(2),
        ..Default::default()
    };
    let mut cluster = SimCluster::with_config(5, config);
    let srcs: Vec<Vec<u8>> = (0..5).map(|r| encode_i32(&[r])).collect();
    let mut out = vec![0u8; 4];
    let mut handles = Vec::new();
    for r in 0..5u32 {
        let dst = (r == 1).then(|| dst_ref(&mut out));
        let src = src_ref(&srcs[r as usize]);
        let req = CollectiveRequest::reduce(0, 1, ReduceOp::Sum, DataType::I32, 1, src, dst);
        handles.push(cluster.start(r, req).unwrap());
    }
    assert_eq!(cluster.engines[1].algorithm(COMM, 0), Some(AlgorithmKind::AllPairs));
    assert_eq!(cluster.engines[1].dag(COMM, 0).map(|d| d.slot_count()), Some(4));
    cluster.run();
    assert_all_ok(&mut handles);
    assert_eq!(decode_i32(&out), vec![10]);
}
