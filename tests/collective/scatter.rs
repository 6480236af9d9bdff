use dagcoll::algorithm::ceil_log2;
use dagcoll::{AlgorithmKind, CollectiveRequest, Rank};

use super::helpers::{COMM, SimCluster, assert_all_ok, dst_ref, src_ref};

const TS: usize = 4;

/// Scatter `counts[r]` 4-byte elements to every rank and check each slice.
fn run_scatter(cluster: &mut SimCluster, root: Rank, counts: &[usize]) -> Vec<Vec<u8>> {
    let n = cluster.size();
    let total: usize = counts.iter().sum::<usize>() * TS;
    let src: Vec<u8> = (0..total).map(|i| (i * 7 + 3) as u8).collect();
    let mut dsts: Vec<Vec<u8>> = counts.iter().map(|&c| vec![0u8; c * TS]).collect();

    let mut handles = Vec::new();
    for r in 0..n {
        let dst = dst_ref(&mut dsts[r as usize]);
        let src = (r == root).then(|| src_ref(&src));
        let req = CollectiveRequest::scatter(0, root, counts.to_vec(), TS, src, dst);
        handles.push(cluster.start(r, req).unwrap());
    }
    cluster.run();
    assert_all_ok(&mut handles);

    let mut offset = 0;
    for r in 0..n as usize {
        let len = counts[r] * TS;
        assert_eq!(dsts[r], src[offset..offset + len], "rank {r} got the wrong slice");
        offset += len;
    }
    dsts
}

#[test]
fn test_scatter_various_sizes() {
    for n in [2, 3, 4, 5, 7, 8, 13] {
        let mut cluster = SimCluster::new(n);
        run_scatter(&mut cluster, 0, &vec![3; n as usize]);
        assert_eq!(cluster.live_total(), 0);
        cluster.assert_scratch_released();
    }
}

#[test]
fn test_scatter_nonzero_root() {
    for root in [1, 4, 5] {
        let mut cluster = SimCluster::new(6);
        run_scatter(&mut cluster, root, &[2; 6]);
    }
}

#[test]
fn test_scatterv_uneven_counts() {
    let mut cluster = SimCluster::new(5);
    run_scatter(&mut cluster, 3, &[1, 0, 4, 2, 3]);
}

#[test]
fn test_scatter_round_count_and_messages() {
    for n in [2, 5, 8, 11] {
        let mut cluster = SimCluster::new(n);
        let counts = vec![1; n as usize];
        let src = vec![0u8; n as usize * TS];
        let mut dsts = vec![vec![0u8; TS]; n as usize];
        for r in 0..n {
            let dst = dst_ref(&mut dsts[r as usize]);
            let root_src = Some(src_ref(&src));
            let req = CollectiveRequest::scatter(0, 0, counts.clone(), TS, root_src, dst);
            cluster.start(r, req).unwrap();
        }
        let engine = &cluster.engines[0];
        assert_eq!(engine.algorithm(COMM, 0), Some(AlgorithmKind::BinaryTree));
        assert_eq!(engine.dag(COMM, 0).map(|d| d.rounds()), Some(ceil_log2(n)));
        cluster.run();
        // Every non-root rank receives exactly once.
        assert_eq!(cluster.net.message_log().len(), n as usize - 1);
    }
}

#[test]
fn test_scatter_root_halves_its_span() {
    let n = 8;
    let mut cluster = SimCluster::new(n);
    run_scatter(&mut cluster, 0, &[1; 8]);
    let from_root: Vec<usize> = cluster
        .net
        .message_log()
        .iter()
        .filter(|m| m.from == super::helpers::gid(0))
        .map(|m| m.len)
        .collect();
    assert_eq!(from_root, vec![4 * TS, 2 * TS, TS]);
}

#[test]
fn test_scatter_single_rank() {
    let mut cluster = SimCluster::new(1);
    let src: Vec<u8> = (0..12).collect();
    let mut dst = vec![0u8; 12];
    let req = CollectiveRequest::scatter(0, 0, vec![3], TS, Some(src_ref(&src)), dst_ref(&mut dst));
    let mut handle = cluster.start(0, req).unwrap();
    assert_eq!(handle.try_result(), Some(Ok(())));
    assert_eq!(dst, src);
    assert!(cluster.net.message_log().is_empty());
}
