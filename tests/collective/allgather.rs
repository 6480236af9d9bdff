use dagcoll::algorithm::ceil_log2;
use dagcoll::{AlgorithmKind, CollectiveRequest, EngineConfig};

use super::helpers::{COMM, SimCluster, assert_all_ok, block_of, dst_ref, src_ref};

/// Allgather `counts[r] * type_size` bytes from every rank; every rank must
/// end up with all blocks in rank order.
fn run_allgather(cluster: &mut SimCluster, counts: &[usize], type_size: usize) {
    let n = cluster.size();
    let srcs: Vec<Vec<u8>> = (0..n)
        .map(|r| block_of(r, counts[r as usize] * type_size))
        .collect();
    let expected = srcs.concat();
    let mut outs = vec![vec![0u8; expected.len()]; n as usize];

    let mut handles = Vec::new();
    for r in 0..n {
        let req = CollectiveRequest::allgather(
            0,
            counts.to_vec(),
            type_size,
            src_ref(&srcs[r as usize]),
            dst_ref(&mut outs[r as usize]),
        );
        handles.push(cluster.start(r, req).unwrap());
    }
    cluster.run();
    assert_all_ok(&mut handles);
    for (rank, out) in outs.iter().enumerate() {
        assert_eq!(*out, expected, "rank {rank} of {n}");
    }
}

#[test]
fn test_allgather_every_size() {
    for n in 1..=12 {
        let mut cluster = SimCluster::new(n);
        run_allgather(&mut cluster, &vec![2; n as usize], 4);
        cluster.assert_scratch_released();
    }
}

#[test]
fn test_allgatherv_uneven_counts() {
    for counts in [vec![1, 2, 3, 4, 5], vec![0, 3, 0, 1, 2, 7], vec![5, 1, 1, 1]] {
        let mut cluster = SimCluster::new(counts.len() as u32);
        run_allgather(&mut cluster, &counts, 4);
    }
}

#[test]
fn test_recursive_doubling_message_sizes() {
    let n = 8;
    let base = 12;
    let mut cluster = SimCluster::new(n);
    run_allgather(&mut cluster, &vec![3; 8], 4);
    for m in cluster.net.message_log() {
        assert_eq!(m.len, base << m.tag.round, "round {}", m.tag.round);
    }
    assert_eq!(cluster.net.message_log().len(), (n * ceil_log2(n)) as usize);
}

#[test]
fn test_bruck_message_sizes_clamped() {
    let n = 6;
    let base = 4;
    let mut cluster = SimCluster::new(n);
    let srcs: Vec<Vec<u8>> = (0..n).map(|r| block_of(r, base)).collect();
    let mut outs = vec![vec![0u8; base * n as usize]; n as usize];
    for r in 0..n {
        let req = CollectiveRequest::allgather(
            0,
            vec![1; n as usize],
            base,
            src_ref(&srcs[r as usize]),
            dst_ref(&mut outs[r as usize]),
        );
        cluster.start(r, req).unwrap();
    }
    assert_eq!(cluster.engines[0].algorithm(COMM, 0), Some(AlgorithmKind::Bruck));
    assert_eq!(cluster.engines[0].dag(COMM, 0).map(|d| d.rounds()), Some(3));
    cluster.run();
    // Rounds carry 1, 2, then min(4, 6 - 4) = 2 blocks.
    for m in cluster.net.message_log() {
        let blocks = [1, 2, 2][m.tag.round as usize];
        assert_eq!(m.len, blocks * base, "round {}", m.tag.round);
    }
    let expected = srcs.concat();
    assert!(outs.iter().all(|o| *o == expected));
}

#[test]
fn test_allgather_all_pairs() {
    let config = EngineConfig {
        all_pairs_min_participants: Some(4),
        ..Default::default()
    };
    let mut cluster = SimCluster::with_config(5, config);
    run_allgather(&mut cluster, &[2, 1, 2, 1, 2], 8);
    let log = cluster.net.message_log();
    assert_eq!(log.len(), 20);
    assert!(log.iter().all(|m| m.tag.round == 0));
}
