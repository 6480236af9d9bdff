use dagcoll::{AlgorithmKind, CollectiveRequest, EngineConfig, Rank};

use super::helpers::{COMM, SimCluster, assert_all_ok, decode_f32, dst_ref, encode_f32, encode_i32};

/// In-place bcast of `payload` from `root`; returns every rank's buffer.
fn run_bcast(
    cluster: &mut SimCluster,
    root: Rank,
    payload: &[u8],
    type_size: usize,
) -> Vec<Vec<u8>> {
    let n = cluster.size();
    let mut bufs: Vec<Vec<u8>> = (0..n)
        .map(|r| {
            if r == root {
                payload.to_vec()
            } else {
                vec![0u8; payload.len()]
            }
        })
        .collect();
    let count = payload.len() / type_size;
    let mut handles = Vec::new();
    for r in 0..n {
        let buf = dst_ref(&mut bufs[r as usize]);
        let req = CollectiveRequest::bcast(5, root, count, type_size, buf);
        handles.push(cluster.start(r, req).unwrap());
    }
    cluster.run();
    assert_all_ok(&mut handles);
    bufs
}

#[test]
fn test_bcast_from_root_0() {
    let payload = encode_f32(&[42.0, 43.0, 44.0, 45.0]);
    let mut cluster = SimCluster::new(3);
    for (rank, buf) in run_bcast(&mut cluster, 0, &payload, 4).iter().enumerate() {
        assert_eq!(decode_f32(buf), vec![42.0, 43.0, 44.0, 45.0], "rank {rank}");
    }
}

#[test]
fn test_bcast_from_nonzero_root() {
    let payload = encode_i32(&[99, 100, 101]);
    for n in [2, 5, 6, 9] {
        let root = n - 1;
        let mut cluster = SimCluster::new(n);
        for (rank, buf) in run_bcast(&mut cluster, root, &payload, 4).iter().enumerate() {
            assert_eq!(*buf, payload, "n={n} rank {rank}");
        }
        cluster.assert_scratch_released();
    }
}

#[test]
fn test_bcast_tree_sends_full_payload_each_hop() {
    let payload = vec![0xAB; 64];
    let mut cluster = SimCluster::new(7);
    run_bcast(&mut cluster, 2, &payload, 8);
    let log = cluster.net.message_log();
    assert_eq!(log.len(), 6);
    assert!(log.iter().all(|m| m.len == 64));
    assert!(log.iter().all(|m| m.tag.comm == COMM && m.tag.tag == 5));
    assert!(log.iter().all(|m| m.tag.round < 3));
}

#[test]
fn test_bcast_all_pairs_above_threshold() {
    let config = EngineConfig {
        all_pairs_min_bytes: Some(32),
        ..Default::default()
    };
    let mut cluster = SimCluster::with_config(5, config);
    let payload = vec![0x5A; 32];
    let mut bufs = vec![vec![0u8; 32]; 5];
    bufs[1] = payload.clone();
    let mut handles = Vec::new();
    for r in 0..5 {
        let buf = dst_ref(&mut bufs[r as usize]);
        handles.push(cluster.start(r, CollectiveRequest::bcast(5, 1, 4, 8, buf)).unwrap());
    }
    assert_eq!(cluster.engines[1].algorithm(COMM, 5), Some(AlgorithmKind::AllPairs));
    cluster.run();
    assert_all_ok(&mut handles);
    assert!(bufs.iter().all(|b| *b == payload));
    // Root sends directly to every other rank in a single round.
    let log = cluster.net.message_log();
    assert_eq!(log.len(), 4);
    assert!(log.iter().all(|m| m.from == super::helpers::gid(1) && m.tag.round == 0));
}

#[test]
fn test_bcast_below_threshold_stays_tree() {
    let config = EngineConfig {
        all_pairs_min_bytes: Some(1024),
        ..Default::default()
    };
    let mut cluster = SimCluster::with_config(4, config);
    let mut bufs = vec![vec![1u8; 8]; 4];
    for r in 0..4 {
        let buf = dst_ref(&mut bufs[r as usize]);
        cluster.start(r, CollectiveRequest::bcast(0, 0, 2, 4, buf)).unwrap();
    }
    assert_eq!(cluster.engines[0].algorithm(COMM, 0), Some(AlgorithmKind::BinaryTree));
    cluster.run();
}

#[tokio::test]
async fn test_bcast_wait() {
    let mut cluster = SimCluster::new(4);
    let mut bufs = vec![vec![0u8; 4]; 4];
    bufs[3] = vec![9, 8, 7, 6];
    let mut handles = Vec::new();
    for r in 0..4 {
        let buf = dst_ref(&mut bufs[r as usize]);
        handles.push(cluster.start(r, CollectiveRequest::bcast(1, 3, 1, 4, buf)).unwrap());
    }
    cluster.run();
    for h in handles {
        h.wait().await.unwrap();
    }
    assert!(bufs.iter().all(|b| *b == [9, 8, 7, 6]));
}

#[test]
fn test_tree_geometry_is_root_relative() {
    let mut cluster = SimCluster::new(6);
    let mut bufs = vec![vec![0u8; 4]; 6];
    for r in 0..6u32 {
        let req = CollectiveRequest::bcast(0, 2, 1, 4, dst_ref(&mut bufs[r as usize]));
        cluster.start(r, req).unwrap();
    }
    let root = cluster.engines[2].tree(COMM, 0).unwrap();
    assert_eq!((root.log2nproc, root.vrank, root.parent), (3, 0, None));
    let mut children: Vec<Rank> = root.children.iter().map(|c| c.rank).collect();
    children.sort_unstable();
    assert_eq!(children, vec![0, 3, 4]);

    let leaf = cluster.engines[3].tree(COMM, 0).unwrap();
    assert_eq!(leaf.vrank, 1);
    assert_eq!(leaf.parent, Some((2, 2)));
    assert!(leaf.is_leaf());
    cluster.run();
}
