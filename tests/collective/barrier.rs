use dagcoll::algorithm::ceil_log2;
use dagcoll::{AlgorithmKind, CollectiveRequest, EngineConfig};

use super::helpers::{COMM, SimCluster, assert_all_ok};

#[test]
fn test_barrier_completes_for_every_size() {
    for n in 1..=10 {
        let mut cluster = SimCluster::new(n);
        let mut handles = cluster.start_all(|_| CollectiveRequest::barrier(3));
        cluster.run();
        assert_all_ok(&mut handles);
        assert_eq!(cluster.live_total(), 0);
        cluster.assert_scratch_released();
    }
}

#[test]
fn test_dissemination_rounds_and_signals() {
    for n in [2, 3, 6, 8, 9] {
        let mut cluster = SimCluster::new(n);
        cluster.start_all(|_| CollectiveRequest::barrier(0));
        assert_eq!(
            cluster.engines[1].algorithm(COMM, 0),
            Some(AlgorithmKind::Dissemination)
        );
        assert_eq!(
            cluster.engines[1].dag(COMM, 0).map(|d| d.rounds()),
            Some(ceil_log2(n))
        );
        cluster.run();
        let log = cluster.net.message_log();
        assert_eq!(log.len(), (n * ceil_log2(n)) as usize);
        assert!(log.iter().all(|m| m.len == 0));
    }
}

#[test]
fn test_barrier_waits_for_last_arrival() {
    let mut cluster = SimCluster::new(5);
    let mut early: Vec<_> = (0..4)
        .map(|r| cluster.start(r, CollectiveRequest::barrier(1)).unwrap())
        .collect();
    cluster.run();
    assert!(early.iter_mut().all(|h| h.try_result().is_none()));
    assert_eq!(cluster.live_total(), 4);

    let mut last = cluster.start(4, CollectiveRequest::barrier(1)).unwrap();
    cluster.run();
    assert_all_ok(&mut early);
    assert_eq!(last.try_result(), Some(Ok(())));
}

#[test]
fn test_all_pairs_barrier() {
    let config = EngineConfig {
        all_pairs_min_participants: Some(2),
        ..Default::default()
    };
    let mut cluster = SimCluster::with_config(4, config);
    let mut handles = cluster.start_all(|_| CollectiveRequest::barrier(0));
    assert_eq!(cluster.engines[0].algorithm(COMM, 0), Some(AlgorithmKind::AllPairs));
    cluster.run();
    assert_all_ok(&mut handles);
    assert_eq!(cluster.net.message_log().len(), 12);
}

#[test]
fn test_back_to_back_barriers_reuse_tag() {
    let mut cluster = SimCluster::new(3);
    for _ in 0..3 {
        let mut handles = cluster.start_all(|_| CollectiveRequest::barrier(9));
        cluster.run();
        assert_all_ok(&mut handles);
    }
    let done = cluster.engines[2].completions_mut().drain(0);
    assert_eq!(done.len(), 3);
    assert!(done.iter().all(|d| d.is_success() && d.tag == 9));
}

#[test]
fn test_partial_delivery_resolves_nothing_early() {
    let mut cluster = SimCluster::new(4);
    let mut handles = cluster.start_all(|_| CollectiveRequest::barrier(2));
    // Each rank needs four completions (two rounds of send + recv).
    assert_eq!(cluster.step(3), 3);
    assert!(handles.iter_mut().all(|h| h.try_result().is_none()));
    assert_eq!(cluster.live_total(), 4);
    cluster.run();
    assert_all_ok(&mut handles);
    assert_eq!(cluster.step(1), 0);
}
