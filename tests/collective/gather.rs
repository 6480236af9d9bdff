use dagcoll::{CollectiveError, CollectiveRequest, Rank};

use super::helpers::{SimCluster, assert_all_ok, block_of, dst_ref, src_ref};

fn run_gather(n: u32, root: Rank, counts: &[usize], type_size: usize) -> Vec<u8> {
    let mut cluster = SimCluster::new(n).shuffled(u64::from(n * 31 + root));
    let srcs: Vec<Vec<u8>> = (0..n)
        .map(|r| block_of(r, counts[r as usize] * type_size))
        .collect();
    let total: usize = srcs.iter().map(Vec::len).sum();
    let mut out = vec![0u8; total];

    let mut handles = Vec::new();
    for r in 0..n {
        let dst = (r == root).then(|| dst_ref(&mut out));
        let src = src_ref(&srcs[r as usize]);
        let req = CollectiveRequest::gather(2, root, counts.to_vec(), type_size, src, dst);
        handles.push(cluster.start(r, req).unwrap());
    }
    cluster.run();
    assert_all_ok(&mut handles);
    cluster.assert_scratch_released();

    assert_eq!(out, srcs.concat(), "gather to root {root} over {n} ranks");
    out
}

#[test]
fn test_gather_various_sizes() {
    for n in 1..=9 {
        run_gather(n, 0, &vec![2; n as usize], 4);
    }
}

#[test]
fn test_gather_nonzero_root() {
    run_gather(6, 3, &[1; 6], 8);
    run_gather(5, 4, &[3; 5], 2);
}

#[test]
fn test_gatherv_uneven_counts() {
    run_gather(7, 2, &[0, 1, 2, 3, 4, 5, 6], 4);
}

#[test]
fn test_gather_root_needs_destination() {
    let mut cluster = SimCluster::new(3);
    let src = vec![0u8; 4];
    let req = CollectiveRequest::gather(0, 1, vec![1; 3], 4, src_ref(&src), None);
    assert_eq!(
        cluster.start(1, req.clone()).unwrap_err(),
        CollectiveError::MissingBuffer {
            kind: "gather",
            which: "destination",
            rank: 1,
        }
    );
    // Non-root ranks only need their own source.
    assert!(cluster.start(0, req).is_ok());
}
