//! Dissemination barrier: in round `r` every rank signals `rank + 2^r` and
//! waits for `rank - 2^r`. After `ceil(log2 N)` rounds each rank has heard,
//! transitively, from every other.

use super::{DagParams, ceil_log2};
use crate::dag::{Action, ActionDag, Region};

pub(super) fn build(p: &DagParams<'_>) -> ActionDag {
    let n = p.size;
    let rounds = ceil_log2(n);
    let mut dag = ActionDag::new(rounds);
    let signal = Region::work(0, 0);
    let mut prev = None;
    for round in 0..rounds {
        let dist = 1u32 << round;
        let id = dag.push(Action::send_recv(
            round,
            (p.rank + dist) % n,
            signal,
            (p.rank + n - dist) % n,
            signal,
        ));
        if let Some(prev) = prev {
            dag.depend(prev, id);
        }
        prev = Some(id);
    }
    dag
}
