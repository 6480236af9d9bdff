//! Allgather in `ceil(log2 N)` rounds.
//!
//! Power-of-two groups use recursive doubling: in round `r` each rank swaps
//! its aligned group of `2^r` blocks with `rank ^ 2^r`. Other group sizes use
//! Bruck's algorithm over a layout rotated by the local rank, so slot 0 is
//! always the local block: round `r` sends slots `[0, c)` to `rank - 2^r`
//! and receives `c` blocks from `rank + 2^r` into slots `[2^r, 2^r + c)`,
//! with `c = min(2^r, N - 2^r)`. The rotation is undone when the result is
//! copied out.

use super::{DagParams, ceil_log2};
use crate::dag::{Action, ActionDag};

pub(super) fn build(p: &DagParams<'_>) -> ActionDag {
    let rounds = ceil_log2(p.size);
    let mut dag = ActionDag::new(rounds);
    let mut prev = None;
    for round in 0..rounds {
        let action = if p.size.is_power_of_two() {
            doubling_step(p, round)
        } else {
            bruck_step(p, round)
        };
        let id = dag.push(action);
        if let Some(prev) = prev {
            dag.depend(prev, id);
        }
        prev = Some(id);
    }
    dag
}

fn doubling_step(p: &DagParams<'_>, round: u32) -> Action {
    let dist = 1u32 << round;
    let partner = p.rank ^ dist;
    let mine = p.rank & !(dist - 1);
    let theirs = partner & !(dist - 1);
    Action::send_recv(
        round,
        partner,
        p.layout.slots(mine, mine + dist),
        partner,
        p.layout.slots(theirs, theirs + dist),
    )
}

fn bruck_step(p: &DagParams<'_>, round: u32) -> Action {
    let n = p.size;
    let dist = 1u32 << round;
    let count = dist.min(n - dist);
    Action::send_recv(
        round,
        (p.rank + n - dist) % n,
        p.layout.slots(0, count),
        (p.rank + dist) % n,
        p.layout.slots(dist, dist + count),
    )
}
