//! All-pairs builders: every transfer goes straight between its endpoints.
//!
//! Used once the group or the payload passes the configured thresholds.
//! Everything happens in round 0, except allreduce which broadcasts its
//! result in round 1.

use super::DagParams;
use crate::dag::{Action, ActionDag, ActionId, Region};
use crate::types::{CollectiveKind, Rank};

pub(super) fn build(p: &DagParams<'_>) -> ActionDag {
    if p.size <= 1 {
        return ActionDag::new(0);
    }
    match p.kind {
        CollectiveKind::Barrier => exchange(p, |_| Region::work(0, 0)),
        CollectiveKind::Allgather => exchange(p, |rank| p.layout.block(rank)),
        CollectiveKind::Bcast => {
            let mut dag = ActionDag::new(1);
            fan_out(&mut dag, p, p.root, 0, None);
            dag
        }
        CollectiveKind::Scatter => {
            let mut dag = ActionDag::new(1);
            if p.rank == p.root {
                for peer in peers(p.size, p.rank) {
                    dag.push(Action::send(0, peer, p.layout.block(peer)));
                }
            } else {
                dag.push(Action::recv(0, p.root, p.layout.block(p.rank)));
            }
            dag
        }
        CollectiveKind::Gather => {
            let mut dag = ActionDag::new(1);
            if p.rank == p.root {
                for peer in peers(p.size, p.rank) {
                    dag.push(Action::recv(0, peer, p.layout.block(peer)));
                }
            } else {
                dag.push(Action::send(0, p.root, p.layout.block(p.rank)));
            }
            dag
        }
        CollectiveKind::Reduce { .. } => {
            let mut dag = ActionDag::new(1);
            fan_in(&mut dag, p, p.root);
            dag
        }
        CollectiveKind::Allreduce { .. } => {
            let mut dag = ActionDag::new(2);
            let reduced = fan_in(&mut dag, p, 0);
            fan_out(&mut dag, p, 0, 1, reduced);
            dag
        }
    }
}

fn peers(size: u32, rank: Rank) -> impl Iterator<Item = Rank> {
    (0..size).filter(move |&r| r != rank)
}

/// One independent send/receive pair with every other rank.
fn exchange(p: &DagParams<'_>, region: impl Fn(Rank) -> Region) -> ActionDag {
    let mut dag = ActionDag::new(1);
    for peer in peers(p.size, p.rank) {
        dag.push(Action::send_recv(0, peer, region(p.rank), peer, region(peer)));
    }
    dag
}

fn fan_out(
    dag: &mut ActionDag,
    p: &DagParams<'_>,
    root: Rank,
    round: u32,
    after: Option<ActionId>,
) {
    let region = Region::work(0, p.payload);
    let ids: Vec<ActionId> = if p.rank == root {
        peers(p.size, p.rank)
            .map(|peer| dag.push(Action::send(round, peer, region)))
            .collect()
    } else {
        vec![dag.push(Action::recv(round, root, region))]
    };
    if let Some(after) = after {
        for id in ids {
            dag.depend(after, id);
        }
    }
}

/// Root receives every contribution into its own slot and folds them in
/// rank order; the others send. Returns the action ending this rank's part.
fn fan_in(dag: &mut ActionDag, p: &DagParams<'_>, root: Rank) -> Option<ActionId> {
    let work = Region::work(0, p.payload);
    if p.rank != root {
        return Some(dag.push(Action::send(0, root, work)));
    }
    let mut recvs = Vec::new();
    let mut sources = Vec::new();
    for peer in peers(p.size, p.rank) {
        let slot = Region::slot(dag.add_slot(p.payload), p.payload);
        recvs.push(dag.push(Action::recv(0, peer, slot)));
        sources.push(slot);
    }
    let combine = dag.push(Action::combine(0, sources, work));
    for recv in recvs {
        dag.depend(recv, combine);
    }
    Some(combine)
}
