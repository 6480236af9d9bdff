//! Binomial-tree builders: scatter, bcast, gather, reduce and allreduce.
//!
//! Ranks are renumbered so the root is virtual rank 0. In round `r` of a
//! tree with `R = ceil(log2 N)` rounds, every virtual rank `v` that already
//! holds data and is a multiple of `2^(R-r)` hands the upper half of its
//! span to `v + 2^(R-1-r)`. Partners past `N - 1` are skipped, so a rank
//! simply has no action in rounds where it would talk to a non-member.
//! Gather and reduce walk the same tree leaves-first.

use super::{DagParams, ceil_log2};
use crate::dag::{Action, ActionDag, ActionId, Region};
use crate::types::Rank;

/// A child edge of the tree, seen from the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeChild {
    /// Round of the edge in root-to-leaf order.
    pub round: u32,
    /// Physical rank of the child.
    pub rank: Rank,
    /// Virtual ranks `[low, high)` below the child, itself included.
    pub span: (Rank, Rank),
}

/// This rank's place in a binomial tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeGeometry {
    pub log2nproc: u32,
    pub vrank: Rank,
    /// Virtual ranks `[low, high)` this rank is responsible for.
    pub span: (Rank, Rank),
    /// Round (root-to-leaf order) and physical rank of the parent.
    pub parent: Option<(u32, Rank)>,
    /// Children in root-to-leaf round order, largest subtree first.
    pub children: Vec<TreeChild>,
}

impl TreeGeometry {
    pub fn new(size: u32, rank: Rank, root: Rank) -> Self {
        let log2nproc = ceil_log2(size);
        let vrank = (rank + size - root) % size;
        let physical = |v: Rank| (v + root) % size;

        let (first_round, parent, span) = if vrank == 0 {
            (0, None, (0, size))
        } else {
            let low = vrank.trailing_zeros();
            let bit = 1u32 << low;
            let round = log2nproc - 1 - low;
            (
                round + 1,
                Some((round, physical(vrank - bit))),
                (vrank, (vrank + bit).min(size)),
            )
        };

        let children = (first_round..log2nproc)
            .filter_map(|round| {
                let bit = 1u32 << (log2nproc - 1 - round);
                let child = vrank + bit;
                (child < size).then(|| TreeChild {
                    round,
                    rank: physical(child),
                    span: (child, (child + bit).min(size)),
                })
            })
            .collect();

        Self {
            log2nproc,
            vrank,
            span,
            parent,
            children,
        }
    }

    /// First virtual rank handed off to a child; the span end for leaves.
    pub fn midpoint(&self) -> Rank {
        self.children.first().map_or(self.span.1, |c| c.span.0)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Round of an edge when the tree is walked leaves-first.
    fn mirrored(&self, round: u32) -> u32 {
        self.log2nproc - 1 - round
    }
}

pub(super) fn build_scatter(p: &DagParams<'_>) -> ActionDag {
    let g = TreeGeometry::new(p.size, p.rank, p.root);
    let mut dag = ActionDag::new(g.log2nproc);
    let recv = g.parent.map(|(round, parent)| {
        dag.push(Action::recv(round, parent, p.layout.slots(g.span.0, g.span.1)))
    });
    for child in &g.children {
        let region = p.layout.slots(child.span.0, child.span.1);
        let send = dag.push(Action::send(child.round, child.rank, region));
        if let Some(recv) = recv {
            dag.depend(recv, send);
        }
    }
    dag
}

pub(super) fn build_bcast(p: &DagParams<'_>) -> ActionDag {
    let g = TreeGeometry::new(p.size, p.rank, p.root);
    let mut dag = ActionDag::new(g.log2nproc);
    push_bcast(&mut dag, &g, p.payload, 0, None);
    dag
}

pub(super) fn build_gather(p: &DagParams<'_>) -> ActionDag {
    let g = TreeGeometry::new(p.size, p.rank, p.root);
    let mut dag = ActionDag::new(g.log2nproc);
    let recvs: Vec<ActionId> = g
        .children
        .iter()
        .rev()
        .map(|child| {
            let region = p.layout.slots(child.span.0, child.span.1);
            dag.push(Action::recv(g.mirrored(child.round), child.rank, region))
        })
        .collect();
    if let Some((round, parent)) = g.parent {
        let region = p.layout.slots(g.span.0, g.span.1);
        let send = dag.push(Action::send(g.mirrored(round), parent, region));
        for recv in recvs {
            dag.depend(recv, send);
        }
    }
    dag
}

pub(super) fn build_reduce(p: &DagParams<'_>) -> ActionDag {
    let g = TreeGeometry::new(p.size, p.rank, p.root);
    let mut dag = ActionDag::new(g.log2nproc);
    push_reduce(&mut dag, &g, p.payload, 0);
    dag
}

/// Reduce to rank 0, then broadcast the result from rank 0.
pub(super) fn build_allreduce(p: &DagParams<'_>) -> ActionDag {
    let g = TreeGeometry::new(p.size, p.rank, 0);
    let mut dag = ActionDag::new(2 * g.log2nproc);
    let reduced = push_reduce(&mut dag, &g, p.payload, 0);
    push_bcast(&mut dag, &g, p.payload, g.log2nproc, reduced);
    dag
}

/// Append the bcast tree. Every action depends on `after` when given.
fn push_bcast(
    dag: &mut ActionDag,
    g: &TreeGeometry,
    payload: usize,
    round_offset: u32,
    after: Option<ActionId>,
) {
    let region = Region::work(0, payload);
    let recv = g.parent.map(|(round, parent)| {
        let recv = dag.push(Action::recv(round_offset + round, parent, region));
        if let Some(after) = after {
            dag.depend(after, recv);
        }
        recv
    });
    let gate = recv.or(after);
    for child in &g.children {
        let send = dag.push(Action::send(round_offset + child.round, child.rank, region));
        if let Some(gate) = gate {
            dag.depend(gate, send);
        }
    }
}

/// Append the reduction tree and return the action after which this rank's
/// part is done: the send to the parent, or the final combine at the root.
///
/// Children's contributions land in separate slots and are folded by one
/// combine in a fixed child order, so the result does not depend on which
/// message arrives first.
fn push_reduce(
    dag: &mut ActionDag,
    g: &TreeGeometry,
    payload: usize,
    round_offset: u32,
) -> Option<ActionId> {
    let mut recvs = Vec::with_capacity(g.children.len());
    let mut sources = Vec::with_capacity(g.children.len());
    let mut last_round = round_offset;
    for child in g.children.iter().rev() {
        let slot = dag.add_slot(payload);
        let region = Region::slot(slot, payload);
        let round = round_offset + g.mirrored(child.round);
        last_round = last_round.max(round);
        recvs.push(dag.push(Action::recv(round, child.rank, region)));
        sources.push(region);
    }

    let combine = (!recvs.is_empty()).then(|| {
        let combine = dag.push(Action::combine(
            last_round,
            sources,
            Region::work(0, payload),
        ));
        for &recv in &recvs {
            dag.depend(recv, combine);
        }
        combine
    });

    let send = g.parent.map(|(round, parent)| {
        let round = round_offset + g.mirrored(round);
        let send = dag.push(Action::send(round, parent, Region::work(0, payload)));
        if let Some(combine) = combine {
            dag.depend(combine, send);
        }
        send
    });
    send.or(combine)
}
