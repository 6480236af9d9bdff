//! Algorithm library: pure builders turning a collective into one rank's
//! action DAG, plus the buffer policy that goes with it.
//!
//! Selection happens once per actor: [`select`] picks an [`AlgorithmKind`]
//! from the configuration, and [`strategy`] maps `(algorithm, collective)`
//! to a `(builder, policy)` pair.

mod bruck;
mod btree;
mod direct;
mod dissemination;

pub use btree::TreeGeometry;

use crate::config::EngineConfig;
use crate::dag::{ActionDag, ActionKind, Region};
use crate::reduce::reduce_slice;
use crate::types::{CollectiveKind, DataType, Rank, ReduceOp};

/// Integer ceiling of log2(n). Returns 0 for n <= 1.
pub fn ceil_log2(n: u32) -> u32 {
    if n <= 1 {
        return 0;
    }
    u32::BITS - (n - 1).leading_zeros()
}

/// Communication pattern used to realize a collective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmKind {
    /// Binomial tree rooted at the collective's root (bcast, scatter, gather,
    /// reduce; allreduce as reduce + bcast).
    BinaryTree,
    /// Recursive doubling for power-of-two groups, Bruck otherwise (allgather).
    Bruck,
    /// Pairwise signal rounds at doubling distances (barrier).
    Dissemination,
    /// Every transfer made directly between its endpoints in a single round.
    AllPairs,
}

impl AlgorithmKind {
    /// The logarithmic algorithm used for `kind` below the all-pairs thresholds.
    pub const fn native_for(kind: CollectiveKind) -> Self {
        match kind {
            CollectiveKind::Barrier => AlgorithmKind::Dissemination,
            CollectiveKind::Allgather => AlgorithmKind::Bruck,
            _ => AlgorithmKind::BinaryTree,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            AlgorithmKind::BinaryTree => "binary-tree",
            AlgorithmKind::Bruck => "bruck",
            AlgorithmKind::Dissemination => "dissemination",
            AlgorithmKind::AllPairs => "all-pairs",
        }
    }
}

impl std::fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Choose the algorithm for a collective of `participants` ranks moving
/// `bytes` payload bytes.
pub fn select(
    config: &EngineConfig,
    kind: CollectiveKind,
    participants: u32,
    bytes: usize,
) -> AlgorithmKind {
    if config.prefers_all_pairs(participants, bytes) {
        AlgorithmKind::AllPairs
    } else {
        AlgorithmKind::native_for(kind)
    }
}

/// Per-rank block sizes, laid out contiguously in rotated rank order.
///
/// Slot `j` of the layout holds the block of physical rank `(base + j) % n`.
/// Scatter and gather rotate by the root so every subtree owns a contiguous
/// range; Bruck rotates by the local rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    block_bytes: Vec<usize>,
    base: Rank,
    slot_offsets: Vec<usize>,
    rank_offsets: Vec<usize>,
}

impl BlockLayout {
    pub fn new(block_bytes: Vec<usize>, base: Rank) -> Self {
        let n = block_bytes.len();
        let base = if n == 0 { 0 } else { base % n as u32 };
        let mut slot_offsets = Vec::with_capacity(n + 1);
        let mut acc = 0;
        slot_offsets.push(0);
        for j in 0..n {
            acc += block_bytes[(base as usize + j) % n];
            slot_offsets.push(acc);
        }
        let mut rank_offsets = Vec::with_capacity(n + 1);
        let mut acc = 0;
        rank_offsets.push(0);
        for &b in &block_bytes {
            acc += b;
            rank_offsets.push(acc);
        }
        Self {
            block_bytes,
            base,
            slot_offsets,
            rank_offsets,
        }
    }

    /// Every rank contributes `bytes`.
    pub fn uniform(n: u32, bytes: usize, base: Rank) -> Self {
        Self::new(vec![bytes; n as usize], base)
    }

    pub fn size(&self) -> u32 {
        self.block_bytes.len() as u32
    }

    pub fn base(&self) -> Rank {
        self.base
    }

    pub fn total(&self) -> usize {
        self.slot_offsets.last().copied().unwrap_or(0)
    }

    pub fn block_bytes(&self, rank: Rank) -> usize {
        self.block_bytes[rank as usize]
    }

    /// Slot holding `rank`'s block.
    pub fn slot_of(&self, rank: Rank) -> u32 {
        let n = self.size();
        (rank + n - self.base) % n
    }

    /// Work-buffer region covering slots `[first, last)`.
    pub fn slots(&self, first: u32, last: u32) -> Region {
        let start = self.slot_offsets[first as usize];
        let end = self.slot_offsets[last as usize];
        Region::work(start, end - start)
    }

    /// Work-buffer region holding `rank`'s block.
    pub fn block(&self, rank: Rank) -> Region {
        let slot = self.slot_of(rank);
        self.slots(slot, slot + 1)
    }

    /// Offset of `rank`'s block in a buffer laid out in plain rank order.
    pub fn rank_offset(&self, rank: Rank) -> usize {
        self.rank_offsets[rank as usize]
    }
}

/// Inputs of a DAG builder.
#[derive(Debug, Clone, Copy)]
pub struct DagParams<'a> {
    pub kind: CollectiveKind,
    pub size: u32,
    pub rank: Rank,
    pub root: Rank,
    /// Block layout of the working buffer (per-rank kinds).
    pub layout: &'a BlockLayout,
    /// Bytes of the single vector moved by bcast/reduce/allreduce.
    pub payload: usize,
}

/// Data-movement semantics applied when an action completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Received bytes are copied into the action's region.
    Copy,
    /// Received bytes land in slots; Combine actions fold them element-wise.
    Reduce { op: ReduceOp, dtype: DataType },
    /// Signal-only traffic; nothing is moved.
    Relay,
}

/// Why a buffer action was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow {
    pub capacity: usize,
    pub actual: usize,
}

impl BufferPolicy {
    pub fn for_kind(kind: CollectiveKind) -> Self {
        match kind {
            CollectiveKind::Barrier => BufferPolicy::Relay,
            CollectiveKind::Reduce { op, dtype } | CollectiveKind::Allreduce { op, dtype } => {
                BufferPolicy::Reduce { op, dtype }
            }
            _ => BufferPolicy::Copy,
        }
    }

    /// Apply `msg` to `dst` for an action of kind `action`.
    ///
    /// Receives copy (or, for relays, only check length); combines reduce.
    /// A message longer than its destination is rejected. A zero-length
    /// message is always accepted.
    pub fn apply(
        self,
        action: ActionKind,
        dst: &mut [u8],
        msg: &[u8],
    ) -> std::result::Result<(), Overflow> {
        if msg.len() > dst.len() {
            return Err(Overflow {
                capacity: dst.len(),
                actual: msg.len(),
            });
        }
        match (action, self) {
            (ActionKind::Combine, BufferPolicy::Reduce { op, dtype }) => {
                // Length-checked above; partial inputs fold into a prefix.
                let n = msg.len() - msg.len() % dtype.size_in_bytes();
                reduce_slice(&mut dst[..n], &msg[..n], dtype, op).map_err(|_| Overflow {
                    capacity: dst.len(),
                    actual: msg.len(),
                })
            }
            (_, BufferPolicy::Relay) | (ActionKind::Shuffle, _) => Ok(()),
            _ => {
                dst[..msg.len()].copy_from_slice(msg);
                Ok(())
            }
        }
    }
}

/// Builder and policy chosen for one actor.
#[derive(Debug, Clone, Copy)]
pub struct Strategy {
    pub algorithm: AlgorithmKind,
    pub build: fn(&DagParams<'_>) -> ActionDag,
    pub policy: BufferPolicy,
}

/// Look up the `(builder, policy)` pair for `algorithm` running `kind`.
///
/// Logarithmic algorithms that do not apply to `kind` resolve to the
/// collective's native algorithm.
pub fn strategy(algorithm: AlgorithmKind, kind: CollectiveKind) -> Strategy {
    let algorithm = match algorithm {
        AlgorithmKind::AllPairs => AlgorithmKind::AllPairs,
        _ => AlgorithmKind::native_for(kind),
    };
    let build: fn(&DagParams<'_>) -> ActionDag = match (algorithm, kind) {
        (AlgorithmKind::AllPairs, _) => direct::build,
        (_, CollectiveKind::Barrier) => dissemination::build,
        (_, CollectiveKind::Allgather) => bruck::build,
        (_, CollectiveKind::Bcast) => btree::build_bcast,
        (_, CollectiveKind::Scatter) => btree::build_scatter,
        (_, CollectiveKind::Gather) => btree::build_gather,
        (_, CollectiveKind::Reduce { .. }) => btree::build_reduce,
        (_, CollectiveKind::Allreduce { .. }) => btree::build_allreduce,
    };
    Strategy {
        algorithm,
        build,
        policy: BufferPolicy::for_kind(kind),
    }
}

/// Rotation base of the working-buffer layout for per-rank kinds.
pub fn layout_base(
    algorithm: AlgorithmKind,
    kind: CollectiveKind,
    size: u32,
    rank: Rank,
    root: Rank,
) -> Rank {
    match (algorithm, kind) {
        (AlgorithmKind::Bruck, CollectiveKind::Allgather) if !size.is_power_of_two() => rank,
        (_, CollectiveKind::Scatter | CollectiveKind::Gather) => root,
        _ => 0,
    }
}
