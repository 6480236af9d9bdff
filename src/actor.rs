//! Per-participant state machine driving one collective's action DAG.

use crate::algorithm::{
    self, AlgorithmKind, BlockLayout, BufferPolicy, DagParams, Overflow, Strategy, TreeGeometry,
};
use crate::config::EngineConfig;
use crate::dag::{ActionDag, ActionId, ActionKind, ActionState, BufId, Region};
use crate::engine::Collective;
use crate::error::{CollectiveError, Result};
use crate::memory::{BufferRef, ScratchBuffer, ScratchPool};
use crate::transport::{Completion, RequestId, Transport, TransportEvent, WireTag};
use crate::types::{CollectiveKind, CommId, GlobalId, Rank, SimTime, Tag};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Which half of an action a transport request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Send,
    Recv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActorStatus {
    /// The event did not belong to any in-flight request.
    Stale,
    Running,
    /// Every action is complete.
    Done,
}

/// An action that has been in flight for longer than a caller-chosen bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalledAction {
    pub comm: CommId,
    pub tag: Tag,
    pub rank: Rank,
    pub action: ActionId,
    pub round: u32,
    pub kind: ActionKind,
    /// Peer still expected to receive our data, if the send is outstanding.
    pub send_to: Option<GlobalId>,
    /// Peer we are still waiting on, if the receive is outstanding.
    pub recv_from: Option<GlobalId>,
    pub issued_at: SimTime,
}

/// Actor-owned scratch: the working buffer and lazily allocated slots.
#[derive(Debug, Default)]
struct Buffers {
    work: Option<ScratchBuffer>,
    slots: Vec<Option<ScratchBuffer>>,
}

impl Buffers {
    fn buf(&self, id: BufId) -> &[u8] {
        match id {
            BufId::Work => self.work.as_deref().unwrap_or_default(),
            BufId::Slot(s) => self
                .slots
                .get(s)
                .and_then(|b| b.as_deref())
                .unwrap_or_default(),
        }
    }

    fn buf_mut(&mut self, id: BufId) -> &mut [u8] {
        match id {
            BufId::Work => self.work.as_deref_mut().unwrap_or_default(),
            BufId::Slot(s) => self
                .slots
                .get_mut(s)
                .and_then(|b| b.as_deref_mut())
                .unwrap_or_default(),
        }
    }

    fn view(&self, r: Region) -> Result<&[u8]> {
        let buf = self.buf(r.buf);
        buf.get(r.offset..r.end())
            .ok_or_else(|| out_of_range(r, buf.len()))
    }

    fn view_mut(&mut self, r: Region) -> Result<&mut [u8]> {
        let buf = self.buf_mut(r.buf);
        let have = buf.len();
        buf.get_mut(r.offset..r.end())
            .ok_or_else(|| out_of_range(r, have))
    }

    /// Fold slot `sources` into the work region `target`, in order.
    fn fold(
        &mut self,
        target: Region,
        sources: &[Region],
        policy: BufferPolicy,
    ) -> Result<std::result::Result<(), Overflow>> {
        let Buffers { work, slots } = self;
        let work: &mut [u8] = work.as_deref_mut().unwrap_or_default();
        let have = work.len();
        let dst = work
            .get_mut(target.offset..target.end())
            .ok_or_else(|| out_of_range(target, have))?;
        for src in sources {
            let slot: &[u8] = match src.buf {
                BufId::Slot(s) => slots.get(s).and_then(|b| b.as_deref()).unwrap_or_default(),
                BufId::Work => &[],
            };
            let msg = slot
                .get(src.offset..src.end())
                .ok_or_else(|| out_of_range(*src, slot.len()))?;
            if let Err(overflow) = policy.apply(ActionKind::Combine, dst, msg) {
                return Ok(Err(overflow));
            }
        }
        Ok(Ok(()))
    }

    fn release(&mut self) {
        self.work = None;
        self.slots.clear();
    }
}

fn out_of_range(r: Region, have: usize) -> CollectiveError {
    CollectiveError::BufferSizeMismatch {
        expected: r.end(),
        actual: have,
    }
}

/// Copy `len` bytes at `from` in the caller's `src` into `work[at..]`.
fn stage(
    work: &mut [u8],
    at: usize,
    src: Option<BufferRef>,
    from: usize,
    len: usize,
) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    let data = src
        .as_ref()
        .and_then(|b| b.read(from, len))
        .ok_or(CollectiveError::BufferSizeMismatch {
            expected: from + len,
            actual: src.map_or(0, |b| b.len_bytes()),
        })?;
    work[at..at + len].copy_from_slice(data);
    Ok(())
}

/// Copy `data` into the caller's `dst` at `at`.
fn write_back(dst: Option<BufferRef>, at: usize, data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    match dst {
        Some(dst) if dst.write(at, data) => Ok(()),
        _ => Err(CollectiveError::BufferSizeMismatch {
            expected: at + data.len(),
            actual: dst.map_or(0, |b| b.len_bytes()),
        }),
    }
}

/// Drives the local participant's part of one collective.
///
/// Built once per `start()`: the strategy is chosen, the working buffer is
/// checked out and staged, and the DAG is built. From then on the actor only
/// reacts to transport completions. Scratch goes back to the pool when the
/// actor is dropped or aborted.
#[derive(Debug)]
pub(crate) struct CollectiveActor {
    coll: Collective,
    strategy: Strategy,
    layout: BlockLayout,
    tree: Option<TreeGeometry>,
    dag: ActionDag,
    pool: Arc<ScratchPool>,
    buffers: Buffers,
    ready: VecDeque<ActionId>,
    inflight: HashMap<RequestId, (ActionId, Part)>,
    completed: usize,
}

impl CollectiveActor {
    pub(crate) fn new(
        coll: Collective,
        config: &EngineConfig,
        pool: Arc<ScratchPool>,
    ) -> Result<Self> {
        let (size, rank) = (coll.comm().size(), coll.comm().rank());
        let algorithm = algorithm::select(config, coll.kind(), size, coll.selection_bytes());
        let strategy = algorithm::strategy(algorithm, coll.kind());
        let base = algorithm::layout_base(strategy.algorithm, coll.kind(), size, rank, coll.root());
        let layout = BlockLayout::new(coll.all_block_bytes(), base);

        let mut actor = Self {
            coll,
            strategy,
            layout,
            tree: None,
            dag: ActionDag::default(),
            pool,
            buffers: Buffers::default(),
            ready: VecDeque::new(),
            inflight: HashMap::new(),
            completed: 0,
        };
        actor.init_buffers()?;
        actor.init_dag();
        actor.init_tree();
        Ok(actor)
    }

    /// Check out the working buffer and stage the caller's source into it.
    fn init_buffers(&mut self) -> Result<()> {
        let kind = self.coll.kind();
        let comm = self.coll.comm();
        let rank = comm.rank();
        let is_root = rank == self.coll.root();
        let src = self.coll.src();
        let payload = self.coll.payload_bytes();

        let len = match kind {
            CollectiveKind::Barrier => 0,
            CollectiveKind::Bcast
            | CollectiveKind::Reduce { .. }
            | CollectiveKind::Allreduce { .. } => payload,
            _ => self.layout.total(),
        };
        let mut work = self.pool.checkout(len);
        match kind {
            CollectiveKind::Barrier => {}
            CollectiveKind::Bcast => {
                if is_root {
                    stage(&mut work, 0, src, 0, payload)?;
                }
            }
            CollectiveKind::Reduce { .. } | CollectiveKind::Allreduce { .. } => {
                stage(&mut work, 0, src, 0, payload)?;
            }
            CollectiveKind::Scatter => {
                if is_root {
                    for peer in 0..comm.size() {
                        let block = self.layout.block(peer);
                        let from = self.layout.rank_offset(peer);
                        stage(&mut work, block.offset, src, from, block.len)?;
                    }
                }
            }
            CollectiveKind::Gather | CollectiveKind::Allgather => {
                let block = self.layout.block(rank);
                stage(&mut work, block.offset, src, 0, block.len)?;
            }
        }
        self.buffers.work = Some(work);
        Ok(())
    }

    fn init_dag(&mut self) {
        let comm = self.coll.comm();
        let dag = (self.strategy.build)(&DagParams {
            kind: self.coll.kind(),
            size: comm.size(),
            rank: comm.rank(),
            root: self.coll.root(),
            layout: &self.layout,
            payload: self.coll.payload_bytes(),
        });
        self.buffers.slots = (0..dag.slot_count()).map(|_| None).collect();
        self.dag = dag;
    }

    fn init_tree(&mut self) {
        if self.strategy.algorithm != AlgorithmKind::BinaryTree {
            return;
        }
        let root = match self.coll.kind() {
            CollectiveKind::Allreduce { .. } => 0,
            _ => self.coll.root(),
        };
        let comm = self.coll.comm();
        self.tree = Some(TreeGeometry::new(comm.size(), comm.rank(), root));
    }

    pub(crate) fn collective(&self) -> &Collective {
        &self.coll
    }

    pub(crate) fn algorithm(&self) -> AlgorithmKind {
        self.strategy.algorithm
    }

    pub(crate) fn tree(&self) -> Option<&TreeGeometry> {
        self.tree.as_ref()
    }

    pub(crate) fn dag(&self) -> &ActionDag {
        &self.dag
    }

    fn is_done(&self) -> bool {
        self.completed == self.dag.len()
    }

    /// Queue the initial actions and issue them.
    pub(crate) fn start(&mut self, transport: &mut dyn Transport) -> Result<ActorStatus> {
        self.dag.seal(&mut self.ready);
        tracing::debug!(
            comm = self.coll.comm_id(),
            tag = self.coll.tag(),
            rank = self.coll.comm().rank(),
            kind = %self.coll.kind(),
            algorithm = %self.strategy.algorithm,
            actions = self.dag.len(),
            rounds = self.dag.rounds(),
            "collective started"
        );
        self.kick(transport)
    }

    /// Issue every ready action until the queue drains.
    fn kick(&mut self, transport: &mut dyn Transport) -> Result<ActorStatus> {
        while let Some(id) = self.ready.pop_front() {
            self.issue(id, transport)?;
        }
        Ok(if self.is_done() {
            ActorStatus::Done
        } else {
            ActorStatus::Running
        })
    }

    fn issue(&mut self, id: ActionId, transport: &mut dyn Transport) -> Result<()> {
        let action = self.dag.action(id);
        let (kind, round) = (action.kind, action.round);
        let (send_to, send) = (action.send_to, action.send);
        let (recv_from, recv) = (action.recv_from, action.recv);

        match kind {
            ActionKind::Shuffle => {
                self.complete(id);
                return Ok(());
            }
            ActionKind::Combine => {
                let sources = self.dag.action(id).sources.clone();
                let policy = self.strategy.policy;
                if let Some(target) = recv
                    && let Err(overflow) = self.buffers.fold(target, &sources, policy)?
                {
                    return Err(self.overflow(id, overflow));
                }
                self.complete(id);
                return Ok(());
            }
            ActionKind::Send | ActionKind::Recv | ActionKind::SendRecv => {}
        }

        let comm = self.coll.comm();
        let me = comm.my_global_id();
        let wire = WireTag {
            comm: comm.id(),
            tag: self.coll.tag(),
            round,
        };
        let send_peer = send_to.map(|r| comm.global_id(r)).transpose()?;
        let recv_peer = recv_from.map(|r| comm.global_id(r)).transpose()?;

        let a = self.dag.action_mut(id);
        a.state = ActionState::InFlight;
        a.issued_at = Some(transport.now());
        a.outstanding = a.request_count();

        if let (Some(to), Some(region)) = (send_peer, send) {
            let payload = Bytes::copy_from_slice(self.buffers.view(region)?);
            let request = transport.send(me, to, wire, payload);
            self.inflight.insert(request, (id, Part::Send));
        }
        if let (Some(from), Some(region)) = (recv_peer, recv) {
            if let BufId::Slot(s) = region.buf
                && self.buffers.slots.get(s).is_some_and(Option::is_none)
            {
                self.buffers.slots[s] = Some(self.pool.checkout(self.dag.slot_len(s)));
            }
            let request = transport.recv(me, from, wire, region.len);
            self.inflight.insert(request, (id, Part::Recv));
        }

        tracing::trace!(
            comm = wire.comm,
            tag = wire.tag,
            round,
            action = id,
            ?kind,
            send_to = ?send_peer,
            recv_from = ?recv_peer,
            "action issued"
        );
        Ok(())
    }

    fn complete(&mut self, id: ActionId) {
        self.dag.complete(id, &mut self.ready);
        self.completed += 1;
        tracing::trace!(
            comm = self.coll.comm_id(),
            tag = self.coll.tag(),
            action = id,
            completed = self.completed,
            total = self.dag.len(),
            "action complete"
        );
    }

    fn overflow(&self, action: ActionId, o: Overflow) -> CollectiveError {
        CollectiveError::BufferOverflow {
            rank: self.coll.comm().rank(),
            action,
            capacity: o.capacity,
            actual: o.actual,
        }
    }

    /// Apply one transport completion and issue whatever became ready.
    pub(crate) fn on_event(
        &mut self,
        event: &TransportEvent,
        transport: &mut dyn Transport,
    ) -> Result<ActorStatus> {
        let Some(&(id, part)) = self.inflight.get(&event.request) else {
            tracing::warn!(
                request = %event.request,
                comm = event.tag.comm,
                tag = event.tag.tag,
                "completion for unknown request ignored"
            );
            return Ok(ActorStatus::Stale);
        };

        let action = self.dag.action(id);
        let expected = match part {
            Part::Send => action.send_to,
            Part::Recv => action.recv_from,
        };
        let expected = expected.map(|r| self.coll.comm().global_id(r)).transpose()?;
        let kind_matches = matches!(
            (&event.completion, part),
            (Completion::Sent, Part::Send) | (Completion::Received(_), Part::Recv)
        );
        if expected != Some(event.partner) || !kind_matches {
            tracing::warn!(
                request = %event.request,
                partner = event.partner,
                expected = ?expected,
                action = id,
                "completion does not match its request, ignored"
            );
            return Ok(ActorStatus::Stale);
        }
        self.inflight.remove(&event.request);

        if let Completion::Received(payload) = &event.completion {
            self.deliver(id, payload)?;
        }

        let a = self.dag.action_mut(id);
        a.outstanding = a.outstanding.saturating_sub(1);
        if a.outstanding == 0 {
            self.complete(id);
        }
        self.kick(transport)
    }

    /// Apply the buffer policy to a received payload.
    fn deliver(&mut self, id: ActionId, payload: &[u8]) -> Result<()> {
        let action = self.dag.action(id);
        let kind = action.kind;
        let Some(region) = action.recv else {
            return Ok(());
        };
        let dst = self.buffers.view_mut(region)?;
        match self.strategy.policy.apply(kind, dst, payload) {
            Ok(()) => Ok(()),
            Err(o) => Err(self.overflow(id, o)),
        }
    }

    /// Write the result into the caller's destination buffer.
    pub(crate) fn finalize_buffers(&self) -> Result<()> {
        let comm = self.coll.comm();
        let rank = comm.rank();
        let is_root = rank == self.coll.root();
        let dst = self.coll.dst();
        let work = self.buffers.buf(BufId::Work);

        match self.coll.kind() {
            CollectiveKind::Barrier => Ok(()),
            CollectiveKind::Bcast | CollectiveKind::Allreduce { .. } => write_back(dst, 0, work),
            CollectiveKind::Reduce { .. } if is_root => write_back(dst, 0, work),
            CollectiveKind::Reduce { .. } => Ok(()),
            CollectiveKind::Scatter => {
                write_back(dst, 0, self.buffers.view(self.layout.block(rank))?)
            }
            CollectiveKind::Gather if !is_root => Ok(()),
            CollectiveKind::Gather | CollectiveKind::Allgather => {
                // Undo the layout rotation: blocks go out in rank order.
                for peer in 0..comm.size() {
                    let block = self.buffers.view(self.layout.block(peer))?;
                    write_back(dst, self.layout.rank_offset(peer), block)?;
                }
                Ok(())
            }
        }
    }

    /// Fail every unfinished action, withdraw outstanding requests and give
    /// scratch back. Returns the number of actions failed.
    pub(crate) fn abort(&mut self, transport: &mut dyn Transport) -> usize {
        let failed = self.dag.fail_unfinished();
        for (request, _) in self.inflight.drain() {
            transport.cancel(request);
        }
        self.ready.clear();
        self.buffers.release();
        tracing::warn!(
            comm = self.coll.comm_id(),
            tag = self.coll.tag(),
            rank = self.coll.comm().rank(),
            failed,
            completed = self.completed,
            "collective aborted"
        );
        failed
    }

    /// In-flight actions issued at least `older_than` ticks before `now`.
    pub(crate) fn stalled(&self, now: SimTime, older_than: u64) -> Vec<StalledAction> {
        let comm = self.coll.comm();
        let mut waiting: HashMap<ActionId, (bool, bool)> = HashMap::new();
        for &(id, part) in self.inflight.values() {
            let entry = waiting.entry(id).or_default();
            match part {
                Part::Send => entry.0 = true,
                Part::Recv => entry.1 = true,
            }
        }

        let mut stalled: Vec<StalledAction> = self
            .dag
            .actions()
            .iter()
            .filter(|a| a.state == ActionState::InFlight)
            .filter_map(|a| {
                let issued_at = a.issued_at?;
                if now.since(issued_at) < older_than {
                    return None;
                }
                let (send, recv) = waiting.get(&a.id).copied().unwrap_or_default();
                let peer = |on: bool, r: Option<Rank>| {
                    r.filter(|_| on).and_then(|r| comm.global_id(r).ok())
                };
                Some(StalledAction {
                    comm: comm.id(),
                    tag: self.coll.tag(),
                    rank: comm.rank(),
                    action: a.id,
                    round: a.round,
                    kind: a.kind,
                    send_to: peer(send, a.send_to),
                    recv_from: peer(recv, a.recv_from),
                    issued_at,
                })
            })
            .collect();
        stalled.sort_by_key(|s| (s.issued_at, s.action));
        stalled
    }

    #[cfg(test)]
    fn outstanding_requests(&self) -> usize {
        self.inflight.len()
    }
}
