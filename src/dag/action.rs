use crate::types::{Rank, SimTime};

/// Index of an action inside its DAG arena.
pub type ActionId = usize;

/// Which actor-owned buffer a region points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufId {
    /// The working buffer allocated at init.
    Work,
    /// A per-round receive slot, allocated when first used.
    Slot(usize),
}

/// A byte range inside one of the actor's buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub buf: BufId,
    pub offset: usize,
    pub len: usize,
}

impl Region {
    pub const fn work(offset: usize, len: usize) -> Self {
        Self {
            buf: BufId::Work,
            offset,
            len,
        }
    }

    pub const fn slot(slot: usize, len: usize) -> Self {
        Self {
            buf: BufId::Slot(slot),
            offset: 0,
            len,
        }
    }

    pub const fn end(&self) -> usize {
        self.offset + self.len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Send,
    Recv,
    SendRecv,
    /// Local fold of receive slots into a work region.
    Combine,
    /// Local step with no data movement (pure ordering point).
    Shuffle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionState {
    Pending,
    Ready,
    InFlight,
    Complete,
    Failed,
}

/// One node of an actor's communication DAG.
#[derive(Debug, Clone)]
pub struct Action {
    pub(crate) id: ActionId,
    pub(crate) round: u32,
    pub(crate) kind: ActionKind,
    pub(crate) send_to: Option<Rank>,
    pub(crate) recv_from: Option<Rank>,
    pub(crate) send: Option<Region>,
    pub(crate) recv: Option<Region>,
    pub(crate) sources: Vec<Region>,
    pub(crate) preds: Vec<ActionId>,
    pub(crate) succs: Vec<ActionId>,
    pub(crate) state: ActionState,
    pub(crate) waiting_on: usize,
    pub(crate) outstanding: u8,
    pub(crate) issued_at: Option<SimTime>,
}

impl Action {
    fn blank(round: u32, kind: ActionKind) -> Self {
        Self {
            id: 0,
            round,
            kind,
            send_to: None,
            recv_from: None,
            send: None,
            recv: None,
            sources: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            state: ActionState::Pending,
            waiting_on: 0,
            outstanding: 0,
            issued_at: None,
        }
    }

    pub fn send(round: u32, to: Rank, region: Region) -> Self {
        Self {
            send_to: Some(to),
            send: Some(region),
            ..Self::blank(round, ActionKind::Send)
        }
    }

    pub fn recv(round: u32, from: Rank, region: Region) -> Self {
        Self {
            recv_from: Some(from),
            recv: Some(region),
            ..Self::blank(round, ActionKind::Recv)
        }
    }

    pub fn send_recv(round: u32, to: Rank, send: Region, from: Rank, recv: Region) -> Self {
        Self {
            send_to: Some(to),
            recv_from: Some(from),
            send: Some(send),
            recv: Some(recv),
            ..Self::blank(round, ActionKind::SendRecv)
        }
    }

    /// Fold `sources`, in order, into `target`.
    pub fn combine(round: u32, sources: Vec<Region>, target: Region) -> Self {
        Self {
            recv: Some(target),
            sources,
            ..Self::blank(round, ActionKind::Combine)
        }
    }

    pub fn shuffle(round: u32) -> Self {
        Self::blank(round, ActionKind::Shuffle)
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn send_to(&self) -> Option<Rank> {
        self.send_to
    }

    pub fn recv_from(&self) -> Option<Rank> {
        self.recv_from
    }

    /// Bytes this action puts on the wire (0 for local actions).
    pub fn send_len(&self) -> usize {
        self.send.map_or(0, |r| r.len)
    }

    /// Capacity of the receive region (0 for sends).
    pub fn recv_len(&self) -> usize {
        match self.kind {
            ActionKind::Recv | ActionKind::SendRecv => self.recv.map_or(0, |r| r.len),
            _ => 0,
        }
    }

    pub fn preds(&self) -> &[ActionId] {
        &self.preds
    }

    pub fn succs(&self) -> &[ActionId] {
        &self.succs
    }

    /// Time the action went in flight, if it has.
    pub fn issued_at(&self) -> Option<SimTime> {
        self.issued_at
    }

    /// True for actions the actor completes without the transport.
    pub fn is_local(&self) -> bool {
        matches!(self.kind, ActionKind::Combine | ActionKind::Shuffle)
    }

    /// Number of transport requests this action issues.
    pub(crate) fn request_count(&self) -> u8 {
        match self.kind {
            ActionKind::Send | ActionKind::Recv => 1,
            ActionKind::SendRecv => 2,
            ActionKind::Combine | ActionKind::Shuffle => 0,
        }
    }
}
