use crate::comm::Communicator;
use crate::error::{CollectiveError, Result};
use crate::memory::BufferRef;
use crate::types::{CollectiveKind, CommId, CqId, DataType, Rank, ReduceOp, Tag};

/// Parameters of one collective call, as passed to
/// [`CollectiveEngine::start`](crate::CollectiveEngine::start).
///
/// `counts` are element counts: one per rank for scatter, gather and
/// allgather; a single entry for bcast, reduce and allreduce; empty for
/// barrier. Buffers are borrowed and must stay valid until the handle
/// resolves.
#[derive(Debug, Clone)]
pub struct CollectiveRequest {
    pub kind: CollectiveKind,
    pub tag: Tag,
    /// Ignored by unrooted kinds.
    pub root: Rank,
    pub counts: Vec<usize>,
    /// Element size in bytes.
    pub type_size: usize,
    pub src: Option<BufferRef>,
    pub dst: Option<BufferRef>,
    /// Completion queue the finished collective is reported to.
    pub cq: CqId,
}

impl CollectiveRequest {
    fn new(kind: CollectiveKind, tag: Tag) -> Self {
        Self {
            kind,
            tag,
            root: 0,
            counts: Vec::new(),
            type_size: 0,
            src: None,
            dst: None,
            cq: 0,
        }
    }

    pub fn barrier(tag: Tag) -> Self {
        Self::new(CollectiveKind::Barrier, tag)
    }

    /// In-place broadcast of `count` elements from `root`'s `buf` to every
    /// other rank's `buf`.
    pub fn bcast(tag: Tag, root: Rank, count: usize, type_size: usize, buf: BufferRef) -> Self {
        Self {
            root,
            counts: vec![count],
            type_size,
            src: Some(buf),
            dst: Some(buf),
            ..Self::new(CollectiveKind::Bcast, tag)
        }
    }

    /// `src` is only read on the root and may be `None` elsewhere.
    pub fn scatter(
        tag: Tag,
        root: Rank,
        counts: Vec<usize>,
        type_size: usize,
        src: Option<BufferRef>,
        dst: BufferRef,
    ) -> Self {
        Self {
            root,
            counts,
            type_size,
            src,
            dst: Some(dst),
            ..Self::new(CollectiveKind::Scatter, tag)
        }
    }

    /// `dst` is only written on the root and may be `None` elsewhere.
    pub fn gather(
        tag: Tag,
        root: Rank,
        counts: Vec<usize>,
        type_size: usize,
        src: BufferRef,
        dst: Option<BufferRef>,
    ) -> Self {
        Self {
            root,
            counts,
            type_size,
            src: Some(src),
            dst,
            ..Self::new(CollectiveKind::Gather, tag)
        }
    }

    pub fn allgather(
        tag: Tag,
        counts: Vec<usize>,
        type_size: usize,
        src: BufferRef,
        dst: BufferRef,
    ) -> Self {
        Self {
            counts,
            type_size,
            src: Some(src),
            dst: Some(dst),
            ..Self::new(CollectiveKind::Allgather, tag)
        }
    }

    pub fn reduce(
        tag: Tag,
        root: Rank,
        op: ReduceOp,
        dtype: DataType,
        count: usize,
        src: BufferRef,
        dst: Option<BufferRef>,
    ) -> Self {
        Self {
            root,
            counts: vec![count],
            type_size: dtype.size_in_bytes(),
            src: Some(src),
            dst,
            ..Self::new(CollectiveKind::Reduce { op, dtype }, tag)
        }
    }

    pub fn allreduce(
        tag: Tag,
        op: ReduceOp,
        dtype: DataType,
        count: usize,
        src: BufferRef,
        dst: BufferRef,
    ) -> Self {
        Self {
            counts: vec![count],
            type_size: dtype.size_in_bytes(),
            src: Some(src),
            dst: Some(dst),
            ..Self::new(CollectiveKind::Allreduce { op, dtype }, tag)
        }
    }

    /// Report completion on queue `cq` instead of queue 0.
    pub fn with_cq(mut self, cq: CqId) -> Self {
        self.cq = cq;
        self
    }
}

/// A validated collective bound to its communicator.
#[derive(Debug, Clone)]
pub struct Collective {
    comm: Communicator,
    kind: CollectiveKind,
    tag: Tag,
    root: Rank,
    counts: Vec<usize>,
    type_size: usize,
    src: Option<BufferRef>,
    dst: Option<BufferRef>,
    cq: CqId,
}

impl Collective {
    /// Check `req` against `comm`. Nothing is allocated or issued.
    pub(crate) fn validate(comm: &Communicator, req: CollectiveRequest) -> Result<Self> {
        let kind = req.kind;
        let size = comm.size();
        let root = if kind.is_rooted() {
            if req.root >= size {
                return Err(CollectiveError::InvalidRank {
                    rank: req.root,
                    size,
                });
            }
            req.root
        } else {
            0
        };

        let counts = match kind {
            CollectiveKind::Barrier => Vec::new(),
            _ => {
                let expected = if kind.has_per_rank_counts() {
                    size as usize
                } else {
                    1
                };
                if req.counts.len() != expected {
                    return Err(CollectiveError::MismatchedCount {
                        kind: kind.name(),
                        expected,
                        actual: req.counts.len(),
                    });
                }
                if req.type_size == 0 {
                    return Err(CollectiveError::MismatchedCount {
                        kind: kind.name(),
                        expected: 1,
                        actual: 0,
                    });
                }
                req.counts
            }
        };

        if let Some((_, dtype)) = kind.reduction()
            && dtype.size_in_bytes() != req.type_size
        {
            return Err(CollectiveError::ElementSizeMismatch {
                dtype,
                type_size: req.type_size,
            });
        }

        let coll = Self {
            comm: comm.clone(),
            kind,
            tag: req.tag,
            root,
            counts,
            type_size: req.type_size,
            src: req.src,
            dst: req.dst,
            cq: req.cq,
        };
        coll.check_buffers()?;
        Ok(coll)
    }

    fn check_buffers(&self) -> Result<()> {
        let rank = self.comm.rank();
        let is_root = rank == self.root;
        let own = self.block_bytes(rank);
        let (src_need, dst_need) = match self.kind {
            CollectiveKind::Barrier => (0, 0),
            CollectiveKind::Bcast => {
                if is_root {
                    (self.payload_bytes(), 0)
                } else {
                    (0, self.payload_bytes())
                }
            }
            CollectiveKind::Scatter => (if is_root { self.total_bytes() } else { 0 }, own),
            CollectiveKind::Gather => (own, if is_root { self.total_bytes() } else { 0 }),
            CollectiveKind::Allgather => (own, self.total_bytes()),
            CollectiveKind::Reduce { .. } => {
                (self.payload_bytes(), if is_root { self.payload_bytes() } else { 0 })
            }
            CollectiveKind::Allreduce { .. } => (self.payload_bytes(), self.payload_bytes()),
        };
        self.check_buffer(self.src, "source", src_need)?;
        self.check_buffer(self.dst, "destination", dst_need)
    }

    fn check_buffer(&self, buf: Option<BufferRef>, which: &'static str, need: usize) -> Result<()> {
        if need == 0 {
            return Ok(());
        }
        let buf = buf.ok_or(CollectiveError::MissingBuffer {
            kind: self.kind.name(),
            which,
            rank: self.comm.rank(),
        })?;
        if buf.len_bytes() < need {
            return Err(CollectiveError::BufferSizeMismatch {
                expected: need,
                actual: buf.len_bytes(),
            });
        }
        Ok(())
    }

    pub fn comm(&self) -> &Communicator {
        &self.comm
    }

    pub fn comm_id(&self) -> CommId {
        self.comm.id()
    }

    pub fn kind(&self) -> CollectiveKind {
        self.kind
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn root(&self) -> Rank {
        self.root
    }

    pub fn cq(&self) -> CqId {
        self.cq
    }

    pub fn type_size(&self) -> usize {
        self.type_size
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub(crate) fn src(&self) -> Option<BufferRef> {
        self.src
    }

    pub(crate) fn dst(&self) -> Option<BufferRef> {
        self.dst
    }

    /// Bytes contributed by `rank` (per-rank kinds only; 0 otherwise).
    pub fn block_bytes(&self, rank: Rank) -> usize {
        if self.kind.has_per_rank_counts() {
            self.counts.get(rank as usize).copied().unwrap_or(0) * self.type_size
        } else {
            0
        }
    }

    /// Per-rank block sizes in bytes, in rank order.
    pub fn all_block_bytes(&self) -> Vec<usize> {
        (0..self.comm.size()).map(|r| self.block_bytes(r)).collect()
    }

    /// Bytes of the single vector moved by bcast/reduce/allreduce.
    pub fn payload_bytes(&self) -> usize {
        if self.kind.has_per_rank_counts() {
            0
        } else {
            self.counts.first().copied().unwrap_or(0) * self.type_size
        }
    }

    /// Total bytes assembled by scatter/gather/allgather.
    pub fn total_bytes(&self) -> usize {
        self.all_block_bytes().iter().sum()
    }

    /// Payload size used for algorithm selection.
    pub fn selection_bytes(&self) -> usize {
        if self.kind.has_per_rank_counts() {
            self.total_bytes()
        } else {
            self.payload_bytes()
        }
    }
}
