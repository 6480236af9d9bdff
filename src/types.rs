/// Rank of a participant in a communicator group (0-indexed).
pub type Rank = u32;

/// Globally addressable participant id (one per simulated process/endpoint).
pub type GlobalId = u32;

/// Identifier of a communicator. Fresh ids are handed out on create/dup/split.
pub type CommId = u32;

/// Caller-chosen tag disambiguating concurrent collectives on one communicator.
pub type Tag = u32;

/// Completion queue identifier.
pub type CqId = u32;

/// Logical simulation time, owned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    /// Time elapsed since `earlier`, saturating at zero.
    pub fn since(self, earlier: SimTime) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t={}", self.0)
    }
}

/// Element types understood by the reduction kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    F32 = 0,
    F64 = 1,
    I8 = 2,
    I32 = 3,
    I64 = 4,
    U8 = 5,
    U32 = 6,
    U64 = 7,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            DataType::F32 | DataType::I32 | DataType::U32 => 4,
            DataType::F64 | DataType::I64 | DataType::U64 => 8,
            DataType::I8 | DataType::U8 => 1,
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            DataType::F32 => "f32",
            DataType::F64 => "f64",
            DataType::I8 => "i8",
            DataType::I32 => "i32",
            DataType::I64 => "i64",
            DataType::U8 => "u8",
            DataType::U32 => "u32",
            DataType::U64 => "u64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Reduction operations for reduce and allreduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    /// Element-wise sum across ranks.
    Sum,
    /// Element-wise product across ranks.
    Prod,
    /// Element-wise minimum across ranks.
    Min,
    /// Element-wise maximum across ranks.
    Max,
}

impl std::fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReduceOp::Sum => f.write_str("sum"),
            ReduceOp::Prod => f.write_str("prod"),
            ReduceOp::Min => f.write_str("min"),
            ReduceOp::Max => f.write_str("max"),
        }
    }
}

/// The logical collective operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectiveKind {
    Barrier,
    Bcast,
    /// Root distributes `counts[i]` elements to rank `i` (scatterv when counts differ).
    Scatter,
    /// Root collects `counts[i]` elements from rank `i`.
    Gather,
    /// Every rank ends up with every rank's contribution, in rank order.
    Allgather,
    Reduce { op: ReduceOp, dtype: DataType },
    Allreduce { op: ReduceOp, dtype: DataType },
}

impl CollectiveKind {
    /// Human-readable name, used in logs and error messages.
    pub const fn name(self) -> &'static str {
        match self {
            CollectiveKind::Barrier => "barrier",
            CollectiveKind::Bcast => "bcast",
            CollectiveKind::Scatter => "scatter",
            CollectiveKind::Gather => "gather",
            CollectiveKind::Allgather => "allgather",
            CollectiveKind::Reduce { .. } => "reduce",
            CollectiveKind::Allreduce { .. } => "allreduce",
        }
    }

    /// Whether the operation is rooted at one participant.
    pub const fn is_rooted(self) -> bool {
        matches!(
            self,
            CollectiveKind::Bcast
                | CollectiveKind::Scatter
                | CollectiveKind::Gather
                | CollectiveKind::Reduce { .. }
        )
    }

    /// Whether `counts` carries one entry per participant (otherwise exactly one entry).
    pub const fn has_per_rank_counts(self) -> bool {
        matches!(
            self,
            CollectiveKind::Scatter | CollectiveKind::Gather | CollectiveKind::Allgather
        )
    }

    /// The reduction applied by this collective, if any.
    pub const fn reduction(self) -> Option<(ReduceOp, DataType)> {
        match self {
            CollectiveKind::Reduce { op, dtype } | CollectiveKind::Allreduce { op, dtype } => {
                Some((op, dtype))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for CollectiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reduction() {
            Some((op, dtype)) => write!(f, "{}({op}, {dtype})", self.name()),
            None => f.write_str(self.name()),
        }
    }
}
