use crate::types::{CommId, DataType, Rank, Tag};

pub type Result<T> = std::result::Result<T, CollectiveError>;

/// Errors surfaced by the collective engine.
///
/// `Clone` so one failure can be delivered both to the caller's handle and to
/// the completion queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectiveError {
    #[error("invalid rank {rank}: communicator size is {size}")]
    InvalidRank { rank: Rank, size: u32 },

    #[error("collective already in flight on comm {comm} with tag {tag}")]
    DuplicateCollective { comm: CommId, tag: Tag },

    #[error(
        "buffer overflow at rank {rank} (action {action}): {actual} bytes into a {capacity}-byte region"
    )]
    BufferOverflow {
        rank: Rank,
        action: usize,
        capacity: usize,
        actual: usize,
    },

    #[error("{kind}: expected {expected} counts, got {actual}")]
    MismatchedCount {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("{kind} requires a {which} buffer on rank {rank}")]
    MissingBuffer {
        kind: &'static str,
        which: &'static str,
        rank: Rank,
    },

    #[error("element size {type_size} does not match {dtype} ({} bytes)", .dtype.size_in_bytes())]
    ElementSizeMismatch { dtype: DataType, type_size: usize },

    #[error("no live collective on comm {comm} with tag {tag}")]
    UnknownCollective { comm: CommId, tag: Tag },

    #[error("invalid communicator: {0}")]
    InvalidCommunicator(String),

    #[error("operation cancelled")]
    Cancelled,
}
