//! Boundary with the point-to-point transport.
//!
//! The engine only issues requests and consumes completions; the transport
//! alone decides delay, bandwidth and delivery order. [`SimNetwork`] is an
//! in-memory implementation used to drive the engine in tests and demos.

mod sim;

pub use sim::{MessageRecord, SimNetwork};

use crate::types::{CommId, GlobalId, SimTime, Tag};
use bytes::Bytes;

/// Transport-assigned id of one outstanding send or receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// Matching key carried by every message of a collective.
///
/// Two collectives on one communicator never share a `tag` while live, and
/// the round index separates messages a pair of ranks exchanges more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WireTag {
    pub comm: CommId,
    pub tag: Tag,
    pub round: u32,
}

/// Whether a completion refers to a send or a receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Sent,
    /// Received payload; may be empty for signal-only rounds.
    Received(Bytes),
}

/// Completion notification delivered to [`crate::CollectiveEngine::progress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub request: RequestId,
    /// Participant that issued the request (routes the event to its engine).
    pub owner: GlobalId,
    /// Remote end of the request.
    pub partner: GlobalId,
    pub tag: WireTag,
    pub completion: Completion,
}

/// Point-to-point operations the engine needs from a transport.
pub trait Transport {
    /// Post a send of `payload` from `from` to `to`.
    fn send(&mut self, from: GlobalId, to: GlobalId, tag: WireTag, payload: Bytes) -> RequestId;

    /// Post a receive at `at` for a message from `from`, of at most `capacity` bytes.
    ///
    /// The capacity is advisory; an oversized message is still delivered and
    /// rejected by the receiving actor.
    fn recv(&mut self, at: GlobalId, from: GlobalId, tag: WireTag, capacity: usize) -> RequestId;

    /// Withdraw an outstanding request. Completions already queued may still arrive.
    fn cancel(&mut self, _request: RequestId) {}

    /// Current simulated time.
    fn now(&self) -> SimTime {
        SimTime::ZERO
    }
}
