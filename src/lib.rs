//! Event-driven collective communication engine.
//!
//! Every collective (barrier, bcast, scatter, gather, allgather, reduce,
//! allreduce) is compiled into a per-rank DAG of point-to-point actions.
//! A [`CollectiveEngine`] advances those DAGs as transport completions
//! arrive; it never blocks and never owns the transport.

mod actor;
pub mod algorithm;
pub mod comm;
pub mod config;
pub mod dag;
pub mod engine;
pub mod error;
pub mod memory;
mod reduce;
pub mod transport;
pub mod types;

pub use actor::StalledAction;
pub use algorithm::AlgorithmKind;
pub use comm::Communicator;
pub use config::EngineConfig;
pub use engine::{
    CollectiveDone, CollectiveEngine, CollectiveHandle, CollectiveRequest, CompletionQueue,
    LocalCompletionQueue, Progress,
};
pub use error::{CollectiveError, Result};
pub use memory::{BufferRef, ScratchStats};
pub use transport::{SimNetwork, Transport, TransportEvent, WireTag};
pub use types::{CollectiveKind, CommId, CqId, DataType, GlobalId, Rank, ReduceOp, SimTime, Tag};
