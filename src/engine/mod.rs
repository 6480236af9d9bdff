//! Per-host registry of in-flight collectives.
//!
//! The engine owns one [`CollectiveActor`] per live `(communicator, tag)`
//! pair, routes transport completions to it, and resolves the caller's
//! handle plus a completion-queue record once the actor finishes.

mod collective;
mod handle;

pub use collective::{Collective, CollectiveRequest};
pub use handle::{CollectiveDone, CollectiveHandle, CompletionQueue, LocalCompletionQueue};

use crate::actor::{ActorStatus, CollectiveActor, StalledAction};
use crate::algorithm::{AlgorithmKind, TreeGeometry};
use crate::comm::Communicator;
use crate::config::EngineConfig;
use crate::dag::ActionDag;
use crate::error::{CollectiveError, Result};
use crate::memory::{ScratchPool, ScratchStats};
use crate::transport::{Transport, TransportEvent};
use crate::types::{CommId, SimTime, Tag};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// What a call to [`CollectiveEngine::progress`] did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// No live collective or no in-flight request matched the event.
    Ignored,
    /// The event was applied; the collective is still running.
    Advanced,
    /// The collective finished and its handle resolved successfully.
    Completed { comm: CommId, tag: Tag },
    /// The collective hit a fatal error and was aborted.
    Failed {
        comm: CommId,
        tag: Tag,
        error: CollectiveError,
    },
}

struct Live {
    actor: CollectiveActor,
    done: oneshot::Sender<Result<()>>,
}

/// Creates, deduplicates and drives the collectives of one participant.
///
/// Single-threaded: every method runs to completion and returns after
/// issuing whatever became ready. The transport is passed in on each call.
pub struct CollectiveEngine<Q: CompletionQueue = LocalCompletionQueue> {
    config: EngineConfig,
    pool: Arc<ScratchPool>,
    live: HashMap<(CommId, Tag), Live>,
    completions: Q,
}

impl CollectiveEngine<LocalCompletionQueue> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_queue(config, LocalCompletionQueue::new())
    }
}

impl Default for CollectiveEngine<LocalCompletionQueue> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<Q: CompletionQueue> CollectiveEngine<Q> {
    /// Engine reporting completions to `completions`.
    pub fn with_queue(config: EngineConfig, completions: Q) -> Self {
        let pool = ScratchPool::new(config.scratch_pool_size);
        Self {
            config,
            pool,
            live: HashMap::new(),
            completions,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start the local participant's part of a collective on `comm`.
    ///
    /// Validation errors are returned before anything is allocated or sent.
    /// A collective with nothing to do (e.g. a single-member communicator)
    /// resolves before this returns.
    pub fn start(
        &mut self,
        comm: &Communicator,
        request: CollectiveRequest,
        transport: &mut dyn Transport,
    ) -> Result<CollectiveHandle> {
        let key = (comm.id(), request.tag);
        if self.live.contains_key(&key) {
            return Err(CollectiveError::DuplicateCollective {
                comm: key.0,
                tag: key.1,
            });
        }
        let coll = Collective::validate(comm, request)?;
        let mut actor = CollectiveActor::new(coll, &self.config, Arc::clone(&self.pool))?;
        let (handle, done) = CollectiveHandle::new(key.0, key.1);

        match actor.start(transport) {
            Ok(ActorStatus::Done) => {
                let result = actor.finalize_buffers();
                self.resolve(key, Live { actor, done }, result);
            }
            Ok(_) => {
                self.live.insert(key, Live { actor, done });
            }
            Err(e) => {
                actor.abort(transport);
                self.resolve(key, Live { actor, done }, Err(e));
            }
        }
        Ok(handle)
    }

    /// Deliver one transport completion.
    ///
    /// The event is routed by the `(comm, tag)` in its wire tag; events for
    /// collectives that are no longer live are ignored.
    pub fn progress(&mut self, event: &TransportEvent, transport: &mut dyn Transport) -> Progress {
        let key = (event.tag.comm, event.tag.tag);
        let Some(live) = self.live.get_mut(&key) else {
            tracing::warn!(
                comm = key.0,
                tag = key.1,
                request = %event.request,
                "event for unknown collective ignored"
            );
            return Progress::Ignored;
        };

        match live.actor.on_event(event, transport) {
            Ok(ActorStatus::Stale) => Progress::Ignored,
            Ok(ActorStatus::Running) => Progress::Advanced,
            Ok(ActorStatus::Done) => {
                let Some(live) = self.live.remove(&key) else {
                    return Progress::Ignored;
                };
                match live.actor.finalize_buffers() {
                    Ok(()) => {
                        self.resolve(key, live, Ok(()));
                        Progress::Completed {
                            comm: key.0,
                            tag: key.1,
                        }
                    }
                    Err(error) => {
                        self.resolve(key, live, Err(error.clone()));
                        Progress::Failed {
                            comm: key.0,
                            tag: key.1,
                            error,
                        }
                    }
                }
            }
            Err(error) => {
                let Some(mut live) = self.live.remove(&key) else {
                    return Progress::Ignored;
                };
                live.actor.abort(transport);
                self.resolve(key, live, Err(error.clone()));
                Progress::Failed {
                    comm: key.0,
                    tag: key.1,
                    error,
                }
            }
        }
    }

    /// Cancel the collective behind `handle`.
    ///
    /// Unfinished actions are failed, outstanding requests withdrawn, scratch
    /// released, and the handle resolves with [`CollectiveError::Cancelled`].
    pub fn cancel(
        &mut self,
        handle: &CollectiveHandle,
        transport: &mut dyn Transport,
    ) -> Result<()> {
        let (comm, tag) = handle.key();
        self.cancel_key(comm, tag, transport)
    }

    fn cancel_key(&mut self, comm: CommId, tag: Tag, transport: &mut dyn Transport) -> Result<()> {
        let mut live = self
            .live
            .remove(&(comm, tag))
            .ok_or(CollectiveError::UnknownCollective { comm, tag })?;
        live.actor.abort(transport);
        self.resolve((comm, tag), live, Err(CollectiveError::Cancelled));
        Ok(())
    }

    /// Cancel every collective still running on communicator `comm`.
    /// Returns how many were cancelled.
    pub fn free_communicator(&mut self, comm: CommId, transport: &mut dyn Transport) -> usize {
        let mut tags: Vec<Tag> = self
            .live
            .keys()
            .filter(|(c, _)| *c == comm)
            .map(|&(_, t)| t)
            .collect();
        tags.sort_unstable();
        let mut cancelled = 0;
        for tag in tags {
            if self.cancel_key(comm, tag, transport).is_ok() {
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::debug!(comm, cancelled, "communicator freed with live collectives");
        }
        cancelled
    }

    /// Actions in flight for at least `older_than` ticks, oldest first.
    pub fn stalled(&self, now: SimTime, older_than: u64) -> Vec<StalledAction> {
        let mut all: Vec<StalledAction> = self
            .live
            .values()
            .flat_map(|live| live.actor.stalled(now, older_than))
            .collect();
        all.sort_by_key(|s| (s.issued_at, s.comm, s.tag, s.action));
        all
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, comm: CommId, tag: Tag) -> bool {
        self.live.contains_key(&(comm, tag))
    }

    pub fn scratch_stats(&self) -> ScratchStats {
        self.pool.stats()
    }

    /// Algorithm chosen for a live collective.
    pub fn algorithm(&self, comm: CommId, tag: Tag) -> Option<AlgorithmKind> {
        self.live.get(&(comm, tag)).map(|l| l.actor.algorithm())
    }

    /// Action DAG of a live collective.
    pub fn dag(&self, comm: CommId, tag: Tag) -> Option<&ActionDag> {
        self.live.get(&(comm, tag)).map(|l| l.actor.dag())
    }

    /// Tree geometry of a live tree-based collective.
    pub fn tree(&self, comm: CommId, tag: Tag) -> Option<&TreeGeometry> {
        self.live.get(&(comm, tag)).and_then(|l| l.actor.tree())
    }

    pub fn completions(&self) -> &Q {
        &self.completions
    }

    pub fn completions_mut(&mut self) -> &mut Q {
        &mut self.completions
    }

    fn resolve(&mut self, key: (CommId, Tag), live: Live, result: Result<()>) {
        let coll = live.actor.collective();
        let (kind, cq) = (coll.kind(), coll.cq());
        match &result {
            Ok(()) => tracing::debug!(comm = key.0, tag = key.1, %kind, "collective complete"),
            Err(e) => {
                tracing::debug!(comm = key.0, tag = key.1, %kind, error = %e, "collective failed")
            }
        }
        // The caller may have dropped the handle; the queue still gets the record.
        let _ = live.done.send(result.clone());
        self.completions.push(
            cq,
            CollectiveDone {
                comm: key.0,
                tag: key.1,
                kind,
                result,
            },
        );
    }
}
