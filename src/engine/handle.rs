use crate::error::{CollectiveError, Result};
use crate::types::{CollectiveKind, CommId, CqId, Tag};
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Handle to a collective started on a [`CollectiveEngine`](crate::CollectiveEngine).
///
/// Resolved by the engine when the local part finishes, fails, or is
/// cancelled. Async callers `wait()`; a driver loop can poll with
/// [`try_result`](Self::try_result). If the engine is dropped first the
/// handle resolves with [`CollectiveError::Cancelled`].
#[derive(Debug)]
pub struct CollectiveHandle {
    comm: CommId,
    tag: Tag,
    rx: oneshot::Receiver<Result<()>>,
    outcome: Option<Result<()>>,
}

impl CollectiveHandle {
    pub(crate) fn new(comm: CommId, tag: Tag) -> (Self, oneshot::Sender<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        let handle = Self {
            comm,
            tag,
            rx,
            outcome: None,
        };
        (handle, tx)
    }

    /// The `(communicator, tag)` pair this collective is registered under.
    pub fn key(&self) -> (CommId, Tag) {
        (self.comm, self.tag)
    }

    /// Wait for the collective to complete and propagate any error.
    pub async fn wait(self) -> Result<()> {
        match self.outcome {
            Some(outcome) => outcome,
            None => self.rx.await.unwrap_or(Err(CollectiveError::Cancelled)),
        }
    }

    /// The outcome, if the collective has finished (non-blocking).
    pub fn try_result(&mut self) -> Option<Result<()>> {
        if self.outcome.is_none() {
            self.outcome = match self.rx.try_recv() {
                Ok(outcome) => Some(outcome),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Closed) => Some(Err(CollectiveError::Cancelled)),
            };
        }
        self.outcome.clone()
    }

    pub fn is_finished(&mut self) -> bool {
        self.try_result().is_some()
    }
}

/// Record pushed onto a completion queue when a collective resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectiveDone {
    pub comm: CommId,
    pub tag: Tag,
    pub kind: CollectiveKind,
    pub result: Result<()>,
}

impl CollectiveDone {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Sink for completion records, keyed by completion-queue id.
pub trait CompletionQueue {
    fn push(&mut self, cq: CqId, done: CollectiveDone);
}

/// In-process completion queues with FIFO order per queue id.
#[derive(Debug, Default)]
pub struct LocalCompletionQueue {
    queues: HashMap<CqId, VecDeque<CollectiveDone>>,
}

impl LocalCompletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the oldest record of queue `cq`.
    pub fn poll(&mut self, cq: CqId) -> Option<CollectiveDone> {
        self.queues.get_mut(&cq)?.pop_front()
    }

    pub fn len(&self, cq: CqId) -> usize {
        self.queues.get(&cq).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, cq: CqId) -> bool {
        self.len(cq) == 0
    }

    /// Remove and return every record of queue `cq`.
    pub fn drain(&mut self, cq: CqId) -> Vec<CollectiveDone> {
        self.queues
            .get_mut(&cq)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }
}

impl CompletionQueue for LocalCompletionQueue {
    fn push(&mut self, cq: CqId, done: CollectiveDone) {
        self.queues.entry(cq).or_default().push_back(done);
    }
}
