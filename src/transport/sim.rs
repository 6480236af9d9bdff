use super::{Completion, RequestId, Transport, TransportEvent, WireTag};
use crate::types::{GlobalId, SimTime};
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MatchKey {
    from: GlobalId,
    to: GlobalId,
    tag: WireTag,
}

#[derive(Debug)]
struct PostedRecv {
    request: RequestId,
    capacity: usize,
}

/// One message accepted by the network, in send order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub from: GlobalId,
    pub to: GlobalId,
    pub tag: WireTag,
    pub len: usize,
}

/// In-memory transport connecting every participant of a simulation.
///
/// Sends are eager: the send completes as soon as it is posted and the
/// payload waits in an unexpected-message queue until the matching receive
/// is posted. Matching is FIFO per `(from, to, tag)`. Completions queue up
/// until the driver pops them, so the driver controls delivery order; each
/// delivered event advances the logical clock by one tick.
#[derive(Debug, Default)]
pub struct SimNetwork {
    next_request: u64,
    clock: u64,
    events: VecDeque<TransportEvent>,
    posted: HashMap<MatchKey, VecDeque<PostedRecv>>,
    unexpected: HashMap<MatchKey, VecDeque<(RequestId, Bytes)>>,
    failed: HashSet<GlobalId>,
    log: Vec<MessageRecord>,
}

impl SimNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the oldest queued completion.
    pub fn pop_event(&mut self) -> Option<TransportEvent> {
        let ev = self.events.pop_front()?;
        self.clock += 1;
        Some(ev)
    }

    /// Take every queued completion, leaving the queue empty.
    pub fn take_events(&mut self) -> Vec<TransportEvent> {
        self.clock += self.events.len() as u64;
        self.events.drain(..).collect()
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Current logical time: one tick per delivered event plus any `advance`.
    pub fn now(&self) -> SimTime {
        SimTime(self.clock)
    }

    /// Advance the logical clock without delivering anything.
    pub fn advance(&mut self, ticks: u64) {
        self.clock += ticks;
    }

    /// Stop all traffic to and from `node`. Its requests never complete.
    pub fn fail_node(&mut self, node: GlobalId) {
        self.failed.insert(node);
        self.events.retain(|ev| ev.owner != node && ev.partner != node);
    }

    /// Every message accepted so far, in send order.
    pub fn message_log(&self) -> &[MessageRecord] {
        &self.log
    }

    /// Receives still waiting for a matching send.
    pub fn posted_receives(&self) -> usize {
        self.posted.values().map(VecDeque::len).sum()
    }

    /// Sent payloads still waiting for a matching receive.
    pub fn queued_messages(&self) -> usize {
        self.unexpected.values().map(VecDeque::len).sum()
    }

    fn next_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }

    fn deliver(&mut self, request: RequestId, key: MatchKey, payload: Bytes, capacity: usize) {
        if payload.len() > capacity {
            tracing::debug!(
                %request,
                len = payload.len(),
                capacity,
                "sim network: message longer than posted receive"
            );
        }
        self.events.push_back(TransportEvent {
            request,
            owner: key.to,
            partner: key.from,
            tag: key.tag,
            completion: Completion::Received(payload),
        });
    }
}

impl Transport for SimNetwork {
    fn send(&mut self, from: GlobalId, to: GlobalId, tag: WireTag, payload: Bytes) -> RequestId {
        let request = self.next_id();
        if self.failed.contains(&from) || self.failed.contains(&to) {
            return request;
        }
        self.log.push(MessageRecord {
            from,
            to,
            tag,
            len: payload.len(),
        });
        self.events.push_back(TransportEvent {
            request,
            owner: from,
            partner: to,
            tag,
            completion: Completion::Sent,
        });

        let key = MatchKey { from, to, tag };
        match pop_front(&mut self.posted, &key) {
            Some(recv) => self.deliver(recv.request, key, payload, recv.capacity),
            None => self
                .unexpected
                .entry(key)
                .or_default()
                .push_back((request, payload)),
        }
        request
    }

    fn recv(&mut self, at: GlobalId, from: GlobalId, tag: WireTag, capacity: usize) -> RequestId {
        let request = self.next_id();
        if self.failed.contains(&at) {
            return request;
        }
        let key = MatchKey { from, to: at, tag };
        match pop_front(&mut self.unexpected, &key) {
            Some((_, payload)) => self.deliver(request, key, payload, capacity),
            None => self
                .posted
                .entry(key)
                .or_default()
                .push_back(PostedRecv { request, capacity }),
        }
        request
    }

    fn cancel(&mut self, request: RequestId) {
        self.posted.retain(|_, queue| {
            queue.retain(|p| p.request != request);
            !queue.is_empty()
        });
        self.unexpected.retain(|_, queue| {
            queue.retain(|(sent, _)| *sent != request);
            !queue.is_empty()
        });
        self.events.retain(|ev| ev.request != request);
    }

    fn now(&self) -> SimTime {
        SimNetwork::now(self)
    }
}

/// Pop the oldest entry queued under `key`, dropping the queue once empty.
fn pop_front<T>(map: &mut HashMap<MatchKey, VecDeque<T>>, key: &MatchKey) -> Option<T> {
    let queue = map.get_mut(key)?;
    let item = queue.pop_front();
    if queue.is_empty() {
        map.remove(key);
    }
    item
}
