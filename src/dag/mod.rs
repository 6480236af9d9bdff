//! Arena-backed action DAG.
//!
//! Actions live in a `Vec` indexed by `ActionId`; edges are index lists.
//! Edges only point from a lower id to a higher one, so insertion order is a
//! topological order and the graph cannot contain a cycle.

mod action;

pub use action::{Action, ActionId, ActionKind, ActionState, BufId, Region};

use std::collections::VecDeque;

#[derive(Debug, Clone, Default)]
pub struct ActionDag {
    actions: Vec<Action>,
    rounds: u32,
    slots: Vec<usize>,
}

impl ActionDag {
    /// Empty DAG for an algorithm spanning `rounds` rounds.
    pub fn new(rounds: u32) -> Self {
        Self {
            actions: Vec::new(),
            rounds,
            slots: Vec::new(),
        }
    }

    /// Append an action and return its id.
    pub fn push(&mut self, mut action: Action) -> ActionId {
        let id = self.actions.len();
        action.id = id;
        self.actions.push(action);
        id
    }

    /// Require `before` to complete before `after` may start.
    pub fn depend(&mut self, before: ActionId, after: ActionId) {
        debug_assert!(before < after, "edge {before} -> {after} breaks id order");
        if before >= after || self.actions[after].preds.contains(&before) {
            return;
        }
        self.actions[before].succs.push(after);
        self.actions[after].preds.push(before);
    }

    /// Reserve a receive slot of `len` bytes; returns its index.
    pub fn add_slot(&mut self, len: usize) -> usize {
        self.slots.push(len);
        self.slots.len() - 1
    }

    /// Number of algorithm rounds (independent of how many this rank takes part in).
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action(&self, id: ActionId) -> &Action {
        &self.actions[id]
    }

    pub(crate) fn action_mut(&mut self, id: ActionId) -> &mut Action {
        &mut self.actions[id]
    }

    pub fn slot_len(&self, slot: usize) -> usize {
        self.slots.get(slot).copied().unwrap_or(0)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Reset every action to its initial state and queue the ones with no
    /// predecessors.
    pub(crate) fn seal(&mut self, ready: &mut VecDeque<ActionId>) {
        for a in &mut self.actions {
            a.waiting_on = a.preds.len();
            a.outstanding = 0;
            a.issued_at = None;
            if a.waiting_on == 0 {
                a.state = ActionState::Ready;
                ready.push_back(a.id);
            } else {
                a.state = ActionState::Pending;
            }
        }
    }

    /// Mark `id` complete and promote successors whose predecessors are all done.
    pub(crate) fn complete(&mut self, id: ActionId, ready: &mut VecDeque<ActionId>) {
        let action = &mut self.actions[id];
        if action.state == ActionState::Complete {
            return;
        }
        action.state = ActionState::Complete;
        for i in 0..self.actions[id].succs.len() {
            let s = self.actions[id].succs[i];
            let succ = &mut self.actions[s];
            succ.waiting_on -= 1;
            if succ.waiting_on == 0 && succ.state == ActionState::Pending {
                succ.state = ActionState::Ready;
                ready.push_back(s);
            }
        }
    }

    /// Mark every action that has not completed as failed.
    pub(crate) fn fail_unfinished(&mut self) -> usize {
        let mut failed = 0;
        for a in &mut self.actions {
            if a.state != ActionState::Complete {
                a.state = ActionState::Failed;
                failed += 1;
            }
        }
        failed
    }

    pub fn count_in(&self, state: ActionState) -> usize {
        self.actions.iter().filter(|a| a.state == state).count()
    }
}
