//! Static group/rank abstraction.
//!
//! A `Communicator` is one participant's view of a group: the ordered list of
//! global participant ids plus the owning participant's local rank. It is
//! immutable; `dup` and `subset` produce new communicators.

use crate::error::{CollectiveError, Result};
use crate::types::{CommId, GlobalId, Rank};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Communicator {
    id: CommId,
    rank: Rank,
    members: Arc<[GlobalId]>,
    index: Arc<HashMap<GlobalId, Rank>>,
}

impl Communicator {
    /// Build the view of `members` owned by local rank `rank`.
    pub fn new(id: CommId, rank: Rank, members: Vec<GlobalId>) -> Result<Self> {
        if members.is_empty() {
            return Err(CollectiveError::InvalidCommunicator(format!(
                "comm {id} has no members"
            )));
        }
        let mut index = HashMap::with_capacity(members.len());
        for (r, &gid) in members.iter().enumerate() {
            if index.insert(gid, r as Rank).is_some() {
                return Err(CollectiveError::InvalidCommunicator(format!(
                    "comm {id} lists participant {gid} twice"
                )));
            }
        }
        if rank as usize >= members.len() {
            return Err(CollectiveError::InvalidRank {
                rank,
                size: members.len() as u32,
            });
        }
        Ok(Self {
            id,
            rank,
            members: members.into(),
            index: Arc::new(index),
        })
    }

    /// One view per member, indexed by local rank.
    pub fn world(id: CommId, members: Vec<GlobalId>) -> Result<Vec<Communicator>> {
        let first = Self::new(id, 0, members)?;
        Ok((0..first.size())
            .map(|rank| Communicator {
                rank,
                ..first.clone()
            })
            .collect())
    }

    pub fn id(&self) -> CommId {
        self.id
    }

    pub fn size(&self) -> u32 {
        self.members.len() as u32
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Global id of the participant owning this view.
    pub fn my_global_id(&self) -> GlobalId {
        self.members[self.rank as usize]
    }

    /// Global id of `rank`. Fails if `rank` is outside `[0, size)`.
    pub fn global_id(&self, rank: Rank) -> Result<GlobalId> {
        self.members
            .get(rank as usize)
            .copied()
            .ok_or(CollectiveError::InvalidRank {
                rank,
                size: self.size(),
            })
    }

    /// Local rank of a global participant, if it belongs to this group.
    pub fn local_rank(&self, gid: GlobalId) -> Option<Rank> {
        self.index.get(&gid).copied()
    }

    /// Ordered member list.
    pub fn members(&self) -> &[GlobalId] {
        &self.members
    }

    /// Same group and rank under a new communicator id.
    pub fn dup(&self, new_id: CommId) -> Communicator {
        Communicator {
            id: new_id,
            ..self.clone()
        }
    }

    /// Sub-group made of the given parent ranks, in the given order.
    ///
    /// Returns `Ok(None)` when the owning participant is not part of the
    /// sub-group. This is the building block for color/key splits.
    pub fn subset(&self, new_id: CommId, ranks: &[Rank]) -> Result<Option<Communicator>> {
        let members = ranks
            .iter()
            .map(|&r| self.global_id(r))
            .collect::<Result<Vec<_>>>()?;
        match ranks.iter().position(|&r| r == self.rank) {
            Some(new_rank) => Ok(Some(Self::new(new_id, new_rank as Rank, members)?)),
            None => Ok(None),
        }
    }

    /// Split by `(color, key)` pairs, one per parent rank.
    ///
    /// Ranks sharing this participant's color form the new group, ordered by
    /// `(key, parent rank)`.
    pub fn split(&self, new_id: CommId, colors_and_keys: &[(u32, u32)]) -> Result<Communicator> {
        if colors_and_keys.len() != self.members.len() {
            return Err(CollectiveError::MismatchedCount {
                kind: "split",
                expected: self.members.len(),
                actual: colors_and_keys.len(),
            });
        }
        let my_color = colors_and_keys[self.rank as usize].0;
        let mut group: Vec<(Rank, u32)> = colors_and_keys
            .iter()
            .enumerate()
            .filter(|&(_, &(c, _))| c == my_color)
            .map(|(r, &(_, k))| (r as Rank, k))
            .collect();
        group.sort_by_key(|&(r, k)| (k, r));
        let ranks: Vec<Rank> = group.into_iter().map(|(r, _)| r).collect();
        self.subset(new_id, &ranks)?.ok_or_else(|| {
            CollectiveError::InvalidCommunicator(format!(
                "rank {} missing from its own color group",
                self.rank
            ))
        })
    }
}
