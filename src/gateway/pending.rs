use std::collections::HashMap;

use tracing::debug;

use crate::model::task::{TaskField, TaskId};

/// What a pending mutation is keyed by. Two mutations with the same key are
/// ordered by send; different keys are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKey {
    Field(TaskId, TaskField),
    /// Create or delete of one task
    Lifecycle(TaskId),
    /// The whole-project scheduling pass
    Recompute,
}

impl MutationKey {
    pub fn task(self) -> Option<TaskId> {
        match self {
            MutationKey::Field(id, _) | MutationKey::Lifecycle(id) => Some(id),
            MutationKey::Recompute => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Proposed,
    Sent,
    Confirmed,
    Rejected,
    RolledBack,
    /// A newer send to the same key won; the response was discarded
    Superseded,
}

impl MutationState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, MutationState::Proposed | MutationState::Sent)
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    seq: u64,
    state: MutationState,
}

/// The latest mutation per key. Sequence numbers grow monotonically, so a
/// response whose sequence is no longer the latest for its key is stale.
#[derive(Debug, Default)]
pub struct PendingTable {
    next_seq: u64,
    latest: HashMap<MutationKey, Pending>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new mutation over `keys` and return its sequence number.
    /// Any older mutation on the same keys loses them.
    pub fn propose(&mut self, keys: &[MutationKey]) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        for key in keys {
            if let Some(old) = self.latest.get(key) {
                debug!(?key, old = old.seq, new = seq, "mutation superseded");
            }
            self.latest.insert(
                *key,
                Pending {
                    seq,
                    state: MutationState::Proposed,
                },
            );
        }
        debug!(seq, ?keys, "mutation proposed");
        seq
    }

    /// Move every key still owned by `seq` to `state`.
    pub fn mark(&mut self, keys: &[MutationKey], seq: u64, state: MutationState) {
        for key in keys {
            if let Some(pending) = self.latest.get_mut(key)
                && pending.seq == seq
            {
                pending.state = state;
            }
        }
        debug!(seq, ?state, "mutation");
    }

    pub fn is_current(&self, key: MutationKey, seq: u64) -> bool {
        self.latest.get(&key).is_some_and(|p| p.seq == seq)
    }

    /// Some mutation other than `seq` is in flight on `key`
    pub fn owned_by_other(&self, key: MutationKey, seq: u64) -> bool {
        self.latest.get(&key).is_some_and(|p| p.seq != seq)
    }

    /// The subset of `keys` that `seq` still owns
    pub fn owned(&self, keys: &[MutationKey], seq: u64) -> Vec<MutationKey> {
        keys.iter()
            .copied()
            .filter(|k| self.is_current(*k, seq))
            .collect()
    }

    /// Settle `seq` on `keys`. Keys it still owns are released; keys a newer
    /// mutation took over are left alone. Returns the keys released.
    pub fn finish(&mut self, keys: &[MutationKey], seq: u64, state: MutationState) -> Vec<MutationKey> {
        let released = self.owned(keys, seq);
        for key in &released {
            self.latest.remove(key);
        }
        if released.is_empty() {
            debug!(seq, "mutation superseded, response discarded");
        } else {
            debug!(seq, ?state, "mutation settled");
        }
        released
    }

    /// Forget every pending entry that addresses `id`.
    pub fn clear_task(&mut self, id: TaskId) {
        self.latest.retain(|key, _| key.task() != Some(id));
    }

    pub fn state(&self, key: MutationKey) -> Option<MutationState> {
        self.latest.get(&key).map(|p| p.state)
    }

    /// Number of keys with a mutation in flight
    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}
