//! Snapshot history for undo/redo

use modux_core::{MutationPayload, Payload, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A point-in-time copy of the whole state tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Unique snapshot id
    pub id: String,
    /// Timestamp of snapshot creation
    pub timestamp: Timestamp,
    /// Full tree as it was before `mutation` ran
    pub state: Payload,
    /// Mutation applied on top of this state, `None` for a captured head
    pub mutation: Option<MutationPayload>,
}

impl StateSnapshot {
    pub fn new(state: Payload, mutation: Option<MutationPayload>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Timestamp::now(),
            state,
            mutation,
        }
    }
}

/// Ordered snapshots plus a cursor
///
/// Entries hold pre-mutation states. While the cursor equals `len()` the live
/// tree is newer than every entry; the first undo from there captures the
/// live tree as a head entry so redo can return to it.
pub struct History {
    snapshots: VecDeque<StateSnapshot>,
    cursor: usize,
    max_size: usize,
    max_age_ms: Option<u64>,
}

impl History {
    pub fn new(max_size: usize, max_age_ms: Option<u64>) -> Self {
        Self {
            snapshots: VecDeque::new(),
            cursor: 0,
            max_size: max_size.max(1),
            max_age_ms,
        }
    }

    /// Record the pre-mutation tree, discarding any redo branch
    pub fn record(&mut self, state: Payload, mutation: MutationPayload) {
        self.snapshots.truncate(self.cursor);
        self.snapshots.push_back(StateSnapshot::new(state, Some(mutation)));
        self.cursor = self.snapshots.len();
        self.prune_by_age(Timestamp::now());
        self.enforce_capacity();
    }

    /// Step back one entry, returning the tree to restore
    pub fn step_back(&mut self, live: Payload) -> Option<Payload> {
        if self.cursor == 0 {
            return None;
        }
        if self.cursor == self.snapshots.len() {
            self.snapshots.push_back(StateSnapshot::new(live, None));
            self.enforce_capacity();
            if self.cursor == 0 {
                return None;
            }
        }
        self.cursor -= 1;
        Some(self.snapshots[self.cursor].state.clone())
    }

    /// Step forward one entry, returning the tree to restore
    pub fn step_forward(&mut self) -> Option<Payload> {
        if self.cursor + 1 >= self.snapshots.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.snapshots[self.cursor].state.clone())
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    /// Snapshots oldest first
    pub fn snapshots(&self) -> impl Iterator<Item = &StateSnapshot> {
        self.snapshots.iter()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = 0;
    }

    fn enforce_capacity(&mut self) {
        while self.snapshots.len() > self.max_size {
            self.snapshots.pop_front();
            self.cursor = self.cursor.saturating_sub(1);
        }
    }

    fn prune_by_age(&mut self, now: Timestamp) {
        let Some(max_age) = self.max_age_ms else {
            return;
        };
        // the newest entry is always kept
        while self.snapshots.len() > 1
            && self
                .snapshots
                .front()
                .is_some_and(|oldest| oldest.timestamp.elapsed_until(now) > max_age)
        {
            self.snapshots.pop_front();
            self.cursor = self.cursor.saturating_sub(1);
        }
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(50, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mutation(name: &str) -> MutationPayload {
        MutationPayload::new(name, Payload::Null)
    }

    #[test]
    fn test_undo_redo_walk() {
        let mut history = History::new(10, None);
        history.record(json!(0), mutation("m1"));
        history.record(json!(1), mutation("m2"));
        assert_eq!(history.cursor(), 2);
        assert!(!history.can_redo());

        assert_eq!(history.step_back(json!(2)), Some(json!(1)));
        assert_eq!(history.len(), 3);
        assert_eq!(history.step_back(json!(1)), Some(json!(0)));
        assert_eq!(history.step_back(json!(0)), None);

        assert_eq!(history.step_forward(), Some(json!(1)));
        assert_eq!(history.step_forward(), Some(json!(2)));
        assert_eq!(history.step_forward(), None);
    }

    #[test]
    fn test_record_after_undo_discards_branch() {
        let mut history = History::new(10, None);
        history.record(json!(0), mutation("m1"));
        history.record(json!(1), mutation("m2"));
        history.step_back(json!(2));
        history.step_back(json!(1));

        history.record(json!(0), mutation("m3"));

        assert_eq!(history.len(), 1);
        assert_eq!(history.snapshots[0].mutation.as_ref().unwrap().mutation_type, "m3");
        assert!(!history.can_redo());
        assert_eq!(history.step_forward(), None);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = History::new(3, None);
        for i in 0..5 {
            history.record(json!(i), mutation(&format!("m{}", i)));
        }

        assert_eq!(history.len(), 3);
        assert_eq!(history.cursor(), 3);
        assert_eq!(history.snapshots[0].state, json!(2));

        // head capture also respects the cap
        assert_eq!(history.step_back(json!(5)), Some(json!(4)));
        assert_eq!(history.len(), 3);
        assert_eq!(history.cursor(), 1);
    }

    #[test]
    fn test_age_pruning_keeps_newest() {
        let mut history = History::new(10, Some(1_000));
        history.record(json!(0), mutation("m1"));
        history.snapshots[0].timestamp = Timestamp::from_millis(1);

        history.record(json!(1), mutation("m2"));

        assert_eq!(history.len(), 1);
        assert_eq!(history.snapshots[0].state, json!(1));
        assert_eq!(history.cursor(), 1);
    }

    #[test]
    fn test_clear() {
        let mut history = History::default();
        history.record(json!(0), mutation("m1"));
        history.clear();
        assert!(history.is_empty());
        assert!(!history.can_undo());
    }
}
