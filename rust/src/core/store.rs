// Ordered, id-deduplicated message list.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::reconcile::{supersedes, UpdateOutcome};
use crate::message::Message;

/// Where a batch lands relative to the current content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Head,
    #[default]
    Tail,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UpsertOutcome {
    Inserted,
    Merged(UpdateOutcome),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct BatchSummary {
    pub inserted: usize,
    pub merged: usize,
}

/// Invariant: `index[m.id] == position of m in messages` for every entry, and
/// ids are unique.
#[derive(Debug, Default)]
pub(crate) struct MessageStore {
    messages: Vec<Message>,
    index: HashMap<String, usize>,
}

impl MessageStore {
    pub(crate) fn len(&self) -> usize {
        self.messages.len()
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Message> {
        self.index.get(id).map(|&pos| &self.messages[pos])
    }

    pub(crate) fn all(&self) -> &[Message] {
        &self.messages
    }

    /// Appends unknown ids; known ids go through the timestamp rule instead of
    /// being overwritten.
    pub(crate) fn upsert(&mut self, message: Message) -> UpsertOutcome {
        match self.index.get(&message.id) {
            Some(&pos) => UpsertOutcome::Merged(self.replace_if_newer(pos, message)),
            None => {
                self.index.insert(message.id.clone(), self.messages.len());
                self.messages.push(message);
                UpsertOutcome::Inserted
            }
        }
    }

    /// In-place, timestamp-gated replacement. Never inserts.
    pub(crate) fn apply_update(&mut self, message: Message) -> UpdateOutcome {
        match self.index.get(&message.id) {
            Some(&pos) => self.replace_if_newer(pos, message),
            None => UpdateOutcome::Unknown,
        }
    }

    pub(crate) fn append_batch(
        &mut self,
        batch: Vec<Message>,
        placement: Placement,
    ) -> BatchSummary {
        match placement {
            Placement::Tail => {
                let mut summary = BatchSummary::default();
                for message in batch {
                    match self.upsert(message) {
                        UpsertOutcome::Inserted => summary.inserted += 1,
                        UpsertOutcome::Merged(_) => summary.merged += 1,
                    }
                }
                summary
            }
            Placement::Head => self.prepend_batch(batch),
        }
    }

    pub(crate) fn replace_all(&mut self, batch: Vec<Message>) -> BatchSummary {
        self.messages.clear();
        self.index.clear();
        self.append_batch(batch, Placement::Tail)
    }

    fn prepend_batch(&mut self, batch: Vec<Message>) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let mut fresh: Vec<Message> = Vec::with_capacity(batch.len());
        let mut fresh_index: HashMap<String, usize> = HashMap::new();
        for message in batch {
            if let Some(&pos) = self.index.get(&message.id) {
                self.replace_if_newer(pos, message);
                summary.merged += 1;
            } else if let Some(&pos) = fresh_index.get(&message.id) {
                if supersedes(&message, &fresh[pos]) {
                    fresh[pos] = message;
                }
                summary.merged += 1;
            } else {
                fresh_index.insert(message.id.clone(), fresh.len());
                fresh.push(message);
            }
        }
        summary.inserted = fresh.len();
        if !fresh.is_empty() {
            fresh.append(&mut self.messages);
            self.messages = fresh;
            self.reindex();
        }
        summary
    }

    fn replace_if_newer(&mut self, pos: usize, incoming: Message) -> UpdateOutcome {
        if supersedes(&incoming, &self.messages[pos]) {
            self.messages[pos] = incoming;
            UpdateOutcome::Applied
        } else {
            UpdateOutcome::Stale
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .messages
            .iter()
            .enumerate()
            .map(|(pos, m)| (m.id.clone(), pos))
            .collect();
    }
}
