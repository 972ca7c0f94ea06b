// Added-event path: id dedup plus the set of messages still awaiting delivery.

use std::collections::BTreeSet;

use super::store::MessageStore;
use crate::message::{Message, MessageStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AddOutcome {
    Appended { pending: bool },
    Duplicate,
}

#[derive(Debug, Default)]
pub(crate) struct DeliveryTracker {
    pending: BTreeSet<String>,
}

impl DeliveryTracker {
    pub(crate) fn on_added(&mut self, store: &mut MessageStore, message: Message) -> AddOutcome {
        // Id is the only dedup key; a redelivered or echoed event is dropped
        // even when its payload differs.
        if store.contains(&message.id) {
            return AddOutcome::Duplicate;
        }
        let pending = message.status == MessageStatus::Sending;
        if pending {
            self.pending.insert(message.id.clone());
        }
        store.upsert(message);
        AddOutcome::Appended { pending }
    }

    pub(crate) fn settle(&mut self, id: &str) -> bool {
        self.pending.remove(id)
    }

    pub(crate) fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    /// Keeps only ids whose store entry is still `Sending`. Run after page
    /// merges, which can replace or drop entries without going through the
    /// update path.
    pub(crate) fn retain_unsettled(&mut self, store: &MessageStore) {
        self.pending.retain(|id| {
            store
                .get(id)
                .is_some_and(|m| m.status == MessageStatus::Sending)
        });
    }

    pub(crate) fn pending_ids(&self) -> Vec<String> {
        self.pending.iter().cloned().collect()
    }
}
