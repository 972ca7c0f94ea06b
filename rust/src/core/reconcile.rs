// Updated-event reconciliation: last writer wins, keyed on `updatedAt`.

use super::delivery::DeliveryTracker;
use super::store::MessageStore;
use crate::message::Message;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// Stored copy is as new or newer; incoming record dropped.
    Stale,
    /// Id not in the store; updates never insert.
    Unknown,
}

/// Strictly newer wins. Ties keep the stored record.
pub(crate) fn supersedes(incoming: &Message, stored: &Message) -> bool {
    incoming.updated_at > stored.updated_at
}

pub(crate) fn apply_updated(
    store: &mut MessageStore,
    delivery: &mut DeliveryTracker,
    incoming: Message,
) -> UpdateOutcome {
    let id = incoming.id.clone();
    let settled = incoming.status.is_settled();
    let outcome = store.apply_update(incoming);
    if outcome == UpdateOutcome::Applied && settled {
        delivery.settle(&id);
    }
    outcome
}
