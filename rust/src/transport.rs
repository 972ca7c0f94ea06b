//! Seam to the GraphQL transport, which lives outside this crate.

use flume::Sender;
use futures::future::BoxFuture;

use crate::error::ChatError;
use crate::message::Message;
use crate::updates::{CoreMsg, InternalEvent};
use crate::wire::{decode_subscription_payload, MessageConnection, PageRequest, SubscriptionStream};

/// Query and mutation side of the backend. Futures are spawned on the core's
/// runtime, so they must own everything they touch.
pub trait ChatTransport: Send + Sync + 'static {
    fn fetch_page(
        &self,
        request: PageRequest,
    ) -> BoxFuture<'static, anyhow::Result<MessageConnection>>;

    /// The returned message is only logged; the list is fed by the
    /// `messageAdded` echo.
    fn send_message(&self, text: String) -> BoxFuture<'static, anyhow::Result<Message>>;
}

/// Inbound end of one subscription stream. Events from one sink reach the core
/// in the order they were delivered.
#[derive(Clone)]
pub struct EventSink {
    stream: SubscriptionStream,
    core_tx: Sender<CoreMsg>,
}

impl EventSink {
    pub(crate) fn new(stream: SubscriptionStream, core_tx: Sender<CoreMsg>) -> Self {
        Self { stream, core_tx }
    }

    pub fn stream(&self) -> SubscriptionStream {
        self.stream
    }

    pub fn deliver(&self, message: Message) {
        let event = match self.stream {
            SubscriptionStream::MessageAdded => InternalEvent::MessageAdded(message),
            SubscriptionStream::MessageUpdated => InternalEvent::MessageUpdated(message),
        };
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(event)));
    }

    /// Decodes a raw subscription payload and delivers it. Malformed payloads
    /// are dropped without reaching the core; the error is returned for the
    /// caller's own bookkeeping.
    pub fn deliver_json(&self, payload: &str) -> Result<(), ChatError> {
        match decode_subscription_payload(self.stream, payload) {
            Ok(message) => {
                self.deliver(message);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(stream = self.stream.field(), %e, "dropping malformed event");
                Err(e)
            }
        }
    }
}
