use crate::message::Message;
use crate::state::AppState;
use crate::wire::MessageConnection;
use crate::AppAction;

#[derive(Clone, Debug)]
pub enum AppUpdate {
    /// Full state snapshot; the only update kind.
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
    Shutdown,
}

#[derive(Debug)]
pub enum InternalEvent {
    // Subscription streams
    MessageAdded(Message),
    MessageUpdated(Message),

    // Async results
    PageFetched {
        token: u64,
        result: Result<MessageConnection, String>,
    },
    SendCompleted {
        result: Result<Message, String>,
    },
}
