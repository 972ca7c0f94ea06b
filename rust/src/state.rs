use serde::Serialize;

use crate::message::Message;

/// Snapshot handed to the rendering layer. Rebuilt and re-published in full
/// after every mutation; `rev` increases by one per snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppState {
    pub rev: u64,
    pub messages: Vec<Message>,
    pub pending_ids: Vec<String>,
    pub pagination: PaginationState,
    pub composer: ComposerState,
    /// Initial load failed; the list cannot be shown.
    pub load_error: Option<String>,
    pub toast: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PaginationState {
    pub has_next_page: bool,
    pub loading: bool,
    pub initial_loaded: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ComposerState {
    pub text: String,
    pub sending: bool,
    pub can_send: bool,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            messages: vec![],
            pending_ids: vec![],
            pagination: PaginationState {
                has_next_page: true,
                loading: false,
                initial_loaded: false,
            },
            composer: ComposerState::default(),
            load_error: None,
            toast: None,
        }
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending_ids.iter().any(|p| p == id)
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn message_ids(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.id.as_str()).collect()
    }
}
