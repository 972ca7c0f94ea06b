#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    // History
    /// Discard the list and fetch the first page again.
    Reload,
    LoadMore,

    // Composer
    SetComposeText {
        text: String,
    },
    SendMessage {
        text: String,
    },

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag (never includes message text).
    pub fn tag(&self) -> &'static str {
        match self {
            AppAction::Reload => "Reload",
            AppAction::LoadMore => "LoadMore",
            AppAction::SetComposeText { .. } => "SetComposeText",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::ClearToast => "ClearToast",
        }
    }
}
