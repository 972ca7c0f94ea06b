// Outbound send: compose buffer plus a single in-flight send.

#[derive(Debug, Default)]
pub(crate) struct SendCoordinator {
    compose: String,
    in_flight: bool,
}

impl SendCoordinator {
    pub(crate) fn set_compose_text(&mut self, text: String) {
        self.compose = text;
    }

    pub(crate) fn compose_text(&self) -> &str {
        &self.compose
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub(crate) fn can_send(&self) -> bool {
        !self.in_flight && !self.compose.trim().is_empty()
    }

    /// Returns the trimmed text to transmit, or `None` when there is nothing to
    /// send or a send is already outstanding. The compose buffer is cleared
    /// before the request leaves and is not restored if it fails.
    pub(crate) fn begin_send(&mut self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() || self.in_flight {
            return None;
        }
        self.compose.clear();
        self.in_flight = true;
        Some(text.to_string())
    }

    pub(crate) fn complete(&mut self) -> bool {
        std::mem::replace(&mut self.in_flight, false)
    }
}
