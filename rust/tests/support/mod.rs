#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chatsync_core::wire::{MessageConnection, PageRequest};
use chatsync_core::{AppAction, ChatApp, ChatTransport, Message};
use futures::future::BoxFuture;

/// In-memory stand-in for the GraphQL client. Replies are consumed in order;
/// a gated transport holds every page fetch until `release_page` is called.
pub struct ScriptedTransport {
    pages: Mutex<VecDeque<anyhow::Result<MessageConnection>>>,
    sends: Mutex<VecDeque<anyhow::Result<Message>>>,
    page_requests: Mutex<Vec<PageRequest>>,
    sent_texts: Mutex<Vec<String>>,
    page_calls: AtomicUsize,
    gate: Option<(flume::Sender<()>, flume::Receiver<()>)>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(VecDeque::new()),
            sends: Mutex::new(VecDeque::new()),
            page_requests: Mutex::new(Vec::new()),
            sent_texts: Mutex::new(Vec::new()),
            page_calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(flume::unbounded()),
            ..Self::new()
        }
    }

    pub fn push_page(&self, page: anyhow::Result<MessageConnection>) {
        self.pages.lock().unwrap().push_back(page);
    }

    pub fn push_send(&self, reply: anyhow::Result<Message>) {
        self.sends.lock().unwrap().push_back(reply);
    }

    pub fn release_page(&self) {
        if let Some((tx, _)) = &self.gate {
            tx.send(()).unwrap();
        }
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn page_requests(&self) -> Vec<PageRequest> {
        self.page_requests.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent_texts.lock().unwrap().clone()
    }
}

impl ChatTransport for ScriptedTransport {
    fn fetch_page(
        &self,
        request: PageRequest,
    ) -> BoxFuture<'static, anyhow::Result<MessageConnection>> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.page_requests.lock().unwrap().push(request);
        let reply = self
            .pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no page scripted")));
        let gate = self.gate.as_ref().map(|(_, rx)| rx.clone());
        Box::pin(async move {
            if let Some(rx) = gate {
                rx.recv_async().await?;
            }
            reply
        })
    }

    fn send_message(&self, text: String) -> BoxFuture<'static, anyhow::Result<Message>> {
        self.sent_texts.lock().unwrap().push(text);
        let reply = self
            .sends
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no send scripted")));
        Box::pin(async move { reply })
    }
}

pub fn message(id: &str, status: &str, updated_at: &str) -> Message {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "text": format!("text-{id}"),
        "status": status,
        "updatedAt": updated_at,
        "sender": "Customer",
    }))
    .unwrap()
}

pub fn page_json(body: &str) -> MessageConnection {
    chatsync_core::wire::decode_messages_response(body).unwrap()
}

pub fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

/// Waits until everything dispatched before this call has been handled.
/// Actions and subscription events share one queue, so a compose-text marker
/// that shows up in state proves the earlier messages were processed.
pub fn barrier(app: &ChatApp, marker: &str) {
    app.dispatch(AppAction::SetComposeText {
        text: marker.to_string(),
    });
    wait_until(
        &format!("barrier {marker}"),
        Duration::from_secs(5),
        || app.state().composer.text == marker,
    );
}

pub fn new_app(
    transport: Arc<ScriptedTransport>,
    config_json: Option<&str>,
) -> (Arc<ChatApp>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    if let Some(cfg) = config_json {
        std::fs::write(dir.path().join("chatsync_config.json"), cfg).unwrap();
    }
    let app = ChatApp::new(dir.path().to_string_lossy().to_string(), transport).unwrap();
    (app, dir)
}
