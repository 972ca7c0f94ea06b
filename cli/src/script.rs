//! Replay scripts: canned server replies plus an ordered list of steps fed
//! into a live `ChatApp`.
//!
//! ```json
//! {
//!   "config": {"page_size": 2},
//!   "pages": [{"ok": {"data": {"messages": {...}}}}, {"error": "timeout"}],
//!   "sends": [{"ok": {"data": {"sendMessage": {...}}}}],
//!   "steps": [
//!     {"op": "added", "payload": {"id": "1", ...}},
//!     {"op": "load_more"},
//!     {"op": "settle"}
//!   ]
//! }
//! ```

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context};
use chatsync_core::wire::{self, MessageConnection, PageRequest};
use chatsync_core::{AppAction, AppConfig, AppState, ChatApp, ChatTransport, Message};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);
const QUIET_PERIOD: Duration = Duration::from_millis(50);

#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub config: Option<AppConfig>,
    #[serde(default)]
    pub pages: Vec<Reply>,
    #[serde(default)]
    pub sends: Vec<Reply>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A scripted response body. `ok` holds the full GraphQL response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Ok(Value),
    Error(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// `payload` is a subscription payload; a JSON string is passed through
    /// verbatim so malformed input can be replayed too.
    Added { payload: Value },
    Updated { payload: Value },
    LoadMore,
    Reload,
    Compose { text: String },
    Send { text: String },
    ClearToast,
    /// Wait for outstanding fetches and sends to finish.
    Settle,
}

struct ReplayTransport {
    pages: Mutex<VecDeque<Reply>>,
    sends: Mutex<VecDeque<Reply>>,
}

impl ReplayTransport {
    fn next(queue: &Mutex<VecDeque<Reply>>, what: &str) -> anyhow::Result<String> {
        let reply = match queue.lock() {
            Ok(mut q) => q.pop_front(),
            Err(poison) => poison.into_inner().pop_front(),
        };
        match reply {
            Some(Reply::Ok(body)) => Ok(body.to_string()),
            Some(Reply::Error(e)) => Err(anyhow!(e)),
            None => Err(anyhow!("script has no {what} reply left")),
        }
    }
}

impl ChatTransport for ReplayTransport {
    fn fetch_page(
        &self,
        request: PageRequest,
    ) -> BoxFuture<'static, anyhow::Result<MessageConnection>> {
        tracing::debug!(variables = %request.variables(), "replay fetch_page");
        let reply = Self::next(&self.pages, "page");
        Box::pin(async move { Ok(wire::decode_messages_response(&reply?)?) })
    }

    fn send_message(&self, text: String) -> BoxFuture<'static, anyhow::Result<Message>> {
        tracing::debug!(variables = %wire::send_message_variables(&text), "replay send_message");
        let reply = Self::next(&self.sends, "send");
        Box::pin(async move { Ok(wire::decode_send_response(&reply?)?) })
    }
}

fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

/// Blocks until nothing is loading or sending and no new snapshot has been
/// published for a short quiet period.
fn settle(app: &ChatApp) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut last_rev = app.state().rev;
    let mut quiet_since = Instant::now();
    loop {
        let state = app.state();
        let busy = state.pagination.loading || state.composer.sending;
        if state.rev != last_rev || busy {
            last_rev = state.rev;
            quiet_since = Instant::now();
        } else if quiet_since.elapsed() >= QUIET_PERIOD {
            return Ok(());
        }
        if start.elapsed() > SETTLE_TIMEOUT {
            bail!("core did not settle within {SETTLE_TIMEOUT:?}");
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn wait_for_initial(app: &ChatApp) -> anyhow::Result<()> {
    let start = Instant::now();
    loop {
        let state = app.state();
        if state.pagination.initial_loaded || state.load_error.is_some() {
            return settle(app);
        }
        if start.elapsed() > SETTLE_TIMEOUT {
            bail!("initial page did not arrive within {SETTLE_TIMEOUT:?}");
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

pub fn run(script: Script, data_dir: &Path) -> anyhow::Result<AppState> {
    if let Some(config) = &script.config {
        let path = data_dir.join("chatsync_config.json");
        std::fs::write(&path, serde_json::to_string_pretty(config)?)
            .with_context(|| format!("write {}", path.display()))?;
    }

    let script_auto_load = script.config.as_ref().map_or(true, |c| c.auto_load);
    let transport = Arc::new(ReplayTransport {
        pages: Mutex::new(script.pages.into()),
        sends: Mutex::new(script.sends.into()),
    });
    let app = ChatApp::new(data_dir.to_string_lossy().to_string(), transport)?;
    let added = app.message_added_sink();
    let updated = app.message_updated_sink();

    if script_auto_load {
        wait_for_initial(&app)?;
    }

    for (i, step) in script.steps.into_iter().enumerate() {
        tracing::debug!(step = i, ?step, "replay step");
        match step {
            Step::Added { payload } => {
                if let Err(e) = added.deliver_json(&payload_text(&payload)) {
                    tracing::info!(step = i, %e, "event rejected");
                }
            }
            Step::Updated { payload } => {
                if let Err(e) = updated.deliver_json(&payload_text(&payload)) {
                    tracing::info!(step = i, %e, "event rejected");
                }
            }
            Step::LoadMore => app.dispatch(AppAction::LoadMore),
            Step::Reload => app.dispatch(AppAction::Reload),
            Step::Compose { text } => app.dispatch(AppAction::SetComposeText { text }),
            Step::Send { text } => app.dispatch(AppAction::SendMessage { text }),
            Step::ClearToast => app.dispatch(AppAction::ClearToast),
            Step::Settle => settle(&app)?,
        }
    }

    settle(&app)?;
    Ok(app.state())
}
