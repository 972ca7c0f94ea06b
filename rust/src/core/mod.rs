mod config;
mod delivery;
mod pagination;
mod reconcile;
mod send;
mod store;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::AppAction;
use crate::message::Message;
use crate::state::{AppState, ComposerState, PaginationState};
use crate::transport::ChatTransport;
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};
use crate::wire::MessageConnection;

pub use config::AppConfig;
pub use reconcile::UpdateOutcome;
pub use store::Placement;

use delivery::{AddOutcome, DeliveryTracker};
use pagination::{PageFetch, PageKind, PaginationController};
use send::SendCoordinator;
use store::MessageStore;

/// Single-threaded owner of the message list. Every mutation happens inside
/// `handle_message`; network work runs on `runtime` and comes back as
/// `InternalEvent`s through `core_sender`.
pub struct AppCore {
    state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    listening: Arc<AtomicBool>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: AppConfig,
    runtime: tokio::runtime::Runtime,
    transport: Arc<dyn ChatTransport>,

    store: MessageStore,
    pagination: PaginationController,
    delivery: DeliveryTracker,
    composer: SendCoordinator,
    initial_loaded: bool,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        listening: Arc<AtomicBool>,
        core_sender: Sender<CoreMsg>,
        data_dir: &str,
        shared_state: Arc<RwLock<AppState>>,
        transport: Arc<dyn ChatTransport>,
        runtime: tokio::runtime::Runtime,
    ) -> Self {
        let config = config::load_app_config(data_dir);
        tracing::info!(
            page_size = config.page_size,
            placement = ?config.history_placement,
            auto_load = config.auto_load,
            "core config"
        );
        let pagination = PaginationController::new(config.page_size, config.history_placement);

        let this = Self {
            state: AppState::empty(),
            rev: 0,
            update_sender,
            listening,
            core_sender,
            shared_state,
            config,
            runtime,
            transport,
            store: MessageStore::default(),
            pagination,
            delivery: DeliveryTracker::default(),
            composer: SendCoordinator::default(),
            initial_loaded: false,
        };
        // Ensure ChatApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    /// Kicks off the initial fetch when configured to.
    pub fn start(&mut self) {
        if self.config.auto_load {
            self.start_initial_load();
        }
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn sync_state(&mut self) {
        self.state.messages = self.store.all().to_vec();
        self.state.pending_ids = self.delivery.pending_ids();
        self.state.pagination = PaginationState {
            has_next_page: self.pagination.has_next_page(),
            loading: self.pagination.is_loading(),
            initial_loaded: self.initial_loaded,
        };
        self.state.composer = ComposerState {
            text: self.composer.compose_text().to_string(),
            sending: self.composer.is_in_flight(),
            can_send: self.composer.can_send(),
        };
    }

    fn emit_state(&mut self) {
        self.sync_state();
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        // Without a listener nothing drains the channel; `state()` is enough.
        if self.listening.load(Ordering::Acquire) {
            let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
        }
    }

    fn toast(&mut self, msg: impl Into<String>) {
        self.state.toast = Some(msg.into());
        self.emit_state();
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
            CoreMsg::Shutdown => {}
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::Reload => self.start_initial_load(),
            AppAction::LoadMore => self.load_more(),
            AppAction::SetComposeText { text } => {
                self.composer.set_compose_text(text);
                self.emit_state();
            }
            AppAction::SendMessage { text } => self.send_message(&text),
            AppAction::ClearToast => {
                if self.state.toast.take().is_some() {
                    self.emit_state();
                }
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::MessageAdded(message) => self.handle_message_added(message),
            InternalEvent::MessageUpdated(message) => self.handle_message_updated(message),
            InternalEvent::PageFetched { token, result } => {
                self.handle_page_fetched(token, result)
            }
            InternalEvent::SendCompleted { result } => self.handle_send_completed(result),
        }
    }

    fn start_initial_load(&mut self) {
        let Some(fetch) = self.pagination.begin_initial() else {
            tracing::debug!("initial load skipped: fetch outstanding");
            return;
        };
        self.state.load_error = None;
        self.spawn_fetch(fetch);
        self.emit_state();
    }

    fn load_more(&mut self) {
        if !self.initial_loaded {
            tracing::debug!("load_more before initial page; ignoring");
            return;
        }
        // A failed reload leaves an older cursor behind; only Reload clears it.
        if self.state.load_error.is_some() {
            tracing::debug!("load_more while load_error is shown; ignoring");
            return;
        }
        let Some(fetch) = self.pagination.begin_load_more() else {
            tracing::debug!(
                phase = ?self.pagination.phase(),
                has_cursor = self.pagination.end_cursor().is_some(),
                "load_more: nothing to do"
            );
            return;
        };
        self.spawn_fetch(fetch);
        self.emit_state();
    }

    fn spawn_fetch(&self, fetch: PageFetch) {
        tracing::info!(
            kind = fetch.kind.tag(),
            token = fetch.token,
            first = fetch.request.first,
            after = ?fetch.request.after,
            "page_fetch"
        );
        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        let PageFetch { token, request, .. } = fetch;
        self.runtime.spawn(async move {
            let result = transport
                .fetch_page(request)
                .await
                .map_err(|e| format!("{e:#}"));
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::PageFetched {
                token,
                result,
            })));
        });
    }

    fn handle_page_fetched(&mut self, token: u64, result: Result<MessageConnection, String>) {
        match result {
            Ok(page) => {
                let edges = page.edges.len();
                let Some(merge) = self.pagination.complete(token, page, &mut self.store) else {
                    tracing::warn!(token, "page result for stale request; ignoring");
                    return;
                };
                if merge.kind == PageKind::Initial {
                    self.initial_loaded = true;
                }
                self.delivery.retain_unsettled(&self.store);
                tracing::info!(
                    kind = merge.kind.tag(),
                    token,
                    edges,
                    inserted = merge.summary.inserted,
                    merged = merge.summary.merged,
                    has_next_page = merge.has_next_page,
                    total = self.store.len(),
                    "page_merged"
                );
                self.emit_state();
            }
            Err(error) => {
                let Some(kind) = self.pagination.fail(token) else {
                    tracing::warn!(token, %error, "page error for stale request; ignoring");
                    return;
                };
                tracing::warn!(kind = kind.tag(), token, %error, "page_fetch_failed");
                match kind {
                    PageKind::Initial => {
                        self.state.load_error = Some(format!("Error loading messages: {error}"));
                        self.emit_state();
                    }
                    PageKind::More => self.toast(format!("Could not load more messages: {error}")),
                }
            }
        }
    }

    fn handle_message_added(&mut self, message: Message) {
        let id = message.id.clone();
        match self.delivery.on_added(&mut self.store, message) {
            AddOutcome::Duplicate => {
                tracing::debug!(%id, "message_added: duplicate; ignoring");
            }
            AddOutcome::Appended { pending } => {
                tracing::info!(%id, pending, total = self.store.len(), "message_added");
                self.emit_state();
            }
        }
    }

    fn handle_message_updated(&mut self, message: Message) {
        let id = message.id.clone();
        let status = message.status;
        let was_pending = self.delivery.is_pending(&id);
        let outcome = reconcile::apply_updated(&mut self.store, &mut self.delivery, message);
        tracing::info!(%id, ?status, ?outcome, was_pending, "message_updated");
        if outcome == UpdateOutcome::Applied {
            self.emit_state();
        }
    }

    fn send_message(&mut self, text: &str) {
        let Some(outbound) = self.composer.begin_send(text) else {
            tracing::debug!(
                sending = self.composer.is_in_flight(),
                "send ignored: empty or in flight"
            );
            return;
        };
        // Publish the cleared composer before the request is on the wire.
        self.emit_state();

        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = transport
                .send_message(outbound)
                .await
                .map_err(|e| format!("{e:#}"));
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SendCompleted {
                result,
            })));
        });
    }

    fn handle_send_completed(&mut self, result: Result<Message, String>) {
        self.composer.complete();
        match result {
            Ok(message) => {
                // The messageAdded echo is what inserts it.
                tracing::info!(id = %message.id, "message_send_result");
                self.emit_state();
            }
            Err(error) => {
                tracing::warn!(%error, "message_send_failed");
                self.toast(format!("Send failed: {error}"));
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use flume::Receiver;
    use futures::future::BoxFuture;

    use super::test_support::{msg, page};
    use super::*;
    use crate::message::MessageStatus;
    use crate::wire::PageRequest;

    #[derive(Default)]
    struct QueuedTransport {
        pages: Mutex<VecDeque<anyhow::Result<MessageConnection>>>,
        sends: Mutex<VecDeque<anyhow::Result<Message>>>,
        requests: Mutex<Vec<PageRequest>>,
        sent_texts: Mutex<Vec<String>>,
    }

    impl ChatTransport for QueuedTransport {
        fn fetch_page(
            &self,
            request: PageRequest,
        ) -> BoxFuture<'static, anyhow::Result<MessageConnection>> {
            self.requests.lock().unwrap().push(request);
            let next = self
                .pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no page queued")));
            Box::pin(async move { next })
        }

        fn send_message(&self, text: String) -> BoxFuture<'static, anyhow::Result<Message>> {
            self.sent_texts.lock().unwrap().push(text);
            let next = self
                .sends
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no send queued")));
            Box::pin(async move { next })
        }
    }

    struct Harness {
        core: AppCore,
        core_rx: Receiver<CoreMsg>,
        _update_rx: Receiver<AppUpdate>,
        transport: Arc<QueuedTransport>,
    }

    impl Harness {
        fn new(transport: QueuedTransport) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let (update_tx, update_rx) = flume::unbounded();
            let (core_tx, core_rx) = flume::unbounded();
            let transport = Arc::new(transport);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_time()
                .build()
                .unwrap();
            let core = AppCore::new(
                update_tx,
                Arc::new(AtomicBool::new(true)),
                core_tx,
                &dir.path().to_string_lossy(),
                Arc::new(RwLock::new(AppState::empty())),
                transport.clone(),
                runtime,
            );
            Self {
                core,
                core_rx,
                _update_rx: update_rx,
                transport,
            }
        }

        fn action(&mut self, action: AppAction) {
            self.core.handle_message(CoreMsg::Action(action));
        }

        fn internal(&mut self, event: InternalEvent) {
            self.core.handle_message(CoreMsg::Internal(Box::new(event)));
        }

        /// Feeds the next async completion back into the core.
        fn pump(&mut self) {
            let msg = self
                .core_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("async completion");
            self.core.handle_message(msg);
        }

        fn state(&self) -> &AppState {
            &self.core.state
        }
    }

    fn queued(pages: Vec<anyhow::Result<MessageConnection>>) -> QueuedTransport {
        QueuedTransport {
            pages: Mutex::new(pages.into()),
            ..Default::default()
        }
    }

    #[test]
    fn scenario_a_added_then_newer_update() {
        let mut h = Harness::new(QueuedTransport::default());
        h.internal(InternalEvent::MessageAdded(msg(
            "1",
            MessageStatus::Sending,
            "2024-05-01T10:00:01Z",
        )));
        assert_eq!(h.state().message_ids(), vec!["1"]);
        assert!(h.state().is_pending("1"));

        h.internal(InternalEvent::MessageUpdated(msg(
            "1",
            MessageStatus::Sent,
            "2024-05-01T10:00:02Z",
        )));
        assert_eq!(h.state().message("1").unwrap().status, MessageStatus::Sent);
        assert!(h.state().pending_ids.is_empty());
    }

    #[test]
    fn scenario_b_older_update_is_ignored() {
        let mut h = Harness::new(QueuedTransport::default());
        h.internal(InternalEvent::MessageAdded(msg(
            "1",
            MessageStatus::Sending,
            "2024-05-01T10:00:01Z",
        )));
        let rev = h.state().rev;
        h.internal(InternalEvent::MessageUpdated(msg(
            "1",
            MessageStatus::Sent,
            "2024-05-01T10:00:00Z",
        )));
        assert_eq!(
            h.state().message("1").unwrap().status,
            MessageStatus::Sending
        );
        assert_eq!(h.state().pending_ids, vec!["1".to_string()]);
        // Nothing changed, nothing published.
        assert_eq!(h.state().rev, rev);
    }

    #[test]
    fn scenario_c_initial_then_load_more() {
        let mut h = Harness::new(queued(vec![
            Ok(page(
                &[msg("5", MessageStatus::Sent, "2024-05-01T10:00:05Z")],
                true,
                Some("c5"),
            )),
            Ok(page(
                &[msg("4", MessageStatus::Sent, "2024-05-01T10:00:04Z")],
                false,
                Some("c4"),
            )),
        ]));
        h.core.start();
        assert!(h.state().pagination.loading);
        h.pump();
        assert!(h.state().pagination.initial_loaded);

        h.action(AppAction::LoadMore);
        h.pump();

        assert_eq!(h.state().message_ids(), vec!["5", "4"]);
        assert!(!h.state().pagination.has_next_page);
        assert!(!h.state().pagination.loading);
        let requests = h.transport.requests.lock().unwrap().clone();
        assert_eq!(requests[0].after, None);
        assert_eq!(requests[1].after.as_deref(), Some("c5"));
    }

    #[test]
    fn scenario_d_send_clears_composer_before_completion() {
        let mut h = Harness::new(QueuedTransport {
            sends: Mutex::new(
                vec![Ok(msg("10", MessageStatus::Sending, "2024-05-01T10:00:10Z"))].into(),
            ),
            ..Default::default()
        });
        h.action(AppAction::SetComposeText {
            text: "hello".into(),
        });
        assert!(h.state().composer.can_send);

        h.action(AppAction::SendMessage {
            text: "hello".into(),
        });
        assert_eq!(h.state().composer.text, "");
        assert!(h.state().composer.sending);
        assert!(!h.state().composer.can_send);

        // A second send while in flight never reaches the transport.
        h.action(AppAction::SendMessage {
            text: "again".into(),
        });

        h.pump();
        assert!(!h.state().composer.sending);
        assert_eq!(
            h.transport.sent_texts.lock().unwrap().clone(),
            vec!["hello".to_string()]
        );
        // The mutation response is not inserted; only the echo is.
        assert!(h.state().messages.is_empty());
    }

    #[test]
    fn send_failure_loses_text_and_reenables() {
        let mut h = Harness::new(QueuedTransport::default());
        h.action(AppAction::SetComposeText {
            text: " draft ".into(),
        });
        h.action(AppAction::SendMessage {
            text: " draft ".into(),
        });
        h.pump();
        assert!(!h.state().composer.sending);
        assert_eq!(h.state().composer.text, "");
        assert!(h
            .state()
            .toast
            .as_deref()
            .is_some_and(|t| t.starts_with("Send failed")));
        assert_eq!(
            h.transport.sent_texts.lock().unwrap().clone(),
            vec!["draft".to_string()]
        );
    }

    #[test]
    fn initial_failure_is_fatal_until_reload() {
        let mut h = Harness::new(queued(vec![
            Err(anyhow::anyhow!("connection refused")),
            Ok(page(
                &[msg("1", MessageStatus::Sent, "2024-05-01T10:00:01Z")],
                false,
                None,
            )),
        ]));
        h.core.start();
        h.pump();
        let err = h.state().load_error.clone().unwrap();
        assert!(err.contains("connection refused"), "{err}");
        assert!(!h.state().pagination.loading);

        // No cursor yet, so load-more stays inert.
        h.action(AppAction::LoadMore);
        assert!(h.core_rx.is_empty());

        h.action(AppAction::Reload);
        assert_eq!(h.state().load_error, None);
        h.pump();
        assert_eq!(h.state().message_ids(), vec!["1"]);
    }

    #[test]
    fn failed_reload_blocks_load_more() {
        let mut h = Harness::new(queued(vec![
            Ok(page(
                &[msg("5", MessageStatus::Sent, "2024-05-01T10:00:05Z")],
                true,
                Some("c5"),
            )),
            Err(anyhow::anyhow!("connection reset")),
        ]));
        h.core.start();
        h.pump();
        assert!(h.state().pagination.initial_loaded);

        h.action(AppAction::Reload);
        h.pump();
        assert!(h.state().load_error.is_some());

        h.action(AppAction::LoadMore);
        assert!(h.core_rx.is_empty());
        assert!(!h.state().pagination.loading);
        assert_eq!(h.transport.requests.lock().unwrap().len(), 2);
    }

    #[test]
    fn load_more_failure_keeps_list_and_cursor() {
        let mut h = Harness::new(queued(vec![
            Ok(page(
                &[msg("5", MessageStatus::Sent, "2024-05-01T10:00:05Z")],
                true,
                Some("c5"),
            )),
            Err(anyhow::anyhow!("timeout")),
            Ok(page(
                &[msg("4", MessageStatus::Sent, "2024-05-01T10:00:04Z")],
                true,
                Some("c4"),
            )),
        ]));
        h.core.start();
        h.pump();
        h.action(AppAction::LoadMore);
        h.pump();

        assert_eq!(h.state().message_ids(), vec!["5"]);
        assert!(h.state().pagination.has_next_page);
        assert!(!h.state().pagination.loading);
        assert!(h.state().load_error.is_none());
        assert!(h.state().toast.is_some());

        h.action(AppAction::ClearToast);
        assert!(h.state().toast.is_none());

        h.action(AppAction::LoadMore);
        h.pump();
        assert_eq!(h.state().message_ids(), vec!["5", "4"]);
        let requests = h.transport.requests.lock().unwrap().clone();
        assert_eq!(requests[1].after.as_deref(), Some("c5"));
        assert_eq!(requests[2].after.as_deref(), Some("c5"));
    }

    #[test]
    fn live_messages_keep_position_when_history_arrives() {
        let mut h = Harness::new(queued(vec![
            Ok(page(
                &[msg("5", MessageStatus::Sent, "2024-05-01T10:00:05Z")],
                true,
                Some("c5"),
            )),
            Ok(page(
                &[
                    msg("4", MessageStatus::Sent, "2024-05-01T10:00:04Z"),
                    msg("6", MessageStatus::Read, "2024-05-01T10:00:07Z"),
                ],
                false,
                Some("c4"),
            )),
        ]));
        h.core.start();
        h.pump();
        h.internal(InternalEvent::MessageAdded(msg(
            "6",
            MessageStatus::Sending,
            "2024-05-01T10:00:06Z",
        )));
        h.action(AppAction::LoadMore);
        h.pump();

        assert_eq!(h.state().message_ids(), vec!["5", "6", "4"]);
        // The page carried a newer copy of 6, merged in place.
        assert_eq!(h.state().message("6").unwrap().status, MessageStatus::Read);
        assert!(!h.state().is_pending("6"));
    }
}
