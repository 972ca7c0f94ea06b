mod actions;
mod core;
mod error;
mod logging;
mod message;
mod state;
mod transport;
mod updates;
pub mod wire;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use crate::core::{AppConfig, Placement, UpdateOutcome};
pub use error::ChatError;
pub use logging::init_logging;
pub use message::{Message, MessageSender, MessageStatus, Timestamp};
pub use state::*;
pub use transport::{ChatTransport, EventSink};
pub use updates::*;
pub use wire::SubscriptionStream;

pub trait ChatReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

/// Handle to one chat session. The session's message list is owned by a
/// single actor thread; this handle only sends it messages and reads the
/// latest published snapshot.
pub struct ChatApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    // Shared with the core; snapshots are only queued once a listener exists.
    listening: Arc<AtomicBool>,
    shared_state: Arc<RwLock<AppState>>,
}

impl ChatApp {
    pub fn new(
        data_dir: impl Into<String>,
        transport: Arc<dyn ChatTransport>,
    ) -> anyhow::Result<Arc<Self>> {
        let data_dir = data_dir.into();
        logging::init_logging();
        tracing::info!(data_dir = %data_dir, "ChatApp::new() starting");

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("chatsync-io")
            .enable_time()
            .build()?;

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));
        let listening = Arc::new(AtomicBool::new(false));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let listening_for_core = listening.clone();
        thread::Builder::new()
            .name("chatsync-core".into())
            .spawn(move || {
                let mut core = crate::core::AppCore::new(
                    update_tx,
                    listening_for_core,
                    core_tx_for_core,
                    &data_dir,
                    shared_for_core,
                    transport,
                    runtime,
                );
                core.start();
                while let Ok(msg) = core_rx.recv() {
                    if matches!(msg, CoreMsg::Shutdown) {
                        tracing::info!("core shutting down");
                        break;
                    }
                    core.handle_message(msg);
                }
            })?;

        Ok(Arc::new(Self {
            core_tx,
            update_rx,
            listening,
            shared_state,
        }))
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn message_added_sink(&self) -> EventSink {
        EventSink::new(SubscriptionStream::MessageAdded, self.core_tx.clone())
    }

    pub fn message_updated_sink(&self) -> EventSink {
        EventSink::new(SubscriptionStream::MessageUpdated, self.core_tx.clone())
    }

    /// Starts delivering snapshots to `reconciler`. Only snapshots published
    /// after this call are delivered; read `state()` for the current one.
    pub fn listen_for_updates(&self, reconciler: Box<dyn ChatReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split updates.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }
}

impl Drop for ChatApp {
    fn drop(&mut self) {
        let _ = self.core_tx.send(CoreMsg::Shutdown);
    }
}
