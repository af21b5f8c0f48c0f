mod actions;
mod core;
mod logging;
mod state;
mod updates;

pub mod conversations;
pub mod dispatcher;
pub mod error;
pub mod model;
pub mod presentation;
pub mod timeline;
pub mod transport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use anyhow::Context;
use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use conversations::{ConversationStore, ListCursor};
pub use crate::core::AppConfig;
pub use dispatcher::RawEvent;
pub use error::ChatError;
pub use state::*;
pub use timeline::TimelineStore;
pub use transport::Transports;
pub use updates::*;

/// Return the default `courier_config.json` payload used when no config file exists.
pub fn default_config_json() -> String {
    crate::core::default_app_config_json()
}

/// Receives every state snapshot, in `rev` order, on a dedicated listener thread.
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

/// Handle for pushing realtime traffic into the core. The event-channel implementation holds
/// one and calls [`EventSink::deliver`] for every event it receives.
#[derive(Clone)]
pub struct EventSink {
    core_tx: Sender<CoreMsg>,
}

impl EventSink {
    pub fn deliver(&self, name: impl Into<String>, payload: serde_json::Value) {
        self.deliver_raw(RawEvent::new(name, payload));
    }

    pub fn deliver_raw(&self, event: RawEvent) {
        // Contract: never block the transport's thread.
        let _ = self.core_tx.send(CoreMsg::Inbound(event));
    }
}

pub struct ChatApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

impl ChatApp {
    pub fn new(data_dir: String, transports: Transports) -> anyhow::Result<Self> {
        let config = crate::core::load_app_config(&data_dir);
        logging::init_logging(&data_dir, config.log_to_file);
        tracing::info!(data_dir = %data_dir, "ChatApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        let mut core = crate::core::AppCore::new(
            update_tx,
            core_tx.clone(),
            config,
            shared_state.clone(),
            transports,
        )?;

        // Actor loop thread (single threaded "app actor").
        thread::Builder::new()
            .name("courier-core".into())
            .spawn(move || {
                while let Ok(msg) = core_rx.recv() {
                    core.handle_message(msg);
                }
                tracing::debug!("core loop exited");
            })
            .context("spawn core thread")?;

        Ok(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
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

    pub fn event_sink(&self) -> EventSink {
        EventSink {
            core_tx: self.core_tx.clone(),
        }
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
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
