//! Browser notification channel
//!
//! Only the most recently opened `/state` socket receives events. Opening
//! the page in a new tab detaches the previous one, whose socket then
//! closes on its own.

pub mod types;

pub use types::{ClientEvent, DataChannelEvent, UiState};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

struct ClientSlot {
    id: u64,
    tx: mpsc::UnboundedSender<ClientEvent>,
}

/// Receiving end handed to a `/state` socket
pub struct ClientSubscription {
    pub id: u64,
    pub rx: mpsc::UnboundedReceiver<ClientEvent>,
}

#[derive(Default)]
pub struct ClientNotifier {
    current: Mutex<Option<ClientSlot>>,
    next_id: AtomicU64,
}

impl ClientNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new client, replacing the current one
    pub fn attach(&self) -> ClientSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(previous) = self.current.lock().replace(ClientSlot { id, tx }) {
            info!("State client {} replaced by {}", previous.id, id);
        }

        ClientSubscription { id, rx }
    }

    /// Detach `id` if it is still the current client
    pub fn detach(&self, id: u64) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|slot| slot.id == id) {
            *current = None;
            debug!("State client {} detached", id);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Deliver without waiting; returns false when nobody received it
    pub fn notify(&self, event: ClientEvent) -> bool {
        let current = self.current.lock();
        match current.as_ref() {
            Some(slot) => {
                debug!("Notify client {}: {:?}", slot.id, event);
                slot.tx.send(event).is_ok()
            }
            None => {
                debug!("No state client attached, dropping {:?}", event);
                false
            }
        }
    }
}
