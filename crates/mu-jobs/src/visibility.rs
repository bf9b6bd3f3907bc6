//! Host visibility flag
//!
//! Pollers skip requests while the host reports itself hidden. A GUI host
//! flips this from its window events; the CLI leaves it visible.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct Visibility {
    tx: Arc<watch::Sender<bool>>,
}

impl Visibility {
    pub fn new(visible: bool) -> Self {
        let (tx, _) = watch::channel(visible);
        Self { tx: Arc::new(tx) }
    }

    pub fn always_visible() -> Self {
        Self::new(true)
    }

    pub fn set_visible(&self, visible: bool) {
        let previous = self.tx.send_replace(visible);
        if previous != visible {
            log::debug!("[Poller] Host is now {}", if visible { "visible" } else { "hidden" });
        }
    }

    pub fn is_visible(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::always_visible()
    }
}
