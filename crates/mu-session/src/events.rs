//! Session event bus
//!
//! Components that care about authentication state (pollers, theme, the
//! front-end) subscribe here instead of listening on an ambient global.
//! Dropping the receiver unsubscribes.

use mu_core::User;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Authentication state transition
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A session started (here or in another process sharing the stores)
    LoggedIn { user: Option<User> },
    /// The cached profile changed
    UserUpdated(User),
    /// The access token was replaced after a refresh
    TokenRefreshed,
    /// Every credential is gone
    LoggedOut,
}

/// Broadcast sender owned by the session manager
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
