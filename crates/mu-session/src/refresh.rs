//! Refresh coordination state
//!
//! At most one refresh is in flight. Callers that need a fresh token while one
//! is running join the waiter list; when it settles, every waiter gets the
//! same outcome in enqueue order and the slot is cleared.

use tokio::sync::oneshot;

/// Why a refresh did not produce a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshFailure {
    pub reason: String,
}

impl RefreshFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// New access token, or why there is none
pub type RefreshOutcome = Result<String, RefreshFailure>;

/// A caller's place in the waiter list
#[derive(Debug)]
pub struct Ticket {
    pub receiver: oneshot::Receiver<RefreshOutcome>,
    /// This caller opened the cycle and must run the refresh
    pub leader: bool,
}

#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    cycles: u64,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the current cycle, opening one if none is running
    pub fn enqueue(&mut self) -> Ticket {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);

        let leader = !self.in_flight;
        if leader {
            self.in_flight = true;
            self.cycles += 1;
        }
        Ticket { receiver: rx, leader }
    }

    /// Hand the outcome to every waiter and close the cycle.
    /// Returns how many waiters were still listening.
    pub fn settle(&mut self, outcome: RefreshOutcome) -> usize {
        self.in_flight = false;
        std::mem::take(&mut self.waiters)
            .into_iter()
            .filter_map(|waiter| waiter.send(outcome.clone()).ok())
            .count()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    /// Refresh cycles opened so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}
