//! Job Status Poller
//!
//! One loop per job id. Each tick fetches status, folds it into the board and
//! either stops (terminal status, unrecoverable error, explicit stop) or arms
//! the next timer: base delay after a success, additive backoff after a
//! transient failure. Ticks for one job never overlap; jobs are independent.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mu_core::{JobId, JobStatus, PollingConfig, StatusReport, UnmixError};
use mu_session::{SessionEvent, SessionManager};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::backend::JobBackend;
use crate::backoff::Backoff;
use crate::board::JobBoard;
use crate::visibility::Visibility;

const EVENT_CAPACITY: usize = 256;

// ═══════════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════════

/// Why a poller stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Stems are ready
    Processed,
    /// The backend reported a processing error
    Failed,
    /// Stopped by `stop`, `stop_all` or a logout sweep
    Cancelled,
    /// Credentials were rejected even after a refresh
    SessionExpired,
    /// The job no longer exists
    NotFound,
    /// Any other definitive rejection
    Rejected(String),
}

impl PollOutcome {
    pub fn describe(&self) -> String {
        match self {
            PollOutcome::Processed => "processed".to_string(),
            PollOutcome::Failed => "processing failed".to_string(),
            PollOutcome::Cancelled => "stopped".to_string(),
            PollOutcome::SessionExpired => "session expired".to_string(),
            PollOutcome::NotFound => "resource no longer available".to_string(),
            PollOutcome::Rejected(reason) => format!("rejected: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// Next request armed after `delay`
    Scheduled { id: JobId, delay: Duration },
    /// Host hidden; tick skipped without a request
    Paused { id: JobId },
    /// Status fetched and applied
    Updated {
        id: JobId,
        status: JobStatus,
        report: StatusReport,
    },
    Finished { id: JobId, outcome: PollOutcome },
}

// ═══════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════

/// Cleared under its lock by `stop`; a poller holds the lock while it
/// applies an answer, so a stopped handle never writes after `Cancelled`.
type Alive = Arc<Mutex<bool>>;

struct PollerHandle {
    generation: u64,
    alive: Alive,
    task: JoinHandle<()>,
}

struct RegistryInner {
    backend: Arc<dyn JobBackend>,
    board: JobBoard,
    config: PollingConfig,
    visibility: Visibility,
    handles: Mutex<HashMap<JobId, PollerHandle>>,
    events: broadcast::Sender<PollEvent>,
    next_generation: AtomicU64,
}

/// At most one live poller per job id. Clones share the same pollers.
#[derive(Clone)]
pub struct PollerRegistry {
    inner: Arc<RegistryInner>,
}

impl PollerRegistry {
    pub fn new(
        backend: Arc<dyn JobBackend>,
        board: JobBoard,
        config: PollingConfig,
        visibility: Visibility,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(RegistryInner {
                backend,
                board,
                config,
                visibility,
                handles: Mutex::new(HashMap::new()),
                events,
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.inner.events.subscribe()
    }

    pub fn board(&self) -> &JobBoard {
        &self.inner.board
    }

    pub fn visibility(&self) -> &Visibility {
        &self.inner.visibility
    }

    /// Start polling `id`; the first request goes out immediately.
    /// Returns `false` when a poller for `id` is already running.
    pub fn start(&self, id: JobId) -> bool {
        let mut handles = self.inner.handles.lock();
        if handles.contains_key(&id) {
            return false;
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let alive = Arc::new(Mutex::new(true));
        let task = tokio::spawn(self.clone().run(id.clone(), Arc::clone(&alive), generation));

        log::debug!("[Poller] Started job {}", id);
        handles.insert(
            id,
            PollerHandle {
                generation,
                alive,
                task,
            },
        );
        true
    }

    /// Stop polling `id`. Idempotent; returns whether a poller was running.
    pub fn stop(&self, id: &JobId) -> bool {
        let handle = self.inner.handles.lock().remove(id);
        match handle {
            Some(handle) => {
                self.cancel(id, handle);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) -> usize {
        let drained: Vec<_> = self.inner.handles.lock().drain().collect();
        let count = drained.len();
        for (id, handle) in drained {
            self.cancel(&id, handle);
        }
        if count > 0 {
            log::info!("[Poller] Stopped {} poller(s)", count);
        }
        count
    }

    pub fn is_polling(&self, id: &JobId) -> bool {
        self.inner.handles.lock().contains_key(id)
    }

    /// Ids with a live poller, sorted
    pub fn active(&self) -> Vec<JobId> {
        let mut ids: Vec<_> = self.inner.handles.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop every poller and empty the board whenever the session ends.
    pub fn stop_on_logout(&self, session: &SessionManager) -> JoinHandle<()> {
        let mut events = session.subscribe();
        let registry = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::LoggedOut) => {
                        registry.stop_all();
                        registry.inner.board.clear();
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("[Poller] Missed {} session event(s)", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn cancel(&self, id: &JobId, handle: PollerHandle) {
        *handle.alive.lock() = false;
        handle.task.abort();
        log::debug!("[Poller] Stopped job {}", id);
        self.emit(PollEvent::Finished {
            id: id.clone(),
            outcome: PollOutcome::Cancelled,
        });
    }

    fn emit(&self, event: PollEvent) {
        let _ = self.inner.events.send(event);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LOOP
    // ═══════════════════════════════════════════════════════════════════════

    async fn run(self, id: JobId, alive: Alive, generation: u64) {
        let mut backoff = Backoff::new(&self.inner.config);
        let mut delay = Duration::ZERO;

        loop {
            if !delay.is_zero() {
                self.emit(PollEvent::Scheduled {
                    id: id.clone(),
                    delay,
                });
                tokio::time::sleep(delay).await;
                if !*alive.lock() {
                    return;
                }
            }

            if !self.inner.visibility.is_visible() {
                self.emit(PollEvent::Paused { id: id.clone() });
                delay = backoff.current();
                continue;
            }

            let result = self.inner.backend.fetch_status(&id).await;

            let live = alive.lock();
            if !*live {
                return;
            }

            let outcome = match result {
                Ok(report) => {
                    let status = self
                        .inner
                        .board
                        .apply_report(&id, &report)
                        .unwrap_or_else(|| report.normalized());
                    self.emit(PollEvent::Updated {
                        id: id.clone(),
                        status,
                        report,
                    });
                    match status {
                        JobStatus::Processed => PollOutcome::Processed,
                        JobStatus::Error => PollOutcome::Failed,
                        _ => {
                            delay = backoff.reset();
                            continue;
                        }
                    }
                }
                Err(UnmixError::Auth(_)) => PollOutcome::SessionExpired,
                Err(UnmixError::NotFound(_)) => PollOutcome::NotFound,
                Err(e) if e.is_transient() => {
                    delay = backoff.grow();
                    log::debug!("[Poller] Job {} poll failed, retrying in {:?}: {}", id, delay, e);
                    continue;
                }
                Err(e) => PollOutcome::Rejected(e.to_string()),
            };

            self.finish(&id, generation, outcome);
            return;
        }
    }

    /// Called with the handle's liveness lock held.
    fn finish(&self, id: &JobId, generation: u64, outcome: PollOutcome) {
        {
            let mut handles = self.inner.handles.lock();
            if handles.get(id).is_some_and(|h| h.generation == generation) {
                handles.remove(id);
            }
        }

        match &outcome {
            PollOutcome::Processed | PollOutcome::Failed => {
                log::info!("[Poller] Job {} finished: {}", id, outcome.describe());
            }
            _ => {
                self.inner.board.mark_failed(id);
                log::warn!("[Poller] Job {} stopped: {}", id, outcome.describe());
            }
        }
        self.emit(PollEvent::Finished {
            id: id.clone(),
            outcome,
        });
    }
}
