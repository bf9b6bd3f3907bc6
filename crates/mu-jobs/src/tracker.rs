//! Job tracker: board, pollers and upload gate wired together

use std::sync::Arc;

use mu_core::{ClientConfig, JobId, JobKey, UnmixResult};
use mu_session::SessionManager;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::backend::JobBackend;
use crate::board::JobBoard;
use crate::gate::UploadGate;
use crate::poller::{PollEvent, PollOutcome, PollerRegistry};
use crate::validation::SelectedFile;
use crate::visibility::Visibility;

#[derive(Clone)]
pub struct JobTracker {
    board: JobBoard,
    backend: Arc<dyn JobBackend>,
    registry: PollerRegistry,
    gate: UploadGate,
}

impl JobTracker {
    pub fn new(backend: Arc<dyn JobBackend>, config: &ClientConfig, visibility: Visibility) -> Self {
        let board = JobBoard::new();
        let registry = PollerRegistry::new(
            Arc::clone(&backend),
            board.clone(),
            config.polling.clone(),
            visibility,
        );
        let gate = UploadGate::new(
            board.clone(),
            Arc::clone(&backend),
            registry.clone(),
            config.upload.clone(),
        );
        Self {
            board,
            backend,
            registry,
            gate,
        }
    }

    pub fn board(&self) -> &JobBoard {
        &self.board
    }

    pub fn registry(&self) -> &PollerRegistry {
        &self.registry
    }

    pub fn gate(&self) -> &UploadGate {
        &self.gate
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.registry.subscribe()
    }

    pub fn can_upload(&self) -> bool {
        self.gate.can_upload()
    }

    pub async fn upload(&self, file: Option<SelectedFile>) -> UnmixResult<JobId> {
        self.gate.submit(file).await
    }

    /// Load the history and resume polling every job still in progress.
    /// Returns how many pollers were started.
    pub async fn resume(&self) -> UnmixResult<usize> {
        let entries = self.backend.history().await?;
        self.board.seed(&entries);

        let started = self
            .board
            .snapshot()
            .into_iter()
            .filter(|job| job.status.is_active())
            .filter_map(|job| job.id().cloned())
            .filter(|id| self.registry.start(id.clone()))
            .count();

        log::info!(
            "[Tracker] Loaded {} job(s), resumed {} poller(s)",
            entries.len(),
            started
        );
        Ok(started)
    }

    /// Delete `id` on the server; only then stop its poller and drop the row.
    pub async fn delete(&self, id: &JobId) -> UnmixResult<()> {
        self.backend.delete(id).await?;
        self.registry.stop(id);
        self.board.remove(&JobKey::Remote(id.clone()));
        log::info!("[Tracker] Deleted job {}", id);
        Ok(())
    }

    /// Stop every poller and empty the board whenever `session` logs out.
    pub fn attach_session(&self, session: &SessionManager) -> JoinHandle<()> {
        self.registry.stop_on_logout(session)
    }

    /// Wait until the poller for `id` finishes. `None` if nothing is polling it.
    pub async fn wait_for(&self, id: &JobId) -> Option<PollOutcome> {
        let mut events = self.registry.subscribe();
        if !self.registry.is_polling(id) {
            return None;
        }
        loop {
            match events.recv().await {
                Ok(PollEvent::Finished { id: finished, outcome }) if &finished == id => {
                    return Some(outcome);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("[Tracker] Missed {} poll event(s)", skipped);
                    if !self.registry.is_polling(id) {
                        return None;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
