//! Upload gate
//!
//! Admits at most one upload at a time. A new file is accepted only while no
//! tracked job is uploading or processing; the optimistic row is created in
//! the same step as that check, so two racing submits can't both get through.

use std::sync::Arc;

use mu_core::{AudioUpload, JobId, UnmixError, UnmixResult, UploadConfig};

use crate::backend::JobBackend;
use crate::board::JobBoard;
use crate::poller::PollerRegistry;
use crate::probe::probe_duration;
use crate::validation::{SelectedFile, require_selection, validate_audio_file};

#[derive(Clone)]
pub struct UploadGate {
    board: JobBoard,
    backend: Arc<dyn JobBackend>,
    registry: PollerRegistry,
    limits: UploadConfig,
}

impl UploadGate {
    pub fn new(
        board: JobBoard,
        backend: Arc<dyn JobBackend>,
        registry: PollerRegistry,
        limits: UploadConfig,
    ) -> Self {
        Self {
            board,
            backend,
            registry,
            limits,
        }
    }

    /// No job is uploading or processing
    pub fn can_upload(&self) -> bool {
        !self.board.has_active()
    }

    pub fn limits(&self) -> &UploadConfig {
        &self.limits
    }

    /// Validate, upload and start polling. Returns the server id.
    ///
    /// Nothing reaches the network when the gate is closed or the file is
    /// rejected. A failed upload removes its optimistic row again.
    pub async fn submit(&self, file: Option<SelectedFile>) -> UnmixResult<JobId> {
        if !self.can_upload() {
            log::warn!("[Upload] Rejected: another job is still active");
            return Err(UnmixError::Concurrency);
        }

        let file = require_selection(file)?;
        validate_audio_file(&file, self.limits.max_size_bytes())?;

        let size_mb = file.size_mb();
        let local = self.board.try_begin_upload(&file.file_name, size_mb)?;

        let duration = probe_duration(&file.file_name, file.bytes.clone()).await;
        self.board.set_duration(&local, duration);

        log::info!(
            "[Upload] Sending {} ({:.2} MB, duration {:?})",
            file.file_name,
            size_mb,
            duration
        );

        let upload = AudioUpload {
            file_name: file.file_name,
            mime: file.mime,
            bytes: file.bytes,
            duration_seconds: duration,
            size_mb,
        };

        match self.backend.upload(&upload).await {
            Ok(id) => {
                self.board.promote(&local, id.clone());
                self.registry.start(id.clone());
                log::info!("[Upload] Accepted as job {}", id);
                Ok(id)
            }
            Err(e) => {
                self.board.remove(&local);
                log::error!("[Upload] {} failed: {}", upload.file_name, e);
                Err(e)
            }
        }
    }
}
