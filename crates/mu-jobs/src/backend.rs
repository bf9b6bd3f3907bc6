//! What the job tracker needs from the backend

use async_trait::async_trait;
use mu_api::ApiClient;
use mu_core::{AudioUpload, HistoryEntry, JobId, StatusReport, UnmixResult};

/// Job endpoints, already behind the session interceptor
#[async_trait]
pub trait JobBackend: Send + Sync {
    async fn fetch_status(&self, id: &JobId) -> UnmixResult<StatusReport>;

    async fn upload(&self, upload: &AudioUpload) -> UnmixResult<JobId>;

    async fn history(&self) -> UnmixResult<Vec<HistoryEntry>>;

    async fn delete(&self, id: &JobId) -> UnmixResult<()>;
}

#[async_trait]
impl JobBackend for ApiClient {
    async fn fetch_status(&self, id: &JobId) -> UnmixResult<StatusReport> {
        self.job_status(id).await
    }

    async fn upload(&self, upload: &AudioUpload) -> UnmixResult<JobId> {
        self.upload_audio(upload).await
    }

    async fn history(&self) -> UnmixResult<Vec<HistoryEntry>> {
        self.list_jobs().await
    }

    async fn delete(&self, id: &JobId) -> UnmixResult<()> {
        self.delete_job(id).await
    }
}
