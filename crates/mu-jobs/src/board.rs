//! Job board: the client's view of every tracked job
//!
//! Newest first. Shared by the upload gate, the pollers and whatever renders
//! it; clones share the same rows.

use std::sync::Arc;

use mu_core::{HistoryEntry, Job, JobId, JobKey, JobStatus, StatusReport, UnmixError, UnmixResult};
use parking_lot::RwLock;

#[derive(Debug, Clone, Default)]
pub struct JobBoard {
    jobs: Arc<RwLock<Vec<Job>>>,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Job> {
        self.jobs.read().clone()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    pub fn get(&self, key: &JobKey) -> Option<Job> {
        self.jobs.read().iter().find(|job| &job.key == key).cloned()
    }

    pub fn find(&self, id: &JobId) -> Option<Job> {
        self.get(&JobKey::Remote(id.clone()))
    }

    /// A job is uploading or processing
    pub fn has_active(&self) -> bool {
        self.jobs.read().iter().any(|job| job.status.is_active())
    }

    /// Admission check and optimistic row in one step.
    pub fn try_begin_upload(&self, file_name: &str, size_mb: f64) -> UnmixResult<JobKey> {
        let mut jobs = self.jobs.write();
        if jobs.iter().any(|job| job.status.is_active()) {
            return Err(UnmixError::Concurrency);
        }
        let job = Job::local(file_name, size_mb);
        let key = job.key.clone();
        jobs.insert(0, job);
        Ok(key)
    }

    pub fn set_duration(&self, key: &JobKey, duration_seconds: Option<f64>) {
        if let Some(job) = self.jobs.write().iter_mut().find(|job| &job.key == key) {
            job.duration_seconds = duration_seconds;
        }
    }

    /// Swap the local key for the server id once the upload is accepted.
    pub fn promote(&self, local: &JobKey, id: JobId) -> bool {
        let mut jobs = self.jobs.write();
        match jobs.iter_mut().find(|job| &job.key == local) {
            Some(job) => {
                job.key = JobKey::Remote(id);
                job.status = job.status.advance(JobStatus::Processing);
                true
            }
            None => false,
        }
    }

    /// Fold a status report into the matching row. `None` when untracked.
    pub fn apply_report(&self, id: &JobId, report: &StatusReport) -> Option<JobStatus> {
        let key = JobKey::Remote(id.clone());
        self.jobs
            .write()
            .iter_mut()
            .find(|job| job.key == key)
            .map(|job| job.apply_report(report))
    }

    /// Close out a job whose poller gave up. Terminal rows keep their status.
    pub fn mark_failed(&self, id: &JobId) -> Option<JobStatus> {
        let key = JobKey::Remote(id.clone());
        self.jobs
            .write()
            .iter_mut()
            .find(|job| job.key == key)
            .map(|job| {
                job.status = job.status.advance(JobStatus::Error);
                job.status
            })
    }

    pub fn remove(&self, key: &JobKey) -> Option<Job> {
        let mut jobs = self.jobs.write();
        let idx = jobs.iter().position(|job| &job.key == key)?;
        Some(jobs.remove(idx))
    }

    /// Replace every server-known row with the history listing, keeping
    /// uploads still in flight. Rows already terminal stay terminal.
    pub fn seed(&self, entries: &[HistoryEntry]) {
        let mut jobs = self.jobs.write();
        let previous = std::mem::take(&mut *jobs);

        let (local, remote): (Vec<Job>, Vec<Job>) = previous
            .into_iter()
            .partition(|job| matches!(job.key, JobKey::Local(_)));

        jobs.extend(local);
        for entry in entries {
            let mut job = Job::from_history(entry);
            if let Some(known) = remote.iter().find(|known| known.key == job.key) {
                job.status = known.status.advance(job.status);
            }
            jobs.push(job);
        }
    }

    pub fn clear(&self) {
        self.jobs.write().clear();
    }
}
