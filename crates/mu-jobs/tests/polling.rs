//! Pollers, upload gate and tracker against a scripted backend (paused clock)

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mu_api::ApiClient;
use mu_core::{
    ApiRequest, ApiResponse, AudioUpload, ClientConfig, HistoryEntry, JobId, JobKey, JobStatus,
    StatusReport, Transport, UnmixError, UnmixResult, ValidationKind, endpoints,
};
use mu_jobs::{JobBackend, JobTracker, PollEvent, PollOutcome, SelectedFile, Visibility};
use mu_session::{SessionManager, TokenStore};
use parking_lot::Mutex;
use tokio::sync::{Semaphore, broadcast};
use tokio::time::Instant;

// ═══════════════════════════════════════════════════════════════════════════
// SCRIPTED BACKEND
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct FakeBackend {
    /// Per-job answers; once drained every poll reports "processing"
    scripts: Mutex<HashMap<JobId, VecDeque<UnmixResult<StatusReport>>>>,
    polls: Mutex<Vec<(JobId, Instant)>>,
    /// Status requests wait for a permit when set
    hold: Mutex<Option<Arc<Semaphore>>>,
    upload_results: Mutex<VecDeque<UnmixResult<JobId>>>,
    uploads: Mutex<Vec<AudioUpload>>,
    history: Mutex<Vec<HistoryEntry>>,
    deleted: Mutex<Vec<JobId>>,
    delete_results: Mutex<VecDeque<UnmixResult<()>>>,
}

impl FakeBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn script(&self, id: u64, answers: Vec<UnmixResult<StatusReport>>) {
        self.scripts.lock().insert(JobId::from(id), answers.into());
    }

    fn poll_count(&self, id: u64) -> usize {
        let id = JobId::from(id);
        self.polls.lock().iter().filter(|(polled, _)| *polled == id).count()
    }

    fn poll_offsets(&self, start: Instant) -> Vec<u64> {
        self.polls
            .lock()
            .iter()
            .map(|(_, at)| at.duration_since(start).as_millis() as u64)
            .collect()
    }
}

#[async_trait]
impl JobBackend for FakeBackend {
    async fn fetch_status(&self, id: &JobId) -> UnmixResult<StatusReport> {
        self.polls.lock().push((id.clone(), Instant::now()));

        let hold = self.hold.lock().clone();
        if let Some(hold) = hold {
            let _permit = hold.acquire().await.unwrap();
        }

        self.scripts
            .lock()
            .get_mut(id)
            .and_then(|answers| answers.pop_front())
            .unwrap_or_else(|| Ok(report("processing")))
    }

    async fn upload(&self, upload: &AudioUpload) -> UnmixResult<JobId> {
        self.uploads.lock().push(upload.clone());
        self.upload_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(JobId::from(42)))
    }

    async fn history(&self) -> UnmixResult<Vec<HistoryEntry>> {
        Ok(self.history.lock().clone())
    }

    async fn delete(&self, id: &JobId) -> UnmixResult<()> {
        self.deleted.lock().push(id.clone());
        self.delete_results.lock().pop_front().unwrap_or(Ok(()))
    }
}

fn report(status: &str) -> StatusReport {
    StatusReport {
        status: status.to_string(),
        ..Default::default()
    }
}

fn transient() -> UnmixResult<StatusReport> {
    Err(UnmixError::Transient("server answered 503".into()))
}

fn entry(id: u64, status: &str) -> HistoryEntry {
    serde_json::from_value(serde_json::json!({
        "audio_id": id,
        "nombre_audio": format!("track-{id}.mp3"),
        "estado": status,
    }))
    .unwrap()
}

fn tracker(backend: &Arc<FakeBackend>) -> JobTracker {
    tracker_with(backend, Visibility::always_visible())
}

fn tracker_with(backend: &Arc<FakeBackend>, visibility: Visibility) -> JobTracker {
    let backend: Arc<dyn JobBackend> = backend.clone();
    JobTracker::new(backend, &ClientConfig::default(), visibility)
}

/// Drain events until `id` finishes, collecting the scheduled delays.
async fn run_to_finish(
    events: &mut broadcast::Receiver<PollEvent>,
    id: &JobId,
) -> (Vec<u64>, Vec<JobStatus>, PollOutcome) {
    let mut delays = Vec::new();
    let mut statuses = Vec::new();
    loop {
        match events.recv().await.unwrap() {
            PollEvent::Scheduled { id: job, delay } if &job == id => {
                delays.push(delay.as_millis() as u64)
            }
            PollEvent::Updated { id: job, status, .. } if &job == id => statuses.push(status),
            PollEvent::Finished { id: job, outcome } if &job == id => {
                return (delays, statuses, outcome);
            }
            _ => {}
        }
    }
}

fn wav_bytes(seconds: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..seconds * 8_000 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

// ═══════════════════════════════════════════════════════════════════════════
// POLLER
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_polls_until_processed() {
    let backend = FakeBackend::new();
    backend.script(
        7,
        vec![Ok(report("procesando")), Ok(report("Procesando")), Ok(report("Procesado"))],
    );
    let tracker = tracker(&backend);
    let mut events = tracker.subscribe();
    let id = JobId::from(7);
    let start = Instant::now();

    assert!(tracker.registry().start(id.clone()));
    let (delays, statuses, outcome) = run_to_finish(&mut events, &id).await;

    assert_eq!(outcome, PollOutcome::Processed);
    assert_eq!(delays, vec![3_000, 3_000]);
    assert_eq!(
        statuses,
        vec![JobStatus::Processing, JobStatus::Processing, JobStatus::Processed]
    );
    assert_eq!(backend.poll_offsets(start), vec![0, 3_000, 6_000]);
    assert!(!tracker.registry().is_polling(&id));
}

#[tokio::test(start_paused = true)]
async fn test_error_status_stops_polling() {
    let backend = FakeBackend::new();
    backend.script(3, vec![Ok(report("processing")), Ok(report("ERROR: demucs crashed"))]);
    let tracker = tracker(&backend);
    let mut events = tracker.subscribe();
    let id = JobId::from(3);

    tracker.registry().start(id.clone());
    let (_, statuses, outcome) = run_to_finish(&mut events, &id).await;

    assert_eq!(outcome, PollOutcome::Failed);
    assert_eq!(statuses.last(), Some(&JobStatus::Error));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(backend.poll_count(3), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_back_off_then_reset() {
    let backend = FakeBackend::new();
    backend.script(
        5,
        vec![
            transient(),
            transient(),
            transient(),
            Ok(report("processing")),
            Ok(report("processed")),
        ],
    );
    let tracker = tracker(&backend);
    let mut events = tracker.subscribe();
    let id = JobId::from(5);
    let start = Instant::now();

    tracker.registry().start(id.clone());
    let (delays, _, outcome) = run_to_finish(&mut events, &id).await;

    assert_eq!(outcome, PollOutcome::Processed);
    assert_eq!(delays, vec![6_000, 9_000, 12_000, 3_000]);
    assert_eq!(backend.poll_offsets(start), vec![0, 6_000, 15_000, 27_000, 30_000]);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_is_capped() {
    let backend = FakeBackend::new();
    let mut answers: Vec<_> = (0..8).map(|_| transient()).collect();
    answers.push(Ok(report("processed")));
    backend.script(8, answers);
    let tracker = tracker(&backend);
    let mut events = tracker.subscribe();
    let id = JobId::from(8);

    tracker.registry().start(id.clone());
    let (delays, _, _) = run_to_finish(&mut events, &id).await;

    assert_eq!(
        delays,
        vec![6_000, 9_000, 12_000, 15_000, 15_000, 15_000, 15_000, 15_000]
    );
    assert!(delays.iter().all(|d| (3_000..=15_000).contains(d)));
}

#[tokio::test(start_paused = true)]
async fn test_missing_job_stops_without_retry() {
    let backend = FakeBackend::new();
    backend.script(9, vec![Err(UnmixError::NotFound("gone".into()))]);
    let tracker = tracker(&backend);
    let mut events = tracker.subscribe();
    let id = JobId::from(9);

    tracker.registry().start(id.clone());
    let (delays, _, outcome) = run_to_finish(&mut events, &id).await;

    assert_eq!(outcome, PollOutcome::NotFound);
    assert!(delays.is_empty());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.poll_count(9), 1);
}

#[tokio::test(start_paused = true)]
async fn test_auth_and_rejection_are_terminal() {
    let backend = FakeBackend::new();
    backend.script(1, vec![Err(UnmixError::Auth("refresh failed".into()))]);
    backend.script(
        2,
        vec![Err(UnmixError::from_status(400, "bad id".into(), Default::default()))],
    );
    let tracker = tracker(&backend);
    let mut events = tracker.subscribe();

    tracker.registry().start(JobId::from(1));
    let (_, _, expired) = run_to_finish(&mut events, &JobId::from(1)).await;
    assert_eq!(expired, PollOutcome::SessionExpired);

    tracker.registry().start(JobId::from(2));
    let (_, _, rejected) = run_to_finish(&mut events, &JobId::from(2)).await;
    assert!(matches!(rejected, PollOutcome::Rejected(reason) if reason.contains("bad id")));
}

#[tokio::test(start_paused = true)]
async fn test_unrecoverable_endings_fail_the_row() {
    let backend = FakeBackend::new();
    backend.upload_results.lock().extend([
        Ok(JobId::from(42)),
        Ok(JobId::from(43)),
        Ok(JobId::from(44)),
    ]);
    backend.script(42, vec![Err(UnmixError::NotFound("gone".into()))]);
    backend.script(43, vec![Err(UnmixError::Auth("refresh failed".into()))]);
    backend.script(
        44,
        vec![Err(UnmixError::from_status(400, "bad id".into(), Default::default()))],
    );
    let tracker = tracker(&backend);

    for expected in [
        PollOutcome::NotFound,
        PollOutcome::SessionExpired,
        PollOutcome::Rejected("bad id".into()),
    ] {
        let id = tracker
            .upload(Some(SelectedFile::new("a.mp3", None, vec![0; 32])))
            .await
            .unwrap();
        let outcome = tracker.wait_for(&id).await.unwrap();

        assert_eq!(
            std::mem::discriminant(&outcome),
            std::mem::discriminant(&expected)
        );
        assert_eq!(tracker.board().find(&id).unwrap().status, JobStatus::Error);
        assert!(tracker.can_upload());
    }
    assert_eq!(backend.uploads.lock().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_start_is_a_no_op() {
    let backend = FakeBackend::new();
    let tracker = tracker(&backend);
    let id = JobId::from(11);

    assert!(tracker.registry().start(id.clone()));
    assert!(!tracker.registry().start(id.clone()));
    assert_eq!(tracker.registry().active(), vec![id.clone()]);

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(backend.poll_count(11), 2);

    assert!(tracker.registry().stop(&id));
    assert!(!tracker.registry().stop(&id));
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight_answer() {
    let backend = FakeBackend::new();
    let hold = Arc::new(Semaphore::new(0));
    *backend.hold.lock() = Some(Arc::clone(&hold));
    backend.script(4, vec![Ok(report("processed"))]);

    let tracker = tracker(&backend);
    tracker.board().seed(&[entry(4, "procesando")]);
    let mut events = tracker.subscribe();
    let id = JobId::from(4);

    tracker.registry().start(id.clone());
    while backend.poll_count(4) == 0 {
        tokio::task::yield_now().await;
    }

    assert!(tracker.registry().stop(&id));
    hold.add_permits(10);
    tokio::time::sleep(Duration::from_secs(10)).await;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![PollEvent::Finished {
            id: id.clone(),
            outcome: PollOutcome::Cancelled,
        }]
    );
    assert_eq!(tracker.board().find(&id).unwrap().status, JobStatus::Processing);
    assert_eq!(backend.poll_count(4), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hidden_host_pauses_requests() {
    let backend = FakeBackend::new();
    backend.script(6, vec![Ok(report("processed"))]);
    let visibility = Visibility::new(false);
    let tracker = tracker_with(&backend, visibility.clone());
    let mut events = tracker.subscribe();
    let id = JobId::from(6);

    tracker.registry().start(id.clone());
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(backend.poll_count(6), 0);
    assert!(tracker.registry().is_polling(&id));
    assert!(matches!(events.try_recv(), Ok(PollEvent::Paused { .. })));

    visibility.set_visible(true);
    let (_, _, outcome) = run_to_finish(&mut events, &id).await;

    assert_eq!(outcome, PollOutcome::Processed);
    assert_eq!(backend.poll_count(6), 1);
}

#[tokio::test(start_paused = true)]
async fn test_logout_stops_every_poller() {
    struct Offline;

    #[async_trait]
    impl Transport for Offline {
        async fn send(&self, _request: &ApiRequest) -> UnmixResult<ApiResponse> {
            Err(UnmixError::Transient("offline".into()))
        }
    }

    let backend = FakeBackend::new();
    let tracker = tracker(&backend);
    tracker
        .board()
        .seed(&[entry(1, "procesando"), entry(2, "procesando"), entry(3, "procesado")]);
    let session = SessionManager::new(Arc::new(Offline), TokenStore::in_memory());
    let _sweeper = tracker.attach_session(&session);
    let mut events = tracker.subscribe();

    tracker.registry().start(JobId::from(1));
    tracker.registry().start(JobId::from(2));
    assert_eq!(tracker.registry().active().len(), 2);
    assert!(!tracker.can_upload());

    session.logout().await;

    let mut cancelled = 0;
    while cancelled < 2 {
        if let PollEvent::Finished { outcome, .. } = events.recv().await.unwrap() {
            assert_eq!(outcome, PollOutcome::Cancelled);
            cancelled += 1;
        }
    }
    assert!(tracker.registry().active().is_empty());
    assert!(tracker.board().is_empty());
    assert!(tracker.can_upload());

    let polls = backend.polls.lock().len();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(backend.polls.lock().len(), polls);
}

/// Protected routes reject every bearer and the refresh endpoint refuses too.
#[derive(Default)]
struct RevokedSession {
    requests: Mutex<Vec<ApiRequest>>,
}

impl RevokedSession {
    fn requests_to(&self, path: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.path == path).count()
    }
}

#[async_trait]
impl Transport for RevokedSession {
    async fn send(&self, request: &ApiRequest) -> UnmixResult<ApiResponse> {
        self.requests.lock().push(request.clone());
        let detail = if request.path == endpoints::REFRESH {
            "Token is invalid or expired"
        } else {
            "Given token not valid for any token type"
        };
        Ok(ApiResponse::json_body(401, &serde_json::json!({ "detail": detail })))
    }
}

#[tokio::test(start_paused = true)]
async fn test_rejected_refresh_ends_polling_through_session() {
    let transport = Arc::new(RevokedSession::default());
    let tokens = TokenStore::in_memory();
    tokens.store_login("a1", Some("r1"), false).unwrap();
    let session = SessionManager::new(transport.clone(), tokens);
    assert!(session.is_authenticated());

    let backend: Arc<dyn JobBackend> = Arc::new(ApiClient::new(session.clone()));
    let tracker = JobTracker::new(backend, &ClientConfig::default(), Visibility::always_visible());
    tracker.board().seed(&[entry(21, "procesando")]);
    assert!(!tracker.can_upload());
    let mut events = tracker.subscribe();
    let id = JobId::from(21);

    tracker.registry().start(id.clone());
    let (delays, statuses, outcome) = run_to_finish(&mut events, &id).await;

    assert_eq!(outcome, PollOutcome::SessionExpired);
    assert!(delays.is_empty());
    assert!(statuses.is_empty());
    assert_eq!(transport.requests_to(&endpoints::status(&id)), 1);
    assert_eq!(transport.requests_to(endpoints::REFRESH), 1);
    assert!(!session.is_authenticated());

    assert_eq!(tracker.board().find(&id).unwrap().status, JobStatus::Error);
    assert!(tracker.can_upload());
    assert!(!tracker.registry().is_polling(&id));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.requests_to(&endpoints::status(&id)), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_update_after_cancelled() {
    let backend = FakeBackend::new();
    let tracker = tracker(&backend);
    let mut events = tracker.subscribe();

    for n in 0..40u64 {
        let id = JobId::from(100 + n);
        tracker.registry().start(id.clone());
        tokio::time::sleep(Duration::from_micros(n * 25)).await;
        tracker.registry().stop(&id);
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut cancelled = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            PollEvent::Finished { id, outcome } => {
                assert_eq!(outcome, PollOutcome::Cancelled);
                cancelled.push(id);
            }
            PollEvent::Updated { id, .. } => {
                assert!(!cancelled.contains(&id), "job {id} updated after it was stopped");
            }
            _ => {}
        }
    }
    assert_eq!(cancelled.len(), 40);
    assert!(tracker.registry().active().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// UPLOAD GATE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_upload_starts_polling_and_closes_gate() {
    let backend = FakeBackend::new();
    let tracker = tracker(&backend);
    assert!(tracker.can_upload());

    let file = SelectedFile::new("Take 1.wav", Some("audio/wav".into()), wav_bytes(2));
    let id = tracker.upload(Some(file)).await.unwrap();

    assert_eq!(id, JobId::from(42));
    let job = tracker.board().find(&id).unwrap();
    assert_eq!(job.title, "Take 1");
    assert_eq!(job.status, JobStatus::Processing);
    assert!(tracker.registry().is_polling(&id));
    assert!(!tracker.can_upload());

    let sent = backend.uploads.lock()[0].clone();
    assert_eq!(sent.file_name, "Take 1.wav");
    assert!((sent.duration_seconds.unwrap() - 2.0).abs() < 1e-6);

    let second = SelectedFile::new("other.mp3", None, vec![1; 16]);
    assert!(matches!(
        tracker.upload(Some(second)).await,
        Err(UnmixError::Concurrency)
    ));
    assert_eq!(backend.uploads.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_gate_reopens_when_job_finishes() {
    let backend = FakeBackend::new();
    backend.script(42, vec![Ok(report("procesado"))]);
    let tracker = tracker(&backend);

    let id = tracker
        .upload(Some(SelectedFile::new("a.mp3", None, vec![0; 32])))
        .await
        .unwrap();
    assert_eq!(tracker.wait_for(&id).await, Some(PollOutcome::Processed));

    assert!(tracker.can_upload());
    assert_eq!(tracker.wait_for(&id).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_files_never_reach_backend() {
    let backend = FakeBackend::new();
    let tracker = tracker(&backend);

    let kind = |result: UnmixResult<JobId>| match result {
        Err(UnmixError::Validation(e)) => Some(e.kind),
        _ => None,
    };

    assert_eq!(kind(tracker.upload(None).await), Some(ValidationKind::Empty));
    assert_eq!(
        kind(
            tracker
                .upload(Some(SelectedFile::new("a.flac", Some("audio/flac".into()), vec![0; 8])))
                .await
        ),
        Some(ValidationKind::Type)
    );
    let too_big = SelectedFile::new("big.mp3", None, vec![0; 50 * 1024 * 1024 + 1]);
    assert_eq!(kind(tracker.upload(Some(too_big)).await), Some(ValidationKind::Size));

    assert!(backend.uploads.lock().is_empty());
    assert!(tracker.board().is_empty());
    assert!(tracker.can_upload());
}

#[tokio::test(start_paused = true)]
async fn test_failed_upload_removes_row() {
    let backend = FakeBackend::new();
    backend
        .upload_results
        .lock()
        .push_back(Err(UnmixError::Transient("connection reset".into())));
    let tracker = tracker(&backend);

    let result = tracker
        .upload(Some(SelectedFile::new("a.mp3", None, vec![0; 32])))
        .await;

    assert!(matches!(result, Err(UnmixError::Transient(_))));
    assert!(tracker.board().is_empty());
    assert!(tracker.can_upload());
    assert!(tracker.registry().active().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// TRACKER
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_resume_polls_only_active_jobs() {
    let backend = FakeBackend::new();
    *backend.history.lock() = vec![
        entry(1, "procesando"),
        entry(2, "Procesado"),
        entry(3, "error"),
    ];
    let tracker = tracker(&backend);

    assert_eq!(tracker.resume().await.unwrap(), 1);
    assert_eq!(tracker.registry().active(), vec![JobId::from(1)]);
    assert_eq!(tracker.board().len(), 3);
    assert!(!tracker.can_upload());

    // Resuming again doesn't double up
    assert_eq!(tracker.resume().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_delete_keeps_job_tracked() {
    let backend = FakeBackend::new();
    *backend.history.lock() = vec![entry(1, "procesando")];
    backend
        .delete_results
        .lock()
        .push_back(Err(UnmixError::Transient("server answered 502".into())));
    let tracker = tracker(&backend);
    tracker.resume().await.unwrap();
    let id = JobId::from(1);

    assert!(matches!(tracker.delete(&id).await, Err(UnmixError::Transient(_))));

    assert_eq!(*backend.deleted.lock(), vec![id.clone()]);
    assert!(tracker.registry().is_polling(&id));
    assert_eq!(tracker.board().find(&id).unwrap().status, JobStatus::Processing);
    assert!(!tracker.can_upload());

    let polls = backend.poll_count(1);
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert!(backend.poll_count(1) > polls);

    tracker.delete(&id).await.unwrap();
    assert!(!tracker.registry().is_polling(&id));
    assert!(tracker.board().find(&id).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_delete_stops_poller_and_drops_row() {
    let backend = FakeBackend::new();
    *backend.history.lock() = vec![entry(1, "procesando"), entry(2, "procesado")];
    let tracker = tracker(&backend);
    tracker.resume().await.unwrap();

    tracker.delete(&JobId::from(1)).await.unwrap();

    assert!(!tracker.registry().is_polling(&JobId::from(1)));
    assert!(tracker.board().get(&JobKey::Remote(JobId::from(1))).is_none());
    assert_eq!(tracker.board().len(), 1);
    assert_eq!(*backend.deleted.lock(), vec![JobId::from(1)]);
    assert!(tracker.can_upload());
}
