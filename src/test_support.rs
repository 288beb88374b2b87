use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use async_trait::async_trait;
use axum::Router;
use time::macros::datetime;
use tokio::sync::{Mutex, Notify, OwnedMutexGuard};

use crate::clients::{
    AttemptFilter, AttemptPage, AttemptStore, ClientError, PageCursor, ScoringService,
    UploadReceipt,
};
use crate::core::config::Settings;
use crate::core::session::{CurrentUser, Session};
use crate::core::time::now_utc;
use crate::errors::HomeworkError;
use crate::models::{
    Attempt, AttemptContext, AttemptId, AttemptStatus, HomeworkPolicy, Recording, ReviewVerdict,
    UserId, UserRole, VerdictRecord,
};
use crate::services::capture::{AudioInput, DeviceError, InputStream};
use crate::services::wav;

pub(crate) const TEST_REVIEWER_ID: UserId = 42;

pub(crate) fn env_lock_blocking() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.blocking_lock_owned()
}

pub(crate) fn set_test_env() {
    std::env::set_var("TURANTALIM_ENV", "test");
    std::env::set_var("TURANTALIM_STRICT_CONFIG", "0");
    std::env::set_var("TURANTALIM_API_URL", "http://localhost:8000");
    for key in [
        "ENVIRONMENT",
        "API_V1_STR",
        "TURANTALIM_ACCESS_TOKEN",
        "API_CONNECT_TIMEOUT",
        "API_REQUEST_TIMEOUT",
        "HOMEWORK_APPROVED_COINS",
        "MAX_HOMEWORK_ATTEMPTS",
        "PASSING_SCORE_THRESHOLD",
        "SECOND_CHANCE_ATTEMPTS",
        "MAX_RECORDING_SECONDS",
        "MAX_AUDIO_FILE_SIZE_MB",
        "SUPPORTED_AUDIO_FORMATS",
    ] {
        std::env::remove_var(key);
    }
}

pub(crate) fn test_policy() -> HomeworkPolicy {
    HomeworkPolicy::from_settings(&Settings::test_defaults("http://localhost:8000"))
}

pub(crate) fn sample_attempt(id: AttemptId, status: AttemptStatus) -> Attempt {
    Attempt {
        id,
        lesson_id: 4,
        student_id: 17,
        student_name: Some("Test Student".to_string()),
        lesson_title: None,
        attempt_number: 1,
        max_attempts: 3,
        audio_url: Some(format!("/media/homework_submissions/{id}.wav")),
        transcription: Some("Assalomu alaykum".to_string()),
        similarity_score: Some(75),
        status,
        feedback: None,
        coins_awarded: 0,
        is_late: false,
        created_at: datetime!(2025-03-01 08:00 UTC),
        reviewed_at: None,
        reviewer_id: None,
    }
}

pub(crate) fn student_session(id: UserId, coin_balance: u32) -> Session {
    let user = CurrentUser { id, full_name: format!("Student {id}"), role: UserRole::Student };
    Session::new(user, "student-token", coin_balance)
}

pub(crate) fn teacher_session(id: UserId) -> Session {
    let user = CurrentUser { id, full_name: format!("Teacher {id}"), role: UserRole::Teacher };
    Session::new(user, "teacher-token", 0)
}

/// A finalized 8 kHz mono WAV of the given length.
pub(crate) fn wav_recording(seconds: u32) -> Recording {
    let samples = vec![0_i16; 8_000 * seconds as usize];
    let payload = wav::encode_pcm16(&samples, 8_000, 1).expect("wav");
    Recording::finalize(payload, wav::WAV_MIME, seconds, now_utc())
}

pub(crate) async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{addr}")
}

#[derive(Debug)]
enum OpenOutcome {
    Ok,
    Denied,
    Missing,
}

/// Scripted input device. Clones share state, so a test can watch the device a
/// `Recorder` owns.
#[derive(Debug, Clone)]
pub(crate) struct FakeInput {
    outcome: Arc<OpenOutcome>,
    sample_rate: u32,
    channels: u16,
    fail_pause: bool,
    torn_frames: bool,
    open: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl FakeInput {
    pub(crate) fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            outcome: Arc::new(OpenOutcome::Ok),
            sample_rate,
            channels,
            fail_pause: false,
            torn_frames: false,
            open: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn denied() -> Self {
        Self { outcome: Arc::new(OpenOutcome::Denied), ..Self::new(8_000, 1) }
    }

    pub(crate) fn missing() -> Self {
        Self { outcome: Arc::new(OpenOutcome::Missing), ..Self::new(8_000, 1) }
    }

    pub(crate) fn failing_pause(mut self) -> Self {
        self.fail_pause = true;
        self
    }

    /// Every drain ends with one stray sample, leaving a partial frame.
    pub(crate) fn torn_frames(mut self) -> Self {
        self.torn_frames = true;
        self
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

impl AudioInput for FakeInput {
    fn open(&mut self) -> Result<Box<dyn InputStream>, DeviceError> {
        match *self.outcome {
            OpenOutcome::Denied => return Err(DeviceError::PermissionDenied),
            OpenOutcome::Missing => {
                return Err(DeviceError::Unavailable("no input device".to_string()))
            }
            OpenOutcome::Ok => {}
        }
        assert!(!self.open.swap(true, Ordering::SeqCst), "device opened twice");
        self.paused.store(false, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            sample_rate: self.sample_rate,
            channels: self.channels,
            fail_pause: self.fail_pause,
            torn_frames: self.torn_frames,
            open: Arc::clone(&self.open),
            paused: Arc::clone(&self.paused),
        }))
    }
}

struct FakeStream {
    sample_rate: u32,
    channels: u16,
    fail_pause: bool,
    torn_frames: bool,
    open: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl InputStream for FakeStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn set_paused(&mut self, paused: bool) -> Result<(), DeviceError> {
        if self.fail_pause {
            return Err(DeviceError::Unavailable("device unplugged".to_string()));
        }
        self.paused.store(paused, Ordering::SeqCst);
        Ok(())
    }

    fn drain(&mut self) -> Vec<i16> {
        if self.paused.load(Ordering::SeqCst) {
            return Vec::new();
        }
        let mut samples: Vec<i16> = (0..self.sample_rate as usize * self.channels as usize / 10)
            .map(|i| ((i % 64) as i16 - 32) * 100)
            .collect();
        if self.torn_frames {
            samples.push(0);
        }
        samples
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    attempts: Vec<Attempt>,
    next_id: AttemptId,
    failing_uploads: u32,
    uploaded_digests: Vec<String>,
    list_calls: usize,
    verdict_writes: usize,
    last_verdict: Option<VerdictRecord>,
}

/// In-memory scoring service and attempt store.
#[derive(Debug)]
pub(crate) struct MemoryBackend {
    state: StdMutex<MemoryState>,
    page_size: usize,
}

impl MemoryBackend {
    pub(crate) fn new() -> Self {
        Self::with_attempts(Vec::new())
    }

    pub(crate) fn with_attempts(attempts: Vec<Attempt>) -> Self {
        let next_id = attempts.iter().map(|attempt| attempt.id).max().unwrap_or(99) + 1;
        Self {
            state: StdMutex::new(MemoryState { attempts, next_id, ..MemoryState::default() }),
            page_size: 20,
        }
    }

    pub(crate) fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub(crate) fn fail_next_uploads(&self, count: u32) {
        self.state.lock().expect("state").failing_uploads = count;
    }

    pub(crate) fn upload_count(&self) -> usize {
        self.state.lock().expect("state").uploaded_digests.len()
    }

    pub(crate) fn uploaded_digests(&self) -> Vec<String> {
        self.state.lock().expect("state").uploaded_digests.clone()
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.state.lock().expect("state").list_calls
    }

    pub(crate) fn verdict_writes(&self) -> usize {
        self.state.lock().expect("state").verdict_writes
    }

    pub(crate) fn last_verdict_status(&self) -> Option<AttemptStatus> {
        self.state.lock().expect("state").last_verdict.as_ref().map(|record| record.status)
    }

    pub(crate) fn attempt(&self, attempt_id: AttemptId) -> Option<Attempt> {
        let state = self.state.lock().expect("state");
        state.attempts.iter().find(|attempt| attempt.id == attempt_id).cloned()
    }

    /// Applies a verdict directly, as a teacher on another device would.
    pub(crate) fn review(
        &self,
        attempt_id: AttemptId,
        verdict: ReviewVerdict,
        coins_awarded: u32,
    ) -> Result<Attempt, HomeworkError> {
        let record = verdict.into_record(coins_awarded, TEST_REVIEWER_ID, now_utc());
        let mut state = self.state.lock().expect("state");
        let stored = state
            .attempts
            .iter_mut()
            .find(|attempt| attempt.id == attempt_id)
            .ok_or_else(|| HomeworkError::NotFound(format!("attempt {attempt_id}")))?;
        let reviewed = stored.with_verdict(&record)?;
        *stored = reviewed.clone();
        Ok(reviewed)
    }
}

#[async_trait]
impl ScoringService for MemoryBackend {
    async fn upload_submission(
        &self,
        context: &AttemptContext,
        recording: &Recording,
    ) -> Result<UploadReceipt, ClientError> {
        let mut state = self.state.lock().expect("state");
        if state.failing_uploads > 0 {
            state.failing_uploads -= 1;
            state.uploaded_digests.push(recording.sha256().to_string());
            return Err(ClientError::Network("connection reset by peer".to_string()));
        }

        let id = state.next_id;
        state.next_id += 1;
        state.uploaded_digests.push(recording.sha256().to_string());

        let mut attempt = sample_attempt(id, AttemptStatus::Submitted);
        attempt.lesson_id = context.lesson_id;
        attempt.student_id = context.student_id;
        attempt.attempt_number = context.next_attempt_number();
        attempt.max_attempts = context.max_attempts;
        attempt.similarity_score = Some(80);
        attempt.created_at = now_utc();
        state.attempts.push(attempt.clone());

        Ok(UploadReceipt {
            attempt_id: id,
            status: Some(AttemptStatus::Submitted),
            transcription: attempt.transcription,
            similarity_score: attempt.similarity_score,
            audio_url: attempt.audio_url,
        })
    }
}

#[async_trait]
impl AttemptStore for MemoryBackend {
    async fn list_attempts(
        &self,
        filter: &AttemptFilter,
        cursor: Option<&PageCursor>,
    ) -> Result<AttemptPage, ClientError> {
        let mut state = self.state.lock().expect("state");
        state.list_calls += 1;

        let offset = match cursor {
            Some(PageCursor(raw)) => {
                raw.parse::<usize>().map_err(|_| ClientError::Decode(format!("bad cursor {raw}")))?
            }
            None => 0,
        };
        // Server-side query parameters only; statuses and names are left to the caller.
        let rows: Vec<Attempt> = state
            .attempts
            .iter()
            .filter(|attempt| filter.lesson_id.map_or(true, |lesson| lesson == attempt.lesson_id))
            .filter(|attempt| {
                filter.student_id.map_or(true, |student| student == attempt.student_id)
            })
            .cloned()
            .collect();

        let end = (offset + self.page_size).min(rows.len());
        let attempts = rows.get(offset..end).map(<[Attempt]>::to_vec).unwrap_or_default();
        let next = (end < rows.len()).then(|| PageCursor(end.to_string()));
        Ok(AttemptPage { attempts, next })
    }

    async fn get_attempt(&self, attempt_id: AttemptId) -> Result<Attempt, ClientError> {
        self.attempt(attempt_id).ok_or_else(|| ClientError::NotFound(format!("attempt {attempt_id}")))
    }

    async fn write_verdict(
        &self,
        attempt_id: AttemptId,
        record: &VerdictRecord,
    ) -> Result<Attempt, ClientError> {
        let mut state = self.state.lock().expect("state");
        let stored = state
            .attempts
            .iter_mut()
            .find(|attempt| attempt.id == attempt_id)
            .ok_or_else(|| ClientError::NotFound(format!("attempt {attempt_id}")))?;
        let reviewed = stored.with_verdict(record).map_err(|err| match err {
            HomeworkError::AlreadyReviewed(id) => ClientError::AlreadyReviewed(id),
            other => ClientError::Server { status: 400, detail: other.to_string() },
        })?;
        *stored = reviewed.clone();
        state.verdict_writes += 1;
        state.last_verdict = Some(record.clone());
        Ok(reviewed)
    }
}

/// Scorer whose upload blocks until [`GatedScorer::release`].
#[derive(Debug, Default)]
pub(crate) struct GatedScorer {
    started: Notify,
    gate: Notify,
    uploads: AtomicUsize,
}

impl GatedScorer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn wait_for_upload(&self) {
        self.started.notified().await;
    }

    pub(crate) fn release(&self) {
        self.gate.notify_one();
    }

    pub(crate) fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringService for GatedScorer {
    async fn upload_submission(
        &self,
        _context: &AttemptContext,
        _recording: &Recording,
    ) -> Result<UploadReceipt, ClientError> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) as AttemptId;
        self.started.notify_one();
        self.gate.notified().await;
        Ok(UploadReceipt {
            attempt_id: 500 + n,
            status: None,
            transcription: None,
            similarity_score: None,
            audio_url: None,
        })
    }
}
