//! Collaborators the homework core talks to: scoring/storage, persistence and
//! configuration. `http` is the REST implementation; tests use in-memory fakes.

pub mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    Attempt, AttemptContext, AttemptId, AttemptStatus, HomeworkPolicy, LessonId, Recording,
    UserId, VerdictRecord,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Network(String),
    #[error("status {status}: {detail}")]
    Server { status: u16, detail: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("attempt {0} has already been reviewed")]
    AlreadyReviewed(AttemptId),
    #[error("not authenticated")]
    Unauthorized,
}

/// What the scoring service hands back for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub attempt_id: AttemptId,
    pub status: Option<AttemptStatus>,
    pub transcription: Option<String>,
    pub similarity_score: Option<u8>,
    pub audio_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptFilter {
    pub lesson_id: Option<LessonId>,
    pub group_id: Option<i64>,
    pub student_id: Option<UserId>,
    pub statuses: Vec<AttemptStatus>,
    /// Case-insensitive substring of the student's name.
    pub student_name: Option<String>,
}

impl AttemptFilter {
    pub fn pending() -> Self {
        Self {
            statuses: vec![AttemptStatus::Submitted, AttemptStatus::PendingReview],
            ..Self::default()
        }
    }

    pub fn lineage(lesson_id: LessonId, student_id: UserId) -> Self {
        Self { lesson_id: Some(lesson_id), student_id: Some(student_id), ..Self::default() }
    }

    pub fn matches(&self, attempt: &Attempt) -> bool {
        if self.lesson_id.is_some_and(|lesson| lesson != attempt.lesson_id) {
            return false;
        }
        if self.student_id.is_some_and(|student| student != attempt.student_id) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&attempt.status) {
            return false;
        }
        if let Some(needle) = self.student_name.as_deref().map(str::trim).filter(|v| !v.is_empty())
        {
            let name = attempt.student_name.as_deref().unwrap_or_default().to_lowercase();
            if !name.contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Opaque continuation token for paged listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor(pub String);

#[derive(Debug, Clone, Default)]
pub struct AttemptPage {
    pub attempts: Vec<Attempt>,
    pub next: Option<PageCursor>,
}

#[async_trait]
pub trait ScoringService: Send + Sync {
    async fn upload_submission(
        &self,
        context: &AttemptContext,
        recording: &Recording,
    ) -> Result<UploadReceipt, ClientError>;
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn list_attempts(
        &self,
        filter: &AttemptFilter,
        cursor: Option<&PageCursor>,
    ) -> Result<AttemptPage, ClientError>;

    async fn get_attempt(&self, attempt_id: AttemptId) -> Result<Attempt, ClientError>;

    async fn write_verdict(
        &self,
        attempt_id: AttemptId,
        record: &VerdictRecord,
    ) -> Result<Attempt, ClientError>;
}

#[async_trait]
pub trait PolicySource: Send + Sync {
    async fn homework_policy(&self) -> Result<HomeworkPolicy, ClientError>;
}
