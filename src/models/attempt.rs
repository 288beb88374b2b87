use time::OffsetDateTime;

use super::types::AttemptStatus;
use super::verdict::VerdictRecord;
use super::{AttemptId, LessonId, UserId};
use crate::errors::HomeworkError;

/// One student's recorded try at one lesson's homework. Retained as an audit record.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub id: AttemptId,
    pub lesson_id: LessonId,
    pub student_id: UserId,
    pub student_name: Option<String>,
    pub lesson_title: Option<String>,
    pub attempt_number: u32,
    pub max_attempts: u32,
    pub audio_url: Option<String>,
    pub transcription: Option<String>,
    /// 0-100, set once by the scoring service.
    pub similarity_score: Option<u8>,
    pub status: AttemptStatus,
    pub feedback: Option<String>,
    pub coins_awarded: u32,
    pub is_late: bool,
    pub created_at: OffsetDateTime,
    pub reviewed_at: Option<OffsetDateTime>,
    pub reviewer_id: Option<UserId>,
}

impl Attempt {
    pub fn is_reviewable(&self) -> bool {
        self.status.is_pending_review()
    }

    pub fn meets_threshold(&self, passing_score_threshold: u8) -> bool {
        self.similarity_score.is_some_and(|score| score >= passing_score_threshold)
    }

    /// Applies a verdict, returning the reviewed record. The receiver is never mutated.
    pub fn with_verdict(&self, record: &VerdictRecord) -> Result<Attempt, HomeworkError> {
        if self.status.is_reviewed() {
            return Err(HomeworkError::AlreadyReviewed(self.id));
        }
        if !self.status.is_pending_review() {
            return Err(HomeworkError::invalid_state(
                "apply a verdict",
                "nothing has been submitted",
            ));
        }

        let mut reviewed = self.clone();
        reviewed.status = record.status;
        reviewed.feedback = record.feedback.clone();
        reviewed.reviewed_at = Some(record.reviewed_at);
        reviewed.reviewer_id = Some(record.reviewer_id);

        match record.status {
            AttemptStatus::Accepted => {
                reviewed.coins_awarded = record.coins_awarded;
            }
            AttemptStatus::Rejected => {
                reviewed.coins_awarded = 0;
            }
            AttemptStatus::SecondChanceGranted => {
                let grant = record.additional_attempts.ok_or_else(|| {
                    HomeworkError::InvalidVerdict(
                        "second chance requires additional attempts".to_string(),
                    )
                })?;
                reviewed.coins_awarded = 0;
                reviewed.max_attempts = reviewed.max_attempts.saturating_add(grant);
            }
            AttemptStatus::Assigned | AttemptStatus::Submitted | AttemptStatus::PendingReview => {
                return Err(HomeworkError::InvalidVerdict(format!(
                    "{} is not a review outcome",
                    record.status.as_str()
                )));
            }
        }

        Ok(reviewed)
    }
}

/// Where a (lesson, student) lineage stands before the next upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptContext {
    pub lesson_id: LessonId,
    pub student_id: UserId,
    pub attempts_used: u32,
    pub max_attempts: u32,
    pub deadline: Option<OffsetDateTime>,
}

impl AttemptContext {
    pub fn new(lesson_id: LessonId, student_id: UserId, max_attempts: u32) -> Self {
        Self { lesson_id, student_id, attempts_used: 0, max_attempts, deadline: None }
    }

    pub fn with_deadline(mut self, deadline: OffsetDateTime) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Rebuilds the context from the attempts already on record for this lesson and student.
    pub fn from_lineage(
        lesson_id: LessonId,
        student_id: UserId,
        attempts: &[Attempt],
        default_max_attempts: u32,
    ) -> Self {
        let lineage = attempts.iter().filter(|attempt| {
            attempt.lesson_id == lesson_id
                && attempt.student_id == student_id
                && attempt.status != AttemptStatus::Assigned
        });

        let mut attempts_used = 0;
        let mut max_attempts = default_max_attempts;
        for attempt in lineage {
            attempts_used = attempts_used.max(attempt.attempt_number);
            max_attempts = max_attempts.max(attempt.max_attempts);
        }

        Self { lesson_id, student_id, attempts_used, max_attempts, deadline: None }
    }

    pub fn next_attempt_number(&self) -> u32 {
        self.attempts_used + 1
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts_used)
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts_used < self.max_attempts
    }

    pub fn is_late_at(&self, at: OffsetDateTime) -> bool {
        self.deadline.is_some_and(|deadline| at > deadline)
    }

    /// `(lesson, student)` pair the attempt allowance belongs to.
    pub fn lineage(&self) -> (LessonId, UserId) {
        (self.lesson_id, self.student_id)
    }

    pub(crate) fn same_lineage(&self, other: &AttemptContext) -> bool {
        self.lineage() == other.lineage()
    }
}
