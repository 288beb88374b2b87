use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use super::capture::Recorder;
use crate::clients::{AttemptStore, ScoringService, UploadReceipt};
use crate::core::session::SessionContext;
use crate::core::time::now_utc;
use crate::errors::HomeworkError;
use crate::models::{
    Attempt, AttemptContext, AttemptStatus, HomeworkPolicy, LessonId, Recording, UserId,
};

type Lineage = (LessonId, UserId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

impl SubmissionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Succeeded => "success",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug)]
struct DeskState {
    phase: SubmissionPhase,
    /// Lineage of the most recent submit; the kept recording belongs to it.
    active: Option<Lineage>,
    /// Acknowledged allowance per lineage, kept across lesson switches.
    lineages: HashMap<Lineage, AttemptContext>,
    recording: Option<Arc<Recording>>,
    last_attempt: Option<Attempt>,
    last_error: Option<String>,
}

/// Submission Component for a student's homework uploads.
///
/// Attempt accounting is tracked per `(lesson, student)` lineage, so moving
/// between lessons never resets an allowance already consumed.
/// At most one upload is in flight. A failed upload keeps the recording for
/// [`SubmissionDesk::retry`]; only an acknowledged upload consumes an attempt.
/// The upload runs on its own task, so a caller that stops waiting does not
/// abort the exchange: the outcome is still recorded on the desk.
pub struct SubmissionDesk<S> {
    scorer: Arc<S>,
    policy: HomeworkPolicy,
    state: Arc<Mutex<DeskState>>,
}

impl DeskState {
    fn active_context(&self) -> Option<AttemptContext> {
        self.active.and_then(|lineage| self.lineages.get(&lineage).cloned())
    }
}

impl<S> SubmissionDesk<S>
where
    S: ScoringService + 'static,
{
    pub fn new(scorer: Arc<S>, policy: HomeworkPolicy) -> Self {
        Self {
            scorer,
            policy,
            state: Arc::new(Mutex::new(DeskState {
                phase: SubmissionPhase::Idle,
                active: None,
                lineages: HashMap::new(),
                recording: None,
                last_attempt: None,
                last_error: None,
            })),
        }
    }

    pub fn policy(&self) -> &HomeworkPolicy {
        &self.policy
    }

    pub async fn submit(
        &self,
        context: AttemptContext,
        recording: Recording,
    ) -> Result<Attempt, HomeworkError> {
        let (context, recording) = {
            let mut state = self.state.lock().await;
            if state.phase == SubmissionPhase::Submitting {
                tracing::warn!(lesson_id = context.lesson_id, "Submission already in progress");
                return Err(HomeworkError::SubmissionInProgress);
            }

            let lineage = context.lineage();
            if state.phase == SubmissionPhase::Failed
                && state.recording.is_some()
                && state.active.is_some_and(|active| active != lineage)
            {
                return Err(HomeworkError::invalid_state(
                    "submit",
                    "a failed recording for another lesson is kept for retry",
                ));
            }

            let context = merge_context(state.lineages.get(&lineage), context);
            if !context.has_attempts_left() {
                return Err(HomeworkError::AttemptsExhausted {
                    used: context.attempts_used,
                    max: context.max_attempts,
                });
            }
            self.validate_recording(&recording)?;

            let recording = Arc::new(recording);
            state.phase = SubmissionPhase::Submitting;
            state.active = Some(lineage);
            state.lineages.insert(lineage, context.clone());
            state.recording = Some(Arc::clone(&recording));
            state.last_error = None;
            (context, recording)
        };

        self.run_upload(context, recording).await
    }

    /// Re-sends the preserved recording after a failed upload.
    pub async fn retry(&self) -> Result<Attempt, HomeworkError> {
        let (context, recording) = {
            let mut state = self.state.lock().await;
            match state.phase {
                SubmissionPhase::Failed => {}
                SubmissionPhase::Submitting => return Err(HomeworkError::SubmissionInProgress),
                SubmissionPhase::Idle | SubmissionPhase::Succeeded => {
                    return Err(HomeworkError::invalid_state(
                        "retry",
                        "the last submission did not fail",
                    ))
                }
            }
            let (Some(context), Some(recording)) = (state.active_context(), state.recording.clone())
            else {
                return Err(HomeworkError::invalid_state("retry", "no recording is kept"));
            };
            state.phase = SubmissionPhase::Submitting;
            state.last_error = None;
            (context, recording)
        };

        tracing::info!(lesson_id = context.lesson_id, "Retrying homework submission");
        self.run_upload(context, recording).await
    }

    /// Drops the kept recording and sends the recorder back to idle for a new take.
    pub async fn cancel_and_re_record(&self, recorder: &mut Recorder) -> Result<(), HomeworkError> {
        let mut state = self.state.lock().await;
        match state.phase {
            SubmissionPhase::Failed | SubmissionPhase::Succeeded => {}
            SubmissionPhase::Submitting => return Err(HomeworkError::SubmissionInProgress),
            SubmissionPhase::Idle => {
                return Err(HomeworkError::invalid_state("re-record", "nothing has been submitted"))
            }
        }
        if state.last_attempt.as_ref().is_some_and(|attempt| attempt.status == AttemptStatus::Accepted)
        {
            return Err(HomeworkError::invalid_state("re-record", "the homework was accepted"));
        }
        if let Some(context) = state.active_context() {
            if !context.has_attempts_left() {
                return Err(HomeworkError::AttemptsExhausted {
                    used: context.attempts_used,
                    max: context.max_attempts,
                });
            }
        }

        state.recording = None;
        state.last_error = None;
        state.phase = SubmissionPhase::Idle;
        recorder.reset();
        tracing::info!("Recording discarded for a new take");
        Ok(())
    }

    /// Re-reads the last submitted attempt. A second-chance grant widens the
    /// lineage allowance; an acceptance credits the session's coin balance.
    pub async fn sync_review_outcome<St>(
        &self,
        store: &St,
        session: &SessionContext,
    ) -> Result<Attempt, HomeworkError>
    where
        St: AttemptStore + ?Sized,
    {
        let attempt_id = {
            let state = self.state.lock().await;
            state.last_attempt.as_ref().map(|attempt| attempt.id).ok_or_else(|| {
                HomeworkError::invalid_state("sync the review outcome", "nothing has been submitted")
            })?
        };

        let attempt = store.get_attempt(attempt_id).await?;

        {
            let mut state = self.state.lock().await;
            if attempt.status == AttemptStatus::SecondChanceGranted {
                let lineage = (attempt.lesson_id, attempt.student_id);
                if let Some(context) = state.lineages.get_mut(&lineage) {
                    context.max_attempts = context.max_attempts.max(attempt.max_attempts);
                    tracing::info!(
                        attempt_id,
                        max_attempts = context.max_attempts,
                        "Second chance granted"
                    );
                }
            }
            state.last_attempt = Some(attempt.clone());
        }

        if attempt.status == AttemptStatus::Accepted {
            session.credit_reward(&attempt).await;
        }

        Ok(attempt)
    }

    pub async fn phase(&self) -> SubmissionPhase {
        self.state.lock().await.phase
    }

    pub async fn context(&self) -> Option<AttemptContext> {
        self.state.lock().await.active_context()
    }

    /// Allowance the desk has acknowledged for one lesson, if it was ever submitted to.
    pub async fn lineage_context(
        &self,
        lesson_id: LessonId,
        student_id: UserId,
    ) -> Option<AttemptContext> {
        self.state.lock().await.lineages.get(&(lesson_id, student_id)).cloned()
    }

    pub async fn attempts_remaining(&self) -> Option<u32> {
        self.state.lock().await.active_context().as_ref().map(AttemptContext::attempts_remaining)
    }

    pub async fn last_attempt(&self) -> Option<Attempt> {
        self.state.lock().await.last_attempt.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.lock().await.last_error.clone()
    }

    /// The recording kept for a retry, if any.
    pub async fn kept_recording(&self) -> Option<Arc<Recording>> {
        self.state.lock().await.recording.clone()
    }

    fn validate_recording(&self, recording: &Recording) -> Result<(), HomeworkError> {
        if recording.size_bytes() == 0 {
            return Err(HomeworkError::InvalidRecording("the recording is empty".to_string()));
        }
        if recording.size_bytes() > self.policy.max_audio_bytes {
            return Err(HomeworkError::InvalidRecording(format!(
                "{} bytes exceeds the {} byte limit",
                recording.size_bytes(),
                self.policy.max_audio_bytes
            )));
        }
        if !self.policy.accepts_format(recording.format()) {
            return Err(HomeworkError::InvalidRecording(format!(
                "format {} is not supported",
                recording.format()
            )));
        }
        Ok(())
    }

    async fn run_upload(
        &self,
        context: AttemptContext,
        recording: Arc<Recording>,
    ) -> Result<Attempt, HomeworkError> {
        let scorer = Arc::clone(&self.scorer);
        let state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let result = scorer.upload_submission(&context, &recording).await;
            metrics::histogram!("homework_upload_seconds").record(started.elapsed().as_secs_f64());

            let mut state = state.lock().await;
            match result {
                Ok(receipt) => {
                    let attempt = attempt_from_receipt(&context, receipt);
                    let mut acknowledged = context;
                    acknowledged.attempts_used = acknowledged.attempts_used.saturating_add(1);

                    state.phase = SubmissionPhase::Succeeded;
                    state.lineages.insert(acknowledged.lineage(), acknowledged);
                    state.recording = None;
                    state.last_attempt = Some(attempt.clone());

                    metrics::counter!("homework_submissions_total", "outcome" => "success")
                        .increment(1);
                    tracing::info!(
                        attempt_id = attempt.id,
                        lesson_id = attempt.lesson_id,
                        attempt_number = attempt.attempt_number,
                        status = attempt.status.as_str(),
                        is_late = attempt.is_late,
                        "Homework submitted"
                    );
                    Ok(attempt)
                }
                Err(err) => {
                    let err = HomeworkError::from(err);
                    state.phase = SubmissionPhase::Failed;
                    state.last_error = Some(err.to_string());

                    metrics::counter!("homework_submissions_total", "outcome" => "failed")
                        .increment(1);
                    tracing::warn!(
                        lesson_id = context.lesson_id,
                        error = %err,
                        retryable = err.is_retryable(),
                        "Homework submission failed"
                    );
                    Err(err)
                }
            }
        });

        match task.await {
            Ok(result) => result,
            Err(join_err) => {
                let mut state = self.state.lock().await;
                state.phase = SubmissionPhase::Failed;
                state.last_error = Some(join_err.to_string());
                tracing::error!(error = %join_err, "Upload task ended abnormally");
                Err(HomeworkError::NetworkFailure(format!("upload task ended: {join_err}")))
            }
        }
    }
}

fn merge_context(known: Option<&AttemptContext>, incoming: AttemptContext) -> AttemptContext {
    match known {
        Some(known) if known.same_lineage(&incoming) => AttemptContext {
            attempts_used: known.attempts_used.max(incoming.attempts_used),
            max_attempts: known.max_attempts.max(incoming.max_attempts),
            deadline: incoming.deadline.or(known.deadline),
            ..incoming
        },
        _ => incoming,
    }
}

fn attempt_from_receipt(context: &AttemptContext, receipt: UploadReceipt) -> Attempt {
    let submitted_at = now_utc();
    let status = receipt
        .status
        .filter(|status| status.is_pending_review())
        .unwrap_or(AttemptStatus::Submitted);

    Attempt {
        id: receipt.attempt_id,
        lesson_id: context.lesson_id,
        student_id: context.student_id,
        student_name: None,
        lesson_title: None,
        attempt_number: context.next_attempt_number(),
        max_attempts: context.max_attempts,
        audio_url: receipt.audio_url,
        transcription: receipt.transcription,
        similarity_score: receipt.similarity_score,
        status,
        feedback: None,
        coins_awarded: 0,
        is_late: context.is_late_at(submitted_at),
        created_at: submitted_at,
        reviewed_at: None,
        reviewer_id: None,
    }
}
