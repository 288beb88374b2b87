use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};
use validator::Validate;

use super::reward::compute_reward;
use crate::clients::{AttemptFilter, AttemptStore, PageCursor};
use crate::core::session::{CurrentUser, SessionContext};
use crate::core::time::now_utc;
use crate::errors::HomeworkError;
use crate::models::{Attempt, AttemptId, AttemptStatus, HomeworkPolicy, ReviewVerdict};

enum Paging {
    Start,
    Next(PageCursor),
    Done,
}

/// The reviewer's queue of submitted attempts and the verdicts written on them.
pub struct ReviewDesk<S> {
    store: Arc<S>,
    policy: HomeworkPolicy,
}

impl<S> ReviewDesk<S>
where
    S: AttemptStore + 'static,
{
    pub fn new(store: Arc<S>, policy: HomeworkPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &HomeworkPolicy {
        &self.policy
    }

    /// Lazily pages through attempts awaiting review. Nothing is fetched until the
    /// stream is polled, and each call starts a fresh listing.
    pub fn list_pending(
        &self,
        filter: AttemptFilter,
    ) -> impl Stream<Item = Result<Attempt, HomeworkError>> + Send + 'static {
        let store = Arc::clone(&self.store);
        let filter = Arc::new(pending_only(filter));

        stream::try_unfold(Paging::Start, move |paging| {
            let store = Arc::clone(&store);
            let filter = Arc::clone(&filter);
            async move {
                let cursor = match paging {
                    Paging::Start => None,
                    Paging::Next(cursor) => Some(cursor),
                    Paging::Done => return Ok(None),
                };

                let page = store
                    .list_attempts(&filter, cursor.as_ref())
                    .await
                    .map_err(HomeworkError::from)?;
                tracing::debug!(
                    fetched = page.attempts.len(),
                    has_next = page.next.is_some(),
                    "Fetched review page"
                );

                let next = page.next.map_or(Paging::Done, Paging::Next);
                let matching: Vec<Result<Attempt, HomeworkError>> = page
                    .attempts
                    .into_iter()
                    .filter(|attempt| filter.matches(attempt))
                    .map(Ok)
                    .collect();
                Ok::<_, HomeworkError>(Some((stream::iter(matching), next)))
            }
        })
        .try_flatten()
    }

    pub async fn apply_verdict(
        &self,
        session: &SessionContext,
        attempt_id: AttemptId,
        verdict: ReviewVerdict,
    ) -> Result<Attempt, HomeworkError> {
        let reviewer = session.require_reviewer().await?;
        let attempt = self.store.get_attempt(attempt_id).await?;
        self.write(&reviewer, &attempt, verdict).await
    }

    /// Accepts, deciding `score_threshold_met` from the stored similarity score.
    pub async fn accept(
        &self,
        session: &SessionContext,
        attempt_id: AttemptId,
    ) -> Result<Attempt, HomeworkError> {
        let reviewer = session.require_reviewer().await?;
        let attempt = self.store.get_attempt(attempt_id).await?;
        let verdict = ReviewVerdict::Accept {
            score_threshold_met: attempt.meets_threshold(self.policy.passing_score_threshold),
        };
        self.write(&reviewer, &attempt, verdict).await
    }

    pub async fn reject(
        &self,
        session: &SessionContext,
        attempt_id: AttemptId,
        feedback: impl Into<String>,
    ) -> Result<Attempt, HomeworkError> {
        self.apply_verdict(session, attempt_id, ReviewVerdict::Reject { feedback: feedback.into() })
            .await
    }

    /// Grants the configured default number of extra attempts.
    pub async fn second_chance(
        &self,
        session: &SessionContext,
        attempt_id: AttemptId,
        feedback: impl Into<String>,
    ) -> Result<Attempt, HomeworkError> {
        let verdict = ReviewVerdict::SecondChance {
            feedback: feedback.into(),
            additional_attempts: self.policy.second_chance_attempts,
        };
        self.apply_verdict(session, attempt_id, verdict).await
    }

    async fn write(
        &self,
        reviewer: &CurrentUser,
        attempt: &Attempt,
        verdict: ReviewVerdict,
    ) -> Result<Attempt, HomeworkError> {
        if attempt.status.is_reviewed() {
            tracing::warn!(
                attempt_id = attempt.id,
                status = attempt.status.as_str(),
                "Attempt already reviewed"
            );
            return Err(HomeworkError::AlreadyReviewed(attempt.id));
        }
        if attempt.status == AttemptStatus::Assigned {
            return Err(HomeworkError::invalid_state("review", "nothing has been submitted"));
        }

        let kind = verdict.kind();
        let coins = compute_reward(&verdict, &self.policy.reward_config());
        let record = verdict.into_record(coins, reviewer.id, now_utc());
        record.validate().map_err(|err| HomeworkError::InvalidVerdict(err.to_string()))?;

        // Checks the transition locally before anything is written.
        attempt.with_verdict(&record)?;

        let updated = self.store.write_verdict(attempt.id, &record).await?;

        metrics::counter!("homework_verdicts_total", "verdict" => kind).increment(1);
        tracing::info!(
            attempt_id = updated.id,
            reviewer_id = reviewer.id,
            verdict = kind,
            status = updated.status.as_str(),
            coins_awarded = updated.coins_awarded,
            "Verdict applied"
        );
        Ok(updated)
    }
}

fn pending_only(mut filter: AttemptFilter) -> AttemptFilter {
    if filter.statuses.is_empty() {
        filter.statuses = AttemptFilter::pending().statuses;
    } else {
        filter.statuses.retain(|status| status.is_pending_review());
    }
    filter
}
