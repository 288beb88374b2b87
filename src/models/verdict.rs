use time::OffsetDateTime;
use validator::Validate;

use super::types::AttemptStatus;
use super::UserId;

pub const MAX_FEEDBACK_LEN: u64 = 1000;

/// A teacher's decision on one submitted attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewVerdict {
    Accept { score_threshold_met: bool },
    Reject { feedback: String },
    SecondChance { feedback: String, additional_attempts: u32 },
}

impl ReviewVerdict {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Accept { .. } => "accept",
            Self::Reject { .. } => "reject",
            Self::SecondChance { .. } => "second_chance",
        }
    }

    pub fn resulting_status(&self) -> AttemptStatus {
        match self {
            Self::Accept { .. } => AttemptStatus::Accepted,
            Self::Reject { .. } => AttemptStatus::Rejected,
            Self::SecondChance { .. } => AttemptStatus::SecondChanceGranted,
        }
    }

    pub fn feedback(&self) -> Option<&str> {
        match self {
            Self::Accept { .. } => None,
            Self::Reject { feedback } | Self::SecondChance { feedback, .. } => {
                Some(feedback.trim()).filter(|text| !text.is_empty())
            }
        }
    }

    pub fn additional_attempts(&self) -> Option<u32> {
        match self {
            Self::SecondChance { additional_attempts, .. } => Some(*additional_attempts),
            _ => None,
        }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }

    pub(crate) fn into_record(
        self,
        coins_awarded: u32,
        reviewer_id: UserId,
        reviewed_at: OffsetDateTime,
    ) -> VerdictRecord {
        VerdictRecord {
            status: self.resulting_status(),
            feedback: self.feedback().map(str::to_string),
            additional_attempts: self.additional_attempts(),
            coins_awarded,
            reviewer_id,
            reviewed_at,
        }
    }
}

/// What gets written to the persistence service for one verdict.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct VerdictRecord {
    pub status: AttemptStatus,
    #[validate(length(max = MAX_FEEDBACK_LEN))]
    pub feedback: Option<String>,
    #[validate(range(min = 1, max = 10))]
    pub additional_attempts: Option<u32>,
    pub coins_awarded: u32,
    pub reviewer_id: UserId,
    pub reviewed_at: OffsetDateTime,
}
