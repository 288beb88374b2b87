use serde::{Deserialize, Serialize};

/// Lifecycle of one homework attempt as the backend reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Homework assigned, nothing uploaded yet.
    Assigned,
    Submitted,
    #[serde(rename = "under_review", alias = "pending_review")]
    PendingReview,
    #[serde(rename = "approved", alias = "accepted")]
    Accepted,
    Rejected,
    #[serde(rename = "second_chance", alias = "second_chance_granted")]
    SecondChanceGranted,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Submitted => "submitted",
            Self::PendingReview => "pending_review",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::SecondChanceGranted => "second_chance_granted",
        }
    }

    /// Name used by the REST backend.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Submitted => "submitted",
            Self::PendingReview => "under_review",
            Self::Accepted => "approved",
            Self::Rejected => "rejected",
            Self::SecondChanceGranted => "second_chance",
        }
    }

    pub fn is_pending_review(self) -> bool {
        matches!(self, Self::Submitted | Self::PendingReview)
    }

    pub fn is_reviewed(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::SecondChanceGranted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Teacher,
    Student,
}

impl UserRole {
    pub fn can_review(self) -> bool {
        matches!(self, Self::Admin | Self::Teacher)
    }
}
