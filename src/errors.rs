use thiserror::Error;

use crate::clients::ClientError;
use crate::models::AttemptId;

#[derive(Debug, Error)]
pub enum HomeworkError {
    #[error("microphone access was denied")]
    PermissionDenied,
    #[error("no audio input device is available: {0}")]
    DeviceUnavailable(String),
    #[error("cannot {operation} while {state}")]
    InvalidState { operation: &'static str, state: &'static str },
    #[error("all {max} attempts have been used")]
    AttemptsExhausted { used: u32, max: u32 },
    #[error("a submission is already in progress")]
    SubmissionInProgress,
    #[error("attempt {0} has already been reviewed")]
    AlreadyReviewed(AttemptId),
    #[error("{0} not found")]
    NotFound(String),
    #[error("recording rejected: {0}")]
    InvalidRecording(String),
    #[error("invalid verdict: {0}")]
    InvalidVerdict(String),
    #[error("no active session")]
    Unauthenticated,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("server error ({status}): {detail}")]
    ServerError { status: u16, detail: String },
}

impl HomeworkError {
    /// Upstream failures the user may retry without losing the recording.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure(_) | Self::ServerError { .. })
    }

    pub(crate) fn invalid_state(operation: &'static str, state: &'static str) -> Self {
        Self::InvalidState { operation, state }
    }
}

impl From<ClientError> for HomeworkError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Network(message) => Self::NetworkFailure(message),
            ClientError::Server { status, detail } => Self::ServerError { status, detail },
            ClientError::Decode(message) => Self::ServerError { status: 200, detail: message },
            ClientError::NotFound(what) => Self::NotFound(what),
            ClientError::AlreadyReviewed(attempt_id) => Self::AlreadyReviewed(attempt_id),
            ClientError::Unauthorized => Self::Unauthenticated,
        }
    }
}
