use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::errors::HomeworkError;
use crate::models::{Attempt, AttemptId, AttemptStatus, UserId, UserRole};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub full_name: String,
    pub role: UserRole,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user: CurrentUser,
    pub access_token: String,
    pub coin_balance: u32,
    credited_attempts: HashSet<AttemptId>,
}

impl Session {
    pub fn new(user: CurrentUser, access_token: impl Into<String>, coin_balance: u32) -> Self {
        Self {
            user,
            access_token: access_token.into(),
            coin_balance,
            credited_attempts: HashSet::new(),
        }
    }
}

/// Handle to the signed-in user, passed explicitly to whatever needs it.
/// Empty until [`SessionContext::begin`], empty again after [`SessionContext::end`].
#[derive(Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin(&self, session: Session) {
        tracing::info!(user_id = session.user.id, role = ?session.user.role, "Session started");
        let mut guard = self.inner.write().await;
        *guard = Some(session);
    }

    pub async fn end(&self) {
        let mut guard = self.inner.write().await;
        if let Some(session) = guard.take() {
            tracing::info!(user_id = session.user.id, "Session ended");
        }
    }

    pub async fn current_user(&self) -> Option<CurrentUser> {
        self.inner.read().await.as_ref().map(|session| session.user.clone())
    }

    pub async fn access_token(&self) -> Option<String> {
        self.inner.read().await.as_ref().map(|session| session.access_token.clone())
    }

    pub async fn coin_balance(&self) -> Option<u32> {
        self.inner.read().await.as_ref().map(|session| session.coin_balance)
    }

    pub async fn require_reviewer(&self) -> Result<CurrentUser, HomeworkError> {
        let user = self.current_user().await.ok_or(HomeworkError::Unauthenticated)?;
        if !user.role.can_review() {
            return Err(HomeworkError::Forbidden("only teachers and admins review homework"));
        }
        Ok(user)
    }

    /// Adds an accepted attempt's coins to the signed-in student's balance, once per attempt.
    /// Returns the coins credited by this call.
    pub async fn credit_reward(&self, attempt: &Attempt) -> u32 {
        if attempt.status != AttemptStatus::Accepted || attempt.coins_awarded == 0 {
            return 0;
        }

        let mut guard = self.inner.write().await;
        let Some(session) = guard.as_mut() else {
            return 0;
        };
        if session.user.id != attempt.student_id || !session.credited_attempts.insert(attempt.id) {
            return 0;
        }

        session.coin_balance = session.coin_balance.saturating_add(attempt.coins_awarded);
        tracing::info!(
            user_id = session.user.id,
            attempt_id = attempt.id,
            coins = attempt.coins_awarded,
            balance = session.coin_balance,
            "Homework reward credited"
        );
        attempt.coins_awarded
    }
}
