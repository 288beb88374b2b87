use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{
    AttemptFilter, AttemptPage, AttemptStore, ClientError, PageCursor, PolicySource,
    ScoringService, UploadReceipt,
};
use crate::core::config::{ApiSettings, Settings};
use crate::core::session::SessionContext;
use crate::models::{Attempt, AttemptContext, AttemptId, HomeworkPolicy, Recording, VerdictRecord};
use crate::schemas::homework::{
    HomeworkListPayload, HomeworkPayload, ReviewRequest, SystemSettingsPayload,
};

/// REST client for the learning platform backend. One instance serves uploads,
/// listings, verdicts and settings; the bearer token comes from the session.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    api: ApiSettings,
    session: SessionContext,
    defaults: HomeworkPolicy,
}

impl BackendClient {
    pub fn from_settings(settings: &Settings, session: SessionContext) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.api().connect_timeout_seconds))
            .timeout(Duration::from_secs(settings.api().request_timeout_seconds))
            .build()
            .context("Failed to build backend HTTP client")?;

        Ok(Self {
            client,
            api: settings.api().clone(),
            session,
            defaults: HomeworkPolicy::from_settings(settings),
        })
    }

    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = match self.session.access_token().await {
            Some(token) => Some(token),
            None => self.api.access_token.clone(),
        };
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        self.authorized(request)
            .await
            .send()
            .await
            .map_err(|err| ClientError::Network(err.to_string()))
    }

    fn list_url(&self, filter: &AttemptFilter) -> String {
        let mut params = Vec::new();
        if let Some(lesson_id) = filter.lesson_id {
            params.push(format!("lesson={lesson_id}"));
        }
        if let Some(student_id) = filter.student_id {
            params.push(format!("student={student_id}"));
        }
        if let Some(group_id) = filter.group_id {
            params.push(format!("group={group_id}"));
        }
        if let [status] = filter.statuses.as_slice() {
            params.push(format!("status={}", status.wire_name()));
        }

        let base = self.api.endpoint("homework/");
        if params.is_empty() {
            base
        } else {
            format!("{}?{}", base, params.join("&"))
        }
    }
}

#[async_trait]
impl ScoringService for BackendClient {
    async fn upload_submission(
        &self,
        context: &AttemptContext,
        recording: &Recording,
    ) -> Result<UploadReceipt, ClientError> {
        let audio = Part::bytes(recording.payload().to_vec())
            .file_name(recording.file_name())
            .mime_str(recording.mime_type())
            .map_err(|err| ClientError::Decode(format!("invalid audio mime type: {err}")))?;

        let form = Form::new()
            .part("audio_submission", audio)
            .text("lesson", context.lesson_id.to_string())
            .text("attempt_number", context.next_attempt_number().to_string())
            .text("duration_seconds", recording.duration_seconds().to_string())
            .text("audio_sha256", recording.sha256().to_string());

        tracing::debug!(
            lesson_id = context.lesson_id,
            attempt_number = context.next_attempt_number(),
            size_bytes = recording.size_bytes(),
            "Uploading homework recording"
        );

        let endpoint = self.api.endpoint("homework/");
        let response = self.send(self.client.post(&endpoint).multipart(form)).await?;
        let payload: HomeworkPayload = read_json(response, || "lesson".to_string()).await?;
        let attempt = payload.into_attempt(context.max_attempts);

        Ok(UploadReceipt {
            attempt_id: attempt.id,
            status: Some(attempt.status),
            transcription: attempt.transcription,
            similarity_score: attempt.similarity_score,
            audio_url: attempt.audio_url,
        })
    }
}

#[async_trait]
impl AttemptStore for BackendClient {
    async fn list_attempts(
        &self,
        filter: &AttemptFilter,
        cursor: Option<&PageCursor>,
    ) -> Result<AttemptPage, ClientError> {
        let url = match cursor {
            Some(PageCursor(next)) => next.clone(),
            None => self.list_url(filter),
        };

        let response = self.send(self.client.get(&url)).await?;
        let listing: HomeworkListPayload = read_json(response, || "homework list".to_string()).await?;
        let (rows, next) = listing.into_parts();

        Ok(AttemptPage {
            attempts: rows
                .into_iter()
                .map(|row| row.into_attempt(self.defaults.default_max_attempts))
                .collect(),
            next: next.map(PageCursor),
        })
    }

    async fn get_attempt(&self, attempt_id: AttemptId) -> Result<Attempt, ClientError> {
        let endpoint = self.api.endpoint(&format!("homework/{attempt_id}/"));
        let response = self.send(self.client.get(&endpoint)).await?;
        let payload: HomeworkPayload =
            read_json(response, || format!("attempt {attempt_id}")).await?;
        Ok(payload.into_attempt(self.defaults.default_max_attempts))
    }

    async fn write_verdict(
        &self,
        attempt_id: AttemptId,
        record: &VerdictRecord,
    ) -> Result<Attempt, ClientError> {
        let endpoint = self.api.endpoint(&format!("homework/{attempt_id}/review/"));
        let body = ReviewRequest::from_record(attempt_id, record);
        let response = self.send(self.client.post(&endpoint).json(&body)).await?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Err(ClientError::AlreadyReviewed(attempt_id));
        }
        if status == StatusCode::BAD_REQUEST {
            let raw_body = response.text().await.unwrap_or_default();
            let parsed = serde_json::from_str::<Value>(&raw_body).unwrap_or(Value::Null);
            let message = extract_error_message(&parsed);
            if message.to_ascii_lowercase().contains("already") {
                return Err(ClientError::AlreadyReviewed(attempt_id));
            }
            return Err(ClientError::Server { status: status.as_u16(), detail: message });
        }

        let payload: HomeworkPayload =
            read_json(response, || format!("attempt {attempt_id}")).await?;
        Ok(payload.into_attempt(self.defaults.default_max_attempts))
    }
}

#[async_trait]
impl PolicySource for BackendClient {
    async fn homework_policy(&self) -> Result<HomeworkPolicy, ClientError> {
        let endpoint = self.api.endpoint("settings/");
        let response = self.send(self.client.get(&endpoint)).await?;
        let payload: SystemSettingsPayload =
            read_json(response, || "system settings".to_string()).await?;
        Ok(payload.apply_to(self.defaults.clone()))
    }
}

async fn read_json<T: DeserializeOwned>(
    response: Response,
    subject: impl FnOnce() -> String,
) -> Result<T, ClientError> {
    let status = response.status();
    let raw_body = response
        .text()
        .await
        .map_err(|err| ClientError::Network(format!("failed to read response body: {err}")))?;

    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(subject()));
    }
    if !status.is_success() {
        let parsed = serde_json::from_str::<Value>(&raw_body).unwrap_or(Value::Null);
        return Err(ClientError::Server {
            status: status.as_u16(),
            detail: extract_error_message(&parsed),
        });
    }

    serde_json::from_str(&raw_body).map_err(|err| {
        ClientError::Decode(format!("{} (status {}): {}", subject(), status, err))
    })
}

fn extract_error_message(payload: &Value) -> String {
    if let Some(detail) = payload.get("detail") {
        if let Some(text) = detail.as_str() {
            return text.to_string();
        }
    }

    if let Some(text) = payload
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| payload.get("error").and_then(Value::as_str))
    {
        return text.to_string();
    }

    // DRF field errors: {"status": ["..."], "non_field_errors": ["..."]}
    if let Some(fields) = payload.as_object() {
        let joined = fields
            .values()
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("; ");
        if !joined.is_empty() {
            return joined;
        }
    }

    "unknown_error".to_string()
}
