use serde::{Deserialize, Serialize};

use crate::core::time::{now_utc, parse_offset};
use crate::models::{Attempt, AttemptId, AttemptStatus, HomeworkPolicy, VerdictRecord};

#[derive(Debug, Deserialize)]
pub(crate) struct TranscriptPayload {
    #[serde(default)]
    pub(crate) raw_text: Option<String>,
    #[serde(default)]
    pub(crate) cleaned_text: Option<String>,
}

/// One homework row as the backend serializes it (detail and list shapes).
#[derive(Debug, Deserialize)]
pub(crate) struct HomeworkPayload {
    pub(crate) id: AttemptId,
    pub(crate) lesson: i64,
    #[serde(default)]
    pub(crate) lesson_title: Option<String>,
    pub(crate) student: i64,
    #[serde(default)]
    pub(crate) student_name: Option<String>,
    pub(crate) status: AttemptStatus,
    #[serde(default)]
    pub(crate) audio_submission: Option<String>,
    #[serde(default)]
    pub(crate) submission_date: Option<String>,
    #[serde(default = "first_attempt")]
    pub(crate) attempt_number: u32,
    #[serde(default)]
    pub(crate) max_attempts: Option<u32>,
    #[serde(default)]
    pub(crate) similarity_score: Option<f64>,
    #[serde(default)]
    pub(crate) transcription: Option<String>,
    #[serde(default)]
    pub(crate) transcript: Option<TranscriptPayload>,
    #[serde(default)]
    pub(crate) teacher_feedback: Option<String>,
    #[serde(default)]
    pub(crate) reviewed_by: Option<i64>,
    #[serde(default)]
    pub(crate) reviewed_date: Option<String>,
    #[serde(default)]
    pub(crate) is_late: bool,
    #[serde(default)]
    pub(crate) coins_earned: u32,
    #[serde(default)]
    pub(crate) created_at: Option<String>,
}

fn first_attempt() -> u32 {
    1
}

impl HomeworkPayload {
    pub(crate) fn into_attempt(self, default_max_attempts: u32) -> Attempt {
        let transcription = non_blank(self.transcription).or_else(|| {
            self.transcript.and_then(|transcript| {
                non_blank(transcript.cleaned_text).or_else(|| non_blank(transcript.raw_text))
            })
        });

        // List rows omit created_at; fall back to the upload time, then to now.
        let created_at = self
            .created_at
            .as_deref()
            .and_then(parse_offset)
            .or_else(|| self.submission_date.as_deref().and_then(parse_offset))
            .unwrap_or_else(now_utc);

        let coins_awarded =
            if self.status == AttemptStatus::Accepted { self.coins_earned } else { 0 };

        Attempt {
            id: self.id,
            lesson_id: self.lesson,
            student_id: self.student,
            student_name: non_blank(self.student_name),
            lesson_title: non_blank(self.lesson_title),
            attempt_number: self.attempt_number.max(1),
            max_attempts: self.max_attempts.unwrap_or(default_max_attempts),
            audio_url: non_blank(self.audio_submission),
            transcription,
            similarity_score: self.similarity_score.map(similarity_percent),
            status: self.status,
            feedback: non_blank(self.teacher_feedback),
            coins_awarded,
            is_late: self.is_late,
            created_at,
            reviewed_at: self.reviewed_date.as_deref().and_then(parse_offset),
            reviewer_id: self.reviewed_by,
        }
    }
}

/// Paged (`{"next": .., "results": [..]}`) or bare array listing.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum HomeworkListPayload {
    Paged {
        #[serde(default)]
        next: Option<String>,
        results: Vec<HomeworkPayload>,
    },
    Plain(Vec<HomeworkPayload>),
}

impl HomeworkListPayload {
    pub(crate) fn into_parts(self) -> (Vec<HomeworkPayload>, Option<String>) {
        match self {
            Self::Paged { next, results } => (results, next.filter(|url| !url.is_empty())),
            Self::Plain(results) => (results, None),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ReviewRequest<'a> {
    pub(crate) homework_id: AttemptId,
    pub(crate) status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) feedback: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) additional_attempts: Option<u32>,
    pub(crate) coins_earned: u32,
    pub(crate) reviewed_by: i64,
    pub(crate) reviewed_date: String,
}

impl<'a> ReviewRequest<'a> {
    pub(crate) fn from_record(attempt_id: AttemptId, record: &'a VerdictRecord) -> Self {
        Self {
            homework_id: attempt_id,
            status: record.status.wire_name(),
            feedback: record.feedback.as_deref(),
            additional_attempts: record.additional_attempts,
            coins_earned: record.coins_awarded,
            reviewed_by: record.reviewer_id,
            reviewed_date: crate::core::time::format_offset(record.reviewed_at),
        }
    }
}

/// Subset of the backend's system settings that shapes homework.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct SystemSettingsPayload {
    #[serde(default)]
    pub(crate) homework_approved_coins: Option<u32>,
    #[serde(default)]
    pub(crate) max_homework_attempts: Option<u32>,
    #[serde(default)]
    pub(crate) similarity_threshold: Option<f64>,
    #[serde(default)]
    pub(crate) max_audio_file_size_mb: Option<u64>,
    #[serde(default)]
    pub(crate) supported_audio_formats: Option<String>,
}

impl SystemSettingsPayload {
    pub(crate) fn apply_to(self, mut policy: HomeworkPolicy) -> HomeworkPolicy {
        if let Some(coins) = self.homework_approved_coins {
            policy.coins_per_homework = coins;
        }
        if let Some(max_attempts) = self.max_homework_attempts.filter(|value| *value > 0) {
            policy.default_max_attempts = max_attempts;
        }
        if let Some(threshold) = self.similarity_threshold {
            policy.passing_score_threshold = similarity_percent(threshold);
        }
        if let Some(size_mb) = self.max_audio_file_size_mb.filter(|value| *value > 0) {
            policy.max_audio_bytes = size_mb.saturating_mul(1024 * 1024);
        }
        if let Some(formats) = self.supported_audio_formats {
            let parsed: Vec<String> = formats
                .split(',')
                .map(|item| item.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|item| !item.is_empty())
                .collect();
            if !parsed.is_empty() {
                policy.supported_audio_formats = parsed;
            }
        }
        policy
    }
}

/// The backend stores similarity as a 0-1 fraction; values above 1 are already percentages.
/// Percentages of 1 or less cannot be told apart from fractions and read as fractions.
pub(crate) fn similarity_percent(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    let percent = if value <= 1.0 { value * 100.0 } else { value };
    percent.round().clamp(0.0, 100.0) as u8
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
}
