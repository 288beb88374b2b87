pub mod clients;
pub mod core;
pub mod errors;
pub mod models;
pub(crate) mod schemas;
pub mod services;

#[cfg(test)]
mod test_support;

use futures::TryStreamExt;

use crate::clients::{AttemptFilter, PolicySource};
use crate::core::{config::Settings, state::AppState, telemetry, time::format_offset};
use crate::models::{Attempt, HomeworkPolicy};
use crate::services::review::ReviewDesk;

/// Prints the review queue, optionally narrowed to students whose name contains `name_filter`.
pub async fn run(name_filter: Option<String>) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;

    if settings.api().access_token.is_none() {
        anyhow::bail!("TURANTALIM_ACCESS_TOKEN is required to read the review queue");
    }

    let state = AppState::from_settings(settings)?;
    let backend = state.backend();

    let policy = match backend.homework_policy().await {
        Ok(policy) => policy,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to load homework settings; using local defaults");
            HomeworkPolicy::from_settings(state.settings())
        }
    };

    tracing::info!(
        backend = %state.settings().api().base_url.as_str(),
        environment = %state.settings().runtime().environment.as_str(),
        passing_score_threshold = policy.passing_score_threshold,
        "Reading homework review queue"
    );

    let threshold = policy.passing_score_threshold;
    let desk = ReviewDesk::new(backend, policy);
    let filter = AttemptFilter { student_name: name_filter, ..AttemptFilter::pending() };

    let mut pending = std::pin::pin!(desk.list_pending(filter));
    let mut total = 0_usize;
    while let Some(attempt) = pending.try_next().await? {
        println!("{}", queue_line(&attempt, threshold));
        total += 1;
    }

    tracing::info!(total, "Review queue listed");
    Ok(())
}

fn queue_line(attempt: &Attempt, passing_score_threshold: u8) -> String {
    let student = attempt.student_name.as_deref().unwrap_or("unknown student");
    let lesson = match attempt.lesson_title.as_deref() {
        Some(title) => title.to_string(),
        None => format!("lesson {}", attempt.lesson_id),
    };
    let score = match attempt.similarity_score {
        Some(score) if score >= passing_score_threshold => format!("{score}% pass"),
        Some(score) => format!("{score}% below"),
        None => "unscored".to_string(),
    };
    let late = if attempt.is_late { "  late" } else { "" };

    format!(
        "#{}  {}  {}  attempt {}/{}  {}  {}  {}{}",
        attempt.id,
        student,
        lesson,
        attempt.attempt_number,
        attempt.max_attempts,
        score,
        attempt.status.as_str(),
        format_offset(attempt.created_at),
        late
    )
}
