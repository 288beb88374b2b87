use crate::core::config::Settings;
use crate::services::reward::RewardConfig;

/// Read-only homework rules served by the configuration service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeworkPolicy {
    pub coins_per_homework: u32,
    pub default_max_attempts: u32,
    pub passing_score_threshold: u8,
    pub second_chance_attempts: u32,
    pub max_recording_seconds: u32,
    pub max_audio_bytes: u64,
    pub supported_audio_formats: Vec<String>,
}

impl HomeworkPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            coins_per_homework: settings.homework().coins_per_homework,
            default_max_attempts: settings.homework().default_max_attempts,
            passing_score_threshold: settings.homework().passing_score_threshold,
            second_chance_attempts: settings.homework().second_chance_attempts,
            max_recording_seconds: settings.audio().max_recording_seconds,
            max_audio_bytes: settings.audio().max_audio_bytes(),
            supported_audio_formats: settings.audio().supported_audio_formats.clone(),
        }
    }

    pub fn reward_config(&self) -> RewardConfig {
        RewardConfig { coins_per_homework: self.coins_per_homework }
    }

    pub fn accepts_format(&self, format: &str) -> bool {
        let format = format.to_ascii_lowercase();
        self.supported_audio_formats.iter().any(|allowed| *allowed == format)
    }
}
