use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Settings {
    pub(super) runtime: RuntimeSettings,
    pub(super) api: ApiSettings,
    pub(super) homework: HomeworkSettings,
    pub(super) audio: AudioSettings,
    pub(super) telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: BaseUrl,
    pub api_v1_str: String,
    pub access_token: Option<String>,
    pub connect_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct HomeworkSettings {
    pub coins_per_homework: u32,
    pub default_max_attempts: u32,
    pub passing_score_threshold: u8,
    pub second_chance_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct AudioSettings {
    pub max_recording_seconds: u32,
    pub max_audio_file_size_mb: u64,
    pub supported_audio_formats: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub log_level: String,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub environment: Environment,
    pub strict_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Test => "test",
        }
    }

    pub(super) fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Backend origin without a trailing slash, e.g. `https://api.turantalim.uz`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl(pub(super) String);

impl BaseUrl {
    pub(super) fn parse(value: String) -> Result<Self, ConfigError> {
        let trimmed = value.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(value));
        }
        if trimmed.len() <= "https://".len() {
            return Err(ConfigError::InvalidUrl(value));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid backend url: {0}")]
    InvalidUrl(String),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("missing required secret for {0}")]
    MissingSecret(&'static str),
}

impl ApiSettings {
    /// Joins the API prefix and a relative path into an absolute endpoint URL.
    pub fn endpoint(&self, path: &str) -> String {
        let prefix = self.api_v1_str.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}{}/{}", self.base_url.as_str(), prefix, path)
    }
}

impl AudioSettings {
    pub fn max_audio_bytes(&self) -> u64 {
        self.max_audio_file_size_mb.saturating_mul(1024 * 1024)
    }
}
