use super::parsing::{
    env_optional, env_or_default, is_supported_audio_format, parse_bool, parse_environment,
    parse_percentage, parse_string_list, parse_u32, parse_u64,
};
use super::types::{
    ApiSettings, AudioSettings, BaseUrl, ConfigError, HomeworkSettings, RuntimeSettings, Settings,
    TelemetrySettings,
};

const DEFAULT_AUDIO_FORMATS: &[&str] = &["wav", "webm", "ogg", "mp3", "m4a"];

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let environment = parse_environment(
            env_optional("TURANTALIM_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("TURANTALIM_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let base_url = env_or_default("TURANTALIM_API_URL", "http://localhost:8000");
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");
        let access_token = env_optional("TURANTALIM_ACCESS_TOKEN");
        let connect_timeout_seconds =
            parse_u64("API_CONNECT_TIMEOUT", env_or_default("API_CONNECT_TIMEOUT", "10"))?;
        let request_timeout_seconds =
            parse_u64("API_REQUEST_TIMEOUT", env_or_default("API_REQUEST_TIMEOUT", "60"))?;

        let coins_per_homework =
            parse_u32("HOMEWORK_APPROVED_COINS", env_or_default("HOMEWORK_APPROVED_COINS", "10"))?;
        let default_max_attempts =
            parse_u32("MAX_HOMEWORK_ATTEMPTS", env_or_default("MAX_HOMEWORK_ATTEMPTS", "3"))?;
        let passing_score_threshold = parse_percentage(
            "PASSING_SCORE_THRESHOLD",
            env_or_default("PASSING_SCORE_THRESHOLD", "70"),
        )?;
        let second_chance_attempts =
            parse_u32("SECOND_CHANCE_ATTEMPTS", env_or_default("SECOND_CHANCE_ATTEMPTS", "1"))?;

        let max_recording_seconds =
            parse_u32("MAX_RECORDING_SECONDS", env_or_default("MAX_RECORDING_SECONDS", "60"))?;
        let max_audio_file_size_mb =
            parse_u64("MAX_AUDIO_FILE_SIZE_MB", env_or_default("MAX_AUDIO_FILE_SIZE_MB", "50"))?;
        let supported_audio_formats =
            parse_string_list(env_optional("SUPPORTED_AUDIO_FORMATS"), DEFAULT_AUDIO_FORMATS);

        let log_level = env_or_default("TURANTALIM_LOG_LEVEL", "info");
        let json = env_optional("TURANTALIM_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings {
                base_url: BaseUrl::parse(base_url)?,
                api_v1_str,
                access_token,
                connect_timeout_seconds,
                request_timeout_seconds,
            },
            homework: HomeworkSettings {
                coins_per_homework,
                default_max_attempts,
                passing_score_threshold,
                second_chance_attempts,
            },
            audio: AudioSettings {
                max_recording_seconds,
                max_audio_file_size_mb,
                supported_audio_formats,
            },
            telemetry: TelemetrySettings { log_level, json },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub fn homework(&self) -> &HomeworkSettings {
        &self.homework
    }

    pub fn audio(&self) -> &AudioSettings {
        &self.audio
    }

    pub fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=10).contains(&self.homework.default_max_attempts) {
            return Err(ConfigError::InvalidValue {
                field: "MAX_HOMEWORK_ATTEMPTS",
                value: self.homework.default_max_attempts.to_string(),
            });
        }

        if self.homework.second_chance_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SECOND_CHANCE_ATTEMPTS",
                value: String::from("0"),
            });
        }

        if self.audio.max_recording_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_RECORDING_SECONDS",
                value: String::from("0"),
            });
        }

        if self.audio.supported_audio_formats.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "SUPPORTED_AUDIO_FORMATS",
                value: String::from("<empty>"),
            });
        }
        for format in &self.audio.supported_audio_formats {
            if !is_supported_audio_format(format) {
                return Err(ConfigError::InvalidValue {
                    field: "SUPPORTED_AUDIO_FORMATS",
                    value: format.clone(),
                });
            }
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.api.access_token.is_none() {
            return Err(ConfigError::MissingSecret("TURANTALIM_ACCESS_TOKEN"));
        }

        Ok(())
    }
}

#[cfg(test)]
impl Settings {
    pub(crate) fn test_defaults(base_url: &str) -> Self {
        use super::types::Environment;

        Self {
            runtime: RuntimeSettings { environment: Environment::Test, strict_config: false },
            api: ApiSettings {
                base_url: BaseUrl(base_url.trim_end_matches('/').to_string()),
                api_v1_str: "/api/v1".to_string(),
                access_token: Some("test-token".to_string()),
                connect_timeout_seconds: 2,
                request_timeout_seconds: 5,
            },
            homework: HomeworkSettings {
                coins_per_homework: 10,
                default_max_attempts: 3,
                passing_score_threshold: 70,
                second_chance_attempts: 1,
            },
            audio: AudioSettings {
                max_recording_seconds: 60,
                max_audio_file_size_mb: 50,
                supported_audio_formats: DEFAULT_AUDIO_FORMATS
                    .iter()
                    .map(|item| item.to_string())
                    .collect(),
            },
            telemetry: TelemetrySettings { log_level: "debug".to_string(), json: false },
        }
    }
}
