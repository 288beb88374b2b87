mod parsing;
mod settings;
mod types;

pub use types::{
    ApiSettings, AudioSettings, BaseUrl, ConfigError, Environment, HomeworkSettings,
    RuntimeSettings, Settings, TelemetrySettings,
};
