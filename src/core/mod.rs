pub mod config;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod time;
