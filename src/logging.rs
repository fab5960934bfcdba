use crate::config::{LogFormat, LogLevel, LoggingConfig};
use crate::error::RelayError;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::io::Write;

/// Initializes the process-wide logger from configuration. Text format goes
/// through plain env_logger; JSON format emits one object per line with a
/// UTC timestamp.
pub fn init(config: &LoggingConfig) -> Result<(), RelayError> {
    let level = config.level.clone().unwrap_or_default().to_string();
    let format = config.format.clone().unwrap_or_default();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));

    if matches!(format, LogFormat::Json) {
        builder.format(|buf, record| {
            let timestamp: DateTime<Utc> = Utc::now();
            let entry = json!({
                "timestamp": timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
                "level": record.level().to_string().to_lowercase(),
                "target": record.target(),
                "message": record.args().to_string(),
            });
            writeln!(buf, "{}", entry)
        });
    }

    builder.try_init().map_err(|e| RelayError::Config(e.to_string()))
}

pub fn parse_log_level(s: &str) -> Result<LogLevel, RelayError> {
    match s.to_lowercase().as_str() {
        "trace" => Ok(LogLevel::Trace),
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        _ => Err(RelayError::Config(format!(
            "invalid log level: {}. Must be one of: trace, debug, info, warn, error",
            s
        ))),
    }
}

pub fn parse_log_format(s: &str) -> Result<LogFormat, RelayError> {
    match s.to_lowercase().as_str() {
        "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        _ => Err(RelayError::Config(format!(
            "invalid log format: {}. Must be one of: text, json",
            s
        ))),
    }
}
