use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_cache_millisecs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Text
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<LogLevel>,
    pub format: Option<LogFormat>,
}

/// Connection details for the OPNsense appliance. Read-only after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the appliance management API (e.g. https://192.168.1.1)
    pub base_url: String,
    /// API key half of the Basic credentials
    pub api_key: String,
    /// API secret half of the Basic credentials
    pub api_secret: String,
    /// Skip TLS certificate validation for the upstream connection
    #[serde(default)]
    pub insecure_tls: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl UpstreamConfig {
    /// Reads the upstream settings from the environment variables the
    /// relay has historically used: OPN_URL, OPN_KEY, OPN_SECRET and
    /// OPN_INSECURE ("1" enables insecure TLS).
    pub fn from_env() -> Result<Self, RelayError> {
        let base_url = std::env::var("OPN_URL")
            .map_err(|_| RelayError::Config("OPN_URL is not set".to_string()))?;
        let api_key = std::env::var("OPN_KEY")
            .map_err(|_| RelayError::Config("OPN_KEY is not set".to_string()))?;
        let api_secret = std::env::var("OPN_SECRET")
            .map_err(|_| RelayError::Config("OPN_SECRET is not set".to_string()))?;
        let insecure_tls = std::env::var("OPN_INSECURE").map(|v| v == "1").unwrap_or(false);

        Ok(Self {
            base_url,
            api_key,
            api_secret,
            insecure_tls,
            request_timeout_secs: default_request_timeout_secs(),
        })
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        let url = Url::parse(&self.base_url)?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(RelayError::Config(format!(
                    "unsupported upstream URL scheme '{}' (expected http or https)",
                    other
                )));
            }
        }
        if self.api_key.is_empty() {
            return Err(RelayError::Config("upstream API key is empty".to_string()));
        }
        if self.api_secret.is_empty() {
            return Err(RelayError::Config("upstream API secret is empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(RelayError::Config(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticFileConfig {
    /// Filesystem directory served at /
    pub root_dir: String,
    #[serde(default = "StaticFileConfig::default_index_files")]
    pub index_files: Vec<String>,
    #[serde(default)]
    pub custom_mime_types: std::collections::HashMap<String, String>,
    #[serde(default = "default_cache_millisecs")]
    pub cache_millisecs: u64,
}

impl StaticFileConfig {
    fn default_index_files() -> Vec<String> {
        vec!["index.html".to_string(), "index.htm".to_string()]
    }

    pub fn single(root_dir: String) -> Self {
        Self {
            root_dir,
            index_files: Self::default_index_files(),
            custom_mime_types: std::collections::HashMap::new(),
            cache_millisecs: default_cache_millisecs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub upstream: UpstreamConfig,
    pub static_files: Option<StaticFileConfig>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, RelayError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| RelayError::Config(format!("malformed configuration file: {}", e)))?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> Result<(), RelayError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RelayError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        self.upstream.validate()?;
        if self.private_key.is_some() != self.certificate.is_some() {
            return Err(RelayError::Config(
                "TLS requires both a private key and a certificate".to_string(),
            ));
        }
        Ok(())
    }
}
