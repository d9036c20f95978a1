// Logger configuration
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, for development
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPattern {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionSettings {
    pub enabled: bool,
    pub hash_for_correlation: bool,
    pub custom_patterns: Vec<CustomPattern>,
}

impl Default for RedactionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            hash_for_correlation: true,
            custom_patterns: Vec::new(),
        }
    }
}

/// Daily-rolling JSON log file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLogConfig {
    pub directory: String,
    pub file_prefix: String,
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            file_prefix: "eunio.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Default level when `RUST_LOG` is not set
    pub log_level: String,
    pub format: LogFormat,
    pub file: Option<FileLogConfig>,
    pub redaction: RedactionSettings,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
            redaction: RedactionSettings::default(),
        }
    }
}

impl LoggerConfig {
    /// Filter directives: the configured level for our crates, quieter
    /// defaults for chatty dependencies.
    pub fn filter_directives(&self) -> String {
        format!(
            "{level},sqlx=warn,hyper=info,reqwest=info,rustls=warn",
            level = self.log_level
        )
    }
}
