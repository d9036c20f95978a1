use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Invalid log filter '{directives}': {reason}")]
    InvalidFilter { directives: String, reason: String },

    #[error("Invalid redaction pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

pub type LoggerResult<T> = Result<T, LoggerError>;
