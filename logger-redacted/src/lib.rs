//! Logging setup for the Eunio sync layer with redaction of personal
//! identifiers
//!
//! Health data must never reach a log file or an error report in the clear.
//! This crate provides:
//!
//! - **Subscriber setup**: `EnvFilter`, pretty or JSON console output and an
//!   optional daily-rolling JSON file
//! - **Redaction**: emails, phone numbers, IP addresses and bearer tokens
//!   are replaced by a short digest (or a mask) before text is logged or
//!   collected into a sync report
//! - **Correlation**: user ids are logged as [`correlation_id`] digests so
//!   one user's lines can be grouped without knowing who they are
//!
//! # Example
//!
//! ```no_run
//! use logger_redacted::{init_logging, redacted_warn, correlation_id, LoggerConfig};
//!
//! let _guard = init_logging(&LoggerConfig::default()).unwrap();
//! tracing::info!(user = %correlation_id("user-123"), "Sync started");
//! redacted_warn!("Push failed for {}", "jane@example.com");
//! ```

pub mod config;
pub mod error;
pub mod init;
pub mod macros;
pub mod redactor;

pub use config::*;
pub use error::{LoggerError, LoggerResult};
pub use init::{build_filter, init_logging, LoggingGuard};
pub use redactor::{hash_value, PiiRedactor, RedactionConfig};

#[doc(hidden)]
pub use tracing;

use std::sync::OnceLock;

static GLOBAL_REDACTOR: OnceLock<PiiRedactor> = OnceLock::new();

/// Set the process-wide redactor used by [`redact`]. Only the first call
/// takes effect; returns whether this one did.
pub fn install_redactor(redactor: PiiRedactor) -> bool {
    GLOBAL_REDACTOR.set(redactor).is_ok()
}

fn global_redactor() -> &'static PiiRedactor {
    GLOBAL_REDACTOR.get_or_init(PiiRedactor::default)
}

/// Redact `text` with the process-wide redactor (defaults apply until
/// [`init_logging`] installs the configured one).
pub fn redact(text: &str) -> String {
    global_redactor().redact(text)
}

/// Short stable digest of a user id for log correlation.
pub fn correlation_id(user_id: &str) -> String {
    format!("u:{}", hash_value(user_id))
}
