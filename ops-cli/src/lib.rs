//! Operator CLI for the Eunio sync layer
//!
//! Drives sync passes and settings maintenance against the configured
//! SQLite database and document gateway.
//!
//! ```bash
//! eunio status
//! eunio sync --collection daily_logs
//! eunio backup --user u1 --output settings.json
//! eunio restore --user u1 --input settings.json
//! eunio --offline reset --user u1
//! ```

pub mod cli;
pub mod commands;

pub use cli::{Cli, Command};
pub use commands::{connect, execute};
