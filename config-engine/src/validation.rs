// Semantic checks run after extraction
use crate::AppConfig;
use eunio_sync::{HttpRemoteConfig, LocalDbConfig, RetryPolicy};
use logger_redacted::LoggerConfig;

/// A configuration section that can report its own problems.
pub trait ConfigValidator {
    fn validate(&self, problems: &mut Vec<String>);
}

impl ConfigValidator for LocalDbConfig {
    fn validate(&self, problems: &mut Vec<String>) {
        if self.db_path.trim().is_empty() {
            problems.push("database.db_path must not be empty".to_string());
        }
        if self.max_connections == 0 {
            problems.push("database.max_connections must be positive".to_string());
        }
    }
}

impl ConfigValidator for HttpRemoteConfig {
    fn validate(&self, problems: &mut Vec<String>) {
        if self.base_url.trim().is_empty() {
            problems.push("remote.base_url must not be empty".to_string());
        }
        if self.timeout_secs == 0 {
            problems.push("remote.timeout_secs must be positive".to_string());
        }
    }
}

impl ConfigValidator for RetryPolicy {
    fn validate(&self, problems: &mut Vec<String>) {
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            problems.push(format!(
                "retry.multiplier must be at least 1.0 (got {})",
                self.multiplier
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            problems.push("retry.max_delay_ms must not be below retry.base_delay_ms".to_string());
        }
    }
}

impl ConfigValidator for LoggerConfig {
    fn validate(&self, problems: &mut Vec<String>) {
        if let Err(e) = logger_redacted::build_filter(self) {
            problems.push(format!("logging.log_level: {}", e));
        }
        if let Some(file) = &self.file {
            if file.directory.trim().is_empty() {
                problems.push("logging.file.directory must not be empty".to_string());
            }
        }
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self, problems: &mut Vec<String>) {
        self.database.validate(problems);
        self.remote.validate(problems);
        self.retry.validate(problems);
        self.logging.validate(problems);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problems_of(config: &AppConfig) -> Vec<String> {
        let mut problems = Vec::new();
        config.validate(&mut problems);
        problems
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(problems_of(&AppConfig::default()).is_empty());
    }

    #[test]
    fn test_every_problem_reported() {
        let mut config = AppConfig::default();
        config.database.db_path = "  ".to_string();
        config.remote.timeout_secs = 0;
        config.retry.multiplier = 0.5;

        let problems = problems_of(&config);
        assert_eq!(problems.len(), 3);
        assert!(problems[0].contains("db_path"));
        assert!(problems[1].contains("timeout_secs"));
        assert!(problems[2].contains("multiplier"));
    }

    #[test]
    fn test_nan_multiplier_rejected() {
        let mut config = AppConfig::default();
        config.retry.multiplier = f64::NAN;
        assert_eq!(problems_of(&config).len(), 1);
    }
}
