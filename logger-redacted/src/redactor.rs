use crate::config::RedactionSettings;
use crate::error::{LoggerError, LoggerResult};
use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap();
    static ref PHONE_REGEX: Regex =
        Regex::new(r"(?:\+\d{1,3}[-.\s]?)?\(?\b\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap();
    static ref IP_REGEX: Regex = Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").unwrap();
    static ref BEARER_REGEX: Regex = Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]+").unwrap();
}

/// Stable short digest of a value, for correlating log lines without
/// exposing the value itself.
pub fn hash_value(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(&digest[..8])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Identifier {
    Email,
    Phone,
    IpAddress,
    BearerToken,
}

impl Identifier {
    fn label(self) -> &'static str {
        match self {
            Identifier::Email => "EMAIL",
            Identifier::Phone => "PHONE",
            Identifier::IpAddress => "IP",
            Identifier::BearerToken => "TOKEN",
        }
    }

    fn regex(self) -> &'static Regex {
        match self {
            Identifier::Email => &EMAIL_REGEX,
            Identifier::Phone => &PHONE_REGEX,
            Identifier::IpAddress => &IP_REGEX,
            Identifier::BearerToken => &BEARER_REGEX,
        }
    }

    fn mask(self, value: &str) -> String {
        match self {
            Identifier::Email => match value.split_once('@') {
                Some((local, domain)) => format!(
                    "{}***@{}***",
                    local.chars().next().unwrap_or('*'),
                    domain.chars().next().unwrap_or('*')
                ),
                None => "***@***".to_string(),
            },
            Identifier::Phone => "***-***-****".to_string(),
            Identifier::IpAddress => match value.split('.').next() {
                Some(first) => format!("{}.***.***.***", first),
                None => "***.***.***.***".to_string(),
            },
            Identifier::BearerToken => "Bearer ***".to_string(),
        }
    }
}

/// Which identifiers to redact and how
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub redact_emails: bool,
    pub redact_phones: bool,
    pub redact_ip_addresses: bool,
    pub redact_tokens: bool,
    /// Replace with a digest instead of a mask
    pub hash_for_correlation: bool,
    pub custom_patterns: Vec<(Regex, String)>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_emails: true,
            redact_phones: true,
            redact_ip_addresses: true,
            redact_tokens: true,
            hash_for_correlation: true,
            custom_patterns: Vec::new(),
        }
    }
}

impl RedactionConfig {
    /// Build from serializable settings, compiling custom patterns.
    pub fn from_settings(settings: &RedactionSettings) -> LoggerResult<Self> {
        let custom_patterns = settings
            .custom_patterns
            .iter()
            .map(|custom| {
                Regex::new(&custom.pattern)
                    .map(|regex| (regex, custom.replacement.clone()))
                    .map_err(|e| LoggerError::InvalidPattern {
                        pattern: custom.pattern.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<LoggerResult<Vec<_>>>()?;

        Ok(Self {
            hash_for_correlation: settings.hash_for_correlation,
            custom_patterns,
            ..Self::default()
        })
    }

    fn enabled(&self) -> Vec<Identifier> {
        [
            (self.redact_tokens, Identifier::BearerToken),
            (self.redact_emails, Identifier::Email),
            (self.redact_ip_addresses, Identifier::IpAddress),
            (self.redact_phones, Identifier::Phone),
        ]
        .into_iter()
        .filter_map(|(on, identifier)| on.then_some(identifier))
        .collect()
    }
}

/// Scrubs personal identifiers out of free text before it is logged or
/// reported.
#[derive(Debug, Clone, Default)]
pub struct PiiRedactor {
    config: RedactionConfig,
}

impl PiiRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        Self { config }
    }

    /// Redactor that leaves text untouched.
    pub fn disabled() -> Self {
        Self::new(RedactionConfig {
            redact_emails: false,
            redact_phones: false,
            redact_ip_addresses: false,
            redact_tokens: false,
            hash_for_correlation: false,
            custom_patterns: Vec::new(),
        })
    }

    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();
        for identifier in self.config.enabled() {
            result = identifier
                .regex()
                .replace_all(&result, |caps: &Captures| {
                    let value = &caps[0];
                    if self.config.hash_for_correlation {
                        format!("{}[{}]", identifier.label(), hash_value(value))
                    } else {
                        identifier.mask(value)
                    }
                })
                .into_owned();
        }
        for (pattern, replacement) in &self.config.custom_patterns {
            result = pattern.replace_all(&result, replacement.as_str()).into_owned();
        }
        result
    }
}
