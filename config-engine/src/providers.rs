// Configuration file formats and the environment provider
use crate::error::{ConfigError, ConfigResult};
use figment::providers::{Env, Format, Toml, Yaml};
use figment::Figment;
use std::path::Path;

/// Environment variable prefix; nested keys are separated by `__`
/// (`EUNIO_RETRY__MAX_RETRIES`).
pub const ENV_PREFIX: &str = "EUNIO_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Pick the format from the file extension.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub(crate) fn merge_file(self, figment: Figment, path: &Path) -> Figment {
        match self {
            ConfigFormat::Toml => figment.merge(Toml::file(path)),
            ConfigFormat::Yaml => figment.merge(Yaml::file(path)),
        }
    }
}

pub(crate) fn env_provider(prefix: &str) -> Env {
    Env::prefixed(prefix).split("__")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("eunio.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("conf/eunio.yml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert!(matches!(
            ConfigFormat::from_path(Path::new("eunio.ini")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
