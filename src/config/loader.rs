//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::config::validation::ValidationError;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse configuration from a TOML file.
///
/// Validation is a separate step: the binary applies command-line overrides
/// first and then runs [`validate_config`](crate::config::validate_config).
pub fn read_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::validate_config;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.toml", name, std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_valid_file() {
        let path = write_temp(
            "relay-valid",
            r#"
            [listener]
            bind_address = "127.0.0.1:4000"

            [upstream]
            access_key = "key"
            "#,
        );
        let config = read_config(&path).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:4000");
        assert_eq!(validate_config(&config), Ok(()));
        fs::remove_file(path).ok();
    }

    #[test]
    fn missing_key_fails_validation() {
        let path = write_temp("relay-nokey", "[listener]\nmax_connections = 4\n");
        let config = read_config(&path).unwrap();
        let err = ConfigError::Validation(validate_config(&config).unwrap_err());
        assert!(err.to_string().starts_with("Validation failed: "));
        assert!(err.to_string().contains("upstream.access_key: is required"));
        fs::remove_file(path).ok();
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let path = write_temp("relay-garbage", "listener = [[[");
        assert!(matches!(read_config(&path), Err(ConfigError::Parse(_))));
        fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
