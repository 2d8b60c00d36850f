//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::{AuthConfig, GatewayConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
    KeyFile(PathBuf, std::io::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
            ConfigError::KeyFile(path, e) => {
                write!(f, "Cannot read public key file {}: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Return the PEM text of the configured public key, reading the key file if needed.
pub fn read_public_key(auth: &AuthConfig) -> Result<String, ConfigError> {
    if let Some(pem) = &auth.public_key {
        return Ok(pem.clone());
    }
    match &auth.public_key_path {
        Some(path) => {
            let path = PathBuf::from(path);
            fs::read_to_string(&path).map_err(|e| ConfigError::KeyFile(path, e))
        }
        None => Err(ConfigError::Validation(vec![ValidationError::MissingPublicKey])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [auth]
            public_key = "-----BEGIN PUBLIC KEY-----"
            clock_skew_secs = 30
            menu_permission_whitelist = ["/api/common/**"]
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.auth.clock_skew_secs, 30);
        assert_eq!(config.auth.menu_permission_whitelist, vec!["/api/common/**".to_string()]);
    }

    #[test]
    fn test_invalid_config_reports_validation_errors() {
        let err = parse_config("[timeouts]\nrequest_secs = 0\n").unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_read_public_key_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "PEM-CONTENT").unwrap();

        let auth = AuthConfig {
            public_key_path: Some(file.path().to_string_lossy().into_owned()),
            ..AuthConfig::default()
        };
        assert_eq!(read_public_key(&auth).unwrap(), "PEM-CONTENT");
    }

    #[test]
    fn test_read_public_key_missing_file() {
        let auth = AuthConfig {
            public_key_path: Some("/nonexistent/gateway.pub".into()),
            ..AuthConfig::default()
        };
        assert!(matches!(read_public_key(&auth), Err(ConfigError::KeyFile(_, _))));
    }
}
