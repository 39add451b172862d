//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::SidecarConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<SidecarConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: SidecarConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml = r#"
            [module]
            module_id = "mod-orders-1.0.0"
            application_id = "app-orders"

            [gateway]
            base_location = "https://gateway.platform.local/"
        "#;
        let config: SidecarConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.module.module_id, "mod-orders-1.0.0");
        assert!(config.gateway.base_location.is_some());
        // Untouched sections fall back to defaults.
        assert_eq!(config.token_cache.refresh_before_expiry_secs, 60);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn loads_from_disk() {
        let path = std::env::temp_dir().join(format!("sidecar-config-{}.toml", std::process::id()));
        fs::write(
            &path,
            "[module]\nmodule_id = \"mod-orders-1.0.0\"\napplication_id = \"app-orders\"\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(config.module.module_id, "mod-orders-1.0.0");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = load_config(Path::new("/nonexistent/sidecar.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
