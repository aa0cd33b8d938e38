//! Compiler configuration and settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tr_checker::Strictness;

/// Main compiler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub strictness: Strictness,
    /// Run return type checking at all
    pub type_check: bool,
    /// Write the `.rbs` sidecar next to the erased source
    pub emit_signatures: bool,
    /// Where artifacts go; `None` writes next to the input
    pub output_dir: Option<PathBuf>,
    /// Worker threads for batch checking; 0 uses the available parallelism
    pub workers: usize,
    /// Treat unknown type names as errors instead of warnings
    pub unknown_types_as_errors: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            strictness: Strictness::Permissive,
            type_check: true,
            emit_signatures: true,
            output_dir: None,
            workers: 0,
            unknown_types_as_errors: true,
        }
    }
}

/// Upper bound on configured workers
const MAX_WORKERS: usize = 256;

impl CompilerConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e,
        })?;

        let config: CompilerConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize { error: e })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                error: e,
            })?;
        }

        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers > MAX_WORKERS {
            return Err(ConfigError::Invalid {
                field: "workers".to_string(),
                message: format!("At most {MAX_WORKERS} workers are supported"),
            });
        }

        if self.strictness == Strictness::Strict && !self.type_check {
            return Err(ConfigError::Invalid {
                field: "strictness".to_string(),
                message: "Strict mode requires type_check = true".to_string(),
            });
        }

        if let Some(dir) = &self.output_dir {
            if dir.is_file() {
                return Err(ConfigError::Invalid {
                    field: "output_dir".to_string(),
                    message: format!("{} is a file", dir.display()),
                });
            }
        }

        Ok(())
    }

    /// Worker count with 0 resolved to the machine's parallelism
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            0 => std::thread::available_parallelism().map_or(1, usize::from),
            n => n,
        }
    }

    /// Where the artifacts for `input` with extension `extension` go
    pub fn output_path(&self, input: &Path, extension: &str) -> PathBuf {
        let file_name = input
            .file_stem()
            .map(|stem| Path::new(stem).with_extension(extension))
            .unwrap_or_else(|| PathBuf::from(format!("out.{extension}")));
        match &self.output_dir {
            Some(dir) => dir.join(file_name),
            None => input.with_file_name(file_name),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error for {path:?}: {error}")]
    Io { path: PathBuf, error: std::io::Error },

    #[error("Parse error for {path:?}: {error}")]
    Parse { path: PathBuf, error: toml::de::Error },

    #[error("Serialization error: {error}")]
    Serialize { error: toml::ser::Error },

    #[error("Invalid configuration for {field}: {message}")]
    Invalid { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert_eq!(config.strictness, Strictness::Permissive);
        assert!(config.type_check);
        assert!(config.emit_signatures);
        assert!(config.effective_workers() >= 1);
    }

    #[test]
    fn test_config_validation() {
        let mut config = CompilerConfig::default();
        config.workers = 10_000;
        assert!(config.validate().is_err());

        config.workers = 4;
        assert!(config.validate().is_ok());

        config.strictness = Strictness::Strict;
        config.type_check = false;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "strictness"));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("trc.toml");

        let config = CompilerConfig {
            strictness: Strictness::Strict,
            output_dir: Some(temp_dir.path().join("out")),
            workers: 3,
            ..CompilerConfig::default()
        };

        config.to_file(&config_path).unwrap();
        let loaded = CompilerConfig::from_file(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("trc.toml");
        std::fs::write(&config_path, "strictness = \"strict\"\nemit_signatures = false\n").unwrap();

        let loaded = CompilerConfig::from_file(&config_path).unwrap();
        assert_eq!(loaded.strictness, Strictness::Strict);
        assert!(!loaded.emit_signatures);
        assert!(loaded.type_check);
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("trc.toml");
        std::fs::write(&config_path, "workers = \"many\"").unwrap();
        assert!(matches!(
            CompilerConfig::from_file(&config_path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_output_path() {
        let mut config = CompilerConfig::default();
        let input = Path::new("src/app.trb");
        assert_eq!(config.output_path(input, "rb"), PathBuf::from("src/app.rb"));

        config.output_dir = Some(PathBuf::from("build"));
        assert_eq!(config.output_path(input, "rbs"), PathBuf::from("build/app.rbs"));
    }
}
