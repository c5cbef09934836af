//! Server configuration
//!
//! Sources, lowest priority first: built-in defaults, an optional TOML
//! file, then `PLANTCARE_*` environment variables (`__` separates nested
//! keys, e.g. `PLANTCARE_MODEL__PATH`). Command-line flags are applied on
//! top by the binary.

use config::{Config, ConfigError, Environment, File};
use inference_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "PLANTCARE";

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Upload size limit in bytes; unlimited when unset
    pub max_upload_bytes: Option<usize>,
    /// Expose Prometheus metrics on `/metrics`
    pub metrics: bool,
    pub model: EngineConfig,
    pub log: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: None,
            metrics: true,
            model: EngineConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from an optional file and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder.add_source(env).build()?.try_deserialize()
    }

    /// Socket address string to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference_engine::BackendKind;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::environment().source(Some(map))
    }

    fn write_toml(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("plantcare-{}-{}.toml", name, std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.model.model_path, PathBuf::from("model.onnx"));
        assert_eq!(config.model.backend, BackendKind::Tract);
        assert_eq!(config.model.preprocess.image_size, 224);
        assert!(config.max_upload_bytes.is_none());
        assert!(!config.log.json);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = write_toml(
            "file",
            r#"
port = 9100
max_upload_bytes = 1048576

[model]
path = "/srv/models/leaf.onnx"
backend = "mock"

[log]
json = true
"#,
        );

        let config = ServerConfig::load_with_env(Some(&path), env(&[])).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.port, 9100);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.max_upload_bytes, Some(1_048_576));
        assert_eq!(config.model.model_path, PathBuf::from("/srv/models/leaf.onnx"));
        assert_eq!(config.model.backend, BackendKind::Mock);
        assert!(config.log.json);
    }

    #[test]
    fn test_env_overrides_file() {
        let path = write_toml("env", "port = 9100\n");

        let config = ServerConfig::load_with_env(
            Some(&path),
            env(&[
                ("PLANTCARE_PORT", "7000"),
                ("PLANTCARE_MODEL__LABELS_PATH", "/srv/labels.txt"),
            ]),
        )
        .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.port, 7000);
        assert_eq!(config.model.labels_path, Some(PathBuf::from("/srv/labels.txt")));
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = ServerConfig::load_with_env(Some(Path::new("/nonexistent/plantcare.toml")), env(&[]));
        assert!(result.is_err());
    }
}
