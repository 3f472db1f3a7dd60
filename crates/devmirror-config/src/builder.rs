//! Configuration builder layering defaults, files and environment variables

use crate::{Config, ConfigError, ConfigResult, TransferConfig};
use config::{ConfigBuilder as ConfigBuilderInner, Environment, File, FileFormat};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Configuration builder for loading configuration from multiple sources
#[derive(Debug)]
pub struct ConfigBuilder {
    inner: ConfigBuilderInner<config::builder::DefaultState>,
    sources: Vec<ConfigSource>,
    env_separator: String,
}

#[derive(Debug, Clone)]
enum ConfigSource {
    File { path: PathBuf, format: FileFormat },
    Defaults,
    Environment { prefix: String },
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            inner: config::Config::builder(),
            sources: Vec::new(),
            env_separator: "__".to_string(),
        }
    }

    /// Add the built-in defaults as a source.
    ///
    /// Sources added later override them. Fields missing from every source
    /// still fall back to their defaults.
    pub fn add_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Add a configuration file source; missing files are skipped
    pub fn add_source_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = Self::detect_format(&path);
        self.sources.push(ConfigSource::File { path, format });
        self
    }

    /// Add environment variable source with prefix
    pub fn add_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.sources.push(ConfigSource::Environment {
            prefix: prefix.into(),
        });
        self
    }

    /// Set environment variable separator (default: "__")
    pub fn env_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.env_separator = separator.into();
        self
    }

    /// Build and validate the configuration
    pub fn build(mut self) -> ConfigResult<Config> {
        for source in &self.sources {
            match source {
                ConfigSource::File { path, format } => {
                    if path.exists() {
                        self.inner = self
                            .inner
                            .add_source(File::from(path.clone()).format(*format));
                    }
                }
                ConfigSource::Environment { prefix } => {
                    self.inner = self.inner.add_source(
                        Environment::with_prefix(prefix)
                            .prefix_separator(&self.env_separator)
                            .separator(&self.env_separator)
                            .try_parsing(true),
                    );
                }
                ConfigSource::Defaults => {
                    let defaults = serde_yaml::to_value(Config::default()).map_err(|e| {
                        ConfigError::other(format!("Failed to serialize defaults: {}", e))
                    })?;
                    self.inner = self
                        .inner
                        .add_source(config::Config::try_from(&defaults)?);
                }
            }
        }

        let config: Config = self.inner.build()?.try_deserialize()?;
        validate(&config)?;
        Ok(config)
    }

    /// Detect file format from extension
    fn detect_format(path: &Path) -> FileFormat {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    if config.adb.host.trim().is_empty() {
        return Err(ConfigError::validation("adb.host must not be empty"));
    }

    if config.adb.port == 0 {
        return Err(ConfigError::validation("adb.port must be greater than 0"));
    }

    if config.adb.connect_timeout_secs == 0 {
        return Err(ConfigError::validation(
            "adb.connect_timeout_secs must be greater than 0",
        ));
    }

    let buffer = config.transfer.write_buffer_size;
    if !(TransferConfig::MIN_WRITE_BUFFER..=TransferConfig::MAX_WRITE_BUFFER).contains(&buffer) {
        return Err(ConfigError::validation(format!(
            "transfer.write_buffer_size must be between {} and {} bytes, got {}",
            TransferConfig::MIN_WRITE_BUFFER,
            TransferConfig::MAX_WRITE_BUFFER,
            buffer
        )));
    }

    if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
        return Err(ConfigError::validation(
            "Log level must be one of: trace, debug, info, warn, error",
        ));
    }

    let mut seen = HashSet::new();
    for device in &config.devices {
        if device.id.trim().is_empty() {
            return Err(ConfigError::validation("Device id must not be empty"));
        }
        if !seen.insert(device.id.as_str()) {
            return Err(ConfigError::validation(format!(
                "Device '{}' is configured more than once",
                device.id
            )));
        }

        for folder in &device.folders {
            if !folder.source_root.starts_with('/') {
                return Err(ConfigError::validation(format!(
                    "Device '{}': source root '{}' must be an absolute remote path",
                    device.id, folder.source_root
                )));
            }
            if folder.destination_root.as_os_str().is_empty() {
                return Err(ConfigError::validation(format!(
                    "Device '{}': destination for '{}' must not be empty",
                    device.id, folder.source_root
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn build_from(content: &str, suffix: &str) -> ConfigResult<Config> {
        let mut temp_file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        write!(temp_file, "{}", content).unwrap();
        ConfigBuilder::new()
            .add_defaults()
            .add_source_file(temp_file.path())
            .build()
    }

    #[test]
    fn test_builder_defaults() {
        let config = ConfigBuilder::new().add_defaults().build().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.adb.port, 5037);
    }

    #[test]
    fn test_builder_yaml_file() {
        let config = build_from(
            r#"
adb:
  port: 5038
devices:
  - id: emulator-5554
    folders:
      - source: /sdcard/DCIM
        destination: /backup/dcim
        synchronize_empty_folders: false
"#,
            ".yaml",
        )
        .unwrap();

        assert_eq!(config.adb.port, 5038);
        assert_eq!(config.adb.host, "127.0.0.1");
        let folders = config.folders_for("emulator-5554").unwrap();
        assert_eq!(folders[0].source_root, "/sdcard/DCIM");
        assert!(!folders[0].synchronize_empty_folders);
    }

    #[test]
    fn test_builder_toml_file() {
        let config = build_from(
            r#"
[logging]
level = "debug"

[[devices]]
id = "R58M123"

[[devices.folders]]
source_root = "/sdcard/Music"
destination_root = "/backup/music"
"#,
            ".toml",
        )
        .unwrap();

        assert_eq!(config.logging.level, "debug");
        let folders = config.folders_for("R58M123").unwrap();
        assert!(folders[0].synchronize_empty_folders);
    }

    #[test]
    fn test_sources_apply_in_order() {
        let mut temp_file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(temp_file, "adb:\n  port: 5038\nlogging:\n  level: debug\n").unwrap();

        let config = ConfigBuilder::new()
            .add_source_file(temp_file.path())
            .build()
            .unwrap();
        assert_eq!(config.adb.port, 5038);
        assert_eq!(config.adb.host, "127.0.0.1");

        // Defaults added last override the file
        let config = ConfigBuilder::new()
            .add_source_file(temp_file.path())
            .add_defaults()
            .build()
            .unwrap();
        assert_eq!(config.adb.port, 5037);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_builder_without_sources() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_custom_env_separator() {
        std::env::set_var("DEVMIRROR_SEPARATOR_TEST_ADB_PORT", "5040");
        let result = ConfigBuilder::new()
            .add_defaults()
            .add_env_prefix("DEVMIRROR_SEPARATOR_TEST")
            .env_separator("_")
            .build();
        std::env::remove_var("DEVMIRROR_SEPARATOR_TEST_ADB_PORT");

        assert_eq!(result.unwrap().adb.port, 5040);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let config = ConfigBuilder::new()
            .add_defaults()
            .add_source_file("/nonexistent/devmirror.yaml")
            .build()
            .unwrap();
        assert!(config.devices.is_empty());
    }

    #[rstest]
    #[case("adb:\n  port: 0\n", "adb.port")]
    #[case("transfer:\n  write_buffer_size: 16\n", "write_buffer_size")]
    #[case("logging:\n  level: loud\n", "Log level")]
    #[case("devices:\n  - id: a\n  - id: a\n", "more than once")]
    #[case("devices:\n  - id: ''\n", "must not be empty")]
    #[case(
        "devices:\n  - id: a\n    folders:\n      - source: sdcard\n        destination: /b\n",
        "absolute remote path"
    )]
    fn test_builder_validation(#[case] content: &str, #[case] expected: &str) {
        let error = build_from(content, ".yaml").unwrap_err();
        assert!(
            error.to_string().contains(expected),
            "unexpected error: {}",
            error
        );
    }

    #[test]
    fn test_unparseable_file_fails() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "adb: [unterminated").unwrap();
        let result = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(temp_file.path())
            .build();
        assert!(result.is_err());
    }
}
