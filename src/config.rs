use crate::audio::synth::SynthConfig;
use crate::defaults;
use crate::error::CwError;
use crate::pipeline::orchestrator::PipelineConfig;
use crate::pipeline::types::TrailingPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
#[cfg(feature = "cli")]
use std::path::PathBuf;
use std::str::FromStr;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub detector: DetectorConfig,
    pub normalizer: NormalizerConfig,
    pub stream: StreamConfig,
    pub pipeline: BufferConfig,
    pub synth: SynthConfig,
}

/// Tone detector configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    pub window: usize,
}

/// Unit normalizer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NormalizerConfig {
    pub group_size: usize,
}

/// Input chunking and end-of-stream handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub chunk_size: usize,
    pub trailing: TrailingPolicy,
}

/// Channel capacities between stations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BufferConfig {
    pub chunk_buffer: usize,
    pub event_buffer: usize,
    pub run_buffer: usize,
    pub duration_buffer: usize,
    pub token_buffer: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window: defaults::WINDOW,
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            group_size: defaults::GROUP_SIZE,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: defaults::CHUNK_SIZE,
            trailing: TrailingPolicy::default(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            chunk_buffer: defaults::CHUNK_BUFFER,
            event_buffer: defaults::EVENT_BUFFER,
            run_buffer: defaults::RUN_BUFFER,
            duration_buffer: defaults::DURATION_BUFFER,
            token_buffer: defaults::TOKEN_BUFFER,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - CWDECODE_WINDOW → detector.window
    /// - CWDECODE_GROUP_SIZE → normalizer.group_size
    /// - CWDECODE_CHUNK_SIZE → stream.chunk_size
    /// - CWDECODE_TRAILING → stream.trailing
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(window) = env_value("CWDECODE_WINDOW") {
            self.detector.window = window;
        }

        if let Some(group_size) = env_value("CWDECODE_GROUP_SIZE") {
            self.normalizer.group_size = group_size;
        }

        if let Some(chunk_size) = env_value("CWDECODE_CHUNK_SIZE") {
            self.stream.chunk_size = chunk_size;
        }

        if let Some(trailing) = env_value("CWDECODE_TRAILING") {
            self.stream.trailing = trailing;
        }

        self
    }

    /// Checks values that would stall or break the pipeline.
    pub fn validate(&self) -> crate::error::Result<()> {
        let positive = [
            ("detector.window", self.detector.window as u64),
            ("normalizer.group_size", self.normalizer.group_size as u64),
            ("stream.chunk_size", self.stream.chunk_size as u64),
            ("synth.sample_rate", self.synth.sample_rate as u64),
            ("synth.tone_hz", self.synth.tone_hz as u64),
            ("synth.unit_ms", self.synth.unit_ms as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(CwError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }

        if self.synth.tone_hz > self.synth.sample_rate / 2 {
            return Err(CwError::ConfigInvalidValue {
                key: "synth.tone_hz".to_string(),
                message: format!(
                    "{} Hz is above the Nyquist limit of {} Hz",
                    self.synth.tone_hz,
                    self.synth.sample_rate / 2
                ),
            });
        }
        Ok(())
    }

    /// Serialize to TOML (for `config show` and `config init`).
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Runtime settings for [`Pipeline`](crate::Pipeline) and [`Decoder`](crate::Decoder).
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            window: self.detector.window,
            group_size: self.normalizer.group_size,
            trailing: self.stream.trailing,
            chunk_buffer: self.pipeline.chunk_buffer,
            event_buffer: self.pipeline.event_buffer,
            run_buffer: self.pipeline.run_buffer,
            duration_buffer: self.pipeline.duration_buffer,
            token_buffer: self.pipeline.token_buffer,
        }
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/cwdecode/config.toml on Linux, or `None` when the
    /// platform has no config directory.
    #[cfg(feature = "cli")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cwdecode").join("config.toml"))
    }
}

/// Reads and parses an override, ignoring empty and unparseable values.
fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok().filter(|v| !v.is_empty())?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_cwdecode_env() {
        remove_env("CWDECODE_WINDOW");
        remove_env("CWDECODE_GROUP_SIZE");
        remove_env("CWDECODE_CHUNK_SIZE");
        remove_env("CWDECODE_TRAILING");
    }

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.detector.window, 100);
        assert_eq!(config.normalizer.group_size, 20);
        assert_eq!(config.stream.chunk_size, 64);
        assert_eq!(config.stream.trailing, TrailingPolicy::Flush);
        assert_eq!(config.pipeline.event_buffer, 1024);
        assert_eq!(config.synth.sample_rate, 8000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_file = write_temp(
            r#"
            [detector]
            window = 50

            [normalizer]
            group_size = 10

            [stream]
            chunk_size = 128
            trailing = "discard"

            [pipeline]
            chunk_buffer = 0
            token_buffer = 8

            [synth]
            unit_ms = 40
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.detector.window, 50);
        assert_eq!(config.normalizer.group_size, 10);
        assert_eq!(config.stream.chunk_size, 128);
        assert_eq!(config.stream.trailing, TrailingPolicy::Discard);
        assert_eq!(config.pipeline.chunk_buffer, 0);
        assert_eq!(config.pipeline.token_buffer, 8);
        assert_eq!(config.pipeline.run_buffer, 64);
        assert_eq!(config.synth.unit_ms, 40);
        assert_eq!(config.synth.tone_hz, 1000);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let temp_file = write_temp("[normalizer]\ngroup_size = 40\n");
        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.normalizer.group_size, 40);
        assert_eq!(config.detector, DetectorConfig::default());
        assert_eq!(config.stream, StreamConfig::default());
        assert_eq!(config.synth, SynthConfig::default());
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let temp_file = write_temp("[detector\nwindow = ");
        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_unknown_trailing_policy_is_rejected() {
        let temp_file = write_temp("[stream]\ntrailing = \"pad\"\n");
        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_cwdecode_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_errors_on_invalid_toml() {
        let temp_file = write_temp("[detector\nwindow = ");
        let err = Config::load_or_default(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let mut config = Config::default();
        config.normalizer.group_size = 0;
        match config.validate() {
            Err(CwError::ConfigInvalidValue { key, .. }) => assert_eq!(key, "normalizer.group_size"),
            other => panic!("expected invalid value, got {other:?}"),
        }

        let mut config = Config::default();
        config.detector.window = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.stream.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.synth.unit_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_tone_above_nyquist() {
        let mut config = Config::default();
        config.synth.tone_hz = 5000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("synth.tone_hz"));
    }

    #[test]
    fn test_validate_huge_tone_is_an_error_not_overflow() {
        let mut config = Config::default();
        config.synth.tone_hz = 3_000_000_000;
        assert!(config.validate().is_err());

        config.synth.tone_hz = 4000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_buffers_are_valid() {
        let mut config = Config::default();
        config.pipeline.chunk_buffer = 0;
        config.pipeline.token_buffer = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_override_window() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_cwdecode_env();

        set_env("CWDECODE_WINDOW", "250");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.detector.window, 250);
        assert_eq!(config.normalizer.group_size, 20); // Not overridden

        clear_cwdecode_env();
    }

    #[test]
    fn test_env_override_all() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_cwdecode_env();

        set_env("CWDECODE_WINDOW", "30");
        set_env("CWDECODE_GROUP_SIZE", "12");
        set_env("CWDECODE_CHUNK_SIZE", "256");
        set_env("CWDECODE_TRAILING", "discard");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.detector.window, 30);
        assert_eq!(config.normalizer.group_size, 12);
        assert_eq!(config.stream.chunk_size, 256);
        assert_eq!(config.stream.trailing, TrailingPolicy::Discard);

        clear_cwdecode_env();
    }

    #[test]
    fn test_env_override_invalid_and_empty_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_cwdecode_env();

        set_env("CWDECODE_WINDOW", "lots");
        set_env("CWDECODE_GROUP_SIZE", "");
        set_env("CWDECODE_TRAILING", "sometimes");
        let config = Config::default().with_env_overrides();

        assert_eq!(config, Config::default());

        clear_cwdecode_env();
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut config = Config::default();
        config.stream.trailing = TrailingPolicy::Discard;
        config.detector.window = 77;

        let text = config.to_toml().unwrap();
        assert!(text.contains("[detector]"));
        assert!(text.contains("trailing = \"discard\""));

        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_pipeline_config_mapping() {
        let mut config = Config::default();
        config.detector.window = 40;
        config.normalizer.group_size = 8;
        config.stream.trailing = TrailingPolicy::Discard;
        config.pipeline.run_buffer = 0;

        let runtime = config.pipeline_config();
        assert_eq!(runtime.window, 40);
        assert_eq!(runtime.group_size, 8);
        assert_eq!(runtime.trailing, TrailingPolicy::Discard);
        assert_eq!(runtime.run_buffer, 0);
        assert_eq!(runtime.event_buffer, 1024);
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_default_path_is_xdg_compliant() {
        if let Some(path) = Config::default_path() {
            let path_str = path.to_string_lossy();
            assert!(path_str.contains("cwdecode"));
            assert!(path_str.ends_with("config.toml"));
        }
    }
}
