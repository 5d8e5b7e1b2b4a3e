//! Error types for cwdecode.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CwError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // Input contract violations
    #[error("Sample chunk #{sequence} is empty")]
    EmptyChunk { sequence: u64 },

    // Audio input errors
    #[error("Unsupported audio format: {message}")]
    AudioFormat { message: String },

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Audio source failed: {message}")]
    AudioSource { message: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Audio input device not found: {device}")]
    AudioDeviceNotFound { device: String },

    // Synthesizer errors
    #[error("Invalid keying symbol {symbol:?} at position {position}")]
    InvalidPattern { symbol: char, position: usize },

    // Pipeline errors
    #[error("Station '{station}' failed: {message}")]
    StationFailed { station: String, message: String },

    #[error("Token sink failed: {message}")]
    Sink { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CwError>;
