//! Error types for the court analytics library

use thiserror::Error;

/// Result type alias for the analytics library
pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Errors that can occur while configuring or running the analytics stages
#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Frame count mismatch: {input} has {actual} frames, expected {expected}")]
    FrameCountMismatch {
        input: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AnalyticsError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn frame_mismatch(input: &'static str, expected: usize, actual: usize) -> Self {
        Self::FrameCountMismatch {
            input,
            expected,
            actual,
        }
    }
}
