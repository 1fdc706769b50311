//! Centralized Error Handling Module
//!
//! Every failure the engine can surface carries a unique error code so batch
//! logs can be grepped and counted.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - STATE_xxx: chain state reads
//! - TOKEN_xxx: token metadata resolution
//! - EPOCH_xxx: epoch arithmetic
//! - CFG_xxx: configuration errors
//! - IO_xxx / JSON_xxx: job and fixture loading

use std::fmt;

use crate::providers::chain::StateUnavailable;

/// Engine-wide error type
#[derive(Debug)]
pub struct EngineError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl EngineError {
    /// Create a new EngineError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create EngineError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // Chain State Errors
    // ============================================
    /// A requested on-chain value could not be read
    StateUnavailable,
    /// A block could not be located for a timestamp
    StateBlockNotFound,

    // ============================================
    // Token Metadata Errors
    // ============================================
    /// Decimals/symbol could not be resolved with confidence
    MetadataAmbiguous,

    // ============================================
    // Epoch Errors
    // ============================================
    /// Timestamp is not aligned to the configured WEEK
    InvalidEpoch,

    // ============================================
    // Configuration Errors
    // ============================================
    /// Missing environment variable
    ConfigMissingEnv,
    /// Invalid configuration value
    ConfigInvalidValue,

    // ============================================
    // Input Errors
    // ============================================
    /// Job or fixture file could not be read
    IoFailed,
    /// Job or fixture file could not be parsed
    JsonInvalid,

    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StateUnavailable => "STATE_UNAVAILABLE",
            Self::StateBlockNotFound => "STATE_BLOCK_NOT_FOUND",
            Self::MetadataAmbiguous => "TOKEN_METADATA_AMBIGUOUS",
            Self::InvalidEpoch => "EPOCH_NOT_ALIGNED",
            Self::ConfigMissingEnv => "CFG_MISSING_ENV",
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",
            Self::IoFailed => "IO_FAILED",
            Self::JsonInvalid => "JSON_INVALID",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Whether re-running the whole estimate might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StateUnavailable | Self::StateBlockNotFound)
    }
}

// ============================================
// Convenience constructors
// ============================================

impl EngineError {
    /// Token decimals could not be resolved
    pub fn metadata_ambiguous(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::MetadataAmbiguous, msg)
    }

    /// Epoch is not WEEK-aligned
    pub fn invalid_epoch(timestamp: u64, week: u64) -> Self {
        Self::new(
            ErrorCode::InvalidEpoch,
            format!("timestamp {} is not aligned to WEEK={}", timestamp, week),
        )
    }

    /// Invalid configuration value
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalidValue, msg)
    }

    /// Missing environment variable
    pub fn missing_env(name: &str) -> Self {
        Self::new(
            ErrorCode::ConfigMissingEnv,
            format!("Missing environment variable: {}", name),
        )
    }

    /// No block found for a timestamp
    pub fn block_not_found(timestamp: u64) -> Self {
        Self::new(
            ErrorCode::StateBlockNotFound,
            format!("No block at or after timestamp {}", timestamp),
        )
    }
}

// ============================================
// Result type alias
// ============================================

/// Engine Result type
pub type EngineResult<T> = Result<T, EngineError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<StateUnavailable> for EngineError {
    fn from(err: StateUnavailable) -> Self {
        let message = err.to_string();
        Self::with_source(ErrorCode::StateUnavailable, message, err)
    }
}

impl From<eyre::Report> for EngineError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::Unknown, err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::IoFailed, "IO error", err)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::JsonInvalid, "JSON parse error", err)
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        Self::with_source(ErrorCode::ConfigInvalidValue, "TOML parse error", err)
    }
}
