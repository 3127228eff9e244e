//! Error types for Limeout.

use thiserror::Error;

/// Main error type for Limeout operations.
#[derive(Error, Debug)]
pub enum LimeoutError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(
        "Invalid crop margins (left {left}, top {top}, right {right}, bottom {bottom}) for {width}x{height} frame"
    )]
    InvalidMargin {
        left: u32,
        top: u32,
        right: u32,
        bottom: u32,
        width: u32,
        height: u32,
    },

    #[error("Tracking lost at frame {frame}, holding offset ({dx:.1}, {dy:.1})")]
    TrackingLost { frame: u64, dx: f32, dy: f32 },

    #[error("Encode failure at frame {frame}: {reason}")]
    EncodeFailure { frame: u64, reason: String },

    #[error("Export session aborted after {frames_written} frames: {reason}")]
    SessionAbort { frames_written: u64, reason: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Coarse classification used by callers to decide how to react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected synchronously before any processing.
    InvalidParameter,
    /// Non-fatal; tracking degraded to a held offset.
    TrackingLost,
    /// Per-frame and retryable.
    EncodeFailure,
    /// Fatal for the export; the session has been finalized.
    SessionAbort,
    /// Source could not be opened or decoded.
    Source,
    /// The user cancelled the operation.
    Cancelled,
    Io,
}

impl LimeoutError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameter(_)
            | Self::InvalidMargin { .. }
            | Self::UnsupportedFormat(_)
            | Self::Config(_) => ErrorKind::InvalidParameter,
            Self::TrackingLost { .. } => ErrorKind::TrackingLost,
            Self::EncodeFailure { .. } => ErrorKind::EncodeFailure,
            Self::SessionAbort { .. } => ErrorKind::SessionAbort,
            Self::Decoder(_) | Self::NotFound(_) => ErrorKind::Source,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the error ends the current run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::TrackingLost | ErrorKind::EncodeFailure
        )
    }

    /// Shorthand for building an [`LimeoutError::InvalidParameter`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

/// Result type alias for Limeout operations.
pub type Result<T> = std::result::Result<T, LimeoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_margin_error_is_invalid_parameter() {
        let err = LimeoutError::InvalidMargin {
            left: 10,
            top: 0,
            right: 10,
            bottom: 0,
            width: 20,
            height: 20,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert!(err.is_fatal());
        assert!(err.to_string().contains("20x20"));
    }

    #[test]
    fn test_tracking_lost_is_not_fatal() {
        let err = LimeoutError::TrackingLost {
            frame: 3,
            dx: 1.0,
            dy: -2.0,
        };
        assert!(!err.is_fatal());
        let err = LimeoutError::EncodeFailure {
            frame: 3,
            reason: "pipe".into(),
        };
        assert!(!err.is_fatal());
    }
}
