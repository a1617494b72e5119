//! Unified error handling for the physio-analyzer library.
//!
//! Only decode failures are fatal for a whole activity. Everything else here
//! is local: a degenerate window is skipped by segmentation, and conditioning
//! problems are reported as warnings rather than errors.

use thiserror::Error;

/// Unified error type for analysis operations.
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    /// The activity file could not be decoded into records
    #[error("Decode failed: {message}")]
    Decode { message: String },

    /// Not enough samples for the requested operation
    #[error("{context}: {sample_count} samples, minimum {minimum_required} required")]
    InsufficientData {
        context: String,
        sample_count: usize,
        minimum_required: usize,
    },

    /// A regression window with no usable power variance
    #[error(
        "Degenerate window at {start_time:.0}s-{end_time:.0}s ({sample_count} samples): {reason}"
    )]
    DegenerateWindow {
        start_time: f64,
        end_time: f64,
        sample_count: usize,
        reason: String,
    },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl AnalysisError {
    /// True for the per-window condition segmentation treats as "not stable".
    pub fn is_degenerate(&self) -> bool {
        matches!(self, AnalysisError::DegenerateWindow { .. })
    }
}

/// Result type alias for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Extension trait for converting Option to AnalysisError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an insufficient data error.
    fn ok_or_insufficient(self, context: &str, sample_count: usize, minimum: usize)
        -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_insufficient(
        self,
        context: &str,
        sample_count: usize,
        minimum: usize,
    ) -> Result<T> {
        self.ok_or_else(|| AnalysisError::InsufficientData {
            context: context.to_string(),
            sample_count,
            minimum_required: minimum,
        })
    }
}
