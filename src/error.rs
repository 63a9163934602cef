// Error taxonomy for sampling and configuration.

use thiserror::Error;

/// Failures the core distinguishes. Counter wraparound is not represented here:
/// the rate computer folds it into a zero reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// A whole metric group could not be read this tick (e.g. `/proc/stat` unreadable).
    #[error("{group} source unavailable: {reason}")]
    SourceUnavailable { group: &'static str, reason: String },

    /// The container runtime is unreachable, refused access, or timed out.
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// Rejected at startup; the process exits before the loop begins.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl MonitorError {
    pub fn source_unavailable(group: &'static str, reason: impl ToString) -> Self {
        MonitorError::SourceUnavailable {
            group,
            reason: reason.to_string(),
        }
    }

    pub fn runtime(reason: impl ToString) -> Self {
        MonitorError::RuntimeUnavailable(reason.to_string())
    }
}
