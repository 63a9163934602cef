// Severity classification against configurable breakpoints.

use crate::error::MonitorError;
use crate::models::Severity;
use serde::Deserialize;

pub const DEFAULT_WARNING: f64 = 60.0;
pub const DEFAULT_CRITICAL: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_warning")]
    pub warning: f64,
    #[serde(default = "default_critical")]
    pub critical: f64,
}

fn default_warning() -> f64 {
    DEFAULT_WARNING
}

fn default_critical() -> f64 {
    DEFAULT_CRITICAL
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning: DEFAULT_WARNING,
            critical: DEFAULT_CRITICAL,
        }
    }
}

impl Thresholds {
    pub fn new(warning: f64, critical: f64) -> Self {
        Self { warning, critical }
    }

    /// Checked once at startup; `classify` itself never fails.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if !self.warning.is_finite() || !self.critical.is_finite() {
            return Err(MonitorError::ConfigInvalid(format!(
                "thresholds.warning and thresholds.critical must be finite, got {} and {}",
                self.warning, self.critical
            )));
        }
        if self.warning >= self.critical {
            return Err(MonitorError::ConfigInvalid(format!(
                "thresholds.warning ({}) must be below thresholds.critical ({})",
                self.warning, self.critical
            )));
        }
        Ok(())
    }

    pub fn classify(&self, value: f64) -> Severity {
        classify(value, (self.warning, self.critical))
    }
}

/// `value < warn` is healthy, `warn <= value < crit` a warning, anything else critical.
/// NaN is treated as healthy.
pub fn classify(value: f64, (warn, crit): (f64, f64)) -> Severity {
    if value >= crit {
        Severity::Critical
    } else if value >= warn {
        Severity::Warning
    } else {
        Severity::Healthy
    }
}
