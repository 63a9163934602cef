// Derived metric values and severity tiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity tier; ordered `Healthy < Warning < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Healthy,
    Warning,
    Critical,
}

impl Severity {
    /// Short status label shown next to a value.
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Healthy => "OK",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Percentages are 0-100 (container CPU may exceed 100 on multi-core hosts);
/// rates are bytes per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum MetricValue {
    Percentage(f64),
    Rate(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Percentage(v) | MetricValue::Rate(v) => v,
        }
    }
}

/// Output of the rate computer for one metric, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub name: String,
    pub value: MetricValue,
    /// Set when no prior counter existed, so the value is a placeholder 0.
    pub low_confidence: bool,
}

impl Reading {
    pub fn percentage(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Percentage(value),
            low_confidence: false,
        }
    }

    pub fn rate(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Rate(value),
            low_confidence: false,
        }
    }

    pub fn low_confidence(mut self) -> Self {
        self.low_confidence = true;
        self
    }
}

/// A classified metric for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetric {
    pub name: String,
    pub value: MetricValue,
    pub severity: Severity,
    pub low_confidence: bool,
    pub sequence: u64,
}

/// One entry of a history series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub sequence: u64,
    pub value: f64,
    pub severity: Severity,
}

impl From<&DerivedMetric> for HistoryPoint {
    fn from(m: &DerivedMetric) -> Self {
        Self {
            sequence: m.sequence,
            value: m.value.as_f64(),
            severity: m.severity,
        }
    }
}
