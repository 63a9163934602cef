// Rolling per-metric history covering a fixed wall-clock window.
//
// Capacity is W = ceil(window / refresh_interval). Changing the refresh
// interval recomputes W and clears every series.

use crate::models::{DerivedMetric, HistoryPoint};
use std::collections::{HashMap, VecDeque};

/// Wall-clock span each series covers.
pub const HISTORY_WINDOW_SECS: f64 = 120.0;

/// Number of points needed to span `window_secs` at `interval_secs` per tick. Never 0.
pub fn capacity_for(window_secs: f64, interval_secs: f64) -> usize {
    if interval_secs.is_nan() || interval_secs <= 0.0 || !window_secs.is_finite() {
        return 1;
    }
    ((window_secs / interval_secs).ceil() as usize).max(1)
}

/// Strict FIFO series of at most `capacity` points.
#[derive(Debug, Clone)]
pub struct HistorySeries {
    points: VecDeque<HistoryPoint>,
    capacity: usize,
}

impl HistorySeries {
    fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, point: HistoryPoint) {
        while self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.points.len() >= self.capacity
    }

    /// Oldest first.
    pub fn points(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn latest(&self) -> Option<f64> {
        self.points.back().map(|p| p.value)
    }

    pub fn average(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points.iter().map(|p| p.value).sum::<f64>() / self.points.len() as f64
    }

    pub fn min(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.value)
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    pub fn max(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.value)
            .reduce(f64::max)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    window_secs: f64,
    interval_secs: f64,
    capacity: usize,
    series: HashMap<String, HistorySeries>,
}

impl HistoryBuffer {
    pub fn new(window_secs: f64, interval_secs: f64) -> Self {
        Self {
            window_secs,
            interval_secs,
            capacity: capacity_for(window_secs, interval_secs),
            series: HashMap::new(),
        }
    }

    /// Buffer spanning [`HISTORY_WINDOW_SECS`].
    pub fn with_default_window(interval_secs: f64) -> Self {
        Self::new(HISTORY_WINDOW_SECS, interval_secs)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn refresh_interval(&self) -> f64 {
        self.interval_secs
    }

    /// Recomputes capacity and clears every series. Returns false (and keeps
    /// contents) when the interval is unchanged.
    pub fn set_refresh_interval(&mut self, interval_secs: f64) -> bool {
        if interval_secs == self.interval_secs {
            return false;
        }
        self.interval_secs = interval_secs;
        self.capacity = capacity_for(self.window_secs, interval_secs);
        self.series.clear();
        true
    }

    /// Appends to `key`, creating the series on first use and evicting the
    /// oldest point once the series is full.
    pub fn append(&mut self, key: &str, metric: &DerivedMetric) {
        let capacity = self.capacity;
        self.series
            .entry(key.to_string())
            .or_insert_with(|| HistorySeries::new(capacity))
            .push(HistoryPoint::from(metric));
    }

    /// Points for `key`, oldest first. Empty for an unknown key.
    pub fn window(&self, key: &str) -> Vec<HistoryPoint> {
        self.series
            .get(key)
            .map(|s| s.points.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn series(&self, key: &str) -> Option<&HistorySeries> {
        self.series.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Drops series for which `keep` returns false (entities that went away).
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.series.retain(|k, _| keep(k));
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricValue, Severity};

    fn metric(seq: u64, value: f64) -> DerivedMetric {
        DerivedMetric {
            name: "cpu.overall".into(),
            value: MetricValue::Percentage(value),
            severity: Severity::Healthy,
            low_confidence: false,
            sequence: seq,
        }
    }

    #[test]
    fn capacity_rounds_up() {
        assert_eq!(capacity_for(120.0, 2.0), 60);
        assert_eq!(capacity_for(120.0, 7.0), 18);
        assert_eq!(capacity_for(120.0, 0.5), 240);
        assert_eq!(capacity_for(120.0, 500.0), 1);
        assert_eq!(capacity_for(120.0, 0.0), 1);
    }

    #[test]
    fn series_stats() {
        let mut h = HistoryBuffer::new(10.0, 1.0);
        for (i, v) in [10.0, 30.0, 20.0].into_iter().enumerate() {
            h.append("k", &metric(i as u64, v));
        }
        let s = h.series("k").unwrap();
        assert_eq!(s.latest(), Some(20.0));
        assert_eq!(s.min(), 10.0);
        assert_eq!(s.max(), 30.0);
        assert!((s.average() - 20.0).abs() < 1e-9);
        assert!(!s.is_full());
    }

    #[test]
    fn unchanged_interval_keeps_contents() {
        let mut h = HistoryBuffer::new(10.0, 1.0);
        h.append("k", &metric(1, 1.0));
        assert!(!h.set_refresh_interval(1.0));
        assert_eq!(h.window("k").len(), 1);
    }
}
