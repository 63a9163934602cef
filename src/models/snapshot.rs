// Snapshot handed to the renderer once per tick, plus its per-entity views.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    CpuFrequency, DerivedMetric, HistoryPoint, LoadAverage, MemoryCounters, RuntimeAvailability,
    Severity,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionState {
    pub mount: String,
    pub device: String,
    pub fs_type: String,
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub usage_percent: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessState {
    pub pid: u32,
    pub name: String,
    pub status: String,
    pub cpu_percent: f64,
    pub cpu_severity: Severity,
    pub memory_percent: f64,
    pub memory_severity: Severity,
    pub resident_bytes: u64,
    pub low_confidence: bool,
}

/// Transient per-container view. Rebuilt every tick from the live container set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerState {
    pub id: String,
    pub name: String,
    pub image: String,
    pub cpu_percent: f64,
    pub cpu_severity: Severity,
    pub memory_bytes: u64,
    pub memory_limit_bytes: u64,
    pub memory_percent: f64,
    pub memory_severity: Severity,
    pub net_rx_bytes_per_sec: f64,
    pub net_tx_bytes_per_sec: f64,
    pub block_read_bytes_per_sec: f64,
    pub block_write_bytes_per_sec: f64,
    pub running: bool,
    /// First tick for this container: rates are placeholders.
    pub low_confidence: bool,
}

/// Immutable result of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub sequence: u64,
    pub refresh_interval_secs: f64,
    pub metrics: BTreeMap<String, DerivedMetric>,
    /// Bounded history per metric, oldest first.
    pub history: BTreeMap<String, Vec<HistoryPoint>>,
    pub memory: Option<MemoryCounters>,
    pub load: Option<LoadAverage>,
    pub logical_cores: usize,
    pub physical_cores: Option<usize>,
    pub cpu_frequency: Option<CpuFrequency>,
    pub partitions: Vec<PartitionState>,
    pub processes: Vec<ProcessState>,
    pub containers: Vec<ContainerState>,
    pub container_runtime: RuntimeAvailability,
    pub container_error: Option<String>,
    /// Metric groups that could not be sampled this tick.
    pub degraded: Vec<String>,
}

impl Snapshot {
    pub fn metric(&self, name: &str) -> Option<&DerivedMetric> {
        self.metrics.get(name)
    }

    /// History for `name`, empty when the series does not exist.
    pub fn history(&self, name: &str) -> &[HistoryPoint] {
        self.history.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn containers_available(&self) -> bool {
        self.container_runtime == RuntimeAvailability::Available
    }

    pub fn running_containers(&self) -> usize {
        self.containers.iter().filter(|c| c.running).count()
    }

    pub fn container(&self, id: &str) -> Option<&ContainerState> {
        self.containers.iter().find(|c| c.id == id)
    }
}
