// Raw cumulative counters as read from the OS and the container runtime.
// Nothing in here is a rate; see `crate::rates` for the differencing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

/// Busy/idle ticks for one CPU scope (one core, or the aggregate line).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreTimes {
    pub busy: u64,
    pub idle: u64,
}

impl CoreTimes {
    pub fn new(busy: u64, idle: u64) -> Self {
        Self { busy, idle }
    }

    pub fn total(&self) -> u64 {
        self.busy.saturating_add(self.idle)
    }
}

/// Aggregate line plus one entry per core, keyed by core index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuTimes {
    pub overall: CoreTimes,
    pub cores: HashMap<usize, CoreTimes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryCounters {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub swap_total: u64,
    pub swap_used: u64,
    pub swap_free: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionUsage {
    pub mount: String,
    pub device: String,
    pub fs_type: String,
    pub used: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCounters {
    pub pid: u32,
    pub name: String,
    /// Accumulated CPU time across all threads, in milliseconds.
    pub cpu_time_ms: u64,
    pub resident_bytes: u64,
    pub status: String,
}

/// Cumulative bytes moved by the reported partitions' devices since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskIoCounters {
    pub read_bytes: u64,
    pub written_bytes: u64,
}

/// Clock speed in MHz. `max_mhz` is `None` where the platform does not expose it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuFrequency {
    pub current_mhz: u64,
    pub max_mhz: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterfaceCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// One container's counters from a single stats read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerCounters {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Cumulative container CPU time in nanoseconds.
    pub cpu_total_ns: u64,
    /// Cumulative host CPU time in nanoseconds, as reported alongside the container's.
    pub system_cpu_ns: u64,
    pub online_cpus: u32,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub block_read_bytes: u64,
    pub block_write_bytes: u64,
    pub running: bool,
}

/// Host counters from one capture. `None` groups failed to read this tick.
#[derive(Debug, Clone, Default)]
pub struct HostSample {
    pub cpu: Option<CpuTimes>,
    pub memory: Option<MemoryCounters>,
    pub load: Option<LoadAverage>,
    pub logical_cores: usize,
    pub physical_cores: Option<usize>,
    pub frequency: Option<CpuFrequency>,
    pub partitions: Vec<PartitionUsage>,
    pub disk_io: Option<DiskIoCounters>,
    /// `None` when the process group is disabled or failed.
    pub processes: Option<HashMap<u32, ProcessCounters>>,
    pub interfaces: HashMap<String, InterfaceCounters>,
    /// Groups that failed to read, for the snapshot's degraded list.
    pub failed_groups: Vec<&'static str>,
}

/// Availability of the container runtime as seen by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeAvailability {
    Unchecked,
    Available,
    Unavailable,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct ContainerSample {
    pub availability: RuntimeAvailability,
    /// Last runtime failure, kept while unavailable.
    pub error: Option<String>,
    pub containers: HashMap<String, ContainerCounters>,
}

impl ContainerSample {
    pub fn disabled() -> Self {
        Self {
            availability: RuntimeAvailability::Disabled,
            error: None,
            containers: HashMap::new(),
        }
    }

    pub fn unavailable(error: Option<String>) -> Self {
        Self {
            availability: RuntimeAvailability::Unavailable,
            error,
            containers: HashMap::new(),
        }
    }
}

/// Everything captured in one tick. Immutable once built; the scheduler keeps
/// only the current and previous one.
#[derive(Debug, Clone)]
pub struct RawSample {
    pub taken_at: Instant,
    /// Wall-clock capture time, milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub host: HostSample,
    pub containers: ContainerSample,
}
