// Domain models: raw counters, derived metrics, snapshot

mod metric;
mod raw;
mod snapshot;

pub use metric::{DerivedMetric, HistoryPoint, MetricValue, Reading, Severity};
pub use raw::{
    ContainerCounters, ContainerSample, CoreTimes, CpuFrequency, CpuTimes, DiskIoCounters,
    HostSample, InterfaceCounters, LoadAverage, MemoryCounters, PartitionUsage, ProcessCounters, RawSample, RuntimeAvailability,
};
pub use snapshot::{ContainerState, PartitionState, ProcessState, Snapshot};
