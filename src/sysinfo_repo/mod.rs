// Host counters via sysinfo, plus /proc/stat for raw CPU ticks and sysfs for
// the cpufreq ceiling.

mod linux;

use crate::error::MonitorError;
use crate::models::{
    CpuFrequency, DiskIoCounters, HostSample, InterfaceCounters, LoadAverage, MemoryCounters,
    PartitionUsage, ProcessCounters,
};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use sysinfo::{Disks, Networks, ProcessesToUpdate, System};
use tracing::{debug, instrument};

/// Virtual filesystems that never show up as disk metrics.
const EXCLUDED_FS_TYPES: &[&str] = &[
    "squashfs", "tmpfs", "devtmpfs", "devfs", "overlay", "aufs", "none",
];

/// Mount points (and everything below them) that never show up as disk metrics.
const EXCLUDED_MOUNTS: &[&str] = &["/boot", "/boot/efi", "/snap"];

/// Capability to read raw host counters. Implementations must not sleep.
pub trait HostSource: Send + Sync {
    /// Fails only when nothing could be read at all; a single unreadable group
    /// is reported through [`HostSample::failed_groups`].
    fn capture(&self) -> impl Future<Output = Result<HostSample, MonitorError>> + Send;
}

pub struct SysinfoRepo {
    sys: Arc<Mutex<System>>,
    disks: Arc<Mutex<Disks>>,
    networks: Arc<Mutex<Networks>>,
    processes_enabled: bool,
}

impl SysinfoRepo {
    pub fn new(processes_enabled: bool) -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        let disks = Disks::new_with_refreshed_list();
        let networks = Networks::new_with_refreshed_list();
        Self {
            sys: Arc::new(Mutex::new(sys)),
            disks: Arc::new(Mutex::new(disks)),
            networks: Arc::new(Mutex::new(networks)),
            processes_enabled,
        }
    }
}

impl HostSource for SysinfoRepo {
    #[instrument(skip(self), fields(repo = "sysinfo", operation = "capture"))]
    async fn capture(&self) -> Result<HostSample, MonitorError> {
        let sys = self.sys.clone();
        let disks = self.disks.clone();
        let networks = self.networks.clone();
        let processes_enabled = self.processes_enabled;
        tokio::task::spawn_blocking(move || {
            capture_blocking(&sys, &disks, &networks, processes_enabled)
        })
        .await
        .map_err(|e| MonitorError::source_unavailable("host", format!("sysinfo task join: {e}")))?
    }
}

fn capture_blocking(
    sys: &Mutex<System>,
    disks: &Mutex<Disks>,
    networks: &Mutex<Networks>,
    processes_enabled: bool,
) -> Result<HostSample, MonitorError> {
    let mut sys = sys
        .lock()
        .map_err(|e| MonitorError::source_unavailable("host", format!("sysinfo lock poisoned: {e}")))?;
    let mut sample = HostSample::default();

    match linux::read_cpu_times() {
        Ok(cpu) => sample.cpu = Some(cpu),
        Err(e) => {
            debug!(error = %e, operation = "read_cpu_times", "CPU counters unavailable");
            sample.failed_groups.push("cpu");
        }
    }

    sys.refresh_memory();
    let total = sys.total_memory();
    if total > 0 {
        let available = sys.available_memory();
        sample.memory = Some(MemoryCounters {
            total,
            used: total.saturating_sub(available),
            available,
            swap_total: sys.total_swap(),
            swap_used: sys.used_swap(),
            swap_free: sys.free_swap(),
        });
    } else {
        sample.failed_groups.push("memory");
    }

    let load = System::load_average();
    sample.load = Some(LoadAverage {
        one: load.one,
        five: load.five,
        fifteen: load.fifteen,
    });

    sample.logical_cores = match &sample.cpu {
        Some(cpu) if !cpu.cores.is_empty() => cpu.cores.len(),
        _ => sys.cpus().len().max(1),
    };
    sample.physical_cores = System::physical_core_count();

    sys.refresh_cpu_frequency();
    let current_mhz = sys.cpus().iter().map(|c| c.frequency()).max().unwrap_or(0);
    let max_mhz = linux::read_max_frequency_mhz();
    if current_mhz > 0 || max_mhz.is_some() {
        sample.frequency = Some(CpuFrequency {
            current_mhz,
            max_mhz,
        });
    }

    if processes_enabled {
        sys.refresh_processes(ProcessesToUpdate::All, true);
        let processes: HashMap<u32, ProcessCounters> = sys
            .processes()
            .iter()
            .map(|(pid, p)| {
                let pid = pid.as_u32();
                (
                    pid,
                    ProcessCounters {
                        pid,
                        name: p.name().to_string_lossy().into_owned(),
                        cpu_time_ms: p.accumulated_cpu_time(),
                        resident_bytes: p.memory(),
                        status: p.status().to_string().to_lowercase(),
                    },
                )
            })
            .collect();
        sample.processes = Some(processes);
    }
    drop(sys);

    match disks.lock() {
        Ok(mut disks) => {
            disks.refresh(true);
            let mut io = DiskIoCounters::default();
            // A device mounted twice reports the same counters on each mount.
            let mut devices = HashSet::new();
            sample.partitions = disks
                .list()
                .iter()
                .filter_map(|d| {
                    let mount = d.mount_point().to_string_lossy().into_owned();
                    let fs_type = d.file_system().to_string_lossy().into_owned();
                    if !is_reported_partition(&mount, &fs_type) {
                        return None;
                    }
                    let device = d.name().to_string_lossy().into_owned();
                    if devices.insert(device.clone()) {
                        let usage = d.usage();
                        io.read_bytes = io.read_bytes.saturating_add(usage.total_read_bytes);
                        io.written_bytes =
                            io.written_bytes.saturating_add(usage.total_written_bytes);
                    }
                    let total = d.total_space();
                    Some(PartitionUsage {
                        mount,
                        device,
                        fs_type,
                        used: total.saturating_sub(d.available_space()),
                        total,
                    })
                })
                .collect();
            sample.disk_io = Some(io);
        }
        Err(e) => {
            debug!(error = %e, operation = "refresh_disks", "sysinfo disks lock poisoned");
            sample.failed_groups.push("disk");
        }
    }

    match networks.lock() {
        Ok(mut networks) => {
            networks.refresh(true);
            sample.interfaces = networks
                .list()
                .iter()
                .filter(|(name, _)| name.as_str() != "lo")
                .map(|(name, data)| {
                    (
                        name.clone(),
                        InterfaceCounters {
                            rx_bytes: data.total_received(),
                            tx_bytes: data.total_transmitted(),
                        },
                    )
                })
                .collect();
        }
        Err(e) => {
            debug!(error = %e, operation = "refresh_networks", "sysinfo networks lock poisoned");
            sample.failed_groups.push("network");
        }
    }

    Ok(sample)
}

/// Whether a mounted filesystem is a real partition worth showing.
pub fn is_reported_partition(mount: &str, fs_type: &str) -> bool {
    let fs_type = fs_type.to_lowercase();
    if EXCLUDED_FS_TYPES.contains(&fs_type.as_str()) {
        return false;
    }
    !EXCLUDED_MOUNTS.iter().any(|excl| {
        mount == *excl
            || mount
                .strip_prefix(excl)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}
