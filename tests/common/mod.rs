// Shared test helpers: sample builders and scripted sources

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use sysmon::docker_repo::{
    CollectorConfig, ContainerListing, ContainerRuntime, ContainerStatsCollector,
};
use sysmon::error::MonitorError;
use sysmon::models::*;
use sysmon::scheduler::{Scheduler, SchedulerConfig};
use sysmon::sysinfo_repo::HostSource;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Single-core host with 8 GiB of memory, half used.
pub fn host_sample(busy: u64, idle: u64) -> HostSample {
    HostSample {
        cpu: Some(CpuTimes {
            overall: CoreTimes::new(busy, idle),
            cores: HashMap::from([(0, CoreTimes::new(busy, idle))]),
        }),
        memory: Some(MemoryCounters {
            total: 8 * GIB,
            used: 4 * GIB,
            available: 4 * GIB,
            swap_total: 0,
            swap_used: 0,
            swap_free: 0,
        }),
        load: Some(LoadAverage {
            one: 0.5,
            five: 0.25,
            fifteen: 0.1,
        }),
        logical_cores: 1,
        ..Default::default()
    }
}

pub fn with_interface(mut host: HostSample, name: &str, rx: u64, tx: u64) -> HostSample {
    host.interfaces.insert(
        name.to_string(),
        InterfaceCounters {
            rx_bytes: rx,
            tx_bytes: tx,
        },
    );
    host
}

pub fn with_disk_io(mut host: HostSample, read_bytes: u64, written_bytes: u64) -> HostSample {
    host.disk_io = Some(DiskIoCounters {
        read_bytes,
        written_bytes,
    });
    host
}

pub fn with_process(mut host: HostSample, pid: u32, name: &str, cpu_time_ms: u64, rss: u64) -> HostSample {
    host.processes.get_or_insert_with(HashMap::new).insert(
        pid,
        ProcessCounters {
            pid,
            name: name.to_string(),
            cpu_time_ms,
            resident_bytes: rss,
            status: "running".to_string(),
        },
    );
    host
}

pub fn raw_sample(taken_at: Instant, host: HostSample, containers: ContainerSample) -> RawSample {
    RawSample {
        taken_at,
        timestamp: 1_700_000_000_000,
        host,
        containers,
    }
}

pub fn container(id: &str, name: &str, cpu_total_ns: u64, system_cpu_ns: u64) -> ContainerCounters {
    ContainerCounters {
        id: id.to_string(),
        name: name.to_string(),
        image: format!("{name}:latest"),
        cpu_total_ns,
        system_cpu_ns,
        online_cpus: 2,
        memory_usage: 256 * 1024 * 1024,
        memory_limit: 1024 * 1024 * 1024,
        running: true,
        ..Default::default()
    }
}

pub fn available(containers: Vec<ContainerCounters>) -> ContainerSample {
    ContainerSample {
        availability: RuntimeAvailability::Available,
        error: None,
        containers: containers.into_iter().map(|c| (c.id.clone(), c)).collect(),
    }
}

/// Replays queued host results, then repeats the fallback.
pub struct ScriptedHost {
    queue: Mutex<VecDeque<Result<HostSample, MonitorError>>>,
    fallback: HostSample,
    pub captures: AtomicUsize,
}

impl ScriptedHost {
    pub fn new(script: Vec<Result<HostSample, MonitorError>>, fallback: HostSample) -> Self {
        Self {
            queue: Mutex::new(script.into()),
            fallback,
            captures: AtomicUsize::new(0),
        }
    }

    pub fn repeating(sample: HostSample) -> Self {
        Self::new(Vec::new(), sample)
    }
}

impl HostSource for ScriptedHost {
    async fn capture(&self) -> Result<HostSample, MonitorError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        let next = self.queue.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// In-memory container runtime that can be switched off, or made to hang.
pub struct FakeRuntime {
    pub available: AtomicBool,
    pub stall: AtomicBool,
    pub pings: AtomicUsize,
    pub containers: Mutex<Vec<ContainerCounters>>,
}

impl FakeRuntime {
    pub fn up(containers: Vec<ContainerCounters>) -> Self {
        Self {
            available: AtomicBool::new(true),
            stall: AtomicBool::new(false),
            pings: AtomicUsize::new(0),
            containers: Mutex::new(containers),
        }
    }

    pub fn down() -> Self {
        let r = Self::up(Vec::new());
        r.available.store(false, Ordering::SeqCst);
        r
    }

    pub fn stalled() -> Self {
        let r = Self::up(Vec::new());
        r.stall.store(true, Ordering::SeqCst);
        r
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn set_containers(&self, containers: Vec<ContainerCounters>) {
        *self.containers.lock().unwrap() = containers;
    }

    async fn gate(&self) -> Result<(), MonitorError> {
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(MonitorError::runtime("connection refused"));
        }
        Ok(())
    }
}

impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), MonitorError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.gate().await
    }

    async fn list_running(&self) -> Result<Vec<ContainerListing>, MonitorError> {
        self.gate().await?;
        let containers = self.containers.lock().unwrap().clone();
        Ok(containers
            .into_iter()
            .map(|c| ContainerListing {
                id: c.id,
                name: c.name,
                image: c.image,
            })
            .collect())
    }

    async fn stats(&self, listing: &ContainerListing) -> Result<ContainerCounters, MonitorError> {
        self.gate().await?;
        let found = self
            .containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == listing.id)
            .cloned();
        found.ok_or_else(|| MonitorError::runtime(format!("no such container: {}", listing.id)))
    }
}

pub fn collector(runtime: FakeRuntime, timeout: Duration, reprobe_every_ticks: u64) -> ContainerStatsCollector<FakeRuntime> {
    ContainerStatsCollector::new(
        runtime,
        CollectorConfig {
            timeout,
            reprobe_every_ticks,
        },
    )
}

pub type TestScheduler = Scheduler<ScriptedHost, ContainerStatsCollector<FakeRuntime>>;

pub fn scheduler(
    host: ScriptedHost,
    containers: Option<ContainerStatsCollector<FakeRuntime>>,
    refresh_interval_secs: f64,
) -> TestScheduler {
    let config = SchedulerConfig {
        refresh_interval_secs,
        ..SchedulerConfig::default()
    };
    Scheduler::new(host, containers, config)
}
