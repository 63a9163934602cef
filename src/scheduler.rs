// Refresh loop: one tick at a time, host and container capture joined within a
// tick, then rate computation, classification, history and snapshot assembly.
// The previous/current sample pair and the history buffer live here and are
// only touched after both capture branches have finished.

use crate::config::{AppConfig, ProcessSort};
use crate::docker_repo::ContainerSource;
use crate::error::MonitorError;
use crate::history::HistoryBuffer;
use crate::models::{
    ContainerSample, ContainerState, DerivedMetric, HistoryPoint, HostSample, MetricValue,
    PartitionState, ProcessState, RawSample, RuntimeAvailability, Severity, Snapshot,
};
use crate::rates::{self, container_key, disk_key, host_group, is_process_key, process_key};
use crate::render::Renderer;
use crate::sysinfo_repo::HostSource;
use crate::thresholds::Thresholds;
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Sampling,
    Rendered,
    Stopped,
}

/// Messages the loop accepts between ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control {
    Stop,
    /// New refresh interval in seconds; clears all history.
    SetRefreshInterval(f64),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub refresh_interval_secs: f64,
    pub thresholds: Thresholds,
    pub top_processes: usize,
    pub process_sort: ProcessSort,
    /// The container budget tracks the refresh interval (no explicit `docker.timeout_ms`).
    pub docker_timeout_follows_refresh: bool,
}

impl SchedulerConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            refresh_interval_secs: config.monitoring.refresh_interval_secs,
            thresholds: config.thresholds,
            top_processes: config.collectors.top_processes,
            process_sort: config.collectors.process_sort,
            docker_timeout_follows_refresh: config.docker.timeout_ms.is_none(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

/// The only cross-tick mutable state.
#[derive(Debug)]
struct RollingState {
    previous: Option<RawSample>,
    current: Option<RawSample>,
    history: HistoryBuffer,
}

pub struct Scheduler<H, C> {
    host: H,
    containers: Option<C>,
    config: SchedulerConfig,
    rolling: RollingState,
    state: LoopState,
    sequence: u64,
    host_failing: bool,
}

impl<H: HostSource, C: ContainerSource> Scheduler<H, C> {
    /// `containers` is `None` when the container group is disabled.
    pub fn new(host: H, containers: Option<C>, config: SchedulerConfig) -> Self {
        let history = HistoryBuffer::with_default_window(config.refresh_interval_secs);
        Self {
            host,
            containers,
            config,
            rolling: RollingState {
                previous: None,
                current: None,
                history,
            },
            state: LoopState::Idle,
            sequence: 0,
            host_failing: false,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.rolling.history
    }

    pub fn refresh_interval_secs(&self) -> f64 {
        self.config.refresh_interval_secs
    }

    /// Most recent raw sample, if any tick has run.
    pub fn current_sample(&self) -> Option<&RawSample> {
        self.rolling.current.as_ref()
    }

    pub fn previous_sample(&self) -> Option<&RawSample> {
        self.rolling.previous.as_ref()
    }

    pub fn containers(&self) -> Option<&C> {
        self.containers.as_ref()
    }

    /// Applies a new refresh interval. History is re-sized and cleared when
    /// the value actually changes. Non-positive values are ignored. Without an
    /// explicit `docker.timeout_ms`, the container budget follows the interval.
    pub fn set_refresh_interval(&mut self, secs: f64) -> bool {
        if !secs.is_finite() || secs <= 0.0 {
            warn!(refresh_interval_secs = secs, "ignoring invalid refresh interval");
            return false;
        }
        self.config.refresh_interval_secs = secs;
        if self.config.docker_timeout_follows_refresh
            && let Some(containers) = self.containers.as_mut()
        {
            containers.set_timeout(Duration::from_secs_f64(secs));
        }
        let changed = self.rolling.history.set_refresh_interval(secs);
        if changed {
            info!(
                refresh_interval_secs = secs,
                history_capacity = self.rolling.history.capacity(),
                "refresh interval changed; history reset"
            );
        }
        changed
    }

    /// Captures host and container counters concurrently and folds them into a snapshot.
    pub async fn tick(&mut self) -> Snapshot {
        self.state = LoopState::Sampling;
        let started = Instant::now();

        let host_capture = self.host.capture();
        let (host, containers) = match self.containers.as_mut() {
            Some(c) => tokio::join!(host_capture, c.capture()),
            None => (host_capture.await, ContainerSample::disabled()),
        };
        let host = self.host_or_degraded(host);

        let sample = RawSample {
            taken_at: Instant::now(),
            timestamp: now_millis(),
            host,
            containers,
        };
        let snapshot = self.ingest(sample);

        let elapsed = started.elapsed();
        debug!(
            sequence = snapshot.sequence,
            metrics = snapshot.metrics.len(),
            containers = snapshot.containers.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "tick sampled"
        );
        if elapsed.as_secs_f64() > self.config.refresh_interval_secs {
            debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                "tick overran the refresh interval; next tick delayed"
            );
        }
        snapshot
    }

    fn host_or_degraded(&mut self, host: Result<HostSample, MonitorError>) -> HostSample {
        match host {
            Ok(h) => {
                if self.host_failing {
                    info!("host metrics readable again");
                    self.host_failing = false;
                }
                h
            }
            Err(e) => {
                if !self.host_failing {
                    warn!(error = %e, operation = "capture_host", "host metrics unavailable");
                    self.host_failing = true;
                } else {
                    debug!(error = %e, operation = "capture_host", "host metrics still unavailable");
                }
                HostSample {
                    failed_groups: vec!["host"],
                    ..Default::default()
                }
            }
        }
    }

    /// Computes rates against the previous sample, classifies, appends history
    /// and rotates the sample pair. `sample` becomes the new current sample.
    pub fn ingest(&mut self, sample: RawSample) -> Snapshot {
        self.sequence += 1;
        let sequence = self.sequence;
        let previous = self.rolling.current.as_ref();
        let dt = previous
            .map(|p| sample.taken_at.saturating_duration_since(p.taken_at))
            .unwrap_or(Duration::ZERO);

        let thresholds = self.config.thresholds;
        let mut metrics: BTreeMap<String, DerivedMetric> = rates::compute(previous, &sample, dt)
            .into_iter()
            .map(|r| {
                let severity = match r.value {
                    MetricValue::Percentage(v) => thresholds.classify(v),
                    MetricValue::Rate(_) => Severity::Healthy,
                };
                (
                    r.name.clone(),
                    DerivedMetric {
                        name: r.name,
                        value: r.value,
                        severity,
                        low_confidence: r.low_confidence,
                        sequence,
                    },
                )
            })
            .collect();

        let history = &mut self.rolling.history;
        for (name, metric) in metrics.iter().filter(|(k, _)| !is_process_key(k)) {
            history.append(name, metric);
        }
        // Series of a group that failed this tick have no value, not a vanished
        // entity: they keep their points and skip this append.
        let failed = &sample.host.failed_groups;
        let host_failed = failed.contains(&"host");
        let containers_unread = sample.containers.availability != RuntimeAvailability::Available
            && sample.containers.availability != RuntimeAvailability::Disabled;
        history.retain(|k| {
            if metrics.contains_key(k) {
                return true;
            }
            match host_group(k) {
                Some(group) => host_failed || failed.contains(&group),
                None => containers_unread && k.starts_with("container."),
            }
        });
        let history_view: BTreeMap<String, Vec<HistoryPoint>> = metrics
            .keys()
            .filter(|k| !is_process_key(k))
            .map(|k| (k.clone(), history.window(k)))
            .collect();

        let processes = process_views(&sample, &metrics, &self.config);
        let shown: HashSet<String> = processes
            .iter()
            .flat_map(|p| [process_key(p.pid, "cpu"), process_key(p.pid, "memory")])
            .collect();
        metrics.retain(|k, _| !is_process_key(k) || shown.contains(k));

        let snapshot = Snapshot {
            timestamp: sample.timestamp,
            sequence,
            refresh_interval_secs: self.config.refresh_interval_secs,
            partitions: partition_views(&sample, &metrics),
            processes,
            containers: container_views(&sample, &metrics),
            memory: sample.host.memory,
            load: sample.host.load,
            logical_cores: sample.host.logical_cores,
            physical_cores: sample.host.physical_cores,
            cpu_frequency: sample.host.frequency,
            container_runtime: sample.containers.availability,
            container_error: sample.containers.error.clone(),
            degraded: sample
                .host
                .failed_groups
                .iter()
                .map(|g| g.to_string())
                .collect(),
            metrics,
            history: history_view,
        };

        self.rolling.previous = self.rolling.current.replace(sample);
        snapshot
    }

    /// Single cycle for `--once`: tick, render, stop.
    pub async fn run_once<R: Renderer + ?Sized>(
        &mut self,
        renderer: &mut R,
    ) -> anyhow::Result<Snapshot> {
        let snapshot = self.tick().await;
        let rendered = renderer.render(&snapshot);
        self.state = LoopState::Stopped;
        rendered?;
        Ok(snapshot)
    }

    /// Ticks until `Control::Stop` arrives or every control sender is dropped.
    /// Stop requests are observed between ticks; a tick that overruns the
    /// interval delays the next one instead of overlapping it.
    pub async fn run<R: Renderer + ?Sized>(
        &mut self,
        renderer: &mut R,
        mut control: mpsc::Receiver<Control>,
    ) -> anyhow::Result<()> {
        let mut tick = interval(period(self.config.refresh_interval_secs));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            refresh_interval_secs = self.config.refresh_interval_secs,
            history_capacity = self.rolling.history.capacity(),
            "refresh loop started"
        );

        let result = loop {
            tokio::select! {
                biased;
                msg = control.recv() => match msg {
                    Some(Control::SetRefreshInterval(secs)) => {
                        if self.set_refresh_interval(secs) {
                            let p = period(secs);
                            tick = tokio::time::interval_at(tokio::time::Instant::now() + p, p);
                            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        }
                    }
                    Some(Control::Stop) | None => {
                        debug!("refresh loop stopping");
                        break Ok(());
                    }
                },
                _ = tick.tick() => {
                    let snapshot = self.tick().await;
                    if let Err(e) = renderer.render(&snapshot) {
                        break Err(e);
                    }
                    self.state = LoopState::Rendered;
                }
            }
        };
        self.state = LoopState::Stopped;
        result
    }
}

fn period(secs: f64) -> Duration {
    Duration::from_secs_f64(secs.max(0.001))
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(|e| {
            warn!(error = %e, operation = "get_timestamp", "system time error");
            0
        })
}

fn metric_value(metrics: &BTreeMap<String, DerivedMetric>, key: &str) -> (f64, Severity, bool) {
    metrics
        .get(key)
        .map(|m| (m.value.as_f64(), m.severity, m.low_confidence))
        .unwrap_or((0.0, Severity::Healthy, true))
}

fn partition_views(
    sample: &RawSample,
    metrics: &BTreeMap<String, DerivedMetric>,
) -> Vec<PartitionState> {
    sample
        .host
        .partitions
        .iter()
        .map(|p| {
            let (usage_percent, severity, _) = metric_value(metrics, &disk_key(&p.mount));
            PartitionState {
                mount: p.mount.clone(),
                device: p.device.clone(),
                fs_type: p.fs_type.clone(),
                used_bytes: p.used,
                total_bytes: p.total,
                usage_percent,
                severity,
            }
        })
        .collect()
}

fn process_views(
    sample: &RawSample,
    metrics: &BTreeMap<String, DerivedMetric>,
    config: &SchedulerConfig,
) -> Vec<ProcessState> {
    let Some(procs) = &sample.host.processes else {
        return Vec::new();
    };
    let mut views: Vec<ProcessState> = procs
        .values()
        .map(|p| {
            let (cpu_percent, cpu_severity, low_confidence) =
                metric_value(metrics, &process_key(p.pid, "cpu"));
            let (memory_percent, memory_severity, _) =
                metric_value(metrics, &process_key(p.pid, "memory"));
            ProcessState {
                pid: p.pid,
                name: p.name.clone(),
                status: p.status.clone(),
                cpu_percent,
                cpu_severity,
                memory_percent,
                memory_severity,
                resident_bytes: p.resident_bytes,
                low_confidence,
            }
        })
        .collect();
    views.sort_by(|a, b| {
        let (ka, kb) = match config.process_sort {
            ProcessSort::Cpu => ((a.cpu_percent, a.memory_percent), (b.cpu_percent, b.memory_percent)),
            ProcessSort::Memory => ((a.memory_percent, a.cpu_percent), (b.memory_percent, b.cpu_percent)),
        };
        kb.0.total_cmp(&ka.0)
            .then(kb.1.total_cmp(&ka.1))
            .then(a.pid.cmp(&b.pid))
    });
    views.truncate(config.top_processes);
    views
}

fn container_views(
    sample: &RawSample,
    metrics: &BTreeMap<String, DerivedMetric>,
) -> Vec<ContainerState> {
    let mut views: Vec<ContainerState> = sample
        .containers
        .containers
        .values()
        .map(|c| {
            let (cpu_percent, cpu_severity, low_confidence) =
                metric_value(metrics, &container_key(&c.id, "cpu"));
            let (memory_percent, memory_severity, _) =
                metric_value(metrics, &container_key(&c.id, "memory"));
            let (net_rx_bytes_per_sec, _, _) = metric_value(metrics, &container_key(&c.id, "net.rx"));
            let (net_tx_bytes_per_sec, _, _) = metric_value(metrics, &container_key(&c.id, "net.tx"));
            let (block_read_bytes_per_sec, _, _) =
                metric_value(metrics, &container_key(&c.id, "blk.read"));
            let (block_write_bytes_per_sec, _, _) =
                metric_value(metrics, &container_key(&c.id, "blk.write"));
            ContainerState {
                id: c.id.clone(),
                name: c.name.clone(),
                image: c.image.clone(),
                cpu_percent,
                cpu_severity,
                memory_bytes: c.memory_usage,
                memory_limit_bytes: c.memory_limit,
                memory_percent,
                memory_severity,
                net_rx_bytes_per_sec,
                net_tx_bytes_per_sec,
                block_read_bytes_per_sec,
                block_write_bytes_per_sec,
                running: c.running,
                low_confidence,
            }
        })
        .collect();
    views.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    views
}
