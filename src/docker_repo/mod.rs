// Docker container stats via bollard, isolated behind a probe/backoff state
// machine so a missing or stalled daemon never holds up a tick.

mod stats;

use crate::error::MonitorError;
use crate::models::{ContainerCounters, ContainerSample, RuntimeAvailability};
use bollard::Docker;
use bollard::query_parameters::{ListContainersOptions, StatsOptions};
use futures_util::StreamExt;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, instrument, warn};

/// Default number of ticks between re-probes of an unavailable runtime.
pub const DEFAULT_REPROBE_EVERY_TICKS: u64 = 15;

/// A running container as listed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerListing {
    pub id: String,
    pub name: String,
    pub image: String,
}

/// Client capability the collector needs from a container runtime.
pub trait ContainerRuntime: Send + Sync {
    fn ping(&self) -> impl Future<Output = Result<(), MonitorError>> + Send;

    fn list_running(
        &self,
    ) -> impl Future<Output = Result<Vec<ContainerListing>, MonitorError>> + Send;

    fn stats(
        &self,
        container: &ContainerListing,
    ) -> impl Future<Output = Result<ContainerCounters, MonitorError>> + Send;
}

/// Capability to capture the container set once per tick. Never fails: an
/// unreachable runtime yields an empty, unavailable sample.
pub trait ContainerSource: Send {
    fn capture(&mut self) -> impl Future<Output = ContainerSample> + Send;

    /// Replaces the per-capture budget, effective from the next capture.
    fn set_timeout(&mut self, timeout: Duration);
}

/// bollard-backed runtime over the local socket.
pub struct DockerRuntime {
    docker: Option<Docker>,
    connect_error: String,
}

impl DockerRuntime {
    /// Builds the client without touching the socket; reachability is decided by `ping`.
    pub fn connect() -> Self {
        match Docker::connect_with_local_defaults() {
            Ok(docker) => Self {
                docker: Some(docker),
                connect_error: String::new(),
            },
            Err(e) => Self {
                docker: None,
                connect_error: e.to_string(),
            },
        }
    }

    fn client(&self) -> Result<&Docker, MonitorError> {
        self.docker
            .as_ref()
            .ok_or_else(|| MonitorError::runtime(&self.connect_error))
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), MonitorError> {
        self.client()?
            .ping()
            .await
            .map(|_| ())
            .map_err(MonitorError::runtime)
    }

    async fn list_running(&self) -> Result<Vec<ContainerListing>, MonitorError> {
        let mut filters = HashMap::new();
        filters.insert("status".to_string(), vec!["running".to_string()]);

        let filter = ListContainersOptions {
            all: false,
            filters: Some(filters),
            ..Default::default()
        };

        let containers = self
            .client()?
            .list_containers(Some(filter))
            .await
            .map_err(MonitorError::runtime)?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .as_ref()
                    .and_then(|n| n.first())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| id.chars().take(12).collect());
                Some(ContainerListing {
                    name,
                    image: c.image.unwrap_or_default(),
                    id,
                })
            })
            .collect())
    }

    async fn stats(&self, container: &ContainerListing) -> Result<ContainerCounters, MonitorError> {
        let options = StatsOptions {
            stream: false,
            one_shot: true,
        };
        let mut stream = self.client()?.stats(&container.id, Some(options));
        match stream.next().await {
            Some(Ok(s)) => stats::process_statistics(&s, container).ok_or_else(|| {
                MonitorError::runtime(format!("incomplete stats for {}", container.name))
            }),
            Some(Err(e)) => Err(MonitorError::runtime(e)),
            None => Err(MonitorError::runtime(format!(
                "empty stats stream for {}",
                container.name
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Unchecked,
    Available,
    Unavailable,
}

#[derive(Debug, Clone, Copy)]
pub struct CollectorConfig {
    /// Budget for one capture, probe included.
    pub timeout: Duration,
    /// While unavailable, re-probe once every this many ticks.
    pub reprobe_every_ticks: u64,
}

pub struct ContainerStatsCollector<R> {
    runtime: R,
    config: CollectorConfig,
    state: ProbeState,
    last_error: Option<String>,
    ticks_since_probe: u64,
}

impl<R: ContainerRuntime> ContainerStatsCollector<R> {
    pub fn new(runtime: R, config: CollectorConfig) -> Self {
        Self {
            runtime,
            config: CollectorConfig {
                timeout: config.timeout,
                reprobe_every_ticks: config.reprobe_every_ticks.max(1),
            },
            state: ProbeState::Unchecked,
            last_error: None,
            ticks_since_probe: 0,
        }
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn probe(&mut self, deadline: Instant) -> bool {
        self.ticks_since_probe = 0;
        match timeout_at(deadline, self.runtime.ping()).await {
            Ok(Ok(())) => {
                if self.state == ProbeState::Unavailable {
                    info!("container runtime reachable again");
                }
                self.state = ProbeState::Available;
                self.last_error = None;
                true
            }
            Ok(Err(e)) => {
                self.mark_unavailable(e.to_string());
                false
            }
            Err(_) => {
                self.mark_unavailable(self.timeout_reason());
                false
            }
        }
    }

    /// Logs only on the transition; repeated failures while down stay at debug.
    fn mark_unavailable(&mut self, reason: String) {
        if self.state == ProbeState::Unavailable {
            debug!(error = %reason, "container runtime still unavailable");
        } else {
            warn!(
                error = %reason,
                reprobe_every_ticks = self.config.reprobe_every_ticks,
                "container runtime unavailable; container metrics paused"
            );
        }
        self.state = ProbeState::Unavailable;
        self.last_error = Some(reason);
        self.ticks_since_probe = 0;
    }

    fn timeout_reason(&self) -> String {
        format!(
            "no response within {} ms",
            self.config.timeout.as_millis()
        )
    }

    fn unavailable_sample(&self) -> ContainerSample {
        ContainerSample::unavailable(self.last_error.clone())
    }

    async fn collect(&self) -> Result<HashMap<String, ContainerCounters>, MonitorError> {
        let listings = self.runtime.list_running().await?;
        let results = join_all(listings.iter().map(|l| self.runtime.stats(l))).await;
        let mut out = HashMap::with_capacity(listings.len());
        for (listing, result) in listings.iter().zip(results) {
            match result {
                Ok(counters) => {
                    out.insert(counters.id.clone(), counters);
                }
                // Usually the container stopped between list and stats.
                Err(e) => debug!(container = %listing.name, error = %e, "container stats skipped"),
            }
        }
        Ok(out)
    }
}

impl<R: ContainerRuntime> ContainerSource for ContainerStatsCollector<R> {
    #[instrument(skip(self), fields(repo = "docker", operation = "capture"))]
    async fn capture(&mut self) -> ContainerSample {
        let deadline = Instant::now() + self.config.timeout;
        match self.state {
            ProbeState::Available => {}
            ProbeState::Unchecked => {
                if !self.probe(deadline).await {
                    return self.unavailable_sample();
                }
            }
            ProbeState::Unavailable => {
                self.ticks_since_probe += 1;
                if self.ticks_since_probe < self.config.reprobe_every_ticks {
                    return self.unavailable_sample();
                }
                debug!("re-probing container runtime");
                if !self.probe(deadline).await {
                    return self.unavailable_sample();
                }
            }
        }

        match timeout_at(deadline, self.collect()).await {
            Ok(Ok(containers)) => ContainerSample {
                availability: RuntimeAvailability::Available,
                error: None,
                containers,
            },
            Ok(Err(e)) => {
                self.mark_unavailable(e.to_string());
                self.unavailable_sample()
            }
            Err(_) => {
                let reason = self.timeout_reason();
                self.mark_unavailable(reason);
                self.unavailable_sample()
            }
        }
    }

    fn set_timeout(&mut self, timeout: Duration) {
        if timeout != self.config.timeout {
            debug!(timeout_ms = timeout.as_millis() as u64, "container capture budget changed");
            self.config.timeout = timeout;
        }
    }
}
