// ContainerStatsCollector state machine against fake runtimes, plus an
// optional check against a real Docker daemon.

mod common;

use common::*;
use std::time::{Duration, Instant};
use sysmon::docker_repo::{
    CollectorConfig, ContainerSource, ContainerStatsCollector, DockerRuntime, ProbeState,
};
use sysmon::models::RuntimeAvailability;

#[tokio::test]
async fn unavailable_runtime_yields_empty_sample() {
    let mut c = collector(FakeRuntime::down(), Duration::from_secs(1), 15);
    assert_eq!(c.state(), ProbeState::Unchecked);

    let sample = c.capture().await;
    assert_eq!(sample.availability, RuntimeAvailability::Unavailable);
    assert!(sample.containers.is_empty());
    assert!(sample.error.as_deref().unwrap_or("").contains("connection refused"));
    assert_eq!(c.state(), ProbeState::Unavailable);
}

#[tokio::test]
async fn unavailable_runtime_is_not_pinged_every_tick() {
    let mut c = collector(FakeRuntime::down(), Duration::from_secs(1), 5);
    c.capture().await;
    assert_eq!(c.runtime().ping_count(), 1);

    for _ in 0..4 {
        let sample = c.capture().await;
        assert!(sample.containers.is_empty());
    }
    assert_eq!(c.runtime().ping_count(), 1);

    // Fifth tick after the failed probe re-probes.
    c.capture().await;
    assert_eq!(c.runtime().ping_count(), 2);
}

#[tokio::test]
async fn runtime_recovers_on_reprobe() {
    let runtime = FakeRuntime::down();
    runtime.set_containers(vec![container("abc", "web", 100, 1_000)]);
    let mut c = collector(runtime, Duration::from_secs(1), 2);

    assert!(c.capture().await.containers.is_empty());
    c.runtime()
        .available
        .store(true, std::sync::atomic::Ordering::SeqCst);

    // Still backing off.
    let sample = c.capture().await;
    assert_eq!(sample.availability, RuntimeAvailability::Unavailable);

    let sample = c.capture().await;
    assert_eq!(sample.availability, RuntimeAvailability::Available);
    assert_eq!(c.state(), ProbeState::Available);
    assert!(c.last_error().is_none());
    assert_eq!(sample.containers["abc"].name, "web");
}

#[tokio::test]
async fn available_runtime_lists_running_containers() {
    let runtime = FakeRuntime::up(vec![
        container("a1", "web", 10, 100),
        container("b2", "db", 20, 100),
    ]);
    let mut c = collector(runtime, Duration::from_secs(1), 15);
    let sample = c.capture().await;
    assert_eq!(sample.availability, RuntimeAvailability::Available);
    assert_eq!(sample.containers.len(), 2);
    assert_eq!(c.runtime().ping_count(), 1);

    // Available: no ping on later ticks.
    c.capture().await;
    assert_eq!(c.runtime().ping_count(), 1);
}

#[tokio::test]
async fn runtime_going_away_mid_session_marks_unavailable() {
    let runtime = FakeRuntime::up(vec![container("a1", "web", 10, 100)]);
    let mut c = collector(runtime, Duration::from_secs(1), 15);
    assert_eq!(c.capture().await.containers.len(), 1);

    c.runtime()
        .available
        .store(false, std::sync::atomic::Ordering::SeqCst);
    let sample = c.capture().await;
    assert_eq!(sample.availability, RuntimeAvailability::Unavailable);
    assert!(sample.containers.is_empty());
    assert_eq!(c.state(), ProbeState::Unavailable);
}

#[tokio::test]
async fn stalled_runtime_is_bounded_by_timeout() {
    let mut c = collector(FakeRuntime::stalled(), Duration::from_millis(200), 15);
    let started = Instant::now();
    let sample = c.capture().await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(sample.availability, RuntimeAvailability::Unavailable);
    assert!(sample.containers.is_empty());
    assert!(sample.error.as_deref().unwrap_or("").contains("200 ms"));
}

#[tokio::test]
async fn stall_after_probe_is_bounded_by_the_same_deadline() {
    let runtime = FakeRuntime::up(vec![container("a1", "web", 10, 100)]);
    let mut c = collector(runtime, Duration::from_millis(200), 15);
    c.capture().await;

    c.runtime()
        .stall
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let started = Instant::now();
    let sample = c.capture().await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(sample.containers.is_empty());
    assert_eq!(c.state(), ProbeState::Unavailable);
}

#[tokio::test]
async fn real_docker_capture_when_available() {
    let mut c = ContainerStatsCollector::new(
        DockerRuntime::connect(),
        CollectorConfig {
            timeout: Duration::from_secs(5),
            reprobe_every_ticks: 15,
        },
    );
    let sample = c.capture().await;
    if sample.availability != RuntimeAvailability::Available {
        return; // Skip when Docker is not available (e.g. CI without Docker)
    }
    for (id, counters) in &sample.containers {
        assert_eq!(id, &counters.id);
        assert!(counters.online_cpus >= 1);
    }
}
