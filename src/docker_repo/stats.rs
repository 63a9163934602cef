// Turn one raw Docker stats API response into cumulative container counters.

use super::ContainerListing;
use crate::models::ContainerCounters;
use bollard::models::ContainerStatsResponse;

/// Extract counters from a one-shot stats response. Returns `None` when the
/// response has no CPU section (container stopped mid-read).
pub(crate) fn process_statistics(
    s: &ContainerStatsResponse,
    listing: &ContainerListing,
) -> Option<ContainerCounters> {
    let cpu_stats = s.cpu_stats.as_ref()?;
    let cpu_usage = cpu_stats.cpu_usage.as_ref()?;

    let cpu_total_ns = cpu_usage.total_usage.unwrap_or(0);
    let system_cpu_ns = cpu_stats.system_cpu_usage.unwrap_or(0);
    let online_cpus = match cpu_stats.online_cpus.map(|n| n as u32).unwrap_or(0) {
        0 => cpu_usage
            .percpu_usage
            .as_ref()
            .map(|v| v.len() as u32)
            .unwrap_or(1)
            .max(1),
        n => n,
    };

    let memory = s.memory_stats.as_ref();
    let mem_usage = memory.and_then(|m| m.usage).unwrap_or(0);
    let mem_limit = memory.and_then(|m| m.limit).unwrap_or(0);
    // Page cache is reclaimable; cgroup v1 reports it as "cache", v2 as "inactive_file".
    let cache = memory
        .and_then(|m| m.stats.as_ref())
        .and_then(|st| st.get("cache").or_else(|| st.get("inactive_file")))
        .copied()
        .unwrap_or(0);

    let (rx_bytes, tx_bytes) = s.networks.as_ref().map_or((0u64, 0u64), |n| {
        n.values().fold((0u64, 0u64), |(rx, tx), v| {
            (
                rx.saturating_add(v.rx_bytes.unwrap_or(0)),
                tx.saturating_add(v.tx_bytes.unwrap_or(0)),
            )
        })
    });

    let (block_read_bytes, block_write_bytes) = s
        .blkio_stats
        .as_ref()
        .and_then(|b| b.io_service_bytes_recursive.as_ref())
        .map_or((0u64, 0u64), |b| {
            let mut read = 0u64;
            let mut write = 0u64;
            for e in b {
                if e.op
                    .as_ref()
                    .is_some_and(|op| op.eq_ignore_ascii_case("read"))
                {
                    read += e.value.unwrap_or(0);
                } else if e
                    .op
                    .as_ref()
                    .is_some_and(|op| op.eq_ignore_ascii_case("write"))
                {
                    write += e.value.unwrap_or(0);
                }
            }
            (read, write)
        });

    Some(ContainerCounters {
        id: listing.id.clone(),
        name: listing.name.clone(),
        image: listing.image.clone(),
        cpu_total_ns,
        system_cpu_ns,
        online_cpus,
        memory_usage: mem_usage.saturating_sub(cache),
        memory_limit: mem_limit,
        rx_bytes,
        tx_bytes,
        block_read_bytes,
        block_write_bytes,
        running: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{
        ContainerBlkioStatEntry, ContainerBlkioStats, ContainerCpuStats, ContainerCpuUsage,
        ContainerMemoryStats, ContainerNetworkStats, ContainerStatsResponse,
    };
    use std::collections::HashMap;

    fn listing() -> ContainerListing {
        ContainerListing {
            id: "abc123".into(),
            name: "web".into(),
            image: "nginx:latest".into(),
        }
    }

    fn cpu_stats(total_usage: u64, system_cpu_usage: u64, online: u32) -> ContainerCpuStats {
        ContainerCpuStats {
            cpu_usage: Some(ContainerCpuUsage {
                total_usage: Some(total_usage),
                ..Default::default()
            }),
            system_cpu_usage: Some(system_cpu_usage),
            online_cpus: Some(online),
            throttling_data: None,
        }
    }

    #[test]
    fn process_statistics_returns_none_when_cpu_stats_missing() {
        let s = ContainerStatsResponse {
            cpu_stats: None,
            ..Default::default()
        };
        assert!(process_statistics(&s, &listing()).is_none());
    }

    #[test]
    fn process_statistics_extracts_counters() {
        let s = ContainerStatsResponse {
            cpu_stats: Some(cpu_stats(100_000_000, 1_000_000_000, 2)),
            memory_stats: Some(ContainerMemoryStats {
                usage: Some(256 * 1024 * 1024),
                limit: Some(512 * 1024 * 1024),
                ..Default::default()
            }),
            networks: Some({
                let mut m = HashMap::new();
                m.insert(
                    "eth0".to_string(),
                    ContainerNetworkStats {
                        rx_bytes: Some(1000),
                        tx_bytes: Some(2000),
                        ..Default::default()
                    },
                );
                m.insert(
                    "eth1".to_string(),
                    ContainerNetworkStats {
                        rx_bytes: Some(10),
                        tx_bytes: Some(20),
                        ..Default::default()
                    },
                );
                m
            }),
            blkio_stats: Some(ContainerBlkioStats {
                io_service_bytes_recursive: Some(vec![
                    ContainerBlkioStatEntry {
                        op: Some("Read".to_string()),
                        value: Some(100),
                        ..Default::default()
                    },
                    ContainerBlkioStatEntry {
                        op: Some("write".to_string()),
                        value: Some(200),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let out = process_statistics(&s, &listing()).unwrap();
        assert_eq!(out.id, "abc123");
        assert_eq!(out.name, "web");
        assert_eq!(out.image, "nginx:latest");
        assert_eq!(out.cpu_total_ns, 100_000_000);
        assert_eq!(out.system_cpu_ns, 1_000_000_000);
        assert_eq!(out.online_cpus, 2);
        assert_eq!(out.memory_usage, 256 * 1024 * 1024);
        assert_eq!(out.memory_limit, 512 * 1024 * 1024);
        assert_eq!(out.rx_bytes, 1010);
        assert_eq!(out.tx_bytes, 2020);
        assert_eq!(out.block_read_bytes, 100);
        assert_eq!(out.block_write_bytes, 200);
        assert!(out.running);
    }

    #[test]
    fn process_statistics_subtracts_page_cache() {
        let s = ContainerStatsResponse {
            cpu_stats: Some(cpu_stats(1, 1, 1)),
            memory_stats: Some(ContainerMemoryStats {
                usage: Some(1000),
                limit: Some(4000),
                stats: Some(HashMap::from([("cache".to_string(), 400u64)])),
                ..Default::default()
            }),
            ..Default::default()
        };
        let out = process_statistics(&s, &listing()).unwrap();
        assert_eq!(out.memory_usage, 600);
    }

    #[test]
    fn process_statistics_falls_back_to_percpu_count() {
        let s = ContainerStatsResponse {
            cpu_stats: Some(ContainerCpuStats {
                cpu_usage: Some(ContainerCpuUsage {
                    total_usage: Some(10),
                    percpu_usage: Some(vec![1, 2, 3, 4]),
                    ..Default::default()
                }),
                system_cpu_usage: Some(100),
                online_cpus: Some(0),
                throttling_data: None,
            }),
            ..Default::default()
        };
        let out = process_statistics(&s, &listing()).unwrap();
        assert_eq!(out.online_cpus, 4);
    }
}
