// Rate computation: differences two raw samples into percentages and byte rates.
//
// Pure functions of (previous, current, dt). Entities are matched by key (core
// index, pid, container id, interface name), never by position. Counters that
// went backwards are treated as a reset and yield 0 for that tick.

use crate::models::{ContainerCounters, CoreTimes, RawSample, Reading};
use std::time::Duration;

pub const CPU_OVERALL: &str = "cpu.overall";
pub const MEMORY_USED: &str = "memory.used";
pub const MEMORY_SWAP: &str = "memory.swap";
pub const LOAD_1M: &str = "load.1m";
pub const LOAD_5M: &str = "load.5m";
pub const LOAD_15M: &str = "load.15m";
pub const NET_RX: &str = "net.rx";
pub const NET_TX: &str = "net.tx";
pub const DISK_IO_READ: &str = "disk.io.read";
pub const DISK_IO_WRITE: &str = "disk.io.write";

pub fn core_key(index: usize) -> String {
    format!("cpu.core.{index}")
}

pub fn disk_key(mount: &str) -> String {
    format!("disk.{mount}")
}

pub fn interface_key(name: &str, direction: &str) -> String {
    format!("net.{name}.{direction}")
}

pub fn process_key(pid: u32, field: &str) -> String {
    format!("process.{pid}.{field}")
}

pub fn container_key(id: &str, field: &str) -> String {
    format!("container.{id}.{field}")
}

pub fn is_process_key(key: &str) -> bool {
    key.starts_with("process.")
}

/// Capture group a host metric belongs to, matching the names used in
/// `HostSample::failed_groups`. `None` for process and container keys.
pub fn host_group(key: &str) -> Option<&'static str> {
    let (prefix, _) = key.split_once('.')?;
    match prefix {
        "cpu" => Some("cpu"),
        "memory" => Some("memory"),
        "load" => Some("load"),
        "disk" => Some("disk"),
        "net" => Some("network"),
        _ => None,
    }
}

/// Busy share of elapsed ticks between two readings, in [0, 100].
/// Returns 0 when either counter went backwards or no ticks elapsed.
pub fn cpu_percent(previous: CoreTimes, current: CoreTimes) -> f64 {
    if current.busy < previous.busy || current.idle < previous.idle {
        return 0.0;
    }
    let busy = current.busy - previous.busy;
    let total = current.total().saturating_sub(previous.total());
    if total == 0 {
        return 0.0;
    }
    (busy as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Bytes per second between two cumulative readings, floored at 0 on reset.
pub fn byte_rate(previous: u64, current: u64, dt: Duration) -> f64 {
    let secs = dt.as_secs_f64();
    if current < previous || secs <= 0.0 {
        return 0.0;
    }
    (current - previous) as f64 / secs
}

/// `part / whole` as a percentage; 0 when `whole` is 0.
pub fn ratio_percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

/// Process CPU time over wall time, normalized to the whole machine.
pub fn process_cpu_percent(previous_ms: u64, current_ms: u64, dt: Duration, cores: usize) -> f64 {
    let wall_ms = dt.as_secs_f64() * 1000.0 * cores.max(1) as f64;
    if current_ms < previous_ms || wall_ms <= 0.0 {
        return 0.0;
    }
    ((current_ms - previous_ms) as f64 / wall_ms * 100.0).clamp(0.0, 100.0)
}

/// Container CPU share scaled by online CPUs, as `docker stats` reports it.
/// Ranges over [0, 100 * online_cpus].
pub fn container_cpu_percent(previous: &ContainerCounters, current: &ContainerCounters) -> f64 {
    if current.cpu_total_ns < previous.cpu_total_ns
        || current.system_cpu_ns < previous.system_cpu_ns
    {
        return 0.0;
    }
    let cpu_delta = current.cpu_total_ns - previous.cpu_total_ns;
    let system_delta = current.system_cpu_ns - previous.system_cpu_ns;
    if system_delta == 0 {
        return 0.0;
    }
    let online = current.online_cpus.max(1) as f64;
    (cpu_delta as f64 / system_delta as f64 * online * 100.0).clamp(0.0, 100.0 * online)
}

/// Derives every reading for one tick.
///
/// With no previous sample or a zero `dt`, rate-based readings are 0 and
/// flagged low-confidence; percentage-of-total readings are always computed.
pub fn compute(previous: Option<&RawSample>, current: &RawSample, dt: Duration) -> Vec<Reading> {
    let previous = previous.filter(|_| !dt.is_zero());
    let mut out = Vec::new();
    let host = &current.host;
    let prev_host = previous.map(|p| &p.host);

    if let Some(cpu) = &host.cpu {
        let prev_cpu = prev_host.and_then(|h| h.cpu.as_ref());
        out.push(match prev_cpu {
            Some(p) => Reading::percentage(CPU_OVERALL, cpu_percent(p.overall, cpu.overall)),
            None => Reading::percentage(CPU_OVERALL, 0.0).low_confidence(),
        });
        let mut cores: Vec<_> = cpu.cores.iter().collect();
        cores.sort_by_key(|(idx, _)| **idx);
        for (idx, times) in cores {
            let key = core_key(*idx);
            out.push(match prev_cpu.and_then(|p| p.cores.get(idx)) {
                Some(p) => Reading::percentage(key, cpu_percent(*p, *times)),
                None => Reading::percentage(key, 0.0).low_confidence(),
            });
        }
    }

    if let Some(mem) = &host.memory {
        out.push(Reading::percentage(
            MEMORY_USED,
            ratio_percent(mem.used, mem.total),
        ));
        out.push(Reading::percentage(
            MEMORY_SWAP,
            ratio_percent(mem.swap_used, mem.swap_total),
        ));
    }

    if let Some(load) = &host.load {
        let cores = host.logical_cores.max(1) as f64;
        for (key, value) in [(LOAD_1M, load.one), (LOAD_5M, load.five), (LOAD_15M, load.fifteen)] {
            out.push(Reading::percentage(key, (value / cores * 100.0).max(0.0)));
        }
    }

    for part in &host.partitions {
        out.push(Reading::percentage(
            disk_key(&part.mount),
            ratio_percent(part.used, part.total),
        ));
    }

    if let Some(io) = &host.disk_io {
        match prev_host.and_then(|h| h.disk_io.as_ref()) {
            Some(p) => {
                out.push(Reading::rate(DISK_IO_READ, byte_rate(p.read_bytes, io.read_bytes, dt)));
                out.push(Reading::rate(
                    DISK_IO_WRITE,
                    byte_rate(p.written_bytes, io.written_bytes, dt),
                ));
            }
            None => {
                out.push(Reading::rate(DISK_IO_READ, 0.0).low_confidence());
                out.push(Reading::rate(DISK_IO_WRITE, 0.0).low_confidence());
            }
        }
    }

    if !host.interfaces.is_empty() {
        let (mut rx_total, mut tx_total) = (0.0, 0.0);
        let mut names: Vec<_> = host.interfaces.keys().collect();
        names.sort();
        for name in names {
            let cur = host.interfaces[name];
            match prev_host.and_then(|h| h.interfaces.get(name)) {
                Some(p) => {
                    let rx = byte_rate(p.rx_bytes, cur.rx_bytes, dt);
                    let tx = byte_rate(p.tx_bytes, cur.tx_bytes, dt);
                    rx_total += rx;
                    tx_total += tx;
                    out.push(Reading::rate(interface_key(name, "rx"), rx));
                    out.push(Reading::rate(interface_key(name, "tx"), tx));
                }
                None => {
                    out.push(Reading::rate(interface_key(name, "rx"), 0.0).low_confidence());
                    out.push(Reading::rate(interface_key(name, "tx"), 0.0).low_confidence());
                }
            }
        }
        if prev_host.is_some() {
            out.push(Reading::rate(NET_RX, rx_total));
            out.push(Reading::rate(NET_TX, tx_total));
        } else {
            out.push(Reading::rate(NET_RX, 0.0).low_confidence());
            out.push(Reading::rate(NET_TX, 0.0).low_confidence());
        }
    }

    if let Some(procs) = &host.processes {
        let prev_procs = prev_host.and_then(|h| h.processes.as_ref());
        let mem_total = host.memory.map(|m| m.total).unwrap_or(0);
        let mut pids: Vec<_> = procs.keys().copied().collect();
        pids.sort_unstable();
        for pid in pids {
            let proc_ = &procs[&pid];
            // A reused pid with a different name is a new process.
            let prev = prev_procs
                .and_then(|p| p.get(&pid))
                .filter(|p| p.name == proc_.name);
            let cpu_key = process_key(pid, "cpu");
            out.push(match prev {
                Some(p) => Reading::percentage(
                    cpu_key,
                    process_cpu_percent(p.cpu_time_ms, proc_.cpu_time_ms, dt, host.logical_cores),
                ),
                None => Reading::percentage(cpu_key, 0.0).low_confidence(),
            });
            out.push(Reading::percentage(
                process_key(pid, "memory"),
                ratio_percent(proc_.resident_bytes, mem_total),
            ));
        }
    }

    let prev_containers = previous.map(|p| &p.containers.containers);
    let mut ids: Vec<_> = current.containers.containers.keys().collect();
    ids.sort();
    for id in ids {
        let c = &current.containers.containers[id];
        match prev_containers.and_then(|p| p.get(id)) {
            Some(p) => {
                out.push(Reading::percentage(
                    container_key(id, "cpu"),
                    container_cpu_percent(p, c),
                ));
                out.push(Reading::rate(
                    container_key(id, "net.rx"),
                    byte_rate(p.rx_bytes, c.rx_bytes, dt),
                ));
                out.push(Reading::rate(
                    container_key(id, "net.tx"),
                    byte_rate(p.tx_bytes, c.tx_bytes, dt),
                ));
                out.push(Reading::rate(
                    container_key(id, "blk.read"),
                    byte_rate(p.block_read_bytes, c.block_read_bytes, dt),
                ));
                out.push(Reading::rate(
                    container_key(id, "blk.write"),
                    byte_rate(p.block_write_bytes, c.block_write_bytes, dt),
                ));
            }
            None => {
                out.push(Reading::percentage(container_key(id, "cpu"), 0.0).low_confidence());
                for field in ["net.rx", "net.tx", "blk.read", "blk.write"] {
                    out.push(Reading::rate(container_key(id, field), 0.0).low_confidence());
                }
            }
        }
        out.push(Reading::percentage(
            container_key(id, "memory"),
            ratio_percent(c.memory_usage, c.memory_limit),
        ));
    }

    out
}
