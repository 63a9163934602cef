// Linux-specific helpers: raw CPU tick counters from /proc/stat, and the
// cpufreq ceiling from sysfs.

use crate::error::MonitorError;
use crate::models::{CoreTimes, CpuTimes};

/// Read aggregate and per-core busy/idle ticks from /proc/stat.
pub(super) fn read_cpu_times() -> Result<CpuTimes, MonitorError> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/proc/stat")
            .map_err(|e| MonitorError::source_unavailable("cpu", format!("/proc/stat: {e}")))?;
        parse_proc_stat(&content)
            .ok_or_else(|| MonitorError::source_unavailable("cpu", "no cpu lines in /proc/stat"))
    }
    #[cfg(not(target_os = "linux"))]
    Err(MonitorError::source_unavailable(
        "cpu",
        "per-core tick counters need /proc/stat",
    ))
}

/// Parse the `cpu` and `cpuN` lines of /proc/stat.
///
/// busy = user + nice + system + irq + softirq + steal, idle = idle + iowait.
/// guest time is already folded into user by the kernel.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_proc_stat(content: &str) -> Option<CpuTimes> {
    let mut overall = None;
    let mut cpu = CpuTimes::default();
    for line in content.lines() {
        let Some(rest) = line.strip_prefix("cpu") else {
            continue;
        };
        let mut fields = rest.split_whitespace();
        let label = if rest.starts_with(char::is_whitespace) {
            None
        } else {
            fields.next()
        };
        let v: Vec<u64> = fields.filter_map(|x| x.parse().ok()).collect();
        if v.len() < 4 {
            continue;
        }
        let at = |i: usize| v.get(i).copied().unwrap_or(0);
        let times = CoreTimes::new(
            at(0) + at(1) + at(2) + at(5) + at(6) + at(7),
            at(3) + at(4),
        );
        match label {
            None => overall = Some(times),
            Some(idx) => {
                if let Ok(idx) = idx.parse::<usize>() {
                    cpu.cores.insert(idx, times);
                }
            }
        }
    }
    cpu.overall = overall?;
    Some(cpu)
}

/// Highest frequency any core can reach, in MHz, from the cpufreq driver.
/// `None` when no driver is loaded (most VMs and containers).
pub(super) fn read_max_frequency_mhz() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let entries = std::fs::read_dir("/sys/devices/system/cpu").ok()?;
        entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|n| n.strip_prefix("cpu"))
                    .is_some_and(|idx| idx.parse::<usize>().is_ok())
            })
            .filter_map(|e| {
                let content =
                    std::fs::read_to_string(e.path().join("cpufreq/cpuinfo_max_freq")).ok()?;
                parse_khz_as_mhz(&content)
            })
            .max()
    }
    #[cfg(not(target_os = "linux"))]
    None
}

/// cpufreq files hold kHz.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_khz_as_mhz(content: &str) -> Option<u64> {
    content
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|khz| *khz > 0)
        .map(|khz| khz / 1000)
}
