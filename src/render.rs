// Snapshot consumers used by the binary. Layout is deliberately thin: one
// JSON object per tick, or a compact plain-text summary.

use crate::models::{HistoryPoint, RuntimeAvailability, Severity, Snapshot};
use crate::rates::{
    CPU_OVERALL, DISK_IO_READ, DISK_IO_WRITE, LOAD_1M, MEMORY_SWAP, MEMORY_USED, NET_RX, NET_TX,
};
use std::io::Write;

const SPARK_BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Consumes one snapshot per tick.
pub trait Renderer {
    fn render(&mut self, snapshot: &Snapshot) -> anyhow::Result<()>;
}

/// One camelCase JSON object per line.
pub struct JsonRenderer<W: Write> {
    out: W,
}

impl<W: Write> JsonRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for JsonRenderer<W> {
    fn render(&mut self, snapshot: &Snapshot) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.out, snapshot)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Plain-text panel per tick: value, status label and a sparkline per row.
pub struct SummaryRenderer<W: Write> {
    out: W,
}

impl<W: Write> SummaryRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for SummaryRenderer<W> {
    fn render(&mut self, s: &Snapshot) -> anyhow::Result<()> {
        let text = format_summary(s);
        self.out.write_all(text.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

/// Builds the summary text for one snapshot.
pub fn format_summary(s: &Snapshot) -> String {
    let mut lines = Vec::new();
    let when = chrono::DateTime::from_timestamp_millis(s.timestamp as i64)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "-".to_string());
    lines.push(format!(
        "== sysmon {when} (tick {}, every {:.1}s) ==",
        s.sequence, s.refresh_interval_secs
    ));

    for (label, key) in [("CPU", CPU_OVERALL), ("MEM", MEMORY_USED), ("SWAP", MEMORY_SWAP)] {
        if let Some(m) = s.metric(key) {
            lines.push(percent_row(label, m.value.as_f64(), m.severity, m.low_confidence, s.history(key)));
        }
    }

    if let Some(freq) = s.cpu_frequency {
        let max = freq
            .max_mhz
            .map(|m| format!(" / {m} MHz max"))
            .unwrap_or_default();
        let cores = match s.physical_cores {
            Some(p) => format!("{p} physical, {} logical", s.logical_cores),
            None => format!("{} logical", s.logical_cores),
        };
        lines.push(format!("{:<6}{} MHz{max}  ({cores})", "FREQ", freq.current_mhz));
    }

    if let (Some(load), Some(m)) = (s.load, s.metric(LOAD_1M)) {
        lines.push(format!(
            "{:<6}{:.2} {:.2} {:.2}  ({:.1}% of {} cores) {}",
            "LOAD",
            load.one,
            load.five,
            load.fifteen,
            m.value.as_f64(),
            s.logical_cores,
            m.severity.label()
        ));
    }

    for p in &s.partitions {
        lines.push(format!(
            "{:<6}{:<16}{:>6.1}% {:<9}{} / {}",
            "DISK",
            p.mount,
            p.usage_percent,
            p.severity.label(),
            format_bytes(p.used_bytes),
            format_bytes(p.total_bytes)
        ));
    }

    if let (Some(r), Some(w)) = (s.metric(DISK_IO_READ), s.metric(DISK_IO_WRITE)) {
        lines.push(format!(
            "{:<6}read {}/s  write {}/s",
            "IO",
            format_bytes(r.value.as_f64() as u64),
            format_bytes(w.value.as_f64() as u64)
        ));
    }

    if let (Some(rx), Some(tx)) = (s.metric(NET_RX), s.metric(NET_TX)) {
        lines.push(format!(
            "{:<6}rx {}/s  tx {}/s",
            "NET",
            format_bytes(rx.value.as_f64() as u64),
            format_bytes(tx.value.as_f64() as u64)
        ));
    }

    if !s.processes.is_empty() {
        lines.push(format!(
            "{:<6}{:>7} {:<20}{:>7} {:>7}  {}",
            "PROC", "PID", "NAME", "CPU%", "MEM%", "STATUS"
        ));
        for p in &s.processes {
            lines.push(format!(
                "{:<6}{:>7} {:<20}{:>7.1} {:>7.1}  {}",
                "",
                p.pid,
                truncate(&p.name, 19),
                p.cpu_percent,
                p.memory_percent,
                p.status
            ));
        }
    }

    match s.container_runtime {
        RuntimeAvailability::Disabled => {}
        RuntimeAvailability::Available => {
            lines.push(format!("{:<6}{} running", "DOCKER", s.running_containers()));
            for c in &s.containers {
                lines.push(format!(
                    "{:<6}{:<20}{:>7.1}% {:<9}{} / {}  rx {}/s tx {}/s  blk r {}/s w {}/s",
                    "",
                    truncate(&c.name, 19),
                    c.cpu_percent,
                    c.cpu_severity.label(),
                    format_bytes(c.memory_bytes),
                    format_bytes(c.memory_limit_bytes),
                    format_bytes(c.net_rx_bytes_per_sec as u64),
                    format_bytes(c.net_tx_bytes_per_sec as u64),
                    format_bytes(c.block_read_bytes_per_sec as u64),
                    format_bytes(c.block_write_bytes_per_sec as u64)
                ));
            }
        }
        RuntimeAvailability::Unchecked | RuntimeAvailability::Unavailable => {
            let reason = s.container_error.as_deref().unwrap_or("not reachable");
            lines.push(format!("{:<6}Docker not available: {reason}", "DOCKER"));
        }
    }

    if !s.degraded.is_empty() {
        lines.push(format!("{:<6}unavailable: {}", "WARN", s.degraded.join(", ")));
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn percent_row(
    label: &str,
    value: f64,
    severity: Severity,
    low_confidence: bool,
    history: &[HistoryPoint],
) -> String {
    let marker = if low_confidence { "~" } else { " " };
    format!(
        "{label:<6}{value:>6.1}%{marker}{:<9}{}",
        severity.label(),
        sparkline(history)
    )
}

/// One bar per point, scaled over 0-100. Partially filled series stay short.
pub fn sparkline(points: &[HistoryPoint]) -> String {
    points
        .iter()
        .map(|p| {
            let v = if p.value.is_finite() { p.value.clamp(0.0, 100.0) } else { 0.0 };
            let idx = ((v / 100.0) * (SPARK_BARS.len() - 1) as f64).round() as usize;
            SPARK_BARS[idx.min(SPARK_BARS.len() - 1)]
        })
        .collect()
}

/// Human-readable size with binary units, e.g. `1.5 GB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerState, CpuFrequency, DerivedMetric, MetricValue};
    use std::collections::BTreeMap;

    fn snapshot() -> Snapshot {
        let mut metrics = BTreeMap::new();
        metrics.insert(
            CPU_OVERALL.to_string(),
            DerivedMetric {
                name: CPU_OVERALL.to_string(),
                value: MetricValue::Percentage(71.43),
                severity: Severity::Warning,
                low_confidence: false,
                sequence: 2,
            },
        );
        let mut history = BTreeMap::new();
        history.insert(
            CPU_OVERALL.to_string(),
            vec![
                HistoryPoint { sequence: 1, value: 0.0, severity: Severity::Healthy },
                HistoryPoint { sequence: 2, value: 71.43, severity: Severity::Warning },
            ],
        );
        Snapshot {
            timestamp: 1_700_000_000_000,
            sequence: 2,
            refresh_interval_secs: 2.0,
            metrics,
            history,
            memory: None,
            load: None,
            logical_cores: 4,
            physical_cores: Some(2),
            cpu_frequency: Some(CpuFrequency {
                current_mhz: 2400,
                max_mhz: Some(3600),
            }),
            partitions: Vec::new(),
            processes: Vec::new(),
            containers: Vec::new(),
            container_runtime: RuntimeAvailability::Unavailable,
            container_error: Some("connection refused".into()),
            degraded: vec!["cpu".into()],
        }
    }

    #[test]
    fn format_bytes_uses_binary_units() {
        assert_eq!(format_bytes(0), "0.0 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn sparkline_has_one_bar_per_point() {
        let points: Vec<HistoryPoint> = [0.0, 50.0, 100.0, 250.0]
            .iter()
            .enumerate()
            .map(|(i, v)| HistoryPoint {
                sequence: i as u64,
                value: *v,
                severity: Severity::Healthy,
            })
            .collect();
        assert_eq!(sparkline(&points), "▁▅██");
        assert_eq!(sparkline(&[]), "");
    }

    #[test]
    fn summary_shows_labels_and_docker_reason() {
        let text = format_summary(&snapshot());
        assert!(text.contains("71.4%"));
        assert!(text.contains("WARNING"));
        assert!(text.contains("Docker not available: connection refused"));
        assert!(text.contains("unavailable: cpu"));
    }

    #[test]
    fn summary_shows_frequency_and_disk_io() {
        let mut s = snapshot();
        for (key, value) in [(DISK_IO_READ, 2048.0), (DISK_IO_WRITE, 1024.0)] {
            s.metrics.insert(
                key.to_string(),
                DerivedMetric {
                    name: key.to_string(),
                    value: MetricValue::Rate(value),
                    severity: Severity::Healthy,
                    low_confidence: false,
                    sequence: 2,
                },
            );
        }
        let text = format_summary(&s);
        assert!(text.contains("2400 MHz / 3600 MHz max  (2 physical, 4 logical)"));
        assert!(text.contains("read 2.0 KB/s  write 1.0 KB/s"));
    }

    #[test]
    fn summary_shows_container_block_io() {
        let mut s = snapshot();
        s.container_runtime = RuntimeAvailability::Available;
        s.container_error = None;
        s.containers.push(ContainerState {
            id: "abc".into(),
            name: "db".into(),
            image: "postgres:16".into(),
            cpu_percent: 12.0,
            cpu_severity: Severity::Healthy,
            memory_bytes: 1024,
            memory_limit_bytes: 4096,
            memory_percent: 25.0,
            memory_severity: Severity::Healthy,
            net_rx_bytes_per_sec: 0.0,
            net_tx_bytes_per_sec: 0.0,
            block_read_bytes_per_sec: 1536.0,
            block_write_bytes_per_sec: 512.0,
            running: true,
            low_confidence: false,
        });
        let text = format_summary(&s);
        assert!(text.contains("1 running"));
        assert!(text.contains("blk r 1.5 KB/s w 512.0 B/s"));
    }

    #[test]
    fn json_renderer_writes_one_line_per_snapshot() {
        let mut r = JsonRenderer::new(Vec::new());
        r.render(&snapshot()).unwrap();
        r.render(&snapshot()).unwrap();
        let out = String::from_utf8(r.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let v: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(v["containerRuntime"], "unavailable");
        assert_eq!(v["metrics"]["cpu.overall"]["value"]["kind"], "percentage");
    }
}
