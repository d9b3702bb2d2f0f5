//! Formatting helpers and summary logging.

use std::time::{Duration, Instant};

use bamidx_record::RecordVerdict;

use crate::index::IndexSummary;

/// Formats a count with comma thousands separators.
///
/// ```
/// use bamidx_lib::logging::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// ```
#[must_use]
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let groups: Vec<&str> = digits
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .collect();
    groups.join(",")
}

/// Formats a fraction (0.0-1.0) as a percentage.
///
/// ```
/// use bamidx_lib::logging::format_percent;
///
/// assert_eq!(format_percent(0.9543, 2), "95.43%");
/// ```
#[must_use]
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.decimals$}%", value * 100.0)
}

/// Formats a duration as "45s", "2m 15s" or "1h 30m".
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => match secs % 60 {
            0 => format!("{}m", secs / 60),
            rem => format!("{}m {rem}s", secs / 60),
        },
        _ => match (secs % 3600) / 60 {
            0 => format!("{}h", secs / 3600),
            mins => format!("{}h {mins}m", secs / 3600),
        },
    }
}

/// Formats a throughput, falling back to items/min below one per second.
#[must_use]
pub fn format_rate(count: u64, duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 0.001 {
        return format!("{} items/s", format_count(count));
    }
    let rate = count as f64 / secs;
    if rate >= 1.0 {
        format!("{} items/s", format_count(rate as u64))
    } else {
        format!("{:.1} items/min", rate * 60.0)
    }
}

/// Logs the start of an operation and, later, its completion with elapsed
/// time and throughput.
///
/// ```no_run
/// use bamidx_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Indexing records");
/// // ... do work ...
/// timer.log_completion(10_000);
/// ```
pub struct OperationTimer {
    operation: String,
    start_time: Instant,
}

impl OperationTimer {
    #[must_use]
    pub fn new(operation: &str) -> Self {
        log::info!("{operation} ...");
        Self { operation: operation.to_string(), start_time: Instant::now() }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn log_completion(&self, count: u64) {
        let duration = self.start_time.elapsed();
        log::info!(
            "{} completed: {} in {} ({})",
            self.operation,
            format_count(count),
            format_duration(duration),
            format_rate(count, duration)
        );
    }
}

/// Logs what went into a written index.
pub fn log_index_summary(summary: &IndexSummary) {
    log::info!("Index Summary:");
    log::info!(
        "  References with data: {} of {}",
        format_count(summary.references_with_data as u64),
        format_count(summary.references as u64)
    );
    log::info!("  Bins: {} ({} chunks)", format_count(summary.bins), format_count(summary.chunks));
    log::info!("  Linear index entries: {}", format_count(summary.linear_entries));
    log::info!("  Mapped records: {}", format_count(summary.mapped));
    log::info!("  Placed unmapped records: {}", format_count(summary.unmapped));
    if let Some(unplaced) = summary.unplaced_unmapped {
        log::info!("  Unplaced unmapped records: {}", format_count(unplaced));
    }
}

/// Logs a per-verdict table, most frequent first. Zero counts are skipped.
pub fn log_verdict_counts(counts: &[(RecordVerdict, u64)]) {
    let total: u64 = counts.iter().map(|(_, n)| n).sum();
    let mut sorted: Vec<_> = counts.iter().filter(|(_, n)| *n > 0).collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1));
    log::info!("Validation Summary ({} records):", format_count(total));
    for (verdict, count) in sorted {
        let share = if total == 0 { 0.0 } else { *count as f64 / total as f64 };
        log::info!(
            "  {:<28} {:>12} ({})",
            verdict.name(),
            format_count(*count),
            format_percent(share, 2)
        );
    }
}
