use std::time::{Duration, Instant};

use tracing::{debug, info};

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Throttled progress logging for a generation run.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    total: u64,
    done: u64,
    started: Instant,
    last_report: Instant,
    interval: Duration,
    verbose: bool,
}

impl ProgressReporter {
    pub fn new(total: u64) -> Self {
        let now = Instant::now();
        Self {
            total,
            done: 0,
            started: now,
            last_report: now,
            interval: REPORT_INTERVAL,
            verbose: false,
        }
    }

    /// Log at info level instead of debug.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn rows_done(&self) -> u64 {
        self.done
    }

    pub fn add(&mut self, rows: u64) {
        self.done = self.done.saturating_add(rows);
        let now = Instant::now();
        if now.duration_since(self.last_report) >= self.interval {
            self.last_report = now;
            self.report();
        }
    }

    pub fn done(&self) {
        let elapsed = self.started.elapsed();
        info!(
            rows = self.done,
            duration_ms = elapsed.as_millis() as u64,
            rows_per_sec = rate(self.done, elapsed),
            "generation finished"
        );
    }

    fn report(&self) {
        let elapsed = self.started.elapsed();
        let rows_per_sec = rate(self.done, elapsed);
        let percent = if self.total == 0 {
            100.0
        } else {
            self.done as f64 * 100.0 / self.total as f64
        };
        let eta_secs = if rows_per_sec > 0.0 {
            self.total.saturating_sub(self.done) as f64 / rows_per_sec
        } else {
            f64::INFINITY
        };
        if self.verbose {
            info!(
                rows = self.done,
                total = self.total,
                percent = format_args!("{percent:.1}"),
                rows_per_sec = format_args!("{rows_per_sec:.0}"),
                eta_secs = format_args!("{eta_secs:.0}"),
                "generation progress"
            );
        } else {
            debug!(
                rows = self.done,
                total = self.total,
                percent = format_args!("{percent:.1}"),
                rows_per_sec = format_args!("{rows_per_sec:.0}"),
                eta_secs = format_args!("{eta_secs:.0}"),
                "generation progress"
            );
        }
    }
}

fn rate(rows: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { rows as f64 / secs } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_rows_across_reports() {
        let mut progress = ProgressReporter::new(10).with_interval(Duration::ZERO);
        progress.add(4);
        progress.add(6);
        assert_eq!(progress.rows_done(), 10);
        progress.done();
    }

    #[test]
    fn rate_is_zero_without_elapsed_time() {
        assert_eq!(rate(100, Duration::ZERO), 0.0);
        assert_eq!(rate(100, Duration::from_secs(4)), 25.0);
    }
}
