use std::time::{Duration, Instant};

/// Receives progress events from the extraction passes.
pub trait ProgressReporter: Send + Sync {
    fn channels_processed(&self, source_name: &str, channel_count: usize);

    fn programs_processed(&self, source_name: &str, program_count: usize, skipped_count: usize);
}

/// Reports progress as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn channels_processed(&self, source_name: &str, channel_count: usize) {
        tracing::info!(source = source_name, "Progress: Processed {} channels", channel_count);
    }

    fn programs_processed(&self, source_name: &str, program_count: usize, skipped_count: usize) {
        tracing::info!(
            source = source_name,
            "Progress: Processed {} programs, skipped {}",
            program_count,
            skipped_count
        );
    }
}

/// Limits progress reports to one per interval of wall-clock time.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last_report: Instant,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_report: Instant::now(),
        }
    }

    /// True when a report is due; resets the window.
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_report) >= self.interval {
            self.last_report = now;
            true
        } else {
            false
        }
    }
}
