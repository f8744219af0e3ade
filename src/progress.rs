use std::time::Instant;

pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Monotonic seconds since some fixed start.
pub trait Stopwatch {
    fn total_seconds_elapsed(&mut self) -> u64;
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicStopwatch {
    started: Instant,
}

impl MonotonicStopwatch {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Stopwatch for MonotonicStopwatch {
    fn total_seconds_elapsed(&mut self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

/// Emits a progress line at most once per interval.
#[derive(Debug)]
pub struct ProgressNotifier<W> {
    stopwatch: W,
    interval_secs: u64,
    last_notified: u64,
}

impl<W: Stopwatch> ProgressNotifier<W> {
    pub fn new(stopwatch: W) -> Self {
        Self::with_interval(stopwatch, DEFAULT_INTERVAL_SECS)
    }

    pub fn with_interval(stopwatch: W, interval_secs: u64) -> Self {
        Self {
            stopwatch,
            interval_secs,
            last_notified: 0,
        }
    }

    /// Returns the message when one is due; `processed` is how many
    /// changesets have already been folded in.
    pub fn check(&mut self, processed: usize, total: usize) -> Option<String> {
        let elapsed = self.stopwatch.total_seconds_elapsed();
        if elapsed.saturating_sub(self.last_notified) < self.interval_secs {
            return None;
        }
        self.last_notified = elapsed;
        Some(format!("Processed {processed}/{total} changesets"))
    }
}
