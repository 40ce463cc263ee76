//! Stage timing for per-message logs.

use std::time::{Duration, Instant};
use tracing::info;

/// Measures the time between successive ticks.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last: Instant,
}

impl Timer {
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
        }
    }

    /// Log and return the time since the previous tick.
    pub fn tick(&mut self, label: &str) -> Duration {
        let now = Instant::now();
        let stage = now - self.last;
        self.last = now;
        let secs = stage.as_secs_f64();
        info!(stage = label, secs, "{} took {:.2} secs.", label, secs);
        stage
    }

    /// Time since the timer was started.
    pub fn total(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_micros() as f64 / 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_partition_total() {
        let mut timer = Timer::start();
        std::thread::sleep(Duration::from_millis(5));
        let first = timer.tick("first");
        let second = timer.tick("second");

        assert!(first >= Duration::from_millis(5));
        assert!(first + second <= timer.total());
    }
}
