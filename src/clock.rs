//! Fixed-interval clock for the render and simulation loops.

use std::time::{Duration, Instant};

/// Render side tick, roughly 40 frames per second.
pub const RENDER_INTERVAL: Duration = Duration::from_millis(25);

/// Simulation tick, roughly 60 updates per second.
pub const SIMULATION_INTERVAL: Duration = Duration::from_micros(16_667);

/// Paces a loop to a fixed interval and reports the real elapsed time.
#[derive(Debug)]
pub struct FixedClock {
    interval: Duration,
    last: Instant,
}

impl FixedClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep out whatever is left of the current interval, then return the
    /// milliseconds since the previous tick.
    ///
    /// An overrunning iteration does not sleep; the caller sees the longer
    /// delta instead.
    pub fn tick(&mut self) -> f64 {
        let busy = self.last.elapsed();
        if let Some(slack) = self.interval.checked_sub(busy) {
            std::thread::sleep(slack);
        }
        let now = Instant::now();
        let delta = now.duration_since(self.last);
        self.last = now;
        delta.as_secs_f64() * 1000.0
    }

    /// Forget time spent so far, e.g. after a long load.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }
}
