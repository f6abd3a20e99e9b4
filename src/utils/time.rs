use std::time::{Duration, Instant};

/// Timing of one rendered frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    pub frame_id: u64,
    /// Time since the clock started.
    pub timestamp: Duration,
    /// Seconds since the previous tick; zero on the first frame.
    pub time_step: f32,
}

/// Clock driving frame ids and timestamps.
#[derive(Debug)]
pub struct FrameClock {
    start_time: Instant,
    last_update: Option<Instant>,
    /// Total number of ticks
    pub frame_count: u64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    /// Creates a clock starting from now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            last_update: None,
            frame_count: 0,
        }
    }

    /// Advances to the next frame.
    pub fn tick(&mut self) -> FrameTick {
        let now = Instant::now();
        let delta = self
            .last_update
            .map_or(Duration::ZERO, |last| now - last);
        self.last_update = Some(now);
        self.frame_count += 1;

        FrameTick {
            frame_id: self.frame_count,
            timestamp: now - self.start_time,
            time_step: delta.as_secs_f32(),
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
