// SPDX-License-Identifier: CEPL-1.0
use std::time::{Duration, Instant};

/// Counts presented frames and yields a rate once per reporting window.
#[derive(Debug)]
pub struct FpsCounter {
    window: Duration,
    window_start: Instant,
    frames: u32,
    last_rate: f32,
}

impl FpsCounter {
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Instant::now())
    }

    pub fn starting_at(window: Duration, now: Instant) -> Self {
        Self {
            window,
            window_start: now,
            frames: 0,
            last_rate: 0.0,
        }
    }

    pub fn frame(&mut self) {
        self.frames = self.frames.saturating_add(1);
    }

    /// Returns the frame rate when the window has elapsed, then starts a new one.
    pub fn poll(&mut self, now: Instant) -> Option<f32> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }
        self.last_rate = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.window_start = now;
        Some(self.last_rate)
    }

    /// Drops frames counted so far, e.g. while rendering is suspended.
    pub fn reset(&mut self, now: Instant) {
        self.frames = 0;
        self.window_start = now;
    }

    pub fn last_rate(&self) -> f32 {
        self.last_rate
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
