// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::{PresentStatus, Presenter, RebuildOutcome, RenderSize, SurfaceEvent, SurfaceTracker};

#[derive(Clone, Copy, Debug)]
pub struct DriverConfig {
    /// How long a suspended tick sleeps instead of rendering.
    pub suspend_sleep: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            suspend_sleep: Duration::from_millis(100),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Surface minimized, occluded or without area; the tick slept and
    /// rendered nothing.
    Suspended,
    Presented,
    /// The backend skipped presenting; a rebuild has already been attempted.
    Skipped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub ticks: u64,
    pub presented: u64,
    pub skipped: u64,
    pub suspended: u64,
    pub rebuilds: u64,
}

/// Per-tick orchestration: suspend, render, present, and rebuild when the
/// surface asks for it. Owned and driven by the single frame-loop thread.
#[derive(Debug)]
pub struct PresentDriver {
    cfg: DriverConfig,
    surface: SurfaceTracker,
    built: RenderSize,
    pending_resize: bool,
    was_suspended: bool,
    stats: DriverStats,
}

impl PresentDriver {
    /// `built` is the extent the presenter was initially built at.
    pub fn new(built: RenderSize, cfg: DriverConfig) -> Self {
        Self {
            cfg,
            surface: SurfaceTracker::new(built),
            built,
            pending_resize: false,
            was_suspended: false,
            stats: DriverStats::default(),
        }
    }

    pub fn on_surface_event(&mut self, event: SurfaceEvent) {
        self.surface.apply(event);
        if let SurfaceEvent::Resized(size) = event {
            if !size.is_empty() && size != self.built {
                debug!("surface resized to {}x{}, rebuild pending", size.width, size.height);
                self.pending_resize = true;
            }
        }
    }

    // STRICT PER-TICK ORDER:
    // 1) suspended → sleep, touch nothing on the GPU
    // 2) pending resize (explicit signal or deferred earlier) → rebuild first;
    //    a surface with no area counts as suspended
    // 3) render step, then acquire/record/submit/present
    // 4) stale surface reported by present → rebuild before the next tick
    pub fn tick<P: Presenter>(&mut self, presenter: &mut P) -> Result<TickOutcome> {
        self.stats.ticks += 1;

        let suspended = self.surface.is_suspended();
        if suspended != self.was_suspended {
            info!("rendering {}", if suspended { "suspended" } else { "resumed" });
            self.was_suspended = suspended;
        }
        if suspended {
            return Ok(self.sleep_suspended());
        }

        if self.pending_resize && self.rebuild(presenter)? == RebuildOutcome::Deferred {
            return Ok(self.sleep_suspended());
        }

        presenter.render().context("render step")?;
        let status = presenter.present().context("present")?;

        if status == PresentStatus::ResizeRequired || presenter.resize_required() {
            self.pending_resize = true;
            if self.rebuild(presenter)? == RebuildOutcome::Deferred {
                std::thread::sleep(self.cfg.suspend_sleep);
            }
        }

        Ok(match status {
            PresentStatus::Presented => {
                self.stats.presented += 1;
                TickOutcome::Presented
            }
            PresentStatus::ResizeRequired | PresentStatus::Skipped => {
                self.stats.skipped += 1;
                TickOutcome::Skipped
            }
        })
    }

    fn sleep_suspended(&mut self) -> TickOutcome {
        self.stats.suspended += 1;
        std::thread::sleep(self.cfg.suspend_sleep);
        TickOutcome::Suspended
    }

    fn rebuild<P: Presenter>(&mut self, presenter: &mut P) -> Result<RebuildOutcome> {
        let want = self.surface.size();
        let outcome = presenter.rebuild(want).context("rebuild")?;
        match outcome {
            RebuildOutcome::Rebuilt(size) => {
                self.built = size;
                self.pending_resize = false;
                self.stats.rebuilds += 1;
            }
            RebuildOutcome::Deferred => {
                debug!("rebuild deferred, surface has no area");
                self.pending_resize = true;
            }
        }
        Ok(outcome)
    }

    pub fn is_suspended(&self) -> bool {
        self.surface.is_suspended()
    }

    pub fn resize_pending(&self) -> bool {
        self.pending_resize
    }

    pub fn built_size(&self) -> RenderSize {
        self.built
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }
}
