// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Backend-agnostic half of the presentation engine: the frame ring, the
//! surface state the frame loop feeds in, and the per-tick driver that decides
//! when to render, present and rebuild.
use anyhow::Result;

mod driver;
mod ring;
mod surface;

pub use driver::{DriverConfig, DriverStats, PresentDriver, TickOutcome};
pub use ring::FrameRing;
pub use surface::{SurfaceEvent, SurfaceTracker};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const ZERO: RenderSize = RenderSize {
        width: 0,
        height: 0,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A surface with no area cannot back a swapchain.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What a single present attempt did. Out-of-date and suboptimal surfaces are
/// reported here rather than as errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    ResizeRequired,
    Skipped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// Rebuilt at the negotiated size, which may differ from the request.
    Rebuilt(RenderSize),
    /// The surface currently has no area; nothing was torn down.
    Deferred,
}

/// The seam between the driver and a concrete backend. Errors returned from
/// any method are fatal for the session.
pub trait Presenter {
    /// Runs the render step that produces the image about to be presented.
    fn render(&mut self) -> Result<()>;

    /// One acquire, record, submit, present cycle.
    fn present(&mut self) -> Result<PresentStatus>;

    /// Set by the backend when the last acquire or present reported a stale surface.
    fn resize_required(&self) -> bool;

    /// Tears down and rebuilds the surface chain and every size-dependent image.
    fn rebuild(&mut self, size: RenderSize) -> Result<RebuildOutcome>;
}
