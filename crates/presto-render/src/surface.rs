// SPDX-License-Identifier: CEPL-1.0
use crate::RenderSize;

/// Window-side changes the frame loop forwards once per tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceEvent {
    Resized(RenderSize),
    Minimized,
    Restored,
    Occluded(bool),
}

/// Last known surface size and visibility.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceTracker {
    size: RenderSize,
    minimized: bool,
    occluded: bool,
}

impl SurfaceTracker {
    pub fn new(size: RenderSize) -> Self {
        Self {
            size,
            minimized: false,
            occluded: false,
        }
    }

    /// Applies one event and returns true when it changed the pixel size.
    pub fn apply(&mut self, event: SurfaceEvent) -> bool {
        match event {
            SurfaceEvent::Resized(size) => {
                let changed = size != self.size;
                self.size = size;
                changed
            }
            SurfaceEvent::Minimized => {
                self.minimized = true;
                false
            }
            SurfaceEvent::Restored => {
                self.minimized = false;
                false
            }
            SurfaceEvent::Occluded(occluded) => {
                self.occluded = occluded;
                false
            }
        }
    }

    pub fn size(&self) -> RenderSize {
        self.size
    }

    /// No GPU work should be issued while this is true.
    pub fn is_suspended(&self) -> bool {
        self.minimized || self.occluded || self.size.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_area_suspends() {
        let mut s = SurfaceTracker::new(RenderSize::new(800, 600));
        assert!(!s.is_suspended());
        assert!(s.apply(SurfaceEvent::Resized(RenderSize::new(0, 600))));
        assert!(s.is_suspended());
        assert!(s.apply(SurfaceEvent::Resized(RenderSize::new(800, 600))));
        assert!(!s.is_suspended());
    }

    #[test]
    fn minimize_and_occlusion_suspend_without_size_change() {
        let mut s = SurfaceTracker::new(RenderSize::new(800, 600));
        assert!(!s.apply(SurfaceEvent::Minimized));
        assert!(s.is_suspended());
        assert!(!s.apply(SurfaceEvent::Restored));
        assert!(!s.is_suspended());
        s.apply(SurfaceEvent::Occluded(true));
        assert!(s.is_suspended());
        s.apply(SurfaceEvent::Occluded(false));
        assert!(!s.is_suspended());
    }

    #[test]
    fn same_size_is_not_a_change() {
        let mut s = SurfaceTracker::new(RenderSize::new(800, 600));
        assert!(!s.apply(SurfaceEvent::Resized(RenderSize::new(800, 600))));
    }
}
