// SPDX-License-Identifier: CEPL-1.0
use presto_render::{RenderSize, SurfaceEvent};
use winit::event::WindowEvent;

/// The part of a window event the presentation driver cares about.
pub fn surface_event(event: &WindowEvent) -> Option<SurfaceEvent> {
    match event {
        WindowEvent::Resized(size) => Some(SurfaceEvent::Resized(RenderSize::new(
            size.width,
            size.height,
        ))),
        WindowEvent::Occluded(occluded) => Some(SurfaceEvent::Occluded(*occluded)),
        _ => None,
    }
}

/// winit has no minimize event, so the frame loop polls
/// `Window::is_minimized` and feeds the answer through here.
#[derive(Debug, Default)]
pub struct MinimizeWatch {
    minimized: bool,
}

impl MinimizeWatch {
    /// `None` (platform can't tell) counts as not minimized.
    pub fn update(&mut self, is_minimized: Option<bool>) -> Option<SurfaceEvent> {
        let now = is_minimized.unwrap_or(false);
        if now == self.minimized {
            return None;
        }
        self.minimized = now;
        Some(if now {
            SurfaceEvent::Minimized
        } else {
            SurfaceEvent::Restored
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalSize;

    #[test]
    fn resize_and_occlusion_translate() {
        assert_eq!(
            surface_event(&WindowEvent::Resized(PhysicalSize::new(800, 600))),
            Some(SurfaceEvent::Resized(RenderSize::new(800, 600)))
        );
        assert_eq!(
            surface_event(&WindowEvent::Occluded(true)),
            Some(SurfaceEvent::Occluded(true))
        );
        assert_eq!(surface_event(&WindowEvent::Focused(false)), None);
    }

    #[test]
    fn minimize_reports_edges_only() {
        let mut w = MinimizeWatch::default();
        assert_eq!(w.update(Some(false)), None);
        assert_eq!(w.update(Some(true)), Some(SurfaceEvent::Minimized));
        assert_eq!(w.update(Some(true)), None);
        assert_eq!(w.update(None), Some(SurfaceEvent::Restored));
    }
}
