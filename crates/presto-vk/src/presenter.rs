// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::Result;
use ash::vk;
use presto_render::{PresentStatus, Presenter, RebuildOutcome, RenderSize};
use tracing::{info, warn};

use crate::error::{VkError, VkResultOf};
use crate::gpu::Gpu;
use crate::overlay::Overlay;
use crate::queue::QueueHandle;
use crate::render_step::RenderStep;
use crate::swapchain::{ChainConfig, SurfaceChain};

/// Ties a render step, the surface chain and an overlay together behind the
/// backend-agnostic `Presenter` seam.
pub struct VkPresenter<G: Gpu, S: RenderStep<G>> {
    gpu: Arc<G>,
    queue: QueueHandle<G>,
    chain: SurfaceChain<G>,
    step: S,
    overlay: Box<dyn Overlay<G>>,
}

impl<G: Gpu, S: RenderStep<G>> VkPresenter<G, S> {
    /// Builds the chain at `size` and then the render step at the negotiated
    /// extent. A surface without area defers the chain; the step is then
    /// sized from the request and rebuilt with the chain later.
    pub fn new<F>(
        gpu: Arc<G>,
        cfg: ChainConfig,
        size: RenderSize,
        overlay: Box<dyn Overlay<G>>,
        make_step: F,
    ) -> VkResultOf<Self>
    where
        F: FnOnce(&mut QueueHandle<G>, vk::Extent2D) -> VkResultOf<S>,
    {
        let families = gpu.queue_families();
        if families.graphics != families.present {
            return Err(VkError::Bootstrap(format!(
                "graphics ({}) and present ({}) queue families differ",
                families.graphics, families.present
            )));
        }
        let mut queue = QueueHandle::new(Arc::clone(&gpu), families.graphics, cfg.wait)?;
        let mut chain = SurfaceChain::new(Arc::clone(&gpu), queue.queue(), queue.family(), cfg);
        let extent = match chain.build(size)? {
            RebuildOutcome::Rebuilt(s) => extent_of(s),
            RebuildOutcome::Deferred => vk::Extent2D {
                width: size.width.max(1),
                height: size.height.max(1),
            },
        };
        let step = make_step(&mut queue, extent)?;
        Ok(Self {
            gpu,
            queue,
            chain,
            step,
            overlay,
        })
    }

    /// Extent the chain is currently built at, if it has been built.
    pub fn built_size(&self) -> Option<RenderSize> {
        self.chain
            .is_ready()
            .then(|| RenderSize::new(self.chain.extent().width, self.chain.extent().height))
    }

    pub fn chain(&self) -> &SurfaceChain<G> {
        &self.chain
    }

    pub fn step(&self) -> &S {
        &self.step
    }
}

fn extent_of(size: RenderSize) -> vk::Extent2D {
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}

impl<G: Gpu, S: RenderStep<G>> Presenter for VkPresenter<G, S> {
    fn render(&mut self) -> Result<()> {
        if !self.chain.is_ready() {
            return Ok(());
        }
        self.step.render(&self.queue)?;
        let layout = self.step.output_layout();
        self.step.output().image.debug_assert_layout(layout);
        Ok(())
    }

    fn present(&mut self) -> Result<PresentStatus> {
        let status = self
            .chain
            .acquire_and_present(self.step.output(), self.overlay.as_mut())?;
        Ok(status)
    }

    fn resize_required(&self) -> bool {
        self.chain.resize_required()
    }

    fn rebuild(&mut self, size: RenderSize) -> Result<RebuildOutcome> {
        let outcome = self.chain.rebuild(size)?;
        if let RebuildOutcome::Rebuilt(built) = outcome {
            self.step.rebuild(&mut self.queue, extent_of(built))?;
            info!("presenter rebuilt at {}x{}", built.width, built.height);
        }
        Ok(outcome)
    }
}

impl<G: Gpu, S: RenderStep<G>> Drop for VkPresenter<G, S> {
    fn drop(&mut self) {
        // nothing may be released while the GPU still uses it
        if let Err(e) = self.gpu.device_wait_idle() {
            warn!("device wait idle on shutdown failed: {e}");
        }
        self.chain.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeGpu, Op};
    use crate::overlay::{FrameTimeOverlay, NoOverlay};
    use crate::render_step::ClearStep;
    use presto_render::{DriverConfig, PresentDriver, SurfaceEvent, TickOutcome};
    use std::time::Duration;

    type Clear = VkPresenter<FakeGpu, ClearStep<FakeGpu>>;

    fn presenter(gpu: &Arc<FakeGpu>, size: RenderSize, overlay: Box<dyn Overlay<FakeGpu>>) -> Clear {
        VkPresenter::new(Arc::clone(gpu), ChainConfig::default(), size, overlay, |q, extent| {
            ClearStep::new(q, extent, [0.1, 0.1, 0.1, 1.0])
        })
        .unwrap()
    }

    fn driver(built: RenderSize) -> PresentDriver {
        PresentDriver::new(
            built,
            DriverConfig {
                suspend_sleep: Duration::ZERO,
            },
        )
    }

    #[test]
    fn driver_runs_frames_through_the_presenter() {
        let gpu = Arc::new(FakeGpu::new(1280, 720));
        let mut p = presenter(&gpu, RenderSize::new(1280, 720), Box::new(FrameTimeOverlay::new()));
        let mut d = driver(p.built_size().unwrap());

        for _ in 0..6 {
            assert_eq!(d.tick(&mut p).unwrap(), TickOutcome::Presented);
        }
        assert_eq!(gpu.count(|op| matches!(op, Op::Present { .. })), 6);
        assert!(gpu.count(|op| matches!(op, Op::BeginRendering { .. })) >= 5);
        assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
    }

    #[test]
    fn out_of_date_rebuilds_once_then_presents() {
        let gpu = Arc::new(FakeGpu::new(1280, 720));
        let mut p = presenter(&gpu, RenderSize::new(1280, 720), Box::new(NoOverlay));
        let mut d = driver(p.built_size().unwrap());

        gpu.set_extent(1600, 900);
        gpu.acquire_script
            .borrow_mut()
            .push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        assert_eq!(d.tick(&mut p).unwrap(), TickOutcome::Skipped);
        assert_eq!(d.stats().rebuilds, 1);
        assert_eq!(p.built_size(), Some(RenderSize::new(1600, 900)));
        assert_eq!(p.step().output_layout(), vk::ImageLayout::TRANSFER_SRC_OPTIMAL);

        assert_eq!(d.tick(&mut p).unwrap(), TickOutcome::Presented);
        assert_eq!(d.stats().rebuilds, 1);
        assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
    }

    #[test]
    fn minimize_and_restore() {
        let gpu = Arc::new(FakeGpu::new(800, 600));
        let mut p = presenter(&gpu, RenderSize::new(800, 600), Box::new(NoOverlay));
        let mut d = driver(p.built_size().unwrap());
        d.tick(&mut p).unwrap();

        gpu.set_extent(0, 0);
        d.on_surface_event(SurfaceEvent::Minimized);
        d.on_surface_event(SurfaceEvent::Resized(RenderSize::ZERO));
        gpu.clear_ops();
        for _ in 0..3 {
            assert_eq!(d.tick(&mut p).unwrap(), TickOutcome::Suspended);
        }
        assert!(gpu.ops().is_empty());

        gpu.set_extent(1024, 768);
        d.on_surface_event(SurfaceEvent::Restored);
        d.on_surface_event(SurfaceEvent::Resized(RenderSize::new(1024, 768)));
        assert_eq!(d.tick(&mut p).unwrap(), TickOutcome::Presented);
        assert_eq!(p.chain().extent().width, 1024);
        assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
    }

    #[test]
    fn starting_minimized_builds_on_first_area() {
        let gpu = Arc::new(FakeGpu::new(0, 0));
        let mut p = presenter(&gpu, RenderSize::ZERO, Box::new(NoOverlay));
        assert_eq!(p.built_size(), None);
        let mut d = driver(RenderSize::ZERO);
        assert_eq!(d.tick(&mut p).unwrap(), TickOutcome::Suspended);

        gpu.set_extent(640, 480);
        d.on_surface_event(SurfaceEvent::Resized(RenderSize::new(640, 480)));
        assert_eq!(d.tick(&mut p).unwrap(), TickOutcome::Presented);
        assert_eq!(p.built_size(), Some(RenderSize::new(640, 480)));
    }

    #[test]
    fn split_queue_families_are_rejected() {
        let gpu = Arc::new(FakeGpu::new(64, 64).with_families(0, 1));
        let err = VkPresenter::new(
            Arc::clone(&gpu),
            ChainConfig::default(),
            RenderSize::new(64, 64),
            Box::new(NoOverlay),
            |q, extent| ClearStep::new(q, extent, [0.0; 4]),
        )
        .err()
        .unwrap();
        assert!(matches!(err, VkError::Bootstrap(_)));
        assert_eq!(gpu.live_handles(), 0);
    }

    #[test]
    fn drop_releases_every_handle() {
        let gpu = Arc::new(FakeGpu::new(1280, 720));
        let mut p = presenter(&gpu, RenderSize::new(1280, 720), Box::new(NoOverlay));
        let mut d = driver(p.built_size().unwrap());
        d.tick(&mut p).unwrap();
        drop(p);
        assert_eq!(gpu.live_handles(), 0);
        assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
    }
}
