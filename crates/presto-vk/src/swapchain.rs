// SPDX-License-Identifier: CEPL-1.0
//! The surface chain: swapchain, per-image views and per-frame sync, plus the
//! acquire / blit / overlay / present cycle that feeds it.
use std::sync::Arc;

use ash::vk;
use presto_render::{FrameRing, PresentStatus, RebuildOutcome, RenderSize};
use tracing::{debug, info, warn};

use crate::error::{VkError, VkResultExt, VkResultOf};
use crate::frame::{create_frame_slots, FrameSlot};
use crate::gpu::{BlitDesc, Gpu, SemaphoreOp, Submit, SwapchainDesc};
use crate::image::{Access, ImageResource};
use crate::overlay::{Overlay, OverlayContext};
use crate::render_step::SourceImage;
use crate::sync::{retry_wait, WaitPolicy};

/// Usage every surface image needs: blit target plus overlay attachment.
pub const SURFACE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw() | vk::ImageUsageFlags::TRANSFER_DST.as_raw(),
);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentModePref {
    /// Always available; vsync.
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}

#[derive(Clone, Copy, Debug)]
pub struct ChainConfig {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: PresentModePref,
    pub wait: WaitPolicy,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_mode: PresentModePref::Fifo,
            wait: WaitPolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainState {
    Uninitialized,
    Ready,
    /// The surface went stale or had no area; `rebuild` must run before
    /// anything is presented again.
    ResizePending,
    Destroyed,
}

/// The preferred format if offered, otherwise whatever the surface lists first.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
        .or_else(|| formats.first().copied())
}

/// FIFO unless the preferred mode is offered.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], pref: PresentModePref) -> vk::PresentModeKHR {
    let want = match pref {
        PresentModePref::Fifo => return vk::PresentModeKHR::FIFO,
        PresentModePref::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePref::Immediate => vk::PresentModeKHR::IMMEDIATE,
    };
    if modes.contains(&want) {
        want
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's own extent when it reports one, else the request clamped to
/// the supported range.
pub fn negotiate_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 means no cap).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

pub struct SurfaceChain<G: Gpu> {
    gpu: Arc<G>,
    queue: vk::Queue,
    family: u32,
    cfg: ChainConfig,

    swapchain: vk::SwapchainKHR,
    images: Vec<ImageResource>,
    /// One per surface image, indexed like `images`: signaled by the frame's
    /// submission, waited on by its present.
    present_ready: Vec<vk::Semaphore>,
    frames: FrameRing<FrameSlot>,
    extent: vk::Extent2D,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,

    resize_required: bool,
    state: ChainState,
}

impl<G: Gpu> SurfaceChain<G> {
    pub fn new(gpu: Arc<G>, queue: vk::Queue, family: u32, cfg: ChainConfig) -> Self {
        Self {
            gpu,
            queue,
            family,
            cfg,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            present_ready: Vec::new(),
            frames: FrameRing::default(),
            extent: vk::Extent2D::default(),
            format: cfg.format,
            present_mode: vk::PresentModeKHR::FIFO,
            resize_required: false,
            state: ChainState::Uninitialized,
        }
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ChainState::Ready
    }

    pub fn resize_required(&self) -> bool {
        self.resize_required
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Asks for a rebuild before the next present, e.g. after a window resize.
    pub fn request_resize(&mut self) {
        self.mark_stale("resize requested");
    }

    fn mark_stale(&mut self, why: &str) {
        if !self.resize_required {
            debug!("surface chain stale: {why}");
        }
        self.resize_required = true;
        if self.state == ChainState::Ready {
            self.state = ChainState::ResizePending;
        }
    }

    /// First build. Shares its path with `rebuild`.
    pub fn build(&mut self, size: RenderSize) -> VkResultOf<RebuildOutcome> {
        self.rebuild(size)
    }

    // STRICT REBUILD ORDER:
    // 1) negotiate against fresh caps; a zero extent defers and touches nothing
    // 2) device idle
    // 3) frame slots, then image views
    // 4) new swapchain created from the old one, then the old one destroyed
    pub fn rebuild(&mut self, size: RenderSize) -> VkResultOf<RebuildOutcome> {
        let gpu = Arc::clone(&self.gpu);
        let caps = gpu.surface_capabilities().op("query surface capabilities")?;
        let extent = negotiate_extent(&caps, size);
        if extent.width == 0 || extent.height == 0 {
            info!("surface has no area, deferring swapchain build");
            self.resize_required = true;
            if self.state == ChainState::Ready {
                self.state = ChainState::ResizePending;
            }
            return Ok(RebuildOutcome::Deferred);
        }

        if !caps.supported_usage_flags.contains(SURFACE_USAGE) {
            return Err(VkError::Negotiation(format!(
                "surface images lack {:?} usage (supported: {:?})",
                SURFACE_USAGE, caps.supported_usage_flags
            )));
        }
        let formats = gpu.surface_formats().op("query surface formats")?;
        let format = choose_surface_format(&formats, self.cfg.format)
            .ok_or_else(|| VkError::Negotiation("surface reports no formats".into()))?;
        let modes = gpu.surface_present_modes().op("query present modes")?;
        let present_mode = choose_present_mode(&modes, self.cfg.present_mode);
        if self.cfg.present_mode != PresentModePref::Fifo && present_mode == vk::PresentModeKHR::FIFO {
            warn!("{:?} present mode unavailable, using FIFO", self.cfg.present_mode);
        }
        let pre_transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        if self.swapchain != vk::SwapchainKHR::null() {
            gpu.device_wait_idle().op("device wait idle")?;
            self.release_images(&*gpu);
        }

        let old = self.swapchain;
        let desc = SwapchainDesc {
            min_image_count: choose_image_count(&caps),
            format,
            extent,
            usage: SURFACE_USAGE,
            pre_transform,
            present_mode,
            old_swapchain: old,
        };
        let created = gpu.create_swapchain(&desc);
        if old != vk::SwapchainKHR::null() {
            gpu.destroy_swapchain(old);
            self.swapchain = vk::SwapchainKHR::null();
        }
        self.swapchain = created.op("create swapchain")?;

        for image in gpu.swapchain_images(self.swapchain).op("get swapchain images")? {
            self.images
                .push(ImageResource::borrowed(&*gpu, image, format.format, extent)?);
            self.present_ready
                .push(gpu.create_semaphore().op("create semaphore")?);
        }
        let slots = create_frame_slots(&*gpu, self.family, self.images.len())?;
        self.frames.replace(slots);

        self.extent = extent;
        self.format = format;
        self.present_mode = present_mode;
        self.resize_required = false;
        self.state = ChainState::Ready;
        info!(
            "swapchain ready ({}x{}, {:?}, {:?}, {} images)",
            extent.width,
            extent.height,
            format.format,
            present_mode,
            self.images.len()
        );
        Ok(RebuildOutcome::Rebuilt(RenderSize::new(extent.width, extent.height)))
    }

    fn release_images(&mut self, gpu: &G) {
        for mut slot in self.frames.take() {
            slot.destroy(gpu);
        }
        for image in &mut self.images {
            image.destroy(gpu);
        }
        self.images.clear();
        for semaphore in self.present_ready.drain(..) {
            gpu.destroy_semaphore(semaphore);
        }
    }

    /// Acquires a surface image, blits `source` into it, lets `overlay` draw,
    /// and presents.
    ///
    /// Out-of-date and suboptimal surfaces set `resize_required`; only the
    /// former skips the frame. Errors are fatal.
    pub fn acquire_and_present(
        &mut self,
        source: &mut SourceImage,
        overlay: &mut dyn Overlay<G>,
    ) -> VkResultOf<PresentStatus> {
        if self.state != ChainState::Ready {
            return Ok(PresentStatus::Skipped);
        }
        let gpu = Arc::clone(&self.gpu);
        let wait = self.cfg.wait;
        let Some((_, slot)) = self.frames.next() else {
            return Ok(PresentStatus::Skipped);
        };

        // the slot's previous frame must be done before its buffer or semaphores are reused
        slot.commands.wait_ready(&*gpu, wait)?;

        let swapchain = self.swapchain;
        let acquired = slot.acquired();
        let acquire = retry_wait("acquire next image", wait, |timeout| {
            match gpu.acquire_next_image(swapchain, timeout, acquired) {
                Ok(r) => Ok(Some(r)),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
                Err(e) => Err(e),
            }
        })?;
        let Some((index, suboptimal)) = acquire else {
            self.mark_stale("acquire reported out of date");
            return Ok(PresentStatus::ResizeRequired);
        };

        let image_count = self.images.len();
        let (Some(target), Some(&present_ready)) = (
            self.images.get_mut(index as usize),
            self.present_ready.get(index as usize),
        ) else {
            return Err(VkError::Negotiation(format!(
                "acquire returned image {index} of {image_count}"
            )));
        };
        let cmd = slot.commands.begin(&*gpu)?;
        let extent = self.extent;

        target.discard_contents(vk::PipelineStageFlags2::ALL_COMMANDS);
        target.transition(
            &*gpu,
            cmd,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::PipelineStageFlags2::BLIT,
            Access::WRITE,
        );
        source.image.transition(
            &*gpu,
            cmd,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::PipelineStageFlags2::BLIT,
            Access::READ,
        );
        gpu.cmd_blit(
            cmd,
            &BlitDesc {
                src: source.image.image(),
                src_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                src_extent: source.image.extent(),
                dst: target.image(),
                dst_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                dst_extent: extent,
                filter: vk::Filter::LINEAR,
            },
        );
        target.transition(
            &*gpu,
            cmd,
            vk::ImageLayout::ATTACHMENT_OPTIMAL,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            Access::READ_WRITE,
        );
        overlay.draw(&OverlayContext {
            gpu: &*gpu,
            cmd,
            view: target.view(),
            layout: vk::ImageLayout::ATTACHMENT_OPTIMAL,
            extent,
        })?;
        target.transition(
            &*gpu,
            cmd,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::PipelineStageFlags2::ALL_COMMANDS,
            Access::READ,
        );
        gpu.end_commands(cmd).op("end frame commands")?;

        let (src_wait, src_signal) = source.timeline.advance();
        let stage = vk::PipelineStageFlags2::ALL_COMMANDS;
        let waits = [
            source.timeline.wait_op(src_wait, stage),
            SemaphoreOp::binary(acquired, stage),
        ];
        let signals = [
            source.timeline.wait_op(src_signal, stage),
            SemaphoreOp::binary(present_ready, stage),
            slot.commands.completion_signal(),
        ];
        gpu.queue_submit(
            self.queue,
            &Submit {
                command_buffer: cmd,
                waits: &waits,
                signals: &signals,
            },
        )
        .op("queue submit")?;

        match gpu.queue_present(self.queue, swapchain, index, present_ready) {
            Ok(false) if !suboptimal => Ok(PresentStatus::Presented),
            Ok(_) => {
                self.mark_stale("suboptimal surface");
                Ok(PresentStatus::Presented)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.mark_stale("present reported out of date");
                Ok(PresentStatus::ResizeRequired)
            }
            Err(e) => Err(VkError::call("queue present", e)),
        }
    }

    /// Waits for the device, then releases everything. Safe to call twice.
    pub fn destroy(&mut self) {
        if self.state == ChainState::Destroyed {
            return;
        }
        let gpu = Arc::clone(&self.gpu);
        if let Err(e) = gpu.device_wait_idle() {
            warn!("device wait idle before swapchain teardown failed: {e}");
        }
        self.release_images(&*gpu);
        if self.swapchain != vk::SwapchainKHR::null() {
            gpu.destroy_swapchain(self.swapchain);
            self.swapchain = vk::SwapchainKHR::null();
        }
        self.state = ChainState::Destroyed;
    }
}

impl<G: Gpu> Drop for SurfaceChain<G> {
    fn drop(&mut self) {
        self.destroy();
    }
}
