// SPDX-License-Identifier: CEPL-1.0
//! The work that produces the image the surface chain presents.
use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use presto_render::FrameRing;
use tracing::debug;

use crate::error::{VkResultExt, VkResultOf};
use crate::frame::CommandSlot;
use crate::gpu::{Gpu, ImageDesc, Submit};
use crate::image::{Access, ImageResource};
use crate::queue::QueueHandle;
use crate::sync::{Timeline, WaitPolicy};

/// An image handed from a render step to the surface chain, with the
/// timeline that orders every GPU use of it.
///
/// Whoever submits work touching `image` waits on the timeline's current
/// value and signals the next one.
#[derive(Debug)]
pub struct SourceImage {
    pub image: ImageResource,
    pub timeline: Timeline,
}

impl SourceImage {
    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        self.image.destroy(gpu);
        self.timeline.destroy(gpu);
    }
}

pub trait RenderStep<G: Gpu> {
    /// Records and submits one frame's worth of work into the output.
    fn render(&mut self, queue: &QueueHandle<G>) -> VkResultOf<()>;

    fn output(&mut self) -> &mut SourceImage;

    /// Layout the output is left in by `render`.
    fn output_layout(&self) -> vk::ImageLayout;

    /// Recreates size-dependent images. The device is idle when this runs.
    fn rebuild(&mut self, queue: &mut QueueHandle<G>, extent: vk::Extent2D) -> VkResultOf<()>;
}

pub const SOURCE_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
const IN_FLIGHT: usize = 2;

/// Fills the source image with a slowly drifting color.
pub struct ClearStep<G: Gpu> {
    gpu: Arc<G>,
    slots: FrameRing<CommandSlot>,
    source: SourceImage,
    base: [f32; 4],
    started: Instant,
    wait: WaitPolicy,
}

impl<G: Gpu> ClearStep<G> {
    pub fn new(queue: &mut QueueHandle<G>, extent: vk::Extent2D, base: [f32; 4]) -> VkResultOf<Self> {
        let gpu = Arc::clone(queue.gpu());
        let mut slots = Vec::with_capacity(IN_FLIGHT);
        let built = (|| -> VkResultOf<(ImageResource, Timeline)> {
            for _ in 0..IN_FLIGHT {
                slots.push(CommandSlot::create(&*gpu, queue.family())?);
            }
            let mut image = create_source(queue, extent)?;
            match Timeline::create(&*gpu) {
                Ok(timeline) => Ok((image, timeline)),
                Err(e) => {
                    image.destroy(&*gpu);
                    Err(e)
                }
            }
        })();
        let (image, timeline) = match built {
            Ok(parts) => parts,
            Err(e) => {
                for slot in &mut slots {
                    slot.destroy(&*gpu);
                }
                return Err(e);
            }
        };
        Ok(Self {
            gpu,
            slots: FrameRing::new(slots),
            source: SourceImage { image, timeline },
            base,
            started: Instant::now(),
            wait: queue.wait_policy(),
        })
    }
}

fn create_source<G: Gpu>(queue: &mut QueueHandle<G>, extent: vk::Extent2D) -> VkResultOf<ImageResource> {
    let gpu = Arc::clone(queue.gpu());
    let mut image = ImageResource::allocate(
        &*gpu,
        &ImageDesc {
            extent,
            format: SOURCE_FORMAT,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC,
        },
    )?;
    // leave it cleared in TRANSFER_SRC so a present before the first render blits black
    let init = queue.run_immediate(|gpu, cmd| {
        image.transition(
            gpu,
            cmd,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::PipelineStageFlags2::CLEAR,
            Access::WRITE,
        );
        gpu.cmd_clear_color(
            cmd,
            image.image(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            [0.0, 0.0, 0.0, 1.0],
        );
        image.transition(
            gpu,
            cmd,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::PipelineStageFlags2::BLIT,
            Access::READ,
        );
        Ok(())
    });
    if let Err(e) = init {
        image.destroy(&*gpu);
        return Err(e);
    }
    debug!(width = extent.width, height = extent.height, "source image ready");
    Ok(image)
}

/// `base` shifted by a slow sine per channel, kept inside `[0, 1]`.
pub fn drift_color(base: [f32; 4], secs: f32) -> [f32; 4] {
    let wave = |phase: f32| 0.15 * (secs * 0.6 + phase).sin();
    [
        (base[0] + wave(0.0)).clamp(0.0, 1.0),
        (base[1] + wave(2.1)).clamp(0.0, 1.0),
        (base[2] + wave(4.2)).clamp(0.0, 1.0),
        base[3].clamp(0.0, 1.0),
    ]
}

impl<G: Gpu> RenderStep<G> for ClearStep<G> {
    fn render(&mut self, queue: &QueueHandle<G>) -> VkResultOf<()> {
        let gpu = &*self.gpu;
        let Some((_, slot)) = self.slots.next() else {
            return Ok(());
        };
        slot.wait_ready(gpu, self.wait)?;
        let cmd = slot.begin(gpu)?;

        let image = &mut self.source.image;
        image.transition(
            gpu,
            cmd,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::PipelineStageFlags2::CLEAR,
            Access::WRITE,
        );
        let color = drift_color(self.base, self.started.elapsed().as_secs_f32());
        gpu.cmd_clear_color(cmd, image.image(), vk::ImageLayout::TRANSFER_DST_OPTIMAL, color);
        image.transition(
            gpu,
            cmd,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::PipelineStageFlags2::BLIT,
            Access::READ,
        );
        gpu.end_commands(cmd).op("end commands")?;

        let (wait, signal) = self.source.timeline.advance();
        let waits = [self
            .source
            .timeline
            .wait_op(wait, vk::PipelineStageFlags2::ALL_COMMANDS)];
        let signals = [
            self.source
                .timeline
                .wait_op(signal, vk::PipelineStageFlags2::ALL_COMMANDS),
            slot.completion_signal(),
        ];
        queue.submit(&Submit {
            command_buffer: cmd,
            waits: &waits,
            signals: &signals,
        })
    }

    fn output(&mut self) -> &mut SourceImage {
        &mut self.source
    }

    fn output_layout(&self) -> vk::ImageLayout {
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL
    }

    fn rebuild(&mut self, queue: &mut QueueHandle<G>, extent: vk::Extent2D) -> VkResultOf<()> {
        self.source.timeline.wait_idle(&*self.gpu, self.wait)?;
        self.source.image.destroy(&*self.gpu);
        self.source.image = create_source(queue, extent)?;
        Ok(())
    }
}

impl<G: Gpu> Drop for ClearStep<G> {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.destroy(&*self.gpu);
        }
        self.source.destroy(&*self.gpu);
    }
}
