// SPDX-License-Identifier: CEPL-1.0
//! Things drawn straight onto the acquired surface image after the blit.
use std::collections::VecDeque;
use std::time::Instant;

use ash::vk;

use crate::error::VkResultOf;
use crate::gpu::Gpu;

/// The surface image an overlay draws into. It is in `layout` for the whole
/// call and must be left there.
pub struct OverlayContext<'a, G: Gpu> {
    pub gpu: &'a G,
    pub cmd: vk::CommandBuffer,
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub extent: vk::Extent2D,
}

pub trait Overlay<G: Gpu> {
    fn draw(&mut self, ctx: &OverlayContext<'_, G>) -> VkResultOf<()>;
}

pub struct NoOverlay;

impl<G: Gpu> Overlay<G> for NoOverlay {
    fn draw(&mut self, _ctx: &OverlayContext<'_, G>) -> VkResultOf<()> {
        Ok(())
    }
}

const SAMPLES: usize = 96;
const BAR_WIDTH: u32 = 3;
const BAR_GAP: u32 = 1;
const MARGIN: u32 = 8;
/// Pixels per millisecond of frame time.
const SCALE: f32 = 3.0;
const MAX_MS: f32 = 50.0;
const TARGET_MS: f32 = 1000.0 / 60.0;

/// Bar graph of recent frame times in the bottom-left corner, with a line
/// at 60 Hz.
pub struct FrameTimeOverlay {
    last: Option<Instant>,
    history: VecDeque<f32>,
    bar_color: [f32; 4],
    line_color: [f32; 4],
}

impl Default for FrameTimeOverlay {
    fn default() -> Self {
        Self {
            last: None,
            history: VecDeque::with_capacity(SAMPLES),
            bar_color: [0.1, 0.9, 0.3, 1.0],
            line_color: [0.9, 0.2, 0.2, 1.0],
        }
    }
}

impl FrameTimeOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, now: Instant) {
        if let Some(last) = self.last.replace(now) {
            if self.history.len() == SAMPLES {
                self.history.pop_front();
            }
            self.history
                .push_back(now.duration_since(last).as_secs_f32() * 1000.0);
        }
    }

    pub fn history(&self) -> impl Iterator<Item = f32> + '_ {
        self.history.iter().copied()
    }
}

/// One bar per sample, oldest on the left, clipped to `extent`.
pub fn bar_rects(samples: impl Iterator<Item = f32>, extent: vk::Extent2D) -> Vec<vk::Rect2D> {
    let bottom = extent.height.saturating_sub(MARGIN);
    let mut rects = Vec::new();
    for (i, ms) in samples.enumerate() {
        let x = MARGIN + i as u32 * (BAR_WIDTH + BAR_GAP);
        if x + BAR_WIDTH > extent.width {
            break;
        }
        let h = ((ms.clamp(0.0, MAX_MS) * SCALE) as u32).clamp(1, bottom.max(1));
        if h > bottom {
            continue;
        }
        rects.push(vk::Rect2D {
            offset: vk::Offset2D {
                x: x as i32,
                y: (bottom - h) as i32,
            },
            extent: vk::Extent2D {
                width: BAR_WIDTH,
                height: h,
            },
        });
    }
    rects
}

fn target_line(bars: usize, extent: vk::Extent2D) -> Option<vk::Rect2D> {
    let bottom = extent.height.saturating_sub(MARGIN);
    let y = bottom.checked_sub((TARGET_MS * SCALE) as u32)?;
    let width = (bars as u32 * (BAR_WIDTH + BAR_GAP)).min(extent.width.saturating_sub(MARGIN));
    (width > 0).then_some(vk::Rect2D {
        offset: vk::Offset2D {
            x: MARGIN as i32,
            y: y as i32,
        },
        extent: vk::Extent2D { width, height: 1 },
    })
}

impl<G: Gpu> Overlay<G> for FrameTimeOverlay {
    fn draw(&mut self, ctx: &OverlayContext<'_, G>) -> VkResultOf<()> {
        self.record(Instant::now());
        let bars = bar_rects(self.history(), ctx.extent);
        if bars.is_empty() {
            return Ok(());
        }
        ctx.gpu
            .cmd_begin_rendering(ctx.cmd, ctx.view, ctx.layout, ctx.extent);
        ctx.gpu.cmd_clear_rects(ctx.cmd, self.bar_color, &bars);
        if let Some(line) = target_line(bars.len(), ctx.extent) {
            ctx.gpu.cmd_clear_rects(ctx.cmd, self.line_color, &[line]);
        }
        ctx.gpu.cmd_end_rendering(ctx.cmd);
        Ok(())
    }
}
