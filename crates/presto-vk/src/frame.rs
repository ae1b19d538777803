// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::error::{VkResultExt, VkResultOf};
use crate::gpu::{Gpu, SemaphoreOp};
use crate::sync::{Timeline, WaitPolicy};

/// A command buffer that is only re-recorded after the GPU reports its
/// previous submission complete.
#[derive(Debug)]
pub struct CommandSlot {
    pool: vk::CommandPool,
    cmd: vk::CommandBuffer,
    done: Timeline,
}

impl CommandSlot {
    pub fn create<G: Gpu>(gpu: &G, family: u32) -> VkResultOf<Self> {
        let pool = gpu.create_command_pool(family).op("create command pool")?;
        let cmd = match gpu.allocate_command_buffer(pool) {
            Ok(c) => c,
            Err(e) => {
                gpu.destroy_command_pool(pool);
                return Err(e).op("allocate command buffer");
            }
        };
        let done = match Timeline::create(gpu) {
            Ok(t) => t,
            Err(e) => {
                gpu.destroy_command_pool(pool);
                return Err(e);
            }
        };
        Ok(Self { pool, cmd, done })
    }

    /// Waits for the last submission of this slot.
    pub fn wait_ready<G: Gpu>(&self, gpu: &G, policy: WaitPolicy) -> VkResultOf<()> {
        self.done.wait_idle(gpu, policy)
    }

    pub fn begin<G: Gpu>(&self, gpu: &G) -> VkResultOf<vk::CommandBuffer> {
        gpu.begin_commands(self.cmd).op("begin commands")?;
        Ok(self.cmd)
    }

    /// Reserves the signal that marks the next submission of this slot done.
    pub fn completion_signal(&mut self) -> SemaphoreOp {
        let (_, signal) = self.done.advance();
        self.done
            .wait_op(signal, vk::PipelineStageFlags2::ALL_COMMANDS)
    }

    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        if self.pool != vk::CommandPool::null() {
            gpu.destroy_command_pool(self.pool);
            self.pool = vk::CommandPool::null();
            self.cmd = vk::CommandBuffer::null();
        }
        self.done.destroy(gpu);
    }
}

/// Per-frame resources of the surface chain.
///
/// The semaphore present waits on is not here: the presentation engine holds
/// it until the same surface image is acquired again, which need not line up
/// with this slot coming round, so the chain keeps one per image.
#[derive(Debug)]
pub struct FrameSlot {
    pub commands: CommandSlot,
    /// Signaled by acquire, waited on by the frame's submission.
    acquired: vk::Semaphore,
}

impl FrameSlot {
    pub fn create<G: Gpu>(gpu: &G, family: u32) -> VkResultOf<Self> {
        let mut commands = CommandSlot::create(gpu, family)?;
        let acquired = match gpu.create_semaphore() {
            Ok(s) => s,
            Err(e) => {
                commands.destroy(gpu);
                return Err(e).op("create semaphore");
            }
        };
        Ok(Self { commands, acquired })
    }

    pub fn acquired(&self) -> vk::Semaphore {
        self.acquired
    }

    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        self.commands.destroy(gpu);
        if self.acquired != vk::Semaphore::null() {
            gpu.destroy_semaphore(self.acquired);
            self.acquired = vk::Semaphore::null();
        }
    }
}

/// `count` fresh slots; nothing leaks if one of them fails.
pub fn create_frame_slots<G: Gpu>(gpu: &G, family: u32, count: usize) -> VkResultOf<Vec<FrameSlot>> {
    let mut slots = Vec::with_capacity(count);
    for _ in 0..count {
        match FrameSlot::create(gpu, family) {
            Ok(s) => slots.push(s),
            Err(e) => {
                for s in &mut slots {
                    s.destroy(gpu);
                }
                return Err(e);
            }
        }
    }
    Ok(slots)
}
