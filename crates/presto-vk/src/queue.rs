// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::error::{VkResultExt, VkResultOf};
use crate::gpu::{Gpu, SemaphoreOp, Submit};
use crate::sync::{Timeline, WaitPolicy};

/// A device queue plus one reusable command buffer for blocking one-shot
/// work such as initial layout transitions.
///
/// The one-shot buffer is guarded by its own timeline; `run_immediate` does
/// not return until that submission has finished, so the buffer is always
/// free when it is recorded again.
pub struct QueueHandle<G: Gpu> {
    gpu: Arc<G>,
    queue: vk::Queue,
    family: u32,
    pool: vk::CommandPool,
    cmd: vk::CommandBuffer,
    timeline: Timeline,
    wait: WaitPolicy,
}

impl<G: Gpu> QueueHandle<G> {
    pub fn new(gpu: Arc<G>, family: u32, wait: WaitPolicy) -> VkResultOf<Self> {
        let queue = gpu.device_queue(family);
        let pool = gpu.create_command_pool(family).op("create command pool")?;
        let cmd = match gpu.allocate_command_buffer(pool) {
            Ok(c) => c,
            Err(e) => {
                gpu.destroy_command_pool(pool);
                return Err(e).op("allocate command buffer");
            }
        };
        let timeline = match Timeline::create(&*gpu) {
            Ok(t) => t,
            Err(e) => {
                gpu.destroy_command_pool(pool);
                return Err(e);
            }
        };
        debug!(family, "queue handle ready");
        Ok(Self {
            gpu,
            queue,
            family,
            pool,
            cmd,
            timeline,
            wait,
        })
    }

    pub fn gpu(&self) -> &Arc<G> {
        &self.gpu
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn family(&self) -> u32 {
        self.family
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        self.wait
    }

    pub fn submit(&self, submit: &Submit<'_>) -> VkResultOf<()> {
        self.gpu.queue_submit(self.queue, submit).op("queue submit")
    }

    /// Records `record` into the one-shot buffer, submits it and blocks until
    /// the GPU has executed it.
    pub fn run_immediate<F>(&mut self, record: F) -> VkResultOf<()>
    where
        F: FnOnce(&G, vk::CommandBuffer) -> VkResultOf<()>,
    {
        let gpu = Arc::clone(&self.gpu);
        gpu.begin_commands(self.cmd).op("begin one-shot commands")?;
        record(&gpu, self.cmd)?;
        gpu.end_commands(self.cmd).op("end one-shot commands")?;

        let (_, signal) = self.timeline.advance();
        let signals = [SemaphoreOp::timeline(
            self.timeline.semaphore(),
            signal,
            vk::PipelineStageFlags2::ALL_COMMANDS,
        )];
        self.submit(&Submit {
            command_buffer: self.cmd,
            waits: &[],
            signals: &signals,
        })?;
        self.timeline.wait_for(&*gpu, signal, self.wait)
    }
}

impl<G: Gpu> Drop for QueueHandle<G> {
    fn drop(&mut self) {
        self.gpu.destroy_command_pool(self.pool);
        self.timeline.destroy(&*self.gpu);
    }
}
