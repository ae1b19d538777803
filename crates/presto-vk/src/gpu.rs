// SPDX-License-Identifier: CEPL-1.0
//! The device calls the presentation engine makes, behind one trait so the
//! frame protocol can be exercised without a GPU.
//!
//! Handles passed in must have been created through the same `Gpu`. Command
//! recording methods assume the buffer is between `begin_commands` and
//! `end_commands`.
use ash::prelude::VkResult;
use ash::vk;

/// Queue families picked at bootstrap. `graphics == present` is validated there.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct SwapchainDesc {
    pub min_image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub present_mode: vk::PresentModeKHR,
    pub old_swapchain: vk::SwapchainKHR,
}

#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

#[derive(Clone, Copy, Debug)]
pub struct BlitDesc {
    pub src: vk::Image,
    pub src_layout: vk::ImageLayout,
    pub src_extent: vk::Extent2D,
    pub dst: vk::Image,
    pub dst_layout: vk::ImageLayout,
    pub dst_extent: vk::Extent2D,
    pub filter: vk::Filter,
}

/// One semaphore wait or signal. `value` is ignored for binary semaphores.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SemaphoreOp {
    pub semaphore: vk::Semaphore,
    pub value: u64,
    pub stage: vk::PipelineStageFlags2,
}

impl SemaphoreOp {
    pub fn binary(semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        Self {
            semaphore,
            value: 0,
            stage,
        }
    }

    pub fn timeline(semaphore: vk::Semaphore, value: u64, stage: vk::PipelineStageFlags2) -> Self {
        Self {
            semaphore,
            value,
            stage,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Submit<'a> {
    pub command_buffer: vk::CommandBuffer,
    pub waits: &'a [SemaphoreOp],
    pub signals: &'a [SemaphoreOp],
}

pub trait Gpu {
    fn queue_families(&self) -> QueueFamilies;
    fn device_queue(&self, family: u32) -> vk::Queue;
    fn device_wait_idle(&self) -> VkResult<()>;

    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>>;
    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>>;

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    /// `Ok((index, suboptimal))`; timeouts surface as `Err(TIMEOUT)` / `Err(NOT_READY)`.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    /// `Ok(suboptimal)`.
    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool>;

    fn create_image(&self, desc: &ImageDesc) -> VkResult<(vk::Image, vk::DeviceMemory)>;
    fn destroy_image(&self, image: vk::Image, memory: vk::DeviceMemory);
    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_command_pool(&self, family: u32) -> VkResult<vk::CommandPool>;
    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer>;
    /// Also frees every buffer allocated from the pool.
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    /// Resets the buffer and begins a one-time-submit recording.
    fn begin_commands(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn end_commands(&self, cmd: vk::CommandBuffer) -> VkResult<()>;

    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &ImageBarrier);
    fn cmd_blit(&self, cmd: vk::CommandBuffer, blit: &BlitDesc);
    fn cmd_clear_color(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        rgba: [f32; 4],
    );
    fn cmd_begin_rendering(
        &self,
        cmd: vk::CommandBuffer,
        view: vk::ImageView,
        layout: vk::ImageLayout,
        extent: vk::Extent2D,
    );
    /// Clears rectangles of color attachment 0 inside a rendering scope.
    fn cmd_clear_rects(&self, cmd: vk::CommandBuffer, rgba: [f32; 4], rects: &[vk::Rect2D]);
    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer);

    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn create_timeline_semaphore(&self, initial: u64) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    /// Blocks until the counter reaches `value`; `Err(TIMEOUT)` after `timeout_ns`.
    fn wait_timeline(&self, semaphore: vk::Semaphore, value: u64, timeout_ns: u64) -> VkResult<()>;

    fn queue_submit(&self, queue: vk::Queue, submit: &Submit<'_>) -> VkResult<()>;
}
