// SPDX-License-Identifier: CEPL-1.0
//! `Gpu` over a real device.
//!
//! Every method forwards to one ash call. Handles are trusted to come from
//! this device; ash's own preconditions are what the unsafe blocks rely on.
use ash::prelude::VkResult;
use ash::{khr, vk, Entry, Instance};

use crate::gpu::{BlitDesc, Gpu, ImageBarrier, ImageDesc, QueueFamilies, Submit, SwapchainDesc};

pub struct VulkanGpu {
    pub(crate) _entry: Entry,
    pub(crate) instance: Instance,
    pub(crate) debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub(crate) surface_loader: khr::surface::Instance,
    pub(crate) surface: vk::SurfaceKHR,

    pub(crate) phys: vk::PhysicalDevice,
    pub(crate) device: ash::Device,
    pub(crate) families: QueueFamilies,
    pub(crate) memory: vk::PhysicalDeviceMemoryProperties,
    pub(crate) swapchain_loader: khr::swapchain::Device,
}

impl Drop for VulkanGpu {
    fn drop(&mut self) {
        // STRICT TEARDOWN ORDER: device → surface → debug messenger → instance
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn color_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: vk::REMAINING_ARRAY_LAYERS,
    }
}

fn color_layers() -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn far_corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    }
}

/// First memory type allowed by `type_bits` with `flags`, else the first allowed at all.
pub(crate) fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let allowed = |i: u32| type_bits & (1 << i) != 0;
    let types = &props.memory_types[..props.memory_type_count as usize];
    (0..types.len() as u32)
        .find(|&i| allowed(i) && types[i as usize].property_flags.contains(flags))
        .or_else(|| (0..types.len() as u32).find(|&i| allowed(i)))
}

impl Gpu for VulkanGpu {
    fn queue_families(&self) -> QueueFamilies {
        self.families
    }

    fn device_queue(&self, family: u32) -> vk::Queue {
        unsafe { self.device.get_device_queue(family, 0) }
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.phys, self.surface)
        }
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.phys, self.surface)
        }
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.phys, self.surface)
        }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let info = vk::SwapchainCreateInfoKHR {
            surface: self.surface,
            min_image_count: desc.min_image_count,
            image_format: desc.format.format,
            image_color_space: desc.format.color_space,
            image_extent: desc.extent,
            image_array_layers: 1,
            image_usage: desc.usage,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: desc.pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: desc.present_mode,
            clipped: vk::TRUE,
            old_swapchain: desc.old_swapchain,
            ..Default::default()
        };
        unsafe { self.swapchain_loader.create_swapchain(&info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, signal, vk::Fence::null())
        }
    }

    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let waits = [wait];
        let swapchains = [swapchain];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        unsafe { self.swapchain_loader.queue_present(queue, &info) }
    }

    fn create_image(&self, desc: &ImageDesc) -> VkResult<(vk::Image, vk::DeviceMemory)> {
        let info = vk::ImageCreateInfo {
            image_type: vk::ImageType::TYPE_2D,
            format: desc.format,
            extent: vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: desc.usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        unsafe {
            let image = self.device.create_image(&info, None)?;
            let reqs = self.device.get_image_memory_requirements(image);
            let Some(type_index) = find_memory_type(
                &self.memory,
                reqs.memory_type_bits,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            ) else {
                self.device.destroy_image(image, None);
                return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
            };
            let alloc = vk::MemoryAllocateInfo {
                allocation_size: reqs.size,
                memory_type_index: type_index,
                ..Default::default()
            };
            let memory = match self.device.allocate_memory(&alloc, None) {
                Ok(m) => m,
                Err(e) => {
                    self.device.destroy_image(image, None);
                    return Err(e);
                }
            };
            if let Err(e) = self.device.bind_image_memory(image, memory, 0) {
                self.device.destroy_image(image, None);
                self.device.free_memory(memory, None);
                return Err(e);
            }
            Ok((image, memory))
        }
    }

    fn destroy_image(&self, image: vk::Image, memory: vk::DeviceMemory) {
        unsafe {
            self.device.destroy_image(image, None);
            self.device.free_memory(memory, None);
        }
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView> {
        let info = vk::ImageViewCreateInfo {
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        unsafe { self.device.create_image_view(&info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_command_pool(&self, family: u32) -> VkResult<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo {
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: family,
            ..Default::default()
        };
        unsafe { self.device.create_command_pool(&info, None) }
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo {
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let bufs = unsafe { self.device.allocate_command_buffers(&info)? };
        bufs.into_iter().next().ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn begin_commands(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let info = vk::CommandBufferBeginInfo {
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            self.device.begin_command_buffer(cmd, &info)
        }
    }

    fn end_commands(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(cmd) }
    }

    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, b: &ImageBarrier) {
        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(b.src_stage)
            .src_access_mask(b.src_access)
            .dst_stage_mask(b.dst_stage)
            .dst_access_mask(b.dst_access)
            .old_layout(b.old_layout)
            .new_layout(b.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(b.image)
            .subresource_range(color_range(b.aspect));
        let dep = vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));
        unsafe { self.device.cmd_pipeline_barrier2(cmd, &dep) }
    }

    fn cmd_blit(&self, cmd: vk::CommandBuffer, blit: &BlitDesc) {
        let region = vk::ImageBlit2::default()
            .src_subresource(color_layers())
            .src_offsets([vk::Offset3D::default(), far_corner(blit.src_extent)])
            .dst_subresource(color_layers())
            .dst_offsets([vk::Offset3D::default(), far_corner(blit.dst_extent)]);
        let info = vk::BlitImageInfo2::default()
            .src_image(blit.src)
            .src_image_layout(blit.src_layout)
            .dst_image(blit.dst)
            .dst_image_layout(blit.dst_layout)
            .regions(std::slice::from_ref(&region))
            .filter(blit.filter);
        unsafe { self.device.cmd_blit_image2(cmd, &info) }
    }

    fn cmd_clear_color(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        rgba: [f32; 4],
    ) {
        let color = vk::ClearColorValue { float32: rgba };
        let range = color_range(vk::ImageAspectFlags::COLOR);
        unsafe {
            self.device
                .cmd_clear_color_image(cmd, image, layout, &color, std::slice::from_ref(&range))
        }
    }

    fn cmd_begin_rendering(
        &self,
        cmd: vk::CommandBuffer,
        view: vk::ImageView,
        layout: vk::ImageLayout,
        extent: vk::Extent2D,
    ) {
        let attachment = vk::RenderingAttachmentInfo::default()
            .image_view(view)
            .image_layout(layout)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE);
        let info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&attachment));
        unsafe { self.device.cmd_begin_rendering(cmd, &info) }
    }

    fn cmd_clear_rects(&self, cmd: vk::CommandBuffer, rgba: [f32; 4], rects: &[vk::Rect2D]) {
        let attachment = vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue { float32: rgba },
            },
        };
        let rects: Vec<vk::ClearRect> = rects
            .iter()
            .map(|&rect| vk::ClearRect {
                rect,
                base_array_layer: 0,
                layer_count: 1,
            })
            .collect();
        unsafe {
            self.device
                .cmd_clear_attachments(cmd, std::slice::from_ref(&attachment), &rects)
        }
    }

    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_rendering(cmd) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&info, None) }
    }

    fn create_timeline_semaphore(&self, initial: u64) -> VkResult<vk::Semaphore> {
        let mut kind = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial);
        let info = vk::SemaphoreCreateInfo::default().push_next(&mut kind);
        unsafe { self.device.create_semaphore(&info, None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn wait_timeline(&self, semaphore: vk::Semaphore, value: u64, timeout_ns: u64) -> VkResult<()> {
        let semaphores = [semaphore];
        let values = [value];
        let info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        unsafe { self.device.wait_semaphores(&info, timeout_ns) }
    }

    fn queue_submit(&self, queue: vk::Queue, submit: &Submit<'_>) -> VkResult<()> {
        let to_info = |op: &crate::gpu::SemaphoreOp| {
            vk::SemaphoreSubmitInfo::default()
                .semaphore(op.semaphore)
                .value(op.value)
                .stage_mask(op.stage)
        };
        let waits: Vec<_> = submit.waits.iter().map(to_info).collect();
        let signals: Vec<_> = submit.signals.iter().map(to_info).collect();
        let cmds = [vk::CommandBufferSubmitInfo::default().command_buffer(submit.command_buffer)];
        let info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&waits)
            .command_buffer_infos(&cmds)
            .signal_semaphore_infos(&signals);
        unsafe {
            self.device
                .queue_submit2(queue, std::slice::from_ref(&info), vk::Fence::null())
        }
    }
}
