// SPDX-License-Identifier: CEPL-1.0
//! Images that remember their own layout and last use.
//!
//! Every transition is built from the tracked state, so callers only say
//! where the image is going. Recording a transition updates the state
//! immediately; the recorded order in a command buffer must therefore match
//! the order of `transition` calls.
use ash::vk;
use bitflags::bitflags;

use crate::error::{VkResultExt, VkResultOf};
use crate::gpu::{Gpu, ImageBarrier, ImageDesc};

bitflags! {
    /// How a pipeline stage touches an image.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl Access {
    pub fn memory_mask(self) -> vk::AccessFlags2 {
        let mut mask = vk::AccessFlags2::NONE;
        if self.contains(Access::READ) {
            mask |= vk::AccessFlags2::MEMORY_READ;
        }
        if self.contains(Access::WRITE) {
            mask |= vk::AccessFlags2::MEMORY_WRITE;
        }
        mask
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageState {
    pub layout: vk::ImageLayout,
    pub stage: vk::PipelineStageFlags2,
    pub access: Access,
}

impl ImageState {
    pub const UNDEFINED: ImageState = ImageState {
        layout: vk::ImageLayout::UNDEFINED,
        stage: vk::PipelineStageFlags2::NONE,
        access: Access::empty(),
    };

    pub const fn new(layout: vk::ImageLayout, stage: vk::PipelineStageFlags2, access: Access) -> Self {
        Self {
            layout,
            stage,
            access,
        }
    }
}

#[derive(Debug)]
pub struct ImageResource {
    image: vk::Image,
    view: vk::ImageView,
    /// `None` for images owned by a swapchain.
    memory: Option<vk::DeviceMemory>,
    extent: vk::Extent2D,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    state: ImageState,
}

impl ImageResource {
    /// Creates, binds and views a new color image. Starts out `UNDEFINED`.
    pub fn allocate<G: Gpu>(gpu: &G, desc: &ImageDesc) -> VkResultOf<Self> {
        let aspect = vk::ImageAspectFlags::COLOR;
        let (image, memory) = gpu.create_image(desc).op("create image")?;
        let view = match gpu.create_image_view(image, desc.format, aspect) {
            Ok(v) => v,
            Err(e) => {
                gpu.destroy_image(image, memory);
                return Err(e).op("create image view");
            }
        };
        Ok(Self {
            image,
            view,
            memory: Some(memory),
            extent: desc.extent,
            format: desc.format,
            aspect,
            state: ImageState::UNDEFINED,
        })
    }

    /// Wraps an image the swapchain owns; only the view is ours to destroy.
    pub fn borrowed<G: Gpu>(
        gpu: &G,
        image: vk::Image,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> VkResultOf<Self> {
        let aspect = vk::ImageAspectFlags::COLOR;
        let view = gpu
            .create_image_view(image, format, aspect)
            .op("create swapchain image view")?;
        Ok(Self {
            image,
            view,
            memory: None,
            extent,
            format,
            aspect,
            state: ImageState::UNDEFINED,
        })
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn state(&self) -> ImageState {
        self.state
    }

    pub fn layout(&self) -> vk::ImageLayout {
        self.state.layout
    }

    /// The barrier that would move the image from its tracked state to `to`.
    pub fn barrier_to(&self, to: ImageState) -> ImageBarrier {
        ImageBarrier {
            image: self.image,
            aspect: self.aspect,
            old_layout: self.state.layout,
            new_layout: to.layout,
            src_stage: self.state.stage,
            src_access: self.state.access.memory_mask(),
            dst_stage: to.stage,
            dst_access: to.access.memory_mask(),
        }
    }

    /// Records one barrier into `cmd` and adopts `layout`, `stage` and
    /// `access` as the new tracked state.
    pub fn transition<G: Gpu>(
        &mut self,
        gpu: &G,
        cmd: vk::CommandBuffer,
        layout: vk::ImageLayout,
        stage: vk::PipelineStageFlags2,
        access: Access,
    ) {
        let to = ImageState::new(layout, stage, access);
        gpu.cmd_image_barrier(cmd, &self.barrier_to(to));
        self.state = to;
    }

    /// Forgets the contents. The next transition starts from `UNDEFINED`,
    /// ordered after `available_at` (the stage an external wait reached).
    pub fn discard_contents(&mut self, available_at: vk::PipelineStageFlags2) {
        self.state = ImageState::new(vk::ImageLayout::UNDEFINED, available_at, Access::empty());
    }

    pub fn debug_assert_layout(&self, expected: vk::ImageLayout) {
        debug_assert_eq!(
            self.state.layout, expected,
            "image {:?} is in {:?}, expected {:?}",
            self.image, self.state.layout, expected
        );
    }

    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        if self.view != vk::ImageView::null() {
            gpu.destroy_image_view(self.view);
            self.view = vk::ImageView::null();
        }
        if let Some(memory) = self.memory.take() {
            gpu.destroy_image(self.image, memory);
        }
        self.image = vk::Image::null();
    }
}
