// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Vulkan backend of the presentation engine.
//!
//! `VkPresenter` drives one `RenderStep` into a `SurfaceChain` and implements
//! `presto_render::Presenter`. Everything above the `Gpu` trait is plain
//! bookkeeping and is tested against an in-memory device.

mod bootstrap;
mod error;
mod frame;
mod gpu;
mod image;
mod overlay;
mod presenter;
mod queue;
mod render_step;
mod swapchain;
mod sync;
mod vulkan;

#[cfg(test)]
mod fake;

pub use ash::vk;
pub use bootstrap::{select_queue_family, BootstrapConfig, DeviceSupport, FamilyCaps};
pub use error::{VkError, VkResultExt, VkResultOf};
pub use frame::{CommandSlot, FrameSlot};
pub use gpu::{BlitDesc, Gpu, ImageBarrier, ImageDesc, QueueFamilies, SemaphoreOp, Submit, SwapchainDesc};
pub use image::{Access, ImageResource, ImageState};
pub use overlay::{FrameTimeOverlay, NoOverlay, Overlay, OverlayContext};
pub use presenter::VkPresenter;
pub use queue::QueueHandle;
pub use render_step::{drift_color, ClearStep, RenderStep, SourceImage, SOURCE_FORMAT};
pub use swapchain::{ChainConfig, ChainState, PresentModePref, SurfaceChain};
pub use sync::{retry_wait, Timeline, WaitPolicy};
pub use vulkan::VulkanGpu;
