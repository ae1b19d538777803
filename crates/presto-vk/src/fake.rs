// SPDX-License-Identifier: CEPL-1.0
//! In-memory `Gpu` for unit tests.
//!
//! Submissions execute in queue order but only "finish" when the CPU waits
//! for them (or the device goes idle), so a missing wait shows up as a
//! recorded violation instead of silently passing. A present keeps its wait
//! semaphore busy until the same image is acquired again.
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};

use ash::prelude::VkResult;
use ash::vk::{self, Handle};

use crate::gpu::{BlitDesc, Gpu, ImageBarrier, ImageDesc, QueueFamilies, SemaphoreOp, Submit, SwapchainDesc};

#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    CreateSwapchain { extent: vk::Extent2D, min_images: u32, old: vk::SwapchainKHR },
    DestroySwapchain(vk::SwapchainKHR),
    Acquire(vk::SwapchainKHR),
    Present { index: u32, wait: vk::Semaphore },
    Begin(vk::CommandBuffer),
    End(vk::CommandBuffer),
    Barrier(ImageBarrier),
    Blit { src: vk::Image, dst: vk::Image, src_extent: vk::Extent2D, dst_extent: vk::Extent2D },
    ClearColor { image: vk::Image, layout: vk::ImageLayout },
    BeginRendering { view: vk::ImageView, layout: vk::ImageLayout },
    ClearRects(usize),
    EndRendering,
    Submit { cmd: vk::CommandBuffer, waits: Vec<SemaphoreOp>, signals: Vec<SemaphoreOp> },
    WaitTimeline { semaphore: vk::Semaphore, value: u64 },
    WaitIdle,
}

pub struct FakeGpu {
    next: Cell<u64>,
    ops: RefCell<Vec<Op>>,
    caps: Cell<vk::SurfaceCapabilitiesKHR>,
    pub formats: RefCell<Vec<vk::SurfaceFormatKHR>>,
    pub modes: RefCell<Vec<vk::PresentModeKHR>>,
    pub acquire_script: RefCell<VecDeque<VkResult<(u32, bool)>>>,
    pub present_script: RefCell<VecDeque<VkResult<bool>>>,
    /// Upcoming timeline waits that report TIMEOUT before succeeding.
    pub stalled_waits: Cell<u32>,
    pub device_lost: Cell<bool>,
    families: QueueFamilies,

    live: RefCell<HashSet<u64>>,
    pools: RefCell<HashMap<vk::CommandPool, Vec<vk::CommandBuffer>>>,
    swapchains: RefCell<HashMap<vk::SwapchainKHR, (Vec<vk::Image>, u32)>>,
    timelines: RefCell<HashMap<vk::Semaphore, u64>>,
    binary_signaled: RefCell<HashMap<vk::Semaphore, bool>>,
    presenting: RefCell<HashMap<(vk::SwapchainKHR, u32), vk::Semaphore>>,
    in_flight: RefCell<VecDeque<Vec<SemaphoreOp>>>,
    last_signals: RefCell<HashMap<vk::CommandBuffer, Vec<SemaphoreOp>>>,
    violations: RefCell<Vec<String>>,
}

impl FakeGpu {
    pub fn new(width: u32, height: u32) -> Self {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D { width, height },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 8192,
                height: 8192,
            },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::TRANSFER_SRC,
            ..Default::default()
        };
        Self {
            next: Cell::new(0x1000),
            ops: RefCell::default(),
            caps: Cell::new(caps),
            formats: RefCell::new(vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ]),
            modes: RefCell::new(vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            acquire_script: RefCell::default(),
            present_script: RefCell::default(),
            stalled_waits: Cell::new(0),
            device_lost: Cell::new(false),
            families: QueueFamilies {
                graphics: 0,
                present: 0,
            },
            live: RefCell::default(),
            pools: RefCell::default(),
            swapchains: RefCell::default(),
            timelines: RefCell::default(),
            binary_signaled: RefCell::default(),
            presenting: RefCell::default(),
            in_flight: RefCell::default(),
            last_signals: RefCell::default(),
            violations: RefCell::default(),
        }
    }

    pub fn with_families(mut self, graphics: u32, present: u32) -> Self {
        self.families = QueueFamilies { graphics, present };
        self
    }

    pub fn set_extent(&self, width: u32, height: u32) {
        let mut caps = self.caps.get();
        caps.current_extent = vk::Extent2D { width, height };
        self.caps.set(caps);
    }

    pub fn update_caps(&self, f: impl FnOnce(&mut vk::SurfaceCapabilitiesKHR)) {
        let mut caps = self.caps.get();
        f(&mut caps);
        self.caps.set(caps);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.borrow().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.borrow_mut().clear();
    }

    pub fn count(&self, pred: impl Fn(&Op) -> bool) -> usize {
        self.ops.borrow().iter().filter(|op| pred(op)).count()
    }

    pub fn barriers(&self) -> Vec<ImageBarrier> {
        self.ops
            .borrow()
            .iter()
            .filter_map(|op| match op {
                Op::Barrier(b) => Some(*b),
                _ => None,
            })
            .collect()
    }

    pub fn violations(&self) -> Vec<String> {
        self.violations.borrow().clone()
    }

    pub fn live_handles(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn completed(&self, semaphore: vk::Semaphore) -> u64 {
        self.timelines.borrow().get(&semaphore).copied().unwrap_or(0)
    }

    /// Completes every submission still on the queue.
    pub fn finish_all(&self) {
        while self.retire_one() {}
    }

    fn handle<H: Handle>(&self) -> H {
        let raw = self.next.get() + 1;
        self.next.set(raw);
        H::from_raw(raw)
    }

    fn track<H: Handle + Copy>(&self) -> H {
        let h: H = self.handle();
        self.live.borrow_mut().insert(h.as_raw());
        h
    }

    fn untrack<H: Handle + Copy>(&self, h: H) {
        if !self.live.borrow_mut().remove(&h.as_raw()) {
            self.violate(format!("destroyed unknown handle {:#x}", h.as_raw()));
        }
    }

    fn violate(&self, msg: String) {
        self.violations.borrow_mut().push(msg);
    }

    fn record(&self, op: Op) {
        self.ops.borrow_mut().push(op);
    }

    fn is_timeline(&self, semaphore: vk::Semaphore) -> bool {
        self.timelines.borrow().contains_key(&semaphore)
    }

    fn retire_one(&self) -> bool {
        let Some(batch) = self.in_flight.borrow_mut().pop_front() else {
            return false;
        };
        let mut timelines = self.timelines.borrow_mut();
        for op in batch {
            if let Some(v) = timelines.get_mut(&op.semaphore) {
                *v = (*v).max(op.value);
            }
        }
        true
    }

    fn highest_scheduled(&self, semaphore: vk::Semaphore) -> u64 {
        let pending = self
            .in_flight
            .borrow()
            .iter()
            .flatten()
            .filter(|op| op.semaphore == semaphore)
            .map(|op| op.value)
            .max()
            .unwrap_or(0);
        pending.max(self.completed(semaphore))
    }

    fn consume_binary(&self, semaphore: vk::Semaphore, who: &str) {
        let mut signaled = self.binary_signaled.borrow_mut();
        match signaled.get_mut(&semaphore) {
            Some(s) if *s => *s = false,
            _ => self.violate(format!("{who} waits on unsignaled binary semaphore {:#x}", semaphore.as_raw())),
        }
    }

    fn signal_binary(&self, semaphore: vk::Semaphore, who: &str) {
        if self.presenting.borrow().values().any(|&s| s == semaphore) {
            self.violate(format!(
                "{who} signals semaphore {:#x} still held by a pending present",
                semaphore.as_raw()
            ));
        }
        let mut signaled = self.binary_signaled.borrow_mut();
        match signaled.get_mut(&semaphore) {
            Some(s) if !*s => *s = true,
            _ => self.violate(format!("{who} signals busy binary semaphore {:#x}", semaphore.as_raw())),
        }
    }
}

impl Gpu for FakeGpu {
    fn queue_families(&self) -> QueueFamilies {
        self.families
    }

    fn device_queue(&self, family: u32) -> vk::Queue {
        vk::Queue::from_raw(0x10 + family as u64)
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        self.record(Op::WaitIdle);
        self.finish_all();
        Ok(())
    }

    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        Ok(self.caps.get())
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.formats.borrow().clone())
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.modes.borrow().clone())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        self.record(Op::CreateSwapchain {
            extent: desc.extent,
            min_images: desc.min_image_count,
            old: desc.old_swapchain,
        });
        let swapchain: vk::SwapchainKHR = self.track();
        let images = (0..desc.min_image_count).map(|_| self.handle()).collect();
        self.swapchains.borrow_mut().insert(swapchain, (images, 0));
        Ok(swapchain)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.swapchains
            .borrow()
            .get(&swapchain)
            .map(|(images, _)| images.clone())
            .ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.record(Op::DestroySwapchain(swapchain));
        self.swapchains.borrow_mut().remove(&swapchain);
        self.presenting.borrow_mut().retain(|(sc, _), _| *sc != swapchain);
        self.untrack(swapchain);
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        self.record(Op::Acquire(swapchain));
        let scripted = self.acquire_script.borrow_mut().pop_front();
        let result = match scripted {
            Some(r) => r,
            None => {
                let mut chains = self.swapchains.borrow_mut();
                let (images, cursor) = chains.get_mut(&swapchain).ok_or(vk::Result::ERROR_UNKNOWN)?;
                let index = *cursor;
                *cursor = (*cursor + 1) % images.len() as u32;
                Ok((index, false))
            }
        };
        if let Ok((index, _)) = result {
            self.presenting.borrow_mut().remove(&(swapchain, index));
            self.signal_binary(signal, "acquire");
        }
        result
    }

    fn queue_present(
        &self,
        _queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        self.record(Op::Present {
            index: image_index,
            wait,
        });
        self.consume_binary(wait, "present");
        self.presenting.borrow_mut().insert((swapchain, image_index), wait);
        self.present_script.borrow_mut().pop_front().unwrap_or(Ok(false))
    }

    fn create_image(&self, _desc: &ImageDesc) -> VkResult<(vk::Image, vk::DeviceMemory)> {
        Ok((self.track(), self.track()))
    }

    fn destroy_image(&self, image: vk::Image, memory: vk::DeviceMemory) {
        self.untrack(image);
        self.untrack(memory);
    }

    fn create_image_view(
        &self,
        _image: vk::Image,
        _format: vk::Format,
        _aspect: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView> {
        Ok(self.track())
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.untrack(view);
    }

    fn create_command_pool(&self, _family: u32) -> VkResult<vk::CommandPool> {
        let pool = self.track();
        self.pools.borrow_mut().insert(pool, Vec::new());
        Ok(pool)
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        let cmd = self.handle();
        self.pools
            .borrow_mut()
            .get_mut(&pool)
            .ok_or(vk::Result::ERROR_UNKNOWN)?
            .push(cmd);
        Ok(cmd)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        if let Some(cmds) = self.pools.borrow_mut().remove(&pool) {
            let mut last = self.last_signals.borrow_mut();
            for cmd in cmds {
                last.remove(&cmd);
            }
        }
        self.untrack(pool);
    }

    fn begin_commands(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.record(Op::Begin(cmd));
        if let Some(signals) = self.last_signals.borrow().get(&cmd) {
            for op in signals.iter().filter(|op| self.is_timeline(op.semaphore)) {
                if self.completed(op.semaphore) < op.value {
                    self.violate(format!(
                        "command buffer {:#x} re-recorded before its previous submission completed",
                        cmd.as_raw()
                    ));
                }
            }
        }
        Ok(())
    }

    fn end_commands(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.record(Op::End(cmd));
        Ok(())
    }

    fn cmd_image_barrier(&self, _cmd: vk::CommandBuffer, barrier: &ImageBarrier) {
        self.record(Op::Barrier(*barrier));
    }

    fn cmd_blit(&self, _cmd: vk::CommandBuffer, blit: &BlitDesc) {
        self.record(Op::Blit {
            src: blit.src,
            dst: blit.dst,
            src_extent: blit.src_extent,
            dst_extent: blit.dst_extent,
        });
    }

    fn cmd_clear_color(
        &self,
        _cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        _rgba: [f32; 4],
    ) {
        self.record(Op::ClearColor { image, layout });
    }

    fn cmd_begin_rendering(
        &self,
        _cmd: vk::CommandBuffer,
        view: vk::ImageView,
        layout: vk::ImageLayout,
        _extent: vk::Extent2D,
    ) {
        self.record(Op::BeginRendering { view, layout });
    }

    fn cmd_clear_rects(&self, _cmd: vk::CommandBuffer, _rgba: [f32; 4], rects: &[vk::Rect2D]) {
        self.record(Op::ClearRects(rects.len()));
    }

    fn cmd_end_rendering(&self, _cmd: vk::CommandBuffer) {
        self.record(Op::EndRendering);
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let s = self.track();
        self.binary_signaled.borrow_mut().insert(s, false);
        Ok(s)
    }

    fn create_timeline_semaphore(&self, initial: u64) -> VkResult<vk::Semaphore> {
        let s = self.track();
        self.timelines.borrow_mut().insert(s, initial);
        Ok(s)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.timelines.borrow_mut().remove(&semaphore);
        self.binary_signaled.borrow_mut().remove(&semaphore);
        self.presenting.borrow_mut().retain(|_, s| *s != semaphore);
        self.untrack(semaphore);
    }

    fn wait_timeline(&self, semaphore: vk::Semaphore, value: u64, _timeout_ns: u64) -> VkResult<()> {
        self.record(Op::WaitTimeline { semaphore, value });
        if self.device_lost.get() {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        if self.stalled_waits.get() > 0 {
            self.stalled_waits.set(self.stalled_waits.get() - 1);
            return Err(vk::Result::TIMEOUT);
        }
        while self.completed(semaphore) < value {
            if !self.retire_one() {
                return Err(vk::Result::TIMEOUT);
            }
        }
        Ok(())
    }

    fn queue_submit(&self, _queue: vk::Queue, submit: &Submit<'_>) -> VkResult<()> {
        if self.device_lost.get() {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        for op in submit.waits {
            if self.is_timeline(op.semaphore) {
                if self.highest_scheduled(op.semaphore) < op.value {
                    self.violate(format!(
                        "submit waits for value {} that nothing will signal",
                        op.value
                    ));
                }
            } else {
                self.consume_binary(op.semaphore, "submit");
            }
        }
        for op in submit.signals {
            if self.is_timeline(op.semaphore) {
                if op.value <= self.highest_scheduled(op.semaphore) {
                    self.violate(format!("timeline signal {} is not increasing", op.value));
                }
            } else {
                self.signal_binary(op.semaphore, "submit");
            }
        }
        self.record(Op::Submit {
            cmd: submit.command_buffer,
            waits: submit.waits.to_vec(),
            signals: submit.signals.to_vec(),
        });
        self.last_signals
            .borrow_mut()
            .insert(submit.command_buffer, submit.signals.to_vec());
        self.in_flight.borrow_mut().push_back(submit.signals.to_vec());
        Ok(())
    }
}
