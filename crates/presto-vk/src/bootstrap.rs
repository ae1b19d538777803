// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface and device creation.
//!
//! Device selection is explicit: a device qualifies only if it speaks Vulkan
//! 1.3, exposes the swapchain extension, supports synchronization2, dynamic
//! rendering and timeline semaphores, and has one queue family that can both
//! render and present to the window's surface.
use std::ffi::{c_void, CStr, CString};

use ash::{khr, vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, error, info, trace, warn};

use crate::error::{VkError, VkResultExt, VkResultOf};
use crate::gpu::QueueFamilies;
use crate::vulkan::VulkanGpu;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Clone, Debug)]
pub struct BootstrapConfig {
    pub app_name: String,
    /// Enables the Khronos validation layer and routes its messages to tracing.
    pub validation: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            app_name: "presto".into(),
            validation: cfg!(debug_assertions),
        }
    }
}

/// What a physical device offers, as far as presenting is concerned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceSupport {
    pub api_version: u32,
    pub swapchain: bool,
    pub synchronization2: bool,
    pub dynamic_rendering: bool,
    pub timeline_semaphore: bool,
}

impl DeviceSupport {
    /// Names of every missing requirement, empty if the device qualifies.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.api_version < vk::API_VERSION_1_3 {
            out.push("Vulkan 1.3");
        }
        if !self.swapchain {
            out.push("VK_KHR_swapchain");
        }
        if !self.synchronization2 {
            out.push("synchronization2");
        }
        if !self.dynamic_rendering {
            out.push("dynamicRendering");
        }
        if !self.timeline_semaphore {
            out.push("timelineSemaphore");
        }
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FamilyCaps {
    pub graphics: bool,
    pub present: bool,
}

/// The first family that can both render and present.
pub fn select_queue_family(families: &[FamilyCaps]) -> Result<u32, String> {
    if let Some(i) = families.iter().position(|f| f.graphics && f.present) {
        return Ok(i as u32);
    }
    let graphics = families.iter().any(|f| f.graphics);
    let present = families.iter().any(|f| f.present);
    Err(match (graphics, present) {
        (false, _) => "no queue family supports graphics".into(),
        (true, false) => "no queue family can present to the surface".into(),
        (true, true) => "graphics and presentation are only available on separate queue families".into(),
    })
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    // SAFETY: the loader passes valid callback data for the duration of the call
    let message = unsafe { (*data).message_as_c_str() }
        .map(|m| m.to_string_lossy())
        .unwrap_or_default();
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!(target: "vulkan", "[{kind:?}] {message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!(target: "vulkan", "[{kind:?}] {message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => debug!(target: "vulkan", "[{kind:?}] {message}"),
        _ => trace!(target: "vulkan", "[{kind:?}] {message}"),
    }
    vk::FALSE
}

unsafe fn has_layer(entry: &Entry, name: &CStr) -> bool {
    unsafe { entry.enumerate_instance_layer_properties() }
        .unwrap_or_default()
        .iter()
        .any(|l| l.layer_name_as_c_str() == Ok(name))
}

unsafe fn has_instance_ext(entry: &Entry, name: &CStr) -> bool {
    unsafe { entry.enumerate_instance_extension_properties(None) }
        .unwrap_or_default()
        .iter()
        .any(|e| e.extension_name_as_c_str() == Ok(name))
}

/// Returns the instance and whether debug utils were enabled on it.
unsafe fn create_instance(
    entry: &Entry,
    display: raw_window_handle::RawDisplayHandle,
    cfg: &BootstrapConfig,
) -> VkResultOf<(Instance, bool)> {
    let app_name = CString::new(cfg.app_name.as_str())
        .map_err(|_| VkError::Bootstrap("application name contains a NUL byte".into()))?;
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .engine_name(c"presto")
        .api_version(vk::API_VERSION_1_3);

    let mut exts = ash_window::enumerate_required_extensions(display)
        .op("enumerate surface extensions")?
        .to_vec();
    let mut layers = Vec::new();
    let mut debug_utils = false;
    if cfg.validation {
        if unsafe { has_layer(entry, VALIDATION_LAYER) } {
            layers.push(VALIDATION_LAYER.as_ptr());
        } else {
            warn!("validation requested but {VALIDATION_LAYER:?} is not installed");
        }
        if unsafe { has_instance_ext(entry, ash::ext::debug_utils::NAME) } {
            exts.push(ash::ext::debug_utils::NAME.as_ptr());
            debug_utils = true;
        }
    }

    let info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&exts);
    let instance = unsafe { entry.create_instance(&info, None) }.op("create instance")?;
    Ok((instance, debug_utils))
}

unsafe fn create_messenger(
    entry: &Entry,
    instance: &Instance,
) -> Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let loader = ash::ext::debug_utils::Instance::new(entry, instance);
    let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));
    match unsafe { loader.create_debug_utils_messenger(&info, None) } {
        Ok(m) => Some((loader, m)),
        Err(e) => {
            warn!("debug messenger unavailable: {e}");
            None
        }
    }
}

unsafe fn query_support(instance: &Instance, phys: vk::PhysicalDevice) -> DeviceSupport {
    let props = unsafe { instance.get_physical_device_properties(phys) };
    let swapchain = unsafe { instance.enumerate_device_extension_properties(phys) }
        .unwrap_or_default()
        .iter()
        .any(|e| e.extension_name_as_c_str() == Ok(khr::swapchain::NAME));

    let mut f12 = vk::PhysicalDeviceVulkan12Features::default();
    let mut f13 = vk::PhysicalDeviceVulkan13Features::default();
    if props.api_version >= vk::API_VERSION_1_3 {
        let mut f2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut f12)
            .push_next(&mut f13);
        unsafe { instance.get_physical_device_features2(phys, &mut f2) };
    }
    DeviceSupport {
        api_version: props.api_version,
        swapchain,
        synchronization2: f13.synchronization2 == vk::TRUE,
        dynamic_rendering: f13.dynamic_rendering == vk::TRUE,
        timeline_semaphore: f12.timeline_semaphore == vk::TRUE,
    }
}

unsafe fn pick_device(
    instance: &Instance,
    surface_loader: &khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> VkResultOf<(vk::PhysicalDevice, u32)> {
    let devices = unsafe { instance.enumerate_physical_devices() }.op("enumerate physical devices")?;
    let mut rejected = Vec::new();
    for phys in devices {
        let props = unsafe { instance.get_physical_device_properties(phys) };
        let name = props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "<unnamed>".into());

        let missing = unsafe { query_support(instance, phys) }.missing();
        if !missing.is_empty() {
            rejected.push(format!("{name}: missing {}", missing.join(", ")));
            continue;
        }

        let families: Vec<FamilyCaps> = unsafe { instance.get_physical_device_queue_family_properties(phys) }
            .iter()
            .enumerate()
            .map(|(i, q)| FamilyCaps {
                graphics: q.queue_count > 0 && q.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                present: unsafe {
                    surface_loader.get_physical_device_surface_support(phys, i as u32, surface)
                }
                .unwrap_or(false),
            })
            .collect();
        match select_queue_family(&families) {
            Ok(family) => {
                info!("using {name} (queue family {family})");
                return Ok((phys, family));
            }
            Err(why) => rejected.push(format!("{name}: {why}")),
        }
    }
    if rejected.is_empty() {
        rejected.push("no Vulkan devices found".into());
    }
    Err(VkError::Bootstrap(rejected.join("; ")))
}

unsafe fn create_device(instance: &Instance, phys: vk::PhysicalDevice, family: u32) -> VkResultOf<ash::Device> {
    let priorities = [1.0_f32];
    let queues = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(family)
        .queue_priorities(&priorities)];
    let exts = [khr::swapchain::NAME.as_ptr()];
    let mut f12 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);
    let mut f13 = vk::PhysicalDeviceVulkan13Features::default()
        .synchronization2(true)
        .dynamic_rendering(true);
    let info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queues)
        .enabled_extension_names(&exts)
        .push_next(&mut f12)
        .push_next(&mut f13);
    unsafe { instance.create_device(phys, &info, None) }.op("create device")
}

impl VulkanGpu {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        cfg: &BootstrapConfig,
    ) -> VkResultOf<Self> {
        let dh = display
            .display_handle()
            .map_err(|e| VkError::Bootstrap(format!("display handle: {e}")))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| VkError::Bootstrap(format!("window handle: {e}")))?
            .as_raw();

        // SAFETY: every object below is created from the one before it and
        // destroyed in reverse on the error paths or by `VulkanGpu::drop`.
        unsafe {
            let entry = Entry::load()?;
            let (instance, debug_utils) = create_instance(&entry, dh, cfg)?;
            let debug = if debug_utils {
                create_messenger(&entry, &instance)
            } else {
                None
            };
            let destroy_instance = |debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>| {
                if let Some((loader, m)) = debug {
                    loader.destroy_debug_utils_messenger(m, None);
                }
                instance.destroy_instance(None);
            };

            let surface = match ash_window::create_surface(&entry, &instance, dh, wh, None) {
                Ok(s) => s,
                Err(e) => {
                    destroy_instance(debug);
                    return Err(VkError::call("create surface", e));
                }
            };
            let surface_loader = khr::surface::Instance::new(&entry, &instance);

            let picked = pick_device(&instance, &surface_loader, surface)
                .and_then(|(phys, family)| Ok((phys, family, create_device(&instance, phys, family)?)));
            let (phys, family, device) = match picked {
                Ok(p) => p,
                Err(e) => {
                    surface_loader.destroy_surface(surface, None);
                    destroy_instance(debug);
                    return Err(e);
                }
            };

            let memory = instance.get_physical_device_memory_properties(phys);
            let swapchain_loader = khr::swapchain::Device::new(&instance, &device);
            let validation = debug.is_some();
            info!(validation, "Vulkan device ready");
            Ok(Self {
                _entry: entry,
                instance,
                debug,
                surface_loader,
                surface,
                phys,
                device,
                families: QueueFamilies {
                    graphics: family,
                    present: family,
                },
                memory,
                swapchain_loader,
            })
        }
    }
}
