/// GpuContext - instance, device and allocator shared by every Vulkan object
///
/// Each wrapper in this crate holds an `Arc<GpuContext>`, so the context
/// (and with it the device and instance) outlives every handle created
/// from it.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use kludge_engine::kludge::{Config, Error, Result};
use kludge_engine::{engine_error, engine_info, engine_warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::sync::Mutex;

use crate::vulkan_format::vk_error;

/// One device queue and its family
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueueInfo {
    pub queue: vk::Queue,
    pub family: u32,
}

/// Presentation surface of the window the device was created for
pub(crate) struct SurfaceContext {
    pub loader: ash::khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
}

pub(crate) struct GpuContext {
    /// Keeps the Vulkan library loaded
    _entry: ash::Entry,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device_name: String,
    pub device: ash::Device,
    /// Dropped before the device is destroyed
    pub allocator: ManuallyDrop<Mutex<Allocator>>,
    pub graphics: QueueInfo,
    pub compute: QueueInfo,
    /// `None` for headless (compute-only) devices
    pub present: Option<QueueInfo>,
    pub surface: Option<SurfaceContext>,
    pub swapchain_loader: Option<ash::khr::swapchain::Device>,
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

struct QueueFamilies {
    graphics: u32,
    compute: u32,
    present: Option<u32>,
}

impl GpuContext {
    /// Create a context; `window` is `None` for a headless device
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: Option<&W>, config: &Config) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| {
                engine_error!("kludge::vulkan", "Failed to load Vulkan library: {:?}", e);
                Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
            })?;

            let display = match window {
                Some(window) => Some(
                    window
                        .display_handle()
                        .map_err(|e| Error::InitializationFailed(format!("Failed to get display handle: {}", e)))?
                        .as_raw(),
                ),
                None => None,
            };

            let validation = validation_requested(config) && validation_layer_available(&entry);
            let instance = create_instance(&entry, config, display, validation)?;

            let debug_messenger = if validation {
                match create_debug_messenger(&entry, &instance) {
                    Ok(messenger) => Some(messenger),
                    Err(e) => {
                        instance.destroy_instance(None);
                        return Err(e);
                    }
                }
            } else {
                None
            };

            let surface = match (window, display) {
                (Some(window), Some(display)) => {
                    let created = window
                        .window_handle()
                        .map_err(|e| Error::InitializationFailed(format!("Failed to get window handle: {}", e)))
                        .and_then(|handle| {
                            ash_window::create_surface(&entry, &instance, display, handle.as_raw(), None)
                                .map_err(|e| vk_error("Failed to create surface", e))
                        });
                    match created {
                        Ok(surface) => Some(SurfaceContext {
                            loader: ash::khr::surface::Instance::new(&entry, &instance),
                            surface,
                        }),
                        Err(e) => {
                            destroy_instance(&instance, None, debug_messenger.as_ref());
                            return Err(e);
                        }
                    }
                }
                _ => None,
            };

            match open_device(&instance, surface.as_ref()) {
                Ok((physical_device, device_name, device, families, allocator)) => {
                    let graphics = QueueInfo {
                        queue: device.get_device_queue(families.graphics, 0),
                        family: families.graphics,
                    };
                    let compute = QueueInfo {
                        queue: device.get_device_queue(families.compute, 0),
                        family: families.compute,
                    };
                    let present = families.present.map(|family| QueueInfo {
                        queue: device.get_device_queue(family, 0),
                        family,
                    });
                    let swapchain_loader = surface
                        .as_ref()
                        .map(|_| ash::khr::swapchain::Device::new(&instance, &device));

                    engine_info!(
                        "kludge::vulkan",
                        "Vulkan device '{}' ready (graphics family {}, compute family {}, present {:?}, validation {})",
                        device_name,
                        graphics.family,
                        compute.family,
                        present.map(|p| p.family),
                        validation
                    );

                    Ok(Self {
                        _entry: entry,
                        instance,
                        physical_device,
                        device_name,
                        device,
                        allocator: ManuallyDrop::new(Mutex::new(allocator)),
                        graphics,
                        compute,
                        present,
                        surface,
                        swapchain_loader,
                        debug_messenger,
                    })
                }
                Err(e) => {
                    destroy_instance(&instance, surface.as_ref(), debug_messenger.as_ref());
                    Err(e)
                }
            }
        }
    }

    pub fn swapchain_loader(&self) -> Result<&ash::khr::swapchain::Device> {
        self.swapchain_loader
            .as_ref()
            .ok_or_else(|| Error::InitializationFailed("device was created without a surface".to_string()))
    }

    pub fn surface(&self) -> Result<&SurfaceContext> {
        self.surface
            .as_ref()
            .ok_or_else(|| Error::InitializationFailed("device was created without a surface".to_string()))
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            // free VkDeviceMemory pages before the device goes away
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
            destroy_instance(&self.instance, self.surface.as_ref(), self.debug_messenger.as_ref());
        }
    }
}

fn validation_requested(config: &Config) -> bool {
    config.enable_validation && cfg!(feature = "vulkan-validation")
}

unsafe fn validation_layer_available(entry: &ash::Entry) -> bool {
    let layers = entry.enumerate_instance_layer_properties().unwrap_or_default();
    let found = layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().map_or(false, |name| name == c"VK_LAYER_KHRONOS_validation"));
    if !found {
        engine_warn!("kludge::vulkan", "Validation requested but VK_LAYER_KHRONOS_validation is not installed");
    }
    found
}

unsafe fn create_instance(
    entry: &ash::Entry,
    config: &Config,
    display: Option<raw_window_handle::RawDisplayHandle>,
    validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(config.app_name.as_str())
        .map_err(|_| Error::InitializationFailed("application name contains a NUL byte".to_string()))?;
    let (major, minor, patch) = config.app_version;
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, major, minor, patch))
        .engine_name(c"Kludge")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_1);

    let mut extension_names = match display {
        Some(display) => ash_window::enumerate_required_extensions(display)
            .map_err(|e| vk_error("Failed to get required extensions", e))?
            .to_vec(),
        None => Vec::new(),
    };
    if validation {
        extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    let layer_names = if validation {
        vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
    } else {
        vec![]
    };

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layer_names)
        .enabled_extension_names(&extension_names);

    entry
        .create_instance(&create_info, None)
        .map_err(|e| vk_error("Failed to create instance", e))
}

#[cfg(feature = "vulkan-validation")]
unsafe fn create_debug_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
    crate::vulkan_debug::reset_validation_stats();
    let messenger = debug_utils
        .create_debug_utils_messenger(&crate::vulkan_debug::messenger_create_info(), None)
        .map_err(|e| vk_error("Failed to create debug messenger", e))?;
    Ok((debug_utils, messenger))
}

#[cfg(not(feature = "vulkan-validation"))]
unsafe fn create_debug_messenger(
    _entry: &ash::Entry,
    _instance: &ash::Instance,
) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    Err(Error::InitializationFailed("built without the vulkan-validation feature".to_string()))
}

unsafe fn destroy_instance(
    instance: &ash::Instance,
    surface: Option<&SurfaceContext>,
    debug_messenger: Option<&(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
) {
    if let Some(surface) = surface {
        surface.loader.destroy_surface(surface.surface, None);
    }
    if let Some((debug_utils, messenger)) = debug_messenger {
        debug_utils.destroy_debug_utils_messenger(*messenger, None);
    }
    instance.destroy_instance(None);
}

/// Pick a physical device (discrete GPUs first) and create the logical device
unsafe fn open_device(
    instance: &ash::Instance,
    surface: Option<&SurfaceContext>,
) -> Result<(vk::PhysicalDevice, String, ash::Device, QueueFamilies, Allocator)> {
    let mut physical_devices = instance
        .enumerate_physical_devices()
        .map_err(|e| vk_error("Failed to enumerate physical devices", e))?;
    physical_devices.sort_by_key(|&pd| {
        let kind = instance.get_physical_device_properties(pd).device_type;
        if kind == vk::PhysicalDeviceType::DISCRETE_GPU { 0 } else { 1 }
    });

    let (physical_device, families) = physical_devices
        .iter()
        .find_map(|&pd| find_queue_families(instance, pd, surface).map(|families| (pd, families)))
        .ok_or_else(|| {
            engine_error!("kludge::vulkan", "No Vulkan-capable GPU with the required queues found");
            Error::InitializationFailed("No suitable Vulkan GPU found".to_string())
        })?;

    let properties = instance.get_physical_device_properties(physical_device);
    let device_name = properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "Unknown GPU".to_string());

    let mut unique_families = vec![families.graphics, families.compute];
    unique_families.extend(families.present);
    unique_families.sort_unstable();
    unique_families.dedup();

    let queue_priorities = [1.0];
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&queue_priorities)
        })
        .collect();

    let device_extension_names: Vec<*const std::ffi::c_char> = if surface.is_some() {
        vec![ash::khr::swapchain::NAME.as_ptr()]
    } else {
        vec![]
    };

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&device_extension_names);

    let device = instance
        .create_device(physical_device, &device_create_info, None)
        .map_err(|e| vk_error("Failed to create logical device", e))?;

    let allocator = Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device: device.clone(),
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: Default::default(),
    });
    let allocator = match allocator {
        Ok(allocator) => allocator,
        Err(e) => {
            engine_error!("kludge::vulkan", "Failed to create GPU allocator: {:?}", e);
            device.destroy_device(None);
            return Err(Error::InitializationFailed(format!("Failed to create allocator: {:?}", e)));
        }
    };

    Ok((physical_device, device_name, device, families, allocator))
}

unsafe fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface: Option<&SurfaceContext>,
) -> Option<QueueFamilies> {
    let properties = instance.get_physical_device_queue_family_properties(physical_device);
    let with_flag = |flag: vk::QueueFlags| {
        properties
            .iter()
            .position(|family| family.queue_flags.contains(flag))
            .map(|i| i as u32)
    };
    let graphics = with_flag(vk::QueueFlags::GRAPHICS)?;
    let compute = with_flag(vk::QueueFlags::COMPUTE)?;

    let present = match surface {
        Some(surface) => {
            let supports = |family: u32| {
                surface
                    .loader
                    .get_physical_device_surface_support(physical_device, family, surface.surface)
                    .unwrap_or(false)
            };
            // same family as graphics when possible
            let family = if supports(graphics) {
                graphics
            } else {
                (0..properties.len() as u32).find(|&family| supports(family))?
            };
            Some(family)
        }
        None => None,
    };

    Some(QueueFamilies {
        graphics,
        compute,
        present,
    })
}
