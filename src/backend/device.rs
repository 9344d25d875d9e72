// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (needs graphics + present + swapchain)
// - Logical device + queue creation
// - Memory allocator setup

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;
use std::ffi::CStr;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use super::swapchain::SwapchainSupport;
use super::{Surface, VulkanInstance};

const DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

/// Queue families the renderer submits to
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn find(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        surface: &Surface,
    ) -> Result<Self> {
        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        let mut indices = Self::default();
        for (index, family) in families.iter().enumerate() {
            let index = index as u32;

            if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            {
                indices.graphics = Some(index);
            }

            let present_support = unsafe {
                surface.surface_loader.get_physical_device_surface_support(
                    physical_device,
                    index,
                    surface.surface,
                )
            }
            .context("Failed to query surface support")?;
            if indices.present.is_none() && present_support {
                indices.present = Some(index);
            }

            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct family indices, graphics first
    pub fn unique(&self) -> Vec<u32> {
        let mut families: Vec<u32> = self.graphics.into_iter().chain(self.present).collect();
        families.dedup();
        families
    }
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub allocator: ManuallyDrop<Mutex<Allocator>>,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue_family: u32,
}

impl VulkanDevice {
    /// Pick a GPU that can draw and present to `surface`, then open it.
    pub fn new(instance: &VulkanInstance, surface: &Surface) -> Result<Arc<Self>> {
        let instance = &instance.instance;

        let (physical_device, queue_families) = Self::pick_physical_device(instance, surface)?;
        let graphics_queue_family = queue_families
            .graphics
            .context("Selected GPU has no graphics queue")?;
        let present_queue_family = queue_families
            .present
            .context("Selected GPU cannot present to the surface")?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        let device = Self::create_logical_device(instance, physical_device, &queue_families)?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_queue_family, 0) };

        let allocator = match Self::create_allocator(instance, physical_device, &device) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e);
            }
        };

        Ok(Arc::new(Self {
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            device,
            physical_device,
            instance: instance.clone(),
            graphics_queue,
            present_queue,
            graphics_queue_family,
            present_queue_family,
        }))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface: &Surface,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        let mut best_device = None;
        let mut best_score = 0;

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };
            let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();

            let queue_families = QueueFamilyIndices::find(instance, device, surface)?;
            if !queue_families.is_complete() {
                log::debug!("Skipping {}: missing graphics or present queue", name);
                continue;
            }

            if !Self::supports_extensions(instance, device)? {
                log::debug!("Skipping {}: missing device extensions", name);
                continue;
            }

            let support = SwapchainSupport::query(device, surface)?;
            if !support.is_adequate() {
                log::debug!("Skipping {}: inadequate swapchain support", name);
                continue;
            }

            let score = device_type_score(props.device_type);
            if score > best_score {
                best_score = score;
                best_device = Some((device, queue_families));
            }
        }

        best_device.ok_or_else(|| anyhow::anyhow!("No suitable GPU found"))
    }

    fn supports_extensions(instance: &ash::Instance, device: vk::PhysicalDevice) -> Result<bool> {
        let available = unsafe { instance.enumerate_device_extension_properties(device) }
            .context("Failed to enumerate device extensions")?;

        Ok(DEVICE_EXTENSIONS.iter().all(|required| {
            available
                .iter()
                .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == *required)
        }))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilyIndices,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let extensions: Vec<_> = DEVICE_EXTENSIONS.iter().map(|name| name.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")
    }

    fn create_allocator(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
    ) -> Result<Allocator> {
        Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .context("Failed to create GPU memory allocator")
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("Failed to wait for device idle")
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        // The allocator frees its memory blocks through the device
        unsafe {
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
    }
}

/// Prefer discrete GPUs, then integrated, then anything else.
fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_families_complete() {
        let empty = QueueFamilyIndices::default();
        assert!(!empty.is_complete());

        let graphics_only = QueueFamilyIndices {
            graphics: Some(0),
            present: None,
        };
        assert!(!graphics_only.is_complete());

        let both = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(2),
        };
        assert!(both.is_complete());
    }

    #[test]
    fn test_unique_families_shared_queue() {
        let shared = QueueFamilyIndices {
            graphics: Some(1),
            present: Some(1),
        };
        assert_eq!(shared.unique(), vec![1]);

        let split = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(3),
        };
        assert_eq!(split.unique(), vec![0, 3]);
    }

    #[test]
    fn test_device_type_preference() {
        assert!(
            device_type_score(vk::PhysicalDeviceType::DISCRETE_GPU)
                > device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(
            device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU)
                > device_type_score(vk::PhysicalDeviceType::CPU)
        );
        assert!(device_type_score(vk::PhysicalDeviceType::OTHER) > 0);
    }
}
