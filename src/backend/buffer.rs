// Buffer utilities for vertex and index data
//
// Memory comes from gpu-allocator. Static geometry is written to a
// host-visible staging buffer and copied into device-local memory.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use super::command::submit_one_time;
use super::VulkanDevice;

/// A buffer together with the memory bound to it
pub struct Buffer {
    pub buffer: vk::Buffer,
    allocation: Option<Allocation>,
}

impl Buffer {
    pub fn new(
        device: &VulkanDevice,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .with_context(|| format!("Failed to create buffer '{}'", name))?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator.lock().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e).with_context(|| format!("Failed to allocate memory for '{}'", name));
            }
        };

        let bound = unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };

        let mut buffer = Self {
            buffer,
            allocation: Some(allocation),
        };

        if let Err(e) = bound {
            buffer.destroy(device);
            return Err(e).with_context(|| format!("Failed to bind memory for '{}'", name));
        }

        Ok(buffer)
    }

    /// Copy `bytes` into a host-visible buffer
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let allocation = self.allocation.as_mut().context("Buffer already destroyed")?;
        let mapped = allocation
            .mapped_slice_mut()
            .context("Buffer memory is not host visible")?;

        anyhow::ensure!(
            bytes.len() <= mapped.len(),
            "Write of {} bytes overflows buffer of {} bytes",
            bytes.len(),
            mapped.len()
        );
        mapped[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn destroy(&mut self, device: &VulkanDevice) {
        unsafe { device.device.destroy_buffer(self.buffer, None) };
        self.buffer = vk::Buffer::null();

        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = device.allocator.lock().free(allocation) {
                log::error!("Failed to free buffer memory: {}", e);
            }
        }
    }
}

/// Create a device-local buffer holding `bytes`, uploaded through a staging buffer
pub fn create_device_local_buffer(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    name: &str,
    usage: vk::BufferUsageFlags,
    bytes: &[u8],
) -> Result<Buffer> {
    let size = bytes.len() as vk::DeviceSize;

    let mut staging = Buffer::new(
        device,
        &format!("{} staging", name),
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
    )?;

    let result = staging.write(bytes).and_then(|_| {
        let mut buffer = Buffer::new(
            device,
            name,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
        )?;

        let copied = submit_one_time(device, command_pool, |dev, cmd| {
            let region = vk::BufferCopy::default().size(size);
            unsafe { dev.cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]) };
        });

        match copied {
            Ok(()) => Ok(buffer),
            Err(e) => {
                buffer.destroy(device);
                Err(e)
            }
        }
    });

    staging.destroy(device);

    result
}
