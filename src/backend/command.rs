// Command pool and command buffers

use anyhow::{Context, Result};
use ash::vk;

use super::VulkanDevice;

/// Pool on the graphics family whose buffers can be reset one at a time
pub fn create_command_pool(device: &VulkanDevice) -> Result<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(device.graphics_queue_family)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

    unsafe { device.device.create_command_pool(&pool_info, None) }
        .context("Failed to create command pool")
}

/// `count` primary command buffers from `command_pool`
pub fn command_buffer_allocate_info(
    command_pool: vk::CommandPool,
    count: usize,
) -> vk::CommandBufferAllocateInfo<'static> {
    vk::CommandBufferAllocateInfo::default()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count as u32)
}

pub fn allocate_command_buffers(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    count: usize,
) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = command_buffer_allocate_info(command_pool, count);

    unsafe { device.device.allocate_command_buffers(&alloc_info) }
        .context("Failed to create command buffers")
}

/// Record `record` into a throwaway command buffer, submit it to the
/// graphics queue and block until it has finished.
pub fn submit_one_time<F>(device: &VulkanDevice, command_pool: vk::CommandPool, record: F) -> Result<()>
where
    F: FnOnce(&ash::Device, vk::CommandBuffer),
{
    let cmd = allocate_command_buffers(device, command_pool, 1)?[0];

    let result = unsafe { submit_and_wait(device, cmd, record) };

    unsafe { device.device.free_command_buffers(command_pool, &[cmd]) };

    result
}

unsafe fn submit_and_wait<F>(device: &VulkanDevice, cmd: vk::CommandBuffer, record: F) -> Result<()>
where
    F: FnOnce(&ash::Device, vk::CommandBuffer),
{
    let begin_info = vk::CommandBufferBeginInfo::default()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    device
        .device
        .begin_command_buffer(cmd, &begin_info)
        .context("Failed to begin one-time command buffer")?;

    record(&device.device, cmd);

    device
        .device
        .end_command_buffer(cmd)
        .context("Failed to end one-time command buffer")?;

    let command_buffers = [cmd];
    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
    device
        .device
        .queue_submit(device.graphics_queue, &[submit_info], vk::Fence::null())
        .context("Failed to submit one-time command buffer")?;
    device
        .device
        .queue_wait_idle(device.graphics_queue)
        .context("Failed to wait for graphics queue")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use ash::vk::Handle;

    #[test]
    fn test_one_command_buffer_per_frame_in_flight() {
        let pool = vk::CommandPool::from_raw(7);
        let mut config = Config::default();

        for frames in 1..=3 {
            config.graphics.max_frames_in_flight = frames;
            let info = command_buffer_allocate_info(pool, config.frames_in_flight());

            assert_eq!(info.command_buffer_count, frames as u32);
            assert_eq!(info.command_pool, pool);
            assert_eq!(info.level, vk::CommandBufferLevel::PRIMARY);
        }
    }

    #[test]
    fn test_out_of_range_frames_follow_the_clamp() {
        let mut config = Config::default();
        config.graphics.max_frames_in_flight = 16;

        let info = command_buffer_allocate_info(vk::CommandPool::null(), config.frames_in_flight());
        assert_eq!(info.command_buffer_count, config.frames_in_flight() as u32);
        assert_eq!(info.command_buffer_count, 3);
    }
}
