// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync, one set per frame in flight.

use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::vk;

use super::VulkanDevice;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        // Null handles are ignored by the destroy calls
        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
        };

        if let Err(e) = sync.create_handles(&device.device) {
            sync.destroy(&device.device);
            return Err(e).context("Failed to create synchronization objects for a frame");
        }

        Ok(sync)
    }

    fn create_handles(&mut self, device: &ash::Device) -> VkResult<()> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = fence_create_info();

        unsafe {
            self.image_available = device.create_semaphore(&semaphore_info, None)?;
            self.render_finished = device.create_semaphore(&semaphore_info, None)?;
            self.in_flight_fence = device.create_fence(&fence_info, None)?;
        }

        Ok(())
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Fences start signaled so the first wait on each slot returns immediately
pub fn fence_create_info() -> vk::FenceCreateInfo<'static> {
    vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED)
}

/// Create `count` frame slots, releasing the ones already made if any fails
pub fn create_frame_sync(device: &VulkanDevice, count: usize) -> Result<Vec<FrameSync>> {
    create_slots(
        count,
        || FrameSync::new(device),
        |sync| sync.destroy(&device.device),
    )
}

/// Build exactly `count` slots with `create`, or none: on the first failure
/// every slot made so far is passed to `release`.
fn create_slots<T>(
    count: usize,
    mut create: impl FnMut() -> Result<T>,
    mut release: impl FnMut(&T),
) -> Result<Vec<T>> {
    let mut slots = Vec::with_capacity(count);
    for _ in 0..count {
        match create() {
            Ok(slot) => slots.push(slot),
            Err(e) => {
                slots.iter().for_each(&mut release);
                return Err(e);
            }
        }
    }
    Ok(slots)
}

/// Index of the frame slot currently being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCursor {
    index: usize,
    count: usize,
}

impl FrameCursor {
    pub fn new(count: usize) -> Self {
        Self {
            index: 0,
            count: count.max(1),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_fences_start_signaled() {
        let info = fence_create_info();
        assert!(info.flags.contains(vk::FenceCreateFlags::SIGNALED));
    }

    #[test]
    fn test_one_slot_per_frame_in_flight() {
        let mut config = Config::default();

        for frames in 1..=3 {
            config.graphics.max_frames_in_flight = frames;
            let count = config.frames_in_flight();

            let mut made = 0;
            let slots = create_slots(
                count,
                || {
                    made += 1;
                    Ok(made)
                },
                |_| panic!("nothing should be released"),
            )
            .unwrap();

            assert_eq!(slots.len(), frames);
            assert_eq!(FrameCursor::new(count).count, frames);
        }
    }

    #[test]
    fn test_failed_slot_releases_earlier_ones() {
        let mut made = 0;
        let mut released = Vec::new();

        let result = create_slots(
            3,
            || {
                made += 1;
                if made == 3 {
                    anyhow::bail!("out of semaphores");
                }
                Ok(made)
            },
            |slot| released.push(*slot),
        );

        assert!(result.is_err());
        assert_eq!(released, vec![1, 2]);
    }

    #[test]
    fn test_frame_cursor_wraps() {
        let mut cursor = FrameCursor::new(2);
        let visited: Vec<usize> = (0..5)
            .map(|_| {
                let index = cursor.index();
                cursor.advance();
                index
            })
            .collect();
        assert_eq!(visited, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_frame_cursor_triple_buffered() {
        let mut cursor = FrameCursor::new(3);
        for _ in 0..3 {
            cursor.advance();
        }
        assert_eq!(cursor.index(), 0);
    }

    #[test]
    fn test_frame_cursor_single_slot() {
        let mut cursor = FrameCursor::new(0);
        cursor.advance();
        assert_eq!(cursor.index(), 0);
    }
}
