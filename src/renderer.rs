// =============================================================================
// RENDERER STATE
// =============================================================================
//
// Owns every Vulkan object the quad needs. Creation runs in a fixed order and
// stops at the first failure; whatever was already created is released by
// Drop, which also handles normal shutdown.
//
// FRAME FLOW:
// 1. Wait for the fence of the current frame slot
// 2. Acquire a swapchain image
// 3. Re-record the slot's command buffer for that image
// 4. Submit (wait image_available, signal render_finished + fence)
// 5. Present (wait render_finished)
// 6. Advance to the next slot

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use winit::window::Window;

use crate::backend::sync::{self, FrameCursor, FrameSync};
use crate::backend::{
    buffer, command, pipeline, Buffer, Surface, Swapchain, VulkanDevice, VulkanInstance,
};
use crate::config::Config;
use crate::frame::{record_command_buffer, FrameTargets};
use crate::geometry::{INDICES, VERTICES};

/// IMPORTANT: Field order matters for Drop! Fields drop top to bottom after
/// `Drop::drop` has released the raw handles, so the device goes before the
/// surface and the instance goes last.
pub struct Renderer {
    // ─────────────────────────────────────────────────────────────────────────
    // SETTINGS (fixed for the renderer's lifetime)
    // ─────────────────────────────────────────────────────────────────────────
    frames_in_flight: usize,
    clear_color: [f32; 4],
    present_mode: vk::PresentModeKHR,

    // ─────────────────────────────────────────────────────────────────────────
    // COMMANDS & SYNCHRONIZATION (one entry per frame in flight)
    // ─────────────────────────────────────────────────────────────────────────
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    frame_sync: Vec<FrameSync>,
    frame: FrameCursor,
    wait_stages: [vk::PipelineStageFlags; 1],

    // ─────────────────────────────────────────────────────────────────────────
    // GEOMETRY
    // ─────────────────────────────────────────────────────────────────────────
    vertex_buffer: Option<Buffer>,
    index_buffer: Option<Buffer>,
    index_count: u32,

    // ─────────────────────────────────────────────────────────────────────────
    // SWAPCHAIN-DERIVED STATE
    // ─────────────────────────────────────────────────────────────────────────
    framebuffers: Vec<vk::Framebuffer>,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    swapchain: Option<Swapchain>,
    /// Set when the swapchain no longer matches the window
    needs_recreate: bool,

    // ─────────────────────────────────────────────────────────────────────────
    // VULKAN CORE
    // ─────────────────────────────────────────────────────────────────────────
    device: Arc<VulkanDevice>,
    surface: Surface,
    _instance: VulkanInstance,
}

impl Renderer {
    /// Initialize all Vulkan resources for `window`.
    ///
    /// instance → surface → device → swapchain + image views → render pass →
    /// pipeline → framebuffers → command pool → vertex/index buffers →
    /// command buffers → synchronization primitives
    pub fn new(config: &Config, window: &Window) -> Result<Self> {
        use raw_window_handle::HasDisplayHandle;

        log::info!("Initializing Vulkan...");

        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();

        // Validation only in debug builds, and only if the config asks for it
        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
        let instance = VulkanInstance::new(&config.window.title, display_handle, enable_validation)?;
        let surface = Surface::new(&instance, window)?;
        let device = VulkanDevice::new(&instance, &surface)?;

        let present_mode = config.present_mode();
        let size = window.inner_size();
        let swapchain = Swapchain::new(
            device.clone(),
            &surface,
            present_mode,
            size.width,
            size.height,
        )?;

        let frames_in_flight = config.frames_in_flight();

        // Raw handles start out null; destroying a null handle is a no-op, so
        // Drop is safe at every step below
        let mut renderer = Self {
            frames_in_flight,
            clear_color: config.graphics.clear_color,
            present_mode,
            command_pool: vk::CommandPool::null(),
            command_buffers: Vec::new(),
            frame_sync: Vec::new(),
            frame: FrameCursor::new(frames_in_flight),
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            vertex_buffer: None,
            index_buffer: None,
            index_count: INDICES.len() as u32,
            framebuffers: Vec::new(),
            pipeline: vk::Pipeline::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            render_pass: vk::RenderPass::null(),
            swapchain: None,
            needs_recreate: false,
            device,
            surface,
            _instance: instance,
        };

        let (format, extent, image_views) =
            (swapchain.format, swapchain.extent, swapchain.image_views.clone());
        renderer.swapchain = Some(swapchain);

        renderer.render_pass = pipeline::create_render_pass(&renderer.device, format)?;

        let (graphics_pipeline, pipeline_layout) = pipeline::create_graphics_pipeline(
            &renderer.device,
            renderer.render_pass,
            &config.shaders.vertex,
            &config.shaders.fragment,
        )?;
        renderer.pipeline = graphics_pipeline;
        renderer.pipeline_layout = pipeline_layout;

        renderer.framebuffers = pipeline::create_framebuffers(
            &renderer.device,
            &image_views,
            renderer.render_pass,
            extent,
        )?;

        renderer.command_pool = command::create_command_pool(&renderer.device)?;

        renderer.vertex_buffer = Some(
            buffer::create_device_local_buffer(
                &renderer.device,
                renderer.command_pool,
                "vertex buffer",
                vk::BufferUsageFlags::VERTEX_BUFFER,
                bytemuck::cast_slice(&VERTICES),
            )
            .context("Failed to create vertex buffer")?,
        );
        renderer.index_buffer = Some(
            buffer::create_device_local_buffer(
                &renderer.device,
                renderer.command_pool,
                "index buffer",
                vk::BufferUsageFlags::INDEX_BUFFER,
                bytemuck::cast_slice(&INDICES),
            )
            .context("Failed to create index buffer")?,
        );

        renderer.command_buffers = command::allocate_command_buffers(
            &renderer.device,
            renderer.command_pool,
            frames_in_flight,
        )?;

        renderer.frame_sync = sync::create_frame_sync(&renderer.device, frames_in_flight)?;

        log::info!(
            "Vulkan initialized successfully ({} frames in flight)",
            frames_in_flight
        );
        Ok(renderer)
    }

    /// Ask for a new swapchain before the next frame (window resized etc.)
    pub fn request_recreate(&mut self) {
        self.needs_recreate = true;
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }

    /// Render a single frame at the current window size.
    ///
    /// Returns false when nothing was presented (minimized window or the
    /// swapchain had to be rebuilt first).
    pub fn draw_frame(&mut self, width: u32, height: u32) -> Result<bool> {
        if width == 0 || height == 0 {
            return Ok(false);
        }

        if self.needs_recreate || self.swapchain.is_none() {
            self.recreate_swapchain(width, height)?;
        }

        let frame = self.frame.index();
        let sync = &self.frame_sync[frame];
        let (image_available, render_finished, in_flight_fence) =
            (sync.image_available, sync.render_finished, sync.in_flight_fence);
        let command_buffer = self.command_buffers[frame];

        // STEP 1: Wait until the GPU is done with this slot
        unsafe {
            self.device
                .device
                .wait_for_fences(&[in_flight_fence], true, u64::MAX)
        }
        .context("Failed to wait for in-flight fence")?;

        // STEP 2: Acquire next swapchain image
        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
        let Some((image_index, suboptimal)) =
            swapchain.acquire_next_image(u64::MAX, image_available)?
        else {
            self.needs_recreate = true;
            return Ok(false);
        };

        // Only reset once we know work will be submitted, or the next wait deadlocks
        unsafe {
            self.device
                .device
                .reset_fences(&[in_flight_fence])
                .context("Failed to reset in-flight fence")?;
            self.device
                .device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;
        }

        // STEP 3: Record this frame's draw
        let targets = FrameTargets {
            render_pass: self.render_pass,
            framebuffers: &self.framebuffers,
            extent: swapchain.extent,
            pipeline: self.pipeline,
            vertex_buffer: buffer_handle(&self.vertex_buffer),
            index_buffer: buffer_handle(&self.index_buffer),
            index_count: self.index_count,
            clear_color: self.clear_color,
        };
        record_command_buffer(&self.device.device, command_buffer, &targets, image_index)?;

        // STEP 4: Submit
        let wait_semaphores = [image_available];
        let signal_semaphores = [render_finished];
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(self.device.graphics_queue, &[submit_info], in_flight_fence)
        }
        .context("Failed to submit draw command buffer")?;

        // STEP 5: Present
        let present_needs_recreate =
            swapchain.present(self.device.present_queue, image_index, &signal_semaphores)?;

        if suboptimal || present_needs_recreate {
            self.needs_recreate = true;
        }

        // STEP 6: Advance to next frame slot
        self.frame.advance();

        Ok(true)
    }

    /// Rebuild the swapchain and its framebuffers at a new size.
    fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<()> {
        self.device.wait_idle()?;

        pipeline::destroy_framebuffers(&self.device, &self.framebuffers);
        self.framebuffers.clear();

        // The surface can only have one swapchain at a time
        self.swapchain = None;

        let swapchain = Swapchain::new(
            self.device.clone(),
            &self.surface,
            self.present_mode,
            width,
            height,
        )?;

        self.framebuffers = pipeline::create_framebuffers(
            &self.device,
            &swapchain.image_views,
            self.render_pass,
            swapchain.extent,
        )?;

        log::info!(
            "Swapchain recreated at {}x{}",
            swapchain.extent.width,
            swapchain.extent.height
        );

        self.swapchain = Some(swapchain);
        self.needs_recreate = false;
        Ok(())
    }
}

fn buffer_handle(buffer: &Option<Buffer>) -> vk::Buffer {
    buffer.as_ref().map_or(vk::Buffer::null(), |b| b.buffer)
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Wait for GPU to finish before destroying anything
        if let Err(e) = self.device.wait_idle() {
            log::error!("{:#}", e);
        }

        let device = &self.device;
        unsafe {
            // Destroy in reverse order of creation!
            for sync in &self.frame_sync {
                sync.destroy(&device.device);
            }

            // Also frees the command buffers
            device.device.destroy_command_pool(self.command_pool, None);

            for buffer in [&mut self.index_buffer, &mut self.vertex_buffer] {
                if let Some(mut buffer) = buffer.take() {
                    buffer.destroy(device);
                }
            }

            pipeline::destroy_framebuffers(device, &self.framebuffers);
            device.device.destroy_pipeline(self.pipeline, None);
            device.device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.device.destroy_render_pass(self.render_pass, None);
        }

        // Image views and swapchain; device, surface and instance follow as fields drop
        self.swapchain = None;

        log::info!("Cleanup complete");
    }
}
