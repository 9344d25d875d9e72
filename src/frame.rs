// =============================================================================
// FRAME RECORDING
// =============================================================================
//
// The draw for one frame is a fixed list of commands. It is built as plain
// data first and then replayed into a Vulkan command buffer, so the order and
// the rectangles can be checked without a GPU.

use anyhow::{Context, Result};
use ash::vk;

use crate::geometry::INDEX_TYPE;

/// Number of commands in one frame's draw
pub const DRAW_COMMAND_COUNT: usize = 8;

/// Everything the recorder reads from the renderer state
#[derive(Debug, Clone, Copy)]
pub struct FrameTargets<'a> {
    pub render_pass: vk::RenderPass,
    pub framebuffers: &'a [vk::Framebuffer],
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    pub clear_color: [f32; 4],
}

#[derive(Debug, Clone, Copy)]
pub enum DrawCommand {
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_color: [f32; 4],
    },
    BindPipeline(vk::Pipeline),
    SetViewport(vk::Viewport),
    SetScissor(vk::Rect2D),
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer, vk::IndexType),
    DrawIndexed { index_count: u32 },
    EndRenderPass,
}

impl<'a> FrameTargets<'a> {
    /// Commands that draw the quad into the framebuffer of swapchain image `image_index`
    pub fn draw_commands(&self, image_index: u32) -> Result<[DrawCommand; DRAW_COMMAND_COUNT]> {
        let framebuffer = *self
            .framebuffers
            .get(image_index as usize)
            .with_context(|| format!("No framebuffer for swap-chain image {}", image_index))?;

        let full_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        };

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        Ok([
            DrawCommand::BeginRenderPass {
                render_pass: self.render_pass,
                framebuffer,
                render_area: full_area,
                clear_color: self.clear_color,
            },
            DrawCommand::BindPipeline(self.pipeline),
            DrawCommand::SetViewport(viewport),
            DrawCommand::SetScissor(full_area),
            DrawCommand::BindVertexBuffer(self.vertex_buffer),
            DrawCommand::BindIndexBuffer(self.index_buffer, INDEX_TYPE),
            DrawCommand::DrawIndexed {
                index_count: self.index_count,
            },
            DrawCommand::EndRenderPass,
        ])
    }
}

/// Record the frame's draw into `command_buffer`.
///
/// The buffer must not already be recording.
pub fn record_command_buffer(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    targets: &FrameTargets<'_>,
    image_index: u32,
) -> Result<()> {
    let commands = targets.draw_commands(image_index)?;

    let begin_info = vk::CommandBufferBeginInfo::default();
    unsafe { device.begin_command_buffer(command_buffer, &begin_info) }
        .context("Failed to begin recording command buffer")?;

    for command in &commands {
        unsafe { encode(device, command_buffer, command) };
    }

    unsafe { device.end_command_buffer(command_buffer) }.context("Failed to record command buffer")
}

unsafe fn encode(device: &ash::Device, cmd: vk::CommandBuffer, command: &DrawCommand) {
    match *command {
        DrawCommand::BeginRenderPass {
            render_pass,
            framebuffer,
            render_area,
            clear_color,
        } => {
            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            }];
            let begin_info = vk::RenderPassBeginInfo::default()
                .render_pass(render_pass)
                .framebuffer(framebuffer)
                .render_area(render_area)
                .clear_values(&clear_values);
            device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
        }
        DrawCommand::BindPipeline(pipeline) => {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
        DrawCommand::SetViewport(viewport) => {
            device.cmd_set_viewport(cmd, 0, &[viewport]);
        }
        DrawCommand::SetScissor(scissor) => {
            device.cmd_set_scissor(cmd, 0, &[scissor]);
        }
        DrawCommand::BindVertexBuffer(buffer) => {
            device.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0]);
        }
        DrawCommand::BindIndexBuffer(buffer, index_type) => {
            device.cmd_bind_index_buffer(cmd, buffer, 0, index_type);
        }
        DrawCommand::DrawIndexed { index_count } => {
            device.cmd_draw_indexed(cmd, index_count, 1, 0, 0, 0);
        }
        DrawCommand::EndRenderPass => {
            device.cmd_end_render_pass(cmd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::INDICES;
    use ash::vk::Handle;

    fn targets(framebuffers: &[vk::Framebuffer]) -> FrameTargets<'_> {
        FrameTargets {
            render_pass: vk::RenderPass::from_raw(1),
            framebuffers,
            extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            pipeline: vk::Pipeline::from_raw(2),
            vertex_buffer: vk::Buffer::from_raw(3),
            index_buffer: vk::Buffer::from_raw(4),
            index_count: INDICES.len() as u32,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    fn framebuffers() -> Vec<vk::Framebuffer> {
        (10..13).map(vk::Framebuffer::from_raw).collect()
    }

    #[test]
    fn test_render_pass_brackets_the_draw() {
        let framebuffers = framebuffers();
        let commands = targets(&framebuffers).draw_commands(0).unwrap();

        assert!(matches!(commands[0], DrawCommand::BeginRenderPass { .. }));
        assert!(matches!(commands[DRAW_COMMAND_COUNT - 1], DrawCommand::EndRenderPass));

        let begins = commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::BeginRenderPass { .. }))
            .count();
        let ends = commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::EndRenderPass))
            .count();
        assert_eq!((begins, ends), (1, 1));
    }

    #[test]
    fn test_command_order() {
        let framebuffers = framebuffers();
        let commands = targets(&framebuffers).draw_commands(1).unwrap();

        let names: Vec<&str> = commands
            .iter()
            .map(|c| match c {
                DrawCommand::BeginRenderPass { .. } => "begin",
                DrawCommand::BindPipeline(_) => "pipeline",
                DrawCommand::SetViewport(_) => "viewport",
                DrawCommand::SetScissor(_) => "scissor",
                DrawCommand::BindVertexBuffer(_) => "vertices",
                DrawCommand::BindIndexBuffer(..) => "indices",
                DrawCommand::DrawIndexed { .. } => "draw",
                DrawCommand::EndRenderPass => "end",
            })
            .collect();

        assert_eq!(
            names,
            ["begin", "pipeline", "viewport", "scissor", "vertices", "indices", "draw", "end"]
        );
    }

    #[test]
    fn test_viewport_and_scissor_match_extent() {
        let framebuffers = framebuffers();
        let targets = targets(&framebuffers);
        let commands = targets.draw_commands(2).unwrap();

        let DrawCommand::SetViewport(viewport) = commands[2] else {
            panic!("expected viewport, got {:?}", commands[2]);
        };
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!(viewport.width, targets.extent.width as f32);
        assert_eq!(viewport.height, targets.extent.height as f32);
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));

        let DrawCommand::SetScissor(scissor) = commands[3] else {
            panic!("expected scissor, got {:?}", commands[3]);
        };
        assert_eq!(scissor.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(scissor.extent, targets.extent);
    }

    #[test]
    fn test_begin_uses_indexed_framebuffer_and_clear_color() {
        let framebuffers = framebuffers();
        let targets = targets(&framebuffers);
        let commands = targets.draw_commands(2).unwrap();

        let DrawCommand::BeginRenderPass {
            render_pass,
            framebuffer,
            render_area,
            clear_color,
        } = commands[0]
        else {
            panic!("expected begin, got {:?}", commands[0]);
        };
        assert_eq!(render_pass, targets.render_pass);
        assert_eq!(framebuffer, framebuffers[2]);
        assert_eq!(render_area.extent, targets.extent);
        assert_eq!(clear_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_draws_every_index_as_u16() {
        let framebuffers = framebuffers();
        let commands = targets(&framebuffers).draw_commands(0).unwrap();

        assert!(matches!(
            commands[5],
            DrawCommand::BindIndexBuffer(_, vk::IndexType::UINT16)
        ));
        assert!(matches!(
            commands[6],
            DrawCommand::DrawIndexed { index_count: 6 }
        ));
    }

    #[test]
    fn test_same_input_same_commands() {
        let framebuffers = framebuffers();
        let targets = targets(&framebuffers);

        let first = format!("{:?}", targets.draw_commands(1).unwrap());
        let second = format!("{:?}", targets.draw_commands(1).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_framebuffer_is_an_error() {
        let framebuffers = framebuffers();
        let err = targets(&framebuffers).draw_commands(3).unwrap_err();
        assert!(err.to_string().contains("swap-chain image 3"));
    }
}
