use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use crate::renderer::vk::util::{self, LayoutTransition};

/// One step of a command buffer recording, kept as data so the sequence can be inspected
/// before it is encoded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RecordedCommand {
    Begin,
    Barrier(LayoutTransition),
    BeginRendering {
        view: vk::ImageView,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    },
    BindPipeline(vk::Pipeline),
    SetViewport(vk::Extent2D),
    SetScissor(vk::Extent2D),
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    EndRendering,
    End,
}

/// Records into a single command buffer it does not own; the pool outlives it.
pub struct CommandEncoder {
    pub command_buffer: vk::CommandBuffer,

    is_recording: bool,

    device: Arc<ash::Device>,
}

impl CommandEncoder {
    pub fn new(
        command_buffer: vk::CommandBuffer,
        device: Arc<ash::Device>,
    ) -> Self {
        Self {
            command_buffer,
            device,
            is_recording: false,
        }
    }

    /// Resets the buffer in place. Only valid once the GPU is done with it.
    pub fn reset(&mut self) -> Result<()> {
        if self.is_recording {
            return Err(eyre!("Cannot reset a command buffer while recording"));
        }

        unsafe {
            self.device.reset_command_buffer(
                self.command_buffer,
                vk::CommandBufferResetFlags::empty(),
            )?;
        }

        Ok(())
    }

    pub fn begin_recording(&mut self) -> Result<()> {
        if self.is_recording {
            return Err(eyre!("Command buffer is already recording"));
        }

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device.begin_command_buffer(self.command_buffer, &begin_info)?;
        }

        self.is_recording = true;

        Ok(())
    }

    pub fn end_recording(&mut self) -> Result<()> {
        if !self.is_recording {
            return Err(eyre!("Command buffer is not recording"));
        }

        unsafe {
            self.device.end_command_buffer(self.command_buffer)?
        }

        self.is_recording = false;

        Ok(())
    }

    pub fn encode_all(&mut self, commands: &[RecordedCommand]) -> Result<()> {
        commands.iter().try_for_each(|command| self.encode(command))
    }

    pub fn encode(&mut self, command: &RecordedCommand) -> Result<()> {
        let cmd = self.command_buffer;
        match *command {
            RecordedCommand::Begin => return self.begin_recording(),
            RecordedCommand::End => return self.end_recording(),
            _ if !self.is_recording => {
                return Err(eyre!("{:?} encoded outside of a recording", command));
            }
            RecordedCommand::Barrier(transition) => {
                util::transition_image_layout(cmd, &transition, &self.device);
            }
            RecordedCommand::BeginRendering { view, extent, clear_color } => {
                let color_attachment = vk::RenderingAttachmentInfo::default()
                    .image_view(view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(vk::ClearValue {
                        color: vk::ClearColorValue { float32: clear_color },
                    });
                let rendering_info = vk::RenderingInfo::default()
                    .render_area(util::full_rect(extent))
                    .layer_count(1)
                    .color_attachments(std::slice::from_ref(&color_attachment));
                unsafe {
                    self.device.cmd_begin_rendering(cmd, &rendering_info);
                }
            }
            RecordedCommand::BindPipeline(pipeline) => unsafe {
                self.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
            },
            RecordedCommand::SetViewport(extent) => unsafe {
                self.device.cmd_set_viewport(cmd, 0, &[util::full_viewport(extent)]);
            },
            RecordedCommand::SetScissor(extent) => unsafe {
                self.device.cmd_set_scissor(cmd, 0, &[util::full_rect(extent)]);
            },
            RecordedCommand::Draw { vertex_count, instance_count } => unsafe {
                self.device.cmd_draw(cmd, vertex_count, instance_count, 0, 0);
            },
            RecordedCommand::EndRendering => unsafe {
                self.device.cmd_end_rendering(cmd);
            },
        }

        Ok(())
    }
}

impl Drop for CommandEncoder {
    fn drop(&mut self) {
        if self.is_recording {
            log::warn!("Dropping CommandEncoder while still recording");
        }
    }
}
