use ash::vk;
use smallvec::{smallvec, SmallVec};
use crate::renderer::vk::command_encoder::RecordedCommand;
use crate::renderer::vk::util::LayoutTransition;

/// Everything one frame's recording depends on.
#[derive(Clone, Copy, Debug)]
pub struct TriangleFrame {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub clear_color: [f32; 4],
}

pub type CommandPlan = SmallVec<[RecordedCommand; 10]>;

pub const TRIANGLE_VERTEX_COUNT: u32 = 3;

/// The full command sequence drawing the triangle into one swapchain image and handing
/// it back for presentation.
pub fn triangle_commands(frame: &TriangleFrame) -> CommandPlan {
    smallvec![
        RecordedCommand::Begin,
        RecordedCommand::Barrier(LayoutTransition::undefined_to_color_attachment(frame.image)),
        RecordedCommand::BeginRendering {
            view: frame.view,
            extent: frame.extent,
            clear_color: frame.clear_color,
        },
        RecordedCommand::BindPipeline(frame.pipeline),
        RecordedCommand::SetViewport(frame.extent),
        RecordedCommand::SetScissor(frame.extent),
        RecordedCommand::Draw {
            vertex_count: TRIANGLE_VERTEX_COUNT,
            instance_count: 1,
        },
        RecordedCommand::EndRendering,
        RecordedCommand::Barrier(LayoutTransition::color_attachment_to_present(frame.image)),
        RecordedCommand::End,
    ]
}
