use ash::vk;

/// A single-image layout transition, with the synchronization scopes on both sides.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutTransition {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage_mask: vk::PipelineStageFlags2,
    pub src_access_mask: vk::AccessFlags2,
    pub dst_stage_mask: vk::PipelineStageFlags2,
    pub dst_access_mask: vk::AccessFlags2,
}

impl LayoutTransition {
    /// Freshly acquired swapchain image into a writable color attachment. The previous
    /// contents are discarded, so nothing has to be made available.
    pub fn undefined_to_color_attachment(image: vk::Image) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            src_stage_mask: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags2::NONE,
            dst_stage_mask: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            dst_access_mask: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        }
    }

    /// Rendered color attachment into the layout the presentation engine reads.
    pub fn color_attachment_to_present(image: vk::Image) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            src_stage_mask: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            dst_stage_mask: vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            dst_access_mask: vk::AccessFlags2::NONE,
        }
    }
}

pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

pub fn transition_image_layout(
    cmd: vk::CommandBuffer,
    transition: &LayoutTransition,
    device: &ash::Device,
) {
    let image_barrier = vk::ImageMemoryBarrier2::default()
        .src_stage_mask(transition.src_stage_mask)
        .src_access_mask(transition.src_access_mask)
        .dst_stage_mask(transition.dst_stage_mask)
        .dst_access_mask(transition.dst_access_mask)
        .old_layout(transition.old_layout)
        .new_layout(transition.new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(transition.image)
        .subresource_range(color_subresource_range());

    let dep_info = vk::DependencyInfo::default()
        .image_memory_barriers(std::slice::from_ref(&image_barrier));

    unsafe {
        device.cmd_pipeline_barrier2(cmd, &dep_info);
    }
}

/// Viewport covering the whole extent with the default depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_matches_extent() {
        let viewport = full_viewport(vk::Extent2D { width: 640, height: 480 });
        assert_eq!(viewport.width, 640.0);
        assert_eq!(viewport.height, 480.0);
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn transitions_chain_into_each_other() {
        let image = vk::Image::null();
        let first = LayoutTransition::undefined_to_color_attachment(image);
        let second = LayoutTransition::color_attachment_to_present(image);
        assert_eq!(first.new_layout, second.old_layout);
        assert_eq!(first.dst_access_mask, second.src_access_mask);
        assert_eq!(first.dst_stage_mask, second.src_stage_mask);
    }
}
