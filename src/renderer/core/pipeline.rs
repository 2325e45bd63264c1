use std::ffi::CStr;
use std::io::Cursor;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;

/// SPIR-V compiled from `shaders/triangle.wgsl` by the build script
const TRIANGLE_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.spv"));

const VERTEX_ENTRY_POINT: &CStr = c"vertMain";
const FRAGMENT_ENTRY_POINT: &CStr = c"fragMain";

/// The one graphics pipeline: a hard-coded triangle into a single color attachment
pub struct TrianglePipeline {
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub color_format: vk::Format,
    device: Arc<ash::Device>,
}

impl TrianglePipeline {
    pub fn new(device: Arc<ash::Device>, color_format: vk::Format) -> Result<Self> {
        let pipeline_layout_info = vk::PipelineLayoutCreateInfo::default();
        let pipeline_layout = unsafe {
            device.create_pipeline_layout(&pipeline_layout_info, None)?
        };

        let pipeline = match create_pipeline(&device, pipeline_layout, color_format) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                unsafe { device.destroy_pipeline_layout(pipeline_layout, None) };
                return Err(err);
            }
        };

        Ok(Self {
            pipeline,
            pipeline_layout,
            color_format,
            device,
        })
    }

    /// Rebuilds the pipeline if the swapchain now uses a different color format. The device
    /// must be idle.
    pub fn update_color_format(&mut self, color_format: vk::Format) -> Result<bool> {
        if !needs_rebuild(self.color_format, color_format) {
            return Ok(false);
        }

        log::debug!(
            "Surface format changed from {:?} to {:?}, rebuilding pipeline",
            self.color_format,
            color_format,
        );
        let pipeline = create_pipeline(&self.device, self.pipeline_layout, color_format)?;
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
        self.pipeline = pipeline;
        self.color_format = color_format;

        Ok(true)
    }
}

impl Drop for TrianglePipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}

pub fn needs_rebuild(current: vk::Format, wanted: vk::Format) -> bool {
    current != wanted
}

fn triangle_spirv() -> Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(TRIANGLE_SPV))
        .wrap_err("Embedded triangle shader is not valid SPIR-V")
}

fn create_shader_module(device: &ash::Device) -> Result<vk::ShaderModule> {
    let code = triangle_spirv()?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default()
        .code(&code);

    let shader_module = unsafe {
        device.create_shader_module(&shader_module_info, None)?
    };

    Ok(shader_module)
}

fn create_pipeline(
    device: &ash::Device,
    pipeline_layout: vk::PipelineLayout,
    color_format: vk::Format,
) -> Result<vk::Pipeline> {
    let shader_module = create_shader_module(device)?;

    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(shader_module)
            .name(VERTEX_ENTRY_POINT),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(shader_module)
            .name(FRAGMENT_ENTRY_POINT),
    ];

    // Vertices come from the shader itself
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);
    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false);
    // 1 sample per pixel means no multisampling
    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);
    let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false);
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .logic_op(vk::LogicOp::COPY)
        .attachments(std::slice::from_ref(&color_blend_attachment));

    // Use dynamic state for viewport and scissor configuration
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_info = vk::PipelineDynamicStateCreateInfo::default()
        .dynamic_states(&dynamic_states);

    let color_formats = [color_format];
    let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_formats);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .push_next(&mut rendering_info)
        .stages(&shader_stages)
        .layout(pipeline_layout)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic_info);

    let result = unsafe {
        device.create_graphics_pipelines(
            vk::PipelineCache::null(),
            std::slice::from_ref(&pipeline_info),
            None,
        )
    };

    // The module is only needed while the pipeline is compiled
    unsafe {
        device.destroy_shader_module(shader_module, None);
    }

    let pipelines = result
        .map_err(|(_, err)| eyre!("Failed to create triangle pipeline: {}", err))?;
    pipelines
        .first()
        .copied()
        .ok_or_else(|| eyre!("Driver returned no triangle pipeline"))
}
