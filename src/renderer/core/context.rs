use ash::vk;
use color_eyre::eyre::{eyre, OptionExt, WrapErr};
use color_eyre::Result;
use crate::renderer::config::RenderConfig;
use crate::renderer::core::adapter::{enumerate_adapters, select_adapter};
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::frame::{
    self, Acquire, FrameCursor, FrameOutcome, FrameSync, FrameTarget, SwapchainStatus,
};
use crate::renderer::core::instance::RenderInstance;
use crate::renderer::core::pipeline::TrianglePipeline;
use crate::renderer::core::rebuild::{self, SwapchainRebuild, SwapchainShape};
use crate::renderer::core::recorder::{triangle_commands, TriangleFrame};
use crate::renderer::core::state::{Lifecycle, RenderState};
use crate::renderer::core::target::{RenderSurface, Swapchain};
use crate::renderer::window::{wait_for_drawable_size, WindowProvider};

/// Owns every Vulkan object needed to put the triangle on screen.
///
/// Fields drop top to bottom, so per-frame objects go before the swapchain, the swapchain
/// before the surface and device, and the instance last.
pub struct RenderContext {
    frames: FrameSync,
    pipeline: TrianglePipeline,
    swapchain: Swapchain,
    surface: RenderSurface,
    device: RenderDevice,
    instance: RenderInstance,

    cursor: FrameCursor,
    state: RenderState,
    clear_color: [f32; 4],
    fence_timeout_ns: u64,
}

impl RenderContext {
    pub fn new(
        config: &RenderConfig,
        window: &dyn WindowProvider,
    ) -> Result<Self> {
        let mut state = RenderState::new();
        let (display_handle, window_handle) = window.native_handles()?;

        let instance = RenderInstance::new(display_handle, config.enable_validation)
            .wrap_err("Failed to create Vulkan instance")?;
        state.advance(Lifecycle::InstanceCreated)?;

        let adapters = enumerate_adapters(&instance.instance)?;
        let adapter = select_adapter(&adapters, &config.gpu)?;
        log::info!(
            "Selected GPU {:?} ({:?}, Vulkan {}.{}.{})",
            adapter.name,
            adapter.kind,
            vk::api_version_major(adapter.api_version),
            vk::api_version_minor(adapter.api_version),
            vk::api_version_patch(adapter.api_version),
        );
        let device = RenderDevice::new(&instance.instance, adapter)
            .wrap_err("Failed to create logical device")?;
        state.advance(Lifecycle::DeviceCreated)?;

        let surface = RenderSurface::new(
            &instance.entry,
            &instance.instance,
            display_handle,
            window_handle,
        )
            .wrap_err("Failed to create window surface")?;
        if !device.supports_present(surface.surface, &surface.surface_loader)? {
            return Err(eyre!(
                "Queue family {} of {:?} cannot present to the window surface",
                device.graphics_queue_family,
                device.name,
            ));
        }
        state.advance(Lifecycle::SurfaceBound)?;

        let framebuffer_size = wait_for_drawable_size(window)
            .ok_or_eyre("Window was closed before it became visible")?;
        let swapchain = Swapchain::new(&instance.instance, &device, &surface, framebuffer_size)
            .wrap_err("Failed to create swapchain")?;
        let pipeline = TrianglePipeline::new(device.logical.clone(), swapchain.format.format)
            .wrap_err("Failed to create triangle pipeline")?;
        let frames = FrameSync::new(&device, swapchain.image_count())
            .wrap_err("Failed to create frame synchronization objects")?;
        state.advance(Lifecycle::SwapchainReady)?;

        Ok(Self {
            frames,
            pipeline,
            swapchain,
            surface,
            device,
            instance,

            cursor: FrameCursor::default(),
            state,
            clear_color: config.clear_color_array(),
            fence_timeout_ns: config.fence_timeout_ns(),
        })
    }

    pub fn request_resize(&mut self) {
        self.state.resize_requested = true;
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lifecycle()
    }

    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Draws and presents one frame. A stale swapchain is rebuilt and the frame skipped.
    pub fn render_frame(&mut self, window: &dyn WindowProvider) -> Result<FrameOutcome> {
        if self.state.lifecycle() == Lifecycle::SwapchainReady {
            self.state.advance(Lifecycle::Rendering)?;
        }
        let resize_requested = self.state.take_resize_request();

        let mut presenter = Presenter {
            device: &self.device,
            surface: &self.surface,
            swapchain: &mut self.swapchain,
            pipeline: &mut self.pipeline,
            frames: &mut self.frames,
            state: &mut self.state,
            window,
            clear_color: self.clear_color,
            fence_timeout_ns: self.fence_timeout_ns,
        };
        let outcome = frame::render_frame(&mut self.cursor, &mut presenter, resize_requested)?;

        if self.state.lifecycle() == Lifecycle::SwapchainReady {
            self.state.advance(Lifecycle::Rendering)?;
        }

        Ok(outcome)
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle before teardown: {}", err);
        }
    }
}

/// Disjoint borrows of the context for the duration of one frame
struct Presenter<'a> {
    device: &'a RenderDevice,
    surface: &'a RenderSurface,
    swapchain: &'a mut Swapchain,
    pipeline: &'a mut TrianglePipeline,
    frames: &'a mut FrameSync,
    state: &'a mut RenderState,
    window: &'a dyn WindowProvider,
    clear_color: [f32; 4],
    fence_timeout_ns: u64,
}

impl Presenter<'_> {
    fn image(&self, image_index: u32) -> Result<(vk::Image, vk::ImageView)> {
        let i = image_index as usize;
        match (self.swapchain.images.get(i), self.swapchain.image_views.get(i)) {
            (Some(image), Some(view)) => Ok((*image, *view)),
            _ => Err(eyre!("Swapchain image index {} out of range", image_index)),
        }
    }

    fn render_finished(&self, image_index: u32) -> Result<vk::Semaphore> {
        self.frames
            .render_finished
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| eyre!("No render-finished semaphore for image {}", image_index))
    }
}

impl FrameTarget for Presenter<'_> {
    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.frames.wait_for_slot(slot, self.fence_timeout_ns)
    }

    fn acquire_image(&mut self, slot: usize) -> Result<Acquire> {
        self.swapchain.acquire_next_image(self.frames.slots[slot].image_available)
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let (image, view) = self.image(image_index)?;
        let commands = triangle_commands(&TriangleFrame {
            image,
            view,
            extent: self.swapchain.extent,
            pipeline: self.pipeline.pipeline,
            clear_color: self.clear_color,
        });

        let encoder = &mut self.frames.slots[slot].encoder;
        encoder.reset()?;
        encoder.encode_all(&commands)
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        self.frames.reset_slot(slot)
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let frame_slot = &self.frames.slots[slot];
        let wait_info = vk::SemaphoreSubmitInfo::default()
            .semaphore(frame_slot.image_available)
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        let signal_info = vk::SemaphoreSubmitInfo::default()
            .semaphore(self.render_finished(image_index)?)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS);
        let command_buffer_info = vk::CommandBufferSubmitInfo::default()
            .command_buffer(frame_slot.encoder.command_buffer);
        let submit_info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(std::slice::from_ref(&wait_info))
            .signal_semaphore_infos(std::slice::from_ref(&signal_info))
            .command_buffer_infos(std::slice::from_ref(&command_buffer_info));

        unsafe {
            self.device.logical
                .queue_submit2(
                    self.device.graphics_queue,
                    std::slice::from_ref(&submit_info),
                    frame_slot.in_flight,
                )
                .wrap_err("Failed to submit frame")?;
        }

        Ok(())
    }

    fn present(&mut self, image_index: u32) -> Result<SwapchainStatus> {
        let wait_semaphore = self.render_finished(image_index)?;
        self.swapchain.present(self.device.graphics_queue, image_index, wait_semaphore)
    }

    fn recreate_swapchain(&mut self) -> Result<()> {
        self.state.advance(Lifecycle::Recreating)?;

        // Blocks while minimized. WinitWindow cannot pump events from inside a frame, so a close
        // during this wait goes unseen until the window regains a size. App::draw never starts
        // a frame for a window that is already minimized.
        let window = self.window;
        if rebuild::recreate(self, window)?.is_none() {
            log::debug!("Window closing, leaving the stale swapchain in place");
        }

        self.state.advance(Lifecycle::SwapchainReady)
    }
}

impl SwapchainRebuild for Presenter<'_> {
    fn wait_idle(&mut self) -> Result<()> {
        self.device.wait_idle()
    }

    fn rebuild_swapchain(&mut self, framebuffer_size: (u32, u32)) -> Result<SwapchainShape> {
        self.swapchain.recreate(self.device, self.surface, framebuffer_size)?;
        Ok(SwapchainShape {
            image_count: self.swapchain.images.len(),
            view_count: self.swapchain.image_views.len(),
            color_format: self.swapchain.format.format,
        })
    }

    fn rebuild_image_semaphores(&mut self, image_count: usize) -> Result<()> {
        self.frames.rebuild_image_semaphores(image_count)
    }

    fn pipeline_format(&self) -> vk::Format {
        self.pipeline.color_format
    }

    fn rebuild_pipeline(&mut self, color_format: vk::Format) -> Result<()> {
        self.pipeline.update_color_format(color_format)?;
        Ok(())
    }
}
