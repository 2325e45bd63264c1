use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::core::pipeline::needs_rebuild;
use crate::renderer::window::{wait_for_drawable_size, WindowProvider};

/// What a freshly built swapchain ended up with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainShape {
    pub image_count: usize,
    pub view_count: usize,
    pub color_format: vk::Format,
}

/// The objects a swapchain rebuild touches, in the order `recreate` calls them.
pub trait SwapchainRebuild {
    fn wait_idle(&mut self) -> Result<()>;
    /// Destroys the views and the swapchain, then builds both for `framebuffer_size`.
    fn rebuild_swapchain(&mut self, framebuffer_size: (u32, u32)) -> Result<SwapchainShape>;
    fn rebuild_image_semaphores(&mut self, image_count: usize) -> Result<()>;
    fn pipeline_format(&self) -> vk::Format;
    fn rebuild_pipeline(&mut self, color_format: vk::Format) -> Result<()>;
}

/// Rebuilds the swapchain for the window's current drawable size.
///
/// A minimized window blocks here until it has a nonzero size again. Returns `None` without
/// touching anything if the window is closed while waiting.
pub fn recreate<T>(target: &mut T, window: &dyn WindowProvider) -> Result<Option<SwapchainShape>>
where
    T: SwapchainRebuild + ?Sized,
{
    let Some(framebuffer_size) = wait_for_drawable_size(window) else {
        return Ok(None);
    };

    target.wait_idle()?;
    let shape = target.rebuild_swapchain(framebuffer_size)?;
    if shape.view_count != shape.image_count {
        return Err(eyre!(
            "Rebuilt swapchain has {} images but {} views",
            shape.image_count,
            shape.view_count,
        ));
    }

    target.rebuild_image_semaphores(shape.image_count)?;
    if needs_rebuild(target.pipeline_format(), shape.color_format) {
        target.rebuild_pipeline(shape.color_format)?;
    }

    log::debug!(
        "Swapchain rebuilt at {}x{} with {} images",
        framebuffer_size.0,
        framebuffer_size.1,
        shape.image_count,
    );
    Ok(Some(shape))
}
