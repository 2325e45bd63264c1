pub mod config;
pub mod core;
pub mod headless;
pub mod vk;
pub mod window;

use color_eyre::Result;
use crate::renderer::config::{Backend, RenderConfig};
use crate::renderer::core::context::RenderContext;
use crate::renderer::core::frame::FrameOutcome;
use crate::renderer::headless::HeadlessRenderer;
use crate::renderer::window::WindowProvider;

/// The backend picked at startup
pub enum Renderer {
    Vulkan(Box<RenderContext>),
    Headless(HeadlessRenderer),
}

impl Renderer {
    pub fn new(
        config: &RenderConfig,
        window: &dyn WindowProvider,
    ) -> Result<Self> {
        Ok(match config.backend {
            Backend::Vulkan => Self::Vulkan(Box::new(RenderContext::new(config, window)?)),
            Backend::Headless => Self::Headless(HeadlessRenderer::new()),
        })
    }

    pub fn backend(&self) -> Backend {
        match self {
            Self::Vulkan(_) => Backend::Vulkan,
            Self::Headless(_) => Backend::Headless,
        }
    }

    pub fn request_resize(&mut self) {
        match self {
            Self::Vulkan(ctx) => ctx.request_resize(),
            Self::Headless(headless) => headless.request_resize(),
        }
    }

    pub fn render_frame(&mut self, window: &dyn WindowProvider) -> Result<FrameOutcome> {
        match self {
            Self::Vulkan(ctx) => ctx.render_frame(window),
            Self::Headless(headless) => Ok(headless.render_frame()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::window::tests::ScriptedWindow;

    #[test]
    fn headless_backend_needs_no_native_window() {
        let config = RenderConfig {
            backend: Backend::Headless,
            ..Default::default()
        };
        let window = ScriptedWindow::new((640, 480), &[]);
        let mut renderer = Renderer::new(&config, &window).unwrap();
        assert_eq!(renderer.backend(), Backend::Headless);

        renderer.request_resize();
        let outcome = renderer.render_frame(&window).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Presented { slot: 0, image_index: 0, recreated: true },
        );
    }

    #[test]
    fn vulkan_backend_reports_missing_window_handles() {
        let config = RenderConfig::default();
        let window = ScriptedWindow::new((640, 480), &[]);
        assert!(Renderer::new(&config, &window).is_err());
    }
}
