use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use color_eyre::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use winit::window::Window;
use crate::renderer::window::WindowProvider;

/// How long to park while the window has no drawable area
const MINIMIZED_POLL_INTERVAL: Duration = Duration::from_millis(16);

/// A winit window as seen by the renderer
pub struct WinitWindow {
    pub window: Arc<Window>,
    close_requested: AtomicBool,
}

impl WinitWindow {
    pub fn new(window: Window) -> Self {
        Self {
            window: Arc::new(window),
            close_requested: AtomicBool::new(false),
        }
    }

    pub fn request_close(&self) {
        self.close_requested.store(true, Ordering::Relaxed);
    }

    pub fn is_minimized(&self) -> bool {
        let (width, height) = self.framebuffer_size();
        width == 0 || height == 0
    }
}

impl WindowProvider for WinitWindow {
    fn native_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
        Ok((
            self.window.display_handle()?.as_raw(),
            self.window.window_handle()?.as_raw(),
        ))
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    // The event loop is not re-entrant, so this cannot pump events. The platform updates
    // `inner_size` on its own and we poll it, but `close_requested` cannot flip while a frame
    // is parked here.
    fn wait_for_event(&self) {
        std::thread::sleep(MINIMIZED_POLL_INTERVAL);
    }

    fn is_close_requested(&self) -> bool {
        self.close_requested.load(Ordering::Relaxed)
    }
}
