use color_eyre::Result;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// What the renderer needs from the windowing layer.
pub trait WindowProvider {
    fn native_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)>;

    /// Current drawable size in pixels; either dimension is zero while minimized.
    fn framebuffer_size(&self) -> (u32, u32);

    /// Blocks until the windowing layer has something new to report.
    fn wait_for_event(&self);

    fn is_close_requested(&self) -> bool;
}

/// Blocks on window events until both dimensions are nonzero, or the window is closing.
///
/// Returns `None` if a close was requested while waiting.
pub fn wait_for_drawable_size(window: &dyn WindowProvider) -> Option<(u32, u32)> {
    loop {
        let (width, height) = window.framebuffer_size();
        if width > 0 && height > 0 {
            return Some((width, height));
        }
        if window.is_close_requested() {
            return None;
        }
        window.wait_for_event();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use color_eyre::eyre::eyre;

    /// Reports a scripted sequence of sizes; each event wait advances to the next one.
    pub struct ScriptedWindow {
        sizes: RefCell<VecDeque<(u32, u32)>>,
        current: Cell<(u32, u32)>,
        pub waits: Cell<usize>,
        pub close_after_waits: Option<usize>,
    }

    impl ScriptedWindow {
        pub fn new(initial: (u32, u32), later: &[(u32, u32)]) -> Self {
            Self {
                sizes: RefCell::new(later.iter().copied().collect()),
                current: Cell::new(initial),
                waits: Cell::new(0),
                close_after_waits: None,
            }
        }

        pub fn resize(&self, size: (u32, u32)) {
            self.current.set(size);
        }
    }

    impl WindowProvider for ScriptedWindow {
        fn native_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
            Err(eyre!("Scripted window has no native handles"))
        }

        fn framebuffer_size(&self) -> (u32, u32) {
            self.current.get()
        }

        fn wait_for_event(&self) {
            self.waits.set(self.waits.get() + 1);
            if let Some(next) = self.sizes.borrow_mut().pop_front() {
                self.current.set(next);
            }
        }

        fn is_close_requested(&self) -> bool {
            self.close_after_waits.is_some_and(|limit| self.waits.get() >= limit)
        }
    }

    #[test]
    fn visible_window_does_not_wait() {
        let window = ScriptedWindow::new((800, 600), &[]);
        assert_eq!(wait_for_drawable_size(&window), Some((800, 600)));
        assert_eq!(window.waits.get(), 0);
    }

    #[test]
    fn minimized_window_blocks_until_restored() {
        let window = ScriptedWindow::new((0, 0), &[(0, 0), (640, 0), (640, 480)]);
        assert_eq!(wait_for_drawable_size(&window), Some((640, 480)));
        assert_eq!(window.waits.get(), 3);
    }

    #[test]
    fn close_while_minimized_stops_waiting() {
        let mut window = ScriptedWindow::new((0, 0), &[]);
        window.close_after_waits = Some(2);
        assert_eq!(wait_for_drawable_size(&window), None);
        assert_eq!(window.waits.get(), 2);
    }
}
