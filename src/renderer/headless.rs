use crate::renderer::core::frame::{FrameCursor, FrameOutcome};

/// Stands in for the GPU: cycles frame slots so the application loop behaves the same.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    cursor: FrameCursor,
    frames_rendered: u64,
    resize_requested: bool,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        log::info!("Running headless, nothing will be drawn");
        Self::default()
    }

    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn render_frame(&mut self) -> FrameOutcome {
        let slot = self.cursor.slot();
        self.cursor.advance();
        self.frames_rendered += 1;
        FrameOutcome::Presented {
            slot,
            image_index: slot as u32,
            recreated: std::mem::take(&mut self.resize_requested),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::core::frame::MAX_FRAMES_IN_FLIGHT;

    #[test]
    fn cycles_slots_and_counts_frames() {
        let mut renderer = HeadlessRenderer::new();
        let slots = (0..MAX_FRAMES_IN_FLIGHT + 1)
            .map(|_| match renderer.render_frame() {
                FrameOutcome::Presented { slot, .. } => slot,
                FrameOutcome::Skipped => panic!("headless never skips"),
            })
            .collect::<Vec<_>>();
        assert_eq!(slots, vec![0, 1, 2, 0]);
        assert_eq!(renderer.frames_rendered(), 4);
    }

    #[test]
    fn resize_is_reported_once() {
        let mut renderer = HeadlessRenderer::new();
        renderer.request_resize();
        assert!(matches!(renderer.render_frame(), FrameOutcome::Presented { recreated: true, .. }));
        assert!(matches!(renderer.render_frame(), FrameOutcome::Presented { recreated: false, .. }));
    }
}
