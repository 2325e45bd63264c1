use color_eyre::eyre::eyre;
use color_eyre::Result;

/// How far the rendering context has been brought up
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    InstanceCreated,
    DeviceCreated,
    SurfaceBound,
    SwapchainReady,
    Rendering,
    /// Rebuilding the swapchain; returns to `SwapchainReady`
    Recreating,
}

impl Lifecycle {
    pub fn can_transition_to(self, next: Lifecycle) -> bool {
        use Lifecycle::*;
        matches!(
            (self, next),
            (Uninitialized, InstanceCreated)
                | (InstanceCreated, DeviceCreated)
                | (DeviceCreated, SurfaceBound)
                | (SurfaceBound, SwapchainReady)
                | (SwapchainReady, Rendering)
                | (Rendering, Recreating)
                | (Recreating, SwapchainReady)
        )
    }
}

/// Contains often-mutated flags and other state information
#[derive(Debug, Default)]
pub struct RenderState {
    lifecycle: Lifecycle,
    pub resize_requested: bool,
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn advance(&mut self, next: Lifecycle) -> Result<()> {
        if !self.lifecycle.can_transition_to(next) {
            return Err(eyre!(
                "Invalid render state transition {:?} -> {:?}",
                self.lifecycle,
                next
            ));
        }
        log::trace!("Render state {:?} -> {:?}", self.lifecycle, next);
        self.lifecycle = next;
        Ok(())
    }

    /// Consumes a pending resize request.
    pub fn take_resize_request(&mut self) -> bool {
        std::mem::take(&mut self.resize_requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_bring_up_and_recreation() {
        let mut state = RenderState::new();
        for next in [
            Lifecycle::InstanceCreated,
            Lifecycle::DeviceCreated,
            Lifecycle::SurfaceBound,
            Lifecycle::SwapchainReady,
            Lifecycle::Rendering,
            Lifecycle::Recreating,
            Lifecycle::SwapchainReady,
            Lifecycle::Rendering,
        ] {
            state.advance(next).unwrap();
        }
        assert_eq!(state.lifecycle(), Lifecycle::Rendering);
    }

    #[test]
    fn steps_cannot_be_skipped() {
        let mut state = RenderState::new();
        assert!(state.advance(Lifecycle::DeviceCreated).is_err());
        assert_eq!(state.lifecycle(), Lifecycle::Uninitialized);

        state.advance(Lifecycle::InstanceCreated).unwrap();
        assert!(state.advance(Lifecycle::SwapchainReady).is_err());
        assert!(state.advance(Lifecycle::Recreating).is_err());
    }

    #[test]
    fn recreation_only_from_rendering() {
        assert!(Lifecycle::Rendering.can_transition_to(Lifecycle::Recreating));
        assert!(!Lifecycle::SwapchainReady.can_transition_to(Lifecycle::Recreating));
        assert!(!Lifecycle::Recreating.can_transition_to(Lifecycle::Rendering));
        assert!(!Lifecycle::Recreating.can_transition_to(Lifecycle::DeviceCreated));
    }

    #[test]
    fn resize_request_is_consumed_once() {
        let mut state = RenderState::new();
        state.resize_requested = true;
        assert!(state.take_resize_request());
        assert!(!state.take_resize_request());
    }
}
