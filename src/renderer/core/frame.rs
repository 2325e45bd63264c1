use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::vk::command_encoder::CommandEncoder;

pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Which frame slot the next frame records into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameCursor {
    slot: usize,
}

impl FrameCursor {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn advance(&mut self) {
        self.slot = (self.slot + 1) % MAX_FRAMES_IN_FLIGHT;
    }
}

/// Result of asking the swapchain for its next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    Ready {
        image_index: u32,
        suboptimal: bool,
    },
    /// The swapchain no longer matches the surface and must be rebuilt
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapchainStatus {
    Optimal,
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented {
        slot: usize,
        image_index: u32,
        recreated: bool,
    },
    /// Nothing was submitted; the swapchain was rebuilt instead
    Skipped,
}

/// The GPU-facing steps of a frame, in the order `render_frame` calls them.
pub trait FrameTarget {
    /// Blocks until the slot's previous submission has finished.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;
    fn acquire_image(&mut self, slot: usize) -> Result<Acquire>;
    fn record(&mut self, slot: usize, image_index: u32) -> Result<()>;
    /// Unsignals the slot's fence so the coming submission can signal it.
    fn reset_slot(&mut self, slot: usize) -> Result<()>;
    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()>;
    fn present(&mut self, image_index: u32) -> Result<SwapchainStatus>;
    fn recreate_swapchain(&mut self) -> Result<()>;
}

/// Renders one frame into the slot under `cursor`.
///
/// The slot fence is only reset once an image has been acquired and recorded, so a stale
/// acquire leaves it signaled and the next wait on it cannot deadlock.
pub fn render_frame(
    cursor: &mut FrameCursor,
    target: &mut impl FrameTarget,
    resize_requested: bool,
) -> Result<FrameOutcome> {
    let slot = cursor.slot();
    target.wait_for_slot(slot)?;

    let (image_index, suboptimal) = match target.acquire_image(slot)? {
        Acquire::Ready { image_index, suboptimal } => (image_index, suboptimal),
        Acquire::Stale => {
            log::debug!("Swapchain out of date on acquire, skipping frame");
            target.recreate_swapchain()?;
            return Ok(FrameOutcome::Skipped);
        }
    };

    target.record(slot, image_index)?;
    target.reset_slot(slot)?;
    target.submit(slot, image_index)?;
    cursor.advance();

    let status = target.present(image_index)?;
    let recreated = suboptimal || resize_requested || status == SwapchainStatus::Stale;
    if recreated {
        log::debug!(
            "Recreating swapchain after present (suboptimal: {}, resize: {}, status: {:?})",
            suboptimal,
            resize_requested,
            status,
        );
        target.recreate_swapchain()?;
    }

    Ok(FrameOutcome::Presented {
        slot,
        image_index,
        recreated,
    })
}

/// Synchronization objects and command buffer of one frame in flight
pub struct FrameSlot {
    pub encoder: CommandEncoder,
    /// Signaled when the slot's last submission finished
    pub in_flight: vk::Fence,
    pub image_available: vk::Semaphore,
}

/// All frame slots, plus one render-finished semaphore per swapchain image
pub struct FrameSync {
    pub slots: Vec<FrameSlot>,
    pub render_finished: Vec<vk::Semaphore>,

    device: Arc<ash::Device>,
}

impl FrameSync {
    pub fn new(dev: &RenderDevice, image_count: usize) -> Result<Self> {
        let command_buffers = dev.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;
        let mut sync = Self {
            slots: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
            render_finished: Vec::new(),
            device: dev.logical.clone(),
        };

        let fence_info = vk::FenceCreateInfo::default()
            .flags(vk::FenceCreateFlags::SIGNALED);
        for command_buffer in command_buffers {
            let in_flight = unsafe { sync.device.create_fence(&fence_info, None)? };
            let image_available = match sync.create_semaphore() {
                Ok(semaphore) => semaphore,
                Err(err) => {
                    unsafe { sync.device.destroy_fence(in_flight, None) };
                    return Err(err);
                }
            };
            sync.slots.push(FrameSlot {
                encoder: CommandEncoder::new(command_buffer, sync.device.clone()),
                in_flight,
                image_available,
            });
        }

        sync.rebuild_image_semaphores(image_count)?;

        Ok(sync)
    }

    /// Replaces the per-image semaphores after the swapchain changed. The device must be
    /// idle.
    pub fn rebuild_image_semaphores(&mut self, image_count: usize) -> Result<()> {
        self.destroy_image_semaphores();
        for _ in 0..image_count {
            let semaphore = self.create_semaphore()?;
            self.render_finished.push(semaphore);
        }
        Ok(())
    }

    pub fn wait_for_slot(&self, slot: usize, timeout_ns: u64) -> Result<()> {
        let fence = self.slots[slot].in_flight;
        let result = unsafe {
            self.device.wait_for_fences(&[fence], true, timeout_ns)
        };
        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(eyre!(
                "GPU hang: frame slot {} did not finish within {} ms",
                slot,
                timeout_ns / 1_000_000,
            )),
            Err(err) => Err(err.into()),
        }
    }

    pub fn reset_slot(&self, slot: usize) -> Result<()> {
        unsafe {
            self.device.reset_fences(&[self.slots[slot].in_flight])?;
        }
        Ok(())
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        Ok(unsafe { self.device.create_semaphore(&semaphore_info, None)? })
    }

    fn destroy_image_semaphores(&mut self) {
        for semaphore in self.render_finished.drain(..) {
            unsafe { self.device.destroy_semaphore(semaphore, None) };
        }
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        self.destroy_image_semaphores();
        for slot in self.slots.drain(..) {
            unsafe {
                self.device.destroy_fence(slot.in_flight, None);
                self.device.destroy_semaphore(slot.image_available, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Record(usize, u32),
        Reset(usize),
        Submit(usize, u32),
        Present(u32),
        Recreate,
    }

    /// Scripted GPU that finishes work the moment its fence is waited on.
    #[derive(Default)]
    struct MockTarget {
        calls: Vec<Call>,
        acquires: VecDeque<Acquire>,
        presents: VecDeque<SwapchainStatus>,
        next_image: u32,
        image_count: u32,
        in_flight: [bool; MAX_FRAMES_IN_FLIGHT],
        fence_signaled: [bool; MAX_FRAMES_IN_FLIGHT],
        fence_waits_on_pending: [usize; MAX_FRAMES_IN_FLIGHT],
        fail_acquire: bool,
    }

    impl MockTarget {
        fn new(image_count: u32) -> Self {
            Self {
                image_count,
                fence_signaled: [true; MAX_FRAMES_IN_FLIGHT],
                ..Default::default()
            }
        }

        fn count(&self, wanted: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|call| wanted(call)).count()
        }
    }

    impl FrameTarget for MockTarget {
        fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Wait(slot));
            if self.in_flight[slot] {
                self.fence_waits_on_pending[slot] += 1;
            }
            self.in_flight[slot] = false;
            self.fence_signaled[slot] = true;
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> Result<Acquire> {
            self.calls.push(Call::Acquire(slot));
            if self.fail_acquire {
                return Err(eyre!("device lost"));
            }
            Ok(self.acquires.pop_front().unwrap_or_else(|| {
                let image_index = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count;
                Acquire::Ready { image_index, suboptimal: false }
            }))
        }

        fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
            assert!(!self.in_flight[slot], "slot {} re-recorded while in flight", slot);
            self.calls.push(Call::Record(slot, image_index));
            Ok(())
        }

        fn reset_slot(&mut self, slot: usize) -> Result<()> {
            assert!(self.fence_signaled[slot], "reset of an unsignaled fence");
            self.fence_signaled[slot] = false;
            self.calls.push(Call::Reset(slot));
            Ok(())
        }

        fn submit(&mut self, slot: usize, image_index: u32) -> Result<()> {
            assert!(!self.fence_signaled[slot], "submitted without resetting the fence");
            self.in_flight[slot] = true;
            self.calls.push(Call::Submit(slot, image_index));
            Ok(())
        }

        fn present(&mut self, image_index: u32) -> Result<SwapchainStatus> {
            self.calls.push(Call::Present(image_index));
            Ok(self.presents.pop_front().unwrap_or(SwapchainStatus::Optimal))
        }

        fn recreate_swapchain(&mut self) -> Result<()> {
            self.calls.push(Call::Recreate);
            Ok(())
        }
    }

    #[test]
    fn happy_path_runs_steps_in_order() {
        let mut cursor = FrameCursor::default();
        let mut target = MockTarget::new(3);

        let outcome = render_frame(&mut cursor, &mut target, false).unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Presented { slot: 0, image_index: 0, recreated: false },
        );
        assert_eq!(
            target.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Record(0, 0),
                Call::Reset(0),
                Call::Submit(0, 0),
                Call::Present(0),
            ],
        );
        assert_eq!(cursor.slot(), 1);
    }

    #[test]
    fn stale_acquire_skips_submit_and_present() {
        let mut cursor = FrameCursor::default();
        let mut target = MockTarget::new(3);
        render_frame(&mut cursor, &mut target, false).unwrap();
        target.calls.clear();

        target.acquires.push_back(Acquire::Stale);
        let outcome = render_frame(&mut cursor, &mut target, false).unwrap();

        assert_eq!(outcome, FrameOutcome::Skipped);
        assert_eq!(target.calls, vec![Call::Wait(1), Call::Acquire(1), Call::Recreate]);
        assert_eq!(target.count(|c| matches!(c, Call::Recreate)), 1);
        assert_eq!(cursor.slot(), 1);
        // The fence was left signaled, so the retry does not deadlock
        assert!(target.fence_signaled[1]);

        target.calls.clear();
        let retry = render_frame(&mut cursor, &mut target, false).unwrap();
        assert!(matches!(retry, FrameOutcome::Presented { slot: 1, .. }));
    }

    #[test]
    fn stale_present_recreates_after_submitting() {
        let mut cursor = FrameCursor::default();
        let mut target = MockTarget::new(3);
        target.presents.push_back(SwapchainStatus::Stale);

        let outcome = render_frame(&mut cursor, &mut target, false).unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Presented { slot: 0, image_index: 0, recreated: true },
        );
        assert_eq!(target.calls.last(), Some(&Call::Recreate));
        assert_eq!(target.count(|c| matches!(c, Call::Submit(..))), 1);
        assert_eq!(cursor.slot(), 1);
    }

    #[test]
    fn suboptimal_acquire_still_renders() {
        let mut cursor = FrameCursor::default();
        let mut target = MockTarget::new(3);
        target.acquires.push_back(Acquire::Ready { image_index: 2, suboptimal: true });

        let outcome = render_frame(&mut cursor, &mut target, false).unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Presented { slot: 0, image_index: 2, recreated: true },
        );
        assert_eq!(target.count(|c| matches!(c, Call::Present(2))), 1);
        assert_eq!(target.calls.last(), Some(&Call::Recreate));
    }

    #[test]
    fn resize_request_recreates_after_present() {
        let mut cursor = FrameCursor::default();
        let mut target = MockTarget::new(3);

        render_frame(&mut cursor, &mut target, true).unwrap();

        let present = target.calls.iter().position(|c| matches!(c, Call::Present(_)));
        let recreate = target.calls.iter().position(|c| matches!(c, Call::Recreate));
        assert!(present.is_some() && present < recreate);
    }

    #[test]
    fn slots_wrap_modulo_frames_in_flight() {
        let mut cursor = FrameCursor::default();
        let mut target = MockTarget::new(3);

        let slots = (0..7)
            .map(|_| match render_frame(&mut cursor, &mut target, false).unwrap() {
                FrameOutcome::Presented { slot, .. } => slot,
                FrameOutcome::Skipped => panic!("unexpected skip"),
            })
            .collect::<Vec<_>>();

        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn image_index_is_independent_of_slot() {
        let mut cursor = FrameCursor::default();
        let mut target = MockTarget::new(2);

        let pairs = (0..4)
            .map(|_| match render_frame(&mut cursor, &mut target, false).unwrap() {
                FrameOutcome::Presented { slot, image_index, .. } => (slot, image_index),
                FrameOutcome::Skipped => panic!("unexpected skip"),
            })
            .collect::<Vec<_>>();

        assert_eq!(pairs, vec![(0, 0), (1, 1), (2, 0), (0, 1)]);
        assert!(target.calls.contains(&Call::Submit(2, 0)));
    }

    #[test]
    fn every_reuse_waits_on_the_slot_fence() {
        let mut cursor = FrameCursor::default();
        let mut target = MockTarget::new(3);

        for _ in 0..9 {
            render_frame(&mut cursor, &mut target, false).unwrap();
        }

        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            let submits = target.count(|c| matches!(c, Call::Submit(s, _) if *s == slot));
            let waits = target.count(|c| *c == Call::Wait(slot));
            assert_eq!(submits, 3);
            assert_eq!(waits, 3);
            // The first use found the fence pre-signaled; every later one waited on work
            assert_eq!(target.fence_waits_on_pending[slot], 2);
        }
    }

    #[test]
    fn acquire_failure_is_fatal_and_leaves_cursor() {
        let mut cursor = FrameCursor::default();
        let mut target = MockTarget::new(3);
        target.fail_acquire = true;

        assert!(render_frame(&mut cursor, &mut target, false).is_err());
        assert_eq!(cursor.slot(), 0);
        assert_eq!(target.count(|c| matches!(c, Call::Submit(..))), 0);
    }

    #[test]
    fn cursor_wraps() {
        let mut cursor = FrameCursor::default();
        for expected in [1, 2, 0, 1] {
            cursor.advance();
            assert_eq!(cursor.slot(), expected);
        }
    }
}
