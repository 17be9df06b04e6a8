//! Fence polling and waiting, per `spec.md` §4.4.
//!
//! `last_fence_cnt` (what the device has finished) and `last_fence_wait`
//! (the highest value anyone has asked `FENCE_WAIT` to unblock at) are kept
//! as two independently-locked counters, matching the two registers they
//! mirror: a poll never blocks on a wait, and a wait never blocks on a poll.

use hd2_abi::InterruptFlags;

use crate::{
    counter::Counter,
    regs::Registers,
    sync::{SpinLock, WaitQueue},
};

/// Tracks how far the device has progressed through submitted fences, and
/// lets callers block until it reaches a target.
pub struct FenceEngine {
    last_fence_cnt: SpinLock<Counter>,
    last_fence_wait: SpinLock<Counter>,
    waiters: WaitQueue,
}

impl FenceEngine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_fence_cnt: SpinLock::new(Counter::ZERO),
            last_fence_wait: SpinLock::new(Counter::ZERO),
            waiters: WaitQueue::new(),
        }
    }

    /// Wait-free poll: folds the hardware's wrapping register into
    /// `last_fence_cnt` and returns the reconstructed value. Safe to call
    /// from interrupt context.
    pub fn poll(&self, regs: &dyn Registers) -> Counter {
        let mut guard = self.last_fence_cnt.lock();
        *guard = guard.reconstruct_next(regs.fence_counter());
        *guard
    }

    #[must_use]
    pub fn last_fence_cnt(&self) -> Counter {
        *self.last_fence_cnt.lock()
    }

    /// Blocks the calling context until `target` has completed, programming
    /// `FENCE_WAIT` first if `target` is further out than anything currently
    /// armed. Never called from interrupt context.
    pub fn wait(&self, regs: &dyn Registers, target: Counter) {
        if self.poll(regs) >= target {
            return;
        }

        log::debug!("fence: blocking until {target:?}");
        {
            let mut armed = self.last_fence_wait.lock();
            if target > *armed {
                *armed = target;
                regs.set_fence_wait(target.0 as u32);
            }
        }

        let mut guard = self.last_fence_cnt.lock();
        while guard.reconstruct_next(regs.fence_counter()) < target {
            guard = self.waiters.wait(guard);
            *guard = guard.reconstruct_next(regs.fence_counter());
        }
        log::trace!("fence: reached {target:?}");
    }

    /// Called from the interrupt handler on a FENCE interrupt: re-polls and
    /// wakes every blocked waiter, since any of them might have become
    /// satisfied.
    pub fn on_fence_interrupt(&self, regs: &dyn Registers) {
        self.poll(regs);
        self.waiters.notify_all();
    }

    #[must_use]
    pub const fn interrupt_mask() -> InterruptFlags {
        InterruptFlags::FENCE
    }
}

impl Default for FenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::mock::MockRegisters;

    #[test]
    fn poll_reflects_register_value() {
        let regs = MockRegisters::default();
        regs.set_fence_counter(42);
        let engine = FenceEngine::new();
        assert_eq!(engine.poll(&regs), Counter(42));
    }

    #[test]
    fn wait_returns_immediately_if_already_satisfied() {
        let regs = MockRegisters::default();
        regs.set_fence_counter(10);
        let engine = FenceEngine::new();
        engine.wait(&regs, Counter(5));
    }

    #[test]
    fn wait_blocks_until_interrupt_advances_counter() {
        use std::sync::Arc;

        let regs = Arc::new(MockRegisters::default());
        let engine = Arc::new(FenceEngine::new());

        let waiter = {
            let regs = Arc::clone(&regs);
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                engine.wait(regs.as_ref(), Counter(100));
            })
        };

        std::thread::sleep(std::time::Duration::from_millis(10));
        regs.set_fence_counter(100);
        engine.on_fence_interrupt(regs.as_ref());

        waiter.join().unwrap();
        assert_eq!(engine.last_fence_cnt(), Counter(100));
    }

    #[test]
    fn wait_only_programs_fence_wait_register_when_target_exceeds_armed() {
        let regs = MockRegisters::default();
        let engine = FenceEngine::new();
        regs.set_fence_counter(50);

        engine.wait(&regs, Counter(50));
        assert_eq!(*engine.last_fence_wait.lock(), Counter::ZERO);
    }
}
