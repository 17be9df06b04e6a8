//! The device command ring, its back-pressure protocol, and the
//! change-record garbage-collection queue, per `spec.md` §4.5.

use alloc::collections::VecDeque;

use dataview::PodMethods as _;
use hd2_abi::{DeviceWords, Errno, InterruptFlags};
use hd2_params::{COMMAND_BYTES, RING_LEN};

use crate::{
    counter::Counter,
    dma::{DmaBuffer, DmaPageAllocator},
    handle::BufferHandle,
    regs::Registers,
    sync::{SpinLock, WaitQueue},
};

const RING_MASK: u32 = (RING_LEN - 1) as u32;

/// `(read_idx - write_idx - 1) mod N`, the number of ring slots the
/// submitter may still write into.
#[must_use]
pub fn free_slots(read_idx: u32, write_idx: u32) -> u32 {
    read_idx.wrapping_sub(write_idx).wrapping_sub(1) & RING_MASK
}

/// The up to seven handles a `SETUP` displaced, released once the device has
/// retired everything up to the batch that queued the setup.
pub struct ChangeRecord {
    pub displaced: [Option<BufferHandle>; hd2_params::NUM_ROLES],
    pub batch_cnt: Counter,
}

pub struct Ring {
    dma: SpinLock<DmaBuffer>,
    write_idx: SpinLock<u32>,
    write_waiters: WaitQueue,
    changes: SpinLock<VecDeque<ChangeRecord>>,
}

impl Ring {
    pub fn init(alloc: &'static dyn DmaPageAllocator) -> Result<Self, Errno> {
        let dma = DmaBuffer::init(alloc, RING_LEN * COMMAND_BYTES)?;
        Ok(Self {
            dma: SpinLock::new(dma),
            write_idx: SpinLock::new(0),
            write_waiters: WaitQueue::new(),
            changes: SpinLock::new(VecDeque::new()),
        })
    }

    #[must_use]
    pub fn page_table_address(&self) -> u64 {
        self.dma.lock().page_table_address()
    }

    #[must_use]
    pub fn write_idx(&self) -> u32 {
        *self.write_idx.lock()
    }

    /// Blocks, per the back-pressure protocol, until at least `needed` slots
    /// are free. Never called holding any handle lock.
    pub fn ensure_free_slots(&self, regs: &dyn Registers, needed: u32) {
        let mut blocked = false;
        loop {
            // Step 1: ack any latched PONG_ASYNC so a stale bit doesn't mask
            // the device's next real wakeup.
            regs.clear_interrupt(InterruptFlags::PONG_ASYNC);

            // Step 2: race-defence re-check — the device may have advanced
            // between our caller's check and this one.
            let mut guard = self.write_idx.lock();
            let free = free_slots(regs.cmd_read_idx(), *guard);
            if free >= needed {
                if blocked {
                    log::trace!("ring: back-pressure cleared, {free} slots free");
                }
                return;
            }

            // Step 3: arm the interrupt and block.
            log::debug!("ring: blocking for write space ({free} free, need {needed})");
            blocked = true;
            regs.enable_interrupt(InterruptFlags::PONG_ASYNC);
            guard = self.write_waiters.wait(guard);
            drop(guard);

            // Step 4: disable again and let every other waiter re-arm for
            // itself on its next iteration.
            regs.disable_interrupt(InterruptFlags::PONG_ASYNC);
            self.write_waiters.notify_all();
        }
    }

    /// Called from the interrupt dispatcher on a `PONG_ASYNC` interrupt.
    pub fn on_pong_async_interrupt(&self) {
        self.write_waiters.notify_all();
    }

    /// Writes `words` into consecutive ring slots starting at the current
    /// write index, advances the host and device write indices, and
    /// returns the new write index. Caller must have already reserved
    /// `words.len()` free slots.
    ///
    /// `write_idx` is a plain monotonically-increasing 32-bit counter, not a
    /// value already reduced mod `N` — matching the hardware register it
    /// mirrors. Only the physical ring offset a command lands at is ever
    /// masked.
    pub fn write_batch(&self, regs: &dyn Registers, words: &[DeviceWords]) -> u32 {
        let mut write_idx = self.write_idx.lock();
        let mut dma = self.dma.lock();
        for (i, word) in words.iter().enumerate() {
            let slot = write_idx.wrapping_add(i as u32) & RING_MASK;
            dma.copy_in_kernel(word.as_bytes(), slot as usize * COMMAND_BYTES);
        }
        *write_idx = write_idx.wrapping_add(words.len() as u32);
        regs.set_cmd_write_idx(*write_idx);
        *write_idx
    }

    /// Forces the host and device write indices to `value`, bypassing the
    /// normal monotone advance. Only valid while the device is not servicing
    /// the ring (see `Device::resume`).
    pub fn reset_write_idx(&self, regs: &dyn Registers, value: u32) {
        *self.write_idx.lock() = value;
        regs.set_cmd_write_idx(value);
    }

    pub fn push_change_record(&self, record: ChangeRecord) {
        self.changes.lock().push_back(record);
    }

    /// Drains every change-record whose `batch_cnt` has been retired,
    /// dropping the handles it held (releasing their references).
    pub fn collect_garbage(&self, last_fence_cnt: Counter) {
        let mut changes = self.changes.lock();
        while matches!(changes.front(), Some(record) if last_fence_cnt >= record.batch_cnt) {
            let record = changes.pop_front().expect("front() just matched Some");
            log::trace!(
                "ring: gc dropped change-record at batch {:?} (fence now {last_fence_cnt:?})",
                record.batch_cnt
            );
        }
    }

    #[must_use]
    pub fn pending_change_records(&self) -> usize {
        self.changes.lock().len()
    }
}
