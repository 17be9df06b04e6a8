//! The fixed-size global device table and its device-number bitmap, per
//! `spec.md` §9 ("Global device table") and the process-wide bitmap lock
//! named in §5's lock list.
//!
//! Lookups are by index into a fixed array; there is no dynamic registry.
//! Each slot is a [`once_init::OnceInit`] — a device is installed exactly
//! once, when PCI probe finishes constructing it, and lives for the
//! lifetime of the driver module. This mirrors how `hd2.c`'s fixed
//! `harddoom2_devices[HARDDOOM2_MAX_DEVICES]` array is populated: probe
//! claims a slot and never gives it back to a different device instance.

use hd2_abi::Errno;
use hd2_params::MAX_DEVICES;
use once_init::OnceInit;

use crate::{device::Device, sync::SpinLock};

const BITMAP_WORDS: usize = MAX_DEVICES / 64;

const _: () = assert!(MAX_DEVICES % 64 == 0, "bitmap word count must divide evenly");

/// Allocates and tracks which of the `MAX_DEVICES` device-number slots are
/// in use, guarded by a single process-wide spinlock (spec.md §5).
pub struct DeviceTable {
    bitmap: SpinLock<[u64; BITMAP_WORDS]>,
    slots: [OnceInit<Device>; MAX_DEVICES],
}

impl DeviceTable {
    #[must_use]
    pub const fn new() -> Self {
        const SLOT: OnceInit<Device> = OnceInit::new();
        Self {
            bitmap: SpinLock::new([0; BITMAP_WORDS]),
            slots: [SLOT; MAX_DEVICES],
        }
    }

    /// Claims the lowest-numbered free device number. [`Errno::NoMem`] if
    /// every slot is already in use (the 256-device ceiling of §6).
    pub fn alloc_id(&self) -> Result<u32, Errno> {
        let mut bitmap = self.bitmap.lock();
        for (word_idx, word) in bitmap.iter_mut().enumerate() {
            if *word != u64::MAX {
                let bit = word.trailing_ones();
                *word |= 1 << bit;
                return Ok(word_idx as u32 * 64 + bit);
            }
        }
        Err(Errno::NoMem)
    }

    /// Releases a device number back to the pool. Does not (and cannot,
    /// given `OnceInit`'s write-once contract) reclaim the slot's storage;
    /// see the module docs.
    pub fn free_id(&self, id: u32) {
        let mut bitmap = self.bitmap.lock();
        bitmap[(id / 64) as usize] &= !(1 << (id % 64));
    }

    /// Installs `device` into the slot numbered `id`. Callers are expected
    /// to have obtained `id` from [`Self::alloc_id`] first.
    ///
    /// # Panics
    /// Panics if slot `id` has already been installed.
    pub fn install(&self, id: u32, device: Device) {
        self.slots[id as usize].init(device);
    }

    /// Looks up an installed device by number.
    ///
    /// # Panics
    /// Panics if slot `id` has not been installed.
    #[must_use]
    pub fn get(&self, id: u32) -> &Device {
        self.slots[id as usize].get()
    }
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dma::test_support::HeapPageAllocator, regs::mock::MockRegisters};

    fn leaked_allocator() -> &'static HeapPageAllocator {
        Box::leak(Box::default())
    }

    fn leaked_regs() -> &'static MockRegisters {
        Box::leak(Box::default())
    }

    #[test]
    fn alloc_hands_out_ascending_ids_and_free_allows_reuse() {
        let table = DeviceTable::new();
        assert_eq!(table.alloc_id().unwrap(), 0);
        assert_eq!(table.alloc_id().unwrap(), 1);
        table.free_id(0);
        assert_eq!(table.alloc_id().unwrap(), 0);
    }

    #[test]
    fn exhausting_the_table_returns_nomem() {
        let table = DeviceTable::new();
        for _ in 0..MAX_DEVICES {
            table.alloc_id().unwrap();
        }
        assert_eq!(table.alloc_id().unwrap_err(), Errno::NoMem);
    }

    #[test]
    fn install_then_get_resolves_the_same_device() {
        let table = DeviceTable::new();
        let alloc = leaked_allocator();
        let regs = leaked_regs();
        let id = table.alloc_id().unwrap();
        table.install(id, Device::new(id, regs, alloc).unwrap());
        assert_eq!(table.get(id).id(), id);
    }

    #[test]
    #[should_panic(expected = "initialized")]
    fn installing_twice_panics() {
        let table = DeviceTable::new();
        let alloc = leaked_allocator();
        let regs = leaked_regs();
        let id = table.alloc_id().unwrap();
        table.install(id, Device::new(id, regs, alloc).unwrap());
        table.install(id, Device::new(id, regs, alloc).unwrap());
    }
}
