//! Compile-time limits for the HardDoom2 driver core.
#![no_std]

/// Page size used for the command ring, page tables, and buffer pages.
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of 4 KiB pages backing a single DMA buffer.
///
/// One page table holds 1024 32-bit PTEs, so this is also the largest index
/// a page table can address.
pub const MAX_BUFFER_PAGES: usize = 1024;

/// Largest buffer a client may allocate with `CREATE_BUFFER`.
pub const MAX_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Largest (and must-be-power-of-two) surface dimension.
pub const MAX_SURFACE_DIM: u32 = 2048;

/// Smallest surface width accepted by `CREATE_SURFACE`.
pub const MIN_SURFACE_WIDTH: u32 = 64;

/// Number of 8-word slots in the command ring. Must be a power of two.
pub const RING_LEN: usize = 128 * 1024;

/// Every `PING_PERIOD`-th ring slot (counted by write-index value) carries
/// PING_ASYNC, guaranteeing eventual wakeup even with no FENCE pending.
///
/// Must divide `RING_LEN / 2`.
pub const PING_PERIOD: usize = 2048;

/// Largest batch of command bytes accepted by a single `write`.
pub const MAX_BATCH_BYTES: usize = 128 * 1024;

/// Size in bytes of a single device command record.
pub const COMMAND_BYTES: usize = 32;

/// Ceiling on the number of devices this driver can track at once.
pub const MAX_DEVICES: usize = 256;

/// Number of role slots bound by a single `SETUP`.
pub const NUM_ROLES: usize = 7;

const _: () = {
    assert!(RING_LEN.is_power_of_two());
    assert!(PING_PERIOD > 0 && (RING_LEN / 2).is_multiple_of(PING_PERIOD));
    assert!(MAX_BATCH_BYTES.is_multiple_of(COMMAND_BYTES));
};
