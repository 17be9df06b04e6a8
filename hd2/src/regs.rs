//! The device's MMIO register file, as seen by the core.
//!
//! The register *layout* (offsets, bit encodings) is fixed ABI and lives in
//! `hd2_abi::MmioRegister`; actually touching memory-mapped registers is a
//! PCI/MSI driver-glue concern this crate does not own (see `spec.md` §1).
//! [`Registers`] is the seam: the embedding glue implements it over a real
//! `ioremap`'d BAR, and tests implement it over plain atomics.

use hd2_abi::{InterruptFlags, MmioRegister};

/// Read/write access to the subset of the device's register file this core
/// touches directly. All methods take `&self`: concurrent access from
/// process and interrupt context is the caller's responsibility to
/// serialize (see the `intr` lock in [`crate::device::Device`]).
pub trait Registers: Send + Sync {
    fn read32(&self, reg: MmioRegister) -> u32;
    fn write32(&self, reg: MmioRegister, value: u32);

    fn fence_counter(&self) -> u32 {
        self.read32(MmioRegister::FenceCounter)
    }

    fn set_fence_wait(&self, value: u32) {
        self.write32(MmioRegister::FenceWait, value);
    }

    fn cmd_read_idx(&self) -> u32 {
        self.read32(MmioRegister::CmdReadIdx)
    }

    fn set_cmd_write_idx(&self, value: u32) {
        self.write32(MmioRegister::CmdWriteIdx, value);
    }

    /// Programs the ring's page-table pointer. Takes the low 32 bits of the
    /// device address; the upper bits are carried the same way every other
    /// page-table pointer is (see `hd2_abi::DeviceWords::word0_setup` and
    /// friends) — out of scope for this trait.
    fn set_cmd_pt(&self, addr_low: u32) {
        self.write32(MmioRegister::CmdPt, addr_low);
    }

    fn set_cmd_size(&self, len_in_commands: u32) {
        self.write32(MmioRegister::CmdSize, len_in_commands);
    }

    fn set_enable(&self, bits: u32) {
        self.write32(MmioRegister::Enable, bits);
    }

    fn status(&self) -> u32 {
        self.read32(MmioRegister::Status)
    }

    /// Reads and clears the active-interrupts register in one step (the
    /// hardware clears whatever bits are written back to it).
    fn take_active_interrupts(&self) -> InterruptFlags {
        let bits = self.read32(MmioRegister::Intr);
        self.write32(MmioRegister::Intr, bits);
        InterruptFlags::from_bits_truncate(bits)
    }

    /// Clears just `bits` in the active-interrupts register, leaving any
    /// other latched condition untouched.
    fn clear_interrupt(&self, bits: InterruptFlags) {
        self.write32(MmioRegister::Intr, bits.bits());
    }

    fn intr_enable(&self) -> InterruptFlags {
        InterruptFlags::from_bits_truncate(self.read32(MmioRegister::IntrEnable))
    }

    fn set_intr_enable(&self, flags: InterruptFlags) {
        self.write32(MmioRegister::IntrEnable, flags.bits());
    }

    fn enable_interrupt(&self, bit: InterruptFlags) {
        self.set_intr_enable(self.intr_enable() | bit);
    }

    fn disable_interrupt(&self, bit: InterruptFlags) {
        self.set_intr_enable(self.intr_enable() & !bit);
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use core::sync::atomic::{AtomicU32, Ordering};

    use super::Registers;
    use hd2_abi::MmioRegister;

    /// A bank of plain atomics standing in for the real MMIO BAR in tests.
    #[derive(Debug, Default)]
    pub struct MockRegisters {
        enable: AtomicU32,
        intr: AtomicU32,
        intr_enable: AtomicU32,
        fence_counter: AtomicU32,
        fence_wait: AtomicU32,
        cmd_pt: AtomicU32,
        cmd_size: AtomicU32,
        cmd_read_idx: AtomicU32,
        cmd_write_idx: AtomicU32,
    }

    impl MockRegisters {
        pub fn set_fence_counter(&self, value: u32) {
            self.fence_counter.store(value, Ordering::Relaxed);
        }

        pub fn set_cmd_read_idx(&self, value: u32) {
            self.cmd_read_idx.store(value, Ordering::Relaxed);
        }

        pub fn raise_interrupt(&self, bits: u32) {
            self.intr.fetch_or(bits, Ordering::Relaxed);
        }
    }

    impl Registers for MockRegisters {
        fn read32(&self, reg: MmioRegister) -> u32 {
            let cell = match reg {
                MmioRegister::Enable => &self.enable,
                MmioRegister::Status => &self.enable,
                MmioRegister::Intr => &self.intr,
                MmioRegister::IntrEnable => &self.intr_enable,
                MmioRegister::FenceCounter => &self.fence_counter,
                MmioRegister::FenceWait => &self.fence_wait,
                MmioRegister::CmdPt => &self.cmd_pt,
                MmioRegister::CmdSize => &self.cmd_size,
                MmioRegister::CmdReadIdx => &self.cmd_read_idx,
                MmioRegister::CmdWriteIdx => &self.cmd_write_idx,
                MmioRegister::CmdFree => &self.cmd_read_idx,
            };
            cell.load(Ordering::Relaxed)
        }

        fn write32(&self, reg: MmioRegister, value: u32) {
            let cell = match reg {
                MmioRegister::Enable => &self.enable,
                MmioRegister::Status => &self.enable,
                MmioRegister::Intr => &self.intr,
                MmioRegister::IntrEnable => &self.intr_enable,
                MmioRegister::FenceCounter => &self.fence_counter,
                MmioRegister::FenceWait => &self.fence_wait,
                MmioRegister::CmdPt => &self.cmd_pt,
                MmioRegister::CmdSize => &self.cmd_size,
                MmioRegister::CmdReadIdx => &self.cmd_read_idx,
                MmioRegister::CmdWriteIdx => &self.cmd_write_idx,
                MmioRegister::CmdFree => &self.cmd_read_idx,
            };
            if reg == MmioRegister::Intr {
                // Write-to-clear: only the bits set in `value` are cleared.
                cell.fetch_and(!value, Ordering::Relaxed);
            } else {
                cell.store(value, Ordering::Relaxed);
            }
        }
    }
}
