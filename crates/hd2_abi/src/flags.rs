use bitflags::bitflags;

bitflags! {
    /// Flag bits OR-ed into word 0 of a translated device command.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommandFlags: u32 {
        /// Wait for in-flight writes to the marked source to drain before reading it.
        const INTERLOCK = 0x0000_0010;
        /// Raise an interrupt as soon as this command is fetched.
        const PING_ASYNC = 0x0000_0020;
        /// Raise an interrupt once this command retires.
        const PING_SYNC = 0x0000_0040;
        /// Bump the hardware fence counter on retirement.
        const FENCE = 0x0000_0080;
        /// Apply the translation colormap.
        const TRANSLATION = 0x0000_0100;
        /// Apply the main colormap.
        const COLORMAP = 0x0000_0200;
        /// Apply the transparency map.
        const TRANMAP = 0x0000_0400;
    }
}

bitflags! {
    /// Per-role bits OR-ed into word 0 of a SETUP command, marking which of
    /// the seven page-table pointers are actually being installed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SetupCommandFlags: u32 {
        const SURF_DST = 0x0000_0200;
        const SURF_SRC = 0x0000_0400;
        const TEXTURE = 0x0000_0800;
        const FLAT = 0x0000_1000;
        const TRANSLATION = 0x0000_2000;
        const COLORMAP = 0x0000_4000;
        const TRANMAP = 0x0000_8000;
    }
}

bitflags! {
    /// Bits of the `INTR` / `INTR_ENABLE` registers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InterruptFlags: u32 {
        const FENCE = 0x0000_0001;
        const PONG_SYNC = 0x0000_0002;
        const PONG_ASYNC = 0x0000_0004;
        const FE_ERROR = 0x0000_0010;
        const CMD_OVERFLOW = 0x0000_0020;
        const SURF_DST_OVERFLOW = 0x0000_0040;
        const SURF_SRC_OVERFLOW = 0x0000_0080;
        const PAGE_FAULT_CMD = 0x0000_0100;
        const PAGE_FAULT_SURF_DST = 0x0000_0200;
        const PAGE_FAULT_SURF_SRC = 0x0000_0400;
        const PAGE_FAULT_TEXTURE = 0x0000_0800;
        const PAGE_FAULT_FLAT = 0x0000_1000;
        const PAGE_FAULT_TRANSLATION = 0x0000_2000;
        const PAGE_FAULT_COLORMAP = 0x0000_4000;
        const PAGE_FAULT_TRANMAP = 0x0000_8000;
    }
}

impl InterruptFlags {
    /// Bits that are ever asserted by real hardware; anything outside this
    /// mask read back from `INTR` indicates a programming error.
    pub const MASK: Self = Self::from_bits_truncate(0x0000_fff7);

    /// The subset of conditions this driver core knows how to dispatch;
    /// everything else in [`Self::MASK`] is fatal (see the interrupt
    /// dispatcher in the `hd2` crate).
    #[must_use]
    pub const fn handled() -> Self {
        Self::FENCE.union(Self::PONG_ASYNC)
    }
}

bitflags! {
    /// Flags carried by a 32-byte user command record (`doomdev2_cmd_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UserCmdFlags: u8 {
        const TRANSLATE = 0x01;
        const COLORMAP = 0x02;
        const TRANMAP = 0x04;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_mask_covers_handled_bits() {
        assert!(InterruptFlags::MASK.contains(InterruptFlags::handled()));
    }

    #[test]
    fn unhandled_bits_are_outside_handled_set() {
        let unhandled = InterruptFlags::MASK - InterruptFlags::handled();
        assert!(unhandled.contains(InterruptFlags::FE_ERROR));
        assert!(unhandled.contains(InterruptFlags::CMD_OVERFLOW));
    }
}
