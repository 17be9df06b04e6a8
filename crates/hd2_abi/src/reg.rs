use strum::FromRepr;

/// Byte offsets into the device's MMIO register file (core subset).
///
/// `Status` and `Reset` alias the same offset: reading it returns unit
/// busy-status bits, writing it clears the named units' pending work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
pub enum MmioRegister {
    Enable = 0x0000,
    Status = 0x0004,
    Intr = 0x0008,
    IntrEnable = 0x000c,
    FenceCounter = 0x0010,
    FenceWait = 0x0014,
    CmdPt = 0x0060,
    CmdSize = 0x0064,
    CmdReadIdx = 0x0068,
    CmdWriteIdx = 0x006c,
    CmdFree = 0x0070,
}

impl MmioRegister {
    #[must_use]
    pub const fn offset(self) -> u32 {
        self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_repr_round_trips_offsets() {
        for reg in [
            MmioRegister::Enable,
            MmioRegister::Intr,
            MmioRegister::IntrEnable,
            MmioRegister::FenceCounter,
            MmioRegister::FenceWait,
            MmioRegister::CmdPt,
            MmioRegister::CmdSize,
            MmioRegister::CmdReadIdx,
            MmioRegister::CmdWriteIdx,
            MmioRegister::CmdFree,
        ] {
            assert_eq!(MmioRegister::from_repr(reg.offset()), Some(reg));
        }
    }
}
