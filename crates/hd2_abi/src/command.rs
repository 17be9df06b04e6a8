use dataview::{DataView, Pod};
use strum::FromRepr;

use crate::{
    errno::Errno,
    flags::{CommandFlags, SetupCommandFlags},
};

/// Size in bytes of a single user command record, and of a translated
/// device command (8 × 32-bit words).
pub const CMD_RECORD_BYTES: usize = 32;

/// Discriminant of a 32-byte user command record (`doomdev2_cmd_type`).
///
/// Numbered differently from [`CommandType`]: here `DrawSpan` is 5 and
/// `DrawFuzz` is 6, the reverse of the device-side encoding.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
enum UserCmdKind {
    CopyRect = 0,
    FillRect = 1,
    DrawLine = 2,
    DrawBackground = 3,
    DrawColumn = 4,
    DrawSpan = 5,
    DrawFuzz = 6,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod)]
pub struct CmdCopyRect {
    type_: u8,
    _pad: [u8; 3],
    pub width: u16,
    pub height: u16,
    pub pos_dst_x: u16,
    pub pos_dst_y: u16,
    pub pos_src_x: u16,
    pub pos_src_y: u16,
    _pad2: [u32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod)]
pub struct CmdFillRect {
    type_: u8,
    pub fill_color: u8,
    _pad: [u8; 2],
    pub width: u16,
    pub height: u16,
    pub pos_x: u16,
    pub pos_y: u16,
    _pad2: [u32; 5],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod)]
pub struct CmdDrawLine {
    type_: u8,
    pub fill_color: u8,
    _pad: [u8; 2],
    pub pos_a_x: u16,
    pub pos_a_y: u16,
    pub pos_b_x: u16,
    pub pos_b_y: u16,
    _pad2: [u32; 5],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod)]
pub struct CmdDrawBackground {
    type_: u8,
    _pad: u8,
    pub flat_idx: u16,
    pub width: u16,
    pub height: u16,
    pub pos_x: u16,
    pub pos_y: u16,
    _pad2: [u32; 5],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod)]
pub struct CmdDrawColumn {
    type_: u8,
    pub flags: u8,
    pub pos_x: u16,
    pub pos_a_y: u16,
    pub pos_b_y: u16,
    pub colormap_idx: u16,
    pub translation_idx: u16,
    pub texture_height: u16,
    _pad: u16,
    pub texture_offset: u32,
    pub ustart: u32,
    pub ustep: u32,
    _pad2: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod)]
pub struct CmdDrawSpan {
    type_: u8,
    pub flags: u8,
    pub pos_y: u16,
    pub pos_a_x: u16,
    pub pos_b_x: u16,
    pub colormap_idx: u16,
    pub translation_idx: u16,
    pub flat_idx: u16,
    _pad: u16,
    pub ustart: u32,
    pub vstart: u32,
    pub ustep: u32,
    pub vstep: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod)]
pub struct CmdDrawFuzz {
    type_: u8,
    pub fuzz_pos: u8,
    pub pos_x: u16,
    pub pos_a_y: u16,
    pub pos_b_y: u16,
    pub fuzz_start: u16,
    pub fuzz_end: u16,
    pub colormap_idx: u16,
    _pad: [u16; 9],
}

const _: () = {
    assert!(size_of::<CmdCopyRect>() == CMD_RECORD_BYTES);
    assert!(size_of::<CmdFillRect>() == CMD_RECORD_BYTES);
    assert!(size_of::<CmdDrawLine>() == CMD_RECORD_BYTES);
    assert!(size_of::<CmdDrawBackground>() == CMD_RECORD_BYTES);
    assert!(size_of::<CmdDrawColumn>() == CMD_RECORD_BYTES);
    assert!(size_of::<CmdDrawSpan>() == CMD_RECORD_BYTES);
    assert!(size_of::<CmdDrawFuzz>() == CMD_RECORD_BYTES);
};

/// A single user command, decoded from a 32-byte record accepted by `write`.
#[derive(Debug, Clone, Copy)]
pub enum UserCommand {
    CopyRect(CmdCopyRect),
    FillRect(CmdFillRect),
    DrawLine(CmdDrawLine),
    DrawBackground(CmdDrawBackground),
    DrawColumn(CmdDrawColumn),
    DrawSpan(CmdDrawSpan),
    DrawFuzz(CmdDrawFuzz),
}

impl UserCommand {
    /// Decodes one record. `Err(Errno::Inval)` for an unrecognized type byte;
    /// the caller is expected to slice `CMD_RECORD_BYTES`-sized chunks off a
    /// validated batch.
    pub fn decode(record: &[u8; CMD_RECORD_BYTES]) -> Result<Self, Errno> {
        let kind = UserCmdKind::from_repr(record[0]).ok_or(Errno::Inval)?;
        let view = DataView::from(record.as_slice());
        Ok(match kind {
            UserCmdKind::CopyRect => Self::CopyRect(*view.get::<CmdCopyRect>(0)),
            UserCmdKind::FillRect => Self::FillRect(*view.get::<CmdFillRect>(0)),
            UserCmdKind::DrawLine => Self::DrawLine(*view.get::<CmdDrawLine>(0)),
            UserCmdKind::DrawBackground => Self::DrawBackground(*view.get::<CmdDrawBackground>(0)),
            UserCmdKind::DrawColumn => Self::DrawColumn(*view.get::<CmdDrawColumn>(0)),
            UserCmdKind::DrawSpan => Self::DrawSpan(*view.get::<CmdDrawSpan>(0)),
            UserCmdKind::DrawFuzz => Self::DrawFuzz(*view.get::<CmdDrawFuzz>(0)),
        })
    }
}

/// Device-side command type, encoded in bits 0..3 of word 0.
///
/// Numbered differently from [`UserCmdKind`]: here `DrawFuzz` is 5 and
/// `DrawSpan` is 6. A translator swapping these two would silently corrupt
/// every fuzz and span draw.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
pub enum CommandType {
    CopyRect = 0x0,
    FillRect = 0x1,
    DrawLine = 0x2,
    DrawBackground = 0x3,
    DrawColumn = 0x4,
    DrawFuzz = 0x5,
    DrawSpan = 0x6,
    Setup = 0x7,
}

/// The device's native 8-word (32-byte) command format, ready to be written
/// into a ring slot. Field-level assembly helpers mirror the `HARDDOOM2_CMD_*`
/// encoding macros; the per-command-type choice of which helper to call for
/// which word is the translator's job, not this crate's.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod)]
pub struct DeviceWords([u32; 8]);

impl DeviceWords {
    #[must_use]
    pub const fn from_words(words: [u32; 8]) -> Self {
        Self(words)
    }

    #[must_use]
    pub const fn words(&self) -> &[u32; 8] {
        &self.0
    }

    /// Word 0 for a non-SETUP command.
    #[must_use]
    pub const fn word0(cmd_type: CommandType, flags: CommandFlags) -> u32 {
        cmd_type as u32 | flags.bits()
    }

    /// Word 0 for a SETUP command: type, per-role flags, and the two surface
    /// widths packed 6 bits each (widths are always multiples of 64).
    #[must_use]
    pub const fn word0_setup(flags: SetupCommandFlags, surf_dst_width: u32, surf_src_width: u32) -> u32 {
        CommandType::Setup as u32 | flags.bits() | (surf_dst_width >> 6) << 16 | (surf_src_width >> 6) << 24
    }

    /// Word 1 for a non-SETUP command: translation and colormap indices.
    #[must_use]
    pub const fn word1(translation_idx: u32, colormap_idx: u32) -> u32 {
        (translation_idx & 0x3fff) | (colormap_idx & 0x3fff) << 16
    }

    /// Word 2: X, Y, and flat index.
    #[must_use]
    pub const fn word2(x: u32, y: u32, flat_idx: u32) -> u32 {
        (x & 0x7ff) | (y & 0x7ff) << 11 | (flat_idx & 0x3ff) << 22
    }

    /// Word 3: X and Y only.
    #[must_use]
    pub const fn word3(x: u32, y: u32) -> u32 {
        (x & 0x7ff) | (y & 0x7ff) << 11
    }

    /// Word 6 variant A: width, height, fill color (`COPY_RECT`, `FILL_RECT`,
    /// `DRAW_LINE`, `DRAW_BACKGROUND`).
    #[must_use]
    pub const fn word6_rect(width: u32, height: u32, fill_color: u32) -> u32 {
        (width & 0xfff) | (height & 0xfff) << 12 | (fill_color & 0xff) << 24
    }

    /// Word 6 variant B: texture offset (`DRAW_COLUMN`).
    #[must_use]
    pub const fn word6_column(texture_offset: u32) -> u32 {
        texture_offset & 0x003f_ffff
    }

    /// Word 6 variant C: fuzz start, end, and position (`DRAW_FUZZ`).
    #[must_use]
    pub const fn word6_fuzz(fuzz_start: u32, fuzz_end: u32, fuzz_pos: u32) -> u32 {
        (fuzz_start & 0x7ff) | (fuzz_end & 0x7ff) << 12 | (fuzz_pos & 0x3f) << 24
    }

    /// Word 7 variant B: texture data limit and height (`DRAW_COLUMN`).
    #[must_use]
    pub const fn word7_column(texture_limit: u32, texture_height: u32) -> u32 {
        (texture_limit & 0xffff) | (texture_height & 0xffff) << 16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: u8, fields: impl FnOnce(&mut [u8; CMD_RECORD_BYTES])) -> [u8; CMD_RECORD_BYTES] {
        let mut buf = [0_u8; CMD_RECORD_BYTES];
        buf[0] = kind;
        fields(&mut buf);
        buf
    }

    #[test]
    fn decodes_fill_rect_fields() {
        let buf = record(1, |buf| {
            buf[1] = 0xAB; // fill_color
            buf[4..6].copy_from_slice(&64_u16.to_ne_bytes()); // width
            buf[6..8].copy_from_slice(&1_u16.to_ne_bytes()); // height
        });
        let Ok(UserCommand::FillRect(cmd)) = UserCommand::decode(&buf) else {
            panic!("expected FillRect");
        };
        assert_eq!(cmd.fill_color, 0xAB);
        assert_eq!(cmd.width, 64);
        assert_eq!(cmd.height, 1);
    }

    #[test]
    fn rejects_unknown_type() {
        let mut buf = [0_u8; CMD_RECORD_BYTES];
        buf[0] = 7;
        assert!(matches!(UserCommand::decode(&buf), Err(Errno::Inval)));
    }

    #[test]
    fn word0_packs_type_and_flags() {
        let w = DeviceWords::word0(CommandType::DrawFuzz, CommandFlags::FENCE);
        assert_eq!(w, 0x5 | 0x80);
    }

    #[test]
    fn word6_rect_matches_hardware_layout() {
        let w = DeviceWords::word6_rect(64, 1, 0xAB);
        assert_eq!(w, 64 | (1 << 12) | (0xAB << 24));
    }

    #[test]
    fn setup_word0_packs_shifted_widths() {
        let w = DeviceWords::word0_setup(SetupCommandFlags::SURF_DST, 128, 64);
        assert_eq!(w, 0x7 | SetupCommandFlags::SURF_DST.bits() | (2 << 16) | (1 << 24));
    }
}
