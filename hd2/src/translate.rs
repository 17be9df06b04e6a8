//! Mapping from a decoded user command to the device's 8-word format.
//!
//! Handles the per-command-type field packing only. The flags that depend
//! on submission-wide state — `FENCE`, `PING_ASYNC`, `INTERLOCK` — are OR-ed
//! in by the caller (`device.rs`) after this returns, since this function
//! has no visibility into ring position, batch boundaries, or the source
//! handle's interlock flag.

use hd2_abi::{
    CommandFlags, CommandType, DeviceWords, UserCmdFlags, UserCommand,
};

/// Buffer-size-derived values needed to pack the few fields that a user
/// command record doesn't carry directly (the wire format borrows surface
/// and texture extents from the currently-bound configuration, not from
/// the command itself).
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslateContext {
    /// Last valid texture row offset, i.e. the bound texture's byte size
    /// minus one; used by `DRAW_COLUMN`'s word 7.
    pub texture_limit: u32,
}

fn map_cmd_flags(bits: UserCmdFlags) -> CommandFlags {
    let mut out = CommandFlags::empty();
    if bits.contains(UserCmdFlags::TRANSLATE) {
        out |= CommandFlags::TRANSLATION;
    }
    if bits.contains(UserCmdFlags::COLORMAP) {
        out |= CommandFlags::COLORMAP;
    }
    if bits.contains(UserCmdFlags::TRANMAP) {
        out |= CommandFlags::TRANMAP;
    }
    out
}

/// Packs one validated user command into its device-side word layout.
/// Total over every [`UserCommand`] variant; never fails.
#[must_use]
pub fn translate(cmd: &UserCommand, ctx: TranslateContext) -> (CommandType, DeviceWords) {
    match *cmd {
        UserCommand::CopyRect(c) => {
            let words = [
                DeviceWords::word0(CommandType::CopyRect, CommandFlags::empty()),
                0,
                DeviceWords::word2(u32::from(c.pos_dst_x), u32::from(c.pos_dst_y), 0),
                DeviceWords::word3(u32::from(c.pos_src_x), u32::from(c.pos_src_y)),
                0,
                0,
                DeviceWords::word6_rect(u32::from(c.width), u32::from(c.height), 0),
                0,
            ];
            (CommandType::CopyRect, DeviceWords::from_words(words))
        }
        UserCommand::FillRect(c) => {
            let words = [
                DeviceWords::word0(CommandType::FillRect, CommandFlags::empty()),
                0,
                DeviceWords::word2(u32::from(c.pos_x), u32::from(c.pos_y), 0),
                0,
                0,
                0,
                DeviceWords::word6_rect(u32::from(c.width), u32::from(c.height), u32::from(c.fill_color)),
                0,
            ];
            (CommandType::FillRect, DeviceWords::from_words(words))
        }
        UserCommand::DrawLine(c) => {
            let words = [
                DeviceWords::word0(CommandType::DrawLine, CommandFlags::empty()),
                0,
                DeviceWords::word2(u32::from(c.pos_a_x), u32::from(c.pos_a_y), 0),
                DeviceWords::word3(u32::from(c.pos_b_x), u32::from(c.pos_b_y)),
                0,
                0,
                DeviceWords::word6_rect(0, 0, u32::from(c.fill_color)),
                0,
            ];
            (CommandType::DrawLine, DeviceWords::from_words(words))
        }
        UserCommand::DrawBackground(c) => {
            let words = [
                DeviceWords::word0(CommandType::DrawBackground, CommandFlags::empty()),
                0,
                DeviceWords::word2(u32::from(c.pos_x), u32::from(c.pos_y), u32::from(c.flat_idx)),
                0,
                0,
                0,
                DeviceWords::word6_rect(u32::from(c.width), u32::from(c.height), 0),
                0,
            ];
            (CommandType::DrawBackground, DeviceWords::from_words(words))
        }
        UserCommand::DrawColumn(c) => {
            let flags = map_cmd_flags(UserCmdFlags::from_bits_truncate(c.flags));
            let words = [
                DeviceWords::word0(CommandType::DrawColumn, flags),
                DeviceWords::word1(u32::from(c.translation_idx), u32::from(c.colormap_idx)),
                DeviceWords::word2(u32::from(c.pos_x), u32::from(c.pos_a_y), 0),
                DeviceWords::word3(u32::from(c.pos_x), u32::from(c.pos_b_y)),
                c.ustart,
                c.ustep,
                DeviceWords::word6_column(c.texture_offset),
                DeviceWords::word7_column(ctx.texture_limit, u32::from(c.texture_height)),
            ];
            (CommandType::DrawColumn, DeviceWords::from_words(words))
        }
        UserCommand::DrawSpan(c) => {
            let flags = map_cmd_flags(UserCmdFlags::from_bits_truncate(c.flags));
            let words = [
                DeviceWords::word0(CommandType::DrawSpan, flags),
                DeviceWords::word1(u32::from(c.translation_idx), u32::from(c.colormap_idx)),
                DeviceWords::word2(u32::from(c.pos_a_x), u32::from(c.pos_y), u32::from(c.flat_idx)),
                DeviceWords::word3(u32::from(c.pos_b_x), 0),
                c.ustart,
                c.ustep,
                c.vstart,
                c.vstep,
            ];
            (CommandType::DrawSpan, DeviceWords::from_words(words))
        }
        UserCommand::DrawFuzz(c) => {
            let words = [
                DeviceWords::word0(CommandType::DrawFuzz, CommandFlags::COLORMAP),
                DeviceWords::word1(0, u32::from(c.colormap_idx)),
                DeviceWords::word2(u32::from(c.pos_x), u32::from(c.pos_a_y), 0),
                DeviceWords::word3(u32::from(c.pos_x), u32::from(c.pos_b_y)),
                0,
                0,
                DeviceWords::word6_fuzz(u32::from(c.fuzz_start), u32::from(c.fuzz_end), u32::from(c.fuzz_pos)),
                0,
            ];
            (CommandType::DrawFuzz, DeviceWords::from_words(words))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hd2_abi::CMD_RECORD_BYTES;

    fn record(kind: u8, fields: impl FnOnce(&mut [u8; CMD_RECORD_BYTES])) -> [u8; CMD_RECORD_BYTES] {
        let mut buf = [0_u8; CMD_RECORD_BYTES];
        buf[0] = kind;
        fields(&mut buf);
        buf
    }

    #[test]
    fn fill_rect_packs_color_into_word6() {
        let buf = record(1, |buf| {
            buf[1] = 0xAB; // fill_color
            buf[4..6].copy_from_slice(&64_u16.to_ne_bytes()); // width
            buf[6..8].copy_from_slice(&1_u16.to_ne_bytes()); // height
        });
        let cmd = UserCommand::decode(&buf).unwrap();
        let (ty, words) = translate(&cmd, TranslateContext::default());
        assert_eq!(ty, CommandType::FillRect);
        assert_eq!(words.words()[6], 64 | (1 << 12) | (0xAB << 24));
    }

    #[test]
    fn draw_fuzz_always_sets_colormap_flag() {
        let buf = record(6, |buf| {
            buf[12..14].copy_from_slice(&3_u16.to_ne_bytes()); // colormap_idx
        });
        let cmd = UserCommand::decode(&buf).unwrap();
        let (_, words) = translate(&cmd, TranslateContext::default());
        assert_eq!(
            words.words()[0] & CommandFlags::COLORMAP.bits(),
            CommandFlags::COLORMAP.bits()
        );
        assert_eq!(words.words()[1] & 0x3fff_0000, 3 << 16);
    }
}
