//! Per-file bound configuration and command validation, per `spec.md` §4.6.

use hd2_abi::{Errno, Role, UserCmdFlags, UserCommand};
use hd2_params::NUM_ROLES;

use crate::{handle::BufferHandle, sync::SpinLock};

pub type BoundSet = [Option<BufferHandle>; NUM_ROLES];

/// The seven buffers bound by the most recent successful `setup`, and the
/// lock that makes reading/replacing them atomic with respect to concurrent
/// submissions on the same open file.
///
/// The reference design gives this a sleepable lock; nothing in this crate
/// ever blocks a scheduler (that's an external collaborator's concern, see
/// the crate root docs), so a spinlock serves the same purpose here.
pub struct Context {
    bound: SpinLock<BoundSet>,
}

impl Context {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bound: SpinLock::new([None, None, None, None, None, None, None]),
        }
    }

    /// A cheap snapshot of the currently-bound set, taken under the context
    /// lock and then released — matches step 1 of the submission path.
    #[must_use]
    pub fn snapshot(&self) -> BoundSet {
        self.bound.lock().clone()
    }

    /// Validates `new_handles` and, on success, atomically swaps them in,
    /// returning the previously-bound set (the caller turns any non-empty
    /// displaced slot into a change-record).
    pub fn setup(&self, new_handles: BoundSet) -> Result<BoundSet, Errno> {
        validate_bound_set(&new_handles)?;
        let mut guard = self.bound.lock();
        Ok(core::mem::replace(&mut *guard, new_handles))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_bound_set(handles: &BoundSet) -> Result<(), Errno> {
    for (idx, slot) in handles.iter().enumerate() {
        let Some(handle) = slot else { continue };
        let role = Role::from_repr(idx as u8).expect("NUM_ROLES matches Role's variant count");
        if role.is_surface() != handle.is_surface() {
            return Err(Errno::Inval);
        }
    }

    if let (Some(dst), Some(src)) = (
        &handles[Role::SurfaceDst as usize],
        &handles[Role::SurfaceSrc as usize],
    ) {
        if dst.width() != src.width() || dst.height() != src.height() {
            return Err(Errno::Inval);
        }
    }

    check_size_multiple(&handles[Role::Flat as usize], 4096)?;
    check_size_multiple(&handles[Role::Translation as usize], 256)?;
    check_size_multiple(&handles[Role::Colormap as usize], 256)?;
    check_size_multiple(&handles[Role::Tranmap as usize], 64 * 1024)?;
    Ok(())
}

fn check_size_multiple(slot: &Option<BufferHandle>, multiple: usize) -> Result<(), Errno> {
    match slot {
        Some(handle) if !handle.size().is_multiple_of(multiple) => Err(Errno::Inval),
        _ => Ok(()),
    }
}

fn rect_in_bounds(x: u16, y: u16, w: u16, h: u16, bound_w: u32, bound_h: u32) -> Result<(), Errno> {
    let (x, y, w, h) = (u32::from(x), u32::from(y), u32::from(w), u32::from(h));
    if x.checked_add(w).is_some_and(|r| r <= bound_w) && y.checked_add(h).is_some_and(|r| r <= bound_h) {
        Ok(())
    } else {
        Err(Errno::Inval)
    }
}

fn rects_disjoint(ax: u16, ay: u16, bx: u16, by: u16, w: u16, h: u16) -> bool {
    let (ax, ay, bx, by, w, h) = (
        u32::from(ax),
        u32::from(ay),
        u32::from(bx),
        u32::from(by),
        u32::from(w),
        u32::from(h),
    );
    ax + w <= bx || bx + w <= ax || ay + h <= by || by + h <= ay
}

/// Checks the colormap/translation/tranmap bits a `DRAW_COLUMN` or
/// `DRAW_SPAN` command sets against the currently-bound buffers: each set
/// bit requires the matching role to be bound, and any index it carries
/// must fall inside that buffer's size-derived range.
fn validate_colormap_translation_tranmap(
    bound: &BoundSet,
    flags: UserCmdFlags,
    colormap_idx: u16,
    translation_idx: u16,
) -> Result<(), Errno> {
    if flags.contains(UserCmdFlags::COLORMAP) {
        let colormap = bound[Role::Colormap as usize].as_ref().ok_or(Errno::Inval)?;
        if usize::from(colormap_idx) >= colormap.size() / 256 {
            return Err(Errno::Inval);
        }
    }
    if flags.contains(UserCmdFlags::TRANSLATE) {
        let translation = bound[Role::Translation as usize]
            .as_ref()
            .ok_or(Errno::Inval)?;
        if usize::from(translation_idx) >= translation.size() / 256 {
            return Err(Errno::Inval);
        }
    }
    if flags.contains(UserCmdFlags::TRANMAP) && bound[Role::Tranmap as usize].is_none() {
        return Err(Errno::Inval);
    }
    Ok(())
}

/// Validates one decoded user command against the currently-bound set.
/// Every command requires a bound destination surface.
pub fn validate_command(bound: &BoundSet, cmd: &UserCommand) -> Result<(), Errno> {
    let dst = bound[Role::SurfaceDst as usize].as_ref().ok_or(Errno::Inval)?;
    let (dw, dh) = (u32::from(dst.width()), u32::from(dst.height()));

    match cmd {
        UserCommand::CopyRect(c) => {
            let src = bound[Role::SurfaceSrc as usize].as_ref().ok_or(Errno::Inval)?;
            rect_in_bounds(c.pos_dst_x, c.pos_dst_y, c.width, c.height, dw, dh)?;
            rect_in_bounds(
                c.pos_src_x,
                c.pos_src_y,
                c.width,
                c.height,
                u32::from(src.width()),
                u32::from(src.height()),
            )?;
            if dst.ptr_eq(src)
                && !rects_disjoint(c.pos_dst_x, c.pos_dst_y, c.pos_src_x, c.pos_src_y, c.width, c.height)
            {
                return Err(Errno::Inval);
            }
            Ok(())
        }
        UserCommand::FillRect(c) => rect_in_bounds(c.pos_x, c.pos_y, c.width, c.height, dw, dh),
        UserCommand::DrawLine(c) => {
            if u32::from(c.pos_a_x) < dw
                && u32::from(c.pos_a_y) < dh
                && u32::from(c.pos_b_x) < dw
                && u32::from(c.pos_b_y) < dh
            {
                Ok(())
            } else {
                Err(Errno::Inval)
            }
        }
        UserCommand::DrawBackground(c) => {
            let flat = bound[Role::Flat as usize].as_ref().ok_or(Errno::Inval)?;
            if usize::from(c.flat_idx) >= flat.size() / 4096 {
                return Err(Errno::Inval);
            }
            rect_in_bounds(c.pos_x, c.pos_y, c.width, c.height, dw, dh)
        }
        UserCommand::DrawColumn(c) => {
            bound[Role::Texture as usize].as_ref().ok_or(Errno::Inval)?;
            if c.pos_b_y < c.pos_a_y || u32::from(c.pos_x) >= dw || u32::from(c.pos_b_y) >= dh {
                return Err(Errno::Inval);
            }
            let flags = UserCmdFlags::from_bits_truncate(c.flags);
            validate_colormap_translation_tranmap(bound, flags, c.colormap_idx, c.translation_idx)
        }
        UserCommand::DrawSpan(c) => {
            let flat = bound[Role::Flat as usize].as_ref().ok_or(Errno::Inval)?;
            if c.pos_b_x < c.pos_a_x || u32::from(c.pos_y) >= dh || u32::from(c.pos_b_x) >= dw {
                return Err(Errno::Inval);
            }
            if usize::from(c.flat_idx) >= flat.size() / 4096 {
                return Err(Errno::Inval);
            }
            let flags = UserCmdFlags::from_bits_truncate(c.flags);
            validate_colormap_translation_tranmap(bound, flags, c.colormap_idx, c.translation_idx)
        }
        UserCommand::DrawFuzz(c) => {
            let colormap = bound[Role::Colormap as usize].as_ref().ok_or(Errno::Inval)?;
            if !(c.fuzz_start <= c.pos_a_y && c.pos_a_y <= c.pos_b_y && c.pos_b_y <= c.fuzz_end) {
                return Err(Errno::Inval);
            }
            if c.fuzz_pos > 55 || u32::from(c.pos_x) >= dw {
                return Err(Errno::Inval);
            }
            if usize::from(c.colormap_idx) >= colormap.size() / 256 {
                return Err(Errno::Inval);
            }
            Ok(())
        }
    }
}

/// Validates a decoded batch, stopping at the first invalid command.
/// Returns the number of valid commands at the front of `cmds`.
#[must_use]
pub fn validate_batch_prefix(bound: &BoundSet, cmds: &[UserCommand]) -> usize {
    let k = cmds
        .iter()
        .take_while(|cmd| validate_command(bound, cmd).is_ok())
        .count();
    if k < cmds.len() {
        log::debug!("context: batch truncated to {k}/{} valid commands", cmds.len());
    }
    k
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dma::test_support::HeapPageAllocator, handle::BufferKind};
    use hd2_abi::CMD_RECORD_BYTES;

    fn leaked_allocator() -> &'static HeapPageAllocator {
        Box::leak(Box::default())
    }

    fn surface(w: u16, h: u16) -> BufferHandle {
        let alloc = leaked_allocator();
        BufferHandle::new(
            alloc,
            0,
            usize::from(w) * usize::from(h),
            BufferKind::Surface { width: w, height: h },
        )
        .unwrap()
    }

    fn generic(size: usize) -> BufferHandle {
        let alloc = leaked_allocator();
        BufferHandle::new(alloc, 0, size, BufferKind::Generic).unwrap()
    }

    fn record(kind: u8, fields: impl FnOnce(&mut [u8; CMD_RECORD_BYTES])) -> [u8; CMD_RECORD_BYTES] {
        let mut buf = [0_u8; CMD_RECORD_BYTES];
        buf[0] = kind;
        fields(&mut buf);
        buf
    }

    #[test]
    fn setup_rejects_non_surface_in_surface_role() {
        let ctx = Context::new();
        let mut handles: BoundSet = Default::default();
        handles[Role::SurfaceDst as usize] = Some(generic(64));
        assert_eq!(ctx.setup(handles).unwrap_err(), Errno::Inval);
    }

    #[test]
    fn setup_rejects_mismatched_surface_dimensions() {
        let ctx = Context::new();
        let mut handles: BoundSet = Default::default();
        handles[Role::SurfaceDst as usize] = Some(surface(64, 64));
        handles[Role::SurfaceSrc as usize] = Some(surface(128, 64));
        assert_eq!(ctx.setup(handles).unwrap_err(), Errno::Inval);
    }

    #[test]
    fn setup_succeeds_and_returns_previous_set() {
        let ctx = Context::new();
        let mut first: BoundSet = Default::default();
        first[Role::SurfaceDst as usize] = Some(surface(64, 64));
        let old = ctx.setup(first).unwrap();
        assert!(old[Role::SurfaceDst as usize].is_none());

        let second: BoundSet = Default::default();
        let displaced = ctx.setup(second).unwrap();
        assert!(displaced[Role::SurfaceDst as usize].is_some());
    }

    #[test]
    fn fill_rect_requires_destination_bound() {
        let bound: BoundSet = Default::default();
        let buf = record(1, |buf| {
            buf[4..6].copy_from_slice(&1_u16.to_ne_bytes());
            buf[6..8].copy_from_slice(&1_u16.to_ne_bytes());
        });
        let cmd = UserCommand::decode(&buf).unwrap();
        assert_eq!(validate_command(&bound, &cmd).unwrap_err(), Errno::Inval);
    }

    #[test]
    fn fill_rect_out_of_bounds_is_rejected() {
        let mut bound: BoundSet = Default::default();
        bound[Role::SurfaceDst as usize] = Some(surface(64, 1));
        let buf = record(1, |buf| {
            buf[4..6].copy_from_slice(&65_u16.to_ne_bytes()); // width
            buf[6..8].copy_from_slice(&1_u16.to_ne_bytes());
        });
        let cmd = UserCommand::decode(&buf).unwrap();
        assert_eq!(validate_command(&bound, &cmd).unwrap_err(), Errno::Inval);
    }

    #[test]
    fn copy_rect_same_surface_overlap_rejected_disjoint_accepted() {
        let mut bound: BoundSet = Default::default();
        let surf = surface(64, 64);
        bound[Role::SurfaceDst as usize] = Some(surf.clone());
        bound[Role::SurfaceSrc as usize] = Some(surf);

        let overlapping = record(0, |buf| {
            buf[4..6].copy_from_slice(&20_u16.to_ne_bytes()); // width
            buf[6..8].copy_from_slice(&10_u16.to_ne_bytes()); // height
            buf[8..10].copy_from_slice(&0_u16.to_ne_bytes()); // dst x
            buf[10..12].copy_from_slice(&0_u16.to_ne_bytes()); // dst y
            buf[12..14].copy_from_slice(&10_u16.to_ne_bytes()); // src x
            buf[14..16].copy_from_slice(&0_u16.to_ne_bytes()); // src y
        });
        let cmd = UserCommand::decode(&overlapping).unwrap();
        assert_eq!(validate_command(&bound, &cmd).unwrap_err(), Errno::Inval);

        let disjoint = record(0, |buf| {
            buf[4..6].copy_from_slice(&20_u16.to_ne_bytes());
            buf[6..8].copy_from_slice(&10_u16.to_ne_bytes());
            buf[8..10].copy_from_slice(&0_u16.to_ne_bytes());
            buf[10..12].copy_from_slice(&0_u16.to_ne_bytes());
            buf[12..14].copy_from_slice(&30_u16.to_ne_bytes());
            buf[14..16].copy_from_slice(&0_u16.to_ne_bytes());
        });
        let cmd = UserCommand::decode(&disjoint).unwrap();
        validate_command(&bound, &cmd).unwrap();
    }

    #[test]
    fn batch_prefix_stops_at_first_invalid_command() {
        let mut bound: BoundSet = Default::default();
        bound[Role::SurfaceDst as usize] = Some(surface(64, 1));

        let valid = record(1, |buf| {
            buf[4..6].copy_from_slice(&64_u16.to_ne_bytes());
            buf[6..8].copy_from_slice(&1_u16.to_ne_bytes());
        });
        let invalid = record(1, |buf| {
            buf[4..6].copy_from_slice(&65_u16.to_ne_bytes());
            buf[6..8].copy_from_slice(&1_u16.to_ne_bytes());
        });
        let cmds = [
            UserCommand::decode(&valid).unwrap(),
            UserCommand::decode(&valid).unwrap(),
            UserCommand::decode(&invalid).unwrap(),
        ];
        assert_eq!(validate_batch_prefix(&bound, &cmds), 2);
    }
}
