//! The top-level per-device aggregate and the submission path, per
//! `spec.md` §4.7.

use alloc::vec::Vec;

use hd2_abi::{CommandFlags, DeviceWords, Errno, InterruptFlags, Role, SetupCommandFlags, UserCommand};
use hd2_params::{COMMAND_BYTES, MAX_BATCH_BYTES, NUM_ROLES, PING_PERIOD, RING_LEN};

use crate::{
    context::{validate_batch_prefix, BoundSet, Context},
    counter::Counter,
    dma::DmaPageAllocator,
    fence::FenceEngine,
    handle::BufferHandle,
    regs::Registers,
    ring::{free_slots, ChangeRecord, Ring},
    sync::SpinLock,
    translate::{translate, TranslateContext},
};

fn same_handle(a: &Option<BufferHandle>, b: &Option<BufferHandle>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x.ptr_eq(y),
        _ => false,
    }
}

fn setup_flag_for_role(role: Role) -> SetupCommandFlags {
    match role {
        Role::SurfaceDst => SetupCommandFlags::SURF_DST,
        Role::SurfaceSrc => SetupCommandFlags::SURF_SRC,
        Role::Texture => SetupCommandFlags::TEXTURE,
        Role::Flat => SetupCommandFlags::FLAT,
        Role::Colormap => SetupCommandFlags::COLORMAP,
        Role::Translation => SetupCommandFlags::TRANSLATION,
        Role::Tranmap => SetupCommandFlags::TRANMAP,
    }
}

fn build_setup_words(bound: &BoundSet) -> DeviceWords {
    let mut flags = SetupCommandFlags::empty();
    for (idx, slot) in bound.iter().enumerate() {
        if slot.is_some() {
            let role = Role::from_repr(idx as u8).expect("NUM_ROLES matches Role's variant count");
            flags |= setup_flag_for_role(role);
        }
    }
    let dst_width = bound[Role::SurfaceDst as usize].as_ref().map_or(0, |h| u32::from(h.width()));
    let src_width = bound[Role::SurfaceSrc as usize].as_ref().map_or(0, |h| u32::from(h.width()));

    let pt = |role: Role| -> u32 {
        bound[role as usize]
            .as_ref()
            .map_or(0, |h| (h.page_table_address() >> 8) as u32)
    };

    DeviceWords::from_words([
        DeviceWords::word0_setup(flags, dst_width, src_width),
        pt(Role::SurfaceDst),
        pt(Role::SurfaceSrc),
        pt(Role::Texture),
        pt(Role::Flat),
        pt(Role::Translation),
        pt(Role::Colormap),
        pt(Role::Tranmap),
    ])
}

fn or_flags(words: DeviceWords, flags: CommandFlags) -> DeviceWords {
    let mut raw = *words.words();
    raw[0] |= flags.bits();
    DeviceWords::from_words(raw)
}

/// One open device: its registers, command ring, fence engine, and the
/// configuration currently installed on the hardware.
pub struct Device {
    id: u32,
    regs: &'static dyn Registers,
    ring: Ring,
    fence: FenceEngine,
    curr_bufs: SpinLock<BoundSet>,
    batch_cnt: SpinLock<Counter>,
    /// Serializes the whole submission critical section. A real OS-backed
    /// mutex would release this around the back-pressure wait so other
    /// submitters can check and re-arm `PONG_ASYNC` in the meantime; this
    /// crate has no scheduler of its own to yield to (see `sync::WaitQueue`),
    /// so holding it across the wait just means submitters queue up fully
    /// rather than interleave, which is safe, if less concurrent.
    submission: SpinLock<()>,
}

impl Device {
    pub fn new(id: u32, regs: &'static dyn Registers, alloc: &'static dyn DmaPageAllocator) -> Result<Self, Errno> {
        let ring = Ring::init(alloc)?;
        regs.set_cmd_pt((ring.page_table_address() >> 8) as u32);
        regs.set_cmd_size(RING_LEN as u32);
        Ok(Self {
            id,
            regs,
            ring,
            fence: FenceEngine::new(),
            curr_bufs: SpinLock::new(Default::default()),
            batch_cnt: SpinLock::new(Counter::ZERO),
            submission: SpinLock::new(()),
        })
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn create_surface(
        &self,
        alloc: &'static dyn DmaPageAllocator,
        width: u16,
        height: u16,
    ) -> Result<BufferHandle, Errno> {
        let w = u32::from(width);
        if w < hd2_params::MIN_SURFACE_WIDTH || w > hd2_params::MAX_SURFACE_DIM || !w.is_multiple_of(64) {
            return Err(Errno::Overflow);
        }
        if height == 0 || u32::from(height) > hd2_params::MAX_SURFACE_DIM {
            return Err(Errno::Overflow);
        }
        BufferHandle::new(
            alloc,
            self.id,
            usize::from(width) * usize::from(height),
            crate::handle::BufferKind::Surface { width, height },
        )
    }

    pub fn create_buffer(&self, alloc: &'static dyn DmaPageAllocator, size: usize) -> Result<BufferHandle, Errno> {
        if size == 0 {
            return Err(Errno::Inval);
        }
        BufferHandle::new(alloc, self.id, size, crate::handle::BufferKind::Generic)
    }

    /// Runs the interrupt dispatcher: reads and clears the active-interrupts
    /// register, and wakes whichever engine owns each asserted condition.
    /// Panics on any bit this driver does not know how to handle.
    pub fn dispatch_interrupt(&self) {
        let active = self.regs.take_active_interrupts();
        log::trace!("device {}: dispatching interrupts {active:?}", self.id);
        if active.contains(InterruptFlags::FENCE) {
            log::trace!("device {}: FENCE interrupt, waking fence waiters", self.id);
            self.fence.on_fence_interrupt(self.regs);
        }
        if active.contains(InterruptFlags::PONG_ASYNC) {
            log::trace!("device {}: PONG_ASYNC interrupt, waking write waiters", self.id);
            self.ring.on_pong_async_interrupt();
        }
        let unhandled = active - InterruptFlags::handled();
        assert!(unhandled.is_empty(), "unhandled device interrupt: {unhandled:?}");
    }

    fn diff_and_install(&self, bound: &BoundSet, batch_cnt_after: Counter) -> Option<DeviceWords> {
        let mut curr = self.curr_bufs.lock();
        let differs = (0..NUM_ROLES).any(|i| !same_handle(&curr[i], &bound[i]));
        if !differs {
            log::trace!("device {}: setup unchanged, no SETUP emitted", self.id);
            return None;
        }

        let mut displaced: [Option<BufferHandle>; NUM_ROLES] = Default::default();
        for i in 0..NUM_ROLES {
            displaced[i] = core::mem::replace(&mut curr[i], bound[i].clone());
        }
        if displaced.iter().any(Option::is_some) {
            log::debug!(
                "device {}: setup changed, queuing change-record for batch {batch_cnt_after:?}",
                self.id
            );
            self.ring.push_change_record(ChangeRecord {
                displaced,
                batch_cnt: batch_cnt_after,
            });
        } else {
            log::debug!("device {}: first setup, nothing displaced", self.id);
        }
        Some(build_setup_words(bound))
    }

    /// Submits a user-supplied batch (already capped and decoded up to the
    /// first undecodable record by the caller's `write` path). Returns the
    /// number of commands actually accepted.
    pub fn submit_batch(&self, ctx: &Context, raw: &[u8]) -> Result<usize, Errno> {
        if raw.len() > MAX_BATCH_BYTES || !raw.len().is_multiple_of(COMMAND_BYTES) {
            return Err(Errno::Inval);
        }

        let bound = ctx.snapshot();
        let mut cmds = Vec::with_capacity(raw.len() / COMMAND_BYTES);
        for chunk in raw.chunks_exact(COMMAND_BYTES) {
            let record: &[u8; COMMAND_BYTES] = chunk.try_into().expect("chunks_exact guarantees length");
            match UserCommand::decode(record) {
                Ok(cmd) => cmds.push(cmd),
                Err(_) => break,
            }
        }

        let k = validate_batch_prefix(&bound, &cmds);
        if k == 0 {
            return Err(Errno::Inval);
        }
        cmds.truncate(k);

        let _submission = self.submission.lock();
        self.ring.ensure_free_slots(self.regs, 2);

        let next_batch_cnt = self.batch_cnt.lock().succ();
        let setup_words = self.diff_and_install(&bound, next_batch_cnt);

        // The back-pressure wait above only guarantees room for the worst
        // case of one SETUP plus one command; a larger validated batch can
        // still outrun what's currently free, so cap it to the ring's actual
        // free space rather than overwrite slots the device hasn't retired.
        let space = free_slots(self.regs.cmd_read_idx(), self.ring.write_idx());
        let cmd_budget = if setup_words.is_some() { space.saturating_sub(1) } else { space } as usize;
        cmds.truncate(cmds.len().min(cmd_budget));
        let k = cmds.len();

        let texture_limit = bound[Role::Texture as usize]
            .as_ref()
            .map_or(0, |h| (h.size() as u32).wrapping_sub(1) >> 6);
        let translate_ctx = TranslateContext { texture_limit };

        let mut words = Vec::with_capacity(cmds.len() + usize::from(setup_words.is_some()));
        words.extend(setup_words);

        let src = bound[Role::SurfaceSrc as usize].as_ref();
        let last = cmds.len() - 1;
        for (i, cmd) in cmds.iter().enumerate() {
            let (_, packed) = translate(cmd, translate_ctx);
            let mut flags = CommandFlags::empty();
            if let (UserCommand::CopyRect(_), Some(src)) = (cmd, src) {
                if !src.interlocked() {
                    flags |= CommandFlags::INTERLOCK;
                    src.interlock();
                }
            }
            if i == last {
                flags |= CommandFlags::FENCE;
            }
            words.push(or_flags(packed, flags));
        }

        let start_write_idx = self.ring.write_idx();
        for (i, word) in words.iter_mut().enumerate() {
            let slot_idx = start_write_idx.wrapping_add(i as u32);
            if slot_idx.is_multiple_of(PING_PERIOD as u32) {
                *word = or_flags(*word, CommandFlags::PING_ASYNC);
            }
        }

        self.ring.write_batch(self.regs, &words);
        *self.batch_cnt.lock() = next_batch_cnt;

        if let Some(dst) = bound[Role::SurfaceDst as usize].as_ref() {
            dst.set_last_write(next_batch_cnt);
        }
        for handle in bound.iter().flatten() {
            handle.set_last_use(next_batch_cnt);
        }

        let last_fence_cnt = self.fence.poll(self.regs);
        self.ring.collect_garbage(last_fence_cnt);

        Ok(k)
    }

    /// Reads up to `len` bytes from `handle` at `offset` into `writer`, per
    /// `spec.md` §4.3: snapshots `last_write`, blocks until the device has
    /// passed that counter (so the device is done writing whatever it's
    /// going to write as of entry), then copies. Returns `Ok(0)` at or past
    /// end-of-buffer rather than an error, matching `read(2)`.
    pub fn buffer_read(
        &self,
        handle: &BufferHandle,
        offset: usize,
        len: usize,
        writer: &mut impl crate::dma::UserWriter,
    ) -> Result<usize, Errno> {
        let size = handle.size();
        if offset >= size {
            return Ok(0);
        }
        let len = len.min(size - offset);
        let target = handle.last_write();
        self.fence.wait(self.regs, target);
        handle.copy_to_user(writer, offset, len)
    }

    /// Writes up to `len` bytes from `reader` into `handle` at `offset`, per
    /// `spec.md` §4.3: snapshots `last_use`, blocks until the device has
    /// passed that counter (so no in-flight command can still be reading
    /// the buffer's old contents), then copies. [`Errno::NoSpc`] if `offset`
    /// is at or past the end of the buffer.
    pub fn buffer_write(
        &self,
        handle: &BufferHandle,
        offset: usize,
        len: usize,
        reader: &mut impl crate::dma::UserReader,
    ) -> Result<usize, Errno> {
        let size = handle.size();
        if offset >= size {
            return Err(Errno::NoSpc);
        }
        let len = len.min(size - offset);
        let target = handle.last_use();
        self.fence.wait(self.regs, target);
        handle.copy_from_user(reader, offset, len)
    }

    /// Waits for every in-flight batch to retire, then disables the device.
    pub fn suspend(&self) {
        let target = *self.batch_cnt.lock();
        self.fence.wait(self.regs, target);
        self.regs.set_enable(0);
    }

    /// Re-programs the ring and re-installs the current configuration via a
    /// single fenced `SETUP` written at ring index 0.
    pub fn resume(&self) {
        self.regs.set_cmd_pt((self.ring.page_table_address() >> 8) as u32);
        self.regs.set_cmd_size(RING_LEN as u32);

        let bound = self.curr_bufs.lock().clone();
        let setup = or_flags(build_setup_words(&bound), CommandFlags::FENCE);

        self.ring.reset_write_idx(self.regs, 0);
        self.ring.write_batch(self.regs, &[setup]);

        let mut cnt = self.batch_cnt.lock();
        *cnt = cnt.succ();
    }
}
