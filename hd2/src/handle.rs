//! Reference-counted, device-tagged, role-tagged wrapper around a
//! [`DmaBuffer`], per `spec.md` §4.3.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use hd2_abi::{Errno, SeekWhence};
use hd2_params::MAX_BUFFER_SIZE;

use crate::{
    counter::Counter,
    dma::{DmaBuffer, DmaPageAllocator},
    sync::SpinLock,
};

/// What a buffer is used for. A surface carries non-zero dimensions; every
/// other buffer (command, texture, flat, colormap, translation, tranmap)
/// does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Generic,
    Surface { width: u16, height: u16 },
}

impl BufferKind {
    #[must_use]
    pub const fn is_surface(self) -> bool {
        matches!(self, Self::Surface { .. })
    }
}

struct Inner {
    device_id: u32,
    dma: SpinLock<DmaBuffer>,
    kind: BufferKind,
    last_use: SpinLock<Counter>,
    last_write: SpinLock<Counter>,
    interlocked: AtomicBool,
}

/// A buffer handle, shared by the opened file, the context(s) that have it
/// bound, the device's `curr_bufs` slot, and change-records — see `spec.md`
/// §3's ownership rule: lifetime is the longest of those holders. Sharing
/// is plain `Arc` cloning; callers that want the explicit acquire/release
/// vocabulary `spec.md` §9 describes should read `Clone::clone` as "get"
/// and `Drop` as "put", which is exactly what the reference counted pointer
/// gives for free while keeping a single, provably-correct release point.
#[derive(Clone)]
pub struct BufferHandle(Arc<Inner>);

impl BufferHandle {
    /// Allocates a new handle. Rejects `size > MAX_BUFFER_SIZE`; a surface's
    /// size must equal `width * height`.
    pub fn new(
        alloc: &'static dyn DmaPageAllocator,
        device_id: u32,
        size: usize,
        kind: BufferKind,
    ) -> Result<Self, Errno> {
        if size > MAX_BUFFER_SIZE {
            return Err(Errno::Overflow);
        }
        if let BufferKind::Surface { width, height } = kind {
            if size != usize::from(width) * usize::from(height) {
                return Err(Errno::Inval);
            }
        }

        let dma = DmaBuffer::init(alloc, size)?;
        Ok(Self(Arc::new(Inner {
            device_id,
            dma: SpinLock::new(dma),
            kind,
            last_use: SpinLock::new(Counter::ZERO),
            last_write: SpinLock::new(Counter::ZERO),
            // A fresh buffer has never been written by the device, so there
            // is nothing for an initial COPY_RECT read to interlock against.
            interlocked: AtomicBool::new(true),
        })))
    }

    /// Resolves an opaque userspace buffer identifier (a file descriptor in
    /// the reference ABI) via `lookup`. Fails with [`Errno::BadF`] if no
    /// such file exists, or [`Errno::Inval`] if it exists but isn't a
    /// buffer file. Looking an fd up at all is the character-device glue's
    /// job (see `spec.md` §1); `lookup` is that seam.
    pub fn fd_acquire(fd: i32, lookup: impl FnOnce(i32) -> FdLookup) -> Result<Self, Errno> {
        match lookup(fd) {
            FdLookup::NoSuchFile => Err(Errno::BadF),
            FdLookup::WrongFileType => Err(Errno::Inval),
            FdLookup::Buffer(handle) => Ok(handle),
        }
    }

    #[must_use]
    pub fn device_id(&self) -> u32 {
        self.0.device_id
    }

    #[must_use]
    pub fn is_surface(&self) -> bool {
        self.0.kind.is_surface()
    }

    /// # Panics
    /// Panics if this handle is not a surface.
    #[must_use]
    pub fn width(&self) -> u16 {
        match self.0.kind {
            BufferKind::Surface { width, .. } => width,
            BufferKind::Generic => panic!("width queried on a non-surface buffer"),
        }
    }

    /// # Panics
    /// Panics if this handle is not a surface.
    #[must_use]
    pub fn height(&self) -> u16 {
        match self.0.kind {
            BufferKind::Surface { height, .. } => height,
            BufferKind::Generic => panic!("height queried on a non-surface buffer"),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.0.dma.lock().size()
    }

    #[must_use]
    pub fn page_table_address(&self) -> u64 {
        self.0.dma.lock().page_table_address()
    }

    #[must_use]
    pub fn last_use(&self) -> Counter {
        *self.0.last_use.lock()
    }

    #[must_use]
    pub fn last_write(&self) -> Counter {
        *self.0.last_write.lock()
    }

    /// Bumps `last_use` to `cnt`. Precondition: monotone non-decreasing.
    pub fn set_last_use(&self, cnt: Counter) {
        let mut guard = self.0.last_use.lock();
        debug_assert!(cnt >= *guard, "last_use must be monotone");
        *guard = cnt;
    }

    /// Bumps `last_write` to `cnt` and clears `interlocked` (§4.3: "cleared
    /// by `set_last_write`").
    pub fn set_last_write(&self, cnt: Counter) {
        let mut guard = self.0.last_write.lock();
        debug_assert!(cnt >= *guard, "last_write must be monotone");
        *guard = cnt;
        self.0.interlocked.store(false, Ordering::Relaxed);
    }

    #[must_use]
    pub fn interlocked(&self) -> bool {
        self.0.interlocked.load(Ordering::Relaxed)
    }

    pub fn interlock(&self) {
        self.0.interlocked.store(true, Ordering::Relaxed);
    }

    pub fn copy_in_kernel(&self, src: &[u8], dst_pos: usize) {
        self.0.dma.lock().copy_in_kernel(src, dst_pos);
    }

    pub fn copy_from_user(
        &self,
        reader: &mut impl crate::dma::UserReader,
        dst_pos: usize,
        len: usize,
    ) -> Result<usize, Errno> {
        self.0.dma.lock().copy_from_user(reader, dst_pos, len)
    }

    pub fn copy_to_user(
        &self,
        writer: &mut impl crate::dma::UserWriter,
        src_pos: usize,
        len: usize,
    ) -> Result<usize, Errno> {
        self.0.dma.lock().copy_to_user(writer, src_pos, len)
    }

    /// Number of live references to the underlying buffer (the opened file,
    /// any context holding it bound, the device's installed slot, and any
    /// pending change-record together keep this above 1 until every holder
    /// has released it).
    #[must_use]
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Whether `self` and `other` refer to the same underlying buffer, used
    /// to detect a `COPY_RECT` whose source and destination are the same
    /// handle.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Computes a new file position from `whence` and `pos`, clamped to
    /// `[0, size]` per the standard `lseek(2)` whences. Does not itself move
    /// anything — the character-device glue owns the file's current offset;
    /// this is the bounds-checking arithmetic the glue calls into.
    pub fn seek(&self, current: usize, pos: i64, whence: SeekWhence) -> Result<usize, Errno> {
        let base = match whence {
            SeekWhence::Start => 0_i64,
            SeekWhence::Current => i64::try_from(current).map_err(|_| Errno::Overflow)?,
            SeekWhence::End => i64::try_from(self.size()).map_err(|_| Errno::Overflow)?,
        };
        let target = base.checked_add(pos).ok_or(Errno::Inval)?;
        let size = self.size();
        if target < 0 || target as usize > size {
            return Err(Errno::Inval);
        }
        Ok(target as usize)
    }
}

/// Outcome of resolving an opaque userspace buffer identifier; see
/// [`BufferHandle::fd_acquire`].
pub enum FdLookup {
    NoSuchFile,
    WrongFileType,
    Buffer(BufferHandle),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::test_support::HeapPageAllocator;

    fn leaked_allocator() -> &'static HeapPageAllocator {
        Box::leak(Box::default())
    }

    #[test]
    fn surface_size_must_match_dimensions() {
        let alloc = leaked_allocator();
        let err = BufferHandle::new(
            alloc,
            0,
            100,
            BufferKind::Surface {
                width: 64,
                height: 1,
            },
        )
        .unwrap_err();
        assert_eq!(err, Errno::Inval);
    }

    #[test]
    fn oversized_buffer_is_rejected() {
        let alloc = leaked_allocator();
        let err = BufferHandle::new(alloc, 0, MAX_BUFFER_SIZE + 1, BufferKind::Generic).unwrap_err();
        assert_eq!(err, Errno::Overflow);
    }

    #[test]
    fn fresh_handle_starts_interlocked() {
        let alloc = leaked_allocator();
        let handle = BufferHandle::new(alloc, 0, 64, BufferKind::Generic).unwrap();
        assert!(handle.interlocked());
    }

    #[test]
    fn set_last_write_clears_interlock() {
        let alloc = leaked_allocator();
        let handle = BufferHandle::new(alloc, 0, 64, BufferKind::Generic).unwrap();
        handle.interlock();
        assert!(handle.interlocked());
        handle.set_last_write(Counter(1));
        assert!(!handle.interlocked());
    }

    #[test]
    fn clone_bumps_refcount_drop_releases() {
        let alloc = leaked_allocator();
        let handle = BufferHandle::new(alloc, 0, 64, BufferKind::Generic).unwrap();
        assert_eq!(handle.strong_count(), 1);
        let second = handle.clone();
        assert_eq!(handle.strong_count(), 2);
        drop(second);
        assert_eq!(handle.strong_count(), 1);
    }

    #[test]
    fn seek_clamps_to_buffer_bounds() {
        let alloc = leaked_allocator();
        let handle = BufferHandle::new(alloc, 0, 64, BufferKind::Generic).unwrap();

        assert_eq!(handle.seek(0, 10, SeekWhence::Start).unwrap(), 10);
        assert_eq!(handle.seek(10, 5, SeekWhence::Current).unwrap(), 15);
        assert_eq!(handle.seek(0, 0, SeekWhence::End).unwrap(), 64);
        assert_eq!(handle.seek(0, -64, SeekWhence::End).unwrap(), 0);

        assert_eq!(handle.seek(0, 65, SeekWhence::Start).unwrap_err(), Errno::Inval);
        assert_eq!(handle.seek(0, -1, SeekWhence::Start).unwrap_err(), Errno::Inval);
    }

    #[test]
    fn fd_acquire_maps_lookup_outcomes() {
        assert_eq!(
            BufferHandle::fd_acquire(3, |_| FdLookup::NoSuchFile).unwrap_err(),
            Errno::BadF
        );
        assert_eq!(
            BufferHandle::fd_acquire(3, |_| FdLookup::WrongFileType).unwrap_err(),
            Errno::Inval
        );

        let alloc = leaked_allocator();
        let handle = BufferHandle::new(alloc, 0, 64, BufferKind::Generic).unwrap();
        let resolved = BufferHandle::fd_acquire(3, move |_| FdLookup::Buffer(handle)).unwrap();
        assert_eq!(resolved.size(), 64);
    }
}
