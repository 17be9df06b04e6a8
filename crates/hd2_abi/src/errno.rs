/// Error codes returned across the ioctl / read / write boundary.
///
/// These mirror the POSIX errno values the character-device glue translates
/// them to; the driver core never constructs an `i32` directly, so the
/// mapping lives in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Errno {
    /// Caller-supplied argument violates a stated precondition.
    #[error("invalid argument")]
    Inval,
    /// Allocation failure (handle, change-record, scratch buffer, DMA page).
    #[error("out of memory")]
    NoMem,
    /// A bounded numeric input is outside the allowed range.
    #[error("value too large")]
    Overflow,
    /// A userspace copy failed before any bytes were transferred.
    #[error("bad address")]
    Fault,
    /// Write offset is at or past the end of the buffer.
    #[error("no space left on device")]
    NoSpc,
    /// The referenced file descriptor does not refer to a handle.
    #[error("bad file descriptor")]
    BadF,
    /// The ioctl opcode is not recognized on this node.
    #[error("inappropriate ioctl for device")]
    NoTty,
    /// Device-infrastructure error during probe. Never raised post-init.
    #[error("I/O error")]
    Io,
}

impl Errno {
    /// The negative POSIX errno value the character-device glue would
    /// return from the syscall (e.g. `-EINVAL`).
    #[must_use]
    pub const fn to_raw_neg(self) -> i32 {
        match self {
            Self::Inval => -22,
            Self::NoMem => -12,
            Self::Overflow => -75, // EOVERFLOW
            Self::Fault => -14,
            Self::NoSpc => -28,
            Self::BadF => -9,
            Self::NoTty => -25,
            Self::Io => -5,
        }
    }
}
