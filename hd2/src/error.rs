pub use hd2_abi::Errno;

/// Convenience alias: every fallible operation in this crate fails with
/// [`Errno`], matching the negative-return-value propagation policy of the
/// surrounding character device.
pub type Result<T> = core::result::Result<T, Errno>;
