pub mod spin_lock;
pub mod wait_queue;

pub use self::{
    spin_lock::{SpinLock, SpinLockGuard},
    wait_queue::WaitQueue,
};
