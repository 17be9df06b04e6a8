//! Command submission and lifecycle engine for the HardDoom2 driver core.
//!
//! This crate holds the hardware-agnostic half of the driver: the command
//! ring, fence bookkeeping, buffer-handle lifetime, per-context validation,
//! and the translation from the 32-byte user command wire format into the
//! device's 8-word format. Character-device glue, PCI/MSI setup, and actual
//! user-memory access live in whatever embeds this crate; see the seam
//! traits in `regs`, `dma`, and `handle`.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod context;
pub mod counter;
pub mod device;
pub mod dma;
pub mod error;
pub mod fence;
pub mod handle;
pub mod regs;
pub mod ring;
pub mod sync;
pub mod table;
pub mod translate;

pub use self::{
    context::Context, device::Device, error::Result, handle::BufferHandle, table::DeviceTable,
};
