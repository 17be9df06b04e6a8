//! A simple, reusable page-frame allocator.
//!
//! The device's command ring, page tables, and buffer pages all come from
//! fixed-size frames handed out by this allocator. It does not know anything
//! about DMA or device addresses; callers (see `hd2::dma`) layer that on top.

#![cfg_attr(not(test), no_std)]

pub mod page_frame_allocator;

pub use self::page_frame_allocator::{PageFrameAllocator, RetrievePageFrameAllocator};
