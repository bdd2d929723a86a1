//! # Physical Frame Allocation
//!
//! Contiguous physical-frame allocation for the kernel. Physical memory is
//! carved into independent [`ContFramePool`]s (kernel pool, process pool, ...)
//! that all live in one process-wide [`FramePools`] registry.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                FramePools (registry)                │
//! │    • owner lookup by frame number                   │
//! │    • release without knowing the issuing pool       │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ PoolId
//! ┌─────────────────▼───────────────────────────────────┐
//! │               ContFramePool                         │
//! │    • first-fit contiguous runs                      │
//! │    • exact free-frame counter                       │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │       StateBitmap (one frame, 2 bits per frame)     │
//! │    00 Free · 01 Used · 10 HeadOfSequence            │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! A run handed out by [`ContFramePool::get_frames`] starts with a
//! `HeadOfSequence` frame followed by `Used` frames. The length of a run is
//! never stored: [`FramePools::release_frames`] walks forward from the head
//! until it meets a frame that is not `Used`.
//!
//! ## Bitmap Placement
//!
//! The bitmap of a pool occupies exactly one frame, which bounds a pool to
//! `4 * 4096 = 16384` frames (64 MiB). It either lives in the pool's own first
//! frame ([`InfoFrame::Embedded`]) or in a frame obtained elsewhere, typically
//! from the kernel pool ([`InfoFrame::External`]). Use
//! [`needed_info_frames`] to size the latter.
//!
//! ## Physical Memory Access
//!
//! Bitmaps are reached through a [`PhysMapper`]. Before paging is enabled (and
//! for the identity-mapped first 4 MiB afterwards) that is the
//! [`IdentityPhysMapper`]. With the `hosted` feature, [`RamPhysMapper`]
//! simulates physical memory on the heap.
//!
//! ## Example
//!
//! ```
//! use kernel_alloc::{ContFramePool, FramePools, InfoFrame, RamPhysMapper};
//! use kernel_memory_addresses::FrameNumber;
//!
//! let ram = RamPhysMapper::new(2048);
//! let pool = unsafe {
//!     ContFramePool::new(&ram, FrameNumber::new(1024), 1024, InfoFrame::Embedded)
//! }
//! .unwrap();
//!
//! let mut pools = FramePools::new();
//! let id = pools.register(pool).unwrap();
//! let head = pools.get_frames(id, 10).unwrap();
//! assert_eq!(head, FrameNumber::new(1025));
//! assert_eq!(pools.release_frames(head), Ok(10));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "hosted"))]
extern crate alloc;

mod cont_frame_pool;
mod frame_pools;
mod frame_state;
pub mod phys_mapper;

pub use cont_frame_pool::{
    ContFramePool, FrameAllocError, FramePoolError, InfoFrame, needed_info_frames,
};
pub use frame_pools::{FramePools, FrameReleaseError, PoolId, RegisterPoolError};
pub use frame_state::{FrameState, StateBitmap};
pub use phys_mapper::{IdentityPhysMapper, PhysMapper};

#[cfg(any(test, feature = "hosted"))]
pub use phys_mapper::RamPhysMapper;
