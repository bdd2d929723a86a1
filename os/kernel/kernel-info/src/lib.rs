//! # Kernel Configuration
//!
//! Compile-time layout and sizing constants shared by the frame allocator,
//! the paging code, the scheduler and the boot wiring. Everything is `const`
//! and validated with compile-time assertions so that an inconsistent layout
//! fails the build instead of corrupting memory at boot.
//!
//! ## Physical Memory Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  Low memory, kernel image       │  identity mapped
//! 0x0020_0000 ├─────────────────────────────────┤  KERNEL_POOL_START_FRAME
//!             │  Kernel frame pool (2 MiB)      │  identity mapped
//! 0x0040_0000 ├─────────────────────────────────┤  PROCESS_POOL_START_FRAME
//!             │  Process frame pool (28 MiB)    │
//! 0x00F0_0000 │  ├ memory hole (1 MiB)          │  marked inaccessible
//! 0x0100_0000 │  ┘                              │
//! 0x0200_0000 └─────────────────────────────────┘
//! ```
//!
//! ## Virtual Memory Layout
//!
//! ```text
//! 0x0000_0000  identity map of the first 4 MiB (directory entry 0)
//! 0x2000_0000  code pool (256 MiB)
//! 0x4000_0000  heap pool (256 MiB)
//! 0xFFC0_0000  page tables, reached through the recursive directory entry
//! 0xFFFF_F000  the page directory itself
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
pub mod sched;

/// Size of one disk block in bytes.
pub const DISK_BLOCK_SIZE: usize = 512;
