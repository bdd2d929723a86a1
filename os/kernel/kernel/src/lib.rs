//! # Kernel Memory Bring-up
//!
//! Wires the frame allocator and the paging code into the memory layout
//! described in [`kernel_info::memory`]:
//!
//! 1. the kernel frame pool keeps its bitmap in its own first frame;
//! 2. the process frame pool keeps its bitmap in frames taken from the
//!    kernel pool;
//! 3. the memory hole at 15 MiB is reserved so it is never handed out;
//! 4. a page table is built from kernel frames, loaded, and paging is
//!    switched on;
//! 5. the code and heap VM pools are created; their pages are backed from
//!    the process pool on first touch.
//!
//! [`MemorySystem`] performs these steps over any [`PhysMapper`](kernel_alloc::PhysMapper)
//! and [`ControlRegisters`](kernel_registers::ControlRegisters) so that they
//! run on bare metal and against simulated RAM alike. The bare-metal entry
//! points live in [`machine`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod boot;
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
pub mod machine;

pub use boot::{BootError, MemorySystem};
