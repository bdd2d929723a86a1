//! # Kernel synchronization primitives
//!
//! The kernel runs on a single core and transfers control only at explicit
//! yield points. The one source of re-entrancy is a hardware interrupt, so
//! ready-queue and disk-queue mutations are bracketed by [`IrqGuard`]s. The
//! spin lock exists for the boot-time globals and for hosted tests, where
//! several OS threads stand in for kernel threads.
//!
//! On bare metal the interrupt flag is driven through `X86Interrupts` (behind
//! the `asm` feature); the kernel's memory system locks with it, and the
//! thread layer hands the same value to its scheduler and disks. Hosted
//! builds use [`SoftInterrupts`] instead.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;
mod sync_once_cell;

pub use irq::{InterruptControl, IrqGuard, IrqSpinLockGuard, SoftInterrupts};
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
pub use irq::X86Interrupts;
