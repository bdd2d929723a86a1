//! # Typed IA-32 Control Registers
//!
//! `CR0`, `CR2` and `CR3` as used by non-PAE two-level paging, plus the
//! [`ControlRegisters`] seam through which the paging code reaches them.
//!
//! The bare-metal implementation [`X86ControlRegisters`] is only compiled with
//! the `asm` feature on x86 targets. [`SoftRegisters`] keeps the same state in
//! atomics so that hosted builds and tests can drive the paging code.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod cr0;
mod cr2;
mod cr3;
mod soft;

pub use cr0::Cr0;
pub use cr2::Cr2;
pub use cr3::Cr3;
pub use soft::SoftRegisters;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn store_unsafe(self);
}

/// Access to the control registers that govern paging.
///
/// Reads are side-effect free. Writes change how every subsequent memory
/// access is translated and are therefore `unsafe`.
pub trait ControlRegisters {
    fn read_cr0(&self) -> Cr0;

    /// # Safety
    /// Enabling paging requires `CR3` to reference a directory that maps the
    /// currently executing code and stack.
    unsafe fn write_cr0(&self, value: Cr0);

    /// Linear address of the most recent page fault.
    fn read_cr2(&self) -> Cr2;

    fn read_cr3(&self) -> Cr3;

    /// Loads a new translation root and flushes the non-global TLB entries.
    ///
    /// # Safety
    /// The directory referenced by `value` must stay valid while loaded and
    /// must map the currently executing code and stack if paging is enabled.
    unsafe fn write_cr3(&self, value: Cr3);
}

impl<T: ControlRegisters + ?Sized> ControlRegisters for &T {
    #[inline]
    fn read_cr0(&self) -> Cr0 {
        (**self).read_cr0()
    }

    #[inline]
    unsafe fn write_cr0(&self, value: Cr0) {
        unsafe { (**self).write_cr0(value) }
    }

    #[inline]
    fn read_cr2(&self) -> Cr2 {
        (**self).read_cr2()
    }

    #[inline]
    fn read_cr3(&self) -> Cr3 {
        (**self).read_cr3()
    }

    #[inline]
    unsafe fn write_cr3(&self, value: Cr3) {
        unsafe { (**self).write_cr3(value) }
    }
}

/// The physical control registers of the executing CPU.
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
#[derive(Debug, Clone, Copy)]
pub struct X86ControlRegisters {
    _private: (),
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl X86ControlRegisters {
    /// # Safety
    /// Must only be constructed in code running at CPL 0.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl ControlRegisters for X86ControlRegisters {
    #[inline]
    fn read_cr0(&self) -> Cr0 {
        // SAFETY: constructing `Self` asserted CPL 0.
        unsafe { Cr0::load_unsafe() }
    }

    #[inline]
    unsafe fn write_cr0(&self, value: Cr0) {
        unsafe { value.store_unsafe() }
    }

    #[inline]
    fn read_cr2(&self) -> Cr2 {
        // SAFETY: constructing `Self` asserted CPL 0.
        unsafe { Cr2::load_unsafe() }
    }

    #[inline]
    fn read_cr3(&self) -> Cr3 {
        // SAFETY: constructing `Self` asserted CPL 0.
        unsafe { Cr3::load_unsafe() }
    }

    #[inline]
    unsafe fn write_cr3(&self, value: Cr3) {
        unsafe { value.store_unsafe() }
    }
}
