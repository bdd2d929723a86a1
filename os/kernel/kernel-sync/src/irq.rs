//! Interrupt masking.
//!
//! [`InterruptControl`] abstracts the interrupt flag so that the scheduler
//! can bracket its critical sections on bare metal ([`X86Interrupts`]) and in
//! hosted builds ([`SoftInterrupts`]) alike.

use crate::{SpinLock, SpinLockGuard};
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Query and toggle the maskable-interrupt flag.
pub trait InterruptControl {
    /// Whether maskable interrupts are currently delivered.
    fn enabled(&self) -> bool;

    fn disable(&self);

    fn enable(&self);
}

impl<T: InterruptControl + ?Sized> InterruptControl for &T {
    #[inline]
    fn enabled(&self) -> bool {
        (**self).enabled()
    }

    #[inline]
    fn disable(&self) {
        (**self).disable();
    }

    #[inline]
    fn enable(&self) {
        (**self).enable();
    }
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// `IrqGuard::new()` snapshots the interrupt flag. If interrupts were enabled,
/// it disables them. On drop, it re-enables them **only** if they were
/// previously enabled, so guards nest.
///
/// # Examples
///
/// ```
/// use kernel_sync::{InterruptControl, IrqGuard, SoftInterrupts};
///
/// let irq = SoftInterrupts::new(true);
/// {
///     let _g = IrqGuard::new(&irq);
///     assert!(!irq.enabled());
/// }
/// assert!(irq.enabled());
/// ```
pub struct IrqGuard<'a, I: InterruptControl + ?Sized> {
    ctl: &'a I,
    /// Whether interrupts were enabled when the guard was created.
    were_enabled: bool,
}

impl<'a, I: InterruptControl + ?Sized> IrqGuard<'a, I> {
    #[inline]
    #[must_use]
    pub fn new(ctl: &'a I) -> Self {
        let were_enabled = ctl.enabled();
        if were_enabled {
            ctl.disable();
        }
        Self { ctl, were_enabled }
    }

    #[inline]
    #[must_use]
    pub const fn were_enabled(&self) -> bool {
        self.were_enabled
    }
}

impl<I: InterruptControl + ?Sized> Drop for IrqGuard<'_, I> {
    fn drop(&mut self) {
        if self.were_enabled {
            self.ctl.enable();
        }
    }
}

/// A spin lock guard that also keeps interrupts disabled while held.
///
/// The lock is released before interrupts are restored.
pub struct IrqSpinLockGuard<'a, T, I: InterruptControl + ?Sized> {
    guard: SpinLockGuard<'a, T>,
    _irq: IrqGuard<'a, I>,
}

impl<T> SpinLock<T> {
    /// Disables interrupts through `ctl`, then acquires the lock.
    #[inline]
    pub fn lock_irq<'a, I: InterruptControl + ?Sized>(
        &'a self,
        ctl: &'a I,
    ) -> IrqSpinLockGuard<'a, T, I> {
        let irq = IrqGuard::new(ctl);
        let guard = self.lock();
        IrqSpinLockGuard { guard, _irq: irq }
    }
}

impl<T, I: InterruptControl + ?Sized> Deref for IrqSpinLockGuard<'_, T, I> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, I: InterruptControl + ?Sized> DerefMut for IrqSpinLockGuard<'_, T, I> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// An interrupt flag kept in memory, for hosted builds.
#[derive(Debug)]
pub struct SoftInterrupts {
    enabled: AtomicBool,
    disables: AtomicUsize,
}

impl SoftInterrupts {
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            disables: AtomicUsize::new(0),
        }
    }

    /// How many times interrupts went from enabled to disabled.
    pub fn disable_count(&self) -> usize {
        self.disables.load(Ordering::Acquire)
    }
}

impl Default for SoftInterrupts {
    fn default() -> Self {
        Self::new(true)
    }
}

impl InterruptControl for SoftInterrupts {
    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn disable(&self) {
        if self.enabled.swap(false, Ordering::AcqRel) {
            self.disables.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }
}

/// The interrupt flag of the executing CPU (`IF`, bit 9 of `EFLAGS`).
///
/// # Platform / Privilege
///
/// Uses `cli/sti` and `pushf/pop`; requires a privileged context.
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
#[derive(Debug, Clone, Copy)]
pub struct X86Interrupts {
    _private: (),
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl X86Interrupts {
    /// # Safety
    /// Must only be constructed in code where `cli`/`sti` are permitted.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }

    /// Returns the current flags register (via `pushf/pop`).
    #[inline]
    #[must_use]
    pub fn flags(&self) -> usize {
        let r: usize;
        #[cfg(target_arch = "x86")]
        unsafe {
            core::arch::asm!("pushfd; pop {}", out(reg) r, options(preserves_flags));
        }
        #[cfg(target_arch = "x86_64")]
        unsafe {
            core::arch::asm!("pushfq; pop {}", out(reg) r, options(preserves_flags));
        }
        r
    }
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl InterruptControl for X86Interrupts {
    #[inline]
    fn enabled(&self) -> bool {
        self.flags() & (1 << 9) != 0
    }

    #[inline]
    fn disable(&self) {
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    fn enable(&self) {
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }
}
