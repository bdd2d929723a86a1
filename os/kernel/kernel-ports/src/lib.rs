//! # x86 I/O Port Access
//!
//! The legacy 16-bit I/O port space is how the kernel talks to the primary
//! IDE controller (`0x1F0`–`0x1F7`) and to the QEMU debug console (`0x402`).
//!
//! Drivers never execute `in`/`out` themselves. They are generic over
//! [`PortIo`], which [`X86Ports`] implements with inline assembly and which
//! hosted tests implement with a simulated device.
//!
//! ## Safety Model
//!
//! Port access is privileged and can wedge hardware. The raw [`outb`],
//! [`inb`], [`outw`] and [`inw`] helpers are therefore `unsafe`. The
//! obligation moves to [`X86Ports::new`]: whoever constructs the port handle
//! vouches for running at CPL 0 and for handing each device's ports to exactly
//! one driver.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

/// Byte and word access to the I/O port space.
pub trait PortIo {
    fn outb(&self, port: u16, value: u8);

    fn inb(&self, port: u16) -> u8;

    fn outw(&self, port: u16, value: u16);

    fn inw(&self, port: u16) -> u16;
}

impl<T: PortIo + ?Sized> PortIo for &T {
    #[inline]
    fn outb(&self, port: u16, value: u8) {
        (**self).outb(port, value);
    }

    #[inline]
    fn inb(&self, port: u16) -> u8 {
        (**self).inb(port)
    }

    #[inline]
    fn outw(&self, port: u16, value: u16) {
        (**self).outw(port, value);
    }

    #[inline]
    fn inw(&self, port: u16) -> u16 {
        (**self).inw(port)
    }
}

/// The I/O port space of the executing CPU.
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
#[derive(Debug, Clone, Copy)]
pub struct X86Ports {
    _private: (),
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl X86Ports {
    /// # Safety
    /// The caller upholds the requirements listed on [`outb`] and [`inb`] for
    /// every port accessed through the returned handle.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl PortIo for X86Ports {
    #[inline]
    fn outb(&self, port: u16, value: u8) {
        // SAFETY: obligations accepted by `X86Ports::new`.
        unsafe { outb(port, value) }
    }

    #[inline]
    fn inb(&self, port: u16) -> u8 {
        // SAFETY: obligations accepted by `X86Ports::new`.
        unsafe { inb(port) }
    }

    #[inline]
    fn outw(&self, port: u16, value: u16) {
        // SAFETY: obligations accepted by `X86Ports::new`.
        unsafe { outw(port, value) }
    }

    #[inline]
    fn inw(&self, port: u16) -> u16 {
        // SAFETY: obligations accepted by `X86Ports::new`.
        unsafe { inw(port) }
    }
}

/// Write one byte to an I/O port. Uses `out dx, al`.
///
/// # Safety
/// - **Privilege:** Execute at CPL0 **or** have I/O permission (IOPL/IO bitmap)
///   that allows access to `port`. Otherwise the CPU raises `#GP`.
/// - **Correct port:** `port` must belong to the intended device and be in a
///   valid state for this write.
/// - **Concurrency:** Coordinate with interrupt handlers that touch the same
///   device so register-level protocols aren't interleaved.
/// - **Ordering:** `out` is **not** a general memory fence.
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
#[inline]
pub unsafe fn outb(port: u16, val: u8) {
    unsafe {
        core::arch::asm!("out dx, al", in("dx") port, in("al") val, options(nomem, nostack, preserves_flags));
    }
}

/// Read one byte from an I/O port. Uses `in al, dx`.
///
/// # Safety
/// Same requirements as [`outb`]; reading a status register may also
/// acknowledge a pending device condition.
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
#[inline]
pub unsafe fn inb(port: u16) -> u8 {
    let mut v: u8;
    unsafe {
        core::arch::asm!("in al, dx", in("dx") port, out("al") v, options(nomem, nostack, preserves_flags));
    }
    v
}

/// Write one 16-bit word to an I/O port. Uses `out dx, ax`.
///
/// # Safety
/// Same requirements as [`outb`].
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
#[inline]
pub unsafe fn outw(port: u16, val: u16) {
    unsafe {
        core::arch::asm!("out dx, ax", in("dx") port, in("ax") val, options(nomem, nostack, preserves_flags));
    }
}

/// Read one 16-bit word from an I/O port. Uses `in ax, dx`.
///
/// # Safety
/// Same requirements as [`inb`]. Reading the ATA data port consumes the word.
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
#[inline]
pub unsafe fn inw(port: u16) -> u16 {
    let mut v: u16;
    unsafe {
        core::arch::asm!("in ax, dx", in("dx") port, out("ax") v, options(nomem, nostack, preserves_flags));
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        writes: RefCell<Vec<(u16, u16)>>,
    }

    impl PortIo for Recorder {
        fn outb(&self, port: u16, value: u8) {
            self.writes.borrow_mut().push((port, u16::from(value)));
        }

        fn inb(&self, _port: u16) -> u8 {
            0xA5
        }

        fn outw(&self, port: u16, value: u16) {
            self.writes.borrow_mut().push((port, value));
        }

        fn inw(&self, _port: u16) -> u16 {
            0xBEEF
        }
    }

    fn drive<P: PortIo>(ports: P) -> (u8, u16) {
        ports.outb(0x1F7, 0x20);
        ports.outw(0x1F0, 0x1234);
        (ports.inb(0x1F7), ports.inw(0x1F0))
    }

    #[test]
    fn references_forward_to_the_device() {
        let rec = Recorder::default();
        let (b, w) = drive(&rec);
        assert_eq!((b, w), (0xA5, 0xBEEF));
        assert_eq!(*rec.writes.borrow(), [(0x1F7, 0x20), (0x1F0, 0x1234)]);
    }
}
