//! # QEMU Debug Console Output
//!
//! Kernel log output for QEMU's debug console (`-debugcon`), which captures
//! every byte written to I/O port `0x402`.
//!
//! ## Output Mechanism
//! ```text
//! log::info!(..) / qemu_trace!(..)
//!     ↓
//! QemuSink (fmt::Write)
//!     ↓
//! PortIo::outb(0x402, byte)
//!     ↓
//! QEMU debug console → host terminal or file
//! ```
//!
//! ## Components
//!
//! * [`QemuLogger`]: a `log::Log` implementation with a level threshold,
//!   formatting each record as `"[LEVEL] target: message\n"`.
//! * [`qemu_trace!`]: direct formatted output bypassing the `log` facade.
//! * [`qemu_fmt::QemuSink`]: the allocation-free `fmt::Write` adapter both
//!   build on.
//!
//! ## Feature `enabled` (default)
//!
//! Without it every write becomes a no-op, so release images can keep their
//! logging calls while touching no port.
//!
//! ## Host-Side Configuration
//! ```bash
//! qemu-system-i386 -kernel kernel.bin -debugcon stdio
//! qemu-system-i386 -kernel kernel.bin -debugcon file:debug.log
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

mod logger;

pub use logger::QemuLogger;

#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};
    use kernel_ports::PortIo;

    /// The port number for QEMU's debug port.
    pub const QEMU_DEBUG_PORT: u16 = 0x402;

    /// `fmt::Write` adapter emitting bytes to the debug port.
    pub struct QemuSink<P: PortIo> {
        ports: P,
    }

    impl<P: PortIo> QemuSink<P> {
        pub const fn new(ports: P) -> Self {
            Self { ports }
        }
    }

    impl<P: PortIo> Write for QemuSink<P> {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            if cfg!(feature = "enabled") {
                for b in s.bytes() {
                    self.ports.outb(QEMU_DEBUG_PORT, b);
                }
            }
            Ok(())
        }
    }

    #[doc(hidden)]
    #[inline]
    pub fn qemu_write<P: PortIo>(ports: P, args: fmt::Arguments) {
        // Ignore errors; this is best-effort debug output.
        let _ = fmt::write(&mut QemuSink::new(ports), args);
    }
}

/// Formats directly to the debug port through the given [`PortIo`](kernel_ports::PortIo).
///
/// ```
/// # use kernel_ports::PortIo;
/// # struct Null;
/// # impl PortIo for Null {
/// #     fn outb(&self, _: u16, _: u8) {}
/// #     fn inb(&self, _: u16) -> u8 { 0 }
/// #     fn outw(&self, _: u16, _: u16) {}
/// #     fn inw(&self, _: u16) -> u16 { 0 }
/// # }
/// kernel_qemu::qemu_trace!(&Null, "fault at {:#010x}\n", 0x4000_1000_u32);
/// ```
#[macro_export]
macro_rules! qemu_trace {
    ($ports:expr, $($arg:tt)*) => {{
        // No allocation: `format_args!` builds a lightweight `Arguments`.
        $crate::qemu_fmt::qemu_write($ports, core::format_args!($($arg)*));
    }};
}
