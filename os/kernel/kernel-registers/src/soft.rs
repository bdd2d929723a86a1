//! Register file kept in memory, for hosted builds.

use crate::{ControlRegisters, Cr0, Cr2, Cr3};
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use kernel_memory_addresses::VirtualAddress;

/// A software stand-in for `CR0`/`CR2`/`CR3`.
///
/// Writes are recorded so that callers can observe translation reloads.
#[derive(Debug, Default)]
pub struct SoftRegisters {
    cr0: AtomicU32,
    cr2: AtomicU32,
    cr3: AtomicU32,
    cr3_writes: AtomicUsize,
}

impl SoftRegisters {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cr0: AtomicU32::new(0),
            cr2: AtomicU32::new(0),
            cr3: AtomicU32::new(0),
            cr3_writes: AtomicUsize::new(0),
        }
    }

    /// Latches `address` into `CR2` as the CPU would on a page fault.
    pub fn raise_page_fault(&self, address: VirtualAddress) {
        self.cr2.store(address.as_u32(), Ordering::Release);
    }

    /// Number of `CR3` loads since construction.
    pub fn cr3_writes(&self) -> usize {
        self.cr3_writes.load(Ordering::Acquire)
    }
}

impl ControlRegisters for SoftRegisters {
    fn read_cr0(&self) -> Cr0 {
        Cr0::from_bits(self.cr0.load(Ordering::Acquire))
    }

    unsafe fn write_cr0(&self, value: Cr0) {
        self.cr0.store(value.into_bits(), Ordering::Release);
    }

    fn read_cr2(&self) -> Cr2 {
        Cr2::from_bits(self.cr2.load(Ordering::Acquire))
    }

    fn read_cr3(&self) -> Cr3 {
        Cr3::from_bits(self.cr3.load(Ordering::Acquire))
    }

    unsafe fn write_cr3(&self, value: Cr3) {
        self.cr3.store(value.into_bits(), Ordering::Release);
        self.cr3_writes.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_cr3_reloads() {
        let regs = SoftRegisters::new();
        let cr3 = Cr3::from_bits(0x0040_0000);
        unsafe {
            regs.write_cr3(cr3);
            regs.write_cr3(cr3);
        }
        assert_eq!(regs.read_cr3().into_bits(), cr3.into_bits());
        assert_eq!(regs.cr3_writes(), 2);
    }

    #[test]
    fn fault_address_is_latched() {
        let regs = SoftRegisters::new();
        regs.raise_page_fault(VirtualAddress::new(0x4000_1234));
        assert_eq!(regs.read_cr2().faulting_address().as_u32(), 0x4000_1234);
    }
}
