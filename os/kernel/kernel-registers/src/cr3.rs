use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;
use kernel_memory_addresses::{FrameNumber, PhysicalAddress};

/// CR3: Page-Directory Base Register (32-bit, non-PAE).
///
/// Holds the physical frame of the page directory and cache-control flags
/// for directory walks.
#[bitfield(u32)]
pub struct Cr3 {
    /// Bits 0–2: Reserved (must be 0).
    #[bits(3)]
    pub reserved0: u8,

    /// Bit 3: PWT: Page-level Write-Through for the directory.
    pub pwt: bool,

    /// Bit 4: PCD: Page-level Cache Disable for the directory.
    pub pcd: bool,

    /// Bits 5–11: Reserved (must be 0 when written).
    #[bits(7)]
    pub reserved1: u8,

    /// Bits 12–31: page directory frame number.
    ///
    /// `directory_phys = directory_frame << 12`.
    #[bits(20)]
    directory_frame: u32,
}

impl Cr3 {
    /// Create a `Cr3` value pointing at the directory stored in `frame`.
    #[must_use]
    pub fn from_directory(frame: FrameNumber) -> Self {
        debug_assert!(frame.as_u32() < (1 << 20), "frame beyond 4 GiB");
        Self::new().with_directory_frame(frame.as_u32())
    }

    #[must_use]
    pub fn directory(&self) -> FrameNumber {
        FrameNumber::new(self.directory_frame())
    }

    /// Return the full physical address of the page directory.
    #[must_use]
    pub fn directory_phys(&self) -> PhysicalAddress {
        self.directory().base()
    }
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl LoadRegisterUnsafe for Cr3 {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn load_unsafe() -> Self {
        let cr3: usize;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3 as u32)
    }
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits() as usize;
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_roundtrip() {
        let cr3 = Cr3::from_directory(FrameNumber::new(0x401));
        assert_eq!(cr3.into_bits(), 0x0040_1000);
        assert_eq!(cr3.directory(), FrameNumber::new(0x401));
        assert_eq!(cr3.directory_phys().as_u32(), 0x0040_1000);
    }
}
