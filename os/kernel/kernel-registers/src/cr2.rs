use crate::LoadRegisterUnsafe;
use bitfield_struct::bitfield;
use kernel_memory_addresses::VirtualAddress;

/// CR2: Page-Fault Linear Address.
///
/// Latched by the CPU when a page fault is raised.
#[bitfield(u32)]
pub struct Cr2 {
    /// Bits 0–31: the faulting linear address.
    #[bits(32)]
    linear_address: u32,
}

impl Cr2 {
    #[must_use]
    pub fn from_address(address: VirtualAddress) -> Self {
        Self::new().with_linear_address(address.as_u32())
    }

    #[must_use]
    pub fn faulting_address(&self) -> VirtualAddress {
        VirtualAddress::new(self.linear_address())
    }
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl LoadRegisterUnsafe for Cr2 {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn load_unsafe() -> Self {
        let cr2: usize;
        unsafe {
            core::arch::asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr2 as u32)
    }
}
