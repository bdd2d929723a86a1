use bitfield_struct::bitfield;
use kernel_alloc::FrameAllocError;
use kernel_memory_addresses::VirtualAddress;

/// Page-fault error code pushed by the CPU (32-bit paging).
///
/// Reference: Intel SDM Vol. 3A, §6.15 "Page-Fault Exception (#PF)".
#[bitfield(u32)]
pub struct FaultCode {
    /// 0 = non-present page.
    /// 1 = protection violation (page present but access disallowed).
    pub present: bool, // bit 0

    /// 0 = read, 1 = write.
    pub write: bool, // bit 1

    /// 0 = supervisor, 1 = user mode.
    pub user: bool, // bit 2

    /// Reserved bit set in a paging structure.
    pub reserved_bit: bool, // bit 3

    /// Instruction fetch.
    pub instruction_fetch: bool, // bit 4

    #[bits(27)]
    __: u32,
}

impl FaultCode {
    #[must_use]
    pub const fn explain(&self) -> &'static str {
        if !self.present() {
            "Non-present page"
        } else if self.instruction_fetch() {
            if self.user() {
                "User-mode instruction fetch on protected page"
            } else {
                "Kernel instruction fetch on protected page"
            }
        } else if self.write() {
            "Write access to protected page"
        } else {
            "Read access to protected page"
        }
    }
}

/// A page fault the kernel cannot resolve.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum PageFaultError {
    /// No registered pool vouches for the address, or the page was present.
    #[error("protection violation at {address}")]
    ProtectionViolation { address: VirtualAddress },
    #[error("no frame available to back {address}")]
    OutOfFrames {
        address: VirtualAddress,
        #[source]
        source: FrameAllocError,
    },
    #[error("the page table is not the loaded one")]
    NotLoaded,
    #[error("paging is not enabled")]
    PagingDisabled,
    /// The recursive window did not resolve.
    #[error("paging structure at {0} is not mapped")]
    Unmapped(VirtualAddress),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_write_to_absent_page() {
        let code = FaultCode::from_bits(0b010);
        assert!(!code.present());
        assert!(code.write());
        assert_eq!(code.explain(), "Non-present page");
    }

    #[test]
    fn decode_protection_violations() {
        assert_eq!(
            FaultCode::from_bits(0b0_0011).explain(),
            "Write access to protected page"
        );
        assert_eq!(
            FaultCode::from_bits(0b1_0101).explain(),
            "User-mode instruction fetch on protected page"
        );
        assert_eq!(
            FaultCode::from_bits(0b0_0001).explain(),
            "Read access to protected page"
        );
    }
}
