use bitfield_struct::bitfield;
use kernel_memory_addresses::{ENTRIES_PER_TABLE, FrameNumber};

/// A 32-bit page-directory or page-table entry (non-PAE).
///
/// ### Bit layout
///
/// | Bits  | Name / Mnemonic | Meaning |
/// |-------|-----------------|---------|
/// | 0     | `P`             | Present |
/// | 1     | `RW`            | Writable |
/// | 2     | `US`            | User-mode accessible |
/// | 3     | `PWT`           | Write-through caching |
/// | 4     | `PCD`           | Cache disable |
/// | 5     | `A`             | Accessed |
/// | 6     | `D`             | Dirty (PTE only) |
/// | 7     | `PS` / `PAT`    | 4 MiB page in a PDE; PAT in a PTE |
/// | 8     | `G`             | Global (PTE only) |
/// | 9–11  | OS available    | Ignored by the MMU |
/// | 12–31 | frame           | Physical frame number |
///
/// The kernel only ever writes two shapes: "not present, writable,
/// supervisor" (`0x2`) for empty slots and "present, writable, supervisor"
/// (`frame << 12 | 0x3`) for installed tables and pages.
///
/// ```
/// # use kernel_vmem::PageEntry;
/// # use kernel_memory_addresses::FrameNumber;
/// assert_eq!(PageEntry::vacant().into_bits(), 0x2);
/// assert_eq!(PageEntry::mapping(FrameNumber::new(0x401)).into_bits(), 0x0040_1003);
/// ```
#[bitfield(u32)]
pub struct PageEntry {
    /// Present (P, bit 0).
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2). Clear restricts to supervisor.
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU on first access.
    pub accessed: bool,

    /// Dirty (D, bit 6). Set by the CPU on first write through a PTE.
    pub dirty: bool,

    /// Page Size (PS, bit 7). Never set by this kernel.
    pub large_page: bool,

    /// Global (G, bit 8).
    pub global: bool,

    /// Bits 9–11, available to the OS.
    #[bits(3)]
    pub os_available: u8,

    /// Bits 12–31, physical frame number.
    #[bits(20)]
    frame_bits: u32,
}

impl PageEntry {
    /// Not present, writable, supervisor.
    #[inline]
    #[must_use]
    pub const fn vacant() -> Self {
        Self::new().with_writable(true)
    }

    /// Present, writable, supervisor, pointing at `frame`.
    #[inline]
    #[must_use]
    pub const fn mapping(frame: FrameNumber) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_frame_bits(frame.as_u32())
    }

    #[inline]
    #[must_use]
    pub const fn frame(&self) -> FrameNumber {
        FrameNumber::new(self.frame_bits())
    }
}

/// One paging structure: a page directory or a page table.
#[repr(C, align(4096))]
pub struct EntryTable {
    entries: [PageEntry; ENTRIES_PER_TABLE],
}

impl EntryTable {
    /// Sets every entry to `entry`.
    #[inline]
    pub fn fill(&mut self, entry: PageEntry) {
        self.entries.fill(entry);
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, index: usize) -> PageEntry {
        self.entries[index]
    }

    #[inline]
    pub const fn entry_mut(&mut self, index: usize) -> &mut PageEntry {
        &mut self.entries[index]
    }

    #[inline]
    pub const fn set(&mut self, index: usize, entry: PageEntry) {
        self.entries[index] = entry;
    }

    pub fn iter(&self) -> impl Iterator<Item = PageEntry> + '_ {
        self.entries.iter().copied()
    }
}

const _: () = {
    assert!(size_of::<PageEntry>() == 4);
    assert!(size_of::<EntryTable>() == 4096);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_sets_present_writable_supervisor() {
        let e = PageEntry::mapping(FrameNumber::new(0xABCDE));
        assert!(e.present());
        assert!(e.writable());
        assert!(!e.user_access());
        assert_eq!(e.frame(), FrameNumber::new(0xABCDE));
        assert_eq!(e.into_bits(), 0xABCD_E003);
    }

    #[test]
    fn vacant_is_writable_but_absent() {
        let e = PageEntry::vacant();
        assert!(!e.present());
        assert!(e.writable());
        assert_eq!(e.frame(), FrameNumber::new(0));
    }

    #[test]
    fn raw_bits_decode() {
        let e = PageEntry::from_bits(0x0012_3067);
        assert!(e.present() && e.writable() && e.user_access());
        assert!(e.accessed() && e.dirty());
        assert_eq!(e.frame(), FrameNumber::new(0x123));
    }
}
