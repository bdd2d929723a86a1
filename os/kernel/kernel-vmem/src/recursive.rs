//! Address arithmetic of the recursive directory slot.
//!
//! Pure functions of the virtual address; they hold for whichever directory
//! is loaded, as long as its last entry maps the directory itself.

use kernel_memory_addresses::{ENTRIES_PER_TABLE, VirtualAddress};

/// Directory slot that points back at the directory.
pub const RECURSIVE_SLOT: usize = ENTRIES_PER_TABLE - 1;

/// Virtual base of the 4 MiB window holding all page tables.
pub const TABLES_WINDOW: u32 = 0xFFC0_0000;

/// Virtual address of the page directory.
pub const DIRECTORY_WINDOW: u32 = 0xFFFF_F000;

/// Virtual address of the directory entry covering `va`.
///
/// ```
/// # use kernel_vmem::pde_address;
/// # use kernel_memory_addresses::VirtualAddress;
/// assert_eq!(pde_address(VirtualAddress::new(0x4000_0000)).as_u32(), 0xFFFF_F400);
/// ```
#[inline]
#[must_use]
pub const fn pde_address(va: VirtualAddress) -> VirtualAddress {
    VirtualAddress::new(DIRECTORY_WINDOW + ((va.as_u32() >> 22) << 2))
}

/// Virtual address of the table entry covering `va`.
///
/// ```
/// # use kernel_vmem::pte_address;
/// # use kernel_memory_addresses::VirtualAddress;
/// assert_eq!(pte_address(VirtualAddress::new(0x4000_3000)).as_u32(), 0xFFD0_000C);
/// ```
#[inline]
#[must_use]
pub const fn pte_address(va: VirtualAddress) -> VirtualAddress {
    VirtualAddress::new(TABLES_WINDOW + ((va.as_u32() >> 12) << 2))
}

/// Virtual address of the page table installed in directory slot `slot`.
#[inline]
#[must_use]
pub const fn table_window(slot: usize) -> VirtualAddress {
    debug_assert!(slot < ENTRIES_PER_TABLE);
    VirtualAddress::new(TABLES_WINDOW + ((slot as u32) << 12))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_is_the_table_of_the_recursive_slot() {
        assert_eq!(table_window(RECURSIVE_SLOT).as_u32(), DIRECTORY_WINDOW);
    }

    #[test]
    fn pte_address_lies_in_the_table_window_of_its_slot() {
        let va = VirtualAddress::new(0x2040_3123);
        let pte = pte_address(va);
        assert_eq!(
            pte.page_base(),
            table_window(va.directory_index()),
            "entry must live in its own table"
        );
        assert_eq!(pte.page_offset() as usize, va.table_index() * 4);
    }

    #[test]
    fn pde_address_indexes_the_directory() {
        for va in [0u32, 0x003F_FFFF, 0x0040_0000, 0xBFFF_F000, 0xFFFF_FFFF] {
            let va = VirtualAddress::new(va);
            let pde = pde_address(va);
            assert_eq!(pde.page_base().as_u32(), DIRECTORY_WINDOW);
            assert_eq!(pde.page_offset() as usize, va.directory_index() * 4);
        }
    }

    #[test]
    fn self_map_round_trip() {
        // The entry describing the directory window is itself inside the directory.
        let dir = VirtualAddress::new(DIRECTORY_WINDOW);
        assert_eq!(pte_address(dir).as_u32(), DIRECTORY_WINDOW + (RECURSIVE_SLOT as u32) * 4);
    }
}
