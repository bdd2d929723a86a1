//! # Physical and Virtual Memory Address Types (32-bit)
//!
//! Strongly typed wrappers for the raw addresses used by the frame allocator
//! and the two-level paging code.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A byte address in physical memory. |
//! | [`VirtualAddress`] | A linear address, translated by the page directory. |
//! | [`FrameNumber`] | An absolute physical frame index (`address >> 12`). |
//!
//! All three are `#[repr(transparent)]` wrappers around `u32` so they can be
//! stored directly in page-table entries and region lists.
//!
//! ## Address Split
//!
//! With 4 KiB pages and 1024-entry tables a virtual address decomposes as
//!
//! ```text
//!  31          22 21          12 11           0
//! ┌──────────────┬──────────────┬──────────────┐
//! │ directory    │ table        │ offset       │
//! └──────────────┴──────────────┴──────────────┘
//! ```
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x2040_3123);
//! assert_eq!(va.directory_index(), 0x81);
//! assert_eq!(va.table_index(), 0x3);
//! assert_eq!(va.page_offset(), 0x123);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

mod frame_number;
mod physical_address;
mod virtual_address;

pub use frame_number::FrameNumber;
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

/// Size of a physical frame and of a virtual page in bytes.
pub const FRAME_SIZE: u32 = 4096;

/// `log2(FRAME_SIZE)`.
pub const FRAME_SHIFT: u32 = 12;

/// Number of 32-bit entries in one page directory or page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Bytes covered by a single page table (one directory entry).
pub const TABLE_SPAN: u32 = FRAME_SIZE * 1024;

const _: () = {
    assert!(1 << FRAME_SHIFT == FRAME_SIZE);
    assert!(TABLE_SPAN == 4 * 1024 * 1024);
    assert!(ENTRIES_PER_TABLE == (FRAME_SIZE / 4) as usize);
};

/// Round `value` down to a multiple of `align` (a power of two).
#[inline]
#[must_use]
pub const fn align_down(value: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

/// Round `value` up to a multiple of `align` (a power of two).
///
/// Wraps on overflow; callers check ranges before rounding.
#[inline]
#[must_use]
pub const fn align_up(value: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    value.wrapping_add(align - 1) & !(align - 1)
}

/// Number of whole pages needed to hold `bytes`.
#[inline]
#[must_use]
pub const fn pages_for(bytes: u32) -> u32 {
    bytes.div_ceil(FRAME_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_down(0x1FFF, FRAME_SIZE), 0x1000);
        assert_eq!(align_up(0x1001, FRAME_SIZE), 0x2000);
        assert_eq!(align_up(0x2000, FRAME_SIZE), 0x2000);
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(pages_for(0), 0);
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(4096), 1);
        assert_eq!(pages_for(4097), 2);
    }

    #[test]
    fn frame_and_address_roundtrip() {
        let pa = PhysicalAddress::new(0x0040_2123);
        let frame = pa.frame();
        assert_eq!(frame.as_u32(), 0x402);
        assert_eq!(frame.base().as_u32(), 0x0040_2000);
        assert_eq!(pa.frame_offset(), 0x123);
    }

    #[test]
    fn virtual_split_covers_all_bits() {
        let va = VirtualAddress::new(0xFFC0_1ABC);
        assert_eq!(va.directory_index(), 0x3FF);
        assert_eq!(va.table_index(), 0x001);
        assert_eq!(va.page_offset(), 0xABC);
        assert_eq!(va.page_base().as_u32(), 0xFFC0_1000);
    }
}
