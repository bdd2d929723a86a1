use crate::{FRAME_SHIFT, FRAME_SIZE};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Linear (virtual) address.
///
/// ### Semantics
/// - [`directory_index`](Self::directory_index): bits 22–31, selects the
///   page-directory entry.
/// - [`table_index`](Self::table_index): bits 12–21, selects the page-table
///   entry.
/// - [`page_offset`](Self::page_offset): bits 0–11, byte within the page.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u32);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn directory_index(self) -> usize {
        (self.0 >> 22) as usize
    }

    #[inline]
    #[must_use]
    pub const fn table_index(self) -> usize {
        ((self.0 >> FRAME_SHIFT) & 0x3FF) as usize
    }

    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u32 {
        self.0 & (FRAME_SIZE - 1)
    }

    /// Page number (`address >> 12`).
    #[inline]
    #[must_use]
    pub const fn page_number(self) -> u32 {
        self.0 >> FRAME_SHIFT
    }

    /// Base address of the containing page.
    #[inline]
    #[must_use]
    pub const fn page_base(self) -> Self {
        Self(self.0 & !(FRAME_SIZE - 1))
    }

    /// Builds the address of page `page_number`.
    #[inline]
    #[must_use]
    pub const fn from_page_number(page_number: u32) -> Self {
        Self(page_number << FRAME_SHIFT)
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:08X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for VirtualAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl Add<u32> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u32> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}
