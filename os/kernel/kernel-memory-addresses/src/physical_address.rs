use crate::{FRAME_SHIFT, FRAME_SIZE, FrameNumber};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Physical memory address.
///
/// Carries intent and prevents accidental VA↔PA mix-ups. Use
/// [`PhysicalAddress::frame`] and [`PhysicalAddress::frame_offset`] to split it
/// into the containing frame and the in-frame byte offset.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u32);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

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

    /// The frame containing this address.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> FrameNumber {
        FrameNumber::new(self.0 >> FRAME_SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn frame_offset(self) -> u32 {
        self.0 & (FRAME_SIZE - 1)
    }

    #[inline]
    #[must_use]
    pub const fn is_frame_aligned(self) -> bool {
        self.frame_offset() == 0
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:08X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for PhysicalAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl From<FrameNumber> for PhysicalAddress {
    #[inline]
    fn from(value: FrameNumber) -> Self {
        value.base()
    }
}

impl Add<u32> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u32> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}
