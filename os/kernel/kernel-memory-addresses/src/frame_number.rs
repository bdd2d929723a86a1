use crate::{FRAME_SHIFT, PhysicalAddress};
use core::fmt;
use core::ops::Add;

/// Absolute physical frame number.
///
/// Frame `n` spans the physical bytes `[n * 4096, (n + 1) * 4096)`. Frame
/// numbers are what page-table entries store in their upper 20 bits and what
/// the frame pools hand out.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FrameNumber(u32);

impl FrameNumber {
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

    /// Physical address of the first byte of the frame.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 << FRAME_SHIFT)
    }

    /// Distance in frames from `origin`, or `None` if `self` lies below it.
    #[inline]
    #[must_use]
    pub const fn offset_from(self, origin: Self) -> Option<u32> {
        self.0.checked_sub(origin.0)
    }
}

impl fmt::Debug for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", self.0)
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u32> for FrameNumber {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}
