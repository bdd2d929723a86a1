use kernel_memory_addresses::FRAME_SIZE;

/// Allocation state of one physical frame.
///
/// The discriminants are the 2-bit patterns stored in the [`StateBitmap`].
/// Pattern `0b11` is never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameState {
    Free = 0b00,
    Used = 0b01,
    HeadOfSequence = 0b10,
}

impl FrameState {
    const MASK: u8 = 0b11;

    #[inline]
    const fn from_bits(bits: u8) -> Self {
        match bits & Self::MASK {
            0b00 => Self::Free,
            0b10 => Self::HeadOfSequence,
            // 0b11 cannot be produced by `set`; read it as allocated.
            _ => Self::Used,
        }
    }
}

/// One frame of packed allocation state, four frames per byte.
///
/// Frame `i` lives in byte `i / 4` at bit offset `(i % 4) * 2`.
#[repr(C, align(4096))]
pub struct StateBitmap {
    bytes: [u8; FRAME_SIZE as usize],
}

impl StateBitmap {
    /// Frames described by one bitmap frame.
    pub const CAPACITY: u32 = FRAME_SIZE * 4;

    #[inline]
    const fn locate(index: u32) -> (usize, u32) {
        ((index / 4) as usize, (index % 4) * 2)
    }

    /// Marks every frame as [`FrameState::Free`].
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// # Panics
    /// If `index >= CAPACITY`.
    #[inline]
    #[must_use]
    pub fn get(&self, index: u32) -> FrameState {
        let (byte, shift) = Self::locate(index);
        let bits = (self.bytes[byte] >> shift) & FrameState::MASK;
        debug_assert_ne!(bits, FrameState::MASK, "invalid state pattern at frame {index}");
        FrameState::from_bits(bits)
    }

    /// # Panics
    /// If `index >= CAPACITY`.
    #[inline]
    pub fn set(&mut self, index: u32, state: FrameState) {
        let (byte, shift) = Self::locate(index);
        let cell = &mut self.bytes[byte];
        *cell = (*cell & !(FrameState::MASK << shift)) | ((state as u8) << shift);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeroed() -> Box<StateBitmap> {
        Box::new(StateBitmap {
            bytes: [0; FRAME_SIZE as usize],
        })
    }

    #[test]
    fn states_are_packed_two_bits_per_frame() {
        let mut bm = zeroed();
        bm.set(0, FrameState::HeadOfSequence);
        bm.set(1, FrameState::Used);
        bm.set(2, FrameState::Used);
        bm.set(3, FrameState::Free);
        bm.set(5, FrameState::HeadOfSequence);

        assert_eq!(bm.bytes[0], 0b00_01_01_10);
        assert_eq!(bm.bytes[1], 0b00_00_10_00);
        assert_eq!(bm.get(0), FrameState::HeadOfSequence);
        assert_eq!(bm.get(2), FrameState::Used);
        assert_eq!(bm.get(3), FrameState::Free);
        assert_eq!(bm.get(4), FrameState::Free);
    }

    #[test]
    fn set_leaves_neighbours_untouched() {
        let mut bm = zeroed();
        for i in 0..4 {
            bm.set(i, FrameState::Used);
        }
        bm.set(2, FrameState::Free);
        assert_eq!(bm.get(1), FrameState::Used);
        assert_eq!(bm.get(2), FrameState::Free);
        assert_eq!(bm.get(3), FrameState::Used);
    }

    #[test]
    fn last_index_is_addressable() {
        let mut bm = zeroed();
        bm.set(StateBitmap::CAPACITY - 1, FrameState::HeadOfSequence);
        assert_eq!(bm.get(StateBitmap::CAPACITY - 1), FrameState::HeadOfSequence);
        bm.clear();
        assert_eq!(bm.get(StateBitmap::CAPACITY - 1), FrameState::Free);
    }

    #[test]
    fn bitmap_occupies_exactly_one_frame() {
        assert_eq!(size_of::<StateBitmap>(), FRAME_SIZE as usize);
        assert_eq!(align_of::<StateBitmap>(), FRAME_SIZE as usize);
    }
}
