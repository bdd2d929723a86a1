//! # Contiguous Frame Pool
//!
//! A pool manages `n_frames` consecutive physical frames starting at
//! `base_frame`. Allocation is first-fit over the [`StateBitmap`]: the scan
//! starts at the lowest frame and, when a candidate run hits a non-free
//! frame, resumes directly behind that obstruction.

use crate::PhysMapper;
use crate::frame_state::{FrameState, StateBitmap};
use kernel_memory_addresses::FrameNumber;
use log::{debug, trace, warn};

/// Where a pool keeps its [`StateBitmap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoFrame {
    /// In the pool's own first frame, which becomes unavailable.
    Embedded,
    /// In a frame the caller set aside, e.g. from the kernel pool.
    External(FrameNumber),
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum FramePoolError {
    #[error("a frame pool must manage at least one frame")]
    Empty,
    #[error("{n_frames} frames exceed the {max} frames one bitmap frame can describe")]
    TooManyFrames { n_frames: u32, max: u32 },
    #[error("frame range starting at {base} overflows the frame space")]
    RangeOverflow { base: FrameNumber },
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameAllocError {
    #[error("a run of zero frames was requested")]
    ZeroFrames,
    #[error("{requested} frames requested but only {free} are free")]
    InsufficientFrames { requested: u32, free: u32 },
    #[error("no contiguous run of {requested} free frames")]
    NoContiguousRun { requested: u32 },
    #[error("frames {base}+{count} are not managed by this pool")]
    OutOfRange { base: FrameNumber, count: u32 },
    #[error("no frame pool registered under id {0}")]
    UnknownPool(crate::PoolId),
}

impl FrameAllocError {
    /// Whether the error reveals a logic error in the caller rather than
    /// fragmentation that the caller can recover from.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::NoContiguousRun { .. })
    }
}

/// Number of whole frames needed to hold the state bitmap of `n_frames` frames.
///
/// ```
/// # use kernel_alloc::needed_info_frames;
/// assert_eq!(needed_info_frames(0), 0);
/// assert_eq!(needed_info_frames(1), 1);
/// assert_eq!(needed_info_frames(16_384), 1);
/// assert_eq!(needed_info_frames(16_385), 2);
/// ```
#[must_use]
pub const fn needed_info_frames(n_frames: u32) -> u32 {
    n_frames.div_ceil(StateBitmap::CAPACITY)
}

pub struct ContFramePool<'m> {
    base: FrameNumber,
    n_frames: u32,
    free_frames: u32,
    info_frame: FrameNumber,
    bitmap: &'m mut StateBitmap,
}

impl<'m> ContFramePool<'m> {
    /// Creates a pool over `[base, base + n_frames)` with every frame free,
    /// except the bitmap frame itself if it lies inside the pool.
    ///
    /// # Errors
    /// - [`FramePoolError::Empty`] for `n_frames == 0`.
    /// - [`FramePoolError::TooManyFrames`] if one bitmap frame cannot describe
    ///   the pool.
    /// - [`FramePoolError::RangeOverflow`] if the range wraps.
    ///
    /// # Safety
    /// The bitmap frame must be reachable through `mapper`, must not be used
    /// for anything else while the pool lives, and the frames in the range
    /// must not be handed out by any other pool.
    pub unsafe fn new<M: PhysMapper>(
        mapper: &M,
        base: FrameNumber,
        n_frames: u32,
        info: InfoFrame,
    ) -> Result<Self, FramePoolError> {
        if n_frames == 0 {
            return Err(FramePoolError::Empty);
        }
        if n_frames > StateBitmap::CAPACITY {
            return Err(FramePoolError::TooManyFrames {
                n_frames,
                max: StateBitmap::CAPACITY,
            });
        }
        if base.as_u32().checked_add(n_frames).is_none() {
            return Err(FramePoolError::RangeOverflow { base });
        }

        let info_frame = match info {
            InfoFrame::Embedded => base,
            InfoFrame::External(frame) => frame,
        };

        // SAFETY: caller hands the bitmap frame to this pool.
        let bitmap: &'m mut StateBitmap = unsafe { mapper.phys_to_mut(info_frame.base()) };
        bitmap.clear();

        let mut pool = Self {
            base,
            n_frames,
            free_frames: n_frames,
            info_frame,
            bitmap,
        };

        if let Some(index) = pool.index_of(info_frame) {
            pool.bitmap.set(index, FrameState::HeadOfSequence);
            pool.free_frames -= 1;
        }

        debug!(
            "frame pool [{base}, {}) ready, bitmap in frame {info_frame}, {} free",
            base.as_u32() + n_frames,
            pool.free_frames
        );
        Ok(pool)
    }

    #[inline]
    #[must_use]
    pub const fn base_frame(&self) -> FrameNumber {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn n_frames(&self) -> u32 {
        self.n_frames
    }

    #[inline]
    #[must_use]
    pub const fn free_frames(&self) -> u32 {
        self.free_frames
    }

    #[inline]
    #[must_use]
    pub const fn info_frame(&self) -> FrameNumber {
        self.info_frame
    }

    /// Whether `frame` falls into `[base, base + n_frames)`.
    #[inline]
    #[must_use]
    pub const fn contains(&self, frame: FrameNumber) -> bool {
        self.index_of(frame).is_some()
    }

    /// State of `frame`, or `None` if the pool does not manage it.
    #[must_use]
    pub fn state(&self, frame: FrameNumber) -> Option<FrameState> {
        self.index_of(frame).map(|i| self.bitmap.get(i))
    }

    #[inline]
    const fn index_of(&self, frame: FrameNumber) -> Option<u32> {
        match frame.offset_from(self.base) {
            Some(index) if index < self.n_frames => Some(index),
            _ => None,
        }
    }

    /// Allocates `n` contiguous frames and returns the first of them.
    ///
    /// The first frame becomes `HeadOfSequence`, the rest `Used`.
    ///
    /// # Errors
    /// - [`FrameAllocError::ZeroFrames`] for `n == 0`.
    /// - [`FrameAllocError::InsufficientFrames`] if fewer than `n` frames are
    ///   free at all.
    /// - [`FrameAllocError::NoContiguousRun`] if enough frames are free but
    ///   not adjacent.
    pub fn get_frames(&mut self, n: u32) -> Result<FrameNumber, FrameAllocError> {
        if n == 0 {
            return Err(FrameAllocError::ZeroFrames);
        }
        if n > self.free_frames {
            warn!(
                "pool at {}: {n} frames requested, {} free",
                self.base, self.free_frames
            );
            return Err(FrameAllocError::InsufficientFrames {
                requested: n,
                free: self.free_frames,
            });
        }

        let mut start = 0;
        'search: while start + n <= self.n_frames {
            for i in 0..n {
                if self.bitmap.get(start + i) != FrameState::Free {
                    start += i + 1;
                    continue 'search;
                }
            }

            self.bitmap.set(start, FrameState::HeadOfSequence);
            for i in 1..n {
                self.bitmap.set(start + i, FrameState::Used);
            }
            self.free_frames -= n;

            let head = self.base + start;
            trace!("allocated {n} frames at {head}, {} free", self.free_frames);
            return Ok(head);
        }

        debug!("pool at {}: no run of {n} free frames", self.base);
        Err(FrameAllocError::NoContiguousRun { requested: n })
    }

    /// Marks `[base, base + n)` allocated without searching: `base` becomes
    /// `HeadOfSequence`, the rest `Used`.
    ///
    /// Meant for reserving ranges known to be occupied (holes, firmware
    /// tables) before any allocation. Prior states are overwritten; frames that
    /// were free are taken off the free count.
    ///
    /// # Errors
    /// [`FrameAllocError::ZeroFrames`] or [`FrameAllocError::OutOfRange`].
    pub fn mark_inaccessible(&mut self, base: FrameNumber, n: u32) -> Result<(), FrameAllocError> {
        if n == 0 {
            return Err(FrameAllocError::ZeroFrames);
        }
        let Some(first) = self.index_of(base) else {
            return Err(FrameAllocError::OutOfRange { base, count: n });
        };
        if n > self.n_frames - first {
            return Err(FrameAllocError::OutOfRange { base, count: n });
        }

        for i in first..first + n {
            if self.bitmap.get(i) == FrameState::Free {
                self.free_frames -= 1;
            }
            let state = if i == first {
                FrameState::HeadOfSequence
            } else {
                FrameState::Used
            };
            self.bitmap.set(i, state);
        }

        debug!("marked frames [{base}, {}) inaccessible", base.as_u32() + n);
        Ok(())
    }

    /// Frees the run headed by `head` and returns its length.
    ///
    /// Walks forward from `head`, freeing every `Used` frame until a frame in
    /// another state or the end of the pool.
    ///
    /// # Errors
    /// [`FrameReleaseError::NotHeadOfSequence`](crate::FrameReleaseError) if
    /// `head` does not start a run; [`UnknownFrame`](crate::FrameReleaseError)
    /// if the pool does not manage it.
    pub fn release_run(&mut self, head: FrameNumber) -> Result<u32, crate::FrameReleaseError> {
        let Some(first) = self.index_of(head) else {
            return Err(crate::FrameReleaseError::UnknownFrame(head));
        };

        let state = self.bitmap.get(first);
        if state != FrameState::HeadOfSequence {
            return Err(crate::FrameReleaseError::NotHeadOfSequence { frame: head, state });
        }

        self.bitmap.set(first, FrameState::Free);
        let mut released = 1;
        let mut i = first + 1;
        while i < self.n_frames && self.bitmap.get(i) == FrameState::Used {
            self.bitmap.set(i, FrameState::Free);
            released += 1;
            i += 1;
        }
        self.free_frames += released;

        trace!("released {released} frames at {head}, {} free", self.free_frames);
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameReleaseError, RamPhysMapper};

    /// Counts Free frames straight from the bitmap.
    fn counted_free(pool: &ContFramePool<'_>) -> u32 {
        (0..pool.n_frames())
            .filter(|&i| pool.state(pool.base_frame() + i) == Some(FrameState::Free))
            .count() as u32
    }

    fn embedded(ram: &RamPhysMapper, base: u32, n: u32) -> ContFramePool<'_> {
        unsafe { ContFramePool::new(ram, FrameNumber::new(base), n, InfoFrame::Embedded) }
            .expect("pool")
    }

    #[test]
    fn embedded_bitmap_consumes_first_frame() {
        let ram = RamPhysMapper::new(1024);
        let mut pool = embedded(&ram, 0, 1024);
        assert_eq!(pool.free_frames(), 1023);
        assert_eq!(pool.state(FrameNumber::new(0)), Some(FrameState::HeadOfSequence));

        let head = pool.get_frames(10).unwrap();
        assert_eq!(head, FrameNumber::new(1));
        assert_eq!(pool.free_frames(), 1013);
        assert_eq!(counted_free(&pool), pool.free_frames());
    }

    #[test]
    fn run_is_head_followed_by_used() {
        let ram = RamPhysMapper::new(64);
        let mut pool = embedded(&ram, 16, 48);
        let head = pool.get_frames(4).unwrap();
        assert_eq!(head, FrameNumber::new(17));
        assert_eq!(pool.state(head), Some(FrameState::HeadOfSequence));
        for i in 1..4 {
            assert_eq!(pool.state(head + i), Some(FrameState::Used));
        }
        assert_eq!(pool.state(head + 4), Some(FrameState::Free));
    }

    #[test]
    fn external_bitmap_leaves_all_frames_free() {
        let ram = RamPhysMapper::new(64);
        let pool = unsafe {
            ContFramePool::new(
                &ram,
                FrameNumber::new(32),
                32,
                InfoFrame::External(FrameNumber::new(3)),
            )
        }
        .unwrap();
        assert_eq!(pool.free_frames(), 32);
        assert_eq!(pool.info_frame(), FrameNumber::new(3));
        assert_eq!(counted_free(&pool), 32);
    }

    #[test]
    fn first_fit_skips_past_obstruction() {
        let ram = RamPhysMapper::new(32);
        let mut pool = embedded(&ram, 0, 32);
        let a = pool.get_frames(2).unwrap(); // frames 1..3
        let b = pool.get_frames(1).unwrap(); // frame 3
        let _c = pool.get_frames(2).unwrap(); // frames 4..6
        assert_eq!(pool.release_run(a), Ok(2));

        // The gap at 1..3 is too small for three frames.
        let d = pool.get_frames(3).unwrap();
        assert_eq!(d, FrameNumber::new(6));

        // But a two-frame request reuses it.
        assert_eq!(pool.get_frames(2).unwrap(), FrameNumber::new(1));
        assert_eq!(b, FrameNumber::new(3));
        assert_eq!(counted_free(&pool), pool.free_frames());
    }

    #[test]
    fn release_restores_exactly_the_run() {
        let ram = RamPhysMapper::new(128);
        let mut pool = embedded(&ram, 0, 128);
        let a = pool.get_frames(5).unwrap();
        let b = pool.get_frames(7).unwrap();
        let before = pool.free_frames();

        assert_eq!(pool.release_run(a), Ok(5));
        assert_eq!(pool.free_frames(), before + 5);
        // The neighbouring run is untouched: the walk stops at its head.
        assert_eq!(pool.state(b), Some(FrameState::HeadOfSequence));
        assert_eq!(pool.state(b + 6), Some(FrameState::Used));
        assert_eq!(counted_free(&pool), pool.free_frames());
    }

    #[test]
    fn release_of_non_head_is_rejected() {
        let ram = RamPhysMapper::new(32);
        let mut pool = embedded(&ram, 0, 32);
        let head = pool.get_frames(3).unwrap();
        assert_eq!(
            pool.release_run(head + 1),
            Err(FrameReleaseError::NotHeadOfSequence {
                frame: head + 1,
                state: FrameState::Used
            })
        );
        assert_eq!(
            pool.release_run(head + 5),
            Err(FrameReleaseError::NotHeadOfSequence {
                frame: head + 5,
                state: FrameState::Free
            })
        );
        assert_eq!(
            pool.release_run(FrameNumber::new(32)),
            Err(FrameReleaseError::UnknownFrame(FrameNumber::new(32)))
        );
    }

    #[test]
    fn exhaustion_is_reported_by_kind() {
        let ram = RamPhysMapper::new(16);
        let mut pool = embedded(&ram, 0, 16);
        assert_eq!(
            pool.get_frames(16),
            Err(FrameAllocError::InsufficientFrames {
                requested: 16,
                free: 15
            })
        );
        assert!(pool.get_frames(16).unwrap_err().is_fatal());

        // Fragment: allocate everything, then free every other single frame.
        let heads: Vec<_> = (0..15).map(|_| pool.get_frames(1).unwrap()).collect();
        for h in heads.iter().step_by(2) {
            pool.release_run(*h).unwrap();
        }
        let err = pool.get_frames(2).unwrap_err();
        assert_eq!(err, FrameAllocError::NoContiguousRun { requested: 2 });
        assert!(!err.is_fatal());
        assert_eq!(pool.get_frames(0), Err(FrameAllocError::ZeroFrames));
    }

    #[test]
    fn mark_inaccessible_reserves_range_and_keeps_count_exact() {
        let ram = RamPhysMapper::new(64);
        let mut pool = embedded(&ram, 0, 64);
        let early = pool.get_frames(2).unwrap(); // 1..3, overlaps the hole below

        pool.mark_inaccessible(FrameNumber::new(2), 10).unwrap();
        assert_eq!(pool.state(FrameNumber::new(2)), Some(FrameState::HeadOfSequence));
        assert_eq!(pool.state(FrameNumber::new(11)), Some(FrameState::Used));
        assert_eq!(counted_free(&pool), pool.free_frames());
        assert_eq!(pool.free_frames(), 64 - 1 - 2 - 9);

        // Allocation steps around the reserved range.
        assert_eq!(pool.get_frames(1).unwrap(), FrameNumber::new(12));
        assert_eq!(early, FrameNumber::new(1));

        // The reserved range can be handed back like any run.
        assert_eq!(pool.release_run(FrameNumber::new(2)), Ok(10));
    }

    #[test]
    fn mark_inaccessible_rejects_foreign_ranges() {
        let ram = RamPhysMapper::new(64);
        let mut pool = embedded(&ram, 32, 32);
        assert!(matches!(
            pool.mark_inaccessible(FrameNumber::new(60), 5),
            Err(FrameAllocError::OutOfRange { .. })
        ));
        assert!(matches!(
            pool.mark_inaccessible(FrameNumber::new(10), 1),
            Err(FrameAllocError::OutOfRange { .. })
        ));
        assert_eq!(pool.free_frames(), 31);
    }

    #[test]
    fn construction_limits() {
        let ram = RamPhysMapper::new(1);
        let base = FrameNumber::new(0);
        let info = InfoFrame::External(base);
        assert_eq!(
            unsafe { ContFramePool::new(&ram, base, 0, info) }.err(),
            Some(FramePoolError::Empty)
        );
        assert_eq!(
            unsafe { ContFramePool::new(&ram, base, 16_385, info) }.err(),
            Some(FramePoolError::TooManyFrames {
                n_frames: 16_385,
                max: 16_384
            })
        );
        assert!(unsafe { ContFramePool::new(&ram, base, 16_384, info) }.is_ok());
    }

    #[test]
    fn needed_info_frames_is_monotonic() {
        assert_eq!(needed_info_frames(0), 0);
        let mut last = 0;
        for n in (0..100_000).step_by(97) {
            let needed = needed_info_frames(n);
            assert!(needed >= last);
            assert!(needed * StateBitmap::CAPACITY >= n);
            last = needed;
        }
        assert_eq!(needed_info_frames(7168), 1);
    }
}
