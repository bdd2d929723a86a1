//! # Frame Pool Registry
//!
//! Frames are released by number alone: the caller does not remember which
//! pool issued them. The registry keeps every pool in a small arena and finds
//! the owner of a frame by range lookup.

use crate::cont_frame_pool::{ContFramePool, FrameAllocError};
use crate::frame_state::FrameState;
use core::fmt;
use kernel_info::memory::MAX_FRAME_POOLS;
use kernel_memory_addresses::FrameNumber;
use log::{error, info};

/// Handle of a pool inside a [`FramePools`] registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(usize);

impl PoolId {
    /// Handle of the `index`-th registered pool.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum RegisterPoolError {
    #[error("the frame pool registry is full")]
    Full,
    #[error("frames overlap pool {0}")]
    Overlaps(PoolId),
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameReleaseError {
    #[error("frame {0} is not managed by any registered pool")]
    UnknownFrame(FrameNumber),
    #[error("frame {frame} is {state:?}, not the head of an allocation")]
    NotHeadOfSequence { frame: FrameNumber, state: FrameState },
}

/// Process-wide registry of frame pools, in registration order.
///
/// Pools are never removed.
pub struct FramePools<'m> {
    pools: [Option<ContFramePool<'m>>; MAX_FRAME_POOLS],
    len: usize,
}

impl Default for FramePools<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'m> FramePools<'m> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pools: [const { None }; MAX_FRAME_POOLS],
            len: 0,
        }
    }

    /// Appends `pool` to the registry.
    ///
    /// # Errors
    /// [`RegisterPoolError::Full`] when out of slots, or
    /// [`RegisterPoolError::Overlaps`] if the pool shares frames with a
    /// registered one.
    pub fn register(&mut self, pool: ContFramePool<'m>) -> Result<PoolId, RegisterPoolError> {
        let first = pool.base_frame().as_u32();
        let end = first + pool.n_frames();
        if let Some((id, _)) = self.iter().find(|(_, p)| {
            let p_first = p.base_frame().as_u32();
            first < p_first + p.n_frames() && p_first < end
        }) {
            return Err(RegisterPoolError::Overlaps(id));
        }

        let slot = self.pools.get_mut(self.len).ok_or(RegisterPoolError::Full)?;
        *slot = Some(pool);
        let id = PoolId(self.len);
        self.len += 1;

        info!(
            "registered frame pool {id}: frames [{first}, {end}), {} free",
            self.total_free_frames()
        );
        Ok(id)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn pool(&self, id: PoolId) -> Option<&ContFramePool<'m>> {
        self.pools.get(id.0)?.as_ref()
    }

    pub fn pool_mut(&mut self, id: PoolId) -> Option<&mut ContFramePool<'m>> {
        self.pools.get_mut(id.0)?.as_mut()
    }

    /// Pools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (PoolId, &ContFramePool<'m>)> {
        self.pools
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_ref().map(|p| (PoolId(i), p)))
    }

    #[must_use]
    pub fn total_free_frames(&self) -> u32 {
        self.iter().map(|(_, p)| p.free_frames()).sum()
    }

    /// Allocates `n` contiguous frames from pool `id`.
    ///
    /// # Errors
    /// See [`ContFramePool::get_frames`]; [`FrameAllocError::UnknownPool`] if
    /// `id` does not belong to this registry.
    pub fn get_frames(&mut self, id: PoolId, n: u32) -> Result<FrameNumber, FrameAllocError> {
        self.pool_mut(id)
            .ok_or(FrameAllocError::UnknownPool(id))?
            .get_frames(n)
    }

    /// Reserves `[base, base + n)` in pool `id`.
    ///
    /// # Errors
    /// See [`ContFramePool::mark_inaccessible`].
    pub fn mark_inaccessible(
        &mut self,
        id: PoolId,
        base: FrameNumber,
        n: u32,
    ) -> Result<(), FrameAllocError> {
        self.pool_mut(id)
            .ok_or(FrameAllocError::UnknownPool(id))?
            .mark_inaccessible(base, n)
    }

    /// The pool whose range `[base, base + n_frames)` contains `frame`.
    #[must_use]
    pub fn owner_of(&self, frame: FrameNumber) -> Option<PoolId> {
        self.iter().find(|(_, p)| p.contains(frame)).map(|(id, _)| id)
    }

    /// Releases the run headed by `head`, whichever pool issued it.
    ///
    /// Returns the number of frames freed.
    ///
    /// # Errors
    /// [`FrameReleaseError::UnknownFrame`] if no pool manages `head`;
    /// [`FrameReleaseError::NotHeadOfSequence`] if `head` does not start a
    /// run. Both indicate a caller bug.
    pub fn release_frames(&mut self, head: FrameNumber) -> Result<u32, FrameReleaseError> {
        let Some(id) = self.owner_of(head) else {
            error!("release of frame {head} outside every pool");
            return Err(FrameReleaseError::UnknownFrame(head));
        };
        let pool = self
            .pool_mut(id)
            .ok_or(FrameReleaseError::UnknownFrame(head))?;
        pool.release_run(head).inspect_err(|e| error!("release of frame {head}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InfoFrame, RamPhysMapper};

    fn pool(ram: &RamPhysMapper, base: u32, n: u32) -> ContFramePool<'_> {
        unsafe { ContFramePool::new(ram, FrameNumber::new(base), n, InfoFrame::Embedded) }.unwrap()
    }

    #[test]
    fn release_finds_the_owner() {
        let ram = RamPhysMapper::new(256);
        let mut pools = FramePools::new();
        let low = pools.register(pool(&ram, 0, 128)).unwrap();
        let high = pools.register(pool(&ram, 128, 128)).unwrap();

        let a = pools.get_frames(low, 3).unwrap();
        let b = pools.get_frames(high, 4).unwrap();
        assert_eq!(a, FrameNumber::new(1));
        assert_eq!(b, FrameNumber::new(129));
        assert_eq!(pools.total_free_frames(), 127 + 127 - 7);

        assert_eq!(pools.release_frames(b), Ok(4));
        assert_eq!(pools.release_frames(a), Ok(3));
        assert_eq!(pools.total_free_frames(), 254);
    }

    #[test]
    fn upper_bound_is_exclusive() {
        let ram = RamPhysMapper::new(256);
        let mut pools = FramePools::new();
        let low = pools.register(pool(&ram, 0, 100)).unwrap();
        let high = pools.register(pool(&ram, 100, 100)).unwrap();

        assert_eq!(pools.owner_of(FrameNumber::new(99)), Some(low));
        assert_eq!(pools.owner_of(FrameNumber::new(100)), Some(high));
        assert_eq!(pools.owner_of(FrameNumber::new(200)), None);

        // Frame 100 is the embedded bitmap of the high pool.
        assert_eq!(
            pools.pool(high).unwrap().state(FrameNumber::new(100)),
            Some(FrameState::HeadOfSequence)
        );
        assert_eq!(
            pools.release_frames(FrameNumber::new(200)),
            Err(FrameReleaseError::UnknownFrame(FrameNumber::new(200)))
        );
    }

    #[test]
    fn overlapping_pools_are_rejected() {
        let ram = RamPhysMapper::new(64);
        let mut pools = FramePools::new();
        let first = pools.register(pool(&ram, 0, 32)).unwrap();
        let overlapping = pool(&ram, 31, 8);
        assert_eq!(
            pools.register(overlapping).err(),
            Some(RegisterPoolError::Overlaps(first))
        );
        assert_eq!(pools.len(), 1);
    }

    #[test]
    fn registry_is_bounded() {
        let ram = RamPhysMapper::new(MAX_FRAME_POOLS + 1);
        let mut pools = FramePools::new();
        for i in 0..MAX_FRAME_POOLS {
            pools.register(pool(&ram, i as u32, 1)).unwrap();
        }
        assert_eq!(
            pools.register(pool(&ram, MAX_FRAME_POOLS as u32, 1)).err(),
            Some(RegisterPoolError::Full)
        );
    }

    #[test]
    fn unknown_pool_id_is_reported() {
        let ram = RamPhysMapper::new(8);
        let mut other = FramePools::new();
        other.register(pool(&ram, 0, 4)).unwrap();
        let foreign = other.register(pool(&ram, 4, 4)).unwrap();

        let mut pools = FramePools::new();
        assert_eq!(
            pools.get_frames(foreign, 1),
            Err(FrameAllocError::UnknownPool(foreign))
        );
    }
}
