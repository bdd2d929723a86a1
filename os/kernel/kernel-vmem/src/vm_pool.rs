//! # Virtual Memory Pools
//!
//! A pool hands out page-granular regions of a fixed virtual range. Frames
//! are not attached on allocation; the fault handler backs a page when it is
//! first touched, after asking the pool whether the address is legitimate.
//!
//! The first page of every pool holds its own bookkeeping:
//!
//! ```text
//! base ┌──────────────────────────────┐
//!      │ allocated: [Region; 256]     │ 2 KiB
//!      ├──────────────────────────────┤
//!      │ free:      [Region; 256]     │ 2 KiB
//! +4K  ├──────────────────────────────┤
//!      │ managed pages ...            │
//!      └──────────────────────────────┘
//! ```
//!
//! Released regions go back to the free list as they are. Adjacent free
//! regions are not merged, so repeated allocate/release of differing sizes
//! fragments the pool.

use crate::fault::PageFaultError;
use crate::recursive::TABLES_WINDOW;
use core::fmt;
use kernel_alloc::{FrameReleaseError, PoolId};
use kernel_memory_addresses::{FRAME_SIZE, VirtualAddress, pages_for};

/// Entries per region list.
pub const REGION_CAPACITY: usize = 256;

/// Handle of a pool registered with a [`PageTable`](crate::PageTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VmPoolId(pub(crate) usize);

impl fmt::Display for VmPoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vm#{}", self.0)
    }
}

/// A run of pages starting at `base`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub base: VirtualAddress,
    pub pages: u32,
}

impl Region {
    const EMPTY: Self = Self {
        base: VirtualAddress::new(0),
        pages: 0,
    };

    #[must_use]
    pub const fn new(base: VirtualAddress, pages: u32) -> Self {
        Self { base, pages }
    }

    #[must_use]
    pub const fn len_bytes(&self) -> u64 {
        self.pages as u64 * FRAME_SIZE as u64
    }

    #[must_use]
    pub const fn contains(&self, va: VirtualAddress) -> bool {
        match va.as_u32().checked_sub(self.base.as_u32()) {
            Some(offset) => (offset as u64) < self.len_bytes(),
            None => false,
        }
    }

    /// Page addresses covered by the region.
    pub fn page_addresses(&self) -> impl Iterator<Item = VirtualAddress> + use<> {
        let base = self.base;
        (0..self.pages).map(move |i| base + i * FRAME_SIZE)
    }

    /// `true` if the two regions share at least one page.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        let a = self.base.as_u32() as u64;
        let b = other.base.as_u32() as u64;
        a < b + other.len_bytes() && b < a + self.len_bytes()
    }
}

/// Bookkeeping page of a pool.
#[repr(C, align(4096))]
pub struct RegionPage {
    allocated: [Region; REGION_CAPACITY],
    free: [Region; REGION_CAPACITY],
}

const _: () = assert!(size_of::<RegionPage>() == FRAME_SIZE as usize);

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum VmPoolError {
    #[error("{0} is not page aligned")]
    Misaligned(u32),
    #[error("a pool needs a bookkeeping page and at least one managed page")]
    TooSmall,
    #[error("pool overlaps {0}")]
    Overlaps(VmPoolId),
    #[error("pool reaches into the page table window")]
    ReservedRange,
    #[error("no pool {0}")]
    UnknownPool(VmPoolId),
    #[error("the page table holds no further pools")]
    TooManyPools,
    #[error("zero-sized allocation")]
    EmptyRequest,
    #[error("no free region of {pages} pages")]
    NoSpace { pages: u32 },
    #[error("region list is full")]
    RegionListFull,
    #[error("{0} does not start an allocated region")]
    UnknownRegion(VirtualAddress),
    #[error("the bookkeeping page cannot be released")]
    BookkeepingRegion,
    #[error("bookkeeping page at {0} is not mapped")]
    BookkeepingUnmapped(VirtualAddress),
    #[error(transparent)]
    Fault(#[from] PageFaultError),
    #[error(transparent)]
    Release(#[from] FrameReleaseError),
}

/// A virtual address range managed in page-sized regions.
///
/// The region lists live in the pool's first page and are passed in as a
/// [`RegionPage`]; the pool itself only keeps their lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmPool {
    base: VirtualAddress,
    size: u32,
    frame_pool: PoolId,
    allocated: usize,
    free: usize,
}

impl VmPool {
    /// Validates the range `[base, base + size)`.
    ///
    /// # Errors
    /// [`VmPoolError::Misaligned`], [`VmPoolError::TooSmall`] or
    /// [`VmPoolError::ReservedRange`].
    pub const fn new(
        base: VirtualAddress,
        size: u32,
        frame_pool: PoolId,
    ) -> Result<Self, VmPoolError> {
        if !base.as_u32().is_multiple_of(FRAME_SIZE) {
            return Err(VmPoolError::Misaligned(base.as_u32()));
        }
        if !size.is_multiple_of(FRAME_SIZE) {
            return Err(VmPoolError::Misaligned(size));
        }
        if size < 2 * FRAME_SIZE {
            return Err(VmPoolError::TooSmall);
        }
        if base.as_u32() as u64 + size as u64 > TABLES_WINDOW as u64 {
            return Err(VmPoolError::ReservedRange);
        }
        Ok(Self {
            base,
            size,
            frame_pool,
            allocated: 0,
            free: 0,
        })
    }

    #[must_use]
    pub const fn base_address(&self) -> VirtualAddress {
        self.base
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Frame pool that backs faults in this range.
    #[must_use]
    pub const fn frame_pool(&self) -> PoolId {
        self.frame_pool
    }

    #[must_use]
    pub const fn as_region(&self) -> Region {
        Region::new(self.base, self.size / FRAME_SIZE)
    }

    #[must_use]
    pub const fn covers(&self, va: VirtualAddress) -> bool {
        self.as_region().contains(va)
    }

    /// The bookkeeping page itself.
    #[must_use]
    pub const fn bookkeeping(&self) -> Region {
        Region::new(self.base, 1)
    }

    pub fn allocated_regions<'p>(&self, page: &'p RegionPage) -> &'p [Region] {
        &page.allocated[..self.allocated]
    }

    pub fn free_regions<'p>(&self, page: &'p RegionPage) -> &'p [Region] {
        &page.free[..self.free]
    }

    /// Resets the lists to "bookkeeping page allocated, rest free".
    pub fn init_regions(&mut self, page: &mut RegionPage) {
        page.allocated.fill(Region::EMPTY);
        page.free.fill(Region::EMPTY);
        page.allocated[0] = self.bookkeeping();
        page.free[0] = Region::new(self.base + FRAME_SIZE, self.size / FRAME_SIZE - 1);
        self.allocated = 1;
        self.free = 1;
    }

    /// Carves `size` bytes, rounded up to pages, from the first free region
    /// large enough.
    ///
    /// # Errors
    /// [`VmPoolError::EmptyRequest`], [`VmPoolError::RegionListFull`] or
    /// [`VmPoolError::NoSpace`].
    pub fn allocate(
        &mut self,
        page: &mut RegionPage,
        size: u32,
    ) -> Result<VirtualAddress, VmPoolError> {
        if size == 0 {
            return Err(VmPoolError::EmptyRequest);
        }
        if self.allocated == REGION_CAPACITY {
            return Err(VmPoolError::RegionListFull);
        }

        let pages = pages_for(size);
        let Some(index) = self.free_regions(page).iter().position(|r| r.pages >= pages) else {
            return Err(VmPoolError::NoSpace { pages });
        };

        let region = &mut page.free[index];
        let base = region.base;
        if region.pages == pages {
            self.free -= 1;
            page.free[index] = page.free[self.free];
            page.free[self.free] = Region::EMPTY;
        } else {
            region.base += pages * FRAME_SIZE;
            region.pages -= pages;
        }

        page.allocated[self.allocated] = Region::new(base, pages);
        self.allocated += 1;
        Ok(base)
    }

    /// Finds the allocated region starting at `address`.
    ///
    /// Returns its list index, for a following [`VmPool::retire`].
    ///
    /// # Errors
    /// [`VmPoolError::BookkeepingRegion`], [`VmPoolError::UnknownRegion`] or
    /// [`VmPoolError::RegionListFull`] when the free list cannot take it.
    pub fn find_allocated(
        &self,
        page: &RegionPage,
        address: VirtualAddress,
    ) -> Result<(usize, Region), VmPoolError> {
        if address == self.base {
            return Err(VmPoolError::BookkeepingRegion);
        }
        let index = self
            .allocated_regions(page)
            .iter()
            .position(|r| r.base == address)
            .ok_or(VmPoolError::UnknownRegion(address))?;
        if self.free == REGION_CAPACITY {
            return Err(VmPoolError::RegionListFull);
        }
        Ok((index, page.allocated[index]))
    }

    /// Moves allocated region `index` to the free list.
    pub fn retire(&mut self, page: &mut RegionPage, index: usize) {
        debug_assert!(index < self.allocated && self.free < REGION_CAPACITY);
        page.free[self.free] = page.allocated[index];
        self.free += 1;

        self.allocated -= 1;
        page.allocated[index] = page.allocated[self.allocated];
        page.allocated[self.allocated] = Region::EMPTY;
    }

    /// Whether the pool vouches for `va`: its bookkeeping page or any
    /// allocated region. Free space is not legitimate.
    #[must_use]
    pub fn is_legitimate(&self, page: &RegionPage, va: VirtualAddress) -> bool {
        self.allocated_regions(page).iter().any(|r| r.contains(va))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed_page() -> Box<RegionPage> {
        // SAFETY: all-zero regions are valid.
        unsafe { Box::new_zeroed().assume_init() }
    }

    fn pool(base: u32, pages: u32) -> (VmPool, Box<RegionPage>) {
        let mut page = boxed_page();
        let mut pool = VmPool::new(VirtualAddress::new(base), pages * FRAME_SIZE, PoolId::new(0))
            .unwrap();
        pool.init_regions(&mut page);
        (pool, page)
    }

    fn assert_disjoint(pool: &VmPool, page: &RegionPage) {
        let all: Vec<_> = pool
            .allocated_regions(page)
            .iter()
            .chain(pool.free_regions(page))
            .copied()
            .collect();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
            }
        }
        let pages: u32 = all.iter().map(|r| r.pages).sum();
        assert_eq!(pages * FRAME_SIZE, pool.size());
    }

    #[test]
    fn construction_reserves_bookkeeping_page() {
        let (pool, page) = pool(0x4000_0000, 16);
        assert_eq!(
            pool.allocated_regions(&page),
            &[Region::new(VirtualAddress::new(0x4000_0000), 1)]
        );
        assert_eq!(
            pool.free_regions(&page),
            &[Region::new(VirtualAddress::new(0x4000_1000), 15)]
        );
        assert!(pool.is_legitimate(&page, VirtualAddress::new(0x4000_0FFF)));
        assert!(!pool.is_legitimate(&page, VirtualAddress::new(0x4000_1000)));
    }

    #[test]
    fn allocate_takes_from_the_front_and_rounds_up() {
        let (mut pool, mut page) = pool(0x4000_0000, 16);
        let a = pool.allocate(&mut page, 1).unwrap();
        let b = pool.allocate(&mut page, FRAME_SIZE + 1).unwrap();
        assert_eq!(a.as_u32(), 0x4000_1000);
        assert_eq!(b.as_u32(), 0x4000_2000);
        assert_eq!(pool.free_regions(&page), &[Region::new(VirtualAddress::new(0x4000_4000), 12)]);
        assert!(pool.is_legitimate(&page, VirtualAddress::new(0x4000_3FFF)));
        assert!(!pool.is_legitimate(&page, VirtualAddress::new(0x4000_4000)));
        assert_disjoint(&pool, &page);
    }

    #[test]
    fn exact_fit_removes_the_free_region() {
        let (mut pool, mut page) = pool(0x4000_0000, 4);
        pool.allocate(&mut page, 3 * FRAME_SIZE).unwrap();
        assert!(pool.free_regions(&page).is_empty());
        assert_eq!(
            pool.allocate(&mut page, 1),
            Err(VmPoolError::NoSpace { pages: 1 })
        );
        assert_eq!(pool.allocate(&mut page, 0), Err(VmPoolError::EmptyRequest));
    }

    #[test]
    fn release_then_allocate_reuses_space() {
        let (mut pool, mut page) = pool(0x4000_0000, 4);
        let a = pool.allocate(&mut page, 3 * FRAME_SIZE).unwrap();

        let (index, region) = pool.find_allocated(&page, a).unwrap();
        assert_eq!(region.pages, 3);
        pool.retire(&mut page, index);
        assert_disjoint(&pool, &page);
        assert!(!pool.is_legitimate(&page, a));

        assert_eq!(pool.allocate(&mut page, 2 * FRAME_SIZE).unwrap(), a);
        assert_disjoint(&pool, &page);
    }

    #[test]
    fn release_matches_by_base_only() {
        let (mut pool, mut page) = pool(0x4000_0000, 8);
        let a = pool.allocate(&mut page, 2 * FRAME_SIZE).unwrap();
        let inner = a + FRAME_SIZE;
        assert_eq!(
            pool.find_allocated(&page, inner),
            Err(VmPoolError::UnknownRegion(inner))
        );
        assert_eq!(
            pool.find_allocated(&page, pool.base_address()),
            Err(VmPoolError::BookkeepingRegion)
        );
    }

    #[test]
    fn free_regions_are_not_merged() {
        let (mut pool, mut page) = pool(0x4000_0000, 5);
        let a = pool.allocate(&mut page, FRAME_SIZE).unwrap();
        let b = pool.allocate(&mut page, FRAME_SIZE).unwrap();
        for addr in [a, b] {
            let (i, _) = pool.find_allocated(&page, addr).unwrap();
            pool.retire(&mut page, i);
        }
        assert_eq!(pool.free_regions(&page).len(), 3);
        assert_eq!(
            pool.allocate(&mut page, 3 * FRAME_SIZE),
            Err(VmPoolError::NoSpace { pages: 3 })
        );
        assert_disjoint(&pool, &page);
    }

    #[test]
    fn region_list_is_bounded() {
        let (mut pool, mut page) = pool(0x4000_0000, 1024);
        for _ in 1..REGION_CAPACITY {
            pool.allocate(&mut page, 1).unwrap();
        }
        assert_eq!(pool.allocate(&mut page, 1), Err(VmPoolError::RegionListFull));
        assert_disjoint(&pool, &page);
    }

    #[test]
    fn construction_is_validated() {
        let id = PoolId::new(0);
        assert_eq!(
            VmPool::new(VirtualAddress::new(0x4000_0010), 0x2000, id),
            Err(VmPoolError::Misaligned(0x4000_0010))
        );
        assert_eq!(
            VmPool::new(VirtualAddress::new(0x4000_0000), FRAME_SIZE, id),
            Err(VmPoolError::TooSmall)
        );
        assert_eq!(
            VmPool::new(VirtualAddress::new(0xFFBF_F000), 0x2000, id),
            Err(VmPoolError::ReservedRange)
        );
    }
}
