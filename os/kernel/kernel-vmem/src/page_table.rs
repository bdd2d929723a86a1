use crate::fault::{FaultCode, PageFaultError};
use crate::memory::VirtMapper;
use crate::page_entry::{EntryTable, PageEntry};
use crate::recursive::{RECURSIVE_SLOT, pde_address, pte_address, table_window};
use crate::vm_pool::{Region, RegionPage, VmPool, VmPoolError, VmPoolId};
use kernel_alloc::{FrameAllocError, FramePools, FrameReleaseError, PhysMapper, PoolId};
use kernel_info::memory::MAX_VM_POOLS;
use kernel_memory_addresses::{ENTRIES_PER_TABLE, FrameNumber, PhysicalAddress, VirtualAddress};
use kernel_registers::{ControlRegisters, Cr3};
use log::{debug, error, info, trace, warn};

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum PageTableError {
    #[error("cannot allocate paging structures: {0}")]
    Frames(#[from] FrameAllocError),
}

/// One address space: a page directory plus the pools that may fault in it.
///
/// On construction the first 4 MiB are identity mapped and the last directory
/// slot maps the directory itself. Everything else starts absent and is filled
/// in by [`PageTable::page_fault`].
///
/// Entries are reached through the recursive window while this table is loaded
/// and paging is on, and through physical addresses otherwise.
pub struct PageTable<M, R> {
    mem: M,
    regs: R,
    directory: FrameNumber,
    pools: [Option<VmPool>; MAX_VM_POOLS],
    len: usize,
}

impl<M, R> PageTable<M, R>
where
    M: PhysMapper + VirtMapper,
    R: ControlRegisters,
{
    /// Builds a directory and the identity table for the first 4 MiB from
    /// frame pool `pool`.
    ///
    /// # Errors
    /// [`PageTableError::Frames`] if the pool cannot supply two frames.
    ///
    /// # Safety
    /// Both frames must be reachable through `mem`'s physical mapping, which
    /// for bare metal means paging is still off or they lie in the identity
    /// mapped region.
    pub unsafe fn new(
        mem: M,
        regs: R,
        frames: &mut FramePools<'_>,
        pool: PoolId,
    ) -> Result<Self, PageTableError> {
        let directory = frames.get_frames(pool, 1)?;
        let identity = frames.get_frames(pool, 1)?;

        // SAFETY: freshly allocated frames; nothing else refers to them.
        let table = unsafe { mem.phys_to_mut::<EntryTable>(identity.base()) };
        for (i, frame) in (0..ENTRIES_PER_TABLE as u32).enumerate() {
            table.set(i, PageEntry::mapping(FrameNumber::new(frame)));
        }

        // SAFETY: as above.
        let dir = unsafe { mem.phys_to_mut::<EntryTable>(directory.base()) };
        dir.fill(PageEntry::vacant());
        dir.set(0, PageEntry::mapping(identity));
        dir.set(RECURSIVE_SLOT, PageEntry::mapping(directory));

        info!("page directory at {directory}, identity table at {identity}");
        Ok(Self {
            mem,
            regs,
            directory,
            pools: [None; MAX_VM_POOLS],
            len: 0,
        })
    }

    #[must_use]
    pub const fn directory_frame(&self) -> FrameNumber {
        self.directory
    }

    /// Makes this the current address space by writing `CR3`.
    ///
    /// # Safety
    /// The kernel's code, data and stack must stay mapped in this table.
    pub unsafe fn load(&self) {
        unsafe { self.regs.write_cr3(Cr3::from_directory(self.directory)) };
        debug!("loaded page directory {}", self.directory);
    }

    /// Whether `CR3` points at this directory.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.regs.read_cr3().directory() == self.directory
    }

    #[must_use]
    pub fn paging_enabled(&self) -> bool {
        self.regs.read_cr0().pg_paging()
    }

    /// Sets `CR0.PG`.
    ///
    /// # Safety
    /// A table must be loaded that maps the code currently executing.
    pub unsafe fn enable_paging(&self) {
        let cr0 = self.regs.read_cr0().with_pg_paging(true);
        unsafe { self.regs.write_cr0(cr0) };
        info!("paging enabled");
    }

    /// Loaded and translating: the recursive window is usable.
    fn is_active(&self) -> bool {
        self.paging_enabled() && self.is_loaded()
    }

    fn ensure_active(&self) -> Result<(), PageFaultError> {
        if !self.paging_enabled() {
            return Err(PageFaultError::PagingDisabled);
        }
        if !self.is_loaded() {
            return Err(PageFaultError::NotLoaded);
        }
        Ok(())
    }

    /// Directory entry covering `va`.
    ///
    /// # Safety
    /// No other reference to the entry may be live.
    #[allow(clippy::mut_from_ref)]
    unsafe fn pde_mut<'a>(&self, va: VirtualAddress) -> Option<&'a mut PageEntry> {
        if self.is_active() {
            unsafe { self.mem.virt_to_mut(pde_address(va)) }
        } else {
            let dir = unsafe { self.mem.phys_to_mut::<EntryTable>(self.directory.base()) };
            Some(dir.entry_mut(va.directory_index()))
        }
    }

    /// Table entry covering `va`, if its page table is present.
    ///
    /// # Safety
    /// No other reference to the entry may be live.
    #[allow(clippy::mut_from_ref)]
    unsafe fn pte_mut<'a>(&self, va: VirtualAddress) -> Option<&'a mut PageEntry> {
        let pde = unsafe { self.pde_mut(va) }?;
        if !pde.present() {
            return None;
        }
        if self.is_active() {
            unsafe { self.mem.virt_to_mut(pte_address(va)) }
        } else {
            let table = unsafe { self.mem.phys_to_mut::<EntryTable>(pde.frame().base()) };
            Some(table.entry_mut(va.table_index()))
        }
    }

    /// Physical address `va` maps to in this address space.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        // SAFETY: the entry is copied out immediately.
        let pte = *unsafe { self.pte_mut(va) }?;
        pte.present().then(|| pte.frame().base() + va.page_offset())
    }

    /// Adds `pool` to the pools consulted on a fault.
    ///
    /// # Errors
    /// [`VmPoolError::Overlaps`] or [`VmPoolError::TooManyPools`].
    pub fn register_pool(&mut self, pool: VmPool) -> Result<VmPoolId, VmPoolError> {
        let range = pool.as_region();
        if let Some((id, _)) = self.pools().find(|(_, p)| p.as_region().overlaps(&range)) {
            return Err(VmPoolError::Overlaps(id));
        }
        let slot = self.pools.get_mut(self.len).ok_or(VmPoolError::TooManyPools)?;
        *slot = Some(pool);
        let id = VmPoolId(self.len);
        self.len += 1;
        info!(
            "registered VM pool {id}: {} + {:#x}",
            pool.base_address(),
            pool.size()
        );
        Ok(id)
    }

    #[must_use]
    pub fn pool(&self, id: VmPoolId) -> Option<&VmPool> {
        self.pools.get(id.0)?.as_ref()
    }

    /// Registered pools, most recent first.
    pub fn pools(&self) -> impl Iterator<Item = (VmPoolId, &VmPool)> {
        self.pools[..self.len]
            .iter()
            .enumerate()
            .rev()
            .filter_map(|(i, p)| p.as_ref().map(|p| (VmPoolId(i), p)))
    }

    /// # Safety
    /// No other reference to the bookkeeping page may be live.
    #[allow(clippy::mut_from_ref)]
    unsafe fn region_page<'a>(&self, pool: &VmPool) -> Result<&'a mut RegionPage, VmPoolError> {
        let base = pool.base_address();
        unsafe { self.mem.virt_to_mut(base) }.ok_or(VmPoolError::BookkeepingUnmapped(base))
    }

    /// The newest pool that vouches for `va`.
    #[must_use]
    pub fn is_legitimate(&self, va: VirtualAddress) -> Option<VmPoolId> {
        self.pools().find_map(|(id, pool)| {
            if !pool.covers(va) {
                return None;
            }
            if pool.bookkeeping().contains(va) {
                return Some(id);
            }
            // SAFETY: read-only use within this closure.
            let page = unsafe { self.region_page(pool) }.ok()?;
            pool.is_legitimate(page, va).then_some(id)
        })
    }

    /// Entry point of the page-fault exception: reads `CR2` and resolves it.
    ///
    /// # Errors
    /// [`PageFaultError::ProtectionViolation`] for faults on present pages;
    /// otherwise see [`PageTable::page_fault`].
    pub fn handle_fault(
        &mut self,
        frames: &mut FramePools<'_>,
        code: FaultCode,
    ) -> Result<(), PageFaultError> {
        let address = self.regs.read_cr2().faulting_address();
        trace!("page fault at {address}: {}", code.explain());
        if code.present() {
            error!("protection violation at {address}: {}", code.explain());
            return Err(PageFaultError::ProtectionViolation { address });
        }
        self.page_fault(frames, address)
    }

    /// Backs `address` with a page, creating its page table if needed.
    ///
    /// Frames come from the frame pool of the VM pool that legitimizes the
    /// address. Nothing is installed for an illegitimate address.
    ///
    /// # Errors
    /// [`PageFaultError::ProtectionViolation`] if no pool vouches for the
    /// address, [`PageFaultError::OutOfFrames`] if its frame pool is
    /// exhausted. The table must be loaded with paging on.
    pub fn page_fault(
        &mut self,
        frames: &mut FramePools<'_>,
        address: VirtualAddress,
    ) -> Result<(), PageFaultError> {
        self.ensure_active()?;

        let Some(id) = self.is_legitimate(address) else {
            error!("protection violation at {address}: no pool covers it");
            return Err(PageFaultError::ProtectionViolation { address });
        };
        let frame_pool = self.pools[id.0]
            .map(|p| p.frame_pool())
            .ok_or(PageFaultError::ProtectionViolation { address })?;
        let mut alloc = || {
            frames
                .get_frames(frame_pool, 1)
                .map_err(|source| PageFaultError::OutOfFrames { address, source })
        };

        // SAFETY: the recursive slot maps the directory while active.
        let pde = unsafe { self.mem.virt_to_mut::<PageEntry>(pde_address(address)) }
            .ok_or(PageFaultError::Unmapped(pde_address(address)))?;
        if !pde.present() {
            let frame = alloc()?;
            *pde = PageEntry::mapping(frame);
            let window = table_window(address.directory_index());
            // SAFETY: the new table became reachable through the window above.
            let table = unsafe { self.mem.virt_to_mut::<EntryTable>(window) }
                .ok_or(PageFaultError::Unmapped(window))?;
            table.fill(PageEntry::vacant());
            debug!("page table for {address} at {frame}");
        }

        // SAFETY: the page table is present.
        let pte = unsafe { self.mem.virt_to_mut::<PageEntry>(pte_address(address)) }
            .ok_or(PageFaultError::Unmapped(pte_address(address)))?;
        if !pte.present() {
            let frame = alloc()?;
            *pte = PageEntry::mapping(frame);
            debug!("mapped {} to {frame} for {id}", address.page_base());
        }
        Ok(())
    }

    /// Unmaps the page holding `va` and returns its frame.
    ///
    /// Returns `false` if nothing was mapped. Reloads `CR3` when this table
    /// is current to drop stale translations.
    ///
    /// # Errors
    /// [`FrameReleaseError`] if the frame is not the head of an allocation.
    pub fn free_page(
        &mut self,
        frames: &mut FramePools<'_>,
        va: VirtualAddress,
    ) -> Result<bool, FrameReleaseError> {
        // SAFETY: sole reference to the entry.
        let Some(pte) = (unsafe { self.pte_mut(va) }) else {
            return Ok(false);
        };
        if !pte.present() {
            return Ok(false);
        }

        frames.release_frames(pte.frame())?;
        *pte = PageEntry::vacant();
        if self.is_loaded() {
            // SAFETY: reloading the current directory keeps every mapping.
            unsafe { self.load() };
        }
        trace!("freed page {}", va.page_base());
        Ok(true)
    }

    /// Registers a pool over `[base, base + size)` and sets up its
    /// bookkeeping page.
    ///
    /// # Errors
    /// See [`VmPool::new`] and [`PageTable::register_pool`];
    /// [`VmPoolError::Fault`] if the bookkeeping page cannot be backed. A
    /// failed pool stays unregistered.
    pub fn create_pool(
        &mut self,
        frames: &mut FramePools<'_>,
        base: VirtualAddress,
        size: u32,
        frame_pool: PoolId,
    ) -> Result<VmPoolId, VmPoolError> {
        self.ensure_active()?;
        let mut pool = VmPool::new(base, size, frame_pool)?;
        let id = self.register_pool(pool)?;
        let backed = self.page_fault(frames, base).map_err(VmPoolError::from).and_then(|()| {
            // SAFETY: the page was just backed; no one else uses it yet.
            unsafe { self.region_page(&pool) }
        });
        match backed {
            Ok(page) => {
                pool.init_regions(page);
                self.pools[id.0] = Some(pool);
                Ok(id)
            }
            Err(e) => {
                // The pool was registered last.
                self.pools[id.0] = None;
                self.len -= 1;
                warn!("VM pool {id} at {base} abandoned: {e}");
                Err(e)
            }
        }
    }

    /// Reserves `size` bytes in pool `id`. Pages are backed on first touch.
    ///
    /// # Errors
    /// See [`VmPool::allocate`].
    pub fn allocate(&mut self, id: VmPoolId, size: u32) -> Result<VirtualAddress, VmPoolError> {
        self.ensure_active()?;
        let mut pool = *self.pool(id).ok_or(VmPoolError::UnknownPool(id))?;
        // SAFETY: sole reference to the bookkeeping page.
        let page = unsafe { self.region_page(&pool) }?;
        let address = pool.allocate(page, size)?;
        self.pools[id.0] = Some(pool);
        debug!("allocated {size:#x} bytes at {address} in {id}");
        Ok(address)
    }

    /// Releases the region of pool `id` starting at `address` and frees the
    /// frames behind its pages.
    ///
    /// # Errors
    /// See [`VmPool::find_allocated`]; [`VmPoolError::Release`] if a frame
    /// cannot be returned.
    pub fn release(
        &mut self,
        frames: &mut FramePools<'_>,
        id: VmPoolId,
        address: VirtualAddress,
    ) -> Result<(), VmPoolError> {
        self.ensure_active()?;
        let mut pool = *self.pool(id).ok_or(VmPoolError::UnknownPool(id))?;
        // SAFETY: sole reference to the bookkeeping page; `free_page` only
        // touches page table entries.
        let page = unsafe { self.region_page(&pool) }?;
        let (index, region) = pool.find_allocated(page, address)?;

        for va in region.page_addresses() {
            self.free_page(frames, va)?;
        }

        pool.retire(page, index);
        self.pools[id.0] = Some(pool);
        debug!("released {} pages at {address} in {id}", region.pages);
        Ok(())
    }

    /// Allocated regions of pool `id`, bookkeeping page included.
    ///
    /// # Errors
    /// [`VmPoolError::UnknownPool`] or [`VmPoolError::BookkeepingUnmapped`].
    pub fn allocated_regions(&self, id: VmPoolId) -> Result<&[Region], VmPoolError> {
        let pool = self.pool(id).ok_or(VmPoolError::UnknownPool(id))?;
        // SAFETY: shared use only, bounded by `&self`.
        let page = unsafe { self.region_page(pool) }?;
        Ok(pool.allocated_regions(page))
    }

    /// Free regions of pool `id`.
    ///
    /// # Errors
    /// [`VmPoolError::UnknownPool`] or [`VmPoolError::BookkeepingUnmapped`].
    pub fn free_regions(&self, id: VmPoolId) -> Result<&[Region], VmPoolError> {
        let pool = self.pool(id).ok_or(VmPoolError::UnknownPool(id))?;
        // SAFETY: shared use only, bounded by `&self`.
        let page = unsafe { self.region_page(pool) }?;
        Ok(pool.free_regions(page))
    }
}
