use kernel_alloc::{
    ContFramePool, FrameAllocError, FramePoolError, FramePools, InfoFrame, PhysMapper, PoolId,
    RegisterPoolError, needed_info_frames,
};
use kernel_info::memory::{
    CODE_POOL_BASE, HEAP_POOL_BASE, KERNEL_POOL_SIZE, KERNEL_POOL_START_FRAME, MEM_HOLE_SIZE,
    MEM_HOLE_START_FRAME, PROCESS_POOL_SIZE, PROCESS_POOL_START_FRAME, VM_POOL_SIZE,
};
use kernel_registers::ControlRegisters;
use kernel_vmem::{
    FaultCode, PageFaultError, PageTable, PageTableError, VirtMapper, VmPoolError, VmPoolId,
};
use log::info;

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    #[error("cannot create frame pool: {0}")]
    FramePool(#[from] FramePoolError),
    #[error("cannot register frame pool: {0}")]
    RegisterPool(#[from] RegisterPoolError),
    #[error("cannot reserve frames: {0}")]
    Frames(#[from] FrameAllocError),
    #[error("cannot build the page table: {0}")]
    PageTable(#[from] PageTableError),
    #[error("cannot create VM pool: {0}")]
    VmPool(#[from] VmPoolError),
    #[error("memory is already initialized")]
    AlreadyBooted,
}

/// Physical and virtual memory of the running kernel.
pub struct MemorySystem<'m, M, R> {
    pub frames: FramePools<'m>,
    pub kernel_pool: PoolId,
    pub process_pool: PoolId,
    pub page_table: PageTable<M, R>,
    pub code_pool: VmPoolId,
    pub heap_pool: VmPoolId,
}

impl<M, R> MemorySystem<'_, M, R>
where
    M: PhysMapper + VirtMapper,
    R: ControlRegisters,
{
    /// Brings up frame pools, paging and the default VM pools.
    ///
    /// # Errors
    /// Any [`BootError`]; the machine is in an undefined state afterwards.
    ///
    /// # Safety
    /// Must run once, with paging off, in a context whose code and data lie in
    /// the first 4 MiB. `mem` must reach all physical memory up to the end of
    /// the process pool.
    pub unsafe fn init(mem: M, regs: R) -> Result<Self, BootError> {
        let mut frames = FramePools::new();

        // SAFETY: the kernel pool range is reserved for it by the memory layout.
        let kernel = unsafe {
            ContFramePool::new(&mem, KERNEL_POOL_START_FRAME, KERNEL_POOL_SIZE, InfoFrame::Embedded)
        }?;
        let kernel_pool = frames.register(kernel)?;

        let info_frames = needed_info_frames(PROCESS_POOL_SIZE);
        let bitmap = frames.get_frames(kernel_pool, info_frames)?;
        // SAFETY: `bitmap` was just taken from the kernel pool for this purpose.
        let process = unsafe {
            ContFramePool::new(
                &mem,
                PROCESS_POOL_START_FRAME,
                PROCESS_POOL_SIZE,
                InfoFrame::External(bitmap),
            )
        }?;
        let process_pool = frames.register(process)?;
        frames.mark_inaccessible(process_pool, MEM_HOLE_START_FRAME, MEM_HOLE_SIZE)?;
        info!(
            "frame pools ready: kernel {kernel_pool}, process {process_pool}, {} frames free",
            frames.total_free_frames()
        );

        // SAFETY: paging is still off, so kernel frames are reachable physically.
        let mut page_table = unsafe { PageTable::new(mem, regs, &mut frames, kernel_pool) }?;
        // SAFETY: the first 4 MiB, holding this code, are identity mapped.
        unsafe {
            page_table.load();
            page_table.enable_paging();
        }

        let code_pool =
            page_table.create_pool(&mut frames, CODE_POOL_BASE, VM_POOL_SIZE, process_pool)?;
        let heap_pool =
            page_table.create_pool(&mut frames, HEAP_POOL_BASE, VM_POOL_SIZE, process_pool)?;
        info!("virtual memory ready: code pool {code_pool}, heap pool {heap_pool}");

        Ok(Self {
            frames,
            kernel_pool,
            process_pool,
            page_table,
            code_pool,
            heap_pool,
        })
    }

    /// Resolves the page fault latched in `CR2`.
    ///
    /// # Errors
    /// See [`PageTable::handle_fault`].
    pub fn handle_page_fault(&mut self, code: FaultCode) -> Result<(), PageFaultError> {
        self.page_table.handle_fault(&mut self.frames, code)
    }
}
