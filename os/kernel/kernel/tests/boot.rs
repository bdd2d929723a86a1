use kernel::MemorySystem;
use kernel_alloc::{FrameState, RamPhysMapper};
use kernel_info::memory::{
    CODE_POOL_BASE, HEAP_POOL_BASE, KERNEL_POOL_SIZE, MEM_HOLE_SIZE, MEM_HOLE_START_FRAME,
    PROCESS_POOL_SIZE,
};
use kernel_memory_addresses::{FRAME_SIZE, PhysicalAddress, VirtualAddress};
use kernel_registers::SoftRegisters;
use kernel_vmem::{FaultCode, PageFaultError, Region, SoftMmu};

/// Simulated RAM up to the end of the process pool (32 MiB).
const RAM_FRAMES: usize = 8192;

type Memory<'a> = MemorySystem<'a, SoftMmu<'a, RamPhysMapper, SoftRegisters>, &'a SoftRegisters>;

fn boot<'a>(ram: &'a RamPhysMapper, regs: &'a SoftRegisters) -> Memory<'a> {
    unsafe { MemorySystem::init(SoftMmu::new(ram, regs), regs) }.expect("boot")
}

#[test]
fn boot_enables_paging_with_the_layout_in_place() {
    let ram = RamPhysMapper::new(RAM_FRAMES);
    let regs = SoftRegisters::new();
    let memory = boot(&ram, &regs);

    assert!(memory.page_table.is_loaded());
    assert!(memory.page_table.paging_enabled());
    assert_eq!(
        memory.page_table.translate(VirtualAddress::new(0x0010_0000)),
        Some(PhysicalAddress::new(0x0010_0000))
    );

    // Kernel pool: its own bitmap, the process bitmap, directory and identity table.
    let kernel = memory.frames.pool(memory.kernel_pool).unwrap();
    assert_eq!(kernel.free_frames(), KERNEL_POOL_SIZE - 4);

    // Process pool: the hole, and a page table plus bookkeeping page per VM pool.
    let process = memory.frames.pool(memory.process_pool).unwrap();
    assert_eq!(process.free_frames(), PROCESS_POOL_SIZE - MEM_HOLE_SIZE - 4);
    assert_eq!(process.state(MEM_HOLE_START_FRAME), Some(FrameState::HeadOfSequence));
    assert_eq!(process.state(MEM_HOLE_START_FRAME + 1), Some(FrameState::Used));
}

#[test]
fn default_pools_manage_code_and_heap() {
    let ram = RamPhysMapper::new(RAM_FRAMES);
    let regs = SoftRegisters::new();
    let memory = boot(&ram, &regs);

    assert_eq!(
        memory.page_table.allocated_regions(memory.code_pool),
        Ok(&[Region::new(CODE_POOL_BASE, 1)][..])
    );
    assert_eq!(
        memory.page_table.allocated_regions(memory.heap_pool),
        Ok(&[Region::new(HEAP_POOL_BASE, 1)][..])
    );
    assert_eq!(memory.page_table.is_legitimate(HEAP_POOL_BASE), Some(memory.heap_pool));
}

#[test]
fn heap_pages_are_backed_on_first_touch() {
    let ram = RamPhysMapper::new(RAM_FRAMES);
    let regs = SoftRegisters::new();
    let mut memory = boot(&ram, &regs);

    let block = memory.page_table.allocate(memory.heap_pool, 2 * FRAME_SIZE).unwrap();
    assert_eq!(memory.page_table.translate(block), None);

    let process_free = memory.frames.pool(memory.process_pool).unwrap().free_frames();
    regs.raise_page_fault(block + FRAME_SIZE);
    memory.handle_page_fault(FaultCode::new()).unwrap();

    let pa = memory.page_table.translate(block + FRAME_SIZE).expect("backed");
    assert!(memory.frames.pool(memory.process_pool).unwrap().contains(pa.frame()));
    assert!(!(MEM_HOLE_START_FRAME.as_u32()..MEM_HOLE_START_FRAME.as_u32() + MEM_HOLE_SIZE)
        .contains(&pa.frame().as_u32()));
    assert_eq!(
        memory.frames.pool(memory.process_pool).unwrap().free_frames(),
        process_free - 1
    );

    memory
        .page_table
        .release(&mut memory.frames, memory.heap_pool, block)
        .unwrap();
    assert_eq!(
        memory.frames.pool(memory.process_pool).unwrap().free_frames(),
        process_free
    );
}

#[test]
fn stray_access_is_a_protection_violation() {
    let ram = RamPhysMapper::new(RAM_FRAMES);
    let regs = SoftRegisters::new();
    let mut memory = boot(&ram, &regs);

    let stray = VirtualAddress::new(0x6000_0000);
    regs.raise_page_fault(stray);
    assert_eq!(
        memory.handle_page_fault(FaultCode::new()),
        Err(PageFaultError::ProtectionViolation { address: stray })
    );
}
