//! # Memory Layout

use kernel_memory_addresses::{FRAME_SIZE, FrameNumber, TABLE_SPAN, VirtualAddress};

/// Bytes identity-mapped by directory entry 0 ("shared" low memory).
pub const SHARED_SIZE: u32 = TABLE_SPAN;

/// First frame of the kernel pool (2 MiB).
pub const KERNEL_POOL_START_FRAME: FrameNumber = FrameNumber::new(0x20_0000 / FRAME_SIZE);

/// Frames managed by the kernel pool (2 MiB).
pub const KERNEL_POOL_SIZE: u32 = 0x20_0000 / FRAME_SIZE;

/// First frame of the process pool (4 MiB).
pub const PROCESS_POOL_START_FRAME: FrameNumber = FrameNumber::new(0x40_0000 / FRAME_SIZE);

/// Frames managed by the process pool (28 MiB).
pub const PROCESS_POOL_SIZE: u32 = 0x1C0_0000 / FRAME_SIZE;

/// First frame of the hole at 15 MiB that must never be handed out.
pub const MEM_HOLE_START_FRAME: FrameNumber = FrameNumber::new(0xF0_0000 / FRAME_SIZE);

/// Frames in the memory hole (1 MiB).
pub const MEM_HOLE_SIZE: u32 = 0x10_0000 / FRAME_SIZE;

/// Base of the code virtual memory pool (512 MiB).
pub const CODE_POOL_BASE: VirtualAddress = VirtualAddress::new(0x2000_0000);

/// Base of the heap virtual memory pool (1 GiB).
pub const HEAP_POOL_BASE: VirtualAddress = VirtualAddress::new(0x4000_0000);

/// Size of each boot-time virtual memory pool (256 MiB).
pub const VM_POOL_SIZE: u32 = 0x1000_0000;

/// Upper bound on frame pools in the process-wide registry.
pub const MAX_FRAME_POOLS: usize = 8;

/// Upper bound on virtual memory pools registered with one page table.
pub const MAX_VM_POOLS: usize = 8;

const _: () = {
    assert!(
        KERNEL_POOL_START_FRAME.as_u32() + KERNEL_POOL_SIZE <= PROCESS_POOL_START_FRAME.as_u32()
    );
    assert!((KERNEL_POOL_START_FRAME.as_u32() + KERNEL_POOL_SIZE) * FRAME_SIZE <= SHARED_SIZE);
    assert!(MEM_HOLE_START_FRAME.as_u32() >= PROCESS_POOL_START_FRAME.as_u32());
    assert!(
        MEM_HOLE_START_FRAME.as_u32() + MEM_HOLE_SIZE
            <= PROCESS_POOL_START_FRAME.as_u32() + PROCESS_POOL_SIZE
    );
    assert!(CODE_POOL_BASE.as_u32() >= SHARED_SIZE);
    assert!(CODE_POOL_BASE.as_u32() + VM_POOL_SIZE <= HEAP_POOL_BASE.as_u32());
    assert!(HEAP_POOL_BASE.as_u32().is_multiple_of(FRAME_SIZE));
    // The self-mapped window occupies the last directory entry.
    assert!(HEAP_POOL_BASE.as_u32() + VM_POOL_SIZE <= 0xFFC0_0000);
};
