//! # Reaching Physical Memory
//!
//! Rust code can only dereference virtual addresses. Whenever the allocator or
//! the paging code must touch a physical frame (a state bitmap, a page
//! directory, a fresh page table) it asks a [`PhysMapper`] for a reference.
//!
//! - [`IdentityPhysMapper`]: physical address == virtual address. Valid
//!   before paging is enabled and, afterwards, for the identity-mapped first
//!   4 MiB that hold the kernel pool.
//! - [`RamPhysMapper`] (`hosted` feature): a heap-allocated block standing in
//!   for physical memory starting at address 0.

use kernel_memory_addresses::PhysicalAddress;

/// Converts a physical address into a usable reference.
pub trait PhysMapper {
    /// # Safety
    /// - `pa` must be suitably aligned for `T` and the `size_of::<T>()` bytes
    ///   starting at `pa` must be reachable through this mapper.
    /// - The caller must guarantee that no other live reference aliases the
    ///   returned one for `'a`.
    #[allow(clippy::mut_from_ref)]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

impl<M: PhysMapper> PhysMapper for &M {
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { (**self).phys_to_mut(pa) }
    }
}

/// [`PhysMapper`] for identity-mapped physical memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = pa.as_u32() as usize as *mut T;
        // SAFETY: Caller ensures the address is identity mapped and unaliased.
        unsafe { &mut *va }
    }
}

#[cfg(any(test, feature = "hosted"))]
pub use ram::RamPhysMapper;

#[cfg(any(test, feature = "hosted"))]
mod ram {
    use super::PhysMapper;
    use alloc::boxed::Box;
    use alloc::vec::Vec;
    use core::cell::UnsafeCell;
    use kernel_memory_addresses::{FRAME_SIZE, PhysicalAddress};

    #[repr(C, align(4096))]
    struct RamFrame([u8; FRAME_SIZE as usize]);

    /// Simulated physical memory: `frames` zeroed frames starting at address 0.
    pub struct RamPhysMapper {
        frames: Box<[UnsafeCell<RamFrame>]>,
    }

    // SAFETY: `phys_to_mut` callers guarantee exclusive access to what they map.
    unsafe impl Sync for RamPhysMapper {}

    impl RamPhysMapper {
        #[must_use]
        pub fn new(frames: usize) -> Self {
            let frames: Vec<_> = (0..frames)
                .map(|_| UnsafeCell::new(RamFrame([0; FRAME_SIZE as usize])))
                .collect();
            Self {
                frames: frames.into_boxed_slice(),
            }
        }

        /// Number of simulated frames.
        #[must_use]
        pub fn frames(&self) -> usize {
            self.frames.len()
        }

        /// Size of the simulated memory in bytes.
        #[must_use]
        pub fn len_bytes(&self) -> usize {
            self.frames.len() * FRAME_SIZE as usize
        }
    }

    impl PhysMapper for RamPhysMapper {
        /// # Panics
        /// If the mapped object would extend past the simulated memory or
        /// `pa` is misaligned for `T`.
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            let offset = pa.as_u32() as usize;
            assert!(
                offset + size_of::<T>() <= self.len_bytes(),
                "{pa} outside simulated RAM of {} frames",
                self.frames.len()
            );
            let base = UnsafeCell::raw_get(self.frames.as_ptr()).cast::<u8>();
            // SAFETY: bounds checked above; the allocation is contiguous.
            let ptr = unsafe { base.add(offset) }.cast::<T>();
            assert!(ptr.is_aligned(), "{pa} misaligned for the requested type");
            // SAFETY: caller guarantees exclusivity.
            unsafe { &mut *ptr }
        }
    }
}
