//! Virtual memory access for the paging code.

use crate::page_entry::EntryTable;
use kernel_alloc::PhysMapper;
use kernel_memory_addresses::{FRAME_SIZE, PhysicalAddress, VirtualAddress};
use kernel_registers::ControlRegisters;

/// Converts a virtual address into a usable reference under the current
/// translation.
pub trait VirtMapper {
    /// Returns `None` when `va` does not translate.
    ///
    /// # Safety
    /// - `va` must be suitably aligned for `T` and the object must not cross
    ///   a page boundary.
    /// - The caller must guarantee that no other live reference aliases the
    ///   returned one for `'a`.
    #[allow(clippy::mut_from_ref)]
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> Option<&'a mut T>;
}

impl<M: VirtMapper> VirtMapper for &M {
    #[inline]
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> Option<&'a mut T> {
        unsafe { (**self).virt_to_mut(va) }
    }
}

/// Memory access on bare metal.
///
/// Physical addresses are used as pointers directly, which holds before paging
/// is enabled and for the identity-mapped first 4 MiB afterwards. Virtual
/// addresses are always dereferenced; a missing translation raises a real
/// page fault.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectMemory;

impl PhysMapper for DirectMemory {
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = pa.as_u32() as usize as *mut T;
        // SAFETY: Caller ensures the address is identity mapped and unaliased.
        unsafe { &mut *ptr }
    }
}

impl VirtMapper for DirectMemory {
    #[inline]
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> Option<&'a mut T> {
        let ptr = va.as_u32() as usize as *mut T;
        // SAFETY: Caller ensures exclusivity; the MMU resolves the translation.
        Some(unsafe { &mut *ptr })
    }
}

/// An MMU in software.
///
/// Resolves virtual addresses with the same two-level walk the CPU performs,
/// reading `CR0`/`CR3` from `regs` and the paging structures from `ram`.
/// With `CR0.PG` clear, virtual equals physical.
pub struct SoftMmu<'m, M, R> {
    ram: &'m M,
    regs: &'m R,
}

impl<M, R> Clone for SoftMmu<'_, M, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M, R> Copy for SoftMmu<'_, M, R> {}

impl<'m, M: PhysMapper, R: ControlRegisters> SoftMmu<'m, M, R> {
    pub const fn new(ram: &'m M, regs: &'m R) -> Self {
        Self { ram, regs }
    }

    /// Physical address `va` translates to, or `None` if a level is absent.
    #[must_use]
    pub fn walk(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        if !self.regs.read_cr0().pg_paging() {
            return Some(PhysicalAddress::new(va.as_u32()));
        }

        let directory = self.regs.read_cr3().directory_phys();
        // SAFETY: paging structures are frame-sized and frame-aligned; only read here.
        let pde =
            unsafe { self.ram.phys_to_mut::<EntryTable>(directory) }.get(va.directory_index());
        if !pde.present() {
            return None;
        }

        // SAFETY: as above.
        let pte = unsafe { self.ram.phys_to_mut::<EntryTable>(pde.frame().base()) }
            .get(va.table_index());
        if !pte.present() {
            return None;
        }

        Some(pte.frame().base() + va.page_offset())
    }
}

impl<M: PhysMapper, R> PhysMapper for SoftMmu<'_, M, R> {
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { self.ram.phys_to_mut(pa) }
    }
}

impl<M: PhysMapper, R: ControlRegisters> VirtMapper for SoftMmu<'_, M, R> {
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> Option<&'a mut T> {
        debug_assert!(
            va.page_offset() as usize + size_of::<T>() <= FRAME_SIZE as usize,
            "object at {va} crosses a page boundary"
        );
        let pa = self.walk(va)?;
        // SAFETY: forwarded to the caller.
        Some(unsafe { self.ram.phys_to_mut(pa) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_entry::PageEntry;
    use kernel_alloc::RamPhysMapper;
    use kernel_memory_addresses::FrameNumber;
    use kernel_registers::{Cr0, Cr3, SoftRegisters};

    #[test]
    fn identity_while_paging_is_off() {
        let ram = RamPhysMapper::new(4);
        let regs = SoftRegisters::new();
        let mmu = SoftMmu::new(&ram, &regs);
        assert_eq!(
            mmu.walk(VirtualAddress::new(0x1234)),
            Some(PhysicalAddress::new(0x1234))
        );
    }

    #[test]
    fn walks_two_levels() {
        let ram = RamPhysMapper::new(8);
        let regs = SoftRegisters::new();

        unsafe {
            let dir = ram.phys_to_mut::<EntryTable>(PhysicalAddress::new(0x1000));
            dir.fill(PageEntry::vacant());
            dir.set(0x100, PageEntry::mapping(FrameNumber::new(2)));
            let table = ram.phys_to_mut::<EntryTable>(PhysicalAddress::new(0x2000));
            table.fill(PageEntry::vacant());
            table.set(3, PageEntry::mapping(FrameNumber::new(5)));
            regs.write_cr3(Cr3::from_directory(FrameNumber::new(1)));
            regs.write_cr0(Cr0::new().with_pg_paging(true));
        }

        let mmu = SoftMmu::new(&ram, &regs);
        let va = VirtualAddress::new(0x4000_3ABC);
        assert_eq!(mmu.walk(va), Some(PhysicalAddress::new(0x5ABC)));
        assert_eq!(mmu.walk(VirtualAddress::new(0x4000_4000)), None);
        assert_eq!(mmu.walk(VirtualAddress::new(0x0)), None);

        unsafe {
            *mmu.virt_to_mut::<u32>(va.page_base()).unwrap() = 0xC0FF_EE00;
            assert_eq!(*ram.phys_to_mut::<u32>(PhysicalAddress::new(0x5000)), 0xC0FF_EE00);
        }
    }
}
