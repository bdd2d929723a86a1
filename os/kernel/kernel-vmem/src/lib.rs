//! # Two-Level Paging with Demand Faulting
//!
//! 32-bit, non-PAE paging for the kernel: one page directory per address
//! space, 4 KiB pages, and page tables that are created lazily by the page
//! fault handler.
//!
//! ## Virtual Address → Physical Address Walk
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | directory | table | offset |
//!
//!  CR3 → directory ─PDE→ page table ─PTE→ 4 KiB frame
//! ```
//!
//! Each level holds 1024 entries of 4 bytes ([`PageEntry`]).
//!
//! ## Recursive Mapping
//!
//! The last directory entry points at the directory itself. With paging
//! enabled this makes every paging structure of the loaded address space
//! reachable at a fixed virtual address:
//!
//! | Window | Contents |
//! |--------|----------|
//! | `0xFFC0_0000 + d * 4096` | page table for directory slot `d` |
//! | `0xFFFF_F000` | the page directory |
//!
//! [`pde_address`] and [`pte_address`] compute the entry addresses for a
//! given virtual address.
//!
//! ## Demand Paging
//!
//! Frames are only attached when touched. On a fault, [`PageTable::page_fault`]
//! asks the registered [`VmPool`]s (newest first) whether the address is
//! legitimate, then installs a page table and/or a data frame as needed. An
//! address no pool vouches for is a protection violation.
//!
//! ## Memory Access
//!
//! The paging code touches memory in two ways:
//! - physically, through a [`PhysMapper`](kernel_alloc::PhysMapper), while
//!   building a directory before paging is enabled;
//! - virtually, through a [`VirtMapper`], once translation is on.
//!
//! [`DirectMemory`] does both on bare metal. [`SoftMmu`] performs the
//! hardware walk in software so that hosted tests exercise the same paths.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod fault;
mod memory;
mod page_entry;
mod page_table;
mod recursive;
mod vm_pool;

pub use fault::{FaultCode, PageFaultError};
pub use memory::{DirectMemory, SoftMmu, VirtMapper};
pub use page_entry::{EntryTable, PageEntry};
pub use page_table::{PageTable, PageTableError};
pub use recursive::{
    DIRECTORY_WINDOW, RECURSIVE_SLOT, TABLES_WINDOW, pde_address, pte_address, table_window,
};
pub use vm_pool::{REGION_CAPACITY, Region, RegionPage, VmPool, VmPoolError, VmPoolId};
