//! # Block Devices
//!
//! Two layers over the primary IDE controller:
//!
//! - [`SimpleDisk`] speaks ATA PIO through a [`PortIo`](kernel_ports::PortIo):
//!   it issues single-block reads and writes and polls the status register.
//! - [`BlockingDisk`] turns the polling into waiting: the issuing thread
//!   parks on the disk's queue and gives up the CPU. The scheduler polls the
//!   disk as a [`WaitSource`](kernel_sched::WaitSource) on every yield and
//!   requeues the thread once the controller has the block.
//! - [`MirroredDisk`] keeps the master and dependent drives identical: reads
//!   go to both and take the first answer, writes go to each in turn.
//!
//! ```text
//! thread                 BlockingDisk                 Scheduler
//!   │ read(block) ─────────► enqueue, issue              │
//!   │                        yield_now ─────────────────►│ dispatch others
//!   │                                                    │ ...
//!   │                        wake_next ◄──── every yield │ device ready?
//!   │ ◄────────────────────────────────── resumed later  │
//!   │ 256 words from 0x1F0, issue next queued request    │
//! ```
//!
//! Only one operation is in flight at a time. A thread whose request queues
//! behind another waits until the thread before it has drained its block.

#![cfg_attr(not(any(test, doctest, feature = "hosted")), no_std)]
#![deny(unsafe_code)]

mod ata;
mod blocking_disk;
mod mirrored_disk;
#[cfg(any(test, feature = "hosted"))]
pub mod sim;
mod wait_queue;

pub use ata::{
    COMMAND_PORT, DATA_PORT, DRIVE_HEAD_PORT, DiskId, DiskOperation, FEATURES_PORT, LBA_HIGH_PORT,
    LBA_LOW_PORT, LBA_MID_PORT, SECTOR_COUNT_PORT, STATUS_DRQ, SimpleDisk,
};
pub use blocking_disk::BlockingDisk;
pub use mirrored_disk::MirroredDisk;

use kernel_sched::SchedulerError;

/// One disk block.
pub type Block = [u8; kernel_info::DISK_BLOCK_SIZE];

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum DiskError {
    #[error("block {block} is beyond the end of a {blocks}-block disk")]
    BlockOutOfRange { block: u32, blocks: u32 },
    #[error("the disk wait queue is full")]
    QueueFull,
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}
