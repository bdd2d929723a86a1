//! ATA PIO, LBA28, one sector per command.

use crate::{Block, DiskError};
use kernel_ports::PortIo;
use log::trace;

pub const DATA_PORT: u16 = 0x1F0;
pub const FEATURES_PORT: u16 = 0x1F1;
pub const SECTOR_COUNT_PORT: u16 = 0x1F2;
pub const LBA_LOW_PORT: u16 = 0x1F3;
pub const LBA_MID_PORT: u16 = 0x1F4;
pub const LBA_HIGH_PORT: u16 = 0x1F5;
pub const DRIVE_HEAD_PORT: u16 = 0x1F6;
/// Command on write, status on read.
pub const COMMAND_PORT: u16 = 0x1F7;

/// Status bit: the controller has data for us or wants data from us.
pub const STATUS_DRQ: u8 = 0x08;

/// LBA mode plus the two always-set bits of the drive/head register.
const DRIVE_HEAD_LBA: u8 = 0xE0;

/// Largest addressable block with 28-bit LBA.
const LBA28_BLOCKS: u32 = 1 << 28;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskOperation {
    Read = 0x20,
    Write = 0x30,
}

/// Drive on the primary channel.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskId {
    Master = 0,
    Dependent = 1,
}

/// A drive on the primary IDE channel, driven by polling.
pub struct SimpleDisk<P> {
    ports: P,
    disk: DiskId,
    blocks: u32,
}

impl<P: PortIo> SimpleDisk<P> {
    /// A drive holding `blocks` blocks.
    pub const fn new(ports: P, disk: DiskId, blocks: u32) -> Self {
        let blocks = if blocks > LBA28_BLOCKS { LBA28_BLOCKS } else { blocks };
        Self { ports, disk, blocks }
    }

    #[must_use]
    pub const fn disk_id(&self) -> DiskId {
        self.disk
    }

    /// Number of addressable blocks.
    #[must_use]
    pub const fn blocks(&self) -> u32 {
        self.blocks
    }

    /// # Errors
    /// [`DiskError::BlockOutOfRange`] past the end of the drive.
    pub const fn check_block(&self, block: u32) -> Result<(), DiskError> {
        if block < self.blocks {
            Ok(())
        } else {
            Err(DiskError::BlockOutOfRange {
                block,
                blocks: self.blocks,
            })
        }
    }

    /// Programs the controller for one block and sends the command.
    ///
    /// # Errors
    /// [`DiskError::BlockOutOfRange`]; nothing is written to the controller.
    #[allow(clippy::cast_possible_truncation)]
    pub fn issue_operation(&self, op: DiskOperation, block: u32) -> Result<(), DiskError> {
        self.check_block(block)?;
        trace!("{op:?} block {block} on {:?}", self.disk);

        self.ports.outb(FEATURES_PORT, 0x00);
        self.ports.outb(SECTOR_COUNT_PORT, 0x01);
        self.ports.outb(LBA_LOW_PORT, block as u8);
        self.ports.outb(LBA_MID_PORT, (block >> 8) as u8);
        self.ports.outb(LBA_HIGH_PORT, (block >> 16) as u8);
        self.ports.outb(
            DRIVE_HEAD_PORT,
            ((block >> 24) & 0x0F) as u8 | DRIVE_HEAD_LBA | (self.disk as u8) << 4,
        );
        self.ports.outb(COMMAND_PORT, op as u8);
        Ok(())
    }

    /// DRQ is set: the block can be transferred.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ports.inb(COMMAND_PORT) & STATUS_DRQ != 0
    }

    /// Drains the controller's buffer into `buf`, low byte first.
    pub fn read_data(&self, buf: &mut Block) {
        for pair in buf.chunks_exact_mut(2) {
            pair.copy_from_slice(&self.ports.inw(DATA_PORT).to_le_bytes());
        }
    }

    /// Fills the controller's buffer from `buf`, low byte first.
    pub fn write_data(&self, buf: &Block) {
        for pair in buf.chunks_exact(2) {
            self.ports.outw(DATA_PORT, u16::from_le_bytes([pair[0], pair[1]]));
        }
    }

    fn spin_until_ready(&self) {
        while !self.is_ready() {
            core::hint::spin_loop();
        }
    }

    /// Reads `block`, busy-waiting for the controller.
    ///
    /// # Errors
    /// [`DiskError::BlockOutOfRange`].
    pub fn read(&self, block: u32, buf: &mut Block) -> Result<(), DiskError> {
        self.issue_operation(DiskOperation::Read, block)?;
        self.spin_until_ready();
        self.read_data(buf);
        Ok(())
    }

    /// Writes `block`, busy-waiting for the controller.
    ///
    /// # Errors
    /// [`DiskError::BlockOutOfRange`].
    pub fn write(&self, block: u32, buf: &Block) -> Result<(), DiskError> {
        self.issue_operation(DiskOperation::Write, block)?;
        self.spin_until_ready();
        self.write_data(buf);
        Ok(())
    }
}
