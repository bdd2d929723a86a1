//! A primary IDE controller in memory.

use crate::Block;
use crate::ata::{
    COMMAND_PORT, DATA_PORT, DRIVE_HEAD_PORT, DiskId, DiskOperation, LBA_HIGH_PORT, LBA_LOW_PORT,
    LBA_MID_PORT, STATUS_DRQ,
};
use kernel_ports::PortIo;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// What the controller saw, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtaEvent {
    Command { disk: DiskId, op: DiskOperation, block: u32 },
    Transferred { disk: DiskId, block: u32 },
}

#[derive(Debug)]
struct Controller {
    registers: [u8; 8],
    /// Indexed by [`DiskId`].
    drives: [Vec<Block>; 2],
    buffer: Block,
    cursor: usize,
    pending: Option<(DiskId, DiskOperation, u32)>,
    latency: u32,
    polls_left: u32,
    events: Vec<AtaEvent>,
}

/// Simulated master and dependent drives behind `0x1F0`–`0x1F7`.
///
/// A command becomes ready after `latency` status reads. The data port moves
/// one word per access; after 256 words the block is committed and the
/// controller goes idle. A new command replaces the one pending.
#[derive(Debug)]
pub struct SimulatedAta {
    inner: Mutex<Controller>,
}

impl SimulatedAta {
    #[must_use]
    pub fn new(blocks: usize) -> Self {
        Self {
            inner: Mutex::new(Controller {
                registers: [0; 8],
                drives: [vec![[0; 512]; blocks], vec![[0; 512]; blocks]],
                buffer: [0; 512],
                cursor: 0,
                pending: None,
                latency: 0,
                polls_left: 0,
                events: Vec::new(),
            }),
        }
    }

    /// Status reads before a command reports DRQ.
    #[must_use]
    pub fn with_latency(self, polls: u32) -> Self {
        self.controller().latency = polls;
        self
    }

    fn controller(&self) -> MutexGuard<'_, Controller> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block `index` of the master drive.
    #[must_use]
    pub fn block(&self, index: usize) -> Block {
        self.block_on(DiskId::Master, index)
    }

    pub fn set_block(&self, index: usize, data: &Block) {
        self.set_block_on(DiskId::Master, index, data);
    }

    #[must_use]
    pub fn block_on(&self, disk: DiskId, index: usize) -> Block {
        self.controller().drives[disk as usize][index]
    }

    pub fn set_block_on(&self, disk: DiskId, index: usize, data: &Block) {
        self.controller().drives[disk as usize][index] = *data;
    }

    #[must_use]
    pub fn events(&self) -> Vec<AtaEvent> {
        self.controller().events.clone()
    }
}

impl Controller {
    fn register(&self, port: u16) -> u32 {
        u32::from(self.registers[usize::from(port - DATA_PORT)])
    }

    fn command(&mut self, code: u8) {
        let op = match code {
            0x20 => DiskOperation::Read,
            0x30 => DiskOperation::Write,
            other => panic!("unsupported ATA command {other:#04x}"),
        };
        let block = self.register(LBA_LOW_PORT)
            | self.register(LBA_MID_PORT) << 8
            | self.register(LBA_HIGH_PORT) << 16
            | (self.register(DRIVE_HEAD_PORT) & 0x0F) << 24;
        let disk = if self.register(DRIVE_HEAD_PORT) & 0x10 == 0 {
            DiskId::Master
        } else {
            DiskId::Dependent
        };
        if op == DiskOperation::Read {
            self.buffer = self.drives[disk as usize][block as usize];
        }
        self.cursor = 0;
        self.pending = Some((disk, op, block));
        self.polls_left = self.latency;
        self.events.push(AtaEvent::Command { disk, op, block });
    }

    fn advance(&mut self) {
        self.cursor += 2;
        if self.cursor == self.buffer.len()
            && let Some((disk, op, block)) = self.pending.take()
        {
            if op == DiskOperation::Write {
                self.drives[disk as usize][block as usize] = self.buffer;
            }
            self.events.push(AtaEvent::Transferred { disk, block });
        }
    }
}

impl PortIo for SimulatedAta {
    fn outb(&self, port: u16, value: u8) {
        let mut ctl = self.controller();
        if port == COMMAND_PORT {
            ctl.command(value);
        } else if (DATA_PORT..COMMAND_PORT).contains(&port) {
            ctl.registers[usize::from(port - DATA_PORT)] = value;
        }
    }

    fn inb(&self, port: u16) -> u8 {
        let mut ctl = self.controller();
        if port != COMMAND_PORT || ctl.pending.is_none() {
            return 0;
        }
        if ctl.polls_left > 0 {
            ctl.polls_left -= 1;
            return 0;
        }
        STATUS_DRQ
    }

    fn outw(&self, port: u16, value: u16) {
        let mut ctl = self.controller();
        assert_eq!(port, DATA_PORT, "word write to {port:#x}");
        assert!(
            matches!(ctl.pending, Some((_, DiskOperation::Write, _))),
            "data written without a write command"
        );
        let at = ctl.cursor;
        ctl.buffer[at..at + 2].copy_from_slice(&value.to_le_bytes());
        ctl.advance();
    }

    fn inw(&self, port: u16) -> u16 {
        let mut ctl = self.controller();
        assert_eq!(port, DATA_PORT, "word read from {port:#x}");
        assert!(
            matches!(ctl.pending, Some((_, DiskOperation::Read, _))),
            "data read without a read command"
        );
        let at = ctl.cursor;
        let word = u16::from_le_bytes([ctl.buffer[at], ctl.buffer[at + 1]]);
        ctl.advance();
        word
    }
}
