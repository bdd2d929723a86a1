use crate::ata::{DiskId, DiskOperation, SimpleDisk};
use crate::wait_queue::{DiskQueue, Request};
use crate::{Block, DiskError};
use kernel_ports::PortIo;
use kernel_sched::{CooperativeScheduler, ThreadId, WaitSource};
use kernel_sync::{InterruptControl, SpinLock};
use log::{debug, trace, warn};

/// Master and dependent drive holding the same blocks.
///
/// A read is sent to both drives and completes with whichever answers; a
/// write goes to the master first, then to the dependent. Both drives share
/// one wait queue, so one mirrored operation is in flight at a time.
pub struct MirroredDisk<P, I> {
    master: SimpleDisk<P>,
    dependent: SimpleDisk<P>,
    irq: I,
    state: SpinLock<DiskQueue>,
}

impl<P: PortIo + Clone, I: InterruptControl> MirroredDisk<P, I> {
    /// Mirrors `blocks` blocks across both drives of the channel behind `ports`.
    pub fn new(ports: P, blocks: u32, irq: I) -> Self {
        Self {
            master: SimpleDisk::new(ports.clone(), DiskId::Master, blocks),
            dependent: SimpleDisk::new(ports, DiskId::Dependent, blocks),
            irq,
            state: SpinLock::new(DiskQueue::new()),
        }
    }
}

impl<P: PortIo, I: InterruptControl> MirroredDisk<P, I> {
    #[must_use]
    pub const fn blocks(&self) -> u32 {
        self.master.blocks()
    }

    /// Threads parked on the pair.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.state.lock_irq(&self.irq).len()
    }

    /// Reads `block` from whichever drive delivers it first.
    ///
    /// # Errors
    /// As for [`BlockingDisk::read`](crate::BlockingDisk::read).
    pub fn read<S>(&self, sched: &S, block: u32, buf: &mut Block) -> Result<(), DiskError>
    where
        S: CooperativeScheduler + ?Sized,
    {
        self.wait_for_device(sched, DiskOperation::Read, block, None)?;
        // Both drives answer on the same data port.
        self.master.read_data(buf);
        self.finish(block);
        Ok(())
    }

    /// Writes `buf` to `block` on the master, then on the dependent.
    ///
    /// # Errors
    /// As for [`BlockingDisk::write`](crate::BlockingDisk::write). An error
    /// while waiting for the dependent leaves the master already written.
    pub fn write<S>(&self, sched: &S, block: u32, buf: &Block) -> Result<(), DiskError>
    where
        S: CooperativeScheduler + ?Sized,
    {
        for drive in [&self.master, &self.dependent] {
            self.wait_for_device(sched, DiskOperation::Write, block, Some(drive.disk_id()))?;
            drive.write_data(buf);
            self.finish(block);
        }
        Ok(())
    }

    fn wait_for_device<S>(
        &self,
        sched: &S,
        op: DiskOperation,
        block: u32,
        drive: Option<DiskId>,
    ) -> Result<(), DiskError>
    where
        S: CooperativeScheduler + ?Sized,
    {
        self.master.check_block(block)?;
        let thread = sched.current();
        let request = Request {
            thread,
            op,
            block,
            drive,
        };
        {
            let mut state = self.state.lock_irq(&self.irq);
            if state.push(request)? {
                if let Err(e) = self.issue(request) {
                    state.withdraw(thread);
                    return Err(e);
                }
            } else {
                debug!("{thread} queues mirrored {op:?} of block {block}");
            }
        }
        trace!("{thread} waits for mirrored block {block}");
        if let Err(e) = sched.yield_now() {
            warn!("{thread} gave up waiting for mirrored block {block}: {e}");
            let mut state = self.state.lock_irq(&self.irq);
            if let Some(next) = state.withdraw(thread) {
                self.issue_next(&mut state, next);
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn issue(&self, request: Request) -> Result<(), DiskError> {
        let Request { op, block, .. } = request;
        match request.drive {
            Some(DiskId::Master) => self.master.issue_operation(op, block),
            Some(DiskId::Dependent) => self.dependent.issue_operation(op, block),
            None => {
                self.master.issue_operation(op, block)?;
                self.dependent.issue_operation(op, block)
            }
        }
    }

    fn finish(&self, block: u32) {
        let mut state = self.state.lock_irq(&self.irq);
        if let Some(next) = state.finish() {
            self.issue_next(&mut state, next);
        }
        trace!("mirrored block {block} done");
    }

    fn issue_next(&self, state: &mut DiskQueue, next: Request) {
        if self.issue(next).is_err() {
            state.withdraw(next.thread);
        }
    }
}

impl<P, I> WaitSource for MirroredDisk<P, I>
where
    P: PortIo + Sync,
    I: InterruptControl + Sync,
{
    fn wake_next(&self) -> Option<ThreadId> {
        // Status is shared by the channel; the master view is enough.
        self.state.lock().wake(|| self.master.is_ready())
    }
}
