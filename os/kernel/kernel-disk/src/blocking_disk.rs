use crate::ata::{DiskOperation, SimpleDisk};
use crate::wait_queue::{DiskQueue, Request};
use crate::{Block, DiskError};
use kernel_ports::PortIo;
use kernel_sched::{CooperativeScheduler, ThreadId, WaitSource};
use kernel_sync::{InterruptControl, SpinLock};
use log::{debug, trace, warn};

/// A [`SimpleDisk`] that parks the caller instead of spinning.
pub struct BlockingDisk<P, I> {
    disk: SimpleDisk<P>,
    irq: I,
    state: SpinLock<DiskQueue>,
}

impl<P: PortIo, I: InterruptControl> BlockingDisk<P, I> {
    pub const fn new(disk: SimpleDisk<P>, irq: I) -> Self {
        Self {
            disk,
            irq,
            state: SpinLock::new(DiskQueue::new()),
        }
    }

    #[must_use]
    pub const fn device(&self) -> &SimpleDisk<P> {
        &self.disk
    }

    /// The device has a block ready and someone waits for it.
    #[must_use]
    pub fn disk_ready(&self) -> bool {
        !self.state.lock_irq(&self.irq).is_empty() && self.disk.is_ready()
    }

    /// A waiter was woken and has not drained its block yet.
    #[must_use]
    pub fn is_waiting_for_cpu(&self) -> bool {
        self.state.lock_irq(&self.irq).is_waiting_for_cpu()
    }

    /// Threads parked on the disk.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.state.lock_irq(&self.irq).len()
    }

    /// Reads `block` into `buf`, yielding while the controller works.
    ///
    /// # Errors
    /// [`DiskError::BlockOutOfRange`], [`DiskError::QueueFull`], or a
    /// scheduler error if nothing else can run. On error the request is
    /// dropped and the device moves on to the next waiter.
    pub fn read<S>(&self, sched: &S, block: u32, buf: &mut Block) -> Result<(), DiskError>
    where
        S: CooperativeScheduler + ?Sized,
    {
        self.wait_for_device(sched, DiskOperation::Read, block)?;
        self.disk.read_data(buf);
        self.finish(block);
        Ok(())
    }

    /// Writes `buf` to `block`, yielding until the controller accepts data.
    ///
    /// # Errors
    /// As for [`BlockingDisk::read`].
    pub fn write<S>(&self, sched: &S, block: u32, buf: &Block) -> Result<(), DiskError>
    where
        S: CooperativeScheduler + ?Sized,
    {
        self.wait_for_device(sched, DiskOperation::Write, block)?;
        self.disk.write_data(buf);
        self.finish(block);
        Ok(())
    }

    /// Queues the request, issues it if the device is idle, and yields.
    /// Returns once the scheduler resumed us with our block ready.
    fn wait_for_device<S>(&self, sched: &S, op: DiskOperation, block: u32) -> Result<(), DiskError>
    where
        S: CooperativeScheduler + ?Sized,
    {
        self.disk.check_block(block)?;
        let thread = sched.current();
        let request = Request {
            thread,
            op,
            block,
            drive: Some(self.disk.disk_id()),
        };
        {
            let mut state = self.state.lock_irq(&self.irq);
            if state.push(request)? {
                if let Err(e) = self.disk.issue_operation(op, block) {
                    state.withdraw(thread);
                    return Err(e);
                }
            } else {
                debug!("{thread} queues {op:?} of block {block} behind the operation in flight");
            }
        }
        trace!("{thread} waits for block {block}");
        if let Err(e) = sched.yield_now() {
            warn!("{thread} gave up waiting for block {block}: {e}");
            self.withdraw(thread);
            return Err(e.into());
        }
        Ok(())
    }

    /// Drops the parked request of `thread` and issues whatever replaces it.
    fn withdraw(&self, thread: ThreadId) {
        let mut state = self.state.lock_irq(&self.irq);
        if let Some(next) = state.withdraw(thread) {
            self.issue_next(&mut state, next);
        }
    }

    /// Hands the device to the next queued request.
    fn finish(&self, block: u32) {
        let mut state = self.state.lock_irq(&self.irq);
        if let Some(next) = state.finish() {
            self.issue_next(&mut state, next);
        }
        trace!("block {block} done");
    }

    fn issue_next(&self, state: &mut DiskQueue, next: Request) {
        // Already range checked when queued.
        if self.disk.issue_operation(next.op, next.block).is_err() {
            state.withdraw(next.thread);
        }
    }
}

impl<P, I> WaitSource for BlockingDisk<P, I>
where
    P: PortIo + Sync,
    I: InterruptControl + Sync,
{
    fn wake_next(&self) -> Option<ThreadId> {
        // Called from the scheduler with interrupts masked.
        self.state.lock().wake(|| self.disk.is_ready())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DiskId;
    use crate::sim::{AtaEvent, SimulatedAta};
    use kernel_sched::hosted::RecordingDispatcher;
    use kernel_sched::{Scheduler, SchedulerError};
    use kernel_sync::SoftInterrupts;
    use std::cell::Cell;

    const ME: ThreadId = ThreadId::new(1);

    /// Fails the next yield, then defers to `inner`.
    struct Stalled<'a, S> {
        inner: &'a S,
        fail_next: Cell<bool>,
    }

    impl<S: CooperativeScheduler> CooperativeScheduler for Stalled<'_, S> {
        fn current(&self) -> ThreadId {
            self.inner.current()
        }

        fn yield_now(&self) -> Result<(), SchedulerError> {
            if self.fail_next.replace(false) {
                return Err(SchedulerError::NoRunnableThread);
            }
            self.inner.yield_now()
        }

        fn resume(&self, thread: ThreadId) -> Result<(), SchedulerError> {
            self.inner.resume(thread)
        }

        fn terminate(&self, thread: ThreadId) -> Result<(), SchedulerError> {
            self.inner.terminate(thread)
        }
    }

    #[test]
    fn sole_thread_resumes_itself_once_the_block_is_ready() {
        let ata = SimulatedAta::new(8);
        let disk = BlockingDisk::new(
            SimpleDisk::new(&ata, DiskId::Master, 8),
            SoftInterrupts::default(),
        );
        let sched = Scheduler::new(RecordingDispatcher::new(ME), SoftInterrupts::default())
            .with_wait_source(&disk);

        let block: Block = core::array::from_fn(|i| (i * 7) as u8);
        disk.write(&sched, 3, &block).unwrap();
        assert_eq!(ata.block(3), block);

        let mut back = [0; 512];
        disk.read(&sched, 3, &mut back).unwrap();
        assert_eq!(back, block);
        assert_eq!(disk.waiting(), 0);
        assert!(!disk.is_waiting_for_cpu());
    }

    #[test]
    fn not_ready_without_waiters() {
        let ata = SimulatedAta::new(8);
        let disk = BlockingDisk::new(
            SimpleDisk::new(&ata, DiskId::Master, 8),
            SoftInterrupts::default(),
        );
        assert!(!disk.disk_ready());
        assert_eq!(disk.wake_next(), None);
    }

    #[test]
    fn rejected_block_leaves_the_queue_alone() {
        let ata = SimulatedAta::new(8);
        let disk = BlockingDisk::new(
            SimpleDisk::new(&ata, DiskId::Master, 8),
            SoftInterrupts::default(),
        );
        let sched = Scheduler::new(RecordingDispatcher::new(ME), SoftInterrupts::default());
        let mut buf = [0; 512];
        assert_eq!(
            disk.read(&sched, 8, &mut buf),
            Err(DiskError::BlockOutOfRange { block: 8, blocks: 8 })
        );
        assert_eq!(disk.waiting(), 0);
        assert!(ata.events().is_empty());
    }

    #[test]
    fn failed_wait_does_not_leave_a_stale_request_behind() {
        let ata = SimulatedAta::new(8);
        ata.set_block(1, &[0x11; 512]);
        ata.set_block(2, &[0x22; 512]);
        let disk = BlockingDisk::new(
            SimpleDisk::new(&ata, DiskId::Master, 8),
            SoftInterrupts::default(),
        );
        let sched = Scheduler::new(RecordingDispatcher::new(ME), SoftInterrupts::default())
            .with_wait_source(&disk);
        let stalled = Stalled {
            inner: &sched,
            fail_next: Cell::new(true),
        };

        let mut buf = [0; 512];
        assert_eq!(
            disk.read(&stalled, 1, &mut buf),
            Err(DiskError::Scheduler(SchedulerError::NoRunnableThread))
        );
        assert_eq!(disk.waiting(), 0);
        assert!(!disk.disk_ready());

        disk.read(&stalled, 2, &mut buf).unwrap();
        assert_eq!(buf, [0x22; 512]);
        assert_eq!(disk.waiting(), 0);
        assert_eq!(
            ata.events(),
            [
                AtaEvent::Command { disk: DiskId::Master, op: DiskOperation::Read, block: 1 },
                AtaEvent::Command { disk: DiskId::Master, op: DiskOperation::Read, block: 2 },
                AtaEvent::Transferred { disk: DiskId::Master, block: 2 },
            ]
        );
    }
}
