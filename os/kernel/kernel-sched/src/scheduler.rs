use crate::queue::ReadyQueue;
use crate::thread::{Dispatcher, ThreadId, ThreadState};
use kernel_sync::{InterruptControl, IrqGuard, SpinLock};
use log::{debug, error, trace};

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("cannot queue {0}: the ready queue is full")]
    ReadyQueueFull(ThreadId),
    /// Nothing to dispatch. A complete system keeps an idle thread ready.
    #[error("no runnable thread")]
    NoRunnableThread,
}

/// A device that parks threads until an operation completes.
pub trait WaitSource: Sync {
    /// If the device finished and its waiter has not been woken yet, removes
    /// and returns that waiter.
    fn wake_next(&self) -> Option<ThreadId>;
}

/// Tick source of the round-robin variant.
pub trait QuantumTimer: Sync {
    /// Starts a fresh quantum for the thread about to run.
    fn reset_ticks(&self);
}

/// The operations threads and devices use to give up the CPU.
pub trait CooperativeScheduler {
    fn current(&self) -> ThreadId;

    /// Hands the CPU to the next ready thread.
    ///
    /// The caller is not re-queued; call [`resume`](Self::resume) on it first
    /// to stay runnable.
    ///
    /// # Errors
    /// [`SchedulerError::NoRunnableThread`] if the ready queue is empty.
    fn yield_now(&self) -> Result<(), SchedulerError>;

    /// Appends `thread` to the ready queue.
    ///
    /// # Errors
    /// [`SchedulerError::ReadyQueueFull`] at capacity.
    fn resume(&self, thread: ThreadId) -> Result<(), SchedulerError>;

    /// Makes a new thread runnable.
    ///
    /// # Errors
    /// See [`resume`](Self::resume).
    fn add(&self, thread: ThreadId) -> Result<(), SchedulerError> {
        self.resume(thread)
    }

    /// Stops scheduling `thread`. Terminating the running thread yields.
    ///
    /// # Errors
    /// See [`yield_now`](Self::yield_now).
    fn terminate(&self, thread: ThreadId) -> Result<(), SchedulerError>;
}

/// FIFO scheduler over a bounded ready queue.
pub struct Scheduler<'a, D, I> {
    ready: SpinLock<ReadyQueue>,
    dispatcher: D,
    irq: I,
    wait_source: Option<&'a dyn WaitSource>,
    timer: Option<&'a dyn QuantumTimer>,
}

impl<'a, D: Dispatcher, I: InterruptControl> Scheduler<'a, D, I> {
    pub const fn new(dispatcher: D, irq: I) -> Self {
        Self {
            ready: SpinLock::new(ReadyQueue::new()),
            dispatcher,
            irq,
            wait_source: None,
            timer: None,
        }
    }

    /// Polls `source` on every yield.
    #[must_use]
    pub fn with_wait_source(mut self, source: &'a dyn WaitSource) -> Self {
        self.wait_source = Some(source);
        self
    }

    /// Round-robin: `timer` restarts its quantum on every dispatch.
    #[must_use]
    pub fn with_timer(mut self, timer: &'a dyn QuantumTimer) -> Self {
        self.timer = Some(timer);
        self
    }

    /// End-of-quantum action: re-queues the running thread and yields.
    ///
    /// # Errors
    /// See [`CooperativeScheduler::resume`].
    pub fn preempt(&self) -> Result<(), SchedulerError> {
        let current = self.dispatcher.current();
        trace!("quantum of {current} expired");
        self.resume(current)?;
        self.yield_now()
    }

    #[must_use]
    pub fn state_of(&self, thread: ThreadId) -> ThreadState {
        if self.dispatcher.current() == thread {
            return ThreadState::Running;
        }
        if self.ready.lock_irq(&self.irq).contains(thread) {
            ThreadState::Ready
        } else {
            ThreadState::Blocked
        }
    }

    /// Number of threads in the ready queue.
    #[must_use]
    pub fn ready_len(&self) -> usize {
        self.ready.lock_irq(&self.irq).len()
    }
}

impl<D: Dispatcher, I: InterruptControl> CooperativeScheduler for Scheduler<'_, D, I> {
    fn current(&self) -> ThreadId {
        self.dispatcher.current()
    }

    fn yield_now(&self) -> Result<(), SchedulerError> {
        // Interrupts stay off until this thread runs again.
        let _irq = IrqGuard::new(&self.irq);

        let next = {
            let mut ready = self.ready.lock();
            // A woken waiter has left the device queue; only wake with room for it.
            if ready.is_full() {
                debug!("ready queue full, completed waits stay parked");
            } else if let Some(woken) = self.wait_source.and_then(WaitSource::wake_next) {
                trace!("{woken} completed its wait");
                ready.enqueue(woken).map_err(|_| {
                    error!("ready queue overflow waking {woken}");
                    SchedulerError::ReadyQueueFull(woken)
                })?;
            }
            ready.dequeue().ok_or(SchedulerError::NoRunnableThread)?
        };

        if let Some(timer) = self.timer {
            timer.reset_ticks();
        }
        trace!("dispatching {next}");
        self.dispatcher.dispatch_to(next);
        Ok(())
    }

    fn resume(&self, thread: ThreadId) -> Result<(), SchedulerError> {
        self.ready.lock_irq(&self.irq).enqueue(thread).map_err(|_| {
            error!("ready queue overflow resuming {thread}");
            SchedulerError::ReadyQueueFull(thread)
        })
    }

    fn terminate(&self, thread: ThreadId) -> Result<(), SchedulerError> {
        if self.dispatcher.current() == thread {
            debug!("{thread} terminates itself");
            return self.yield_now();
        }
        let removed = self.ready.lock_irq(&self.irq).remove(thread);
        debug!("terminated {thread} (was queued: {removed})");
        Ok(())
    }
}
