use core::fmt;

/// Opaque handle of a kernel thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u32);

impl ThreadId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// In the ready queue.
    Ready,
    /// Holding the CPU.
    Running,
    /// Neither queued nor running: parked on a device, or never resumed.
    Blocked,
}

/// Transfers the CPU between threads.
pub trait Dispatcher {
    /// The thread holding the CPU.
    fn current(&self) -> ThreadId;

    /// Switches to `next`. Returns once the calling thread is dispatched
    /// again; immediately if `next` is the caller.
    fn dispatch_to(&self, next: ThreadId);
}

impl<D: Dispatcher + ?Sized> Dispatcher for &D {
    #[inline]
    fn current(&self) -> ThreadId {
        (**self).current()
    }

    #[inline]
    fn dispatch_to(&self, next: ThreadId) {
        (**self).dispatch_to(next);
    }
}
