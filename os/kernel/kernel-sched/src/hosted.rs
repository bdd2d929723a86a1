//! Dispatchers for running kernel code on a host.
//!
//! [`RecordingDispatcher`] switches nothing and only remembers who was
//! dispatched; good enough for single-threaded scheduling logic.
//! [`BatonDispatcher`] maps each kernel thread onto an OS thread and passes a
//! baton so that exactly one of them runs at a time.

use crate::{Dispatcher, ThreadId};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Records dispatches without switching stacks.
#[derive(Debug)]
pub struct RecordingDispatcher {
    inner: Mutex<(ThreadId, Vec<ThreadId>)>,
}

impl RecordingDispatcher {
    #[must_use]
    pub const fn new(initial: ThreadId) -> Self {
        Self {
            inner: Mutex::new((initial, Vec::new())),
        }
    }

    /// Every thread dispatched so far, in order.
    pub fn history(&self) -> Vec<ThreadId> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).1.clone()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn current(&self) -> ThreadId {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).0
    }

    fn dispatch_to(&self, next: ThreadId) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.0 = next;
        inner.1.push(next);
    }
}

#[derive(Debug)]
struct Baton {
    running: ThreadId,
    released: bool,
    history: Vec<ThreadId>,
}

/// One OS thread per kernel thread; only the baton holder runs.
///
/// Threads other than the initial one call [`wait_for_turn`](Self::wait_for_turn)
/// before touching the scheduler. [`release_all`](Self::release_all) lets every
/// parked thread return so that the host threads can be joined.
#[derive(Debug)]
pub struct BatonDispatcher {
    baton: Mutex<Baton>,
    turn: Condvar,
}

impl BatonDispatcher {
    #[must_use]
    pub const fn new(initial: ThreadId) -> Self {
        Self {
            baton: Mutex::new(Baton {
                running: initial,
                released: false,
                history: Vec::new(),
            }),
            turn: Condvar::new(),
        }
    }

    fn baton(&self) -> MutexGuard<'_, Baton> {
        self.baton.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until `me` holds the baton or the dispatcher is released.
    pub fn wait_for_turn(&self, me: ThreadId) {
        let mut baton = self.baton();
        while baton.running != me && !baton.released {
            baton = self.turn.wait(baton).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wakes every parked thread for good.
    pub fn release_all(&self) {
        self.baton().released = true;
        self.turn.notify_all();
    }

    pub fn history(&self) -> Vec<ThreadId> {
        self.baton().history.clone()
    }
}

impl Dispatcher for BatonDispatcher {
    fn current(&self) -> ThreadId {
        self.baton().running
    }

    fn dispatch_to(&self, next: ThreadId) {
        let me = {
            let mut baton = self.baton();
            let me = baton.running;
            baton.running = next;
            baton.history.push(next);
            me
        };
        self.turn.notify_all();
        self.wait_for_turn(me);
    }
}
