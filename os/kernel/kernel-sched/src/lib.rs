//! # Cooperative Scheduling
//!
//! One CPU, one running thread, and control changes hands only when the
//! running thread asks for it. The [`Scheduler`] keeps a bounded FIFO of
//! ready threads and hands the CPU to its head on every
//! [`yield_now`](CooperativeScheduler::yield_now).
//!
//! ```text
//!            resume / add                 yield_now
//!   ┌─────────┐ ────────► ┌───────┐ ─────────────────► ┌─────────┐
//!   │ Blocked │           │ Ready │                    │ Running │
//!   └─────────┘ ◄──────── └───────┘ ◄───────────────── └─────────┘
//!        ▲      wait source           preempt              │
//!        └────────────────────────────────────────────────-┘
//!                     yield_now without resume
//! ```
//!
//! Threads are opaque [`ThreadId`]s. Switching stacks is the job of a
//! [`Dispatcher`]; the scheduler only decides who runs next.
//!
//! A device with waiting threads registers as a [`WaitSource`]. Every yield
//! polls it once and moves a thread whose operation completed back into the
//! ready queue, so completion needs no interrupt.
//!
//! ```
//! use kernel_sched::{CooperativeScheduler, Scheduler, ThreadId};
//! use kernel_sched::hosted::RecordingDispatcher;
//! use kernel_sync::SoftInterrupts;
//!
//! let main = ThreadId::new(0);
//! let sched = Scheduler::new(RecordingDispatcher::new(main), SoftInterrupts::default());
//! sched.add(ThreadId::new(1)).unwrap();
//! sched.add(ThreadId::new(2)).unwrap();
//! sched.yield_now().unwrap();
//! assert_eq!(sched.current(), ThreadId::new(1));
//! ```

#![cfg_attr(not(any(test, doctest, feature = "hosted")), no_std)]
#![deny(unsafe_code)]

#[cfg(any(test, feature = "hosted"))]
pub mod hosted;
mod queue;
mod scheduler;
mod thread;

pub use queue::{BoundedQueue, QueueFull, ReadyQueue};
pub use scheduler::{CooperativeScheduler, QuantumTimer, Scheduler, SchedulerError, WaitSource};
pub use thread::{Dispatcher, ThreadId, ThreadState};
