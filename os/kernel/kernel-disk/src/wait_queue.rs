//! Waiters of a disk and the one operation in flight.

use crate::DiskError;
use crate::ata::{DiskId, DiskOperation};
use kernel_info::sched::READY_QUEUE_CAPACITY;
use kernel_sched::{BoundedQueue, ThreadId};

/// A queued transfer. The head of the queue is the one issued to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub thread: ThreadId,
    pub op: DiskOperation,
    pub block: u32,
    /// Target drive; `None` addresses every drive behind the disk.
    pub drive: Option<DiskId>,
}

#[derive(Debug)]
pub struct DiskQueue {
    waiters: BoundedQueue<Request, READY_QUEUE_CAPACITY>,
    /// A command has been sent and its block not yet drained.
    busy: bool,
    /// The woken waiter has not yet moved its block.
    waiting_for_cpu: bool,
}

impl Default for DiskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskQueue {
    pub const fn new() -> Self {
        Self {
            waiters: BoundedQueue::new(),
            busy: false,
            waiting_for_cpu: false,
        }
    }

    pub const fn len(&self) -> usize {
        self.waiters.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    pub const fn is_waiting_for_cpu(&self) -> bool {
        self.waiting_for_cpu
    }

    /// Queues `request`. Returns `true` if the device is idle and the caller
    /// must issue it now.
    pub fn push(&mut self, request: Request) -> Result<bool, DiskError> {
        self.waiters
            .enqueue(request)
            .map_err(|_| DiskError::QueueFull)?;
        if self.busy {
            return Ok(false);
        }
        self.busy = true;
        Ok(true)
    }

    /// Takes the head waiter off the queue if the operation in flight is its
    /// own and `device_ready` confirms the block is there.
    pub fn wake(&mut self, device_ready: impl FnOnce() -> bool) -> Option<ThreadId> {
        if !self.busy || self.waiting_for_cpu || self.waiters.is_empty() || !device_ready() {
            return None;
        }
        let request = self.waiters.dequeue()?;
        self.waiting_for_cpu = true;
        Some(request.thread)
    }

    /// The woken waiter moved its block. Returns the request to issue next.
    pub fn finish(&mut self) -> Option<Request> {
        self.waiting_for_cpu = false;
        self.advance()
    }

    /// Drops the request of `thread`, which gave up before being woken.
    ///
    /// Returns the request to issue next if the dropped one was in flight.
    pub fn withdraw(&mut self, thread: ThreadId) -> Option<Request> {
        let head = self.waiters.head()?;
        let request = self.waiters.iter().find(|r| r.thread == thread)?;
        self.waiters.remove(request);
        if request == head && self.busy && !self.waiting_for_cpu {
            self.advance()
        } else {
            None
        }
    }

    fn advance(&mut self) -> Option<Request> {
        let next = self.waiters.head();
        self.busy = next.is_some();
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ThreadId = ThreadId::new(1);
    const B: ThreadId = ThreadId::new(2);

    fn read(thread: ThreadId, block: u32) -> Request {
        Request {
            thread,
            op: DiskOperation::Read,
            block,
            drive: None,
        }
    }

    #[test]
    fn only_the_first_request_is_issued_immediately() {
        let mut q = DiskQueue::new();
        assert_eq!(q.push(read(A, 1)), Ok(true));
        assert_eq!(q.push(read(B, 2)), Ok(false));
        assert_eq!(q.wake(|| false), None);
        assert_eq!(q.wake(|| true), Some(A));
        assert!(q.is_waiting_for_cpu());
        assert_eq!(q.wake(|| true), None, "B's block is not issued yet");
        assert_eq!(q.finish(), Some(read(B, 2)));
        assert_eq!(q.wake(|| true), Some(B));
        assert_eq!(q.finish(), None);
        assert_eq!(q.push(read(A, 3)), Ok(true));
    }

    #[test]
    fn withdrawing_the_request_in_flight_hands_the_device_on() {
        let mut q = DiskQueue::new();
        q.push(read(A, 1)).unwrap();
        q.push(read(B, 2)).unwrap();
        assert_eq!(q.withdraw(A), Some(read(B, 2)));
        assert_eq!(q.len(), 1);
        assert_eq!(q.wake(|| true), Some(B));
    }

    #[test]
    fn withdrawing_a_queued_request_keeps_the_one_in_flight() {
        let mut q = DiskQueue::new();
        q.push(read(A, 1)).unwrap();
        q.push(read(B, 2)).unwrap();
        assert_eq!(q.withdraw(B), None);
        assert_eq!(q.wake(|| true), Some(A));
        assert_eq!(q.finish(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn withdrawing_the_last_request_idles_the_device() {
        let mut q = DiskQueue::new();
        q.push(read(A, 1)).unwrap();
        assert_eq!(q.withdraw(A), None);
        assert!(q.is_empty());
        assert_eq!(q.push(read(A, 2)), Ok(true), "device must be idle again");
        assert_eq!(q.withdraw(B), None);
        assert_eq!(q.len(), 1);
    }
}
