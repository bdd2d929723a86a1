//! # Scheduling Limits

/// Capacity of the ready queue and of each disk wait queue.
pub const READY_QUEUE_CAPACITY: usize = 100;
