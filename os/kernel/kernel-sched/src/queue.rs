use crate::ThreadId;
use kernel_info::sched::READY_QUEUE_CAPACITY;

/// The scheduler's ready queue.
pub type ReadyQueue = BoundedQueue<ThreadId, READY_QUEUE_CAPACITY>;

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("queue is full")]
pub struct QueueFull;

/// Fixed-capacity FIFO over a circular buffer.
///
/// `front` and `rear` always stay below `N`; `len` tells full from empty.
#[derive(Debug, Clone)]
pub struct BoundedQueue<T, const N: usize> {
    slots: [Option<T>; N],
    front: usize,
    rear: usize,
    len: usize,
}

impl<T: Copy + PartialEq, const N: usize> Default for BoundedQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + PartialEq, const N: usize> BoundedQueue<T, N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; N],
            front: 0,
            rear: 0,
            len: 0,
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == N
    }

    /// Appends `item` at the tail.
    ///
    /// # Errors
    /// [`QueueFull`] at capacity; the queue is unchanged.
    pub fn enqueue(&mut self, item: T) -> Result<(), QueueFull> {
        if self.is_full() {
            return Err(QueueFull);
        }
        self.slots[self.rear] = Some(item);
        self.rear = (self.rear + 1) % N;
        self.len += 1;
        Ok(())
    }

    /// Takes the head.
    pub fn dequeue(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.slots[self.front].take();
        self.front = (self.front + 1) % N;
        self.len -= 1;
        item
    }

    /// The head, left in place.
    #[must_use]
    pub fn head(&self) -> Option<T> {
        if self.is_empty() {
            None
        } else {
            self.slots[self.front]
        }
    }

    /// Items from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).filter_map(|i| self.slots[(self.front + i) % N])
    }

    #[must_use]
    pub fn contains(&self, item: T) -> bool {
        self.iter().any(|x| x == item)
    }

    /// Removes the first occurrence of `item`, keeping the others in order.
    pub fn remove(&mut self, item: T) -> bool {
        let Some(pos) = self.iter().position(|x| x == item) else {
            return false;
        };
        for i in pos..self.len - 1 {
            self.slots[(self.front + i) % N] = self.slots[(self.front + i + 1) % N];
        }
        self.rear = (self.rear + N - 1) % N;
        self.slots[self.rear] = None;
        self.len -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids<const N: usize>(q: &BoundedQueue<u32, N>) -> Vec<u32> {
        q.iter().collect()
    }

    #[test]
    fn fifo_order_across_wraparound() {
        let mut q = BoundedQueue::<u32, 3>::new();
        for round in 0..5 {
            q.enqueue(round * 10).unwrap();
            q.enqueue(round * 10 + 1).unwrap();
            assert_eq!(q.dequeue(), Some(round * 10));
            assert_eq!(q.dequeue(), Some(round * 10 + 1));
        }
        assert!(q.is_empty());
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut q = BoundedQueue::<u32, 2>::new();
        q.enqueue(1).unwrap();
        q.enqueue(2).unwrap();
        assert_eq!(q.enqueue(3), Err(QueueFull));
        assert_eq!(ids(&q), [1, 2]);
        assert!(q.is_full());
    }

    #[test]
    fn remove_keeps_relative_order() {
        let mut q = BoundedQueue::<u32, 4>::new();
        // Move the front off zero so removal crosses the wrap point.
        q.enqueue(0).unwrap();
        q.enqueue(0).unwrap();
        q.dequeue();
        q.dequeue();
        for i in 1..=4 {
            q.enqueue(i).unwrap();
        }

        assert!(q.remove(2));
        assert_eq!(ids(&q), [1, 3, 4]);
        assert!(!q.remove(2));
        assert_eq!(q.head(), Some(1));

        q.enqueue(5).unwrap();
        assert_eq!(ids(&q), [1, 3, 4, 5]);
        assert!(q.remove(5));
        assert!(q.remove(1));
        assert_eq!(ids(&q), [3, 4]);
    }

    #[test]
    fn remove_takes_exactly_one_occurrence() {
        let mut q = BoundedQueue::<u32, 4>::new();
        for i in [7, 8, 7, 9] {
            q.enqueue(i).unwrap();
        }
        assert!(q.remove(7));
        assert_eq!(ids(&q), [8, 7, 9]);
    }
}
