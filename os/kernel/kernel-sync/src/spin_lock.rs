use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

/// Test-and-test-and-set spin lock.
pub struct SpinLock<T> {
    /// lock state
    /// * `false`: unlocked
    /// * `true`: locked
    locked: AtomicBool,
    inner: UnsafeCell<T>,
}

// Safety: mutual exclusion; only T: Send may cross threads.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            inner: UnsafeCell::new(inner),
        }
    }

    /// Try once; returns immediately.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.try_acquire().then_some(SpinLockGuard { lock: self })
    }

    /// Spin until acquired, then return a guard.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        while !self.try_acquire() {
            // Spin on a plain load so waiters do not bounce the cache line.
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
        SpinLockGuard { lock: self }
    }

    /// Closure convenience, built on the guard.
    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut g = self.lock();
        f(&mut g)
    }

    /// Mutable access when you have `&mut self` (no contention possible).
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Whether some guard is currently alive. Racy; diagnostics only.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// # Safety
    /// The caller must own the lock and must not use its guard afterwards.
    #[inline]
    pub(crate) unsafe fn force_unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// # Safety
    /// The caller must own the lock.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn data_mut(&self) -> &mut T {
        unsafe { &mut *self.inner.get() }
    }
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.lock.data_mut() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        // Release publishes the critical section.
        unsafe { self.lock.force_unlock() }
    }
}
