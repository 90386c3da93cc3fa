use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Number of lock stripes guarding a filter's bit-level operations. Must be
/// a power of two so the stripe of index `i` is `i & (STRIPE_COUNT - 1)`.
pub(crate) const STRIPE_COUNT: usize = 32;

const STRIPE_MASK: u64 = STRIPE_COUNT as u64 - 1;

/// Fixed array of read-write locks striped over bit or bucket indices.
///
/// Contention is proportional to collisions on the same stripe; parallelism
/// is bounded by the stripe count.
pub(crate) struct Stripes {
    locks: [RwLock<()>; STRIPE_COUNT],
}

impl Stripes {
    pub(crate) fn new() -> Self {
        Self {
            locks: std::array::from_fn(|_| RwLock::new(())),
        }
    }

    pub(crate) fn read(&self, index: u64) -> RwLockReadGuard<'_, ()> {
        self.locks[(index & STRIPE_MASK) as usize].read()
    }

    pub(crate) fn write(&self, index: u64) -> RwLockWriteGuard<'_, ()> {
        self.locks[(index & STRIPE_MASK) as usize].write()
    }

    /// Acquire the write side of every stripe in ascending order. Dropping
    /// the returned guard releases them in reverse. Bulk operations use this
    /// as a global barrier against concurrent readers and writers.
    pub(crate) fn write_all(&self) -> AllStripesGuard<'_> {
        AllStripesGuard {
            guards: self.locks.iter().map(|lock| lock.write()).collect(),
        }
    }
}

pub(crate) struct AllStripesGuard<'a> {
    guards: Vec<RwLockWriteGuard<'a, ()>>,
}

impl Drop for AllStripesGuard<'_> {
    fn drop(&mut self) {
        while self.guards.pop().is_some() {}
    }
}
