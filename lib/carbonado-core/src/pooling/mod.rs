//! Object pooling.
use std::sync::Arc;

use metrics::{counter, gauge, Counter, Gauge};

mod bounded;
pub use self::bounded::BoundedObjectPool;

/// Pooled storage that can be reset before it is handed out again.
pub trait Clearable {
    /// Resets the storage to its empty state, keeping any allocation.
    fn clear(&mut self);
}

/// A handle around pooled storage.
///
/// The handle owns `Self::Data` while it is on loan, and gives it back through its [`ReclaimStrategy`] when dropped.
/// The storage is moved back as-is rather than swapped for a new allocation, so the same buffers circulate for the
/// life of the pool.
pub trait Poolable {
    /// The storage held by the pool between loans.
    type Data: Clearable + Send + 'static;

    /// Wraps storage taken from a pool, along with the strategy that returns it.
    fn from_data(strategy: Arc<dyn ReclaimStrategy<Self> + Send + Sync>, data: Self::Data) -> Self;
}

/// Decides what happens to storage coming back from a loan.
///
/// Implementations may keep the storage for the next acquire, or drop it when the pool already retains enough.
pub trait ReclaimStrategy<T>
where
    T: Poolable,
{
    /// Takes back storage whose handle was dropped.
    fn reclaim(&self, data: T::Data);
}

/// An object pool.
///
/// Acquiring from a pool never blocks and never fails: when no idle item is available, a new one is built.
pub trait ObjectPool: Send + Sync {
    /// The pooled value.
    type Item: Send;

    /// Acquires an item from the object pool.
    fn acquire(&self) -> Self::Item;
}

struct PoolMetrics {
    created: Counter,
    acquired: Counter,
    released: Counter,
    discarded: Counter,
    in_use: Gauge,
}

impl PoolMetrics {
    fn new(pool_name: String) -> Self {
        Self {
            created: counter!("object_pool_created", "pool_name" => pool_name.clone()),
            acquired: counter!("object_pool_acquired", "pool_name" => pool_name.clone()),
            released: counter!("object_pool_released", "pool_name" => pool_name.clone()),
            discarded: counter!("object_pool_discarded", "pool_name" => pool_name.clone()),
            in_use: gauge!("object_pool_in_use", "pool_name" => pool_name),
        }
    }
}
