use std::sync::{
    atomic::{AtomicUsize, Ordering::Relaxed},
    Arc,
};

use crossbeam_queue::ArrayQueue;
use tracing::trace;

use super::{Clearable, ObjectPool, PoolMetrics, Poolable, ReclaimStrategy};

/// A bounded object pool.
///
/// Items are built on demand whenever the pool has no idle items, so acquiring never waits. When an item is returned,
/// it is cleared and kept for reuse, up to `max_retained` idle items; anything returned beyond that bound is dropped.
///
/// Idle items are held in a lock-free queue, so the pool can be shared freely between threads.
pub struct BoundedObjectPool<T: Poolable> {
    strategy: Arc<BoundedStrategy<T>>,
}

impl<T> BoundedObjectPool<T>
where
    T: Poolable + 'static,
    T::Data: Default,
{
    /// Creates a new `BoundedObjectPool` that retains at most `max_retained` idle items.
    pub fn with_capacity<S>(pool_name: S, max_retained: usize) -> Self
    where
        S: Into<String>,
    {
        Self::with_builder(pool_name, max_retained, T::Data::default)
    }
}

impl<T> BoundedObjectPool<T>
where
    T: Poolable + 'static,
{
    /// Creates a new `BoundedObjectPool` with the given retention bound and item builder.
    ///
    /// `builder` is called to construct each item.
    pub fn with_builder<S, B>(pool_name: S, max_retained: usize, builder: B) -> Self
    where
        S: Into<String>,
        B: Fn() -> T::Data + Send + Sync + 'static,
    {
        Self {
            strategy: Arc::new(BoundedStrategy::with_builder(pool_name, max_retained, builder)),
        }
    }

    /// Returns the number of idle items currently held by the pool.
    pub fn idle(&self) -> usize {
        self.strategy.items.len()
    }

    /// Returns the number of items built by this pool so far.
    pub fn created(&self) -> usize {
        self.strategy.created.load(Relaxed)
    }

    /// Returns the maximum number of idle items the pool retains.
    pub fn max_retained(&self) -> usize {
        self.strategy.items.capacity()
    }
}

impl<T: Poolable> Clone for BoundedObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy.clone(),
        }
    }
}

impl<T> ObjectPool for BoundedObjectPool<T>
where
    T: Poolable + Send + 'static,
{
    type Item = T;

    fn acquire(&self) -> Self::Item {
        let data = self.strategy.acquire();
        let strategy_ref = Arc::clone(&self.strategy);
        T::from_data(strategy_ref, data)
    }
}

struct BoundedStrategy<T: Poolable> {
    items: ArrayQueue<T::Data>,
    builder: Box<dyn Fn() -> T::Data + Send + Sync>,
    created: AtomicUsize,
    metrics: PoolMetrics,
}

impl<T: Poolable> BoundedStrategy<T> {
    fn with_builder<S, B>(pool_name: S, max_retained: usize, builder: B) -> Self
    where
        S: Into<String>,
        B: Fn() -> T::Data + Send + Sync + 'static,
    {
        Self {
            // `ArrayQueue` rejects a zero capacity.
            items: ArrayQueue::new(max_retained.max(1)),
            builder: Box::new(builder),
            created: AtomicUsize::new(0),
            metrics: PoolMetrics::new(pool_name.into()),
        }
    }

    fn acquire(&self) -> T::Data {
        let data = match self.items.pop() {
            Some(data) => data,
            None => {
                self.created.fetch_add(1, Relaxed);
                self.metrics.created.increment(1);
                trace!("Object pool empty, building new item.");

                (self.builder)()
            }
        };

        self.metrics.acquired.increment(1);
        self.metrics.in_use.increment(1.0);
        data
    }
}

impl<T: Poolable> ReclaimStrategy<T> for BoundedStrategy<T> {
    fn reclaim(&self, mut data: T::Data) {
        data.clear();

        self.metrics.released.increment(1);
        self.metrics.in_use.decrement(1.0);

        if self.items.push(data).is_err() {
            self.metrics.discarded.increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Default)]
    struct Counter {
        value: u32,
    }

    impl Clearable for Counter {
        fn clear(&mut self) {
            self.value = 0;
        }
    }

    struct PooledCounter {
        strategy_ref: Arc<dyn ReclaimStrategy<PooledCounter> + Send + Sync>,
        data: Option<Counter>,
    }

    impl Poolable for PooledCounter {
        type Data = Counter;

        fn from_data(strategy_ref: Arc<dyn ReclaimStrategy<Self> + Send + Sync>, data: Self::Data) -> Self {
            Self {
                strategy_ref,
                data: Some(data),
            }
        }
    }

    impl Drop for PooledCounter {
        fn drop(&mut self) {
            if let Some(data) = self.data.take() {
                self.strategy_ref.reclaim(data);
            }
        }
    }

    #[test]
    fn reuses_released_items() {
        let pool = BoundedObjectPool::<PooledCounter>::with_capacity("test", 4);

        let mut item = pool.acquire();
        item.data.as_mut().unwrap().value = 42;
        drop(item);

        assert_eq!(pool.idle(), 1);

        let item = pool.acquire();
        assert_eq!(item.data.as_ref().unwrap().value, 0);
        assert_eq!(pool.created(), 1);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn discards_beyond_bound() {
        let pool = BoundedObjectPool::<PooledCounter>::with_capacity("test", 2);

        let items = (0..5).map(|_| pool.acquire()).collect::<Vec<_>>();
        assert_eq!(pool.created(), 5);

        drop(items);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn concurrent_acquire_release() {
        let pool = BoundedObjectPool::<PooledCounter>::with_capacity("test", 8);

        std::thread::scope(|s| {
            for _ in 0..8 {
                let pool = pool.clone();
                s.spawn(move || {
                    for _ in 0..1000 {
                        let mut item = pool.acquire();
                        item.data.as_mut().unwrap().value += 1;
                    }
                });
            }
        });

        assert!(pool.idle() <= 8);
        assert!(pool.created() <= 8);
    }
}
