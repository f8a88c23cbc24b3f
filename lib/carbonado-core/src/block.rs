//! Fixed-capacity point blocks and the pool they are drawn from.

use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::pooling::{BoundedObjectPool, Clearable, ObjectPool, Poolable, ReclaimStrategy};

/// Number of points held by a single block.
pub const BLOCK_SIZE: usize = 65_536;

/// Default number of idle blocks retained by the process-wide pool.
pub const DEFAULT_MAX_RETAINED_BLOCKS: usize = 32;

static GLOBAL_POOL: OnceLock<BlockPool> = OnceLock::new();

/// A decoded observation.
///
/// The metric name is not stored inline: points carry the identifier assigned by the store's name table, which
/// resolves back to a view over the original input buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub(crate) id: u32,

    /// Logical timestamp of the sample, in seconds.
    pub time: i32,

    /// Sample value.
    pub value: f64,

    /// Write timestamp of the record, in seconds.
    ///
    /// Only used to pick a winner between points sharing a metric and time.
    pub timestamp: i32,
}

impl Point {
    /// Returns the interned identifier of this point's metric name.
    pub fn metric_id(&self) -> u32 {
        self.id
    }
}

/// Backing storage for a [`Block`].
pub struct BlockData {
    used: usize,
    points: Box<[Point]>,
}

impl Default for BlockData {
    fn default() -> Self {
        Self {
            used: 0,
            points: vec![Point::default(); BLOCK_SIZE].into_boxed_slice(),
        }
    }
}

impl Clearable for BlockData {
    fn clear(&mut self) {
        // Slot contents are left as-is and simply overwritten on the next use.
        self.used = 0;
    }
}

/// A fixed-capacity array of points, on loan from a [`BlockPool`].
///
/// The block goes back to the pool it came from when dropped.
pub struct Block {
    strategy_ref: Arc<dyn ReclaimStrategy<Block> + Send + Sync>,
    data: Option<BlockData>,
}

impl Block {
    fn data(&self) -> &BlockData {
        self.data.as_ref().expect("block data is only taken on drop")
    }

    fn data_mut(&mut self) -> &mut BlockData {
        self.data.as_mut().expect("block data is only taken on drop")
    }

    /// Returns the number of points in use.
    pub fn len(&self) -> usize {
        self.data().used
    }

    /// Returns `true` if no points are in use.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if every slot is in use.
    pub fn is_full(&self) -> bool {
        self.len() == BLOCK_SIZE
    }

    /// Returns the points in use.
    pub fn points(&self) -> &[Point] {
        let data = self.data();
        &data.points[..data.used]
    }

    /// Returns the points in use, mutably.
    pub fn points_mut(&mut self) -> &mut [Point] {
        let data = self.data_mut();
        &mut data.points[..data.used]
    }

    /// Appends a point.
    ///
    /// # Panics
    ///
    /// Panics if the block is full.
    pub fn push(&mut self, point: Point) {
        let data = self.data_mut();
        assert!(data.used < BLOCK_SIZE, "block is full");
        data.points[data.used] = point;
        data.used += 1;
    }

    /// Shortens the block to `len` points in use.
    ///
    /// Has no effect if `len` is greater than the number of points in use.
    pub fn truncate(&mut self, len: usize) {
        let data = self.data_mut();
        data.used = data.used.min(len);
    }
}

impl Poolable for Block {
    type Data = BlockData;

    fn from_data(strategy_ref: Arc<dyn ReclaimStrategy<Self> + Send + Sync>, data: Self::Data) -> Self {
        Self {
            strategy_ref,
            data: Some(data),
        }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.strategy_ref.reclaim(data);
        }
    }
}

/// A shared pool of [`Block`]s.
///
/// Cloning the pool is cheap, and all clones share the same idle blocks.
#[derive(Clone)]
pub struct BlockPool {
    inner: BoundedObjectPool<Block>,
}

impl BlockPool {
    /// Creates a new `BlockPool` that keeps at most `max_retained` idle blocks around.
    pub fn new(max_retained: usize) -> Self {
        Self {
            inner: BoundedObjectPool::with_capacity("point_blocks", max_retained),
        }
    }

    /// Initializes the process-wide pool with the given retention bound.
    ///
    /// Returns `false` if the process-wide pool was already initialized, in which case the existing pool is left
    /// unchanged.
    pub fn initialize_global(max_retained: usize) -> bool {
        let mut initialized = false;
        GLOBAL_POOL.get_or_init(|| {
            initialized = true;
            debug!(max_retained, "Initialized process-wide block pool.");
            Self::new(max_retained)
        });
        initialized
    }

    /// Returns the process-wide pool.
    ///
    /// If [`initialize_global`][Self::initialize_global] was never called, the pool is created with
    /// [`DEFAULT_MAX_RETAINED_BLOCKS`].
    pub fn global() -> &'static BlockPool {
        GLOBAL_POOL.get_or_init(|| Self::new(DEFAULT_MAX_RETAINED_BLOCKS))
    }

    /// Returns the number of idle blocks held by the pool.
    pub fn idle(&self) -> usize {
        self.inner.idle()
    }

    /// Returns the number of blocks allocated by the pool so far.
    pub fn created(&self) -> usize {
        self.inner.created()
    }
}

impl ObjectPool for BlockPool {
    type Item = Block;

    fn acquire(&self) -> Block {
        self.inner.acquire()
    }
}
