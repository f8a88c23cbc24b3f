//! Block-backed point storage.

use std::cmp::Ordering;

use crate::{
    block::{Block, BlockPool, Point, BLOCK_SIZE},
    intern::NameTable,
    pooling::ObjectPool as _,
    sort::IndexSortable,
};

#[inline]
const fn locate(index: usize) -> (usize, usize) {
    (index / BLOCK_SIZE, index % BLOCK_SIZE)
}

/// A logical array of decoded points, spread over pooled blocks.
///
/// Every block but the last is always full, so point `i` lives in block `i / BLOCK_SIZE` at slot `i % BLOCK_SIZE`.
/// Metric names are resolved through the store's [`NameTable`], whose entries borrow from the input buffer the store
/// was parsed from: the store cannot outlive that buffer.
///
/// Blocks go back to their pool when the store is dropped or [released][Self::release].
pub struct PointStore<'a> {
    body: &'a [u8],
    names: NameTable<'a>,
    blocks: Vec<Block>,
    len: usize,
    pool: BlockPool,
}

impl<'a> PointStore<'a> {
    /// Creates an empty store over `body`, drawing blocks from `pool`.
    pub fn new(body: &'a [u8], pool: BlockPool) -> Self {
        Self {
            body,
            names: NameTable::new(),
            blocks: Vec::new(),
            len: 0,
            pool,
        }
    }

    /// Creates an empty store with room for `capacity` points already acquired from the pool.
    pub fn with_capacity(body: &'a [u8], pool: BlockPool, capacity: usize) -> Self {
        let mut store = Self::new(body, pool);
        store.reserve(capacity);
        store
    }

    /// Ensures blocks for at least `additional` more points are held.
    pub fn reserve(&mut self, additional: usize) {
        let needed = (self.len + additional).div_ceil(BLOCK_SIZE);
        self.blocks.reserve(needed.saturating_sub(self.blocks.len()));
        while self.blocks.len() < needed {
            self.blocks.push(self.pool.acquire());
        }
    }

    /// Returns the raw input buffer the store was built from.
    pub fn body(&self) -> &'a [u8] {
        self.body
    }

    /// Returns the name table.
    pub fn names(&self) -> &NameTable<'a> {
        &self.names
    }

    pub(crate) fn names_mut(&mut self) -> &mut NameTable<'a> {
        &mut self.names
    }

    /// Returns the number of points.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the store holds no points.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of blocks held.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Appends a point, acquiring a new block first if the current one is full.
    pub fn push(&mut self, point: Point) {
        let (block_index, _) = locate(self.len);
        if block_index == self.blocks.len() {
            self.blocks.push(self.pool.acquire());
        }
        self.blocks[block_index].push(point);
        self.len += 1;
    }

    /// Returns the point at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn get(&self, index: usize) -> &Point {
        assert!(index < self.len, "point index {} out of bounds ({})", index, self.len);
        let (block, slot) = locate(index);
        &self.blocks[block].points()[slot]
    }

    #[inline]
    pub(crate) fn set(&mut self, index: usize, point: Point) {
        let (block, slot) = locate(index);
        self.blocks[block].points_mut()[slot] = point;
    }

    /// Returns the canonical metric name of `point`.
    ///
    /// # Panics
    ///
    /// Panics if `point` did not come from this store.
    pub fn metric_name(&self, point: &Point) -> &[u8] {
        self.names
            .name(point.id)
            .expect("points only carry identifiers assigned by their store")
    }

    /// Orders the points at `i` and `j` by metric name, then by time.
    ///
    /// Points with the same identifier share a name, so only their times are compared.
    #[inline]
    pub fn compare(&self, i: usize, j: usize) -> Ordering {
        let (a, b) = (self.get(i), self.get(j));
        if a.id == b.id {
            return a.time.cmp(&b.time);
        }

        self.metric_name(a)
            .cmp(self.metric_name(b))
            .then_with(|| a.time.cmp(&b.time))
    }

    /// Swaps the points at `i` and `j`, which may live in different blocks.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    pub fn swap(&mut self, i: usize, j: usize) {
        assert!(i < self.len && j < self.len, "swap indices out of bounds");
        let (block_i, slot_i) = locate(i);
        let (block_j, slot_j) = locate(j);

        if block_i == block_j {
            self.blocks[block_i].points_mut().swap(slot_i, slot_j);
            return;
        }

        let ((low_block, low_slot), (high_block, high_slot)) = if block_i < block_j {
            ((block_i, slot_i), (block_j, slot_j))
        } else {
            ((block_j, slot_j), (block_i, slot_i))
        };

        let (head, tail) = self.blocks.split_at_mut(high_block);
        std::mem::swap(
            &mut head[low_block].points_mut()[low_slot],
            &mut tail[0].points_mut()[high_slot],
        );
    }

    /// Shortens the store to `len` points, returning blocks that are no longer needed to the pool.
    ///
    /// Has no effect if `len` is greater than the current length.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }

        let keep_blocks = len.div_ceil(BLOCK_SIZE);
        self.blocks.truncate(keep_blocks);
        if let Some(last) = self.blocks.last_mut() {
            last.truncate(len - (keep_blocks - 1) * BLOCK_SIZE);
        }
        self.len = len;
    }

    /// Returns an iterator over all points, in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Point> + '_ {
        self.blocks.iter().flat_map(|block| block.points().iter())
    }

    /// Releases the store, returning every block to the pool.
    pub fn release(self) {
        drop(self);
    }
}

impl IndexSortable for PointStore<'_> {
    fn len(&self) -> usize {
        self.len
    }

    fn less(&self, i: usize, j: usize) -> bool {
        self.compare(i, j) == Ordering::Less
    }

    fn swap(&mut self, i: usize, j: usize) {
        PointStore::swap(self, i, j)
    }
}
