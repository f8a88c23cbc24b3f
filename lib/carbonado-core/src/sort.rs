//! In-place sorting over index-addressed collections.
//!
//! Collections that are not a single contiguous slice (such as [`PointStore`][crate::store::PointStore], which spans
//! several blocks) can still be sorted in place as long as they can compare and swap elements by index.

/// A collection that can be sorted through index-based comparisons and swaps.
pub trait IndexSortable {
    /// Returns the number of elements.
    fn len(&self) -> usize;

    /// Returns `true` if the element at `i` must sort before the element at `j`.
    fn less(&self, i: usize, j: usize) -> bool;

    /// Swaps the elements at `i` and `j`.
    fn swap(&mut self, i: usize, j: usize);
}

// Ranges this short are finished off with an insertion sort.
const INSERTION_SORT_THRESHOLD: usize = 12;

/// Returns `true` if the collection is already in order.
pub fn is_sorted_by_index<S>(data: &S) -> bool
where
    S: IndexSortable + ?Sized,
{
    (1..data.len()).all(|i| !data.less(i, i - 1))
}

/// Sorts the collection in place.
///
/// The sort is not stable. It is an introsort: quicksort with median-of-three pivots, falling back to heapsort when
/// recursion gets too deep and to insertion sort for short ranges, so the worst case stays `O(n log n)`. Input that is
/// already in order is detected with a single linear scan and left untouched.
pub fn sort_by_index<S>(data: &mut S)
where
    S: IndexSortable + ?Sized,
{
    let len = data.len();
    if len < 2 || is_sorted_by_index(data) {
        return;
    }

    let max_depth = 2 * (usize::BITS - len.leading_zeros()) as usize;
    quick_sort(data, 0, len, max_depth);
}

fn quick_sort<S>(data: &mut S, mut lo: usize, mut hi: usize, mut depth: usize)
where
    S: IndexSortable + ?Sized,
{
    while hi - lo > INSERTION_SORT_THRESHOLD {
        if depth == 0 {
            heap_sort(data, lo, hi);
            return;
        }
        depth -= 1;

        let pivot = partition(data, lo, hi);

        // Recurse into the smaller side, loop on the larger one.
        if pivot - lo < hi - pivot - 1 {
            quick_sort(data, lo, pivot, depth);
            lo = pivot + 1;
        } else {
            quick_sort(data, pivot + 1, hi, depth);
            hi = pivot;
        }
    }

    if hi - lo > 1 {
        insertion_sort(data, lo, hi);
    }
}

fn median_of_three<S>(data: &mut S, a: usize, b: usize, c: usize)
where
    S: IndexSortable + ?Sized,
{
    if data.less(b, a) {
        data.swap(b, a);
    }
    if data.less(c, b) {
        data.swap(c, b);
        if data.less(b, a) {
            data.swap(b, a);
        }
    }
}

/// Partitions `[lo, hi)` around a pivot and returns the pivot's final position.
///
/// Elements equal to the pivot stop both scans and are swapped, which keeps ranges full of duplicates balanced.
fn partition<S>(data: &mut S, lo: usize, hi: usize) -> usize
where
    S: IndexSortable + ?Sized,
{
    let mid = lo + (hi - lo) / 2;
    median_of_three(data, lo, mid, hi - 1);
    data.swap(lo, mid);

    let mut i = lo + 1;
    let mut j = hi - 1;
    loop {
        while i <= j && data.less(i, lo) {
            i += 1;
        }
        while i <= j && data.less(lo, j) {
            j -= 1;
        }
        if i >= j {
            break;
        }
        data.swap(i, j);
        i += 1;
        j -= 1;
    }

    data.swap(lo, j);
    j
}

fn insertion_sort<S>(data: &mut S, lo: usize, hi: usize)
where
    S: IndexSortable + ?Sized,
{
    for i in (lo + 1)..hi {
        let mut j = i;
        while j > lo && data.less(j, j - 1) {
            data.swap(j, j - 1);
            j -= 1;
        }
    }
}

fn sift_down<S>(data: &mut S, mut root: usize, hi: usize, first: usize)
where
    S: IndexSortable + ?Sized,
{
    loop {
        let mut child = 2 * root + 1;
        if child >= hi {
            return;
        }
        if child + 1 < hi && data.less(first + child, first + child + 1) {
            child += 1;
        }
        if !data.less(first + root, first + child) {
            return;
        }
        data.swap(first + root, first + child);
        root = child;
    }
}

fn heap_sort<S>(data: &mut S, lo: usize, hi: usize)
where
    S: IndexSortable + ?Sized,
{
    let first = lo;
    let len = hi - lo;

    for i in (0..len / 2).rev() {
        sift_down(data, i, len, first);
    }
    for i in (1..len).rev() {
        data.swap(first, first + i);
        sift_down(data, 0, i, first);
    }
}
