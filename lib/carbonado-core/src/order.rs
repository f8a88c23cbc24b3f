//! Ordering and deduplication of decoded points.

use std::time::Instant;

use tracing::debug;

use crate::{sort::sort_by_index, store::PointStore};

/// Sorts the store in place by metric name, then by time.
pub fn sort(store: &mut PointStore<'_>) {
    sort_by_index(store);
}

/// Collapses points sharing a metric and time into a single point.
///
/// The store must already be sorted. Of every run of points with the same metric and time, the one with the greatest
/// `timestamp` is kept; when several share the greatest `timestamp`, the first of them wins. Blocks emptied by the
/// collapse go back to the pool.
pub fn dedup(store: &mut PointStore<'_>) {
    let len = store.len();
    if len < 2 {
        return;
    }

    // `head` is the position of the surviving point for the current (metric, time) key.
    let mut head = 0;
    for i in 1..len {
        let current = *store.get(i);
        let survivor = *store.get(head);

        if current.id != survivor.id || current.time != survivor.time {
            head += 1;
            if head != i {
                store.set(head, current);
            }
            continue;
        }

        if current.timestamp > survivor.timestamp {
            store.set(head, current);
        }
    }

    store.truncate(head + 1);
}

/// Sorts and deduplicates the store.
pub fn sort_and_dedup(store: &mut PointStore<'_>) {
    let sort_start = Instant::now();
    sort(store);
    let sort_elapsed = sort_start.elapsed();

    let before = store.len();
    let dedup_start = Instant::now();
    dedup(store);

    debug!(
        sort_time = ?sort_elapsed,
        dedup_time = ?dedup_start.elapsed(),
        points = store.len(),
        duplicates = before - store.len(),
        "Ordered and deduplicated points."
    );
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{
        block::{BlockPool, BLOCK_SIZE},
        parse::{test_support::write_record, Parser},
    };

    fn parser() -> Parser {
        Parser::new().with_pool(BlockPool::new(4))
    }

    fn collect(store: &PointStore<'_>) -> Vec<(String, i32, f64, i32)> {
        store
            .iter()
            .map(|p| {
                (
                    String::from_utf8_lossy(store.metric_name(p)).into_owned(),
                    p.time,
                    p.value,
                    p.timestamp,
                )
            })
            .collect()
    }

    #[test]
    fn empty_store() {
        let mut store = parser().parse(&[]).unwrap();
        sort_and_dedup(&mut store);
        assert!(store.is_empty());
    }

    #[test]
    fn keeps_latest_write() {
        let mut body = Vec::new();
        write_record(&mut body, "cpu.load", 100, 1.5, 100);
        write_record(&mut body, "cpu.load", 100, 2.5, 200);

        let mut store = parser().parse(&body).unwrap();
        assert_eq!(store.len(), 2);

        sort_and_dedup(&mut store);
        assert_eq!(collect(&store), vec![("cpu.load".to_string(), 100, 2.5, 200)]);
    }

    #[test]
    fn latest_write_wins_regardless_of_position() {
        let mut body = Vec::new();
        write_record(&mut body, "m", 10, 3.0, 300);
        write_record(&mut body, "m", 10, 1.0, 100);
        write_record(&mut body, "m", 10, 2.0, 200);

        let mut store = parser().parse(&body).unwrap();
        sort_and_dedup(&mut store);
        assert_eq!(collect(&store), vec![("m".to_string(), 10, 3.0, 300)]);
    }

    #[test]
    fn orders_by_name_bytes_not_first_seen() {
        let mut body = Vec::new();
        write_record(&mut body, "b.metric", 2, 1.0, 1);
        write_record(&mut body, "a.metric", 5, 2.0, 1);
        write_record(&mut body, "b.metric", 1, 3.0, 1);
        write_record(&mut body, "a.metric", 4, 4.0, 1);

        let mut store = parser().parse(&body).unwrap();
        sort_and_dedup(&mut store);

        let order = collect(&store)
            .into_iter()
            .map(|(name, time, _, _)| (name, time))
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                ("a.metric".to_string(), 4),
                ("a.metric".to_string(), 5),
                ("b.metric".to_string(), 1),
                ("b.metric".to_string(), 2),
            ]
        );
    }

    #[test]
    fn orders_and_dedups_across_blocks() {
        const METRICS: usize = 5;
        const TIMES: usize = 20_000;
        const RECORDS: usize = 2 * BLOCK_SIZE + 1_000;
        const STRIDE: usize = 48_271;

        // Visit every key in 0..RECORDS exactly once, in scrambled order. Keys past METRICS * TIMES repeat an earlier
        // (metric, time) pair with a later timestamp.
        let mut body = Vec::new();
        let mut expected = std::collections::BTreeMap::new();
        for i in 0..RECORDS {
            let key = i * STRIDE % RECORDS;
            let name = format!("metric.{}", key % METRICS);
            let time = ((key / METRICS) % TIMES) as i32;
            write_record(&mut body, &name, time as u32, key as f64, key as u32);

            let entry = expected.entry((name, time)).or_insert((0.0, 0));
            if key as i32 >= entry.1 {
                *entry = (key as f64, key as i32);
            }
        }

        let mut store = parser().parse(&body).unwrap();
        assert_eq!(store.len(), RECORDS);
        assert_eq!(store.block_count(), 3);

        sort_and_dedup(&mut store);

        let expected = expected
            .into_iter()
            .map(|((name, time), (value, timestamp))| (name, time, value, timestamp))
            .collect::<Vec<_>>();
        assert_eq!(store.len(), METRICS * TIMES);
        assert_eq!(store.block_count(), store.len().div_ceil(BLOCK_SIZE));
        assert!(collect(&store) == expected, "points differ from the per-key survivors");
    }

    fn arb_records() -> impl Strategy<Value = Vec<(u8, i8, u8)>> {
        proptest::collection::vec((0u8..4, any::<i8>(), any::<u8>()), 0..400)
    }

    proptest! {
        #[test]
        fn property_test_strictly_ordered(records in arb_records()) {
            let mut body = Vec::new();
            for (name, time, timestamp) in &records {
                let name = format!("metric.{}", name);
                write_record(&mut body, &name, *time as i32 as u32, 0.0, u32::from(*timestamp));
            }

            let mut store = parser().parse(&body).unwrap();
            sort_and_dedup(&mut store);

            let points = collect(&store);
            for pair in points.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!((a.0.as_str(), a.1) < (b.0.as_str(), b.1));
            }
        }

        #[test]
        fn property_test_survivor_has_max_timestamp(records in arb_records()) {
            let mut body = Vec::new();
            for (name, time, timestamp) in &records {
                let name = format!("metric.{}", name);
                write_record(&mut body, &name, *time as i32 as u32, 0.0, u32::from(*timestamp));
            }

            let mut store = parser().parse(&body).unwrap();
            sort_and_dedup(&mut store);

            let mut expected = std::collections::BTreeMap::new();
            for (name, time, timestamp) in &records {
                let entry = expected.entry((format!("metric.{}", name), i32::from(*time))).or_insert(0i32);
                *entry = (*entry).max(i32::from(*timestamp));
            }

            let actual = collect(&store)
                .into_iter()
                .map(|(name, time, _, timestamp)| ((name, time), timestamp))
                .collect::<std::collections::BTreeMap<_, _>>();
            prop_assert_eq!(actual, expected);
        }
    }
}
