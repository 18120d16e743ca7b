//! Strictly increasing event times for fake acknowledgements.

use common::now_ms;
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_EVENT_TIME: AtomicI64 = AtomicI64::new(0);

/// Wall-clock milliseconds, bumped so every call in the process returns a
/// strictly greater value than the one before.
///
/// Fake events are applied under the same "strictly newer" guard as real
/// ones, so two events in the same millisecond must not share a timestamp.
pub fn next_event_time() -> i64 {
    let now = now_ms();
    let previous = LAST_EVENT_TIME
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now.max(previous + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictly_increasing() {
        let mut last = next_event_time();
        for _ in 0..10_000 {
            let next = next_event_time();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..1000).map(|_| next_event_time()).collect::<Vec<_>>()))
            .collect();
        let mut all: Vec<i64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let total = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), total);
    }
}
