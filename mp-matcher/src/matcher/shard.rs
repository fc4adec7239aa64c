//! Partitioning the pattern set across independent engines, one OS thread
//! each.
//!
//! Patterns are routed by a stable hash of their source string, so the same
//! pattern always lands on the same engine and the partition survives
//! restarts. Because the partitions are disjoint, shards never agree on
//! anything: each one scans its own clone of the buffer and fires its own
//! patterns' callbacks, with no ordering between shards.

use std::thread;

use log::debug;

use crate::{buffer::Buffer, matcher::engine::Engine};

/// FNV-1a over the pattern source. `DefaultHasher` makes no stability
/// promises across releases, and shard routing must never depend on one.
pub(crate) fn stable_hash(source: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET_BASIS;
    for byte in source.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Roughly one and a half engines per core keeps every core busy while the
/// unlucky shards finish their longer buffers.
pub(crate) fn default_shard_count() -> usize {
    let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    (cores * 3).div_ceil(2)
}

/// The fixed set of engines one matcher fans out over.
pub(crate) struct ShardSet {
    engines: Vec<Engine>,
}

impl ShardSet {
    pub(crate) fn new(count: usize, prefilter: bool) -> Self {
        assert!(count > 0, "shard set cannot be empty");
        ShardSet {
            engines: (0..count).map(|shard| Engine::new(shard, prefilter)).collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.engines.len()
    }

    pub(crate) fn route(&self, source: &str) -> usize {
        (stable_hash(source) % self.engines.len() as u64) as usize
    }

    pub(crate) fn engine_for(&mut self, source: &str) -> &mut Engine {
        let shard = self.route(source);
        &mut self.engines[shard]
    }

    /// Runs every shard over its own clone of `buffer`, blocking until all
    /// of them finish. Shards with no patterns are not worth a thread.
    pub(crate) fn scan_all(&mut self, buffer: &Buffer) {
        let busy = self.engines.iter().filter(|e| e.pattern_count() > 0).count();
        debug!("dispatching scan to {busy} of {} shards", self.engines.len());
        if busy == 0 {
            return;
        }
        if busy == 1 {
            // Single-shard scans stay on the caller's thread.
            let engine =
                self.engines.iter_mut().find(|e| e.pattern_count() > 0).expect("busy == 1");
            engine.scan(&mut buffer.clone());
            return;
        }
        thread::scope(|scope| {
            for engine in self.engines.iter_mut().filter(|e| e.pattern_count() > 0) {
                let mut buffer = buffer.clone();
                scope.spawn(move || engine.scan(&mut buffer));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_stable() {
        // FNV-1a test vectors; routing must never drift between builds.
        assert_eq!(stable_hash(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(stable_hash("a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(stable_hash("foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn routing_is_deterministic_and_in_range() {
        let set = ShardSet::new(7, false);
        for source in ["a+", "[0-9]{}", "foo|bar", "^x$"] {
            let shard = set.route(source);
            assert!(shard < 7);
            assert_eq!(shard, set.route(source));
        }
    }

    #[test]
    fn shards_scan_independently() {
        use std::sync::{Arc, Mutex};

        let hits = Arc::new(Mutex::new(Vec::new()));
        let mut set = ShardSet::new(4, false);
        for source in ["cat", "dog", "[0-9]+"] {
            let hits = hits.clone();
            let source_owned = source.to_string();
            set.engine_for(source)
                .add(
                    source,
                    Arc::new(move |_: &Buffer, start: usize, end: usize| {
                        hits.lock().unwrap().push((source_owned.clone(), start, end));
                    }),
                )
                .unwrap();
        }

        set.scan_all(&Buffer::new("cat 7 dogs"));
        let mut got = hits.lock().unwrap().clone();
        got.sort();
        assert_eq!(
            got,
            vec![
                ("[0-9]+".to_string(), 4, 4),
                ("cat".to_string(), 0, 2),
                ("dog".to_string(), 6, 8),
            ]
        );
    }
}
