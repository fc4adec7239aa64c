/*!
The public matcher: register patterns with callbacks, scan buffers, get
one callback invocation per committed match.

## Semantics

For every registered pattern, a scan reports its maximal, leftmost,
non-overlapping matches: the same spans a leftmost-longest `find` loop
over that single pattern would produce, except that all patterns are
matched in one pass over the input. Spans are inclusive on both ends and
zero-length matches are never reported.

## Sharding

Patterns are partitioned by a stable hash across a fixed set of engines,
each scanning its own clone of the buffer on its own thread. Callbacks of
patterns on different shards run concurrently with no ordering between
them; within one shard, callbacks fire in ascending match-end order.
*/

use std::sync::Arc;

use bon::bon;
use log::debug;

use crate::{buffer::Buffer, syntax::ParseError};

pub(crate) mod engine;
pub(crate) mod matches;
pub(crate) mod pattern;
pub(crate) mod prefilter;
pub(crate) mod shard;

use shard::{default_shard_count, ShardSet};

/// A match callback: `(buffer, start, end)`, both positions inclusive.
///
/// Handlers are shared values; identity (`Arc::ptr_eq`) is what
/// [`Matcher::remove`] matches on. They run on shard threads, hence the
/// `Send + Sync` bounds, and they never get a handle back to the matcher,
/// so re-entering `add`/`remove`/`match_on` from inside a callback is not
/// expressible.
pub type MatchHandler = Arc<dyn Fn(&Buffer, usize, usize) + Send + Sync>;

/// Error from [`Matcher::builder`] for nonsensical configurations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("shard count must be at least 1")]
    ZeroShards,
}

/// A multi-pattern matcher.
///
/// ## Example
/// ```
/// use std::sync::{Arc, Mutex};
/// use mp_matcher::{buffer::Buffer, matcher::{MatchHandler, Matcher}};
///
/// let mut matcher = Matcher::builder().shards(2).build()?;
/// let hits = Arc::new(Mutex::new(Vec::new()));
/// let handler: MatchHandler = {
///     let hits = hits.clone();
///     Arc::new(move |_buffer: &Buffer, start, end| {
///         hits.lock().unwrap().push((start, end));
///     })
/// };
/// matcher.add("[0-9]+", handler)?;
/// matcher.match_on(&Buffer::new("a12b"));
/// assert_eq!(*hits.lock().unwrap(), vec![(1, 2)]);
/// matcher.shutdown();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Matcher {
    shards: ShardSet,
    shut_down: bool,
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher").field("shut_down", &self.shut_down).finish()
    }
}

#[bon]
impl Matcher {
    #[builder]
    pub fn new(
        /// Number of independent engines the pattern set is partitioned
        /// over. Defaults to about 1.5 engines per core.
        shards: Option<usize>,
        /// Screen match-set births through an Aho-Corasick pass over
        /// literal kernels extracted from the patterns. Only kicks in
        /// when every pattern on a shard has such a kernel; never changes
        /// what is matched.
        #[builder(default = true)]
        prefilter: bool,
    ) -> Result<Self, ConfigError> {
        let count = match shards {
            Some(0) => return Err(ConfigError::ZeroShards),
            Some(count) => count,
            None => default_shard_count(),
        };
        debug!("matcher with {count} shards, prefilter: {prefilter}");
        Ok(Matcher { shards: ShardSet::new(count, prefilter), shut_down: false })
    }

    /// Registers `action` for `pattern`, compiling the pattern if this is
    /// its first registration. A [`ParseError`] leaves the matcher
    /// untouched.
    pub fn add(&mut self, pattern: &str, action: MatchHandler) -> Result<(), ParseError> {
        assert!(!self.shut_down, "add after shutdown");
        self.shards.engine_for(pattern).add(pattern, action)
    }

    /// Removes `action` (by identity) from `pattern`. The pattern itself
    /// is dropped once its last action is gone; either way the change
    /// applies from the next `match_on`, never retroactively.
    pub fn remove(&mut self, pattern: &str, action: &MatchHandler) {
        assert!(!self.shut_down, "remove after shutdown");
        self.shards.engine_for(pattern).remove(pattern, action);
    }

    /// Scans `buffer`, blocking until every shard has run to the end of
    /// its clone of the input.
    pub fn match_on(&mut self, buffer: &Buffer) {
        assert!(!self.shut_down, "match_on after shutdown");
        self.shards.scan_all(buffer);
    }

    /// Marks the matcher as finished. Idempotent; scans already block
    /// until their shard threads complete, so there is nothing left to
    /// wait for and later calls to the matching API are programmer
    /// errors.
    pub fn shutdown(&mut self) {
        self.shut_down = true;
    }

    /// How many shards this matcher partitions patterns over.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}
