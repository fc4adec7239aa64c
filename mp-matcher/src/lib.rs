/*!
A multi-pattern regular expression matching engine.

Given a set of patterns and an input text, `mp-matcher` reports every
maximal, leftmost, non-overlapping match of every pattern, invoking a
caller-supplied callback per match. Running each pattern on its own costs
time proportional to patterns × input; this engine instead fuses all
patterns into one shared NFA, subset-constructs a DFA over it lazily, and
walks the input once, so the per-character cost tracks the patterns that
can actually still match rather than all of them.

## Features
- One scan, many patterns: a shared start state seeds every candidate,
  and a start-character index decides in O(1) which patterns an input
  position could begin at all.
- Lazy DFA: powerset states are interned on first use and memoized per
  character, with dense transition tables on the ASCII fast path.
- Leftmost-longest per pattern: a dominance discipline suppresses
  overlapping and shorter candidates of the same pattern without
  affecting any other pattern's matches.
- Optional literal prefilter: when every pattern contains a mandatory
  literal, one Aho-Corasick pass decides where match sets may be born.
- Shard parallelism: patterns partition by a stable hash across
  independent engines, each scanning its own clone of the buffer on its
  own thread.

## Usage
```
use std::sync::{Arc, Mutex};
use mp_matcher::{buffer::Buffer, matcher::{MatchHandler, Matcher}};

let mut matcher = Matcher::builder().shards(2).build()?;

let hits = Arc::new(Mutex::new(Vec::new()));
let handler: MatchHandler = {
    let hits = hits.clone();
    Arc::new(move |buffer: &Buffer, start, end| {
        hits.lock().unwrap().push((buffer.substring(start, end), start, end));
    })
};
matcher.add("[0-9]+", handler.clone())?;
matcher.add("cat|dog", handler)?;

matcher.match_on(&Buffer::new("cat 42"));
matcher.shutdown();

let mut hits = hits.lock().unwrap().clone();
hits.sort();
assert_eq!(hits, vec![("42".to_string(), 4, 5), ("cat".to_string(), 0, 2)]);
# Ok::<(), Box<dyn std::error::Error>>(())
```

Spans are inclusive on both ends and count characters, not bytes. The
supported syntax is described in [`syntax`]; anything outside it is a
[`syntax::ParseError`] at registration time, with the offending offset.
*/

pub(crate) mod automata;
pub mod buffer;
pub mod matcher;
pub mod syntax;

pub use buffer::Buffer;
pub use matcher::{ConfigError, MatchHandler, Matcher};
pub use syntax::{ParseError, ParseErrorKind};
