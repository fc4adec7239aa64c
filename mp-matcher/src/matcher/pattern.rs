//! Per-pattern state: compiled NFA root, actions, and the live-match
//! bookkeeping that decides which candidate gets committed.

use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

use log::trace;

use crate::{
    automata::{nfa::CompiledNfa, storage::NodeStorage, NfaId, PatternId},
    buffer::Buffer,
    matcher::{
        matches::{dominance, Commit, DominanceHeap, Match, MatchId, MatchSet, MatchSetId},
        prefilter::Kernel,
        MatchHandler,
    },
};

/// One registered regular expression.
///
/// Identity is the source string. The compiled root and terminal node are
/// immutable once registration succeeds; everything else is bookkeeping
/// for the scan in flight.
pub(crate) struct Pattern {
    pub(crate) id: PatternId,
    pub(crate) source: String,
    actions: Vec<MatchHandler>,
    pub(crate) arrival: NfaId,
    pub(crate) terminal: NfaId,
    pub(crate) anchored_start: bool,
    pub(crate) anchored_end: bool,
    pub(crate) kernel: Option<Kernel>,
    /// One dominance heap per match set holding a candidate of this
    /// pattern. Empty between scans.
    heaps: BTreeMap<MatchSetId, DominanceHeap>,
    /// End of the last committed match this scan. Matches starting at or
    /// before it are dominated: committed spans never overlap.
    committed_end: Option<usize>,
}

impl Pattern {
    pub(crate) fn new(
        id: PatternId,
        source: &str,
        compiled: &CompiledNfa,
        kernel: Option<Kernel>,
    ) -> Self {
        Pattern {
            id,
            source: source.to_string(),
            actions: Vec::new(),
            arrival: compiled.arrival,
            terminal: compiled.terminal,
            anchored_start: compiled.anchor_start,
            anchored_end: compiled.anchor_end,
            kernel,
            heaps: BTreeMap::new(),
            committed_end: None,
        }
    }

    /// Adds an action; a handler already present (by identity) is not
    /// added twice.
    pub(crate) fn add_action(&mut self, action: MatchHandler) {
        if !self.actions.iter().any(|a| Arc::ptr_eq(a, &action)) {
            self.actions.push(action);
        }
    }

    /// Removes an action by identity; unknown handlers are ignored.
    pub(crate) fn remove_action(&mut self, action: &MatchHandler) {
        self.actions.retain(|a| !Arc::ptr_eq(a, action));
    }

    pub(crate) fn has_actions(&self) -> bool {
        !self.actions.is_empty()
    }

    pub(crate) fn actions(&self) -> &[MatchHandler] {
        &self.actions
    }

    /// True when this pattern can begin a match with `c`; answered from
    /// the start-character index built at registration.
    ///
    /// The index over-approximates (it may say yes where the NFA says
    /// no, never the reverse); debug builds cross-check it against a
    /// direct walk from the compiled root.
    pub(crate) fn can_start_with(&self, c: char, storage: &NodeStorage) -> bool {
        let indexed = storage.pattern_can_start_with(self.id, c);
        if cfg!(debug_assertions) {
            let direct = storage.eps_closure(&[self.arrival]).iter().any(|&id| {
                storage
                    .nfa_state(id)
                    .trans
                    .is_some_and(|(label, _)| label.matches(c))
            });
            debug_assert!(indexed || !direct, "start index under-approximated the nfa");
        }
        indexed
    }

    pub(crate) fn register_match(&mut self, set: MatchSetId, m: &Match) {
        debug_assert_eq!(m.pattern, self.id);
        self.heaps.entry(set).or_default().push(m.id);
    }

    /// Removes `m` from its heap; absent entries are fine (a match can be
    /// abandoned after its heap was already cleared away).
    pub(crate) fn abandon_match(&mut self, set: MatchSetId, m: MatchId) {
        if let Some(heap) = self.heaps.get_mut(&set) {
            heap.remove(m);
            if heap.is_empty() {
                self.heaps.remove(&set);
            }
        }
    }

    /// True iff `m` tops its heap, or would: the comparator ranks it
    /// strictly above the current top. A match whose heap is gone was
    /// dominated away and can never commit.
    pub(crate) fn is_dominating(&self, m: &Match, set: &MatchSet) -> bool {
        let Some(heap) = self.heaps.get(&set.id) else {
            return false;
        };
        match heap.top(set) {
            Some(top) if top == m.id => true,
            Some(top) => set
                .match_by_id(top)
                .is_some_and(|t| dominance(m, t) == Ordering::Greater),
            None => false,
        }
    }

    /// Walks this pattern's heaps in ascending start order and commits
    /// every undominated top that is ready.
    ///
    /// Heaps whose top is dominated by what has been committed are
    /// cleared; heaps whose top may still grow survive untouched and get
    /// their own attempt when that match dies.
    pub(crate) fn commit_undominated(
        &mut self,
        buffer: &Buffer,
        current: &mut MatchSet,
        others: &mut BTreeMap<MatchSetId, MatchSet>,
        runnables: &mut Vec<Commit>,
    ) {
        let set_ids: Vec<MatchSetId> = self.heaps.keys().copied().collect();
        for set_id in set_ids {
            let set: &mut MatchSet = if set_id == current.id {
                &mut *current
            } else if let Some(set) = others.get_mut(&set_id) {
                set
            } else {
                self.heaps.remove(&set_id);
                continue;
            };

            let top = self.heaps.get(&set_id).and_then(|heap| heap.top(set));
            let Some(top) = top.and_then(|id| set.match_by_id(id)) else {
                self.heaps.remove(&set_id);
                continue;
            };
            if self.committed_end.is_some_and(|end| top.start <= end) {
                self.heaps.remove(&set_id);
                continue;
            }
            if !top.ready() {
                continue;
            }
            if self.anchored_end && !ends_line(buffer, top.end) {
                self.heaps.remove(&set_id);
                continue;
            }

            trace!("commit {:?}@[{}, {}]", self.source, top.start, top.end);
            let (id, commit) =
                (top.id, Commit { pattern: self.id, start: top.start, end: top.end });
            runnables.push(commit);
            self.committed_end = Some(commit.end);
            set.remove_match(id);
            self.heaps.remove(&set_id);
        }
    }

    /// Per-scan reset. Heaps empty if and only if no match is in flight,
    /// and nothing is in flight between scans.
    pub(crate) fn begin_scan(&mut self) {
        self.heaps.clear();
        self.committed_end = None;
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("anchored_start", &self.anchored_start)
            .field("anchored_end", &self.anchored_end)
            .finish()
    }
}

impl PartialOrd for Pattern {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pattern {
    fn cmp(&self, other: &Self) -> Ordering {
        self.source.cmp(&other.source)
    }
}

/// An end-anchored match must stop at the end of the text or just before
/// a line break.
fn ends_line(buffer: &Buffer, end: usize) -> bool {
    match buffer.char_at(end + 1) {
        None | Some('\n') => true,
        Some(_) => false,
    }
}

/// The patterns of one engine, indexed by [`PatternId`]. Slots of removed
/// patterns stay unoccupied so ids are never reused.
#[derive(Default)]
pub(crate) struct PatternSet {
    slots: Vec<Option<Pattern>>,
}

impl PatternSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_id(&self) -> PatternId {
        PatternId(self.slots.len() as u32)
    }

    pub(crate) fn insert(&mut self, pattern: Pattern) {
        debug_assert_eq!(pattern.id, self.next_id());
        self.slots.push(Some(pattern));
    }

    pub(crate) fn get(&self, id: PatternId) -> Option<&Pattern> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: PatternId) -> Option<&mut Pattern> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub(crate) fn remove(&mut self, id: PatternId) -> Option<Pattern> {
        self.slots.get_mut(id.index()).and_then(Option::take)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.slots.iter().flatten()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub(crate) fn begin_scan(&mut self) {
        for pattern in self.slots.iter_mut().flatten() {
            pattern.begin_scan();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::DfaId;

    fn pattern(source: &str) -> Pattern {
        let compiled = CompiledNfa {
            arrival: NfaId(1),
            terminal: NfaId(2),
            anchor_start: false,
            anchor_end: false,
        };
        Pattern::new(PatternId(0), source, &compiled, None)
    }

    fn live_match(id: MatchId, start: usize, end: usize) -> Match {
        Match { id, pattern: PatternId(0), start, end, active: true, is_final: true }
    }

    #[test]
    fn actions_have_set_semantics() {
        let mut p = pattern("abc");
        let action: MatchHandler = Arc::new(|_, _, _| {});
        p.add_action(action.clone());
        p.add_action(action.clone());
        assert_eq!(p.actions().len(), 1);

        let other: MatchHandler = Arc::new(|_, _, _| {});
        p.add_action(other.clone());
        assert_eq!(p.actions().len(), 2);

        p.remove_action(&action);
        p.remove_action(&action);
        assert_eq!(p.actions().len(), 1);
        assert!(p.has_actions());
        p.remove_action(&other);
        assert!(p.has_actions() == false);
    }

    #[test]
    fn abandon_is_idempotent() {
        let mut p = pattern("abc");
        let set = MatchSet {
            id: 7,
            start: 0,
            dfa: DfaId(0),
            matches: vec![live_match(0, 0, 0)],
        };
        p.register_match(7, &set.matches[0]);
        assert!(p.is_dominating(&set.matches[0], &set));

        p.abandon_match(7, 0);
        p.abandon_match(7, 0);
        p.abandon_match(9, 3);
        assert!(p.is_dominating(&set.matches[0], &set) == false);
    }

    #[test]
    fn equality_is_by_source() {
        assert_eq!(pattern("abc"), pattern("abc"));
        assert_ne!(pattern("abc"), pattern("abd"));
        assert!(pattern("abc") < pattern("abd"));
    }

    #[test]
    fn committed_matches_suppress_overlapping_starts() {
        let mut p = pattern("x+");
        let buffer = Buffer::new("xxxxxx");

        // A committed [0, 3] dominates a later candidate starting at 1.
        let mut current = MatchSet {
            id: 0,
            start: 0,
            dfa: DfaId(0),
            matches: vec![Match {
                id: 0,
                pattern: PatternId(0),
                start: 0,
                end: 3,
                active: false,
                is_final: true,
            }],
        };
        p.register_match(0, &current.matches[0]);
        let mut others = BTreeMap::new();
        others.insert(
            1,
            MatchSet {
                id: 1,
                start: 1,
                dfa: DfaId(0),
                matches: vec![Match {
                    id: 1,
                    pattern: PatternId(0),
                    start: 1,
                    end: 3,
                    active: false,
                    is_final: true,
                }],
            },
        );
        p.register_match(1, &others[&1].matches[0]);

        let mut runnables = Vec::new();
        p.commit_undominated(&buffer, &mut current, &mut others, &mut runnables);
        assert_eq!(
            runnables,
            vec![Commit { pattern: PatternId(0), start: 0, end: 3 }]
        );
        assert!(current.matches.is_empty());
        // The dominated candidate lost its heap but was not committed.
        assert!(p.is_dominating(&others[&1].matches[0], &others[&1]) == false);
    }

    #[test]
    fn still_growing_tops_survive_commit_walks() {
        let mut p = pattern("x+");
        let buffer = Buffer::new("xxxxxx");

        let mut current = MatchSet {
            id: 0,
            start: 0,
            dfa: DfaId(0),
            matches: vec![Match {
                id: 0,
                pattern: PatternId(0),
                start: 0,
                end: 0,
                active: false,
                is_final: true,
            }],
        };
        p.register_match(0, &current.matches[0]);
        let mut others = BTreeMap::new();
        others.insert(
            1,
            MatchSet {
                id: 1,
                start: 2,
                dfa: DfaId(0),
                matches: vec![live_match(1, 2, 3)],
            },
        );
        p.register_match(1, &others[&1].matches[0]);

        let mut runnables = Vec::new();
        p.commit_undominated(&buffer, &mut current, &mut others, &mut runnables);
        // [0, 0] committed; the match at 2 is active and keeps its heap.
        assert_eq!(runnables.len(), 1);
        assert!(p.is_dominating(&others[&1].matches[0], &others[&1]));
    }
}
