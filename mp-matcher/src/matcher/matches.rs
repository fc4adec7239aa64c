//! Match objects, per-start-position match sets, and the dominance
//! plumbing that keeps only the leftmost-longest candidate per pattern
//! committable.

use std::{cmp::Ordering, collections::BTreeMap};

use crate::{
    automata::{dfa::DfaState, storage::NodeStorage, DfaId, PatternId},
    buffer::Buffer,
    matcher::pattern::PatternSet,
};

pub(crate) type MatchId = u64;
pub(crate) type MatchSetId = u64;

/// A committed match on its way to the pattern's actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Commit {
    pub pattern: PatternId,
    pub start: usize,
    /// Inclusive.
    pub end: usize,
}

/// One pattern's candidate match: fixed start, growing end.
///
/// `end` records the last position at which the DFA was terminal for the
/// pattern, so a match that grows past its last viable ending and then
/// dies still commits the span that actually matched.
#[derive(Debug)]
pub(crate) struct Match {
    pub id: MatchId,
    pub pattern: PatternId,
    pub start: usize,
    pub end: usize,
    pub active: bool,
    pub is_final: bool,
}

impl Match {
    /// Committable the moment a commit attempt reaches it: it has matched
    /// and cannot grow any further.
    pub(crate) fn ready(&self) -> bool {
        self.is_final && !self.active && !self.is_strongly_dominated()
    }

    /// Reserved hook; nothing strongly dominates today.
    pub(crate) fn is_strongly_dominated(&self) -> bool {
        false
    }
}

/// The dominance order between two matches of the same pattern in the same
/// set: longer wins, ties go to the earlier-created match.
/// `Ordering::Greater` means `a` dominates `b`.
pub(crate) fn dominance(a: &Match, b: &Match) -> Ordering {
    a.end.cmp(&b.end).then_with(|| b.id.cmp(&a.id))
}

/// Priority structure over the matches of one (pattern, match set) pair.
///
/// Not a `BinaryHeap`: the sort key (the match end) mutates while a match
/// is in flight, so ordering is resolved against live match data on every
/// query. A set holds at most one match per pattern, which keeps this
/// O(1) in practice.
#[derive(Debug, Default)]
pub(crate) struct DominanceHeap {
    entries: Vec<MatchId>,
}

impl DominanceHeap {
    pub(crate) fn push(&mut self, id: MatchId) {
        if !self.entries.contains(&id) {
            self.entries.push(id);
        }
    }

    pub(crate) fn remove(&mut self, id: MatchId) {
        self.entries.retain(|&e| e != id);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The dominating entry, resolved against `set`'s live matches.
    pub(crate) fn top(&self, set: &MatchSet) -> Option<MatchId> {
        self.entries
            .iter()
            .filter_map(|&id| set.match_by_id(id))
            .max_by(|a, b| dominance(a, b))
            .map(|m| m.id)
    }
}

/// Everything the match-set lifecycle needs from its engine.
pub(crate) struct ProgressCx<'a> {
    pub storage: &'a mut NodeStorage,
    pub patterns: &'a mut PatternSet,
    pub buffer: &'a Buffer,
    pub runnables: &'a mut Vec<Commit>,
}

/// All in-flight candidate matches that started at one input position,
/// advancing through the DFA as a single cursor.
#[derive(Debug)]
pub(crate) struct MatchSet {
    pub id: MatchSetId,
    pub start: usize,
    pub dfa: DfaId,
    pub matches: Vec<Match>,
}

impl MatchSet {
    /// Births one match per candidate pattern. The caller has already
    /// filtered candidates down to patterns the start DFA is active and
    /// not failing for.
    pub(crate) fn new(
        id: MatchSetId,
        start: usize,
        dfa: DfaId,
        state: &DfaState,
        candidates: &[PatternId],
        next_match_id: &mut MatchId,
    ) -> Self {
        let matches = candidates
            .iter()
            .map(|&pattern| {
                let m = Match {
                    id: *next_match_id,
                    pattern,
                    start,
                    end: start,
                    active: true,
                    is_final: state.is_terminal_for(pattern),
                };
                *next_match_id += 1;
                m
            })
            .collect();
        MatchSet { id, start, dfa, matches }
    }

    pub(crate) fn match_by_id(&self, id: MatchId) -> Option<&Match> {
        self.matches.iter().find(|m| m.id == id)
    }

    pub(crate) fn match_for(&self, pattern: PatternId) -> Option<&Match> {
        self.matches.iter().find(|m| m.pattern == pattern)
    }

    pub(crate) fn remove_match(&mut self, id: MatchId) {
        self.matches.retain(|m| m.id != id);
    }

    /// Advances the cursor by `c` at `pos`. Returns false when the set
    /// died and must be dropped by the engine.
    ///
    /// `others` holds every other live set, keyed by id; commit attempts
    /// walk a pattern's heaps across all of them.
    pub(crate) fn progress(
        &mut self,
        cx: &mut ProgressCx<'_>,
        others: &mut BTreeMap<MatchSetId, MatchSet>,
        c: char,
        pos: usize,
    ) -> bool {
        if self.matches.is_empty() {
            return false;
        }
        let Some(next) = cx.storage.next(self.dfa, c) else {
            // The cursor died; nothing survives this position.
            for m in &mut self.matches {
                m.active = false;
            }
            let finals: Vec<PatternId> =
                self.matches.iter().filter(|m| m.is_final).map(|m| m.pattern).collect();
            for pattern in finals {
                self.attempt_commit(cx, others, pattern);
            }
            self.retire_inactive(cx.patterns);
            return false;
        };

        // Flags first: a failing state kills the pattern's match at this
        // position even when the basis is simultaneously terminal for it,
        // so its end must not advance here.
        let mut doomed: Vec<PatternId> = Vec::new();
        {
            let state = cx.storage.dfa_state(next);
            for m in &mut self.matches {
                if state.is_failing_for(m.pattern) {
                    m.active = false;
                    doomed.push(m.pattern);
                    continue;
                }
                let active = state.is_active_for(m.pattern);
                m.active = active;
                if active {
                    if state.is_terminal_for(m.pattern) {
                        m.end = pos;
                        m.is_final = true;
                    }
                } else {
                    doomed.push(m.pattern);
                }
            }
        }
        for pattern in doomed {
            if self.match_for(pattern).is_some_and(|m| m.is_final) {
                self.attempt_commit(cx, others, pattern);
            }
        }
        self.retire_inactive(cx.patterns);

        self.dfa = next;
        !self.matches.is_empty()
    }

    /// Commits whatever is ready: final matches that can no longer grow.
    ///
    /// Called by the engine once per position for live sets (a no-op
    /// there, since anything no longer growable was handled during
    /// `progress`) and during the end-of-input drain after marking every
    /// match inactive.
    pub(crate) fn final_commit(
        &mut self,
        cx: &mut ProgressCx<'_>,
        others: &mut BTreeMap<MatchSetId, MatchSet>,
    ) {
        let ready: Vec<PatternId> =
            self.matches.iter().filter(|m| m.ready()).map(|m| m.pattern).collect();
        for pattern in ready {
            self.attempt_commit(cx, others, pattern);
        }
        self.retire_inactive(cx.patterns);
    }

    /// One commit attempt for `pattern`'s match in this set: if it is
    /// dominating in its heap, hand control to the pattern's
    /// `commit_undominated`.
    fn attempt_commit(
        &mut self,
        cx: &mut ProgressCx<'_>,
        others: &mut BTreeMap<MatchSetId, MatchSet>,
        pattern: PatternId,
    ) {
        let dominating = match (self.match_for(pattern), cx.patterns.get(pattern)) {
            (Some(m), Some(p)) => p.is_dominating(m, self),
            _ => false,
        };
        if dominating {
            if let Some(p) = cx.patterns.get_mut(pattern) {
                p.commit_undominated(cx.buffer, self, others, cx.runnables);
            }
        }
    }

    /// Drops every no-longer-active match, abandoning its heap entry.
    fn retire_inactive(&mut self, patterns: &mut PatternSet) {
        let id = self.id;
        let mut kept = Vec::with_capacity(self.matches.len());
        for m in self.matches.drain(..) {
            if m.active {
                kept.push(m);
            } else if let Some(p) = patterns.get_mut(m.pattern) {
                p.abandon_match(id, m.id);
            }
        }
        self.matches = kept;
    }
}
