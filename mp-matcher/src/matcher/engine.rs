//! One shard's engine: its registry, its node storage, and the outer scan
//! loop that streams the buffer through every active match set.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::{
    automata::{storage::NodeStorage, PatternId},
    buffer::Buffer,
    matcher::{
        matches::{Commit, MatchId, MatchSet, MatchSetId, ProgressCx},
        pattern::{Pattern, PatternSet},
        prefilter::{self, CandidateStarts, Prefilter},
        MatchHandler,
    },
    syntax::ParseError,
};

/// A self-contained matching engine over one partition of the pattern set.
pub(crate) struct Engine {
    shard: usize,
    storage: NodeStorage,
    patterns: PatternSet,
    by_source: HashMap<String, PatternId>,
    prefilter_enabled: bool,
    prefilter: Option<Prefilter>,
    prefilter_stale: bool,
}

impl Engine {
    pub(crate) fn new(shard: usize, prefilter: bool) -> Self {
        Engine {
            shard,
            storage: NodeStorage::new(),
            patterns: PatternSet::new(),
            by_source: HashMap::new(),
            prefilter_enabled: prefilter,
            prefilter: None,
            prefilter_stale: true,
        }
    }

    pub(crate) fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Compiles `source` if it is new and registers `action` for it.
    /// A failed parse has no side effects.
    pub(crate) fn add(&mut self, source: &str, action: MatchHandler) -> Result<(), ParseError> {
        if let Some(&id) = self.by_source.get(source) {
            let pattern = self.patterns.get_mut(id).expect("registry entries stay live");
            pattern.add_action(action);
            return Ok(());
        }

        let id = self.patterns.next_id();
        let compiled = self.storage.compile(source, id)?;
        let mut pattern = Pattern::new(id, source, &compiled, prefilter::extract_kernel(source));
        pattern.add_action(action);
        debug_assert!(self.storage.nfa_state(pattern.terminal).terminal);
        self.storage.add_to_start(&compiled, id);
        self.patterns.insert(pattern);
        self.by_source.insert(source.to_string(), id);
        self.prefilter_stale = true;
        debug!("shard {}: registered {:?} as pattern {}", self.shard, source, id.0);
        Ok(())
    }

    /// Removes `action` from `source`'s pattern and drops the pattern
    /// once its last action is gone. Takes effect at the next scan.
    pub(crate) fn remove(&mut self, source: &str, action: &MatchHandler) {
        let Some(&id) = self.by_source.get(source) else {
            return;
        };
        let pattern = self.patterns.get_mut(id).expect("registry entries stay live");
        pattern.remove_action(action);
        if !pattern.has_actions() {
            self.storage.remove_from_start(id);
            self.patterns.remove(id);
            self.by_source.remove(source);
            self.prefilter_stale = true;
            debug!("shard {}: dropped {:?}", self.shard, source);
        }
    }

    /// Scans the whole buffer, firing every pattern's actions once per
    /// committed match, in ascending final-position order.
    pub(crate) fn scan(&mut self, buffer: &mut Buffer) {
        if self.prefilter_stale {
            self.prefilter = if self.prefilter_enabled {
                Prefilter::build(&self.patterns)
            } else {
                None
            };
            self.prefilter_stale = false;
        }
        self.patterns.begin_scan();
        debug!(
            "shard {}: scanning {} chars against {} patterns",
            self.shard,
            buffer.len(),
            self.patterns.len()
        );

        let candidates: Option<CandidateStarts> =
            self.prefilter.as_ref().map(|p| p.scan(buffer));
        buffer.rewind();

        let mut sets: BTreeMap<MatchSetId, MatchSet> = BTreeMap::new();
        let mut next_set_id: MatchSetId = 0;
        let mut next_match_id: MatchId = 0;
        let mut runnables: Vec<Commit> = Vec::new();

        while buffer.has_next() {
            let c = buffer.next();
            let pos = buffer.current_pos();

            // Advance every active set, oldest start first, so the
            // leftmost candidate commits before anything it dominates.
            for id in Self::set_ids(&sets) {
                let mut set = sets.remove(&id).expect("set ids are stable within a position");
                let mut cx = ProgressCx {
                    storage: &mut self.storage,
                    patterns: &mut self.patterns,
                    buffer: &*buffer,
                    runnables: &mut runnables,
                };
                if set.progress(&mut cx, &mut sets, c, pos) {
                    sets.insert(id, set);
                }
            }

            self.spawn(&mut sets, &mut next_set_id, &mut next_match_id, candidates.as_ref(), &*buffer, c, pos);

            // Commit anything newly ready; a no-op for sets still able to
            // grow, but kept symmetrical with the end-of-input drain.
            for id in Self::set_ids(&sets) {
                let mut set = sets.remove(&id).expect("set ids are stable within a position");
                let mut cx = ProgressCx {
                    storage: &mut self.storage,
                    patterns: &mut self.patterns,
                    buffer: &*buffer,
                    runnables: &mut runnables,
                };
                set.final_commit(&mut cx, &mut sets);
                if !set.matches.is_empty() {
                    sets.insert(id, set);
                }
            }

            self.fire(&mut runnables, &*buffer);
        }

        // Drain: the cursor is dead for everyone; commit permissively.
        for id in Self::set_ids(&sets) {
            let mut set = sets.remove(&id).expect("set ids are stable at drain");
            for m in &mut set.matches {
                m.active = false;
            }
            let mut cx = ProgressCx {
                storage: &mut self.storage,
                patterns: &mut self.patterns,
                buffer: &*buffer,
                runnables: &mut runnables,
            };
            set.final_commit(&mut cx, &mut sets);
        }
        self.fire(&mut runnables, &*buffer);
    }

    fn set_ids(sets: &BTreeMap<MatchSetId, MatchSet>) -> Vec<MatchSetId> {
        sets.keys().copied().collect()
    }

    /// Maybe give birth to a match set at `pos`: the start DFA must have
    /// somewhere to go on `c`, and each candidate pattern must be live,
    /// not killed at birth, allowed by its anchor, and allowed by the
    /// prefilter.
    #[allow(clippy::too_many_arguments)]
    fn spawn(
        &mut self,
        sets: &mut BTreeMap<MatchSetId, MatchSet>,
        next_set_id: &mut MatchSetId,
        next_match_id: &mut MatchId,
        candidates: Option<&CandidateStarts>,
        buffer: &Buffer,
        c: char,
        pos: usize,
    ) {
        let allowed = match candidates {
            Some(filter) => match filter.patterns_at(pos) {
                Some(patterns) => Some(patterns),
                None => return,
            },
            None => None,
        };
        let Some(start_dfa) = self.storage.get_next_from_start(c) else {
            return;
        };

        let state = self.storage.dfa_state(start_dfa);
        let mut births: Vec<PatternId> = Vec::new();
        for &id in state.active_patterns() {
            if state.is_failing_for(id) {
                continue;
            }
            let Some(pattern) = self.patterns.get(id) else {
                continue;
            };
            if !pattern.has_actions() {
                continue;
            }
            if pattern.anchored_start && pos != 0 && buffer.char_at(pos - 1) != Some('\n') {
                continue;
            }
            if allowed.is_some_and(|patterns| !patterns.contains(&id)) {
                continue;
            }
            debug_assert!(pattern.can_start_with(c, &self.storage));
            births.push(id);
        }
        if births.is_empty() {
            return;
        }

        let set = MatchSet::new(*next_set_id, pos, start_dfa, state, &births, next_match_id);
        *next_set_id += 1;
        for m in &set.matches {
            self.patterns
                .get_mut(m.pattern)
                .expect("candidates were filtered to live patterns")
                .register_match(set.id, m);
        }
        sets.insert(set.id, set);
    }

    fn fire(&self, runnables: &mut Vec<Commit>, buffer: &Buffer) {
        for commit in runnables.drain(..) {
            if let Some(pattern) = self.patterns.get(commit.pattern) {
                for action in pattern.actions() {
                    action(buffer, commit.start, commit.end);
                }
            }
        }
    }
}
