//! DFA states and lazy subset construction.
//!
//! A DFA state is nothing more than its canonical basis: the sorted set of
//! NFA state ids it stands for, plus lookup tables derived from that basis
//! once at interning time. Transitions are computed on first use and
//! memoized per character, with a dense table for ASCII (the hot path) and
//! a map for everything else. A miss is cached too: "known dead" is as
//! valuable as a hit.

use itertools::Itertools;
use log::trace;

use crate::automata::{storage::NodeStorage, DfaId, NfaId, PatternId};

/// Memoized outcome of one `(state, char)` transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CacheSlot {
    Unknown,
    Dead,
    To(DfaId),
}

impl CacheSlot {
    fn pack(next: Option<DfaId>) -> Self {
        match next {
            Some(id) => CacheSlot::To(id),
            None => CacheSlot::Dead,
        }
    }

    fn unpack(self) -> Option<Option<DfaId>> {
        match self {
            CacheSlot::Unknown => None,
            CacheSlot::Dead => Some(None),
            CacheSlot::To(id) => Some(Some(id)),
        }
    }
}

/// One interned DFA state.
///
/// The per-pattern sets are sorted `PatternId` slices; membership is a
/// binary search. They are fixed at interning time because the basis never
/// changes afterwards.
pub(crate) struct DfaState {
    basis: Box<[NfaId]>,
    /// Patterns owning at least one basis state.
    active: Box<[PatternId]>,
    /// Patterns for which some basis state is terminal.
    terminal: Box<[PatternId]>,
    /// Patterns for which some basis state is a failing sink.
    failing: Box<[PatternId]>,
    ascii_next: [CacheSlot; 128],
    other_next: std::collections::HashMap<char, Option<DfaId>>,
}

impl DfaState {
    pub(crate) fn basis(&self) -> &[NfaId] {
        &self.basis
    }

    /// Patterns still live in this state, in ascending id order.
    pub(crate) fn active_patterns(&self) -> &[PatternId] {
        &self.active
    }

    #[inline]
    pub(crate) fn is_active_for(&self, pattern: PatternId) -> bool {
        self.active.binary_search(&pattern).is_ok()
    }

    #[inline]
    pub(crate) fn is_terminal_for(&self, pattern: PatternId) -> bool {
        self.terminal.binary_search(&pattern).is_ok()
    }

    #[inline]
    pub(crate) fn is_failing_for(&self, pattern: PatternId) -> bool {
        self.failing.binary_search(&pattern).is_ok()
    }

    #[inline]
    pub(crate) fn has_failing(&self) -> bool {
        !self.failing.is_empty()
    }

    fn lookup(&self, c: char) -> Option<Option<DfaId>> {
        if (c as u32) < 128 {
            self.ascii_next[c as usize].unpack()
        } else {
            self.other_next.get(&c).copied()
        }
    }

    fn store(&mut self, c: char, next: Option<DfaId>) {
        if (c as u32) < 128 {
            self.ascii_next[c as usize] = CacheSlot::pack(next);
        } else {
            self.other_next.insert(c, next);
        }
    }
}

impl NodeStorage {
    /// The interning point: canonicalize, look up, construct on miss.
    ///
    /// Construction derives the per-pattern active/terminal/failing sets
    /// from the basis once; equal bases always yield the same `DfaId`.
    pub(crate) fn dfa_of(&mut self, set: Vec<NfaId>) -> DfaId {
        let basis: Box<[NfaId]> = set.into_iter().sorted_unstable().dedup().collect();
        debug_assert!(!basis.is_empty(), "dfa_of over an empty basis");
        if let Some(&id) = self.intern.get(&basis) {
            return id;
        }

        let mut active = Vec::new();
        let mut terminal = Vec::new();
        let mut failing = Vec::new();
        for &id in basis.iter() {
            let state = self.nfa_state(id);
            let owner = state
                .owner
                .expect("start state can never be part of a DFA basis");
            active.push(owner);
            if state.terminal {
                terminal.push(owner);
            }
            if state.failing {
                failing.push(owner);
            }
        }
        for set in [&mut active, &mut terminal, &mut failing] {
            set.sort_unstable();
            set.dedup();
        }

        let id = DfaId(self.dfa.len() as u32);
        trace!("interned dfa {} over {} nfa states", id.0, basis.len());
        self.intern.insert(basis.clone(), id);
        self.dfa.push(DfaState {
            basis,
            active: active.into(),
            terminal: terminal.into(),
            failing: failing.into(),
            ascii_next: [CacheSlot::Unknown; 128],
            other_next: std::collections::HashMap::new(),
        });
        id
    }

    /// δ(`from`, `c`): the lazy subset-construction transition.
    ///
    /// Returns `None` when no basis state consumes `c` ("known dead"); the
    /// outcome, dead or not, is cached on `from` for that character.
    pub(crate) fn next(&mut self, from: DfaId, c: char) -> Option<DfaId> {
        if let Some(cached) = self.dfa[from.index()].lookup(c) {
            return cached;
        }
        // The basis is copied out so the arena can grow while we intern.
        let basis: Vec<NfaId> = self.dfa[from.index()].basis.to_vec();
        let targets = self.step(&basis, c);
        let next = if targets.is_empty() { None } else { Some(self.dfa_of(targets)) };
        self.dfa[from.index()].store(c, next);
        next
    }
}
