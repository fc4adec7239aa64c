//! Ownership of all NFA and DFA states, the shared start state, and the
//! start-character indices that keep per-position work independent of the
//! number of registered patterns.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::{
    automata::{
        dfa::DfaState,
        nfa::{CompiledNfa, FragmentBuilder, Label, NfaState},
        DfaId, NfaId, PatternId,
    },
    syntax::{parse, ParseError},
};

/// Give up on enumerating a transition's first characters beyond this many
/// and treat the pattern as startable anywhere.
const START_SET_LIMIT: usize = 512;

/// What one pattern adds to the start-character index; kept per pattern so
/// removal can rebuild the aggregate.
#[derive(Debug)]
struct StartContribution {
    arrival: NfaId,
    chars: Vec<char>,
    any: bool,
}

/// Owns every NFA and DFA state of one engine.
///
/// The start state is a single NFA node with ε-edges to every registered
/// pattern's arrival, so its ε-closure seeds every new match set. DFA
/// states are interned by their canonical basis: equal basis, same state.
///
/// A `NodeStorage` is owned by exactly one shard and a scan holds it
/// mutably, so lazy DFA materialization needs no synchronization; the
/// interning map alone guarantees each basis a single canonical state.
pub(crate) struct NodeStorage {
    pub(super) nfa: Vec<NfaState>,
    pub(super) dfa: Vec<DfaState>,
    pub(super) intern: HashMap<Box<[NfaId]>, DfaId>,
    start: NfaId,
    /// Cache of [`NodeStorage::get_next_from_start`]; invalidated whenever
    /// the start state's ε-list changes.
    start_next: HashMap<char, Option<DfaId>>,
    contributions: HashMap<PatternId, StartContribution>,
    start_chars_ascii: [bool; 128],
    start_chars: HashSet<char>,
    start_any: bool,
    start_patterns: HashMap<char, Vec<PatternId>>,
    any_patterns: Vec<PatternId>,
}

impl NodeStorage {
    pub(crate) fn new() -> Self {
        let start = NfaState {
            owner: None,
            terminal: false,
            failing: false,
            eps: Vec::new(),
            trans: None,
        };
        Self {
            nfa: vec![start],
            dfa: Vec::new(),
            intern: HashMap::new(),
            start: NfaId(0),
            start_next: HashMap::new(),
            contributions: HashMap::new(),
            start_chars_ascii: [false; 128],
            start_chars: HashSet::new(),
            start_any: false,
            start_patterns: HashMap::new(),
            any_patterns: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn nfa_state(&self, id: NfaId) -> &NfaState {
        &self.nfa[id.index()]
    }

    #[inline]
    pub(crate) fn dfa_state(&self, id: DfaId) -> &DfaState {
        &self.dfa[id.index()]
    }

    /// Compiles `source` into the arena without publishing anything.
    ///
    /// On a parse error the arena is rolled back, so a failed registration
    /// leaves no trace.
    pub(crate) fn compile(
        &mut self,
        source: &str,
        owner: PatternId,
    ) -> Result<CompiledNfa, ParseError> {
        let mark = self.nfa.len();
        let mut builder = FragmentBuilder::new(&mut self.nfa, owner);
        match parse(source, &mut builder) {
            Ok(frag) => {
                let compiled = builder.finish(frag);
                debug!(
                    "compiled {:?} into {} nfa states",
                    source,
                    self.nfa.len() - mark
                );
                Ok(compiled)
            }
            Err(err) => {
                self.nfa.truncate(mark);
                Err(err)
            }
        }
    }

    /// Links a compiled pattern into the start state and records its
    /// contribution to the start-character index.
    pub(crate) fn add_to_start(&mut self, compiled: &CompiledNfa, owner: PatternId) {
        let start = self.start;
        self.nfa[start.index()].eps.push(compiled.arrival);

        let (chars, any) = self.first_chars(compiled.arrival);
        self.contributions
            .insert(owner, StartContribution { arrival: compiled.arrival, chars, any });
        self.rebuild_start_index();
        self.start_next.clear();
    }

    /// Unlinks a dropped pattern. Its arena states stay behind but become
    /// unreachable from the start closure, which is all matching looks at.
    pub(crate) fn remove_from_start(&mut self, owner: PatternId) {
        let Some(contribution) = self.contributions.remove(&owner) else {
            return;
        };
        let start = self.start;
        self.nfa[start.index()].eps.retain(|&id| id != contribution.arrival);
        self.rebuild_start_index();
        self.start_next.clear();
    }

    /// The characters a pattern can begin with: a bounded DFS over the
    /// ε-closure of its arrival, giving up on `any` transitions, wide
    /// ranges, or once the set outgrows [`START_SET_LIMIT`].
    fn first_chars(&self, arrival: NfaId) -> (Vec<char>, bool) {
        let mut chars = Vec::new();
        for id in self.eps_closure(&[arrival]) {
            match self.nfa[id.index()].trans {
                Some((Label::Any, _)) => return (Vec::new(), true),
                Some((Label::Char(c), _)) => chars.push(c),
                Some((Label::Range(lo, hi), _)) => {
                    if hi as u32 - lo as u32 >= START_SET_LIMIT as u32 {
                        return (Vec::new(), true);
                    }
                    chars.extend(lo..=hi);
                }
                None => {}
            }
            if chars.len() > START_SET_LIMIT {
                return (Vec::new(), true);
            }
        }
        chars.sort_unstable();
        chars.dedup();
        (chars, false)
    }

    fn rebuild_start_index(&mut self) {
        self.start_chars_ascii = [false; 128];
        self.start_chars.clear();
        self.start_any = false;
        self.start_patterns.clear();
        self.any_patterns.clear();
        for (&owner, contribution) in &self.contributions {
            if contribution.any {
                self.start_any = true;
                self.any_patterns.push(owner);
                continue;
            }
            for &c in &contribution.chars {
                if (c as u32) < 128 {
                    self.start_chars_ascii[c as usize] = true;
                } else {
                    self.start_chars.insert(c);
                }
                self.start_patterns.entry(c).or_default().push(owner);
            }
        }
        self.any_patterns.sort_unstable();
        for patterns in self.start_patterns.values_mut() {
            patterns.sort_unstable();
        }
    }

    /// True when any registered pattern can begin a match with `c`.
    #[inline]
    pub(crate) fn can_start_with(&self, c: char) -> bool {
        if self.start_any {
            return true;
        }
        if (c as u32) < 128 {
            self.start_chars_ascii[c as usize]
        } else {
            self.start_chars.contains(&c)
        }
    }

    /// True when the given pattern can begin a match with `c`, answered
    /// from the index built at registration.
    pub(crate) fn pattern_can_start_with(&self, pattern: PatternId, c: char) -> bool {
        self.any_patterns.binary_search(&pattern).is_ok()
            || self
                .start_patterns
                .get(&c)
                .is_some_and(|patterns| patterns.binary_search(&pattern).is_ok())
    }

    /// The DFA state every match starting on `c` begins in, or `None` when
    /// no pattern can start here.
    pub(crate) fn get_next_from_start(&mut self, c: char) -> Option<DfaId> {
        if !self.can_start_with(c) {
            return None;
        }
        if let Some(&cached) = self.start_next.get(&c) {
            return cached;
        }
        let seeds = self.eps_closure(&[self.start]);
        let next = self.step(&seeds, c);
        let result = if next.is_empty() { None } else { Some(self.dfa_of(next)) };
        self.start_next.insert(c, result);
        result
    }

    /// ε-closure of `seeds`, as a sorted, deduplicated id set.
    pub(crate) fn eps_closure(&self, seeds: &[NfaId]) -> Vec<NfaId> {
        let mut seen = vec![false; self.nfa.len()];
        let mut stack: Vec<NfaId> = seeds.to_vec();
        let mut out = Vec::new();
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut seen[id.index()], true) {
                continue;
            }
            out.push(id);
            stack.extend(self.nfa[id.index()].eps.iter().copied());
        }
        out.sort_unstable();
        out
    }

    /// All states reachable from `from` by consuming `c`, ε-closed.
    pub(super) fn step(&self, from: &[NfaId], c: char) -> Vec<NfaId> {
        let mut targets = Vec::new();
        for &id in from {
            if let Some((label, to)) = self.nfa[id.index()].trans {
                if label.matches(c) {
                    targets.push(to);
                }
            }
        }
        if targets.is_empty() {
            return targets;
        }
        self.eps_closure(&targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_with(patterns: &[&str]) -> NodeStorage {
        let mut storage = NodeStorage::new();
        for (i, source) in patterns.iter().enumerate() {
            let owner = PatternId(i as u32);
            let compiled = storage.compile(source, owner).unwrap();
            storage.add_to_start(&compiled, owner);
        }
        storage
    }

    #[test]
    fn failed_compile_rolls_back() {
        let mut storage = NodeStorage::new();
        let before = storage.nfa.len();
        assert!(storage.compile("a[b", PatternId(0)).is_err());
        assert_eq!(storage.nfa.len(), before);
    }

    #[test]
    fn start_char_index() {
        let storage = storage_with(&["cat", "dog|[0-9]x"]);
        assert!(storage.can_start_with('c'));
        assert!(storage.can_start_with('d'));
        assert!(storage.can_start_with('5'));
        assert!(storage.can_start_with('x') == false);
        assert!(storage.can_start_with('a') == false);

        assert!(storage.pattern_can_start_with(PatternId(0), 'c'));
        assert!(storage.pattern_can_start_with(PatternId(1), 'c') == false);
        assert!(storage.pattern_can_start_with(PatternId(1), 'd'));
        assert!(storage.pattern_can_start_with(PatternId(1), '7'));
    }

    #[test]
    fn wildcard_start_marks_any() {
        let storage = storage_with(&["a", ".b"]);
        assert!(storage.start_any);
        // Negated classes pass anything, so they start anywhere too.
        let storage = storage_with(&["[^x]y"]);
        assert!(storage.start_any);
    }

    #[test]
    fn optional_prefix_contributes_both_chars() {
        let storage = storage_with(&["a?bc"]);
        assert!(storage.can_start_with('a'));
        assert!(storage.can_start_with('b'));
        assert!(storage.can_start_with('c') == false);
    }

    #[test]
    fn get_next_from_start_is_cached_and_nullable() {
        let mut storage = storage_with(&["cat"]);
        assert_eq!(storage.get_next_from_start('x'), None);
        let first = storage.get_next_from_start('c').unwrap();
        let second = storage.get_next_from_start('c').unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn removal_unlinks_pattern() {
        let mut storage = storage_with(&["cat", "car"]);
        storage.remove_from_start(PatternId(0));
        assert!(storage.can_start_with('c'));
        storage.remove_from_start(PatternId(1));
        assert!(storage.can_start_with('c') == false);
        assert_eq!(storage.get_next_from_start('c'), None);
    }
}
