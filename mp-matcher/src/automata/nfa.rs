//! NFA states and the fragment algebra that compiles one pattern into the
//! shared arena.
//!
//! A fragment is an `(arrival, ending)` pair of state ids. Compositions only
//! ever add states and ε-edges; nothing is removed or rewired afterwards,
//! so a published pattern's NFA is structurally immutable.

use crate::{
    automata::{NfaId, PatternId},
    syntax::{ClassItem, ExprBuilder},
};

/// Label on a consuming transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Label {
    Char(char),
    /// Inclusive on both ends.
    Range(char, char),
    Any,
}

impl Label {
    #[inline]
    pub(crate) fn matches(self, c: char) -> bool {
        match self {
            Label::Char(l) => l == c,
            Label::Range(lo, hi) => lo <= c && c <= hi,
            Label::Any => true,
        }
    }
}

/// A single NFA state.
///
/// Each state consumes through at most one labelled transition; character
/// classes fan out through ε-edges to one consuming state per member
/// instead of carrying several labels on one state.
#[derive(Debug)]
pub(crate) struct NfaState {
    /// `None` only for the shared start state.
    pub owner: Option<PatternId>,
    /// Basis membership makes the DFA terminal for the owner.
    pub terminal: bool,
    /// Basis membership kills the owner's matches (negated-class sink).
    pub failing: bool,
    pub eps: Vec<NfaId>,
    pub trans: Option<(Label, NfaId)>,
}

impl NfaState {
    fn plain(owner: PatternId) -> Self {
        NfaState { owner: Some(owner), terminal: false, failing: false, eps: Vec::new(), trans: None }
    }
}

/// An NFA under construction: where a sub-expression is entered and where
/// it ends.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Fragment {
    pub arrival: NfaId,
    pub ending: NfaId,
}

/// One pattern's finished NFA, ready to be spliced into the start state.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CompiledNfa {
    pub arrival: NfaId,
    /// The terminal node wrapping the final ending.
    pub terminal: NfaId,
    pub anchor_start: bool,
    pub anchor_end: bool,
}

/// Compiles one pattern into `arena` by receiving the parser's build calls.
pub(crate) struct FragmentBuilder<'a> {
    arena: &'a mut Vec<NfaState>,
    owner: PatternId,
    anchor_start: bool,
    anchor_end: bool,
}

impl<'a> FragmentBuilder<'a> {
    pub(crate) fn new(arena: &'a mut Vec<NfaState>, owner: PatternId) -> Self {
        Self { arena, owner, anchor_start: false, anchor_end: false }
    }

    fn push(&mut self, state: NfaState) -> NfaId {
        let id = NfaId(self.arena.len() as u32);
        self.arena.push(state);
        id
    }

    fn state(&mut self) -> NfaId {
        self.push(NfaState::plain(self.owner))
    }

    /// A state that consumes `label` and moves to `to`.
    fn consuming(&mut self, label: Label, to: NfaId) -> NfaId {
        let id = self.state();
        self.arena[id.index()].trans = Some((label, to));
        id
    }

    fn eps(&mut self, from: NfaId, to: NfaId) {
        self.arena[from.index()].eps.push(to);
    }

    fn item_label(item: &ClassItem) -> Label {
        match *item {
            ClassItem::Char(c) => Label::Char(c),
            ClassItem::Range(lo, hi) => Label::Range(lo, hi),
        }
    }

    /// Wraps the whole-pattern fragment's ending in the terminal node.
    pub(crate) fn finish(mut self, frag: Fragment) -> CompiledNfa {
        let terminal = self.state();
        self.arena[terminal.index()].terminal = true;
        self.eps(frag.ending, terminal);
        CompiledNfa {
            arrival: frag.arrival,
            terminal,
            anchor_start: self.anchor_start,
            anchor_end: self.anchor_end,
        }
    }
}

impl ExprBuilder for FragmentBuilder<'_> {
    type Frag = Fragment;

    fn literal(&mut self, c: char) -> Fragment {
        let ending = self.state();
        let arrival = self.consuming(Label::Char(c), ending);
        Fragment { arrival, ending }
    }

    fn any(&mut self) -> Fragment {
        let ending = self.state();
        let arrival = self.consuming(Label::Any, ending);
        Fragment { arrival, ending }
    }

    fn class(&mut self, items: &[ClassItem], negated: bool) -> Fragment {
        let arrival = self.state();
        let ending = self.state();
        if negated {
            // Any character passes, but consuming a member lands in the
            // failing sink; a DFA basis containing the sink kills every
            // in-flight match of this pattern at that position.
            let pass = self.consuming(Label::Any, ending);
            self.eps(arrival, pass);
            let sink = self.state();
            self.arena[sink.index()].failing = true;
            for item in items {
                let member = self.consuming(Self::item_label(item), sink);
                self.eps(arrival, member);
            }
        } else {
            for item in items {
                let member = self.consuming(Self::item_label(item), ending);
                self.eps(arrival, member);
            }
        }
        Fragment { arrival, ending }
    }

    fn concat(&mut self, lhs: Fragment, rhs: Fragment) -> Fragment {
        self.eps(lhs.ending, rhs.arrival);
        Fragment { arrival: lhs.arrival, ending: rhs.ending }
    }

    fn alternate(&mut self, lhs: Fragment, rhs: Fragment) -> Fragment {
        let arrival = self.state();
        let ending = self.state();
        self.eps(arrival, lhs.arrival);
        self.eps(arrival, rhs.arrival);
        self.eps(lhs.ending, ending);
        self.eps(rhs.ending, ending);
        Fragment { arrival, ending }
    }

    fn optional(&mut self, frag: Fragment) -> Fragment {
        self.eps(frag.arrival, frag.ending);
        frag
    }

    fn star(&mut self, frag: Fragment) -> Fragment {
        self.eps(frag.arrival, frag.ending);
        self.eps(frag.ending, frag.arrival);
        frag
    }

    fn plus(&mut self, frag: Fragment) -> Fragment {
        self.eps(frag.ending, frag.arrival);
        frag
    }

    fn anchor_start(&mut self) {
        self.anchor_start = true;
    }

    fn anchor_end(&mut self) {
        self.anchor_end = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    fn compile(pattern: &str) -> (Vec<NfaState>, CompiledNfa) {
        let mut arena = Vec::new();
        let mut builder = FragmentBuilder::new(&mut arena, PatternId(0));
        let frag = parse(pattern, &mut builder).unwrap();
        let compiled = builder.finish(frag);
        (arena, compiled)
    }

    /// Single-threaded closure walk for structural assertions.
    fn closure(arena: &[NfaState], seed: NfaId) -> Vec<NfaId> {
        let mut seen = vec![false; arena.len()];
        let mut stack = vec![seed];
        let mut out = Vec::new();
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut seen[id.index()], true) {
                continue;
            }
            out.push(id);
            stack.extend(arena[id.index()].eps.iter().copied());
        }
        out.sort();
        out
    }

    fn step(arena: &[NfaState], from: &[NfaId], c: char) -> Vec<NfaId> {
        let mut out = Vec::new();
        for &id in from {
            if let Some((label, to)) = arena[id.index()].trans {
                if label.matches(c) {
                    out.extend(closure(arena, to));
                }
            }
        }
        out.sort();
        out.dedup();
        out
    }

    fn accepts(pattern: &str, input: &str) -> bool {
        let (arena, compiled) = compile(pattern);
        let mut states = closure(&arena, compiled.arrival);
        for c in input.chars() {
            states = step(&arena, &states, c);
            if states.iter().any(|id| arena[id.index()].failing) {
                return false;
            }
        }
        states.iter().any(|id| arena[id.index()].terminal)
    }

    #[test]
    fn literal_chain() {
        assert!(accepts("cat", "cat"));
        assert!(accepts("cat", "cut") == false);
        assert!(accepts("cat", "ca") == false);
    }

    #[test]
    fn quantifiers() {
        assert!(accepts("a+", "aaa"));
        assert!(accepts("a+", "") == false);
        assert!(accepts("ab*c", "ac"));
        assert!(accepts("ab*c", "abbbc"));
        assert!(accepts("ab?c", "abc"));
        assert!(accepts("ab?c", "abbc") == false);
    }

    #[test]
    fn alternation_and_classes() {
        assert!(accepts("foo|bar", "foo"));
        assert!(accepts("foo|bar", "bar"));
        assert!(accepts("foo|bar", "foobar") == false);
        assert!(accepts("[0-9]+", "2026"));
        assert!(accepts("[0-9]+", "20a6") == false);
        assert!(accepts("a.c", "axc"));
    }

    #[test]
    fn negated_class_fails_on_member() {
        assert!(accepts("[^a]", "x"));
        assert!(accepts("[^a]", "a") == false);
        assert!(accepts("[^a-c]+", "xyz"));
        assert!(accepts("[^a-c]+", "xbz") == false);
    }

    #[test]
    fn terminal_wraps_ending() {
        let (arena, compiled) = compile("ab");
        assert!(arena[compiled.terminal.index()].terminal);
        // Only the wrap node is terminal.
        assert_eq!(arena.iter().filter(|s| s.terminal).count(), 1);
    }

    #[test]
    fn anchors_become_flags() {
        let (_, compiled) = compile("^a$");
        assert!(compiled.anchor_start && compiled.anchor_end);
        let (_, compiled) = compile("a");
        assert!(compiled.anchor_start == false);
        assert!(compiled.anchor_end == false);
    }
}
