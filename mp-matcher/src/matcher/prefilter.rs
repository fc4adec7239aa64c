//! The optional literal prefilter: extract a mandatory literal kernel per
//! pattern, run one Aho-Corasick pass over the input, and only give birth
//! to match sets where some kernel (shifted by its distance from the match
//! start) actually occurs.
//!
//! The prefilter is a screen, never an oracle: a kernel is only usable
//! when the distance between a match's start and the kernel's first
//! occurrence is bounded, and every position in that bound becomes a
//! candidate. Enabling the prefilter can therefore thin out where matches
//! are *looked for* but never change what is committed.

use std::collections::HashMap;

use aho_corasick::AhoCorasick;
use log::debug;

use crate::{
    automata::PatternId,
    buffer::Buffer,
    matcher::pattern::PatternSet,
    syntax::{parse, ClassItem, ExprBuilder},
};

/// Kernels whose start can trail the match start by more than this are
/// discarded; expanding candidates across a huge bound would cost more
/// than the screen saves.
const MAX_PREFIX_DISTANCE: usize = 16;

/// A fixed literal that must occur in every match of its pattern, at a
/// bounded distance from the match start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Kernel {
    pub(crate) text: String,
    /// Fewest chars that can precede the kernel in a match.
    pub(crate) pre_min: usize,
    /// Most chars that can precede the kernel in a match.
    pub(crate) pre_max: usize,
}

/// A mandatory literal somewhere in an expression, with bounds on how many
/// chars can precede it.
#[derive(Clone, Debug)]
struct Candidate {
    text: String,
    pre_min: usize,
    /// `None` when an unbounded repetition sits between the expression
    /// start and this literal.
    pre_max: Option<usize>,
}

impl Candidate {
    fn shift(self, min: usize, max: Option<usize>) -> Candidate {
        Candidate {
            text: self.text,
            pre_min: self.pre_min + min,
            pre_max: self.pre_max.zip(max).map(|(a, b)| a + b),
        }
    }
}

/// Compositional literal analysis of one sub-expression.
///
/// `prefix` is a literal every match of the expression starts with and
/// `suffix` one every match ends with; tracking both lets concatenation
/// join runs across its boundary, which is how `abc` survives in `abc+`
/// and `literal` in `ab[0-9]literal`.
#[derive(Clone, Debug, Default)]
pub(crate) struct LitInfo {
    /// The one string this expression matches, when there is exactly one.
    exact: Option<String>,
    /// Length bounds over everything this expression matches; a `None`
    /// max means unbounded.
    min: usize,
    max: Option<usize>,
    prefix: Option<String>,
    suffix: Option<Candidate>,
    /// Best mandatory literal seen anywhere in the expression.
    best: Option<Candidate>,
}

impl LitInfo {
    fn opaque(len: usize) -> LitInfo {
        LitInfo { exact: None, min: len, max: Some(len), ..Default::default() }
    }

    fn of_exact(text: String) -> LitInfo {
        let len = text.chars().count();
        LitInfo {
            exact: Some(text.clone()),
            min: len,
            max: Some(len),
            prefix: Some(text.clone()),
            suffix: Some(Candidate { text: text.clone(), pre_min: 0, pre_max: Some(0) }),
            best: Some(Candidate { text, pre_min: 0, pre_max: Some(0) }),
        }
    }
}

/// Picks the best mandatory literal: longest text, then bounded prefix
/// distance.
fn pick(candidates: impl IntoIterator<Item = Option<Candidate>>) -> Option<Candidate> {
    candidates
        .into_iter()
        .flatten()
        .max_by_key(|c| (c.text.chars().count(), c.pre_max.is_some()))
}

/// Drives the same grammar as the NFA builder but computes [`LitInfo`]
/// instead of states.
pub(crate) struct LiteralScanner;

impl ExprBuilder for LiteralScanner {
    type Frag = LitInfo;

    fn literal(&mut self, c: char) -> LitInfo {
        LitInfo::of_exact(c.to_string())
    }

    fn any(&mut self) -> LitInfo {
        LitInfo::opaque(1)
    }

    fn class(&mut self, _items: &[ClassItem], _negated: bool) -> LitInfo {
        LitInfo::opaque(1)
    }

    fn concat(&mut self, lhs: LitInfo, rhs: LitInfo) -> LitInfo {
        let exact = match (lhs.exact.as_deref(), rhs.exact.as_deref()) {
            (Some(a), Some(b)) => Some(format!("{a}{b}")),
            _ => None,
        };
        let prefix = match (&lhs.exact, &rhs.prefix) {
            (Some(a), Some(b)) => Some(format!("{a}{b}")),
            (Some(a), None) => Some(a.clone()),
            _ => lhs.prefix.clone(),
        };
        // A run reaching the left side's end joins a run opening the
        // right side.
        let boundary = match (&lhs.suffix, &rhs.prefix) {
            (Some(s), Some(p)) => Some(Candidate {
                text: format!("{}{p}", s.text),
                pre_min: s.pre_min,
                pre_max: s.pre_max,
            }),
            _ => None,
        };
        let suffix = match &rhs.exact {
            Some(b) => match &lhs.suffix {
                Some(s) => Some(Candidate {
                    text: format!("{}{b}", s.text),
                    pre_min: s.pre_min,
                    pre_max: s.pre_max,
                }),
                None => Some(Candidate {
                    text: b.clone(),
                    pre_min: lhs.min,
                    pre_max: lhs.max,
                }),
            },
            None => rhs.suffix.clone().map(|s| s.shift(lhs.min, lhs.max)),
        };
        let best = pick([
            lhs.best,
            rhs.best.map(|b| b.shift(lhs.min, lhs.max)),
            prefix.clone().map(|text| Candidate { text, pre_min: 0, pre_max: Some(0) }),
            boundary,
            suffix.clone(),
        ]);
        LitInfo {
            exact,
            min: lhs.min + rhs.min,
            max: lhs.max.zip(rhs.max).map(|(a, b)| a + b),
            prefix,
            suffix,
            best,
        }
    }

    fn alternate(&mut self, lhs: LitInfo, rhs: LitInfo) -> LitInfo {
        match (&lhs.exact, &rhs.exact) {
            // Degenerate but legal: both branches match the same string.
            (Some(a), Some(b)) if a == b => lhs,
            _ => LitInfo {
                exact: None,
                min: lhs.min.min(rhs.min),
                max: lhs.max.zip(rhs.max).map(|(a, b)| a.max(b)),
                // No literal is mandatory across branches.
                prefix: None,
                suffix: None,
                best: None,
            },
        }
    }

    fn optional(&mut self, frag: LitInfo) -> LitInfo {
        LitInfo { exact: None, min: 0, max: frag.max, ..Default::default() }
    }

    fn star(&mut self, frag: LitInfo) -> LitInfo {
        LitInfo {
            exact: None,
            min: 0,
            max: if frag.max == Some(0) { Some(0) } else { None },
            ..Default::default()
        }
    }

    fn plus(&mut self, frag: LitInfo) -> LitInfo {
        LitInfo {
            exact: None,
            min: frag.min,
            max: if frag.max == Some(0) { Some(0) } else { None },
            // The first repetition is mandatory and starts the whole
            // expression; the last one ends it, arbitrarily far in.
            prefix: frag.prefix,
            suffix: frag.suffix.map(|s| Candidate { pre_max: None, ..s }),
            best: frag.best,
        }
    }
}

/// The kernel for `source`, if the pattern has a usable one.
pub(crate) fn extract_kernel(source: &str) -> Option<Kernel> {
    let info = parse(source, &mut LiteralScanner).ok()?;
    let best = info.best?;
    let pre_max = best.pre_max?;
    if pre_max > MAX_PREFIX_DISTANCE || best.text.is_empty() {
        return None;
    }
    Some(Kernel { text: best.text, pre_min: best.pre_min, pre_max })
}

/// One Aho-Corasick automaton over every registered pattern's kernel.
pub(crate) struct Prefilter {
    ac: AhoCorasick,
    owners: Vec<(PatternId, usize, usize)>,
}

impl Prefilter {
    /// Builds the screen, or `None` when any live pattern lacks a kernel
    /// (a pattern that can start anywhere makes screening pointless).
    pub(crate) fn build(patterns: &PatternSet) -> Option<Self> {
        let mut texts = Vec::new();
        let mut owners = Vec::new();
        for pattern in patterns.iter() {
            let kernel = pattern.kernel.as_ref()?;
            texts.push(kernel.text.as_str());
            owners.push((pattern.id, kernel.pre_min, kernel.pre_max));
        }
        if owners.is_empty() {
            return None;
        }
        let ac = AhoCorasick::builder().build(&texts).ok()?;
        debug!("prefilter over {} kernels", owners.len());
        Some(Prefilter { ac, owners })
    }

    /// Scans a snapshot of `buffer` and returns the candidate start
    /// positions, each with the patterns whose kernel put it there.
    pub(crate) fn scan(&self, buffer: &Buffer) -> CandidateStarts {
        let chars = buffer.as_chars();
        let mut text = String::with_capacity(chars.len());
        let mut byte_to_char = Vec::with_capacity(chars.len());
        for (i, &c) in chars.iter().enumerate() {
            for _ in 0..c.len_utf8() {
                byte_to_char.push(i);
            }
            text.push(c);
        }

        let mut starts: HashMap<usize, Vec<PatternId>> = HashMap::new();
        for found in self.ac.find_overlapping_iter(&text) {
            let (pattern, pre_min, pre_max) = self.owners[found.pattern().as_usize()];
            let kernel_start = byte_to_char[found.start()];
            for distance in pre_min..=pre_max {
                if let Some(pos) = kernel_start.checked_sub(distance) {
                    starts.entry(pos).or_default().push(pattern);
                }
            }
        }
        for patterns in starts.values_mut() {
            patterns.sort_unstable();
            patterns.dedup();
        }
        CandidateStarts { starts }
    }
}

/// Position → candidate patterns, as computed by one prefilter pass.
pub(crate) struct CandidateStarts {
    starts: HashMap<usize, Vec<PatternId>>,
}

impl CandidateStarts {
    /// `None` means no match set may be born at `pos` at all.
    pub(crate) fn patterns_at(&self, pos: usize) -> Option<&[PatternId]> {
        self.starts.get(&pos).map(Vec::as_slice)
    }
}
