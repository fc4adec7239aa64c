/*!
Pattern syntax support.

Supported syntax:
- literal characters, `\x` escapes (`\n`, `\t`, `\r` are the control
  characters; any other escape is the escaped character itself),
- `.` (any character),
- character classes `[...]` and negated classes `[^...]`, with `a-b`
  ranges and literal members,
- alternation `|`,
- the postfix quantifiers `?`, `*` and `+`,
- `^` as the first token and `$` as the last token anchor the pattern to
  line starts and line ends; anywhere else both are literal characters.

There are no groups, no counted repetitions, no backreferences and no
look-around. Anything outside the grammar above fails to parse.

### Error behavior

Parsing is fallible: every [`ParseError`] carries the character offset it
was detected at and a [`ParseErrorKind`] naming the cause. A failed parse
publishes nothing; registration with a bad pattern has no side effects.
*/

pub(crate) mod parser;

pub use parser::parse;

/// One member of a character class: a single character or an inclusive
/// range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassItem {
    Char(char),
    /// Inclusive on both ends; the parser guarantees `lo <= hi`.
    Range(char, char),
}

/// Receiver for the parser's build calls.
///
/// The parser turns a pattern string into a sequence of calls on an
/// `ExprBuilder` and never materializes a syntax tree of its own. The NFA
/// fragment builder and the prefilter's literal scanner are both drivers of
/// this trait, so one grammar feeds both without the two ever having to
/// agree on an AST.
pub trait ExprBuilder {
    /// Whatever the builder composes: NFA fragments, literal analyses, ...
    type Frag;

    fn literal(&mut self, c: char) -> Self::Frag;
    fn any(&mut self) -> Self::Frag;
    fn class(&mut self, items: &[ClassItem], negated: bool) -> Self::Frag;
    fn concat(&mut self, lhs: Self::Frag, rhs: Self::Frag) -> Self::Frag;
    fn alternate(&mut self, lhs: Self::Frag, rhs: Self::Frag) -> Self::Frag;
    fn optional(&mut self, frag: Self::Frag) -> Self::Frag;
    fn star(&mut self, frag: Self::Frag) -> Self::Frag;
    fn plus(&mut self, frag: Self::Frag) -> Self::Frag;

    /// `^` as the very first token. Zero-width; reported out of band
    /// because it composes with no fragment.
    fn anchor_start(&mut self) {}
    /// `$` as the very last token.
    fn anchor_end(&mut self) {}
}

/// Error produced when a pattern fails to parse.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at offset {offset}")]
pub struct ParseError {
    /// 0-based character offset into the pattern string.
    pub offset: usize,
    pub kind: ParseErrorKind,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("empty pattern")]
    EmptyPattern,
    #[error("empty alternation branch")]
    EmptyAlternate,
    #[error("unterminated character class")]
    UnterminatedClass,
    #[error("invalid class range {lo:?}-{hi:?}")]
    InvalidRange { lo: char, hi: char },
    #[error("escape at end of pattern")]
    DanglingEscape,
    #[error("quantifier {0:?} with nothing to repeat")]
    MisplacedQuantifier(char),
}

impl ParseError {
    pub(crate) fn new(offset: usize, kind: ParseErrorKind) -> Self {
        Self { offset, kind }
    }
}
