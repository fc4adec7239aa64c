//! Recursive descent over the pattern grammar, lowest precedence first:
//!
//! ```text
//! alternation := concat ('|' concat)*
//! concat      := postfix+
//! postfix     := atom ('?' | '*' | '+')*
//! atom        := literal | '\' c | '.' | '[' class ']'
//! ```

use crate::syntax::{ClassItem, ExprBuilder, ParseError, ParseErrorKind};

/// Parses `pattern` by driving `builder`, returning the fragment for the
/// whole pattern.
///
/// Anchors are stripped before descent: `^` as the first character and an
/// unescaped `$` as the last character are reported through
/// [`ExprBuilder::anchor_start`] / [`ExprBuilder::anchor_end`] and take no
/// part in fragment composition. Offsets in errors always refer to the
/// original pattern string.
pub fn parse<B: ExprBuilder>(pattern: &str, builder: &mut B) -> Result<B::Frag, ParseError> {
    let chars: Vec<char> = pattern.chars().collect();

    let mut lo = 0;
    let mut hi = chars.len();
    if chars.first() == Some(&'^') {
        builder.anchor_start();
        lo = 1;
    }
    if hi > lo && chars[hi - 1] == '$' && !is_escaped(&chars, hi - 1) {
        builder.anchor_end();
        hi -= 1;
    }
    if lo >= hi {
        return Err(ParseError::new(0, ParseErrorKind::EmptyPattern));
    }

    let mut parser = Parser { chars, pos: lo, end: hi, builder };
    let frag = parser.alternation()?;
    debug_assert_eq!(parser.pos, parser.end);
    Ok(frag)
}

/// True when the character at `at` sits behind an odd number of
/// backslashes.
fn is_escaped(chars: &[char], at: usize) -> bool {
    chars[..at].iter().rev().take_while(|&&c| c == '\\').count() % 2 == 1
}

struct Parser<'b, B: ExprBuilder> {
    chars: Vec<char>,
    pos: usize,
    end: usize,
    builder: &'b mut B,
}

impl<B: ExprBuilder> Parser<'_, B> {
    fn peek(&self) -> Option<char> {
        (self.pos < self.end).then(|| self.chars[self.pos])
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn err(&self, offset: usize, kind: ParseErrorKind) -> ParseError {
        ParseError::new(offset, kind)
    }

    fn alternation(&mut self) -> Result<B::Frag, ParseError> {
        let mut frag = self.concat()?;
        while self.peek() == Some('|') {
            self.bump();
            let rhs = self.concat()?;
            frag = self.builder.alternate(frag, rhs);
        }
        Ok(frag)
    }

    fn concat(&mut self) -> Result<B::Frag, ParseError> {
        let mut frag: Option<B::Frag> = None;
        while let Some(c) = self.peek() {
            if c == '|' {
                break;
            }
            let atom = self.postfix()?;
            frag = Some(match frag {
                None => atom,
                Some(lhs) => self.builder.concat(lhs, atom),
            });
        }
        frag.ok_or_else(|| self.err(self.pos, ParseErrorKind::EmptyAlternate))
    }

    fn postfix(&mut self) -> Result<B::Frag, ParseError> {
        let mut frag = self.atom()?;
        while let Some(c) = self.peek() {
            match c {
                '?' => frag = self.builder.optional(frag),
                '*' => frag = self.builder.star(frag),
                '+' => frag = self.builder.plus(frag),
                _ => break,
            }
            self.bump();
        }
        Ok(frag)
    }

    fn atom(&mut self) -> Result<B::Frag, ParseError> {
        let offset = self.pos;
        let c = self.bump().expect("atom called at end of input");
        match c {
            '.' => Ok(self.builder.any()),
            '[' => self.class(offset),
            '\\' => match self.bump() {
                Some(e) => Ok(self.builder.literal(unescape(e))),
                None => Err(self.err(offset, ParseErrorKind::DanglingEscape)),
            },
            '?' | '*' | '+' => Err(self.err(offset, ParseErrorKind::MisplacedQuantifier(c))),
            // Mid-pattern anchors degrade to literals.
            c => Ok(self.builder.literal(c)),
        }
    }

    /// Parses the inside of a class, `open` pointing at the `[`.
    ///
    /// `^` right after the `[` negates; `]` as the first member is a
    /// literal; `a-b` is a range unless the `-` is the last member.
    fn class(&mut self, open: usize) -> Result<B::Frag, ParseError> {
        let negated = if self.peek() == Some('^') {
            self.bump();
            true
        } else {
            false
        };

        let mut items = Vec::new();
        if self.peek() == Some(']') {
            self.bump();
            items.push(ClassItem::Char(']'));
        }
        loop {
            match self.peek() {
                None => return Err(self.err(open, ParseErrorKind::UnterminatedClass)),
                Some(']') => {
                    self.bump();
                    break;
                }
                Some(_) => {
                    let lo_offset = self.pos;
                    let lo = self.member()?;
                    if self.peek() == Some('-') && self.chars.get(self.pos + 1) != Some(&']') {
                        if self.pos + 1 >= self.end {
                            return Err(self.err(open, ParseErrorKind::UnterminatedClass));
                        }
                        self.bump();
                        let hi = self.member()?;
                        if hi < lo {
                            return Err(
                                self.err(lo_offset, ParseErrorKind::InvalidRange { lo, hi })
                            );
                        }
                        items.push(ClassItem::Range(lo, hi));
                    } else {
                        items.push(ClassItem::Char(lo));
                    }
                }
            }
        }
        Ok(self.builder.class(&items, negated))
    }

    /// One class member character, escape-aware.
    fn member(&mut self) -> Result<char, ParseError> {
        let offset = self.pos;
        match self.bump().expect("member called at end of input") {
            '\\' => match self.bump() {
                Some(e) => Ok(unescape(e)),
                None => Err(self.err(offset, ParseErrorKind::DanglingEscape)),
            },
            c => Ok(c),
        }
    }
}

/// `\n`, `\t` and `\r` are control characters; every other escape is the
/// escaped character itself.
fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        c => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Renders the build calls as s-expressions so tests can assert on
    /// structure without an AST in the crate itself.
    #[derive(Default)]
    struct Sexpr {
        anchor_start: bool,
        anchor_end: bool,
    }

    impl ExprBuilder for Sexpr {
        type Frag = String;

        fn literal(&mut self, c: char) -> String {
            format!("{c:?}")
        }
        fn any(&mut self) -> String {
            "any".to_string()
        }
        fn class(&mut self, items: &[ClassItem], negated: bool) -> String {
            let mut out = String::from(if negated { "[^" } else { "[" });
            for item in items {
                match item {
                    ClassItem::Char(c) => out.push(*c),
                    ClassItem::Range(lo, hi) => {
                        out.push(*lo);
                        out.push('-');
                        out.push(*hi);
                    }
                }
            }
            out.push(']');
            out
        }
        fn concat(&mut self, lhs: String, rhs: String) -> String {
            format!("(cat {lhs} {rhs})")
        }
        fn alternate(&mut self, lhs: String, rhs: String) -> String {
            format!("(alt {lhs} {rhs})")
        }
        fn optional(&mut self, frag: String) -> String {
            format!("(opt {frag})")
        }
        fn star(&mut self, frag: String) -> String {
            format!("(star {frag})")
        }
        fn plus(&mut self, frag: String) -> String {
            format!("(plus {frag})")
        }
        fn anchor_start(&mut self) {
            self.anchor_start = true;
        }
        fn anchor_end(&mut self) {
            self.anchor_end = true;
        }
    }

    fn render(pattern: &str) -> Result<String, ParseError> {
        parse(pattern, &mut Sexpr::default())
    }

    #[test]
    fn precedence() {
        assert_eq!(render("ab").unwrap(), "(cat 'a' 'b')");
        assert_eq!(render("ab|c").unwrap(), "(alt (cat 'a' 'b') 'c')");
        assert_eq!(render("ab+").unwrap(), "(cat 'a' (plus 'b'))");
        assert_eq!(render("a|b|c").unwrap(), "(alt (alt 'a' 'b') 'c')");
        assert_eq!(render("a?*").unwrap(), "(star (opt 'a'))");
    }

    #[test]
    fn atoms() {
        assert_eq!(render(".").unwrap(), "any");
        assert_eq!(render(r"\.").unwrap(), "'.'");
        assert_eq!(render(r"\n").unwrap(), "'\\n'");
        assert_eq!(render(r"\q").unwrap(), "'q'");
        // Mid-pattern anchors are literals.
        assert_eq!(render("a$b").unwrap(), "(cat (cat 'a' '$') 'b')");
        assert_eq!(render("a^b").unwrap(), "(cat (cat 'a' '^') 'b')");
    }

    #[test]
    fn classes() {
        assert_eq!(render("[abc]").unwrap(), "[abc]");
        assert_eq!(render("[a-z0]").unwrap(), "[a-z0]");
        assert_eq!(render("[^ab]").unwrap(), "[^ab]");
        // ']' first is a literal member, '-' last is a literal member.
        assert_eq!(render("[]a]").unwrap(), "[]a]");
        assert_eq!(render("[a-]").unwrap(), "[a-]");
        assert_eq!(render(r"[\]]").unwrap(), "[]]");
        assert_eq!(render(r"[a\-z]").unwrap(), "[a-z]");
    }

    #[test]
    fn anchors() {
        let mut b = Sexpr::default();
        parse("^ab$", &mut b).unwrap();
        assert!(b.anchor_start && b.anchor_end);

        let mut b = Sexpr::default();
        assert_eq!(parse(r"ab\$", &mut b).unwrap(), "(cat (cat 'a' 'b') '$')");
        assert!(b.anchor_end == false);
    }

    /// Re-renders the build calls as a canonical pattern string.
    #[derive(Default)]
    struct CanonicalEmit {
        anchor_start: bool,
        anchor_end: bool,
    }

    impl CanonicalEmit {
        fn escape(c: char, out: &mut String) {
            match c {
                '\n' => out.push_str(r"\n"),
                '\t' => out.push_str(r"\t"),
                '\r' => out.push_str(r"\r"),
                '\\' | '|' | '?' | '*' | '+' | '.' | '[' | '^' | '$' => {
                    out.push('\\');
                    out.push(c);
                }
                c => out.push(c),
            }
        }

        fn escape_member(c: char, out: &mut String) {
            match c {
                '\n' => out.push_str(r"\n"),
                '\t' => out.push_str(r"\t"),
                '\r' => out.push_str(r"\r"),
                '\\' | ']' | '-' | '^' => {
                    out.push('\\');
                    out.push(c);
                }
                c => out.push(c),
            }
        }
    }

    impl ExprBuilder for CanonicalEmit {
        type Frag = String;

        fn literal(&mut self, c: char) -> String {
            let mut out = String::new();
            Self::escape(c, &mut out);
            out
        }
        fn any(&mut self) -> String {
            ".".to_string()
        }
        fn class(&mut self, items: &[ClassItem], negated: bool) -> String {
            let mut out = String::from(if negated { "[^" } else { "[" });
            for item in items {
                match item {
                    ClassItem::Char(c) => Self::escape_member(*c, &mut out),
                    ClassItem::Range(lo, hi) => {
                        Self::escape_member(*lo, &mut out);
                        out.push('-');
                        Self::escape_member(*hi, &mut out);
                    }
                }
            }
            out.push(']');
            out
        }
        fn concat(&mut self, lhs: String, rhs: String) -> String {
            format!("{lhs}{rhs}")
        }
        fn alternate(&mut self, lhs: String, rhs: String) -> String {
            format!("{lhs}|{rhs}")
        }
        fn optional(&mut self, frag: String) -> String {
            format!("{frag}?")
        }
        fn star(&mut self, frag: String) -> String {
            format!("{frag}*")
        }
        fn plus(&mut self, frag: String) -> String {
            format!("{frag}+")
        }
        fn anchor_start(&mut self) {
            self.anchor_start = true;
        }
        fn anchor_end(&mut self) {
            self.anchor_end = true;
        }
    }

    fn emit(pattern: &str) -> String {
        let mut emitter = CanonicalEmit::default();
        let body = parse(pattern, &mut emitter).unwrap();
        let mut out = String::new();
        if emitter.anchor_start {
            out.push('^');
        }
        out.push_str(&body);
        if emitter.anchor_end {
            out.push('$');
        }
        out
    }

    #[test]
    fn emit_then_parse_preserves_structure() {
        use crate::automata::{nfa::FragmentBuilder, PatternId};

        let patterns = [
            "cats?",
            "a+b*c?",
            "foo|bar|x.z",
            r"[0-9]+\.[0-9]+",
            "[^a-c]+x",
            "^li(ne$",
            r"we\|rd[-]\$",
        ];
        for pattern in patterns {
            let canonical = emit(pattern);
            // The canonical form is a fixed point of emit.
            assert_eq!(canonical, emit(&canonical), "for {pattern:?}");

            // And it compiles to the same NFA, state for state.
            let compile = |p: &str| {
                let mut arena = Vec::new();
                let mut builder = FragmentBuilder::new(&mut arena, PatternId(0));
                let frag = parse(p, &mut builder).unwrap();
                builder.finish(frag);
                format!("{arena:?}")
            };
            assert_eq!(compile(pattern), compile(&canonical), "for {pattern:?}");
        }
    }

    #[test]
    fn errors_carry_offsets() {
        let err = render("").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::EmptyPattern);

        let err = render("^$").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::EmptyPattern);

        let err = render("ab[cd").unwrap_err();
        assert_eq!((err.offset, err.kind), (2, ParseErrorKind::UnterminatedClass));

        let err = render("[z-a]").unwrap_err();
        assert_eq!(
            (err.offset, err.kind),
            (1, ParseErrorKind::InvalidRange { lo: 'z', hi: 'a' })
        );

        let err = render(r"ab\").unwrap_err();
        assert_eq!((err.offset, err.kind), (2, ParseErrorKind::DanglingEscape));

        let err = render("*a").unwrap_err();
        assert_eq!(
            (err.offset, err.kind),
            (0, ParseErrorKind::MisplacedQuantifier('*'))
        );

        let err = render("a|*b").unwrap_err();
        assert_eq!((err.offset, err.kind), (2, ParseErrorKind::MisplacedQuantifier('*')));

        let err = render("a|").unwrap_err();
        assert_eq!((err.offset, err.kind), (2, ParseErrorKind::EmptyAlternate));

        let err = render("|a").unwrap_err();
        assert_eq!((err.offset, err.kind), (0, ParseErrorKind::EmptyAlternate));
    }
}
