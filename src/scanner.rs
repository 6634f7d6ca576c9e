//! Source scanner.
//!
//! A [`Scanner`] is an immutable view (`start`, `len`) over a shared source
//! string. Cloning is cheap (one `Arc` bump), so parse trees store scanners
//! directly as their leaves and backtracking is nothing more than keeping an
//! old scanner around.
//!
//! ```text
//!  source:  "expr -> a b;"
//!                    ^^^^
//!  scanner:  start=8, len=4      slice(0, 1) -> "a"
//!                                skip(2)     -> "b;"
//! ```
//!
//! All matching is anchored at the scanner's start and never looks behind
//! it. Absence of a match is an `Option`, never an error.
//!
//! ## Invariants
//!
//! - `start + len <= source.len()` and both ends lie on UTF-8 boundaries.
//! - Two scanners can only be merged if they view the same source
//!   allocation.

use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Number of source lines shown either side of a highlighted slice.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

#[derive(Debug)]
struct Source {
    text: String,
    filename: Option<String>,
}

/// A cheaply-cloneable slice of a source string.
#[derive(Clone)]
pub struct Scanner {
    src: Arc<Source>,
    start: usize,
    len: usize,
}

/// The result of [`Scanner::eat_regex`].
#[derive(Debug, Clone)]
pub struct RegexMatch {
    /// The whole match.
    pub whole: Scanner,
    /// Capture groups (group 1 onwards); `None` for groups that did not participate.
    pub captures: Vec<Option<Scanner>>,
    /// The input remaining after the whole match.
    pub rest: Scanner,
}

impl RegexMatch {
    /// The last participating capture group, or the whole match if there is none.
    pub fn output(&self) -> Scanner {
        self.captures.iter().rev().flatten().next().cloned().unwrap_or_else(|| self.whole.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error("cannot merge an empty set of scanners")]
    Empty,
    #[error("cannot merge scanners drawn from different sources")]
    DifferentSources,
}

impl Scanner {
    /// A scanner over the whole of `text`.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let len = text.len();
        Scanner { src: Arc::new(Source { text, filename: None }), start: 0, len }
    }

    /// A scanner over the whole of `text`, remembering the file it came from.
    pub fn with_filename(text: impl Into<String>, filename: impl Into<String>) -> Self {
        let text = text.into();
        let len = text.len();
        Scanner { src: Arc::new(Source { text, filename: Some(filename.into()) }), start: 0, len }
    }

    pub fn filename(&self) -> Option<&str> {
        self.src.filename.as_deref()
    }

    /// The visible text.
    pub fn as_str(&self) -> &str {
        &self.src.text[self.start..self.start + self.len]
    }

    /// Byte offset of the scanner's start within the source.
    pub fn offset(&self) -> usize {
        self.start
    }

    /// Byte offset one past the scanner's end within the source.
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The entire source text this scanner draws from.
    pub fn source(&self) -> &str {
        &self.src.text
    }

    pub fn same_source(&self, other: &Scanner) -> bool {
        Arc::ptr_eq(&self.src, &other.src)
    }

    /// The sub-slice `[a, b)` relative to this scanner's start.
    pub fn slice(&self, a: usize, b: usize) -> Scanner {
        debug_assert!(a <= b && b <= self.len);
        Scanner { src: Arc::clone(&self.src), start: self.start + a, len: b - a }
    }

    /// Drop the first `n` bytes.
    pub fn skip(&self, n: usize) -> Scanner {
        self.slice(n, self.len)
    }

    /// Split off the first `n` bytes, returning `(consumed, remainder)`.
    pub fn eat(&self, n: usize) -> (Scanner, Scanner) {
        (self.slice(0, n), self.skip(n))
    }

    /// An empty scanner positioned at this scanner's start.
    pub fn empty_at_start(&self) -> Scanner {
        self.slice(0, 0)
    }

    pub fn eat_literal(&self, lit: &str) -> Option<(Scanner, Scanner)> {
        self.as_str().starts_with(lit).then(|| self.eat(lit.len()))
    }

    /// Match `re` at the scanner's start.
    ///
    /// `re` must be `\A`-anchored; a match starting anywhere else is treated as
    /// no match at all.
    pub fn eat_regex(&self, re: &Regex) -> Option<RegexMatch> {
        let caps = re.captures(self.as_str())?;
        let whole = caps.get(0)?;
        if whole.start() != 0 {
            tracing::warn!(pattern = re.as_str(), "regex is not anchored at the scanner start");
            return None;
        }
        let captures =
            caps.iter().skip(1).map(|group| group.map(|m| self.slice(m.start(), m.end()))).collect::<Vec<_>>();
        Some(RegexMatch { whole: self.slice(0, whole.end()), captures, rest: self.skip(whole.end()) })
    }

    /// The smallest scanner covering every scanner in `scanners`.
    pub fn merge<'a>(scanners: impl IntoIterator<Item = &'a Scanner>) -> Result<Scanner, MergeError> {
        let mut iter = scanners.into_iter();
        let first = iter.next().ok_or(MergeError::Empty)?;
        let (mut lo, mut hi) = (first.start, first.end());
        for s in iter {
            if !s.same_source(first) {
                return Err(MergeError::DifferentSources);
            }
            lo = lo.min(s.start);
            hi = hi.max(s.end());
        }
        Ok(Scanner { src: Arc::clone(&first.src), start: lo, len: hi - lo })
    }

    /// 1-indexed `(line, column)` of the scanner's start.
    pub fn position(&self) -> (usize, usize) {
        line_column(&self.src.text, self.start)
    }

    /// Render the scanner inside its surrounding source, highlighting the
    /// visible slice. At most `limit_lines` lines are shown either side
    /// (`0` shows everything).
    pub fn context(&self, limit_lines: usize) -> String {
        let text = &self.src.text;
        let before = &text[..self.start];
        let after = &text[self.end()..];
        let before = match limit_lines {
            0 => before,
            n => before.rmatch_indices('\n').nth(n).map_or(before, |(i, _)| &before[i + 1..]),
        };
        let after = match limit_lines {
            0 => after,
            n => after.match_indices('\n').nth(n).map_or(after, |(i, _)| &after[..i]),
        };
        let (line, col) = self.position();
        format!(
            "\n{}:{}:{}:\n{}\x1b[1;31m{}\x1b[0m{}",
            self.filename().unwrap_or(""),
            line,
            col,
            before,
            self.as_str(),
            after
        )
    }
}

fn line_column(text: &str, pos: usize) -> (usize, usize) {
    let prefix = &text[..pos];
    let line = prefix.matches('\n').count() + 1;
    let col = prefix.rfind('\n').map_or(pos + 1, |i| pos - i);
    (line, col)
}

impl PartialEq for Scanner {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.as_str() == other.as_str()
    }
}

impl Eq for Scanner {}

impl fmt::Display for Scanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Scanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}‣{:?}", self.start, self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn slices_are_relative_to_the_scanner() {
        let s = Scanner::new("hello world");
        let world = s.skip(6);
        assert_eq!(world.as_str(), "world");
        assert_eq!(world.offset(), 6);
        assert_eq!(world.slice(1, 3).as_str(), "or");
        assert_eq!(world.slice(1, 3).offset(), 7);

        let (eaten, rest) = s.eat(5);
        assert_eq!(eaten.as_str(), "hello");
        assert_eq!(rest.as_str(), " world");
    }

    #[test]
    fn eat_literal_is_anchored() {
        let s = Scanner::new("test1234");
        let (eaten, rest) = s.eat_literal("test").unwrap();
        assert_eq!(eaten.as_str(), "test");
        assert_eq!(rest.as_str(), "1234");
        assert!(s.eat_literal("1234").is_none());
    }

    #[test]
    fn eat_regex_reports_captures_and_last_group() {
        let re = Regex::new(r"(?m)\A\s*(?:(\d+))\s*").unwrap();
        let s = Scanner::new("  42  rest");
        let m = s.eat_regex(&re).unwrap();
        assert_eq!(m.whole.as_str(), "  42  ");
        assert_eq!(m.output().as_str(), "42");
        assert_eq!(m.output().offset(), 2);
        assert_eq!(m.rest.as_str(), "rest");

        assert!(Scanner::new("x42").eat_regex(&re).is_none());
    }

    #[test]
    fn eat_regex_output_skips_unmatched_trailing_groups() {
        let re = Regex::new(r"(?m)\A(a(b)?)").unwrap();
        let m = Scanner::new("ac").eat_regex(&re).unwrap();
        assert_eq!(m.captures.len(), 2);
        assert!(m.captures[1].is_none());
        assert_eq!(m.output().as_str(), "a");
    }

    #[test]
    fn merge_covers_all_inputs() {
        let s = Scanner::new("abcdefgh");
        let merged = Scanner::merge([&s.slice(5, 6), &s.slice(1, 2), &s.slice(3, 4)]).unwrap();
        assert_eq!(merged.as_str(), "bcdef");
        assert_eq!(merged.offset(), 1);
    }

    #[test]
    fn merge_rejects_empty_and_foreign_inputs() {
        assert_eq!(Scanner::merge(std::iter::empty()), Err(MergeError::Empty));
        let a = Scanner::new("abc");
        let b = Scanner::new("abc");
        assert_eq!(Scanner::merge([&a, &b]), Err(MergeError::DifferentSources));
    }

    #[test]
    fn position_is_one_indexed() {
        let s = Scanner::new("ab\ncd\nef");
        assert_eq!(s.position(), (1, 1));
        assert_eq!(s.skip(1).position(), (1, 2));
        assert_eq!(s.skip(3).position(), (2, 1));
        assert_eq!(s.skip(7).position(), (3, 2));
    }

    #[test]
    fn context_highlights_the_slice() {
        let s = Scanner::with_filename("one\ntwo\nthree", "g.wbnf");
        let ctx = s.slice(4, 7).context(DEFAULT_CONTEXT_LINES);
        assert!(ctx.contains("g.wbnf:2:1:"));
        assert!(ctx.contains("\x1b[1;31mtwo\x1b[0m"));
        assert!(ctx.starts_with("\ng.wbnf:2:1:\none\n"));
    }

    #[test]
    fn context_limits_surrounding_lines() {
        let s = Scanner::new("1\n2\n3\n4\n5\n6\n7");
        let ctx = s.slice(6, 7).context(1);
        assert!(ctx.ends_with("3\n\x1b[1;31m4\x1b[0m\n5"), "{ctx:?}");
    }

    proptest! {
        #[test]
        fn position_counts_newlines(prefix in "[a-z\n]{0,40}", rest in "[a-z]{0,5}") {
            let text = format!("{prefix}{rest}");
            let s = Scanner::new(text).skip(prefix.len());
            let (line, col) = s.position();
            prop_assert_eq!(line, prefix.matches('\n').count() + 1);
            let last_line = prefix.rsplit('\n').next().unwrap_or("");
            prop_assert_eq!(col, last_line.len() + 1);
        }
    }
}
