//! Live compiled pattern

use super::{CompileOptions, SyntaxMode};
use crate::error::{Error, Result};
use regex_automata::dfa::regex::{Builder, Regex as DfaRegex};
use regex_automata::dfa::{dense, sparse, Automaton};
use regex_automata::nfa::thompson;
use regex_automata::util::syntax;
use regex_automata::{Input, MatchError, MatchErrorKind};
use std::fmt::{self, Write};
use std::ops::Range;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Match error codes reported in [`Error::MatchExecution`]
pub const MATCH_ERROR_OTHER: i32 = -1;
pub const MATCH_ERROR_GAVE_UP: i32 = -2;
pub const MATCH_ERROR_HAYSTACK_TOO_LONG: i32 = -3;

pub(crate) type SparseRegex<T = Vec<u8>> = DfaRegex<sparse::DFA<T>>;

/// Engine used for captures and for searches the DFA cannot finish
pub type CaptureEngine = Arc<regex::bytes::Regex>;

/// A compiled pattern ready for matching.
///
/// `T` is the storage behind the DFAs: owned bytes for a freshly compiled
/// pattern, or a slice borrowed from a stored value when loaded.
///
/// Immutable once built. The full backtracking-free engine used for capture
/// extraction is only built the first time it is needed.
pub struct PatternHandle<T = Vec<u8>> {
    pub(super) mode: SyntaxMode,
    /// Pattern text as handed to the engine (normalized, high bytes escaped)
    pub(super) pattern: String,
    pub(super) capture_count: usize,
    pub(super) dfa: SparseRegex<T>,
    pub(super) full: OnceLock<CaptureEngine>,
}

impl PatternHandle {
    /// Compile normalized pattern bytes
    pub fn compile(pattern: &[u8], mode: SyntaxMode, options: &CompileOptions) -> Result<Self> {
        let pattern = engine_pattern(pattern, mode)?;

        let hir = syntax::parse_with(&pattern, &syntax_config(mode)).map_err(syntax_error)?;
        let capture_count = hir.properties().explicit_captures_len();

        let dfa = Builder::new()
            .syntax(syntax_config(mode))
            .thompson(thompson_config(mode))
            .dense(dense_config(options))
            .build_sparse(&pattern)
            .map_err(|e| Error::PatternCompile {
                offset: 0,
                message: e.to_string(),
            })?;

        debug!(
            pattern = %pattern,
            captures = capture_count,
            forward_bytes = dfa.forward().memory_usage(),
            "Compiled pattern"
        );

        Ok(Self::from_parts(mode, pattern, capture_count, dfa))
    }
}

impl<T: AsRef<[u8]>> PatternHandle<T> {
    pub(super) fn from_parts(
        mode: SyntaxMode,
        pattern: String,
        capture_count: usize,
        dfa: SparseRegex<T>,
    ) -> Self {
        Self {
            mode,
            pattern,
            capture_count,
            dfa,
            full: OnceLock::new(),
        }
    }

    pub fn mode(&self) -> SyntaxMode {
        self.mode
    }

    /// Pattern text the engine compiled
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Number of capture groups declared by the pattern, excluding group 0
    pub fn capture_count(&self) -> usize {
        self.capture_count
    }

    /// Whether the pattern matches anywhere in `subject`
    pub fn is_match(&self, subject: &[u8]) -> Result<bool> {
        let input = Input::new(subject).earliest(true);
        match self.dfa.forward().try_search_fwd(&input) {
            Ok(found) => Ok(found.is_some()),
            Err(err) => {
                fallback_allowed(&err)?;
                Ok(self.full()?.is_match(subject))
            }
        }
    }

    /// Span of the leftmost-first match
    pub fn find(&self, subject: &[u8]) -> Result<Option<Range<usize>>> {
        match self.dfa.try_search(&Input::new(subject)) {
            Ok(found) => Ok(found.map(|m| m.range())),
            Err(err) => {
                fallback_allowed(&err)?;
                Ok(self.full()?.find(subject).map(|m| m.range()))
            }
        }
    }

    /// Spans of groups `1..=capture_count`, `None` for groups that did not
    /// participate. Returns `None` when the pattern does not match.
    pub fn captures(&self, subject: &[u8]) -> Result<Option<Vec<Option<Range<usize>>>>> {
        let full = self.full()?;
        Ok(full.captures(subject).map(|caps| {
            (1..=self.capture_count)
                .map(|group| caps.get(group).map(|m| m.range()))
                .collect()
        }))
    }

    /// Capture engine, if one was built or attached
    pub fn capture_engine(&self) -> Option<&CaptureEngine> {
        self.full.get()
    }

    /// Reuse a capture engine built earlier for the same mode and pattern.
    ///
    /// Returns `false` if the handle already has one.
    pub fn attach_capture_engine(&self, engine: CaptureEngine) -> bool {
        self.full.set(engine).is_ok()
    }

    fn full(&self) -> Result<&CaptureEngine> {
        if let Some(full) = self.full.get() {
            return Ok(full);
        }

        let full = regex::bytes::RegexBuilder::new(&self.pattern)
            .unicode(self.mode.is_unicode())
            .build()
            .map_err(|e| Error::PatternCompile {
                offset: 0,
                message: e.to_string(),
            })?;
        debug!(pattern = %self.pattern, "Built capture engine");

        Ok(self.full.get_or_init(|| Arc::new(full)))
    }
}

impl<T> fmt::Debug for PatternHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternHandle")
            .field("mode", &self.mode)
            .field("pattern", &self.pattern)
            .field("capture_count", &self.capture_count)
            .finish()
    }
}

pub(super) fn syntax_config(mode: SyntaxMode) -> syntax::Config {
    syntax::Config::new()
        .unicode(mode.is_unicode())
        .utf8(mode.is_unicode())
}

fn thompson_config(mode: SyntaxMode) -> thompson::Config {
    thompson::Config::new().utf8(mode.is_unicode())
}

fn dense_config(options: &CompileOptions) -> dense::Config {
    // Unicode \b compiles with quit bytes; searches that hit them use the
    // full engine instead.
    dense::Config::new()
        .unicode_word_boundary(true)
        .dfa_size_limit(options.dfa_size_limit)
        .determinize_size_limit(options.dfa_size_limit)
}

/// Pattern text for the engine.
///
/// In byte mode a pattern may carry bytes that are not UTF-8; those are
/// rewritten as `\xHH` escapes, which match the raw byte when Unicode is off.
fn engine_pattern(pattern: &[u8], mode: SyntaxMode) -> Result<String> {
    match std::str::from_utf8(pattern) {
        Ok(text) => Ok(text.to_string()),
        Err(_) if mode == SyntaxMode::Bytes => Ok(escape_high_bytes(pattern)),
        Err(e) => Err(Error::PatternCompile {
            offset: e.valid_up_to(),
            message: "invalid UTF-8 in pattern".to_string(),
        }),
    }
}

fn escape_high_bytes(pattern: &[u8]) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut after_backslash = false;
    for &byte in pattern {
        if byte.is_ascii() {
            out.push(byte as char);
            after_backslash = byte == b'\\' && !after_backslash;
        } else {
            // An escaped high byte already has its backslash in `out`
            let prefix = if after_backslash { "" } else { "\\" };
            let _ = write!(out, "{}x{:02X}", prefix, byte);
            after_backslash = false;
        }
    }
    out
}

fn syntax_error(err: regex_syntax::Error) -> Error {
    let (offset, message) = match &err {
        regex_syntax::Error::Parse(e) => (e.span().start.offset, e.kind().to_string()),
        regex_syntax::Error::Translate(e) => (e.span().start.offset, e.kind().to_string()),
        _ => (0, err.to_string()),
    };
    Error::PatternCompile { offset, message }
}

/// A DFA quit on a Unicode word boundary is not a failure, the full engine
/// can answer. Anything else is.
fn fallback_allowed(err: &MatchError) -> Result<()> {
    let (code, message) = match err.kind() {
        MatchErrorKind::Quit { .. } => return Ok(()),
        MatchErrorKind::GaveUp { offset } => {
            (MATCH_ERROR_GAVE_UP, format!("search gave up at offset {}", offset))
        }
        MatchErrorKind::HaystackTooLong { len } => (
            MATCH_ERROR_HAYSTACK_TOO_LONG,
            format!("subject of {} bytes is too long", len),
        ),
        _ => (MATCH_ERROR_OTHER, err.to_string()),
    };
    Err(Error::MatchExecution { code, message })
}
