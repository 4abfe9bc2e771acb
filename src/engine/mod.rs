//! Regex engine capability
//!
//! # Architecture
//!
//! ```text
//! pattern bytes
//!   └─→ regex-syntax      → capture count, syntax errors with offsets
//!   └─→ regex-automata    → forward + reverse sparse DFA (serializable)
//!         └─→ PatternHandle
//!               ├─→ is_match / find        (DFA)
//!               └─→ captures, quit fallback (regex::bytes, built lazily)
//! ```
//!
//! The DFAs are the compiled form that gets persisted. Everything the handle
//! needs to rebuild itself is stored next to them, so loading a stored
//! pattern never depends on the session that compiled it.

pub mod handle;
pub mod serialize;

pub use handle::PatternHandle;

use crate::encoding::DatabaseEncoding;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default ceiling for DFA size and determinization memory (2 MiB).
///
/// A stored pattern carries its forward and reverse DFAs, so this is also
/// what bounds the size of each stored value.
pub const DEFAULT_DFA_SIZE_LIMIT: usize = 2 * 1024 * 1024;

/// Version of the engine whose compiled form is written into stored patterns.
///
/// Must follow the `regex-automata` release series in Cargo.toml.
pub const ENGINE_VERSION: EngineVersion = EngineVersion { major: 0, minor: 4 };

/// Engine release that produced a compiled form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineVersion {
    pub major: i16,
    pub minor: i16,
}

impl EngineVersion {
    pub fn new(major: i16, minor: i16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// How pattern syntax and subjects are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxMode {
    /// UTF-8 subjects, Unicode classes and case folding
    Unicode,
    /// Raw bytes, ASCII-only classes
    Bytes,
}

impl SyntaxMode {
    /// Mode used for patterns and subjects in the given database encoding
    pub fn for_encoding(encoding: DatabaseEncoding) -> Self {
        match encoding {
            DatabaseEncoding::SqlAscii => Self::Bytes,
            DatabaseEncoding::Utf8 | DatabaseEncoding::Other(_) => Self::Unicode,
        }
    }

    pub fn is_unicode(&self) -> bool {
        matches!(self, Self::Unicode)
    }

    pub(crate) fn as_u8(&self) -> u8 {
        match self {
            Self::Unicode => 1,
            Self::Bytes => 0,
        }
    }

    pub(crate) fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(Self::Unicode),
            0 => Ok(Self::Bytes),
            other => Err(Error::CorruptPattern(format!("Unknown syntax mode: {}", other))),
        }
    }
}

/// Compile-time limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Upper bound on DFA size; `None` disables the limit
    pub dfa_size_limit: Option<usize>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dfa_size_limit: Some(DEFAULT_DFA_SIZE_LIMIT),
        }
    }
}
