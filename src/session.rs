//! Per-connection regex functions
//!
//! A `Session` carries what one database connection needs to serve regex
//! calls: the database encoding, compile limits, the shared ad-hoc cache and
//! the flag that keeps the engine version advisory to one per session.
//!
//! Stored patterns are reinterpreted in place on every call. The capture
//! engines built for them are remembered per session, keyed by syntax mode
//! and engine pattern text, so repeated rows do not rebuild them.
//!
//! Call shapes:
//!
//! | Method              | SQL result                      |
//! |---------------------|---------------------------------|
//! | `compile`           | stored pattern value            |
//! | `render`            | pattern text                    |
//! | `matches`           | boolean                         |
//! | `matches_not`       | boolean                         |
//! | `match_one`         | text, `NULL` on no match        |
//! | `captures`          | text[], `NULL` on no match      |
//! | `matches_adhoc`     | boolean, pattern given as text  |
//! | `matches_adhoc_not` | boolean, pattern given as text  |

use crate::cache::{PatternCache, DEFAULT_CACHE_CAPACITY};
use crate::config::RegexConfig;
use crate::encoding::DatabaseEncoding;
use crate::engine::handle::CaptureEngine;
use crate::engine::{CompileOptions, PatternHandle, SyntaxMode, ENGINE_VERSION};
use crate::error::Result;
use crate::matcher::{self, MatchOutcome};
use crate::pattern::CompiledPattern;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

type EngineKey = (SyntaxMode, String);

/// Regex state for one database session
#[derive(Debug)]
pub struct Session {
    encoding: DatabaseEncoding,
    options: CompileOptions,
    cache: Arc<PatternCache>,
    capture_engines: Mutex<LruCache<EngineKey, CaptureEngine>>,
    version_warned: AtomicBool,
}

impl Session {
    pub fn new(
        encoding: DatabaseEncoding,
        options: CompileOptions,
        cache: Arc<PatternCache>,
    ) -> Self {
        let engines = NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            encoding,
            options,
            cache,
            capture_engines: Mutex::new(LruCache::new(engines)),
            version_warned: AtomicBool::new(false),
        }
    }

    /// Session configured from `config`, sharing `cache` with other sessions
    pub fn from_config(config: &RegexConfig, cache: Arc<PatternCache>) -> Result<Self> {
        Ok(Self::new(config.database_encoding()?, config.compile_options(), cache))
    }

    pub fn encoding(&self) -> DatabaseEncoding {
        self.encoding
    }

    pub fn cache(&self) -> &Arc<PatternCache> {
        &self.cache
    }

    /// Whether the version advisory has been emitted in this session
    pub fn version_warned(&self) -> bool {
        self.version_warned.load(Ordering::Relaxed)
    }

    /// Compile pattern text into a storable value
    pub fn compile(&self, text: &[u8]) -> Result<CompiledPattern> {
        CompiledPattern::construct(text, self.encoding, &self.options)
    }

    /// Pattern text of a stored value
    pub fn render<'a>(&self, pattern: &'a CompiledPattern) -> &'a [u8] {
        pattern.render()
    }

    /// Load a stored pattern, warning once per session if it was compiled
    /// by a different engine version.
    ///
    /// The handle borrows the DFAs from `pattern` and picks up any capture
    /// engine this session already built for it.
    pub fn resolve<'a>(&self, pattern: &'a CompiledPattern) -> Result<PatternHandle<&'a [u8]>> {
        let producer = pattern.producer_version();
        if producer != ENGINE_VERSION && !self.version_warned.swap(true, Ordering::Relaxed) {
            warn!(
                producer = %producer,
                current = %ENGINE_VERSION,
                hint = "recompile stored patterns, e.g. UPDATE ... SET col = col::text::pcre",
                "Regex engine version mismatch: the stored pattern was compiled by engine \
                 version {}, the running engine is {}. \
                 This warning is shown only once per session.",
                producer,
                ENGINE_VERSION
            );
        }

        let handle = pattern.load()?;
        let key = (handle.mode(), handle.pattern().to_string());
        if let Some(engine) = self.capture_engines.lock().get(&key) {
            handle.attach_capture_engine(Arc::clone(engine));
        }
        Ok(handle)
    }

    /// Remember the capture engine `handle` built during this call
    fn keep_capture_engine(&self, handle: &PatternHandle<&[u8]>) {
        let Some(engine) = handle.capture_engine() else {
            return;
        };
        let mut engines = self.capture_engines.lock();
        let key = (handle.mode(), handle.pattern().to_string());
        if engines.get(&key).is_none() {
            debug!(pattern = %handle.pattern(), "Keeping capture engine for session");
            engines.put(key, Arc::clone(engine));
        }
    }

    /// Number of capture engines remembered by this session
    pub fn capture_engine_count(&self) -> usize {
        self.capture_engines.lock().len()
    }

    pub fn matches(&self, subject: &[u8], pattern: &CompiledPattern) -> Result<bool> {
        let handle = self.resolve(pattern)?;
        let matched = matcher::is_match(subject, self.encoding, &handle)?;
        self.keep_capture_engine(&handle);
        Ok(matched)
    }

    pub fn matches_not(&self, subject: &[u8], pattern: &CompiledPattern) -> Result<bool> {
        Ok(!self.matches(subject, pattern)?)
    }

    /// Text of the whole match, `None` when there is none
    pub fn match_one(
        &self,
        subject: &[u8],
        pattern: &CompiledPattern,
    ) -> Result<Option<Vec<u8>>> {
        let handle = self.resolve(pattern)?;
        let outcome = matcher::match_and_capture(subject, self.encoding, &handle, false)?;
        self.keep_capture_engine(&handle);
        match outcome {
            MatchOutcome::Matched(text) => Ok(Some(self.output(text)?)),
            _ => Ok(None),
        }
    }

    /// Captured groups, `None` when the pattern does not match
    pub fn captures(
        &self,
        subject: &[u8],
        pattern: &CompiledPattern,
    ) -> Result<Option<Vec<Option<Vec<u8>>>>> {
        let handle = self.resolve(pattern)?;
        let outcome = matcher::match_and_capture(subject, self.encoding, &handle, true)?;
        self.keep_capture_engine(&handle);
        match outcome {
            MatchOutcome::Captured(groups) => {
                let groups = groups
                    .into_iter()
                    .map(|group| group.map(|text| self.output(text)).transpose())
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(groups))
            }
            _ => Ok(None),
        }
    }

    /// Match against pattern text, compiled through the shared cache
    pub fn matches_adhoc(&self, subject: &[u8], pattern: &[u8]) -> Result<bool> {
        let handle = self
            .cache
            .compile_and_cache(pattern, self.encoding, &self.options)?;
        matcher::is_match(subject, self.encoding, &handle)
    }

    pub fn matches_adhoc_not(&self, subject: &[u8], pattern: &[u8]) -> Result<bool> {
        Ok(!self.matches_adhoc(subject, pattern)?)
    }

    /// Convert engine output back to the database encoding
    fn output(&self, text: Vec<u8>) -> Result<Vec<u8>> {
        Ok(self.encoding.denormalize(&text)?.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineVersion;
    use crate::error::Error;

    fn session() -> Session {
        Session::new(
            DatabaseEncoding::Utf8,
            CompileOptions::default(),
            Arc::new(PatternCache::default()),
        )
    }

    fn shared(encoding: DatabaseEncoding, cache: &Arc<PatternCache>) -> Session {
        Session::new(encoding, CompileOptions::default(), Arc::clone(cache))
    }

    #[test]
    fn test_optional_group_not_taken() -> Result<()> {
        let session = session();
        let pattern = session.compile(b"^a(b)?c$")?;
        assert!(session.matches(b"ac", &pattern)?);
        assert_eq!(session.captures(b"ac", &pattern)?, Some(vec![None]));
        Ok(())
    }

    #[test]
    fn test_optional_group_taken() -> Result<()> {
        let session = session();
        let pattern = session.compile(b"^a(b)?c$")?;
        assert!(session.matches(b"abc", &pattern)?);
        assert_eq!(
            session.captures(b"abc", &pattern)?,
            Some(vec![Some(b"b".to_vec())])
        );
        Ok(())
    }

    #[test]
    fn test_no_match_is_null() -> Result<()> {
        let session = session();
        let pattern = session.compile(b"[0-9]+")?;
        assert!(!session.matches(b"xyz", &pattern)?);
        assert!(session.matches_not(b"xyz", &pattern)?);
        assert_eq!(session.match_one(b"xyz", &pattern)?, None);
        assert_eq!(session.captures(b"xyz", &pattern)?, None);
        assert_eq!(session.match_one(b"x42y", &pattern)?, Some(b"42".to_vec()));
        Ok(())
    }

    #[test]
    fn test_version_advisory_once() -> Result<()> {
        let session = session();
        let current = session.compile(b"abc")?;
        let stale = current.clone().with_version(EngineVersion::new(0, 3));

        session.matches(b"abc", &current)?;
        assert!(!session.version_warned());

        // Mismatched patterns still match
        assert!(session.matches(b"abc", &stale)?);
        assert!(session.version_warned());
        assert!(session.matches(b"xabcx", &stale)?);
        assert!(session.version_warned());

        // A new session warns again
        let other = Session::new(
            DatabaseEncoding::Utf8,
            CompileOptions::default(),
            Arc::clone(session.cache()),
        );
        assert!(!other.version_warned());
        other.resolve(&stale)?;
        assert!(other.version_warned());
        Ok(())
    }

    #[test]
    fn test_adhoc_uses_shared_cache() -> Result<()> {
        let cache = Arc::new(PatternCache::new(2)?);
        let first = shared(DatabaseEncoding::Utf8, &cache);
        let second = shared(DatabaseEncoding::Utf8, &cache);

        assert!(first.matches_adhoc(b"hello world", b"wor")?);
        assert!(second.matches_adhoc_not(b"hello", b"wor")?);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        Ok(())
    }

    #[test]
    fn test_adhoc_cache_shared_across_encodings() -> Result<()> {
        let cache = Arc::new(PatternCache::new(4)?);
        let utf8 = shared(DatabaseEncoding::Utf8, &cache);
        let sql_ascii = shared(DatabaseEncoding::SqlAscii, &cache);

        assert!(utf8.matches_adhoc("é".as_bytes(), b"^.$")?);
        assert!(sql_ascii.matches_adhoc(b"x", b"^.$")?);
        assert!(!sql_ascii.matches_adhoc("é".as_bytes(), b"^.$")?);

        // Still a single character for the UTF8 session
        assert!(utf8.matches_adhoc("é".as_bytes(), b"^.$")?);
        assert_eq!(cache.len(), 2);
        Ok(())
    }

    #[test]
    fn test_capture_engine_reused_across_calls() -> Result<()> {
        let session = session();
        let pattern = session.compile(br"([a-z]+)@([a-z]+)")?;
        assert_eq!(session.capture_engine_count(), 0);

        // Plain matches stay on the DFA
        assert!(session.matches(b"bob@example", &pattern)?);
        assert_eq!(session.capture_engine_count(), 0);

        session.captures(b"bob@example", &pattern)?;
        let first = session.resolve(&pattern)?;
        let engine = Arc::clone(first.capture_engine().expect("engine kept"));

        for _ in 0..3 {
            assert_eq!(
                session.captures(b"x amy@host y", &pattern)?,
                Some(vec![Some(b"amy".to_vec()), Some(b"host".to_vec())])
            );
            let handle = session.resolve(&pattern)?;
            assert!(Arc::ptr_eq(handle.capture_engine().expect("engine kept"), &engine));
        }
        assert_eq!(session.capture_engine_count(), 1);

        // A copy of the stored value shares the engine too
        let copy = CompiledPattern::from_bytes(&pattern.to_bytes()?)?;
        let handle = session.resolve(&copy)?;
        assert!(Arc::ptr_eq(handle.capture_engine().expect("engine kept"), &engine));
        Ok(())
    }

    #[test]
    fn test_adhoc_compile_error() {
        let session = session();
        assert!(matches!(
            session.matches_adhoc(b"x", b"("),
            Err(Error::PatternCompile { .. })
        ));
        assert!(session.cache().is_empty());
    }

    #[test]
    fn test_latin1_output_converted_back() -> Result<()> {
        let session = Session::new(
            DatabaseEncoding::from_name("LATIN1")?,
            CompileOptions::default(),
            Arc::new(PatternCache::default()),
        );
        let pattern = session.compile(b"caf(\xE9+)")?;
        assert_eq!(session.render(&pattern), b"caf(\xE9+)");
        assert_eq!(
            session.match_one(b"un caf\xE9\xE9!", &pattern)?,
            Some(b"caf\xE9\xE9".to_vec())
        );
        assert_eq!(
            session.captures(b"un caf\xE9\xE9!", &pattern)?,
            Some(vec![Some(b"\xE9\xE9".to_vec())])
        );
        Ok(())
    }

    #[test]
    fn test_sql_ascii_bytes() -> Result<()> {
        let session = Session::new(
            DatabaseEncoding::SqlAscii,
            CompileOptions::default(),
            Arc::new(PatternCache::default()),
        );
        let pattern = session.compile(b"\xFF(.)\xFF")?;
        assert_eq!(
            session.captures(b"a\xFFz\xFFb", &pattern)?,
            Some(vec![Some(b"z".to_vec())])
        );
        assert!(session.matches_adhoc(b"\x80\x81", b"\x81$")?);
        Ok(())
    }
}
