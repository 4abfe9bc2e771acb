// PhotonDB PCRE - Compiled regular expression type
// Stored patterns, ad-hoc pattern cache and capture extraction

#![warn(rust_2018_idioms)]

pub mod cache;
pub mod config;
pub mod encoding;
pub mod engine;
pub mod matcher;
pub mod pattern;
pub mod session;

// Re-exports for convenience
pub use cache::{CacheStats, PatternCache};
pub use config::RegexConfig;
pub use encoding::DatabaseEncoding;
pub use engine::{CompileOptions, EngineVersion, PatternHandle, SyntaxMode, ENGINE_VERSION};
pub use matcher::MatchOutcome;
pub use pattern::CompiledPattern;
pub use session::Session;

/// PhotonDB PCRE error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Pattern compile error at offset {offset}: {message}")]
        PatternCompile { offset: usize, message: String },

        #[error("Invalid byte sequence for encoding \"{encoding}\"")]
        Encoding { encoding: String },

        #[error("Match error {code}: {message}")]
        MatchExecution { code: i32, message: String },

        #[error("Out of memory: {0}")]
        OutOfMemory(String),

        #[error("Corrupt pattern value: {0}")]
        CorruptPattern(String),

        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Configuration error: {0}")]
        Config(String),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
