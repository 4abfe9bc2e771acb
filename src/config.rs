//! Configuration
//!
//! Layered, last wins:
//!
//! ```text
//! built-in defaults
//!   └─→ TOML file (optional)
//!        └─→ PHOTONDB_PCRE_* environment variables
//! ```
//!
//! The cache capacity is read once when the process builds its
//! [`PatternCache`](crate::PatternCache) and cannot change afterwards.

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::encoding::DatabaseEncoding;
use crate::engine::{CompileOptions, DEFAULT_DFA_SIZE_LIMIT};
use crate::error::{Error, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "PHOTONDB_PCRE";

/// Regex subsystem configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegexConfig {
    /// Maximum number of ad-hoc patterns kept compiled
    pub cache_capacity: usize,
    /// Database encoding name (`UTF8`, `SQL_ASCII`, `LATIN1`, ...)
    pub encoding: String,
    /// DFA size ceiling in bytes, 0 for unlimited. Also bounds the size of
    /// each stored pattern value, which holds two DFAs.
    pub dfa_size_limit: usize,
}

impl Default for RegexConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            encoding: "UTF8".to_string(),
            dfa_size_limit: DEFAULT_DFA_SIZE_LIMIT,
        }
    }
}

impl RegexConfig {
    /// Load defaults, then `path` if given, then the environment
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("cache_capacity", defaults.cache_capacity as i64)
            .and_then(|b| b.set_default("encoding", defaults.encoding.clone()))
            .and_then(|b| b.set_default("dfa_size_limit", defaults.dfa_size_limit as i64))
            .map_err(|e| Error::Config(e.to_string()))?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path.as_ref()).required(true));
        }

        let config: Self = builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot be used
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::Config(
                "cache_capacity must be at least 1".to_string(),
            ));
        }
        self.database_encoding()
            .map_err(|e| Error::Config(format!("encoding: {}", e)))?;
        Ok(())
    }

    pub fn database_encoding(&self) -> Result<DatabaseEncoding> {
        DatabaseEncoding::from_name(&self.encoding)
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            dfa_size_limit: match self.dfa_size_limit {
                0 => None,
                limit => Some(limit),
            },
        }
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("photondb_pcre_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pcre.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let config = RegexConfig::default();
        assert_eq!(config.cache_capacity, 32);
        config.validate()?;
        assert_eq!(config.database_encoding()?, DatabaseEncoding::Utf8);
        assert_eq!(config.compile_options(), CompileOptions::default());
        Ok(())
    }

    #[test]
    fn test_load_file() -> Result<()> {
        let path = temp_file(
            "load",
            "cache_capacity = 8\nencoding = \"LATIN1\"\ndfa_size_limit = 0\n",
        );
        let config = RegexConfig::load(Some(&path))?;
        assert_eq!(config.cache_capacity, 8);
        assert_eq!(config.encoding, "LATIN1");
        assert_eq!(config.compile_options().dfa_size_limit, None);

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
        Ok(())
    }

    #[test]
    fn test_load_rejects_zero_capacity() {
        let path = temp_file("zero", "cache_capacity = 0\n");
        assert!(matches!(
            RegexConfig::load(Some(&path)),
            Err(Error::Config(_))
        ));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_unknown_encoding() {
        let config = RegexConfig {
            encoding: "EBCDIC-ish".to_string(),
            ..RegexConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_toml_output() -> Result<()> {
        let rendered = RegexConfig::default().to_toml()?;
        let parsed: RegexConfig =
            toml::from_str(&rendered).map_err(|e| Error::Config(e.to_string()))?;
        assert_eq!(parsed, RegexConfig::default());
        Ok(())
    }
}
