//! Persisted compiled pattern
//!
//! A `CompiledPattern` is the stored form of a regex column value: the
//! pattern text as the user wrote it, plus the engine's compiled form and the
//! engine version that produced it.
//!
//! # Layout
//!
//! ```text
//! [u32 total length][i16 major][i16 minor][i32 source length]
//! [source bytes][NUL][compiled form ...]
//! ```
//!
//! All integers little-endian. The total length includes the 4-byte prefix
//! itself, so a stored value is self-delimiting.

use crate::encoding::DatabaseEncoding;
use crate::engine::{
    serialize, CompileOptions, EngineVersion, PatternHandle, SyntaxMode, ENGINE_VERSION,
};
use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use tracing::debug;

/// Size of the fixed header preceding the source text
pub const HEADER_LEN: usize = 4 + 2 + 2 + 4;

/// Compiled pattern container
#[derive(Clone, PartialEq, Eq)]
pub struct CompiledPattern {
    version: EngineVersion,
    source: Vec<u8>,
    compiled: Vec<u8>,
}

impl CompiledPattern {
    /// Compile `source` (in the database encoding) into a container.
    pub fn construct(
        source: &[u8],
        encoding: DatabaseEncoding,
        options: &CompileOptions,
    ) -> Result<Self> {
        if let Some(pos) = source.iter().position(|&b| b == 0) {
            return Err(Error::InvalidArgument(format!(
                "Pattern contains a NUL byte at offset {}",
                pos
            )));
        }

        let normalized = encoding.normalize(source)?;
        let mode = SyntaxMode::for_encoding(encoding);
        let handle = PatternHandle::compile(&normalized, mode, options)?;
        let compiled = serialize::to_bytes(&handle)?;

        debug!(
            source_len = source.len(),
            compiled_len = compiled.len(),
            version = %ENGINE_VERSION,
            "Constructed compiled pattern"
        );

        Ok(Self {
            version: ENGINE_VERSION,
            source: source.to_vec(),
            compiled,
        })
    }

    /// Original pattern text, verbatim
    pub fn render(&self) -> &[u8] {
        &self.source
    }

    /// Engine version that produced the compiled form
    pub fn producer_version(&self) -> EngineVersion {
        self.version
    }

    /// Engine-specific compiled bytes
    pub fn compiled_form(&self) -> &[u8] {
        &self.compiled
    }

    /// Whether the compiled form came from the running engine version
    pub fn is_current(&self) -> bool {
        self.version == ENGINE_VERSION
    }

    /// Reinterpret the compiled form as a live handle borrowing from `self`.
    ///
    /// Does not check the producer version; see `Session::resolve`.
    pub fn load(&self) -> Result<PatternHandle<&[u8]>> {
        serialize::from_bytes(&self.compiled)
    }

    /// Serialize to the stored byte layout
    pub fn to_bytes(&self) -> Result<Bytes> {
        let total = HEADER_LEN + self.source.len() + 1 + self.compiled.len();
        let total_u32 = u32::try_from(total).map_err(|_| {
            Error::InvalidArgument(format!("Pattern value too large: {} bytes", total))
        })?;
        let source_len = i32::try_from(self.source.len()).map_err(|_| {
            Error::InvalidArgument(format!("Pattern text too long: {} bytes", self.source.len()))
        })?;

        let mut buf = BytesMut::with_capacity(total);
        buf.put_u32_le(total_u32);
        buf.put_i16_le(self.version.major);
        buf.put_i16_le(self.version.minor);
        buf.put_i32_le(source_len);
        buf.put_slice(&self.source);
        buf.put_u8(0);
        buf.put_slice(&self.compiled);

        Ok(buf.freeze())
    }

    /// Parse the stored byte layout.
    ///
    /// The compiled form is copied verbatim; it is only interpreted by
    /// [`CompiledPattern::load`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::CorruptPattern(format!(
                "Value too short: {} bytes",
                bytes.len()
            )));
        }

        let mut buf = bytes;
        let total = buf.get_u32_le() as usize;
        if total != bytes.len() {
            return Err(Error::CorruptPattern(format!(
                "Length prefix says {} bytes, value has {}",
                total,
                bytes.len()
            )));
        }

        let major = buf.get_i16_le();
        let minor = buf.get_i16_le();
        let version = EngineVersion::new(major, minor);
        let source_len = buf.get_i32_le();
        let source_len = usize::try_from(source_len).map_err(|_| {
            Error::CorruptPattern(format!("Negative source length: {}", source_len))
        })?;

        if buf.remaining() < source_len + 1 {
            return Err(Error::CorruptPattern(format!(
                "Source length {} exceeds value",
                source_len
            )));
        }
        let source = &buf[..source_len];
        if source.contains(&0) || buf[source_len] != 0 {
            return Err(Error::CorruptPattern(
                "Source text is not NUL-terminated".to_string(),
            ));
        }
        let compiled = &buf[source_len + 1..];

        Ok(Self {
            version,
            source: source.to_vec(),
            compiled: compiled.to_vec(),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_version(mut self, version: EngineVersion) -> Self {
        self.version = version;
        self
    }
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPattern")
            .field("version", &self.version)
            .field("source", &String::from_utf8_lossy(&self.source))
            .field("compiled_len", &self.compiled.len())
            .finish()
    }
}
