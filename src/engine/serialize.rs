//! Compiled form codec
//!
//! # Layout
//!
//! ```text
//! [u8  syntax mode]
//! [u32 capture count]
//! [u32 pattern length][pattern UTF-8]
//! [u32 forward DFA length][forward sparse DFA][reverse sparse DFA]
//! ```
//!
//! Integers are little-endian. DFA bytes are whatever `regex-automata`
//! writes in native endianness; its deserializer validates them, so a blob
//! from an incompatible build is rejected instead of trusted.
//!
//! Loading borrows the DFAs straight out of the compiled form. Sparse DFAs
//! carry no alignment requirement, so any byte slice will do.

use super::handle::{PatternHandle, SparseRegex};
use super::SyntaxMode;
use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use regex_automata::dfa::{regex::Builder, sparse};

const FIXED_HEADER: usize = 1 + 4 + 4;

/// Serialize a handle into its compiled form
pub fn to_bytes<T: AsRef<[u8]>>(handle: &PatternHandle<T>) -> Result<Vec<u8>> {
    let forward = handle.dfa.forward().to_bytes_native_endian();
    let reverse = handle.dfa.reverse().to_bytes_native_endian();

    let mut buf = BytesMut::with_capacity(
        FIXED_HEADER + handle.pattern.len() + 4 + forward.len() + reverse.len(),
    );
    buf.put_u8(handle.mode.as_u8());
    buf.put_u32_le(length_u32(handle.capture_count, "capture count")?);
    buf.put_u32_le(length_u32(handle.pattern.len(), "pattern")?);
    buf.put_slice(handle.pattern.as_bytes());
    buf.put_u32_le(length_u32(forward.len(), "forward DFA")?);
    buf.put_slice(&forward);
    buf.put_slice(&reverse);

    Ok(buf.to_vec())
}

/// Rebuild a handle over its compiled form without copying the DFAs
pub fn from_bytes(bytes: &[u8]) -> Result<PatternHandle<&[u8]>> {
    let mut buf = bytes;

    require(buf, FIXED_HEADER, "header")?;
    let mode = SyntaxMode::from_u8(buf.get_u8())?;
    let capture_count = buf.get_u32_le() as usize;
    let pattern_len = buf.get_u32_le() as usize;

    require(buf, pattern_len, "pattern")?;
    let pattern = std::str::from_utf8(&buf[..pattern_len])
        .map_err(|e| Error::CorruptPattern(format!("Pattern is not UTF-8: {}", e)))?
        .to_string();
    buf.advance(pattern_len);

    require(buf, 4, "forward DFA length")?;
    let forward_len = buf.get_u32_le() as usize;
    require(buf, forward_len, "forward DFA")?;
    let (forward, _) = sparse::DFA::from_bytes(&buf[..forward_len])
        .map_err(|e| Error::CorruptPattern(format!("Invalid forward DFA: {}", e)))?;
    let (reverse, reverse_len) = sparse::DFA::from_bytes(&buf[forward_len..])
        .map_err(|e| Error::CorruptPattern(format!("Invalid reverse DFA: {}", e)))?;
    if forward_len + reverse_len != buf.len() {
        return Err(Error::CorruptPattern(format!(
            "{} trailing bytes after reverse DFA",
            buf.len() - forward_len - reverse_len
        )));
    }

    let dfa: SparseRegex<&[u8]> = Builder::new().build_from_dfas(forward, reverse);

    Ok(PatternHandle::from_parts(mode, pattern, capture_count, dfa))
}

fn require(buf: &[u8], needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(Error::CorruptPattern(format!(
            "Truncated compiled form: {} needs {} bytes, {} left",
            what,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

fn length_u32(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| Error::InvalidArgument(format!("{} too large to store: {}", what, len)))
}
