//! Encoding normalization
//!
//! The regex engine only understands UTF-8 (or raw bytes, for `SQL_ASCII`
//! databases). Patterns at compile time and subjects at match time are both
//! run through [`DatabaseEncoding::normalize`] so the engine always sees the
//! same representation on both sides.
//!
//! ```text
//! UTF8       → validated, borrowed
//! SQL_ASCII  → borrowed as-is (byte-transparent)
//! other      → decoded to UTF-8 via encoding_rs (borrowed if pure ASCII)
//! ```

use crate::error::{Error, Result};
use encoding_rs::Encoding;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Server-side text encoding of the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseEncoding {
    /// Canonical encoding
    Utf8,
    /// Byte-transparent encoding, no conversion and no validation
    SqlAscii,
    /// Any other ASCII-compatible encoding
    Other(&'static Encoding),
}

impl DatabaseEncoding {
    /// Resolve a PostgreSQL encoding name (`UTF8`, `LATIN1`, `WIN1251`,
    /// `EUC_JP`, ...) or a WHATWG encoding label.
    pub fn from_name(name: &str) -> Result<Self> {
        let key: String = name
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_uppercase();

        match key.as_str() {
            "UTF8" | "UNICODE" => return Ok(Self::Utf8),
            "SQLASCII" => return Ok(Self::SqlAscii),
            _ => {}
        }

        let label = postgres_label(&key).unwrap_or_else(|| name.trim().to_string());
        let encoding = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown encoding: {}", name)))?;

        if encoding == encoding_rs::UTF_8 {
            Ok(Self::Utf8)
        } else if !encoding.is_ascii_compatible() {
            Err(Error::InvalidArgument(format!(
                "Encoding {} cannot be used as a database encoding",
                encoding.name()
            )))
        } else {
            Ok(Self::Other(encoding))
        }
    }

    /// Display name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::Utf8 => "UTF8",
            Self::SqlAscii => "SQL_ASCII",
            Self::Other(encoding) => encoding.name(),
        }
    }

    /// Convert `bytes` from this encoding to the canonical encoding.
    ///
    /// Returns the input unchanged when no conversion is needed.
    pub fn normalize<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        match self {
            Self::Utf8 => match std::str::from_utf8(bytes) {
                Ok(_) => Ok(Cow::Borrowed(bytes)),
                Err(_) => Err(self.invalid()),
            },
            Self::SqlAscii => Ok(Cow::Borrowed(bytes)),
            Self::Other(encoding) => {
                match encoding.decode_without_bom_handling_and_without_replacement(bytes) {
                    Some(Cow::Borrowed(text)) => Ok(Cow::Borrowed(text.as_bytes())),
                    Some(Cow::Owned(text)) => Ok(Cow::Owned(text.into_bytes())),
                    None => Err(self.invalid()),
                }
            }
        }
    }

    /// Convert canonical bytes produced by the engine back to this encoding.
    pub fn denormalize<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        match self {
            Self::Utf8 | Self::SqlAscii => Ok(Cow::Borrowed(bytes)),
            Self::Other(encoding) => {
                let text = std::str::from_utf8(bytes).map_err(|_| Error::Encoding {
                    encoding: Self::Utf8.name().to_string(),
                })?;
                let (converted, _, unmappable) = encoding.encode(text);
                if unmappable {
                    Err(self.invalid())
                } else {
                    Ok(converted)
                }
            }
        }
    }

    fn invalid(&self) -> Error {
        Error::Encoding {
            encoding: self.name().to_string(),
        }
    }
}

/// Map PostgreSQL encoding names (already upper-cased, separators removed)
/// to WHATWG labels.
fn postgres_label(key: &str) -> Option<String> {
    let label = match key {
        "LATIN1" => "iso-8859-1",
        "LATIN2" => "iso-8859-2",
        "LATIN3" => "iso-8859-3",
        "LATIN4" => "iso-8859-4",
        "LATIN5" => "iso-8859-9",
        "LATIN6" => "iso-8859-10",
        "LATIN7" => "iso-8859-13",
        "LATIN8" => "iso-8859-14",
        "LATIN9" => "iso-8859-15",
        "LATIN10" => "iso-8859-16",
        "WIN866" => "ibm866",
        "KOI8R" => "koi8-r",
        "KOI8U" => "koi8-u",
        "EUCJP" => "euc-jp",
        "EUCKR" => "euc-kr",
        "EUCCN" => "gb2312",
        "SJIS" => "shift_jis",
        "BIG5" => "big5",
        "GBK" => "gbk",
        "GB18030" => "gb18030",
        _ => {
            if let Some(code_page) = key.strip_prefix("WIN") {
                return Some(format!("windows-{}", code_page));
            }
            if let Some(part) = key.strip_prefix("ISO8859") {
                return Some(format!("iso-8859-{}", part));
            }
            return None;
        }
    };
    Some(label.to_string())
}

impl FromStr for DatabaseEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl fmt::Display for DatabaseEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Default for DatabaseEncoding {
    fn default() -> Self {
        Self::Utf8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() -> Result<()> {
        assert_eq!(DatabaseEncoding::from_name("UTF8")?, DatabaseEncoding::Utf8);
        assert_eq!(DatabaseEncoding::from_name("utf-8")?, DatabaseEncoding::Utf8);
        assert_eq!(
            DatabaseEncoding::from_name("SQL_ASCII")?,
            DatabaseEncoding::SqlAscii
        );
        assert_eq!(
            DatabaseEncoding::from_name("WIN1251")?,
            DatabaseEncoding::Other(encoding_rs::WINDOWS_1251)
        );
        assert_eq!(
            DatabaseEncoding::from_name("EUC_JP")?,
            DatabaseEncoding::Other(encoding_rs::EUC_JP)
        );
        assert_eq!(
            DatabaseEncoding::from_name("ISO_8859_5")?,
            DatabaseEncoding::Other(encoding_rs::ISO_8859_5)
        );
        assert!(DatabaseEncoding::from_name("klingon").is_err());
        assert!(DatabaseEncoding::from_name("UTF-16LE").is_err());
        Ok(())
    }

    #[test]
    fn test_utf8_is_zero_copy() -> Result<()> {
        let input = "héllo".as_bytes();
        let normalized = DatabaseEncoding::Utf8.normalize(input)?;
        assert!(matches!(normalized, Cow::Borrowed(_)));
        assert_eq!(normalized.as_ref(), input);
        Ok(())
    }

    #[test]
    fn test_utf8_rejects_invalid() {
        let err = DatabaseEncoding::Utf8.normalize(b"ab\xFFcd").unwrap_err();
        assert!(matches!(err, Error::Encoding { ref encoding } if encoding == "UTF8"));
    }

    #[test]
    fn test_sql_ascii_is_transparent() -> Result<()> {
        let input = b"ab\xFF\x80cd";
        let normalized = DatabaseEncoding::SqlAscii.normalize(input)?;
        assert!(matches!(normalized, Cow::Borrowed(_)));
        assert_eq!(normalized.as_ref(), input);
        Ok(())
    }

    #[test]
    fn test_latin1_converts() -> Result<()> {
        let latin1 = DatabaseEncoding::from_name("LATIN1")?;

        let ascii = latin1.normalize(b"plain")?;
        assert!(matches!(ascii, Cow::Borrowed(_)));

        let converted = latin1.normalize(b"caf\xE9")?;
        assert!(matches!(converted, Cow::Owned(_)));
        assert_eq!(converted.as_ref(), "café".as_bytes());

        let back = latin1.denormalize(&converted)?;
        assert_eq!(back.as_ref(), b"caf\xE9");
        Ok(())
    }

    #[test]
    fn test_multibyte_rejects_malformed() -> Result<()> {
        let sjis = DatabaseEncoding::from_name("SJIS")?;
        // Lead byte without a trail byte
        assert!(sjis.normalize(b"abc\x82").is_err());
        Ok(())
    }

    #[test]
    fn test_denormalize_unmappable() -> Result<()> {
        let latin1 = DatabaseEncoding::from_name("LATIN1")?;
        assert!(latin1.denormalize("日本".as_bytes()).is_err());
        Ok(())
    }
}
