//! Match and capture execution
//!
//! Subjects are normalized with the database encoding before they reach the
//! engine, the same way patterns are at compile time. Match text and
//! captures are returned in the canonical encoding; `Session` converts them
//! back for the caller.

use crate::encoding::DatabaseEncoding;
use crate::engine::PatternHandle;
use crate::error::Result;

/// Result of one match request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The pattern does not match the subject
    NoMatch,
    /// Text of the whole match (group 0)
    Matched(Vec<u8>),
    /// Groups `1..=k` in order; `None` for groups that did not participate
    Captured(Vec<Option<Vec<u8>>>),
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        !matches!(self, MatchOutcome::NoMatch)
    }
}

/// Whether `handle` matches `subject`, without extracting any text
pub fn is_match<T: AsRef<[u8]>>(
    subject: &[u8],
    encoding: DatabaseEncoding,
    handle: &PatternHandle<T>,
) -> Result<bool> {
    let subject = encoding.normalize(subject)?;
    handle.is_match(&subject)
}

/// Run `handle` against `subject` from offset 0.
///
/// With `want_captures` the result holds one slot per declared capture
/// group, whether or not the group took part in the match.
pub fn match_and_capture<T: AsRef<[u8]>>(
    subject: &[u8],
    encoding: DatabaseEncoding,
    handle: &PatternHandle<T>,
    want_captures: bool,
) -> Result<MatchOutcome> {
    let subject = encoding.normalize(subject)?;

    if !want_captures {
        return Ok(match handle.find(&subject)? {
            Some(span) => MatchOutcome::Matched(subject[span].to_vec()),
            None => MatchOutcome::NoMatch,
        });
    }

    Ok(match handle.captures(&subject)? {
        Some(groups) => MatchOutcome::Captured(
            groups
                .into_iter()
                .map(|span| span.map(|span| subject[span].to_vec()))
                .collect(),
        ),
        None => MatchOutcome::NoMatch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CompileOptions, SyntaxMode};
    use crate::error::Error;

    fn compile(pattern: &str) -> Result<PatternHandle> {
        PatternHandle::compile(
            pattern.as_bytes(),
            SyntaxMode::Unicode,
            &CompileOptions::default(),
        )
    }

    #[test]
    fn test_no_match() -> Result<()> {
        let handle = compile("[0-9]+")?;
        let utf8 = DatabaseEncoding::Utf8;
        assert!(!is_match(b"xyz", utf8, &handle)?);
        assert_eq!(match_and_capture(b"xyz", utf8, &handle, false)?, MatchOutcome::NoMatch);
        assert_eq!(match_and_capture(b"xyz", utf8, &handle, true)?, MatchOutcome::NoMatch);
        Ok(())
    }

    #[test]
    fn test_whole_match_text() -> Result<()> {
        let handle = compile("[0-9]+")?;
        let outcome =
            match_and_capture(b"order 4711 shipped", DatabaseEncoding::Utf8, &handle, false)?;
        assert_eq!(outcome, MatchOutcome::Matched(b"4711".to_vec()));
        assert!(outcome.is_match());
        Ok(())
    }

    #[test]
    fn test_captures_skip_group_zero() -> Result<()> {
        let handle = compile(r"(\d{4})-(\d{2})-(\d{2})")?;
        let outcome =
            match_and_capture(b"on 2024-03-17", DatabaseEncoding::Utf8, &handle, true)?;
        assert_eq!(
            outcome,
            MatchOutcome::Captured(vec![
                Some(b"2024".to_vec()),
                Some(b"03".to_vec()),
                Some(b"17".to_vec()),
            ])
        );
        Ok(())
    }

    #[test]
    fn test_captures_keep_declared_count() -> Result<()> {
        let handle = compile("(a)|(b)|(c)")?;
        let outcome = match_and_capture(b"b", DatabaseEncoding::Utf8, &handle, true)?;
        assert_eq!(
            outcome,
            MatchOutcome::Captured(vec![None, Some(b"b".to_vec()), None])
        );
        Ok(())
    }

    #[test]
    fn test_no_groups_with_captures() -> Result<()> {
        let handle = compile("abc")?;
        let outcome = match_and_capture(b"xabcx", DatabaseEncoding::Utf8, &handle, true)?;
        assert_eq!(outcome, MatchOutcome::Captured(vec![]));
        Ok(())
    }

    #[test]
    fn test_subject_normalized() -> Result<()> {
        let latin1 = DatabaseEncoding::from_name("LATIN1")?;
        let handle = compile("(é+)")?;
        let outcome = match_and_capture(b"caf\xE9\xE9", latin1, &handle, true)?;
        assert_eq!(outcome, MatchOutcome::Captured(vec![Some("éé".as_bytes().to_vec())]));
        Ok(())
    }

    #[test]
    fn test_invalid_subject_encoding() -> Result<()> {
        let handle = compile("a")?;
        let err = is_match(b"a\xFF", DatabaseEncoding::Utf8, &handle).unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));
        Ok(())
    }
}
