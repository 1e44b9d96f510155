#![forbid(unsafe_code)]

//! Payload framing.
//!
//! A client payload is a list of bursts separated by [`SEPARATOR`]. The
//! first segment is the session token (or the literal `init`); every other
//! segment is one escaped burst of invocations. Inside a burst the
//! separator and the escape character itself are written as [`ESCAPE`]
//! followed by the original character shifted by `0x30`.
//!
//! # Invariants
//!
//! 1. **Exact inverse**: `unescape(&escape(s)) == Ok(s)` for every string.
//! 2. **No bare separators**: `escape` output never contains [`SEPARATOR`].
//! 3. **Trailing empties dropped**: `split_payload("a\u{1d}\u{1d}")` is `["a"]`.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Dangling escape | Truncated payload | `BurstError::UnexpectedEnd` |
//! | Unknown escape | Corrupted payload | `BurstError::InvalidEscape` |

use core::fmt;

/// Burst separator, `U+001D`.
pub const SEPARATOR: char = '\u{1d}';
/// Escape introducer, `U+001B`.
pub const ESCAPE: char = '\u{1b}';

const SHIFT: u32 = 0x30;

/// A burst with a broken escape sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstError {
    UnexpectedEnd,
    InvalidEscape(char),
}

impl fmt::Display for BurstError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd => f.write_str("Unexpected end of message"),
            Self::InvalidEscape(c) => write!(f, "Invalid escaped character {c:?}"),
        }
    }
}

impl std::error::Error for BurstError {}

fn shifted(c: char) -> char {
    char::from_u32(c as u32 + SHIFT).unwrap_or(c)
}

/// Escape a burst for transport.
///
/// ```
/// use csync_runtime::burst::{escape, unescape};
///
/// let raw = "a\u{1d}b\u{1b}c";
/// let wire = escape(raw);
/// assert_eq!(wire, "a\u{1b}Mb\u{1b}Kc");
/// assert_eq!(unescape(&wire).unwrap(), raw);
/// ```
#[must_use]
pub fn escape(burst: &str) -> String {
    let mut out = String::with_capacity(burst.len());
    for c in burst.chars() {
        if c == ESCAPE || c == SEPARATOR {
            out.push(ESCAPE);
            out.push(shifted(c));
        } else {
            out.push(c);
        }
    }
    out
}

/// Undo [`escape`].
///
/// # Errors
///
/// [`BurstError`] for a dangling or unknown escape.
pub fn unescape(burst: &str) -> Result<String, BurstError> {
    if !burst.contains(ESCAPE) {
        return Ok(burst.to_owned());
    }
    let mut out = String::with_capacity(burst.len());
    let mut chars = burst.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        let escaped = chars.next().ok_or(BurstError::UnexpectedEnd)?;
        match escaped {
            e if e == shifted(ESCAPE) => out.push(ESCAPE),
            e if e == shifted(SEPARATOR) => out.push(SEPARATOR),
            other => return Err(BurstError::InvalidEscape(other)),
        }
    }
    Ok(out)
}

/// Split a payload into segments, dropping trailing empty segments.
#[must_use]
pub fn split_payload(payload: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = payload.split(SEPARATOR).collect();
    while segments.last().is_some_and(|s| s.is_empty()) {
        segments.pop();
    }
    segments
}

/// Join a token and raw bursts into a payload, escaping each burst.
#[must_use]
pub fn join_payload<'a>(token: &str, bursts: impl IntoIterator<Item = &'a str>) -> String {
    let mut payload = token.to_owned();
    for burst in bursts {
        payload.push(SEPARATOR);
        payload.push_str(&escape(burst));
    }
    payload
}
