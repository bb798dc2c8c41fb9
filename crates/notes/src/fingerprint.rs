use crate::{NotesError, Result};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

/// Length of a fingerprint in hex characters (SHA-1 digest).
pub const FINGERPRINT_LEN: usize = 40;

/// Identity of a note: the lowercase hex SHA-1 of one line's text.
///
/// The line terminator is never part of the hashed text. Identical text always
/// yields the same fingerprint, so a note follows its line when other lines move
/// and is orphaned once the line itself is edited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

/// Fingerprint of a single line of text.
#[must_use]
pub fn fingerprint(text: &str) -> Fingerprint {
    Fingerprint::of(text)
}

impl Fingerprint {
    #[must_use]
    pub fn of(text: &str) -> Self {
        let digest = Sha1::digest(text.as_bytes());
        Self(hex_encode_lower(&digest))
    }

    /// Parses a note file name back into a fingerprint.
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = raw.len() == FINGERPRINT_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(NotesError::InvalidFingerprint(raw.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Fingerprint {
    type Err = NotesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = NotesError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

fn hex_encode_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len().saturating_mul(2));
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
