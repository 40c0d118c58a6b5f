//! Validated git object IDs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The all-zeros OID git uses to mean "no such object" in ref transactions.
pub const ZERO_OID: &str = "0000000000000000000000000000000000000000";

/// A validated 40-character lowercase hex git object ID (SHA-1).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Parse an `Oid` from a string, validating format.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOid`] unless the string is exactly 40
    /// lowercase hex characters.
    pub fn new(s: &str) -> Result<Self, Error> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Parse an `Oid` from raw subprocess output: bytes, possibly with a
    /// trailing newline.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOid`] if the bytes are not a valid OID line.
    pub fn from_output(bytes: &[u8]) -> Result<Self, Error> {
        let s = std::str::from_utf8(bytes)
            .map_err(|_| Error::InvalidOid {
                value: String::from_utf8_lossy(bytes).into_owned(),
                reason: "not UTF-8".to_owned(),
            })?
            .trim_end_matches('\n');
        Self::new(s)
    }

    /// Return the inner hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), Error> {
        if s.len() != 40 {
            return Err(Error::InvalidOid {
                value: s.to_owned(),
                reason: format!("expected 40 hex characters, got {}", s.len()),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(Error::InvalidOid {
                value: s.to_owned(),
                reason: "must contain only lowercase hex characters (0-9, a-f)".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Oid {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Oid {
    type Error = Error;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}
