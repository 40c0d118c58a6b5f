//! Author and committer identities.
//!
//! Names and emails are byte strings; git never promises UTF-8. The wire
//! form is `Name <email> <unix-seconds> <±HHMM>`, both in commit objects
//! and in `git var GIT_*_IDENT` output.

use std::ffi::{OsStr, OsString};

use bstr::{BString, ByteSlice};

use crate::date::Date;
use crate::error::Error;

/// An author or committer: name, email, and optionally a timestamp.
///
/// A missing timestamp means "stamp at write time": `commit-tree` fills in
/// the current time when no `GIT_*_DATE` is exported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    pub date: Option<Date>,
}

impl Signature {
    #[must_use]
    pub fn new(name: impl Into<BString>, email: impl Into<BString>, date: Option<Date>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            date,
        }
    }

    /// Parse the wire form `Name <email> <seconds> <±HHMM>`.
    ///
    /// # Errors
    /// Returns [`Error::BadIdentity`] on malformed input and
    /// [`Error::BadDate`] on a malformed timestamp.
    pub fn parse(line: &[u8]) -> Result<Self, Error> {
        let bad = || Error::BadIdentity {
            value: String::from_utf8_lossy(line).into_owned(),
        };
        let lt = line.find_byte(b'<').ok_or_else(bad)?;
        let gt = line[lt..].find_byte(b'>').map(|i| lt + i).ok_or_else(bad)?;
        let name = line[..lt].trim().as_bstr().to_owned();
        let email = line[lt + 1..gt].as_bstr().to_owned();
        let rest = line[gt + 1..].trim();
        let rest = std::str::from_utf8(rest).map_err(|_| bad())?;
        let (secs, offset) = rest.split_once(' ').ok_or_else(bad)?;
        let seconds: i64 = secs.parse().map_err(|_| bad())?;
        let date = Date::from_raw(seconds, offset.trim())?;
        Ok(Self {
            name,
            email,
            date: Some(date),
        })
    }

    /// `Name <email>`.
    #[must_use]
    pub fn name_email(&self) -> BString {
        let mut out = self.name.clone();
        out.extend_from_slice(b" <");
        out.extend_from_slice(&self.email);
        out.extend_from_slice(b">");
        out
    }

    /// The environment variables that make `commit-tree` record this
    /// identity, for the given role (`"AUTHOR"` or `"COMMITTER"`).
    ///
    /// The date variable is omitted when no timestamp is carried, leaving
    /// git to stamp the current time.
    ///
    /// # Errors
    /// [`Error::BadIdentity`] when the bytes cannot cross the platform's
    /// `OsStr` boundary (non-UTF-8 on Windows).
    pub fn env_vars(&self, role: &str) -> Result<Vec<(String, OsString)>, Error> {
        let mut vars = vec![
            (format!("GIT_{role}_NAME"), osstring_from_bytes(&self.name)?),
            (format!("GIT_{role}_EMAIL"), osstring_from_bytes(&self.email)?),
        ];
        if let Some(date) = &self.date {
            vars.push((format!("GIT_{role}_DATE"), OsString::from(date.raw())));
        }
        Ok(vars)
    }

    /// Replace the timestamp.
    #[must_use]
    pub fn with_date(mut self, date: Option<Date>) -> Self {
        self.date = date;
        self
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)?;
        if let Some(date) = &self.date {
            write!(f, " {}", date.raw())?;
        }
        Ok(())
    }
}

#[cfg(unix)]
pub(crate) fn osstr_from_bytes(bytes: &[u8]) -> Result<&OsStr, Error> {
    use std::os::unix::ffi::OsStrExt;
    Ok(OsStr::from_bytes(bytes))
}

#[cfg(windows)]
pub(crate) fn osstr_from_bytes(bytes: &[u8]) -> Result<&OsStr, Error> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.as_ref()),
        Err(_) => Err(Error::BadIdentity {
            value: String::from_utf8_lossy(bytes).into_owned(),
        }),
    }
}

pub(crate) fn osstring_from_bytes(bytes: &[u8]) -> Result<OsString, Error> {
    Ok(osstr_from_bytes(bytes)?.to_owned())
}
