//! Commit timestamps and the free-form date parsing chain.
//!
//! Git stores a commit date as `<unix-seconds> <±HHMM>`. Users type dates
//! in whatever form they are used to, so parsing falls through five
//! stages: the raw git format, ISO 8601, the literal `now`, whatever
//! `git var GIT_AUTHOR_IDENT` accepts, and finally whatever the system
//! `date` command accepts. Legacy workflows depend on the full chain.

use std::process::{Command, Stdio};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone as _, Utc};

use crate::error::Error;

/// A commit timestamp: an instant plus the recorded UTC offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Date {
    time: DateTime<FixedOffset>,
}

/// Parse `[+-]HH[:]MM` into a fixed offset.
fn parse_offset(s: &str) -> Result<FixedOffset, Error> {
    let bad = || Error::BadDate {
        value: s.to_owned(),
        what: "time zone",
    };
    if !s.is_ascii() {
        return Err(bad());
    }
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return Err(bad()),
    };
    let digits: &str = match rest.len() {
        4 => rest,
        5 if rest.as_bytes()[2] == b':' => {
            // fold HH:MM down to HHMM
            return parse_offset(&format!("{}{}", &s[..3], &rest[3..]));
        }
        _ => return Err(bad()),
    };
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| bad())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| bad())?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(bad)
}

/// Split a trailing `[+-]HH[:]MM` offset off a date string, if present.
fn split_trailing_offset(s: &str) -> Option<(&str, &str)> {
    for n in [5usize, 6] {
        if s.len() > n && s.is_char_boundary(s.len() - n) {
            let (head, tail) = s.split_at(s.len() - n);
            if parse_offset(tail).is_ok() {
                return Some((head.trim_end(), tail));
            }
        }
    }
    None
}

/// Ask `git var GIT_AUTHOR_IDENT` to interpret a date string.
///
/// Returns `None` if git rejects it. An empty string asks for the current
/// time.
fn git_date(datestring: &str) -> Option<Date> {
    let output = Command::new("git")
        .args(["var", "GIT_AUTHOR_IDENT"])
        .env("GIT_AUTHOR_NAME", "XXX")
        .env("GIT_AUTHOR_EMAIL", "XXX")
        .env("GIT_AUTHOR_DATE", datestring)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let ident = String::from_utf8(output.stdout).ok()?;
    let mut fields = ident.split_whitespace().rev();
    let offset = fields.next()?;
    let seconds: i64 = fields.next()?.parse().ok()?;
    Date::from_raw(seconds, offset).ok()
}

/// Ask the system `date` command to interpret a date string.
///
/// A trailing offset is parsed here rather than by `date`, which would
/// convert the instant to the local time zone.
fn system_date(datestring: &str) -> Option<Date> {
    let run = |ds: &str, format: &str| -> Option<String> {
        let output = Command::new("date")
            .arg(format)
            .arg("-d")
            .arg(ds)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .ok()?;
        if output.status.success() {
            Some(String::from_utf8(output.stdout).ok()?.trim().to_owned())
        } else {
            None
        }
    };
    let (stamp, offset) = if let Some((ds, z)) = split_trailing_offset(datestring) {
        (run(ds, "+%Y-%m-%d-%H-%M-%S")?, z.to_owned())
    } else {
        let combined = run(datestring, "+%Y-%m-%d-%H-%M-%S_%z")?;
        let (t, z) = combined.split_once('_')?;
        (t.to_owned(), z.to_owned())
    };
    let mut parts = stamp.split('-').map(str::parse::<u32>);
    let mut next = || parts.next().and_then(Result::ok);
    let (y, mo, d, h, mi, s) = (next()?, next()?, next()?, next()?, next()?, next()?);
    let naive = NaiveDate::from_ymd_opt(i32::try_from(y).ok()?, mo, d)?.and_hms_opt(h, mi, s)?;
    let tz = parse_offset(&offset).ok()?;
    Some(Date {
        time: tz.from_local_datetime(&naive).single()?,
    })
}

impl Date {
    /// Build a date from unix seconds and a `[+-]HH[:]MM` offset.
    ///
    /// # Errors
    /// Returns [`Error::BadDate`] on an unrepresentable timestamp or
    /// offset.
    pub fn from_raw(seconds: i64, offset: &str) -> Result<Self, Error> {
        let tz = parse_offset(offset)?;
        let utc = DateTime::<Utc>::from_timestamp(seconds, 0).ok_or_else(|| Error::BadDate {
            value: format!("{seconds} {offset}"),
            what: "date",
        })?;
        Ok(Self {
            time: utc.with_timezone(&tz),
        })
    }

    /// Parse a free-form date string.
    ///
    /// Tries, in order: the raw git format `<seconds> <±HHMM>`, ISO
    /// `YYYY-MM-DD HH:MM:SS <±HH[:]MM>`, the literal `now`, `git var`,
    /// and the system `date` command. First match wins.
    ///
    /// # Errors
    /// Returns [`Error::BadDate`] when every stage rejects the string.
    pub fn parse(datestring: &str) -> Result<Self, Error> {
        let bad = || Error::BadDate {
            value: datestring.to_owned(),
            what: "date",
        };

        // Raw git format.
        if let Some((secs, offset)) = datestring.split_once(' ') {
            if !secs.is_empty() && secs.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(seconds) = secs.parse::<i64>() {
                    if parse_offset(offset.trim()).is_ok() {
                        return Self::from_raw(seconds, offset.trim());
                    }
                }
            }
        }

        // ISO format.
        if let Some((stamp, offset)) = split_trailing_offset(datestring) {
            if let Ok(naive) = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S") {
                let tz = parse_offset(offset)?;
                return tz
                    .from_local_datetime(&naive)
                    .single()
                    .map(|time| Self { time })
                    .ok_or_else(bad);
            }
        }

        if datestring == "now" {
            return Self::now();
        }

        if let Some(date) = git_date(datestring) {
            return Ok(date);
        }

        if let Some(date) = system_date(datestring) {
            return Ok(date);
        }

        Err(bad())
    }

    /// The current time, as git would stamp it.
    ///
    /// # Errors
    /// Returns [`Error::BadDate`] if `git var` is unusable.
    pub fn now() -> Result<Self, Error> {
        git_date("").ok_or(Error::BadDate {
            value: "now".to_owned(),
            what: "date",
        })
    }

    /// Unix seconds.
    #[must_use]
    pub fn seconds(&self) -> i64 {
        self.time.timestamp()
    }

    /// The recorded offset, formatted `±HHMM`.
    #[must_use]
    pub fn offset(&self) -> String {
        self.time.format("%z").to_string()
    }

    /// The raw git representation `<seconds> <±HHMM>`, as stored in
    /// commit objects and accepted by `GIT_*_DATE`.
    #[must_use]
    pub fn raw(&self) -> String {
        format!("{} {}", self.seconds(), self.offset())
    }
}

impl std::fmt::Display for Date {
    /// Human-friendly ISO 8601 form.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.time.format("%Y-%m-%d %H:%M:%S %z"))
    }
}
