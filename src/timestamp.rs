//! The build timestamp: a single wall-clock instant shared across one
//! invocation tree.
//!
//! Two things are asked of this value that pull in different directions.
//! Ledger entries and `GM_STARTTIME` inheritance need the *exact formatted
//! string* compared byte-for-byte — a child that round-trips its parent's
//! timestamp through anything lossier than string equality would break the
//! "checked this build" clause. But the "checked this build" clause itself
//! (comparing against an info file's mtime) needs real duration arithmetic.
//! So a `BuildTimestamp` keeps both: the canonical string, and the
//! `jiff::Timestamp` it parses to.

use std::time::SystemTime;

use derive_more::Display;
use jiff::{Timestamp, fmt::strtime};

use crate::error::{BuildError, Result};

/// `strftime`/`strptime` pattern used for every on-disk and environment
/// representation of a build timestamp.
const FORMAT: &str = "%Y-%m-%dT%H:%M:%S.%f";

/// A wall-clock instant, carried as the exact string that will be written to
/// ledgers and environment variables, plus a parsed instant for arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{text}")]
pub struct BuildTimestamp {
    text: String,
    instant: Timestamp,
}

impl BuildTimestamp {
    /// The current instant, per the process clock.
    pub fn now() -> Self {
        let instant = Timestamp::now();
        let text = strtime::format(FORMAT, &instant).expect("fixed format string");
        Self { text, instant }
    }

    /// Parse a timestamp string in the canonical on-disk format.
    pub fn parse(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let instant = strtime::parse(FORMAT, &text)
            .and_then(|broken| broken.to_timestamp())
            .map_err(|err| BuildError::Other(format!("invalid timestamp {text:?}: {err}")))?;
        Ok(Self { text, instant })
    }

    /// The exact string to write to a ledger line, lock file, or
    /// `GM_STARTTIME`. Byte-identical across clones and round-trips.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Signed duration `self - earlier`, in whole milliseconds. Negative if
    /// `earlier` is actually later than `self`.
    pub fn millis_since(&self, earlier: &BuildTimestamp) -> i64 {
        let span = self.instant.since(earlier.instant).unwrap_or_default();
        span.total(jiff::Unit::Millisecond)
            .map(|ms| ms as i64)
            .unwrap_or(i64::MAX)
    }

    /// Signed duration `self - mtime`, in whole milliseconds, for comparing
    /// against a filesystem `SystemTime`.
    pub fn millis_since_system_time(&self, mtime: SystemTime) -> i64 {
        match Timestamp::try_from(mtime) {
            Ok(mtime) => self
                .instant
                .since(mtime)
                .ok()
                .and_then(|span| span.total(jiff::Unit::Millisecond).ok())
                .map(|ms| ms as i64)
                .unwrap_or(i64::MAX),
            Err(_) => i64::MAX,
        }
    }
}
