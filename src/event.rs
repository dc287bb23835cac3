//! `BuildEvent`: one line of a per-target ledger.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{BuildError, Result};
use crate::timestamp::BuildTimestamp;

/// The header line written as the first line of every info file.
pub const HEADER: &str = "directory\tscript\ttarget\trecipe\ttimestamp\tresult";

/// Stanza-hash sentinel for a stanza with no recipe text at all.
pub const STANZA_MISSING: &str = "missing";
/// Stanza-hash sentinel for a stanza whose text is the empty string.
pub const STANZA_EMPTY: &str = "empty";

/// One tab-separated line: `(directory, script, target, stanza-hash,
/// timestamp, result-hash)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEvent {
    /// Absolute path the child that produced this event was invoked from.
    pub directory: PathBuf,
    /// The build-script path, exactly as given to that invocation.
    pub script: PathBuf,
    /// The target name, exactly as given.
    pub target: String,
    /// MD5 of composed recipe text, or `missing`/`empty`.
    pub stanza_hash: String,
    /// Instant the event was produced, absent for source-file short-circuits.
    pub timestamp: Option<BuildTimestamp>,
    /// MD5 of target contents, or a sentinel (`missing`/`directory`/`empty`/`ignore`).
    pub result_hash: String,
}

impl BuildEvent {
    /// Resolve `script` against `directory`, for identity comparisons.
    pub fn resolved_script(&self) -> PathBuf {
        if self.script.is_absolute() {
            self.script.clone()
        } else {
            self.directory.join(&self.script)
        }
    }

    /// Resolve `target` against `directory`, for identity comparisons.
    pub fn resolved_target(&self) -> PathBuf {
        let target = Path::new(&self.target);
        if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.directory.join(target)
        }
    }
}

impl fmt::Display for BuildEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.directory.display(),
            self.script.display(),
            self.target,
            self.stanza_hash,
            self.timestamp.as_ref().map(|t| t.as_str()).unwrap_or(""),
            self.result_hash,
        )
    }
}

impl FromStr for BuildEvent {
    type Err = BuildError;

    fn from_str(line: &str) -> Result<Self> {
        let mut cols = line.split('\t');
        let mut next = |name: &'static str| {
            cols.next()
                .ok_or_else(|| BuildError::Other(format!("ledger line missing column {name}")))
        };
        let directory = PathBuf::from(next("directory")?);
        let script = PathBuf::from(next("script")?);
        let target = next("target")?.to_string();
        let stanza_hash = next("recipe")?.to_string();
        let timestamp_text = next("timestamp")?;
        let result_hash = next("result")?.to_string();

        if cols.next().is_some() {
            return Err(BuildError::Other(format!(
                "ledger line has extra columns: {line:?}"
            )));
        }

        let timestamp = if timestamp_text.is_empty() {
            None
        } else {
            Some(BuildTimestamp::parse(timestamp_text)?)
        };

        Ok(BuildEvent {
            directory,
            script,
            target,
            stanza_hash,
            timestamp,
            result_hash,
        })
    }
}
