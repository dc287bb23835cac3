//! The error type for the build engine.
//!
//! Unlike the rest of the ambient `color_eyre` reporting stack, the engine
//! needs one thing `eyre!`/`bail!` ad hoc errors don't give us for free: a
//! recipe's exact process exit code has to survive being carried through
//! several layers of `?` so the top-level driver can exit with it. That's
//! the one place this crate reaches for a typed error instead of `eyre`.

use std::path::PathBuf;

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Every fatal condition named in the spec's error handling design, plus
/// the catch-all for IO/join failures that aren't part of that design but
/// still need to propagate somewhere.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The build script could not be parsed: malformed shebang, unindented
    /// body line, or a script that doesn't exist.
    #[error("parse error in {script}: {reason}")]
    Parse { script: PathBuf, reason: String },

    /// Lock retry budget was exhausted waiting for a sibling build of the
    /// same target to finish.
    #[error("{lock_path} is locked; possible circular dependency")]
    LockContention { lock_path: PathBuf },

    /// The lock file reappeared mid-backoff with a timestamp that isn't
    /// ours: another build owns it.
    #[error("{lock_path} is locked by a different build ({owner}); try deleting it")]
    LockHijacked { lock_path: PathBuf, owner: String },

    /// An info file's terminal event refers to a different script than the
    /// one we were asked to build with.
    #[error(
        "{info_path} was created by {existing_script}, but {current_script} is trying to reuse it"
    )]
    ScriptMismatch {
        info_path: PathBuf,
        existing_script: PathBuf,
        current_script: PathBuf,
    },

    /// No stanza matched the target, and the target file doesn't exist
    /// either, so there's nothing to treat as a source file.
    #[error("no recipe for {target}")]
    MissingRecipe { target: String },

    /// The recipe's interpreter process exited non-zero.
    #[error("{description} returned {code}")]
    RecipeFailed { description: String, code: i32 },

    /// Propagated from a recursively-built dependency; carries the original
    /// failure's message so the "stale" reason stays informative, per the
    /// up-to-date predicate's rule (f): a dependency failure becomes a
    /// staleness reason, not an immediate abort.
    #[error("dependency {target} raised: {source}")]
    Dependency {
        target: String,
        #[source]
        source: Box<BuildError>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

impl BuildError {
    /// The process exit code this error should produce, mirroring the
    /// original's `getattr(error, 'returncode', 1)` duck typing.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::RecipeFailed { code, .. } => *code,
            BuildError::Dependency { source, .. } => source.exit_code(),
            _ => 1,
        }
    }
}

impl From<glob::PatternError> for BuildError {
    fn from(err: glob::PatternError) -> Self {
        BuildError::Other(format!("invalid glob pattern: {err}"))
    }
}
