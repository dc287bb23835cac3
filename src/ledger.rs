//! The per-target info file and its sibling lock file.
//!
//! `Info` is a scoped resource: [`Info::enter`] acquires the lock and parses
//! whatever ledger already exists, and the caller must end the scope with
//! either [`Info::finish_ok`] or [`Info::finish_err`] — there's no safe
//! async `Drop` to do this automatically, so unlike the teacher's
//! `LockFile<State>` typestate this is an explicit two-call protocol rather
//! than a guard that releases on drop. The `Unlocked`/`Locked` marker-type
//! shape is kept only in spirit: `Info` itself plays the role of the locked
//! state, returned solely by `enter`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rand::random;
use tap::TapFallible;
use tokio::task::spawn_blocking;
use tracing::{debug, instrument, trace, warn};

use crate::cancel::CancelSlot;
use crate::error::{BuildError, Result};
use crate::event::{BuildEvent, HEADER};
use crate::fingerprint::hash_string;
use crate::timestamp::BuildTimestamp;

/// Retry budget for lock acquisition, per spec.
const LOCK_TRIES: u32 = 10;

/// Filename and lock-file path for a target, mirroring the original's
/// `.<basename>.gm` / `.<basename>.gm.lock` naming, with virtual targets
/// disambiguated by a hash of the owning script's path so two scripts can
/// both declare e.g. `!default` without colliding.
pub fn paths(target: &Path, script_path: &Path, is_virtual: bool) -> (PathBuf, PathBuf) {
    let dir = target.parent().filter(|p| !p.as_os_str().is_empty());
    let basename = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut name = format!(".{basename}");
    if is_virtual {
        name.push('_');
        name.push_str(&hash_string(&script_path.to_string_lossy()));
    }
    name.push_str(".gm");

    let filename = match dir {
        Some(dir) => dir.join(&name),
        None => PathBuf::from(&name),
    };
    let lockname = {
        let mut s = filename.clone().into_os_string();
        s.push(".lock");
        PathBuf::from(s)
    };
    (filename, lockname)
}

/// A locked, parsed info file.
pub struct Info {
    pub filename: PathBuf,
    lockname: PathBuf,
    /// mtime of the info file as it existed at lock time, if any.
    pub timestamp: Option<SystemTime>,
    /// Dependency events recorded by prior child invocations.
    pub deps: Vec<BuildEvent>,
    /// The terminal event from the previous successful build, if any.
    pub last: Option<BuildEvent>,
}

impl Info {
    /// Acquire the lock for `current`'s target, retrying with backoff, then
    /// parse any existing ledger.
    #[instrument(skip(cancel), fields(target = %current.target))]
    pub async fn enter(
        current: &BuildEvent,
        is_virtual: bool,
        cancel: &CancelSlot,
        lock_wait_secs: u64,
    ) -> Result<Info> {
        let script_path = current.resolved_script();
        let resolved_target = current.resolved_target();
        let (filename, lockname) = paths(&resolved_target, &script_path, is_virtual);

        if let Some(dir) = lockname.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }

        let our_timestamp = current
            .timestamp
            .as_ref()
            .map(|t| t.as_str().to_string())
            .unwrap_or_default();

        acquire_lock(&lockname, &our_timestamp, cancel, lock_wait_secs).await?;

        match Self::parse(&filename, current).await {
            Ok((timestamp, deps, last)) => Ok(Info {
                filename,
                lockname,
                timestamp,
                deps,
                last,
            }),
            Err(err) => {
                let _ = tokio::fs::remove_file(&lockname).await;
                Err(err)
            }
        }
    }

    async fn parse(
        filename: &Path,
        current: &BuildEvent,
    ) -> Result<(Option<SystemTime>, Vec<BuildEvent>, Option<BuildEvent>)> {
        if !tokio::fs::try_exists(filename).await? {
            return Ok((None, Vec::new(), None));
        }

        let metadata = tokio::fs::metadata(filename).await?;
        let mtime = metadata.modified().ok();

        let content = tokio::fs::read_to_string(filename).await?;
        let mut lines = content.lines();
        lines.next(); // header

        let mut events = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            events.push(line.parse::<BuildEvent>()?);
        }

        let last = events.pop();
        if let Some(last) = &last {
            if last.resolved_script() != current.resolved_script() {
                return Err(BuildError::ScriptMismatch {
                    info_path: filename.to_path_buf(),
                    existing_script: last.resolved_script(),
                    current_script: current.resolved_script(),
                });
            }
        }

        Ok((mtime, events, last))
    }

    /// Truncate the info file and write the header line, opening the
    /// rebuild window.
    pub async fn open_for_write(&self) -> Result<()> {
        tokio::fs::write(&self.filename, format!("{HEADER}\n")).await?;
        debug!(filename = ?self.filename, "created info file");
        Ok(())
    }

    /// Append one dependency's terminal event, called by a recursive child
    /// invocation that discovered this file via `GM_FILE`.
    pub async fn append(filename: &Path, event: &BuildEvent) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(filename)
            .await?;
        file.write_all(format!("{event}\n").as_bytes()).await?;
        Ok(())
    }

    /// Stamp the info file's mtime to "now", recording a clean cache-hit
    /// decision at this build's timestamp.
    pub async fn checked(&self) -> Result<()> {
        touch(&self.filename).await
    }

    /// Skip path: the prior terminal event is still valid, so just bump the
    /// mtime (recording that it was checked) and release the lock, without
    /// rewriting the file.
    pub async fn finish_skip(&self) -> Result<()> {
        touch(&self.filename).await?;
        self.release_lock().await
    }

    /// Successful completion: append the terminal event, bump the mtime,
    /// release the lock.
    pub async fn finish_ok(&self, terminal: &BuildEvent) -> Result<()> {
        Self::append(&self.filename, terminal).await?;
        touch(&self.filename).await?;
        self.release_lock().await
    }

    /// Failed completion: remove the info file (never left half-written)
    /// and release the lock.
    pub async fn finish_err(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.filename).await.unwrap_or(false) {
            let _ = tokio::fs::remove_file(&self.filename).await;
        }
        self.release_lock().await
    }

    async fn release_lock(&self) -> Result<()> {
        trace!(lockname = ?self.lockname, "unlocking");
        tokio::fs::remove_file(&self.lockname)
            .await
            .or_else(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    Ok(())
                } else {
                    Err(err)
                }
            })?;
        Ok(())
    }
}

async fn touch(path: &Path) -> Result<()> {
    let path = path.to_path_buf();
    spawn_blocking(move || filetime::set_file_mtime(&path, filetime::FileTime::now()))
        .await?
        .tap_ok(|_| trace!(?path, "touched mtime"))?;
    Ok(())
}

async fn acquire_lock(
    lockname: &Path,
    our_timestamp: &str,
    cancel: &CancelSlot,
    lock_wait_secs: u64,
) -> Result<()> {
    let mut retry = LOCK_TRIES;
    loop {
        let created = {
            let lockname = lockname.to_path_buf();
            let our_timestamp = our_timestamp.to_string();
            spawn_blocking(move || -> std::io::Result<bool> {
                use std::io::Write;
                match std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&lockname)
                {
                    Ok(mut file) => {
                        writeln!(file, "{our_timestamp}")?;
                        Ok(true)
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
                    Err(err) => Err(err),
                }
            })
            .await??
        };

        if created {
            debug!(?lockname, "locked");
            return Ok(());
        }

        if retry == 0 {
            return Err(BuildError::LockContention {
                lock_path: lockname.to_path_buf(),
            });
        }
        retry -= 1;

        let amount = lock_wait_secs as f64 / (2f64.powi(retry as i32) + random::<f64>());
        if amount > 2.0 {
            warn!(?lockname, amount, "locked, backing off");
        } else {
            debug!(?lockname, amount, "locked, backing off");
        }

        if let Some(err) = cancel.get() {
            return Err(BuildError::Other(err.to_string()));
        }
        tokio::time::sleep(std::time::Duration::from_secs_f64(amount.max(0.0))).await;
        if let Some(err) = cancel.get() {
            return Err(BuildError::Other(err.to_string()));
        }

        match tokio::fs::read_to_string(lockname).await {
            Ok(content) => {
                let owner = content.trim();
                if !owner.is_empty() && owner != our_timestamp {
                    return Err(BuildError::LockHijacked {
                        lock_path: lockname.to_path_buf(),
                        owner: owner.to_string(),
                    });
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
}
