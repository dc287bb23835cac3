//! Reading the handful of `GM_*` environment variables that configure a
//! build and carry state between a recipe and the child it spawns.

use std::path::PathBuf;

use crate::error::Result;
use crate::timestamp::BuildTimestamp;

pub const LOG: &str = "LOG";
pub const GM_TIMEOUT: &str = "GM_TIMEOUT";
pub const GM_THREADS: &str = "GM_THREADS";
pub const GM_REMAKE: &str = "GM_REMAKE";
pub const GM_STARTTIME: &str = "GM_STARTTIME";
pub const GM_FILE: &str = "GM_FILE";

pub const DEFAULT_LOCK_WAIT_SECS: u64 = 60;
pub const DEFAULT_THREADS: usize = 8;

/// `GM_TIMEOUT`, the lock-retry backoff budget in seconds.
pub fn lock_wait_secs() -> u64 {
    std::env::var(GM_TIMEOUT)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_LOCK_WAIT_SECS)
}

/// `GM_THREADS`, the top-level worker pool size.
pub fn threads() -> usize {
    std::env::var(GM_THREADS)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or(DEFAULT_THREADS)
}

/// `GM_REMAKE`, parsed with the spec's truthy vocabulary.
pub fn remake() -> bool {
    match std::env::var(GM_REMAKE) {
        Ok(v) => is_truthy(&v),
        Err(_) => false,
    }
}

pub fn is_truthy(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "true" | "yes" | "1" | "on")
}

/// `GM_STARTTIME`: the inherited build instant, or `now` if this is a
/// top-level invocation.
pub fn start_time() -> Result<BuildTimestamp> {
    match std::env::var(GM_STARTTIME) {
        Ok(v) if v == "now" => Ok(BuildTimestamp::now()),
        Ok(v) => BuildTimestamp::parse(v),
        Err(_) => Ok(BuildTimestamp::now()),
    }
}

/// `GM_FILE`: the parent's info file, if this invocation is a recipe's
/// recursive child.
pub fn parent_file() -> Option<PathBuf> {
    std::env::var(GM_FILE).ok().map(PathBuf::from)
}
