//! Content fingerprinting: MD5 digests of recipe text and target files.

use std::path::Path;

use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;
use tracing::{instrument, trace};

use crate::error::Result;

/// Stands in for "no content hash"; targets in this set fall back to
/// timestamp comparison because equality here doesn't imply equal content.
pub const NONSUM: [&str; 2] = ["directory", "ignore"];

pub fn is_nonsum(hash: &str) -> bool {
    NONSUM.contains(&hash)
}

/// MD5 of a UTF-8 string, hex-encoded.
#[instrument(skip(s))]
pub fn hash_string(s: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// MD5 of a file's bytes, read in 4096-byte chunks, with the sentinels the
/// ledger format expects for non-regular or empty files.
#[instrument]
pub async fn hash_file(path: &Path) -> Result<String> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            trace!(?path, "missing");
            return Ok("missing".to_string());
        }
        Err(err) => return Err(err.into()),
    };

    if metadata.is_dir() {
        trace!(?path, "directory");
        return Ok("directory".to_string());
    }

    if metadata.len() == 0 {
        trace!(?path, "empty");
        return Ok("empty".to_string());
    }

    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 4096];
    loop {
        let len = file.read(&mut buf).await?;
        if len == 0 {
            break;
        }
        hasher.update(&buf[..len]);
    }
    let digest = hex::encode(hasher.finalize());
    trace!(?path, hash = %digest, "hashed file");
    Ok(digest)
}
