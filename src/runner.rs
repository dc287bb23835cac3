//! Spawns a stanza's interpreter, feeds it the recipe text on stdin, and
//! waits for completion while staying responsive to cooperative
//! cancellation.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::task::spawn_blocking;
use tracing::{debug, instrument};

use crate::cancel::CancelSlot;
use crate::error::{BuildError, Result};
use crate::recipe::Recipe;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run `recipe` against `target`, feeding its stanza text to the
/// interpreter's stdin. `extra_env` is overlaid on the current process
/// environment (used to pass `GM_STARTTIME`/`GM_FILE` to the child).
#[instrument(skip(recipe, extra_env, cancel), fields(%target))]
pub async fn run(
    recipe: &Recipe,
    dir: &Path,
    script_path: &Path,
    target: &str,
    extra_env: &[(String, String)],
    cancel: &CancelSlot,
) -> Result<()> {
    let stanza = recipe
        .stanza
        .as_ref()
        .ok_or_else(|| BuildError::MissingRecipe {
            target: target.to_string(),
        })?;

    let display_path = display_script_path(script_path).await?;
    let description = format!(
        "{} {} (with {})",
        display_path.display(),
        target,
        recipe.interpreter.join(" ")
    );
    debug!(%description, "running recipe");

    let mut cmd = tokio::process::Command::new(&recipe.interpreter[0]);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.arg0(display_path.as_os_str());
    }
    cmd.args(&recipe.interpreter[1..]);
    cmd.arg(target);
    cmd.arg(&display_path);
    cmd.current_dir(dir);
    cmd.envs(extra_env.iter().map(|(k, v)| (k.clone(), v.clone())));
    cmd.stdin(std::process::Stdio::piped());

    let mut child = cmd.spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(stanza.as_bytes()).await?;
        stdin.shutdown().await?;
    }

    loop {
        if let Some(status) = child.try_wait()? {
            return if status.success() {
                Ok(())
            } else {
                Err(BuildError::RecipeFailed {
                    description,
                    code: status.code().unwrap_or(1),
                })
            };
        }

        if let Some(err) = cancel.get() {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(BuildError::Other(err.to_string()));
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Mirrors the original's preference for a short, relative display path
/// over the absolute one: a script up to one directory above `cwd` (e.g.
/// `../siblings/build.gm`) still displays relative, and only a script two or
/// more directories up falls back to the absolute path. `canonicalize` and
/// `current_dir` are blocking syscalls, run on the blocking pool like every
/// other synchronous filesystem call in this crate (see `ledger::touch`).
async fn display_script_path(script_path: &Path) -> Result<PathBuf> {
    let script_path = script_path.to_path_buf();
    let path = spawn_blocking(move || {
        let abs = std::fs::canonicalize(&script_path).unwrap_or_else(|_| script_path.clone());
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let relative = relative_path(&cwd, &abs);

        let two_or_more_parents = {
            let mut components = relative.components();
            matches!(components.next(), Some(Component::ParentDir))
                && matches!(components.next(), Some(Component::ParentDir))
        };
        let candidate = if two_or_more_parents { abs } else { relative };

        let bare_filename = candidate.parent().is_none_or(|p| p.as_os_str().is_empty());
        if bare_filename {
            Path::new(".").join(candidate)
        } else {
            candidate
        }
    })
    .await?;
    Ok(path)
}

/// `target` relative to `base`, both assumed absolute: the shared-prefix
/// component count is stripped, then one `..` per remaining `base`
/// component is prepended ahead of `target`'s own remaining components.
fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base: Vec<_> = base.components().collect();
    let target: Vec<_> = target.components().collect();

    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in &base[common..] {
        result.push(Component::ParentDir);
    }
    for component in &target[common..] {
        result.push(component);
    }
    result
}
