//! The recursive build engine: for one target, decide whether it's up to
//! date and, if not, run its recipe.
//!
//! `build` recurses into itself to recheck previously recorded
//! dependencies, so it's expressed as a boxed future — `async fn` cannot
//! recurse unboxed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::task::spawn_blocking;
use tracing::{info, instrument, warn};

use crate::cancel::CancelSlot;
use crate::env;
use crate::error::{BuildError, Result};
use crate::event::BuildEvent;
use crate::fingerprint::{hash_file, hash_string, is_nonsum};
use crate::ledger::Info;
use crate::recipe::{self, Recipe};
use crate::runner;
use crate::script::{self, Script};
use crate::timestamp::BuildTimestamp;

/// "Checked this build" window: rechecks of the same target within this
/// many milliseconds of a prior check are skipped outright.
const STAMP_ACCURACY_MS: i64 = 10;

pub struct Engine {
    pub start_timestamp: BuildTimestamp,
    scripts: Mutex<HashMap<PathBuf, Arc<Script>>>,
    cancel: CancelSlot,
    remake: bool,
    lock_wait_secs: u64,
}

impl Engine {
    pub fn new(start_timestamp: BuildTimestamp, cancel: CancelSlot) -> Self {
        Self {
            start_timestamp,
            scripts: Mutex::new(HashMap::new()),
            cancel,
            remake: env::remake(),
            lock_wait_secs: env::lock_wait_secs(),
        }
    }

    pub fn cancel(&self) -> &CancelSlot {
        &self.cancel
    }

    /// Build `target`, relative to `script`, invoked from `dir`. Returns the
    /// BuildEvent describing the target's resulting state.
    pub fn build(
        self: Arc<Self>,
        dir: PathBuf,
        script: PathBuf,
        target: String,
    ) -> BoxFuture<'static, Result<BuildEvent>> {
        Box::pin(async move { self.build_inner(dir, script, target).await })
    }

    #[instrument(skip(self), fields(%target))]
    async fn build_inner(
        self: Arc<Self>,
        dir: PathBuf,
        script_rel: PathBuf,
        target: String,
    ) -> Result<BuildEvent> {
        if let Some(err) = self.cancel.get() {
            return Err(BuildError::Other(err.to_string()));
        }

        let resolved_script = resolve(&dir, &script_rel);
        let script_obj = self.get_script(&resolved_script).await?;
        let recipe = recipe::match_target(&script_obj, &target)?;

        let stanza_hash = stanza_hash(&recipe);
        let mut current = BuildEvent {
            directory: dir.clone(),
            script: script_rel.clone(),
            target: target.clone(),
            stanza_hash,
            timestamp: None,
            result_hash: String::new(),
        };

        let resolved_target = current.resolved_target();

        if current.stanza_hash == "missing" && resolved_target.exists() {
            info!(target = %target, "dependency: treating existing file as a source");
            current.result_hash = hash_file(&resolved_target).await?;
            return Ok(current);
        }

        current.timestamp = Some(self.start_timestamp.clone());

        let info_ctx = Info::enter(&current, recipe.ignore, &self.cancel, self.lock_wait_secs).await?;

        let check = self.check_up_to_date(&mut current, &info_ctx, &recipe).await;
        let (fresh, reason) = match check {
            Ok(result) => result,
            Err(err) => {
                info_ctx.finish_err().await?;
                return Err(err);
            }
        };

        if fresh {
            if let Some(last) = &info_ctx.last {
                info!(%target, reason, "skip");
                info_ctx.finish_skip().await?;
                return Ok(last.clone());
            }
        }

        if recipe.always {
            info!(%target, reason, "make");
        } else {
            warn!(%target, reason, "make");
        }

        if let Err(err) = info_ctx.open_for_write().await {
            info_ctx.finish_err().await?;
            return Err(err);
        }

        let canonical_info_file = tokio::fs::canonicalize(&info_ctx.filename)
            .await
            .unwrap_or_else(|_| info_ctx.filename.clone());
        let extra_env = vec![
            (
                env::GM_STARTTIME.to_string(),
                self.start_timestamp.as_str().to_string(),
            ),
            (
                env::GM_FILE.to_string(),
                canonical_info_file.to_string_lossy().into_owned(),
            ),
        ];

        let run_result = runner::run(
            &recipe,
            &dir,
            &resolved_script,
            &target,
            &extra_env,
            &self.cancel,
        )
        .await;

        if let Err(err) = run_result {
            info_ctx.finish_err().await?;
            return Err(err);
        }

        current.timestamp = Some(self.start_timestamp.clone());
        current.result_hash = if recipe.ignore {
            "ignore".to_string()
        } else {
            hash_file(&resolved_target).await?
        };

        if let Err(err) = info_ctx.finish_ok(&current).await {
            return Err(err);
        }

        Ok(current)
    }

    /// The up-to-date predicate from the component design: evaluated in
    /// order, first failure wins. Takes `&Arc<Self>` (not `&self`) because
    /// rule (f) recurses into `Engine::build`, which needs to hand out a new
    /// `Arc` clone for its own potential further recursion.
    async fn check_up_to_date(
        self: &Arc<Self>,
        current: &mut BuildEvent,
        info_ctx: &Info,
        recipe: &Recipe,
    ) -> Result<(bool, String)> {
        let Some(last) = info_ctx.last.clone() else {
            return Ok((false, "it hasn't completed".to_string()));
        };

        if let Some(info_mtime) = info_ctx.timestamp {
            if self.start_timestamp.millis_since_system_time(info_mtime) <= STAMP_ACCURACY_MS {
                return Ok((true, "it was checked this build".to_string()));
            }
        }

        if recipe.always {
            return Ok((false, "it's a shebang recipe".to_string()));
        }

        if current.stanza_hash != last.stanza_hash || current.directory != last.directory {
            return Ok((false, "its recipe changed".to_string()));
        }

        if !recipe.ignore {
            let resolved_target = current.resolved_target();
            current.result_hash = hash_file(&resolved_target).await?;
            if current.result_hash != last.result_hash {
                return Ok((false, format!("it changed to {}", current.result_hash)));
            }
        }

        for dep in &info_ctx.deps {
            let updated = match Arc::clone(self)
                .build(dep.directory.clone(), dep.script.clone(), dep.target.clone())
                .await
            {
                Ok(updated) => updated,
                Err(err) => {
                    return Ok((
                        false,
                        format!("{} raised error \"{}\"", dep.target, err),
                    ));
                }
            };

            if updated.result_hash != dep.result_hash {
                return Ok((false, format!("{} changed to {}", dep.target, updated.result_hash)));
            }

            if is_nonsum(&updated.result_hash) && updated.timestamp != dep.timestamp {
                let ts = updated
                    .timestamp
                    .as_ref()
                    .map(|t| t.as_str().to_string())
                    .unwrap_or_default();
                return Ok((false, format!("{} was updated {}", dep.target, ts)));
            }
        }

        if self.remake {
            return Ok((false, format!("{} environment variable is set", env::GM_REMAKE)));
        }

        info_ctx.checked().await?;
        Ok((true, "dependencies unchanged".to_string()))
    }

    async fn get_script(&self, absolute_path: &Path) -> Result<Arc<Script>> {
        let key = script::canonical_script_path(absolute_path);

        if let Some(found) = self.scripts.lock().expect("script cache poisoned").get(&key) {
            return Ok(found.clone());
        }

        let path = key.clone();
        let loaded = spawn_blocking(move || Script::load(&path)).await??;
        let loaded = Arc::new(loaded);

        let mut cache = self.scripts.lock().expect("script cache poisoned");
        let entry = cache.entry(key).or_insert_with(|| loaded.clone());
        Ok(entry.clone())
    }
}

fn stanza_hash(recipe: &Recipe) -> String {
    match &recipe.stanza {
        None => "missing".to_string(),
        Some(text) if text.is_empty() => "empty".to_string(),
        Some(text) => hash_string(text),
    }
}

fn resolve(dir: &Path, script: &Path) -> PathBuf {
    if script.is_absolute() {
        script.to_path_buf()
    } else {
        dir.join(script)
    }
}
