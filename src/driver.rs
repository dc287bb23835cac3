//! Top-level dispatch: build every requested target across a bounded
//! worker pool, report dependency results to a parent invocation, and
//! determine the process exit code.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, instrument};

use crate::cancel::CancelSlot;
use crate::engine::Engine;
use crate::env;
use crate::error::BuildError;
use crate::ledger::Info;

/// Outcome of driving one invocation's set of targets.
pub struct DriverResult {
    pub exit_code: i32,
}

/// Build `targets` using `script`, as if invoked from `cwd`. Kept as an
/// explicit parameter (rather than reading `std::env::current_dir()`
/// internally) so the driver has no hidden process-global dependency beyond
/// the `GM_*` environment variables it documents.
#[instrument(skip(targets))]
pub async fn run(cwd: PathBuf, script: PathBuf, targets: Vec<String>) -> DriverResult {
    let start_timestamp = match env::start_time() {
        Ok(ts) => ts,
        Err(err) => {
            error!(%err, "invalid GM_STARTTIME");
            return DriverResult { exit_code: 1 };
        }
    };

    let cancel = CancelSlot::new();
    let engine = Arc::new(Engine::new(start_timestamp, cancel.clone()));
    let parent_file = env::parent_file();

    let pool_size = env::threads().min(targets.len().max(1)).max(1);
    let semaphore = Arc::new(Semaphore::new(pool_size));

    let mut tasks = JoinSet::new();
    for target in targets {
        let engine = Arc::clone(&engine);
        let cwd = cwd.clone();
        let script = script.clone();
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let parent_file = parent_file.clone();

        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");

            if let Some(err) = cancel.get() {
                return Err(err);
            }

            let result = match engine.build(cwd, script, target.clone()).await {
                Ok(event) => match &parent_file {
                    Some(parent_file) => {
                        Info::append(parent_file, &event).await.inspect_err(|err| {
                            error!(%target, %err, "failed to report dependency to parent");
                        })
                    }
                    None => Ok(()),
                },
                Err(err) => Err(err),
            };

            result.map_err(|err| cancel.set(Arc::new(err)))
        });
    }

    // Drain every task. A target's own failure is already recorded in
    // `cancel` by the task itself; only a genuine panic (a `JoinError`,
    // never produced by a normal `Err` return) needs recording here.
    while let Some(joined) = tasks.join_next().await {
        if let Err(join_err) = joined {
            error!(%join_err, "build task panicked");
            cancel.set(Arc::new(BuildError::Join(join_err)));
        }
    }

    match cancel.get() {
        Some(err) => {
            error!(%err, "build failed");
            DriverResult {
                exit_code: err.exit_code(),
            }
        }
        None => DriverResult { exit_code: 0 },
    }
}
