use pretty_assertions::assert_eq;

use crate::{ENV_LOCK, Project, info_path};

async fn build(project: &Project, script: &std::path::Path, targets: &[&str]) -> i32 {
    let targets = targets.iter().map(|t| t.to_string()).collect();
    goodmake::driver::run(project.root.clone(), script.to_path_buf(), targets)
        .await
        .exit_code
}

/// Scenario A: fresh build creates the artifact and ledger; a second build
/// with no filesystem changes skips the recipe.
#[tokio::test]
async fn fresh_build_then_skip() {
    let project = Project::new();
    let script = project.write_script(
        "build.gm",
        "#!/usr/bin/env goodmake\n?out\n  echo hi > out\n  echo run >> runs.log\n",
    );

    let code = build(&project, &script, &["out"]).await;
    assert_eq!(code, 0);
    assert_eq!(project.read("out"), "hi\n");
    assert_eq!(project.read("runs.log"), "run\n");

    let code = build(&project, &script, &["out"]).await;
    assert_eq!(code, 0);
    assert_eq!(
        project.read("runs.log"),
        "run\n",
        "recipe should not have re-run"
    );
}

/// Scenario B: an externally modified artifact is rebuilt on the next pass.
#[tokio::test]
async fn external_mutation_triggers_rebuild() {
    let project = Project::new();
    let script = project.write_script(
        "build.gm",
        "#!/usr/bin/env goodmake\n?out\n  echo hi > out\n",
    );

    assert_eq!(build(&project, &script, &["out"]).await, 0);
    assert_eq!(project.read("out"), "hi\n");

    project.write("out", "bye\n");
    assert_eq!(build(&project, &script, &["out"]).await, 0);
    assert_eq!(project.read("out"), "hi\n", "recipe should have re-run");
}

/// Scenario D: a virtual (`!`-prefixed) target records the `ignore`
/// sentinel as its result-hash rather than a content hash.
#[tokio::test]
async fn virtual_target_records_ignore_sentinel() {
    let project = Project::new();
    let script = project.write_script("build.gm", "#!/usr/bin/env goodmake\n?!clean\n  true\n");

    assert_eq!(build(&project, &script, &["clean"]).await, 0);

    let info = info_path(&project.path("clean"));
    let info_dir = std::fs::read_dir(info.parent().unwrap()).unwrap();
    let ledger_file = info_dir
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(".clean_") && n.ends_with(".gm"))
                .unwrap_or(false)
        })
        .expect("virtual target ledger file should exist");

    let content = std::fs::read_to_string(&ledger_file).unwrap();
    let last_line = content.lines().last().unwrap();
    let event: goodmake::event::BuildEvent = last_line.parse().unwrap();
    assert_eq!(event.result_hash, "ignore");
}

/// Scenario E: `GM_REMAKE=1` forces a rebuild even with nothing changed.
#[tokio::test]
async fn gm_remake_forces_rebuild() {
    let _guard = ENV_LOCK.lock().unwrap();
    let project = Project::new();
    let script = project.write_script(
        "build.gm",
        "#!/usr/bin/env goodmake\n?out\n  echo hi >> runs.log\n  echo hi > out\n",
    );

    assert_eq!(build(&project, &script, &["out"]).await, 0);
    assert_eq!(project.read("runs.log"), "hi\n");

    unsafe {
        std::env::set_var("GM_REMAKE", "1");
    }
    let result = build(&project, &script, &["out"]).await;
    unsafe {
        std::env::remove_var("GM_REMAKE");
    }

    assert_eq!(result, 0);
    assert_eq!(
        project.read("runs.log"),
        "hi\nhi\n",
        "recipe should have re-run under GM_REMAKE"
    );
}

/// A recipe whose pattern never matches, and whose target doesn't exist on
/// disk either, is a fatal missing-recipe error.
#[tokio::test]
async fn missing_recipe_is_fatal() {
    let project = Project::new();
    let script = project.write_script("build.gm", "#!/usr/bin/env goodmake\n?only-this\n  true\n");
    let code = build(&project, &script, &["something-else"]).await;
    assert_ne!(code, 0);
}

/// A nonzero recipe exit leaves no ledger file behind for that target.
#[tokio::test]
async fn failing_recipe_leaves_no_ledger() {
    let project = Project::new();
    let script = project.write_script("build.gm", "#!/usr/bin/env goodmake\n?out\n  exit 3\n");
    let code = build(&project, &script, &["out"]).await;
    assert_eq!(code, 3);
    assert!(!info_path(&project.path("out")).exists());
}

/// Generic `*` fallback alone supplies no recipe; combined with a specific
/// pattern its stanza text is concatenated ahead of the specific one.
#[tokio::test]
async fn generic_fallback_alone_is_missing_recipe() {
    let project = Project::new();
    let script = project.write_script("build.gm", "#!/usr/bin/env goodmake\n?*\n  echo hi > $0\n");
    let code = build(&project, &script, &["nonexistent-target"]).await;
    assert_ne!(code, 0, "bare * should not supply a recipe");
}
