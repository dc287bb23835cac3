use pretty_assertions::assert_eq;

use crate::Project;

async fn build(project: &Project, script: &std::path::Path, targets: &[&str]) -> i32 {
    let targets = targets.iter().map(|t| t.to_string()).collect();
    goodmake::driver::run(project.root.clone(), script.to_path_buf(), targets)
        .await
        .exit_code
}

/// Scenario C: a recipe that recursively invokes the compiled `goodmake`
/// binary on its own dependency rebuilds when that dependency's content
/// changes, and stays fresh when it doesn't. `dep` is a plain source file
/// with no recipe of its own, so an external edit to it is a permanent
/// change rather than one a rebuilt recipe would immediately undo.
#[tokio::test]
async fn dependency_change_propagates_through_a_recursive_invocation() {
    let project = Project::new();
    let bin = env!("CARGO_BIN_EXE_goodmake");
    let script = project.write_script(
        "build.gm",
        &format!(
            "#!/usr/bin/env goodmake\n?app\n  {bin} ignored $0 dep\n  cat dep > app\n  echo run >> runs.log\n"
        ),
    );
    project.write("dep", "v1\n");

    assert_eq!(build(&project, &script, &["app"]).await, 0);
    assert_eq!(project.read("app"), "v1\n");
    assert_eq!(project.read("runs.log"), "run\n");

    assert_eq!(build(&project, &script, &["app"]).await, 0);
    assert_eq!(
        project.read("runs.log"),
        "run\n",
        "app should stay fresh when dep hasn't changed"
    );

    project.write("dep", "v2\n");
    assert_eq!(build(&project, &script, &["app"]).await, 0);
    assert_eq!(project.read("app"), "v2\n");
    assert_eq!(
        project.read("runs.log"),
        "run\nrun\n",
        "app should rebuild once dep's content changes"
    );
}

/// Scenario F: two sibling targets both recursively depend on the same
/// target. Building them together runs the shared dependency's recipe
/// exactly once: the second recursive invocation either waits out the
/// first's lock and then finds a ledger entry fresh enough to skip, or
/// never contends at all because the first already finished.
#[tokio::test]
async fn concurrent_siblings_share_one_dependency_execution() {
    let project = Project::new();
    let bin = env!("CARGO_BIN_EXE_goodmake");
    let script = project.write_script(
        "build.gm",
        &format!(
            "#!/usr/bin/env goodmake\n\
             ?shared\n  echo built >> shared.log\n  echo content > shared\n\
             ?left\n  {bin} ignored $0 shared\n  cat shared > left\n\
             ?right\n  {bin} ignored $0 shared\n  cat shared > right\n"
        ),
    );

    let code = build(&project, &script, &["left", "right"]).await;
    assert_eq!(code, 0);
    assert_eq!(project.read("left"), "content\n");
    assert_eq!(project.read("right"), "content\n");
    assert_eq!(
        project.read("shared.log"),
        "built\n",
        "shared's recipe should have run exactly once"
    );
}
