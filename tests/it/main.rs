use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::TempDir;

mod engine;
mod recursive;

/// `GM_REMAKE` and friends are process-global; serialize the handful of
/// tests that touch them so they don't race with each other.
static ENV_LOCK: Mutex<()> = Mutex::new(());

struct Project {
    _dir: TempDir,
    root: PathBuf,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let root = dir.path().to_path_buf();
        Project { _dir: dir, root }
    }

    fn write_script(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, content).expect("write script");
        path
    }

    fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.root.join(relative)).expect("read artifact")
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    fn write(&self, relative: &str, content: &str) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}

fn info_path(target: &Path) -> PathBuf {
    let dir = target.parent().unwrap();
    let name = target.file_name().unwrap().to_string_lossy();
    dir.join(format!(".{name}.gm"))
}
