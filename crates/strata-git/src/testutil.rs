//! Shared helpers for unit tests: throwaway real repositories.
//!
//! Every test gets its own `git init` repository inside a temp directory;
//! nothing touches the developer's checkout.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use crate::oid::Oid;

pub(crate) struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub(crate) fn workdir(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn git_dir(&self) -> PathBuf {
        self.dir.path().join(".git")
    }

    /// Run git in the workdir, asserting success, and return stdout.
    pub(crate) fn git(&self, args: &[&str]) -> String {
        let out = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .output()
            .expect("failed to spawn git");
        assert!(
            out.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).trim().to_owned()
    }

    pub(crate) fn head_oid(&self) -> Oid {
        Oid::new(&self.git(&["rev-parse", "HEAD"])).expect("HEAD is an OID")
    }

    pub(crate) fn tree_oid(&self, rev: &str) -> Oid {
        Oid::new(&self.git(&["rev-parse", &format!("{rev}^{{tree}}")])).expect("tree OID")
    }

    pub(crate) fn write_file(&self, name: &str, contents: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(path, contents).expect("write file");
    }
}

/// Fresh repository on branch `main` with one commit (`base.txt`).
pub(crate) fn setup_repo() -> TestRepo {
    let dir = TempDir::new().expect("failed to create temp dir");
    let repo = TestRepo { dir };
    repo.git(&["init", "-q"]);
    repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
    repo.git(&["config", "user.name", "Test"]);
    repo.git(&["config", "user.email", "test@example.com"]);
    repo.git(&["config", "commit.gpgsign", "false"]);
    repo.write_file("base.txt", "base\n");
    repo.git(&["add", "base.txt"]);
    repo.git(&["commit", "-q", "-m", "initial"]);
    repo
}

/// Commit a single file change and return the new HEAD OID.
pub(crate) fn add_commit(repo: &TestRepo, file: &str, contents: &str, msg: &str) -> Oid {
    repo.write_file(file, contents);
    repo.git(&["add", file]);
    repo.git(&["commit", "-q", "-m", msg]);
    repo.head_oid()
}
