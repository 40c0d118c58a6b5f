//! Shared test helpers for strata integration tests.
//!
//! All tests use temp directories — no side effects on the developer's
//! checkout. Each test gets its own real repository via [`setup_repo`].

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use strata_git::{Commit, CommitData, Oid, Repository, Signature};
use tempfile::TempDir;

/// Initialize tracing output for a test run when `STRATA_TEST_LOG` is
/// set (e.g. `STRATA_TEST_LOG=debug`).
pub fn init_tracing() {
    if std::env::var_os("STRATA_TEST_LOG").is_some() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_env("STRATA_TEST_LOG")
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }
}

pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn workdir(&self) -> &Path {
        self.dir.path()
    }

    pub fn git_dir(&self) -> PathBuf {
        self.dir.path().join(".git")
    }

    pub fn open(&self) -> Repository {
        Repository::open(self.git_dir()).expect("open repository")
    }

    /// Run git in the workdir, asserting success, and return stdout.
    pub fn git(&self, args: &[&str]) -> String {
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

    pub fn head_oid(&self) -> Oid {
        Oid::new(&self.git(&["rev-parse", "HEAD"])).expect("HEAD is an OID")
    }

    pub fn write_file(&self, name: &str, contents: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(path, contents).expect("write file");
    }

    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("read file")
    }
}

/// Fresh repository on branch `main` with one commit (`base.txt`).
pub fn setup_repo() -> TestRepo {
    init_tracing();
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

/// A fixed identity so test commits are deterministic.
pub fn test_signature() -> Signature {
    Signature::parse(b"Test <test@example.com> 1700000000 +0000").expect("valid signature")
}

/// Build a patch commit on `parent` that writes one top-level file.
pub fn make_patch_commit(
    repo: &Repository,
    parent: &Commit,
    file: &str,
    contents: &str,
    msg: &str,
) -> Commit {
    let parent_tree = parent.tree(repo).expect("parent tree");
    let parent_data = parent_tree.data(repo).expect("parent tree data");
    let blob = repo.write_blob(contents.as_bytes().to_vec()).expect("blob");

    let mut entries: Vec<strata_git::TreeEntry> = parent_data
        .entries()
        .iter()
        .filter(|e| e.name != file.as_bytes())
        .cloned()
        .collect();
    entries.push(strata_git::TreeEntry {
        mode: strata_git::FileMode::Regular,
        kind: strata_git::ObjectKind::Blob,
        oid: blob.oid().clone(),
        name: file.into(),
    });
    let tree = strata_git::TreeData::new(entries)
        .write(repo)
        .expect("write tree");

    CommitData::new(tree, vec![parent.clone()], format!("{msg}\n"))
        .set_author(Some(test_signature()))
        .set_committer(Some(test_signature()))
        .write(repo)
        .expect("write commit")
}

/// Build a patch commit whose tree is exactly the parent's (an empty
/// patch).
pub fn make_empty_patch_commit(repo: &Repository, parent: &Commit, msg: &str) -> Commit {
    let tree = parent.tree(repo).expect("parent tree");
    CommitData::new(tree, vec![parent.clone()], format!("{msg}\n"))
        .set_author(Some(test_signature()))
        .set_committer(Some(test_signature()))
        .write(repo)
        .expect("write commit")
}
