//! Pooled `diff-tree --stdin` helpers.
//!
//! One long-lived `git diff-tree --stdin <args…>` child per distinct
//! argument vector. Queries are `<sha1a> SP <sha1b>\n` lines; git echoes
//! the query, emits the diff, and — because the sentinel line that follows
//! is not an object pair — echoes the sentinel verbatim, which marks the
//! end of the record. `EOF\n` is not a 40-digit hex line, so git can never
//! produce it as part of a diff header; a path containing the text is
//! still safe because the scan only accepts the sentinel right after a
//! record terminator (`\n` or `\0`).

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use tracing::debug;

use crate::error::Error;
use crate::oid::Oid;

const SENTINEL: &[u8] = b"EOF\n";

pub(crate) struct DiffTreeProcesses {
    git_dir: PathBuf,
    procs: RefCell<HashMap<Vec<OsString>, Running>>,
}

struct Running {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl DiffTreeProcesses {
    pub(crate) fn new(git_dir: &Path) -> Self {
        Self {
            git_dir: git_dir.to_owned(),
            procs: RefCell::new(HashMap::new()),
        }
    }

    fn spawn(&self, args: &[OsString]) -> Result<Running, Error> {
        debug!(?args, "spawning diff-tree --stdin helper");
        let mut child = Command::new("git")
            .args(["diff-tree", "--stdin"])
            .args(args)
            .env("GIT_DIR", &self.git_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdin = child.stdin.take().ok_or_else(broken_pipe)?;
        let stdout = child.stdout.take().ok_or_else(broken_pipe)?;
        Ok(Running {
            child,
            stdin,
            stdout,
        })
    }

    /// Ask the helper for the given argument vector to diff two trees (or
    /// commits) and return the raw diff bytes.
    ///
    /// # Errors
    /// [`Error::Io`] on pipe failures, [`Error::Run`] on protocol
    /// violations.
    pub(crate) fn diff_trees<S: AsRef<OsStr>>(
        &self,
        args: &[S],
        a: &Oid,
        b: &Oid,
    ) -> Result<Vec<u8>, Error> {
        let key: Vec<OsString> = args.iter().map(|a| a.as_ref().to_owned()).collect();
        let mut procs = self.procs.borrow_mut();
        if !procs.contains_key(&key) {
            let running = self.spawn(&key)?;
            procs.insert(key.clone(), running);
        }
        let running = procs.get_mut(&key).ok_or_else(broken_pipe)?;

        let query = format!("{a} {b}\n").into_bytes();
        running.stdin.write_all(&query)?;
        running.stdin.write_all(SENTINEL)?;
        running.stdin.flush()?;

        let mut data = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            if ends_with_sentinel(&data) {
                break;
            }
            let n = running.stdout.read(&mut chunk)?;
            if n == 0 {
                return Err(protocol_error("helper closed its output mid-record"));
            }
            data.extend_from_slice(&chunk[..n]);
        }
        if !data.starts_with(&query) {
            return Err(protocol_error("reply does not echo the query"));
        }
        data.truncate(data.len() - SENTINEL.len());
        Ok(data.split_off(query.len()))
    }

    /// Close every helper's stdin and reap the children.
    pub(crate) fn shutdown(&self) {
        for (args, mut running) in self.procs.borrow_mut().drain() {
            debug!(?args, "shutting down diff-tree helper");
            drop(running.stdin);
            if running.child.wait().is_err() {
                let _ = running.child.kill();
            }
        }
    }
}

impl Drop for DiffTreeProcesses {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A record ends at `\nEOF\n` or `\0EOF\n` — the echoed sentinel directly
/// after a newline- or NUL-terminated record.
fn ends_with_sentinel(data: &[u8]) -> bool {
    if data.len() < SENTINEL.len() + 1 || !data.ends_with(SENTINEL) {
        return false;
    }
    matches!(data[data.len() - SENTINEL.len() - 1], b'\n' | b'\0')
}

fn broken_pipe() -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "diff-tree helper lost its stdio pipes",
    ))
}

fn protocol_error(detail: impl std::fmt::Display) -> Error {
    Error::Run {
        command: "git diff-tree --stdin".to_owned(),
        stderr: format!("unexpected reply: {detail}"),
        exit_code: None,
    }
}
