//! One-shot `git` subprocess invocations.
//!
//! Long-lived helper processes (`cat-file --batch`, `diff-tree --stdin`)
//! live in [`crate::catfile`] and [`crate::difftree`]; everything else goes
//! through [`GitRun`], which owns the env/cwd/stdin plumbing and turns
//! non-zero exits into [`Error::Run`] with trimmed stderr.

use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::trace;

use crate::error::Error;

/// Builder for a single `git` invocation.
pub(crate) struct GitRun {
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    cwd: Option<PathBuf>,
    stdin: Option<Vec<u8>>,
}

impl GitRun {
    pub(crate) fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Self {
            args: args.into_iter().map(|a| a.as_ref().to_owned()).collect(),
            envs: Vec::new(),
            cwd: None,
            stdin: None,
        }
    }

    pub(crate) fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub(crate) fn env(mut self, key: impl AsRef<OsStr>, val: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_owned(), val.as_ref().to_owned()));
        self
    }

    pub(crate) fn envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.envs.extend(
            envs.into_iter()
                .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned())),
        );
        self
    }

    pub(crate) fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    /// Feed the given bytes to the child's stdin.
    pub(crate) fn stdin_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    /// Human-readable command line for error messages.
    fn display(&self) -> String {
        let mut s = String::from("git");
        for arg in &self.args {
            s.push(' ');
            s.push_str(&arg.to_string_lossy());
        }
        s
    }

    /// Spawn, feed stdin if any, and collect the child's output.
    ///
    /// Does not inspect the exit status; use [`Self::output`] or
    /// [`Self::ok`] for commands where non-zero means failure.
    pub(crate) fn status(self) -> Result<(String, Output), Error> {
        let cmd_display = self.display();
        trace!(command = %cmd_display, "running git");
        let mut command = Command::new("git");
        command
            .args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (k, v) in &self.envs {
            command.env(k, v);
        }
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        let mut child = command.spawn()?;
        if let Some(bytes) = self.stdin {
            // The commands fed through stdin (hash-object, mktree, apply,
            // commit-tree) consume all input before producing output, so a
            // sequential write cannot deadlock against a full stdout pipe.
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&bytes)?;
            }
        }
        let output = child.wait_with_output()?;
        Ok((cmd_display, output))
    }

    /// Run and return raw stdout, failing with [`Error::Run`] on non-zero
    /// exit.
    pub(crate) fn output(self) -> Result<Vec<u8>, Error> {
        let (display, output) = self.status()?;
        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(run_error(display, &output))
        }
    }

    /// Run for effect, discarding stdout.
    pub(crate) fn ok(self) -> Result<(), Error> {
        self.output().map(|_| ())
    }

    /// Run and return stdout as exactly one line, without the terminator.
    ///
    /// Replies from `hash-object`, `mktree`, `commit-tree`, `write-tree`
    /// and `rev-parse` are contractually a single line; anything else is
    /// treated as a protocol violation rather than silently truncated.
    pub(crate) fn one_line(self) -> Result<String, Error> {
        let display = self.display();
        let stdout = self.output()?;
        let text = std::str::from_utf8(&stdout).map_err(|_| Error::Run {
            command: display.clone(),
            stderr: "stdout is not UTF-8".to_owned(),
            exit_code: None,
        })?;
        let mut lines = text.lines();
        match (lines.next(), lines.next()) {
            (Some(line), None) => Ok(line.to_owned()),
            _ => Err(Error::Run {
                command: display,
                stderr: format!("expected exactly one line of output, got {text:?}"),
                exit_code: None,
            }),
        }
    }

    /// Run and split stdout on newlines, dropping a trailing empty line.
    pub(crate) fn lines(self) -> Result<Vec<String>, Error> {
        let stdout = self.output()?;
        Ok(String::from_utf8_lossy(&stdout)
            .lines()
            .map(ToOwned::to_owned)
            .collect())
    }

    /// Run and split stdout on NUL terminators, dropping the trailing
    /// empty record.
    pub(crate) fn lines_nulterm(self) -> Result<Vec<Vec<u8>>, Error> {
        let stdout = self.output()?;
        let mut records: Vec<Vec<u8>> = stdout.split(|&b| b == 0).map(<[u8]>::to_vec).collect();
        if records.last().is_some_and(Vec::is_empty) {
            records.pop();
        }
        Ok(records)
    }
}

/// Build an [`Error::Run`] from a completed process.
pub(crate) fn run_error(command: String, output: &Output) -> Error {
    Error::Run {
        command,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        exit_code: output.status.code(),
    }
}
