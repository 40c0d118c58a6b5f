//! The pooled `cat-file --batch` helper.
//!
//! Spawning one subprocess per object read would dominate runtime on large
//! stacks, so a single long-lived `git cat-file --batch` child serves all
//! object reads for a repository. The protocol is line-oriented on stdin
//! (one OID per line) and size-framed on stdout:
//!
//! ```text
//! <sha1> <type> <size>\n
//! <size bytes of payload>\n
//! ```
//!
//! or `<sha1> missing\n` for unknown objects. The payload is read with
//! exactly-`size` framing; trusting line boundaries inside payloads would
//! corrupt binary blobs.

use std::cell::RefCell;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use tracing::debug;

use crate::error::Error;
use crate::object::ObjectKind;
use crate::oid::Oid;

pub(crate) struct CatFileProcess {
    git_dir: PathBuf,
    proc: RefCell<Option<Running>>,
}

struct Running {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl CatFileProcess {
    pub(crate) fn new(git_dir: &Path) -> Self {
        Self {
            git_dir: git_dir.to_owned(),
            proc: RefCell::new(None),
        }
    }

    fn spawn(&self) -> Result<Running, Error> {
        debug!(git_dir = %self.git_dir.display(), "spawning cat-file --batch helper");
        let mut child = Command::new("git")
            .args(["cat-file", "--batch"])
            .env("GIT_DIR", &self.git_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdin = child.stdin.take().ok_or_else(broken_pipe)?;
        let stdout = BufReader::new(child.stdout.take().ok_or_else(broken_pipe)?);
        Ok(Running {
            child,
            stdin,
            stdout,
        })
    }

    /// Read one object: its type and full payload.
    ///
    /// # Errors
    /// [`Error::NotFound`] for missing objects, [`Error::Run`] for protocol
    /// violations, [`Error::Io`] for pipe failures.
    pub(crate) fn cat_file(&self, oid: &Oid) -> Result<(ObjectKind, Vec<u8>), Error> {
        let mut slot = self.proc.borrow_mut();
        if slot.is_none() {
            *slot = Some(self.spawn()?);
        }
        let running = slot.as_mut().ok_or_else(broken_pipe)?;

        writeln!(running.stdin, "{oid}")?;
        running.stdin.flush()?;

        let mut header = String::new();
        running.stdout.read_line(&mut header)?;
        let header = header.trim_end_matches('\n');
        if header == format!("{oid} missing") {
            return Err(Error::NotFound {
                message: format!("no such object {oid}"),
            });
        }
        let mut fields = header.split(' ');
        let (Some(name), Some(kind), Some(size), None) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            return Err(protocol_error(header));
        };
        if name != oid.as_str() {
            return Err(protocol_error(header));
        }
        let kind = ObjectKind::from_bytes(kind.as_bytes())?;
        let size: usize = size.parse().map_err(|_| protocol_error(header))?;

        // Exactly `size` payload bytes, then the framing newline.
        let mut payload = vec![0u8; size];
        running.stdout.read_exact(&mut payload)?;
        let mut newline = [0u8; 1];
        running.stdout.read_exact(&mut newline)?;
        if newline != [b'\n'] {
            return Err(protocol_error("missing framing newline"));
        }
        Ok((kind, payload))
    }

    /// Close stdin (the helper exits on EOF) and reap the child.
    pub(crate) fn shutdown(&self) {
        if let Some(mut running) = self.proc.borrow_mut().take() {
            debug!("shutting down cat-file helper");
            drop(running.stdin);
            if running.child.wait().is_err() {
                let _ = running.child.kill();
            }
        }
    }
}

impl Drop for CatFileProcess {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn broken_pipe() -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "cat-file helper lost its stdio pipes",
    ))
}

fn protocol_error(detail: impl std::fmt::Display) -> Error {
    Error::Run {
        command: "git cat-file --batch".to_owned(),
        stderr: format!("unexpected reply: {detail}"),
        exit_code: None,
    }
}
