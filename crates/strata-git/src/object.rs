//! Typed handles for git objects.
//!
//! One live handle per object per repository: [`crate::Repository`] interns
//! handles by OID, so handle equality is object equality and payloads are
//! loaded at most once. Payloads load lazily through the repository's
//! `cat-file --batch` helper on first access.
//!
//! Git objects are immutable. "Modifying" a commit means building a new
//! [`CommitData`] and writing it, which yields a fresh handle; the old one
//! is untouched.

use std::cell::RefCell;
use std::rc::Rc;

use bstr::{BString, ByteSlice};

use crate::error::Error;
use crate::oid::Oid;
use crate::repo::Repository;
use crate::signature::Signature;

// ---------------------------------------------------------------------------
// Kinds and modes
// ---------------------------------------------------------------------------

/// The three object types the stack core works with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    /// # Errors
    /// Returns [`Error::NotFound`] for types the core does not model
    /// (tags).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        match bytes {
            b"blob" => Ok(Self::Blob),
            b"tree" => Ok(Self::Tree),
            b"commit" => Ok(Self::Commit),
            other => Err(Error::NotFound {
                message: format!(
                    "unsupported object type {:?}",
                    String::from_utf8_lossy(other)
                ),
            }),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tree entry modes, as git spells them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileMode {
    /// `100644`
    Regular,
    /// `100755`
    Executable,
    /// `120000`
    Symlink,
    /// `040000`
    Directory,
    /// `160000` — a submodule commit reference.
    Submodule,
}

impl FileMode {
    /// # Errors
    /// Returns [`Error::NotFound`] on a mode string git would not emit.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        match bytes {
            b"100644" => Ok(Self::Regular),
            b"100755" => Ok(Self::Executable),
            b"120000" => Ok(Self::Symlink),
            b"040000" | b"40000" => Ok(Self::Directory),
            b"160000" => Ok(Self::Submodule),
            other => Err(Error::NotFound {
                message: format!("unknown tree mode {:?}", String::from_utf8_lossy(other)),
            }),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "100644",
            Self::Executable => "100755",
            Self::Symlink => "120000",
            Self::Directory => "040000",
            Self::Submodule => "160000",
        }
    }

    /// The object type an entry of this mode points at.
    #[must_use]
    pub fn object_kind(self) -> ObjectKind {
        match self {
            Self::Regular | Self::Executable | Self::Symlink => ObjectKind::Blob,
            Self::Directory => ObjectKind::Tree,
            Self::Submodule => ObjectKind::Commit,
        }
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Handle to a blob object. The payload is fetched on demand via
/// [`Blob::bytes`].
#[derive(Clone)]
pub struct Blob {
    inner: Rc<BlobInner>,
}

struct BlobInner {
    oid: Oid,
}

impl Blob {
    pub(crate) fn new(oid: Oid) -> Self {
        Self {
            inner: Rc::new(BlobInner { oid }),
        }
    }

    #[must_use]
    pub fn oid(&self) -> &Oid {
        &self.inner.oid
    }

    /// Fetch the blob contents.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the object is missing.
    pub fn bytes(&self, repo: &Repository) -> Result<Vec<u8>, Error> {
        let (kind, bytes) = repo.cat_object(&self.inner.oid)?;
        expect_kind(&self.inner.oid, kind, ObjectKind::Blob)?;
        Ok(bytes)
    }

    /// Handle identity: true iff both handles came from the same intern
    /// cache slot.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.inner.oid == other.inner.oid
    }
}
impl Eq for Blob {}

impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Blob<{}>", self.inner.oid)
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Handle to a tree object with a lazily parsed entry list.
#[derive(Clone)]
pub struct Tree {
    inner: Rc<TreeInner>,
}

struct TreeInner {
    oid: Oid,
    data: RefCell<Option<Rc<TreeData>>>,
}

impl Tree {
    pub(crate) fn new(oid: Oid) -> Self {
        Self {
            inner: Rc::new(TreeInner {
                oid,
                data: RefCell::new(None),
            }),
        }
    }

    #[must_use]
    pub fn oid(&self) -> &Oid {
        &self.inner.oid
    }

    /// The parsed entry list, loaded through `ls-tree -z` on first access.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the object is missing or malformed.
    pub fn data(&self, repo: &Repository) -> Result<Rc<TreeData>, Error> {
        if let Some(data) = self.inner.data.borrow().as_ref() {
            return Ok(Rc::clone(data));
        }
        let records = repo.ls_tree(&self.inner.oid)?;
        let data = Rc::new(TreeData::parse(repo, &records)?);
        *self.inner.data.borrow_mut() = Some(Rc::clone(&data));
        Ok(data)
    }

    /// Handle identity.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.inner.oid == other.inner.oid
    }
}
impl Eq for Tree {}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tree<{}>", self.inner.oid)
    }
}

/// One `ls-tree` entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub kind: ObjectKind,
    pub oid: Oid,
    pub name: BString,
}

/// The contents of a tree: named entries in git's own order.
///
/// Names are unique; iteration order is whatever git emitted (or whatever
/// the builder inserted) and carries no meaning.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeData {
    entries: Vec<TreeEntry>,
}

impl TreeData {
    #[must_use]
    pub fn new(entries: Vec<TreeEntry>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Look up an entry by name.
    #[must_use]
    pub fn entry(&self, name: &[u8]) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Parse zero-terminated `ls-tree` records:
    /// `<mode> SP <type> SP <sha1> TAB <path>`.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] on malformed records.
    pub fn parse(repo: &Repository, records: &[Vec<u8>]) -> Result<Self, Error> {
        let bad = |record: &[u8]| Error::NotFound {
            message: format!(
                "malformed ls-tree record {:?}",
                String::from_utf8_lossy(record)
            ),
        };
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let (meta, name) = record
                .split_once_str(b"\t")
                .ok_or_else(|| bad(record))?;
            let mut fields = meta.splitn_str(3, b" ");
            let mode = FileMode::from_bytes(fields.next().ok_or_else(|| bad(record))?)?;
            let kind = ObjectKind::from_bytes(fields.next().ok_or_else(|| bad(record))?)?;
            let oid_bytes = fields.next().ok_or_else(|| bad(record))?;
            let oid = Oid::from_output(oid_bytes)?;
            // Intern the pointed-at object so later lookups share handles.
            repo.intern(kind, &oid);
            entries.push(TreeEntry {
                mode,
                kind,
                oid,
                name: name.as_bstr().to_owned(),
            });
        }
        Ok(Self { entries })
    }

    /// Write this tree to the object database via `mktree -z` and return
    /// the interned handle.
    ///
    /// # Errors
    /// Returns [`Error::Run`] if git rejects the listing.
    pub fn write(&self, repo: &Repository) -> Result<Tree, Error> {
        let mut input = Vec::new();
        for entry in &self.entries {
            input.extend_from_slice(entry.mode.as_str().as_bytes());
            input.push(b' ');
            input.extend_from_slice(entry.kind.as_str().as_bytes());
            input.push(b' ');
            input.extend_from_slice(entry.oid.as_str().as_bytes());
            input.push(b'\t');
            input.extend_from_slice(&entry.name);
            input.push(0);
        }
        repo.mktree(input)
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Handle to a commit object with lazily parsed headers and message.
#[derive(Clone)]
pub struct Commit {
    inner: Rc<CommitInner>,
}

struct CommitInner {
    oid: Oid,
    data: RefCell<Option<Rc<CommitData>>>,
}

impl Commit {
    pub(crate) fn new(oid: Oid) -> Self {
        Self {
            inner: Rc::new(CommitInner {
                oid,
                data: RefCell::new(None),
            }),
        }
    }

    #[must_use]
    pub fn oid(&self) -> &Oid {
        &self.inner.oid
    }

    /// The parsed commit payload, loaded on first access.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the object is missing or malformed.
    pub fn data(&self, repo: &Repository) -> Result<Rc<CommitData>, Error> {
        if let Some(data) = self.inner.data.borrow().as_ref() {
            return Ok(Rc::clone(data));
        }
        let (kind, bytes) = repo.cat_object(&self.inner.oid)?;
        expect_kind(&self.inner.oid, kind, ObjectKind::Commit)?;
        let data = Rc::new(CommitData::parse(repo, &bytes)?);
        *self.inner.data.borrow_mut() = Some(Rc::clone(&data));
        Ok(data)
    }

    /// Shorthand for this commit's tree.
    ///
    /// # Errors
    /// As [`Commit::data`].
    pub fn tree(&self, repo: &Repository) -> Result<Tree, Error> {
        Ok(self.data(repo)?.tree.clone())
    }

    /// Handle identity.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.inner.oid == other.inner.oid
    }
}
impl Eq for Commit {}

impl std::fmt::Debug for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Commit<{}>", self.inner.oid)
    }
}

/// The mutable counterpart of a commit object: edit a copy, then
/// [`CommitData::write`] it to get a new [`Commit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitData {
    pub tree: Tree,
    pub parents: Vec<Commit>,
    /// `None` means "default identity at write time".
    pub author: Option<Signature>,
    /// `None` means "default identity, stamped at write time".
    pub committer: Option<Signature>,
    pub message: BString,
}

impl CommitData {
    #[must_use]
    pub fn new(tree: Tree, parents: Vec<Commit>, message: impl Into<BString>) -> Self {
        Self {
            tree,
            parents,
            author: None,
            committer: None,
            message: message.into(),
        }
    }

    /// The sole parent of a linear-history commit.
    #[must_use]
    pub fn parent(&self) -> Option<&Commit> {
        match self.parents.as_slice() {
            [parent] => Some(parent),
            _ => None,
        }
    }

    /// True iff the commit changes nothing: exactly one parent and the
    /// same tree as that parent.
    ///
    /// # Errors
    /// As [`Commit::data`] for the parent lookup.
    pub fn is_nochange(&self, repo: &Repository) -> Result<bool, Error> {
        match self.parent() {
            Some(parent) => Ok(self.tree == parent.tree(repo)?),
            None => Ok(false),
        }
    }

    #[must_use]
    pub fn set_tree(mut self, tree: Tree) -> Self {
        self.tree = tree;
        self
    }

    #[must_use]
    pub fn set_parent(mut self, parent: Commit) -> Self {
        self.parents = vec![parent];
        self
    }

    #[must_use]
    pub fn set_author(mut self, author: Option<Signature>) -> Self {
        self.author = author;
        self
    }

    #[must_use]
    pub fn set_committer(mut self, committer: Option<Signature>) -> Self {
        self.committer = committer;
        self
    }

    #[must_use]
    pub fn set_message(mut self, message: impl Into<BString>) -> Self {
        self.message = message.into();
        self
    }

    /// Parse a raw commit payload.
    ///
    /// Header continuation lines (leading SP) fold into the previous
    /// header; the first empty line ends the headers and the remainder is
    /// the message, verbatim.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the payload lacks a tree header.
    pub fn parse(repo: &Repository, payload: &[u8]) -> Result<Self, Error> {
        let mut headers: Vec<Vec<u8>> = Vec::new();
        let mut message = BString::from("");
        let mut rest = payload;
        loop {
            let (line, tail) = match rest.find_byte(b'\n') {
                Some(i) => (&rest[..i], &rest[i + 1..]),
                None => (rest, &rest[rest.len()..]),
            };
            if line.is_empty() {
                message = tail.as_bstr().to_owned();
                break;
            }
            if let Some(cont) = line.strip_prefix(b" ") {
                if let Some(prev) = headers.last_mut() {
                    prev.push(b'\n');
                    prev.extend_from_slice(cont);
                } else {
                    headers.push(cont.to_vec());
                }
            } else {
                headers.push(line.to_vec());
            }
            if tail.is_empty() {
                break;
            }
            rest = tail;
        }

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        for header in &headers {
            let Some((key, value)) = header.split_once_str(b" ") else {
                continue;
            };
            match key {
                b"tree" => tree = Some(repo.get_tree(&Oid::from_output(value)?)),
                b"parent" => parents.push(repo.get_commit(&Oid::from_output(value)?)),
                b"author" => author = Some(Signature::parse(value)?),
                b"committer" => committer = Some(Signature::parse(value)?),
                _ => {}
            }
        }
        let tree = tree.ok_or_else(|| Error::NotFound {
            message: "commit payload has no tree header".to_owned(),
        })?;
        Ok(Self {
            tree,
            parents,
            author,
            committer,
            message,
        })
    }

    /// Write this data as a new commit object via `commit-tree`, passing
    /// identities through the environment, and return the interned handle.
    ///
    /// # Errors
    /// Returns [`Error::Run`] if git rejects the commit.
    pub fn write(&self, repo: &Repository) -> Result<Commit, Error> {
        repo.commit_tree(self)
    }
}

fn expect_kind(oid: &Oid, got: ObjectKind, want: ObjectKind) -> Result<(), Error> {
    if got == want {
        Ok(())
    } else {
        Err(Error::NotFound {
            message: format!("{oid} is a {got}, expected {want}"),
        })
    }
}
