//! The cached ref store.
//!
//! On first use the full ref list is read with `git show-ref` and cached;
//! a repository with no refs at all is a valid (empty) starting state, not
//! an error. Writes go through `git update-ref` with an old-value guard:
//! git's own ref locking makes the update a compare-and-swap, with the
//! cached value (or the zero OID for refs we believe absent) as the
//! expected old value. A concurrent external mutation makes git reject
//! the update and surfaces as [`Error::Run`]; there is no retry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Error;
use crate::oid::{Oid, ZERO_OID};
use crate::run::GitRun;

pub struct RefStore {
    git_dir: PathBuf,
    cache: RefCell<Option<HashMap<String, Oid>>>,
}

impl RefStore {
    pub(crate) fn new(git_dir: &Path) -> Self {
        Self {
            git_dir: git_dir.to_owned(),
            cache: RefCell::new(None),
        }
    }

    fn with_cache<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Oid>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut slot = self.cache.borrow_mut();
        let refs = match slot.as_mut() {
            Some(refs) => refs,
            None => {
                let mut refs = HashMap::new();
                // show-ref exits non-zero in a repository with no refs;
                // both there and in fresh repositories an empty listing is
                // a valid starting state.
                if let Ok(lines) = GitRun::new(["show-ref"])
                    .env("GIT_DIR", &self.git_dir)
                    .lines()
                {
                    for line in lines {
                        if let Some((sha1, name)) = line.split_once(' ') {
                            refs.insert(name.to_owned(), Oid::new(sha1)?);
                        }
                    }
                }
                slot.insert(refs)
            }
        };
        f(refs)
    }

    /// The OID a ref points at, or `None` if it does not exist.
    ///
    /// # Errors
    /// Propagates listing failures.
    pub fn lookup(&self, name: &str) -> Result<Option<Oid>, Error> {
        self.with_cache(|refs| Ok(refs.get(name).cloned()))
    }

    /// The OID a ref points at.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the ref does not exist.
    pub fn get(&self, name: &str) -> Result<Oid, Error> {
        self.lookup(name)?.ok_or_else(|| Error::NotFound {
            message: format!("no such ref {name}"),
        })
    }

    /// Whether a ref exists.
    ///
    /// # Errors
    /// Propagates listing failures.
    pub fn exists(&self, name: &str) -> Result<bool, Error> {
        self.with_cache(|refs| Ok(refs.contains_key(name)))
    }

    /// Point a ref at a new OID, creating it if absent.
    ///
    /// Runs `update-ref -m <msg> <name> <new> <old>` where `old` is the
    /// cached value, or the zero OID when the ref is believed absent.
    /// A no-op when the ref already has the requested value. The cache is
    /// updated only after git accepts the swap.
    ///
    /// # Errors
    /// [`Error::Run`] if git rejects the update (including a lost CAS).
    pub fn set(&self, name: &str, oid: &Oid, msg: &str) -> Result<(), Error> {
        self.with_cache(|refs| {
            let old = refs
                .get(name)
                .map_or(ZERO_OID, Oid::as_str)
                .to_owned();
            if old == oid.as_str() {
                return Ok(());
            }
            GitRun::new(["update-ref", "-m", msg, name, oid.as_str(), old.as_str()])
                .env("GIT_DIR", &self.git_dir)
                .ok()?;
            debug!(ref_name = name, old = %old, new = %oid, "ref updated");
            refs.insert(name.to_owned(), oid.clone());
            Ok(())
        })
    }

    /// Drop the cached listing; the next access re-runs `show-ref`.
    ///
    /// For the rare operation that creates refs through porcelain (e.g.
    /// `git branch`) rather than through this store.
    pub(crate) fn invalidate(&self) {
        *self.cache.borrow_mut() = None;
    }

    /// Delete a ref, guarding on its cached value.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the ref does not exist; [`Error::Run`] if
    /// git rejects the deletion.
    pub fn delete(&self, name: &str) -> Result<(), Error> {
        self.with_cache(|refs| {
            let old = refs.get(name).cloned().ok_or_else(|| Error::NotFound {
                message: format!("no such ref {name}"),
            })?;
            GitRun::new(["update-ref", "-d", name, old.as_str()])
                .env("GIT_DIR", &self.git_dir)
                .ok()?;
            debug!(ref_name = name, "ref deleted");
            refs.remove(name);
            Ok(())
        })
    }
}
