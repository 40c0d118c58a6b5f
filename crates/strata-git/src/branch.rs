//! Branch handles.

use crate::error::Error;
use crate::object::Commit;
use crate::repo::Repository;

/// A local branch, addressed through `refs/heads/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Branch {
    name: String,
}

impl Branch {
    /// Open an existing branch.
    ///
    /// # Errors
    /// [`Error::Branch`] when the branch does not exist.
    pub fn open(repo: &Repository, name: &str) -> Result<Self, Error> {
        let branch = Self {
            name: name.to_owned(),
        };
        if repo.refs().exists(&branch.ref_name())? {
            Ok(branch)
        } else {
            Err(Error::Branch {
                message: format!("{name}: no such branch"),
            })
        }
    }

    /// Create a new branch at the given commit via `git branch`, which
    /// owns ref-name validation and the creation path.
    ///
    /// # Errors
    /// [`Error::Branch`] when the branch already exists; [`Error::Run`]
    /// when git rejects the name.
    pub fn create(repo: &Repository, name: &str, at: &Commit) -> Result<Self, Error> {
        let branch = Self {
            name: name.to_owned(),
        };
        if repo.refs().exists(&branch.ref_name())? {
            return Err(Error::Branch {
                message: format!("{name}: branch already exists"),
            });
        }
        repo.run(["branch", name, at.oid().as_str()]).ok()?;
        // The ref was born outside the cached listing.
        repo.refs().invalidate();
        Ok(branch)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ref_name(&self) -> String {
        format!("refs/heads/{}", self.name)
    }

    /// The branch head commit.
    ///
    /// # Errors
    /// [`Error::NotFound`] when the ref vanished externally.
    pub fn head(&self, repo: &Repository) -> Result<Commit, Error> {
        let oid = repo.refs().get(&self.ref_name())?;
        Ok(repo.get_commit(&oid))
    }

    /// Advance the branch head.
    ///
    /// # Errors
    /// Propagates ref-store failures (including a lost CAS).
    pub fn set_head(&self, repo: &Repository, commit: &Commit, msg: &str) -> Result<(), Error> {
        repo.refs().set(&self.ref_name(), commit.oid(), msg)
    }
}
