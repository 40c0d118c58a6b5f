//! The serialized stack snapshot.
//!
//! Every stack mutation appends a snapshot commit to the stack ref; the
//! commit's tree holds a single `stack.json` blob with this structure.
//! The chain of snapshot commits is the stack's audit log.

use serde::{Deserialize, Serialize};
use strata_git::Oid;

use crate::error::Error;
use crate::stack::{PatchName, Stack};

/// Name of the state blob inside each snapshot commit's tree.
pub(crate) const STATE_FILE: &str = "stack.json";

/// Current snapshot schema version.
pub(crate) const STATE_VERSION: u32 = 1;

/// One named patch and the commit it points at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PatchRecord {
    pub name: PatchName,
    pub oid: Oid,
}

/// A full stack snapshot: the branch head it was taken against, the stack
/// base, and the three ordered patch lists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StackState {
    pub version: u32,
    pub head: Oid,
    pub base: Oid,
    pub applied: Vec<PatchRecord>,
    pub unapplied: Vec<PatchRecord>,
    pub hidden: Vec<PatchRecord>,
}

impl StackState {
    /// Snapshot the given stack's current in-memory state.
    pub(crate) fn capture(stack: &Stack<'_>) -> Result<Self, Error> {
        let record = |names: &[PatchName]| -> Result<Vec<PatchRecord>, Error> {
            names
                .iter()
                .map(|name| {
                    let commit = stack.patch_commit(name).ok_or_else(|| Error::Internal {
                        message: format!("patch `{name}` listed but not in the patch map"),
                    })?;
                    Ok(PatchRecord {
                        name: name.clone(),
                        oid: commit.oid().clone(),
                    })
                })
                .collect()
        };
        Ok(Self {
            version: STATE_VERSION,
            head: stack.top()?.oid().clone(),
            base: stack.base()?.oid().clone(),
            applied: record(stack.applied())?,
            unapplied: record(stack.unapplied())?,
            hidden: record(stack.hidden())?,
        })
    }

    pub(crate) fn to_json(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec_pretty(self).map_err(|err| Error::Internal {
            message: format!("cannot serialize stack state: {err}"),
        })
    }

    pub(crate) fn from_json(branch: &str, bytes: &[u8]) -> Result<Self, Error> {
        let state: Self = serde_json::from_slice(bytes).map_err(|err| Error::CorruptState {
            branch: branch.to_owned(),
            message: err.to_string(),
        })?;
        if state.version != STATE_VERSION {
            return Err(Error::CorruptState {
                branch: branch.to_owned(),
                message: format!("unsupported state version {}", state.version),
            });
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> Oid {
        Oid::new(&format!("{:040x}", u128::from(n))).unwrap()
    }

    #[test]
    fn json_round_trip() {
        let state = StackState {
            version: STATE_VERSION,
            head: oid(1),
            base: oid(2),
            applied: vec![PatchRecord {
                name: "p0".parse().unwrap(),
                oid: oid(3),
            }],
            unapplied: vec![],
            hidden: vec![],
        };
        let json = state.to_json().unwrap();
        let back = StackState::from_json("main", &json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn version_mismatch_is_corrupt() {
        let state = StackState {
            version: 99,
            head: oid(1),
            base: oid(1),
            applied: vec![],
            unapplied: vec![],
            hidden: vec![],
        };
        let json = serde_json::to_vec(&state).unwrap();
        assert!(matches!(
            StackState::from_json("main", &json).unwrap_err(),
            Error::CorruptState { .. }
        ));
    }

    #[test]
    fn garbage_is_corrupt() {
        assert!(matches!(
            StackState::from_json("main", b"not json").unwrap_err(),
            Error::CorruptState { .. }
        ));
    }
}
